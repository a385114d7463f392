//! # In-Memory Balance Ledger
//!
//! [`Vault`] is a reference [`AssetTransfer`] implementation: a map of
//! `(party, asset) -> amount` with overflow-checked credit, balance-checked
//! debit, and all-or-nothing batches. Hosts embedding Covenant plug in their
//! real ledger instead; simulations and tests use this one.
//!
//! The vault can be told to reject the next N batches, which is how the
//! settlement rollback paths get exercised.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::transfer::{AssetTransfer, TransferError, TransferOrder};
use crate::types::{Amount, AssetKind, PartyId};

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct Balances {
    entries: HashMap<(PartyId, AssetKind), Amount>,
}

impl Balances {
    fn get(&self, party: &PartyId, asset: &AssetKind) -> Amount {
        self.entries
            .get(&(party.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn credit(&mut self, party: &PartyId, asset: &AssetKind, amount: Amount) -> Result<Amount, TransferError> {
        let entry = self
            .entries
            .entry((party.clone(), asset.clone()))
            .or_insert(0);

        let new_amount = entry.checked_add(amount).ok_or(TransferError::Overflow {
            party: party.clone(),
            asset: asset.clone(),
            amount,
        })?;

        *entry = new_amount;
        Ok(new_amount)
    }

    fn debit(&mut self, party: &PartyId, asset: &AssetKind, amount: Amount) -> Result<Amount, TransferError> {
        let available = self.get(party, asset);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                party: party.clone(),
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }

        let remaining = available - amount;
        if remaining == 0 {
            self.entries.remove(&(party.clone(), asset.clone()));
        } else {
            self.entries.insert((party.clone(), asset.clone()), remaining);
        }
        Ok(remaining)
    }

    fn apply(&mut self, order: &TransferOrder) -> Result<(), TransferError> {
        if order.asset.is_unique() && order.amount != 1 {
            return Err(TransferError::InvalidItemAmount(order.amount));
        }
        self.debit(&order.from, &order.asset, order.amount)?;
        self.credit(&order.to, &order.asset, order.amount)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct VaultState {
    balances: Balances,
    /// Number of upcoming batches to reject.
    pending_failures: u32,
    /// Orders applied since creation.
    orders_applied: u64,
}

/// Thread-safe in-memory ledger implementing [`AssetTransfer`].
#[derive(Debug, Default)]
pub struct Vault {
    state: Mutex<VaultState>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` of `asset` out of thin air for `party`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidItemAmount`] when minting an item
    /// with an amount other than 1, [`TransferError::Rejected`] when the item
    /// already exists, and [`TransferError::Overflow`] on balance overflow.
    pub fn mint(&self, party: &PartyId, asset: &AssetKind, amount: Amount) -> Result<Amount, TransferError> {
        let mut state = self.state.lock();
        if asset.is_unique() {
            if amount != 1 {
                return Err(TransferError::InvalidItemAmount(amount));
            }
            if Self::find_owner(&state.balances, asset).is_some() {
                return Err(TransferError::Rejected(format!("{} already minted", asset)));
            }
        }
        state.balances.credit(party, asset, amount)
    }

    pub fn balance_of(&self, party: &PartyId, asset: &AssetKind) -> Amount {
        self.state.lock().balances.get(party, asset)
    }

    /// What the escrow account currently holds of `asset`.
    pub fn escrow_balance(&self, asset: &AssetKind) -> Amount {
        self.balance_of(&PartyId::escrow(), asset)
    }

    /// Current holder of a unique item, if it exists.
    pub fn owner_of(&self, item: &AssetKind) -> Option<PartyId> {
        let state = self.state.lock();
        Self::find_owner(&state.balances, item)
    }

    /// Sum of every account's balance of `asset`.
    pub fn total_supply(&self, asset: &AssetKind) -> Amount {
        self.state
            .lock()
            .balances
            .entries
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Makes the next `count` batches fail with [`TransferError::Rejected`].
    pub fn fail_next(&self, count: u32) {
        self.state.lock().pending_failures = count;
    }

    /// Orders applied so far; rejected batches do not count.
    pub fn orders_applied(&self) -> u64 {
        self.state.lock().orders_applied
    }

    fn find_owner(balances: &Balances, item: &AssetKind) -> Option<PartyId> {
        balances
            .entries
            .iter()
            .find(|((_, asset), amount)| asset == item && **amount > 0)
            .map(|((party, _), _)| party.clone())
    }
}

impl AssetTransfer for Vault {
    fn transfer_batch(&self, orders: &[TransferOrder]) -> Result<(), TransferError> {
        let mut state = self.state.lock();

        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(TransferError::Rejected("ledger unavailable".into()));
        }

        // Apply to a scratch copy so a failing order leaves nothing behind.
        let mut scratch = state.balances.clone();
        for order in orders {
            scratch.apply(order)?;
        }

        state.balances = scratch;
        state.orders_applied += orders.len() as u64;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> PartyId {
        PartyId::from("alice")
    }

    fn bob() -> PartyId {
        PartyId::from("bob")
    }

    #[test]
    fn mint_credits_balance() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, 1000).unwrap();
        assert_eq!(vault.balance_of(&alice(), &AssetKind::Native), 1000);
    }

    #[test]
    fn mint_overflow_rejected() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, u64::MAX).unwrap();
        let result = vault.mint(&alice(), &AssetKind::Native, 1);
        assert!(matches!(result, Err(TransferError::Overflow { .. })));
    }

    #[test]
    fn items_are_unique() {
        let vault = Vault::new();
        let punk = AssetKind::item("punks", 1);
        vault.mint(&alice(), &punk, 1).unwrap();
        assert!(vault.mint(&bob(), &punk, 1).is_err());
        assert!(vault.mint(&bob(), &AssetKind::item("punks", 2), 2).is_err());
        assert_eq!(vault.owner_of(&punk), Some(alice()));
    }

    #[test]
    fn transfer_from_moves_value() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, 500).unwrap();
        vault
            .transfer_from(&AssetKind::Native, &alice(), &PartyId::escrow(), 200)
            .unwrap();
        assert_eq!(vault.balance_of(&alice(), &AssetKind::Native), 300);
        assert_eq!(vault.escrow_balance(&AssetKind::Native), 200);

        vault.transfer(&AssetKind::Native, &bob(), 200).unwrap();
        assert_eq!(vault.balance_of(&bob(), &AssetKind::Native), 200);
        assert_eq!(vault.escrow_balance(&AssetKind::Native), 0);
    }

    #[test]
    fn insufficient_balance_rejected() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, 100).unwrap();
        let result = vault.transfer_from(&AssetKind::Native, &alice(), &bob(), 200);
        assert!(matches!(
            result,
            Err(TransferError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            })
        ));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let vault = Vault::new();
        let usdc = AssetKind::token("USDC");
        vault.mint(&alice(), &usdc, 100).unwrap();

        let orders = vec![
            TransferOrder::new(usdc.clone(), alice(), bob(), 100),
            // Bob has no native balance, so this leg fails.
            TransferOrder::new(AssetKind::Native, bob(), alice(), 50),
        ];
        assert!(vault.transfer_batch(&orders).is_err());
        assert_eq!(vault.balance_of(&alice(), &usdc), 100);
        assert_eq!(vault.balance_of(&bob(), &usdc), 0);
        assert_eq!(vault.orders_applied(), 0);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, 10).unwrap();
        vault.fail_next(1);

        let first = vault.transfer_from(&AssetKind::Native, &alice(), &bob(), 5);
        assert!(matches!(first, Err(TransferError::Rejected(_))));
        assert_eq!(vault.balance_of(&alice(), &AssetKind::Native), 10);

        vault
            .transfer_from(&AssetKind::Native, &alice(), &bob(), 5)
            .unwrap();
        assert_eq!(vault.balance_of(&bob(), &AssetKind::Native), 5);
    }

    #[test]
    fn total_supply_spans_accounts() {
        let vault = Vault::new();
        vault.mint(&alice(), &AssetKind::Native, 70).unwrap();
        vault.mint(&bob(), &AssetKind::Native, 30).unwrap();
        vault
            .transfer_from(&AssetKind::Native, &alice(), &PartyId::escrow(), 20)
            .unwrap();
        assert_eq!(vault.total_supply(&AssetKind::Native), 100);
    }
}
