//! The settlement engine: the only code that moves value for an entity.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{CovenantError, Result};
use crate::events::{CovenantEvent, EventSink, PayoutPath};
use crate::machine::{EntityCore, Phase, Resolution, VoidReason};
use crate::types::{Amount, AssetKind, EntityId, PartyId};
use crate::vault::{AssetTransfer, TransferError, TransferOrder};

/// Drives the asset-transfer collaborator on behalf of entities and keeps
/// their bookkeeping in step with it.
///
/// Every payout follows the same two-phase shape:
///
/// 1. reserve: flip the claimed/done flag and take the amount out of the pool;
/// 2. transfer;
/// 3. on failure, undo step 1 and return [`CovenantError::TransferFailed`].
///
/// The caller holds the entity's lock throughout, so no other operation can
/// observe the reservation.
#[derive(Clone)]
pub struct SettlementEngine {
    transfer: Arc<dyn AssetTransfer>,
    events: Arc<dyn EventSink>,
}

impl SettlementEngine {
    pub fn new(transfer: Arc<dyn AssetTransfer>, events: Arc<dyn EventSink>) -> Self {
        Self { transfer, events }
    }

    pub fn escrow(&self) -> PartyId {
        self.transfer.escrow()
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// [`EntityCore::observe`], announcing a void if time caused one.
    pub fn observe<O: Clone>(&self, core: &mut EntityCore<O>, now: DateTime<Utc>) -> Phase {
        let before = core.phase();
        let after = core.observe(now);
        if before != Phase::Voided && after == Phase::Voided {
            self.announce_void(core);
        }
        after
    }

    /// [`EntityCore::resolve_with`], announcing a newly computed resolution.
    pub fn resolve<O, F>(&self, core: &mut EntityCore<O>, now: DateTime<Utc>, decide: F) -> Result<Resolution<O>>
    where
        O: Clone + Debug,
        F: FnOnce(&EntityCore<O>) -> Result<Resolution<O>>,
    {
        let before = core.phase();
        let fresh = core.resolution().is_none();
        let resolution = core.resolve_with(now, decide)?;

        if fresh {
            match &resolution {
                Resolution::Decided(outcome) => {
                    info!(entity_id = core.id.0, kind = %core.kind, ?outcome, "entity resolved");
                    self.events.emit(&CovenantEvent::Resolved {
                        id: core.id,
                        outcome: format!("{:?}", outcome),
                    });
                }
                Resolution::Voided(_) => self.announce_void(core),
            }
        } else if before != Phase::Voided && core.phase() == Phase::Voided {
            self.announce_void(core);
        }
        Ok(resolution)
    }

    /// Records an outcome reached before the deadline (a sale, an executed swap).
    pub fn conclude<O: Clone + Debug>(&self, core: &mut EntityCore<O>, now: DateTime<Utc>, outcome: O) -> Result<()> {
        core.conclude(now, outcome.clone())?;
        info!(entity_id = core.id.0, kind = %core.kind, ?outcome, "entity concluded");
        self.events.emit(&CovenantEvent::Resolved {
            id: core.id,
            outcome: format!("{:?}", outcome),
        });
        Ok(())
    }

    /// Voids the entity and announces it. No-op once terminal.
    pub fn void<O: Clone>(&self, core: &mut EntityCore<O>, now: DateTime<Utc>, reason: VoidReason) {
        if core.phase().is_terminal() {
            return;
        }
        core.void(now, reason);
        self.announce_void(core);
    }

    fn announce_void<O: Clone>(&self, core: &EntityCore<O>) {
        let Some(record) = core.void_record() else {
            return;
        };
        warn!(
            entity_id = core.id.0,
            kind = %core.kind,
            reason = %record.reason,
            pool = record.pool_at_void,
            "entity voided, refunds open"
        );
        self.events.emit(&CovenantEvent::Voided {
            id: core.id,
            reason: record.reason.to_string(),
        });
    }

    // -----------------------------------------------------------------------
    // Inflows
    // -----------------------------------------------------------------------

    /// Pulls a contribution into escrow and records it. Returns the party's
    /// new total.
    ///
    /// Every precondition is checked before the transfer, so a failed
    /// transfer leaves the entity untouched.
    pub fn accept<O: Clone>(
        &self,
        core: &mut EntityCore<O>,
        now: DateTime<Utc>,
        party: &PartyId,
        amount: Amount,
    ) -> Result<Amount> {
        core.check_contribution(now, party, amount)?;
        self.transfer
            .transfer_from(&core.asset, party, &self.escrow(), amount)?;
        let total = core.record_contribution(now, party, amount)?;

        debug!(entity_id = core.id.0, party = %party, amount, total, "contribution recorded");
        self.events.emit(&CovenantEvent::Contributed {
            id: core.id,
            party: party.clone(),
            asset: core.asset.clone(),
            amount,
        });
        Ok(total)
    }

    /// Pulls value that is not part of the pool into escrow (an item for
    /// sale, a reward deposit, a swap leg).
    pub fn collect(&self, id: EntityId, asset: &AssetKind, from: &PartyId, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(CovenantError::ZeroAmount);
        }
        self.transfer
            .transfer_from(asset, from, &self.escrow(), amount)?;

        debug!(entity_id = id.0, from = %from, %asset, amount, "collected into escrow");
        self.events.emit(&CovenantEvent::Collected {
            id,
            from: from.clone(),
            asset: asset.clone(),
            amount,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pool payouts
    // -----------------------------------------------------------------------

    /// Pays `amount` from the pool on the winner-take-all path, at most once
    /// per entity.
    pub fn pay_primary<O: Clone>(&self, core: &mut EntityCore<O>, to: &PartyId, amount: Amount) -> Result<Amount> {
        if core.payout_done() {
            return Err(CovenantError::AlreadyClaimed { party: to.clone() });
        }

        core.debit_pool(amount)?;
        core.set_payout_done(true);

        match self.transfer.transfer(&core.asset, to, amount) {
            Ok(()) => {
                self.paid(core, to, amount, PayoutPath::Primary);
                core.refresh_settled();
                Ok(amount)
            }
            Err(err) => {
                core.credit_back(amount);
                core.set_payout_done(false);
                Err(self.reverted(core.id, to, amount, err))
            }
        }
    }

    /// Pays out `party`'s ledger entry (plus `bonus` from outside the pool)
    /// to `to`, at most once per party.
    pub fn pay_entry<O: Clone>(
        &self,
        core: &mut EntityCore<O>,
        party: &PartyId,
        to: &PartyId,
        bonus: Amount,
        path: PayoutPath,
    ) -> Result<Amount> {
        let amount = core.ledger_mut().mark_claimed(party)?;
        if let Err(err) = core.debit_pool(amount) {
            core.ledger_mut().reopen(party);
            return Err(err);
        }
        let Some(total) = amount.checked_add(bonus) else {
            core.credit_back(amount);
            core.ledger_mut().reopen(party);
            return Err(CovenantError::AmountOverflow);
        };

        match self.transfer.transfer(&core.asset, to, total) {
            Ok(()) => {
                self.paid(core, to, total, path);
                core.refresh_settled();
                Ok(total)
            }
            Err(err) => {
                core.credit_back(amount);
                core.ledger_mut().reopen(party);
                Err(self.reverted(core.id, to, total, err))
            }
        }
    }

    /// Returns `party`'s own contribution to it.
    pub fn refund<O: Clone>(&self, core: &mut EntityCore<O>, party: &PartyId) -> Result<Amount> {
        self.pay_entry(core, party, party, 0, PayoutPath::Refund)
    }

    /// Pays an arbitrary part of the pool that is not tied to one ledger entry.
    pub fn release<O: Clone>(
        &self,
        core: &mut EntityCore<O>,
        to: &PartyId,
        amount: Amount,
        path: PayoutPath,
    ) -> Result<Amount> {
        if amount == 0 {
            return Err(CovenantError::ZeroAmount);
        }
        core.debit_pool(amount)?;

        match self.transfer.transfer(&core.asset, to, amount) {
            Ok(()) => {
                self.paid(core, to, amount, path);
                core.refresh_settled();
                Ok(amount)
            }
            Err(err) => {
                core.credit_back(amount);
                Err(self.reverted(core.id, to, amount, err))
            }
        }
    }

    /// Takes `amount` out of the pool as one leg of an atomic multi-leg
    /// exchange. `orders` must include the pool leg itself.
    pub fn release_with<O: Clone>(
        &self,
        core: &mut EntityCore<O>,
        amount: Amount,
        orders: &[TransferOrder],
    ) -> Result<()> {
        core.debit_pool(amount)?;

        match self.transfer.transfer_batch(orders) {
            Ok(()) => {
                self.exchanged(core.id, orders);
                core.refresh_settled();
                Ok(())
            }
            Err(err) => {
                core.credit_back(amount);
                let to = orders
                    .first()
                    .map(|o| o.to.clone())
                    .unwrap_or_else(|| self.escrow());
                Err(self.reverted(core.id, &to, amount, err))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Escrow payouts outside the pool
    // -----------------------------------------------------------------------

    /// Pays escrowed value that is tracked by the caller rather than the
    /// pool. The caller reserves before calling and undoes on `Err`.
    pub fn deliver(
        &self,
        id: EntityId,
        asset: &AssetKind,
        to: &PartyId,
        amount: Amount,
        path: PayoutPath,
    ) -> Result<()> {
        if amount == 0 {
            return Err(CovenantError::ZeroAmount);
        }
        match self.transfer.transfer(asset, to, amount) {
            Ok(()) => {
                info!(entity_id = id.0, to = %to, %asset, amount, %path, "payout");
                self.events.emit(&CovenantEvent::Paid {
                    id,
                    to: to.clone(),
                    asset: asset.clone(),
                    amount,
                    path,
                });
                Ok(())
            }
            Err(err) => Err(self.reverted(id, to, amount, err)),
        }
    }

    /// Executes a set of orders atomically.
    pub fn exchange(&self, id: EntityId, orders: &[TransferOrder]) -> Result<()> {
        self.transfer.transfer_batch(orders).map_err(|err| {
            let to = orders
                .first()
                .map(|o| o.to.clone())
                .unwrap_or_else(|| self.escrow());
            let amount = orders
                .iter()
                .fold(0 as Amount, |acc, o| acc.saturating_add(o.amount));
            self.reverted(id, &to, amount, err)
        })?;
        self.exchanged(id, orders);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Announcements
    // -----------------------------------------------------------------------

    fn paid<O: Clone>(&self, core: &EntityCore<O>, to: &PartyId, amount: Amount, path: PayoutPath) {
        info!(
            entity_id = core.id.0,
            to = %to,
            asset = %core.asset,
            amount,
            %path,
            pool = core.pool(),
            "payout"
        );
        self.events.emit(&CovenantEvent::Paid {
            id: core.id,
            to: to.clone(),
            asset: core.asset.clone(),
            amount,
            path,
        });
    }

    fn exchanged(&self, id: EntityId, orders: &[TransferOrder]) {
        info!(entity_id = id.0, legs = orders.len(), "exchange settled");
        self.events.emit(&CovenantEvent::Exchanged {
            id,
            legs: orders.to_vec(),
        });
    }

    fn reverted(&self, id: EntityId, to: &PartyId, amount: Amount, err: TransferError) -> CovenantError {
        warn!(entity_id = id.0, to = %to, amount, error = %err, "transfer failed, payout rolled back");
        self.events.emit(&CovenantEvent::PayoutReverted {
            id,
            to: to.clone(),
            amount,
            error: err.to_string(),
        });
        CovenantError::TransferFailed(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;
    use crate::ledger::ContributionPolicy;
    use crate::machine::Schedule;
    use crate::types::EntityKind;
    use crate::vault::Vault;
    use chrono::Duration;

    struct Fixture {
        vault: Arc<Vault>,
        sink: Arc<RecordingSink>,
        engine: SettlementEngine,
        core: EntityCore<u8>,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let vault = Arc::new(Vault::new());
        let sink = Arc::new(RecordingSink::new());
        let engine = SettlementEngine::new(vault.clone(), sink.clone());
        let now = Utc::now();
        let core = EntityCore::new(
            EntityId(0),
            EntityKind::Fundraiser,
            PartyId::from("creator"),
            AssetKind::Native,
            Schedule::new(now, now + Duration::days(1)),
            ContributionPolicy::Accumulate,
        );
        for name in ["alice", "bob"] {
            vault
                .mint(&PartyId::from(name), &AssetKind::Native, 100)
                .unwrap();
        }
        Fixture {
            vault,
            sink,
            engine,
            core,
            now,
        }
    }

    #[test]
    fn accept_moves_value_into_escrow() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        f.engine.accept(&mut f.core, f.now, &alice, 40).unwrap();

        assert_eq!(f.vault.balance_of(&alice, &AssetKind::Native), 60);
        assert_eq!(f.vault.escrow_balance(&AssetKind::Native), 40);
        assert_eq!(f.core.pool(), 40);
        assert_eq!(f.sink.count("contributed"), 1);
    }

    #[test]
    fn failed_inflow_records_nothing() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        let result = f.engine.accept(&mut f.core, f.now, &alice, 500);

        assert!(matches!(result, Err(CovenantError::TransferFailed(_))));
        assert_eq!(f.core.pool(), 0);
        assert!(!f.core.ledger().has_contributed(&alice));
    }

    #[test]
    fn refund_rolls_back_on_transfer_failure() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        f.engine.accept(&mut f.core, f.now, &alice, 40).unwrap();

        f.vault.fail_next(1);
        let result = f.engine.refund(&mut f.core, &alice);
        assert!(matches!(result, Err(CovenantError::TransferFailed(_))));
        assert_eq!(f.core.pool(), 40);
        assert_eq!(f.core.amount_of(&alice), 40);
        assert!(f.core.is_conserved());
        assert_eq!(f.sink.count("payout_reverted"), 1);

        // Retrying after the collaborator recovers succeeds exactly once.
        assert_eq!(f.engine.refund(&mut f.core, &alice).unwrap(), 40);
        assert!(matches!(
            f.engine.refund(&mut f.core, &alice),
            Err(CovenantError::AlreadyClaimed { .. })
        ));
        assert_eq!(f.vault.balance_of(&alice, &AssetKind::Native), 100);
    }

    #[test]
    fn primary_payout_is_at_most_once() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        let bob = PartyId::from("bob");
        f.engine.accept(&mut f.core, f.now, &alice, 30).unwrap();
        f.engine.accept(&mut f.core, f.now, &bob, 20).unwrap();

        f.vault.fail_next(1);
        assert!(f.engine.pay_primary(&mut f.core, &alice, 50).is_err());
        assert!(!f.core.payout_done());
        assert_eq!(f.core.pool(), 50);

        f.engine.pay_primary(&mut f.core, &alice, 50).unwrap();
        assert!(f.core.payout_done());
        assert!(matches!(
            f.engine.pay_primary(&mut f.core, &alice, 50),
            Err(CovenantError::AlreadyClaimed { .. })
        ));
        assert_eq!(f.vault.balance_of(&alice, &AssetKind::Native), 120);
        assert!(f.core.is_conserved());
    }

    #[test]
    fn release_cannot_exceed_pool() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        f.engine.accept(&mut f.core, f.now, &alice, 10).unwrap();

        assert!(matches!(
            f.engine
                .release(&mut f.core, &alice, 11, PayoutPath::Release),
            Err(CovenantError::InsufficientPool { .. })
        ));
        f.engine
            .release(&mut f.core, &alice, 4, PayoutPath::Release)
            .unwrap();
        assert_eq!(f.core.pool(), 6);
        assert!(f.core.is_conserved());
    }

    #[test]
    fn release_with_is_atomic() {
        let mut f = fixture();
        let alice = PartyId::from("alice");
        let bob = PartyId::from("bob");
        f.engine.accept(&mut f.core, f.now, &alice, 10).unwrap();

        // Bob cannot cover the payment leg, so the pool leg must not move either.
        let orders = vec![
            TransferOrder::new(AssetKind::Native, f.engine.escrow(), bob.clone(), 10),
            TransferOrder::new(AssetKind::token("USD"), bob.clone(), alice.clone(), 5),
        ];
        assert!(f.engine.release_with(&mut f.core, 10, &orders).is_err());
        assert_eq!(f.core.pool(), 10);
        assert_eq!(f.vault.balance_of(&bob, &AssetKind::Native), 100);
    }

    #[test]
    fn resolve_announces_only_once() {
        let mut f = fixture();
        let later = f.core.schedule.resolvable_at() + Duration::seconds(1);
        f.engine
            .resolve(&mut f.core, later, |_| Ok(Resolution::Decided(1)))
            .unwrap();
        f.engine
            .resolve(&mut f.core, later, |_| Ok(Resolution::Decided(2)))
            .unwrap();
        assert_eq!(f.sink.count("resolved"), 1);
    }
}
