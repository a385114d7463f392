//! # Asset Transfer Collaborator
//!
//! Covenant never moves value itself. Every payout, refund, deposit and
//! exchange is expressed as one or more [`TransferOrder`]s handed to an
//! [`AssetTransfer`] implementation owned by the host platform. The engine
//! treats the call as synchronous and fallible: an `Err` means nothing moved.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Amount, AssetKind, PartyId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by the asset-transfer collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The source account does not hold enough of the asset.
    #[error(
        "insufficient balance: {party} holds {available} of {asset}, requested {requested}"
    )]
    InsufficientBalance {
        party: PartyId,
        asset: AssetKind,
        available: Amount,
        requested: Amount,
    },

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow: crediting {amount} of {asset} to {party}")]
    Overflow {
        party: PartyId,
        asset: AssetKind,
        amount: Amount,
    },

    /// Unique items move one at a time.
    #[error("unique items move with amount 1, got {0}")]
    InvalidItemAmount(Amount),

    /// The collaborator refused the movement for its own reasons
    /// (paused token, network outage, compliance hold...).
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// TransferOrder
// ---------------------------------------------------------------------------

/// One movement of value between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub asset: AssetKind,
    pub from: PartyId,
    pub to: PartyId,
    pub amount: Amount,
}

impl TransferOrder {
    pub fn new(asset: AssetKind, from: PartyId, to: PartyId, amount: Amount) -> Self {
        Self {
            asset,
            from,
            to,
            amount,
        }
    }
}

// ---------------------------------------------------------------------------
// AssetTransfer
// ---------------------------------------------------------------------------

/// The external ledger the engine settles against.
///
/// Implementations must make [`transfer_batch`](Self::transfer_batch)
/// all-or-nothing: either every order applies or none does. The single-order
/// helpers are expressed in terms of it.
pub trait AssetTransfer: Send + Sync {
    /// Executes every order atomically.
    fn transfer_batch(&self, orders: &[TransferOrder]) -> Result<(), TransferError>;

    /// The account pooled funds are held in.
    fn escrow(&self) -> PartyId {
        PartyId::escrow()
    }

    /// Pays `amount` of `asset` out of escrow to `to`.
    fn transfer(&self, asset: &AssetKind, to: &PartyId, amount: Amount) -> Result<(), TransferError> {
        let order = TransferOrder::new(asset.clone(), self.escrow(), to.clone(), amount);
        self.transfer_batch(std::slice::from_ref(&order))
    }

    /// Moves `amount` of `asset` from `from` to `to` (typically into escrow).
    fn transfer_from(
        &self,
        asset: &AssetKind,
        from: &PartyId,
        to: &PartyId,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let order = TransferOrder::new(asset.clone(), from.clone(), to.clone(), amount);
        self.transfer_batch(std::slice::from_ref(&order))
    }
}
