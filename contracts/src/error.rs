//! Errors raised by the agreement books.
//!
//! Engine-level failures (deadlines, authorization, double claims, transfer
//! failures) arrive wrapped as [`ContractError::Core`]; the other variants
//! are business rules of individual agreements.

use covenant_protocol::{Amount, CovenantError, ErrorClass, PartyId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error(transparent)]
    Core(#[from] CovenantError),

    /// The fundraiser closed below its goal; only refunds are possible.
    #[error("funding goal not met: raised {raised} of {goal}")]
    GoalNotMet { goal: Amount, raised: Amount },

    /// The fundraiser met its goal; donations belong to the beneficiary.
    #[error("goal met: refunds are closed")]
    RefundsClosed,

    /// A bid must raise the bidder's total strictly above the highest bid.
    #[error("bid too low: total {total} does not exceed highest bid {highest}")]
    BidTooLow { total: Amount, highest: Amount },

    /// The current (or winning) highest bid stays committed.
    #[error("highest bidder cannot withdraw")]
    HighestBidderLocked,

    /// The auction ended without a sale.
    #[error("auction ended without a sale")]
    NoSale,

    /// Nothing is currently claimable.
    #[error("nothing to release")]
    NothingToRelease,

    /// Stakers still have unclaimed positions; dust is swept after them.
    #[error("{remaining} stake still unclaimed")]
    StakesOutstanding { remaining: Amount },

    /// The vesting schedule was already revoked.
    #[error("vesting already revoked")]
    AlreadyRevoked,

    /// The caller is neither side of the swap.
    #[error("{party} is not a party to this swap")]
    NotAParty { party: PartyId },

    #[error("{party} has already deposited")]
    AlreadyDeposited { party: PartyId },

    /// The swap is waiting on this party's deposit.
    #[error("awaiting deposit from {party}")]
    AwaitingDeposit { party: PartyId },

    /// Both legs are in; withdrawal reopens only after the deadline.
    #[error("counterparty has deposited; swap is ready to execute")]
    CounterpartyDeposited,

    /// The listing is no longer for sale.
    #[error("listing is {status}")]
    ListingClosed { status: String },

    /// A purchase larger than what is left on offer.
    #[error("requested {requested} exceeds remaining {remaining}")]
    ExceedsRemaining { requested: Amount, remaining: Amount },

    /// A purchase so small its price rounds to zero.
    #[error("purchase of {amount} is too small to price")]
    PurchaseTooSmall { amount: Amount },
}

impl ContractError {
    /// Taxonomy bucket, matching [`CovenantError::class`] for wrapped errors.
    pub fn class(&self) -> ErrorClass {
        match self {
            ContractError::Core(inner) => inner.class(),
            ContractError::BidTooLow { .. }
            | ContractError::ExceedsRemaining { .. }
            | ContractError::PurchaseTooSmall { .. } => ErrorClass::Validation,
            ContractError::NotAParty { .. } => ErrorClass::Authorization,
            ContractError::GoalNotMet { .. }
            | ContractError::RefundsClosed
            | ContractError::HighestBidderLocked
            | ContractError::NoSale
            | ContractError::NothingToRelease
            | ContractError::StakesOutstanding { .. }
            | ContractError::AlreadyRevoked
            | ContractError::AlreadyDeposited { .. }
            | ContractError::AwaitingDeposit { .. }
            | ContractError::CounterpartyDeposited
            | ContractError::ListingClosed { .. } => ErrorClass::State,
        }
    }

    /// The wrapped engine error, if this is one.
    pub fn core(&self) -> Option<&CovenantError> {
        match self {
            ContractError::Core(inner) => Some(inner),
            _ => None,
        }
    }
}

pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_errors_keep_their_class() {
        let err: ContractError = CovenantError::ZeroAmount.into();
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(err.core(), Some(&CovenantError::ZeroAmount));
        assert_eq!(err.to_string(), "zero-amount operations are not permitted");
    }

    #[test]
    fn goal_not_met_reports_both_amounts() {
        let err = ContractError::GoalNotMet { goal: 10, raised: 8 };
        assert_eq!(err.to_string(), "funding goal not met: raised 8 of 10");
        assert_eq!(err.class(), ErrorClass::State);
    }
}
