//! Error types for the Covenant engine.
//!
//! Every operation that can fail returns a [`CovenantError`]. Each variant
//! names the exact precondition that was violated so callers and tests can
//! assert on the cause, and [`CovenantError::class`] buckets it into the
//! taxonomy hosts use for retry decisions.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::machine::Phase;
use crate::types::{Amount, EntityId, PartyId};
use crate::vault::TransferError;

/// Broad failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad parameters. Fatal to the call, nothing changed.
    Validation,
    /// Too early or too late. May succeed later or via another path.
    Temporal,
    /// Wrong caller.
    Authorization,
    /// Already claimed, already contributed, wrong lifecycle phase.
    State,
    /// The asset-transfer collaborator failed. Local state was rolled back;
    /// the caller may retry.
    Collaborator,
}

/// Errors raised by the registry, state machine, ledger and settlement engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CovenantError {
    /// Creation parameters violate a precondition.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Zero-amount contributions and payouts are never meaningful.
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,

    /// No entity with this id exists (or it was cleared).
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// The contribution deadline has passed.
    #[error("deadline passed: deadline {deadline}, now {now}")]
    DeadlinePassed {
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// The outcome cannot be computed yet.
    #[error("resolution not ready until {ready_at} (now {now})")]
    ResolutionNotReady {
        ready_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Time says the draw is due, but the entropy unit it depends on has not
    /// been produced yet.
    #[error("entropy not yet available: target unit {target}, current unit {current}")]
    EntropyPending { target: u64, current: u64 },

    /// The caller may not perform this action on this entity.
    #[error("not authorized: {party} may not {action}")]
    NotAuthorized {
        party: PartyId,
        action: &'static str,
    },

    /// Single-ticket agreements accept one contribution per party.
    #[error("{party} has already contributed")]
    AlreadyContributed { party: PartyId },

    /// The payout for this party (or the single winner payout) already happened.
    #[error("payout already claimed by {party}")]
    AlreadyClaimed { party: PartyId },

    /// The party has nothing recorded to claim or refund.
    #[error("{party} has no contribution")]
    NoContribution { party: PartyId },

    /// A fixed-price contribution did not match the price.
    #[error("invalid amount: expected {expected}, got {got}")]
    InvalidAmount { expected: Amount, got: Amount },

    /// A capped contribution would exceed the per-party cap.
    #[error("contribution cap exceeded: cap {cap}, attempted total {attempted}")]
    ContributionCapExceeded { cap: Amount, attempted: Amount },

    /// The entity is not in a phase that allows this operation.
    #[error("invalid state: entity is {current}, expected {expected}")]
    InvalidState {
        current: Phase,
        expected: &'static str,
    },

    /// Requested more than the pool holds.
    #[error("insufficient pool: requested {requested}, available {available}")]
    InsufficientPool { requested: Amount, available: Amount },

    /// Arithmetic would overflow. Wrapping arithmetic and money do not mix.
    #[error("amount overflow")]
    AmountOverflow,

    /// The asset-transfer collaborator rejected the movement.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),
}

impl CovenantError {
    /// Taxonomy bucket for this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            CovenantError::InvalidParameters(_)
            | CovenantError::ZeroAmount
            | CovenantError::InvalidAmount { .. }
            | CovenantError::ContributionCapExceeded { .. }
            | CovenantError::AmountOverflow => ErrorClass::Validation,
            CovenantError::DeadlinePassed { .. }
            | CovenantError::ResolutionNotReady { .. }
            | CovenantError::EntropyPending { .. } => ErrorClass::Temporal,
            CovenantError::NotAuthorized { .. } => ErrorClass::Authorization,
            CovenantError::EntityNotFound(_)
            | CovenantError::AlreadyContributed { .. }
            | CovenantError::AlreadyClaimed { .. }
            | CovenantError::NoContribution { .. }
            | CovenantError::InvalidState { .. }
            | CovenantError::InsufficientPool { .. } => ErrorClass::State,
            CovenantError::TransferFailed(_) => ErrorClass::Collaborator,
        }
    }

    /// `true` when re-invoking the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Temporal | ErrorClass::Collaborator
        ) && !matches!(self, CovenantError::DeadlinePassed { .. })
    }
}

/// Convenience alias used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, CovenantError>;
