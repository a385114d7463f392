//! Lifecycle phases, void reasons and resolution results.

use serde::{Deserialize, Serialize};

/// Where an entity is in its lifecycle.
///
/// ```text
/// Open ──deadline──▶ Locked ──resolve──▶ Resolved ──pool drained──▶ Settled
///                       │                   │
///                       └──────────┬────────┘
///                                  ▼
///                               Voided (universal refund)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Accepting contributions.
    Open,
    /// Deadline passed; waiting for the outcome to become computable.
    Locked,
    /// Outcome computed and memoized; payouts in progress.
    Resolved,
    /// Every obligation paid.
    Settled,
    /// The primary outcome can no longer be computed or claimed; every
    /// contributor may reclaim their own contribution once.
    Voided,
}

impl Phase {
    /// `true` for phases no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Settled | Phase::Voided)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Open => write!(f, "Open"),
            Phase::Locked => write!(f, "Locked"),
            Phase::Resolved => write!(f, "Resolved"),
            Phase::Settled => write!(f, "Settled"),
            Phase::Voided => write!(f, "Voided"),
        }
    }
}

/// Why an entity was voided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoidReason {
    /// The entropy value the outcome depends on fell out of its lookback.
    EntropyExpired,
    /// The winner did not claim within the claim window.
    ClaimWindowLapsed,
    /// Nobody contributed, so there is no outcome to compute.
    NoParticipants,
    /// The creator cancelled before an outcome existed.
    Cancelled,
    /// The offer ran past its deadline without being taken up.
    Expired,
}

impl std::fmt::Display for VoidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoidReason::EntropyExpired => write!(f, "entropy expired"),
            VoidReason::ClaimWindowLapsed => write!(f, "claim window lapsed"),
            VoidReason::NoParticipants => write!(f, "no participants"),
            VoidReason::Cancelled => write!(f, "cancelled"),
            VoidReason::Expired => write!(f, "expired"),
        }
    }
}

/// What a resolution attempt produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution<O> {
    /// A primary outcome, memoized on the entity.
    Decided(O),
    /// No primary outcome will ever exist; refunds are open.
    Voided(VoidReason),
}

impl<O> Resolution<O> {
    pub fn decided(&self) -> Option<&O> {
        match self {
            Resolution::Decided(o) => Some(o),
            Resolution::Voided(_) => None,
        }
    }

    pub fn is_voided(&self) -> bool {
        matches!(self, Resolution::Voided(_))
    }
}
