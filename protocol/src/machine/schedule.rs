//! # Deadlines and Windows
//!
//! A [`Schedule`] carries every timestamp an entity is gated on. One
//! boundary policy applies everywhere:
//!
//! - contributing is allowed while `now <= deadline`;
//! - resolving is allowed once `now > deadline + resolution_delay`;
//! - the primary claim stays open while `now <= resolvable_at + claim_window`.
//!
//! Durations are stored as whole seconds so the record serializes cleanly.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CovenantError, Result};

/// Immutable timing parameters of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// When the entity was created.
    pub opened_at: DateTime<Utc>,
    /// Last instant contributions are accepted.
    pub deadline: DateTime<Utc>,
    /// Extra wait after the deadline before the outcome is computable.
    pub resolution_delay_secs: i64,
    /// How long the primary payout path stays open once resolution is
    /// possible. `None` keeps it open forever.
    pub claim_window_secs: Option<i64>,
}

impl Schedule {
    pub fn new(opened_at: DateTime<Utc>, deadline: DateTime<Utc>) -> Self {
        Self {
            opened_at,
            deadline,
            resolution_delay_secs: 0,
            claim_window_secs: None,
        }
    }

    pub fn with_resolution_delay(mut self, delay: Duration) -> Self {
        self.resolution_delay_secs = delay.num_seconds();
        self
    }

    pub fn with_claim_window(mut self, window: Duration) -> Self {
        self.claim_window_secs = Some(window.num_seconds());
        self
    }

    /// Checks the creation-time preconditions.
    ///
    /// # Errors
    ///
    /// [`CovenantError::InvalidParameters`] if the deadline is not strictly
    /// after `now`, the delay is negative, or the claim window is not positive.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.deadline <= now {
            return Err(CovenantError::InvalidParameters(format!(
                "deadline {} must be in the future (now {})",
                self.deadline, now
            )));
        }
        if self.resolution_delay_secs < 0 {
            return Err(CovenantError::InvalidParameters(
                "resolution delay must not be negative".into(),
            ));
        }
        if matches!(self.claim_window_secs, Some(w) if w <= 0) {
            return Err(CovenantError::InvalidParameters(
                "claim window must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn accepts_contributions(&self, now: DateTime<Utc>) -> bool {
        now <= self.deadline
    }

    /// Earliest instant after which the outcome may be computed (exclusive).
    pub fn resolvable_at(&self) -> DateTime<Utc> {
        self.deadline + Duration::seconds(self.resolution_delay_secs)
    }

    pub fn is_resolvable(&self, now: DateTime<Utc>) -> bool {
        now > self.resolvable_at()
    }

    /// Last instant the primary payout may be claimed, if bounded.
    pub fn claim_deadline(&self) -> Option<DateTime<Utc>> {
        self.claim_window_secs
            .map(|w| self.resolvable_at() + Duration::seconds(w))
    }

    pub fn claim_window_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.claim_deadline().map_or(false, |d| now > d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_must_be_in_the_future() {
        let now = Utc::now();
        assert!(Schedule::new(now, now).validate(now).is_err());
        assert!(Schedule::new(now, now - Duration::seconds(1))
            .validate(now)
            .is_err());
        assert!(Schedule::new(now, now + Duration::seconds(1))
            .validate(now)
            .is_ok());
    }

    #[test]
    fn deadline_instant_is_inclusive_for_contributions() {
        let now = Utc::now();
        let schedule = Schedule::new(now, now + Duration::days(1));
        assert!(schedule.accepts_contributions(schedule.deadline));
        assert!(!schedule.accepts_contributions(schedule.deadline + Duration::seconds(1)));
    }

    #[test]
    fn resolution_waits_for_delay() {
        let now = Utc::now();
        let schedule = Schedule::new(now, now + Duration::hours(1))
            .with_resolution_delay(Duration::minutes(10));

        let deadline = schedule.deadline;
        assert!(!schedule.is_resolvable(deadline + Duration::seconds(1)));
        assert!(!schedule.is_resolvable(deadline + Duration::minutes(10)));
        assert!(schedule.is_resolvable(deadline + Duration::minutes(10) + Duration::seconds(1)));
    }

    #[test]
    fn claim_window_counts_from_resolvable_time() {
        let now = Utc::now();
        let schedule = Schedule::new(now, now + Duration::hours(1))
            .with_resolution_delay(Duration::minutes(5))
            .with_claim_window(Duration::days(1));

        let cutoff = schedule.resolvable_at() + Duration::days(1);
        assert_eq!(schedule.claim_deadline(), Some(cutoff));
        assert!(!schedule.claim_window_lapsed(cutoff));
        assert!(schedule.claim_window_lapsed(cutoff + Duration::seconds(1)));
    }

    #[test]
    fn unbounded_claim_window_never_lapses() {
        let now = Utc::now();
        let schedule = Schedule::new(now, now + Duration::hours(1));
        assert!(!schedule.claim_window_lapsed(now + Duration::days(10_000)));
    }

    #[test]
    fn negative_delay_rejected() {
        let now = Utc::now();
        let schedule = Schedule::new(now, now + Duration::hours(1))
            .with_resolution_delay(Duration::seconds(-5));
        assert!(schedule.validate(now).is_err());
    }
}
