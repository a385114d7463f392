//! Scheduled entropy reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::source::EntropySource;
use crate::types::EntityId;

/// What polling an [`EntropyHandle`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyState {
    /// The target unit has not been produced yet.
    Pending { target: u64, current: u64 },
    /// The value is available.
    Readable([u8; 32]),
    /// The value is gone (outside the lookback) or was never served.
    Expired,
}

/// A commitment, made at creation, to read entropy from one future unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntropyHandle {
    pub target_unit: u64,
    pub lookback: u64,
}

impl EntropyHandle {
    /// Estimates the unit that will be current at `ready_at`:
    ///
    /// ```text
    /// target = current_unit + max(1, ceil((ready_at - now) / unit_time_secs))
    /// ```
    ///
    /// The estimate drifts with the producer's real unit time. That error is
    /// accepted.
    pub fn schedule(
        source: &dyn EntropySource,
        now: DateTime<Utc>,
        ready_at: DateTime<Utc>,
        unit_time_secs: u64,
        lookback: u64,
    ) -> Self {
        let secs = u64::try_from((ready_at - now).num_seconds()).unwrap_or(0);
        let units = secs.div_ceil(unit_time_secs.max(1)).max(1);
        Self {
            target_unit: source.current_unit().saturating_add(units),
            lookback,
        }
    }

    pub fn poll(&self, source: &dyn EntropySource) -> EntropyState {
        let current = source.current_unit();
        if current <= self.target_unit {
            return EntropyState::Pending {
                target: self.target_unit,
                current,
            };
        }
        if current - self.target_unit > self.lookback {
            return EntropyState::Expired;
        }
        match source.value_at(self.target_unit) {
            Some(value) => EntropyState::Readable(value),
            None => EntropyState::Expired,
        }
    }
}

/// Picks an index in `0..n` from an entropy value, salted with the entity id
/// so entities sharing a target unit draw independently.
///
/// Returns `None` when `n == 0`.
pub fn draw_index(seed: &[u8; 32], entity: EntityId, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed);
    hasher.update(&entity.to_be_bytes());
    let digest = hasher.finalize();

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    let value = u64::from_be_bytes(word);
    let index = usize::try_from(value % n as u64).ok()?;
    debug!(entity_id = entity.0, seed = %hex::encode(seed), n, index, "entropy draw");
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::LocalBeacon;
    use chrono::Duration;

    #[test]
    fn target_rounds_up_and_is_at_least_one_unit_ahead() {
        let beacon = LocalBeacon::new(b"seed");
        let now = Utc::now();

        let handle = EntropyHandle::schedule(&beacon, now, now + Duration::seconds(25), 12, 256);
        assert_eq!(handle.target_unit, beacon.current_unit() + 3);

        let handle = EntropyHandle::schedule(&beacon, now, now, 12, 256);
        assert_eq!(handle.target_unit, beacon.current_unit() + 1);
    }

    #[test]
    fn pending_then_readable_then_expired() {
        let beacon = LocalBeacon::with_lookback(b"seed", 1_000);
        let now = Utc::now();
        let handle = EntropyHandle::schedule(&beacon, now, now + Duration::seconds(24), 12, 5);

        assert!(matches!(handle.poll(&beacon), EntropyState::Pending { .. }));
        beacon.advance(2);
        assert!(matches!(handle.poll(&beacon), EntropyState::Pending { .. }));
        beacon.advance(1);
        assert!(matches!(handle.poll(&beacon), EntropyState::Readable(_)));
        beacon.advance(4);
        assert!(matches!(handle.poll(&beacon), EntropyState::Readable(_)));
        beacon.advance(1);
        assert_eq!(handle.poll(&beacon), EntropyState::Expired);
    }

    #[test]
    fn source_forgetting_the_value_expires_the_handle() {
        let beacon = LocalBeacon::with_lookback(b"seed", 2);
        let now = Utc::now();
        let handle = EntropyHandle::schedule(&beacon, now, now, 12, 256);
        beacon.advance(5);
        assert_eq!(handle.poll(&beacon), EntropyState::Expired);
    }

    #[test]
    fn draw_index_is_deterministic_and_in_range() {
        let seed = [7u8; 32];
        let a = draw_index(&seed, EntityId(1), 3).unwrap();
        assert_eq!(draw_index(&seed, EntityId(1), 3), Some(a));
        assert!(a < 3);
        assert_eq!(draw_index(&seed, EntityId(1), 0), None);
    }
}
