//! # Engine Configuration & Constants
//!
//! Every magic number in Covenant lives here. The constants are the
//! defaults; [`EngineConfig`] is the runtime-tunable subset that hosts load
//! from JSON and hand to the contract books.

use serde::{Deserialize, Serialize};

use crate::error::CovenantError;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Address of the escrow account that holds every pooled contribution.
pub const ESCROW_PARTY: &str = "covenant:escrow";

// ---------------------------------------------------------------------------
// Fixed-Point Arithmetic
// ---------------------------------------------------------------------------

/// Scale factor for pro-rata reward math and exchange rates. 18 decimals,
/// evaluated in `u128`, so `u64` amounts times `PRECISION` never overflow.
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Entropy
// ---------------------------------------------------------------------------

/// How many units back an entropy value remains readable once produced.
/// Mirrors the 256-block lookback of a block-hash beacon.
pub const DEFAULT_ENTROPY_LOOKBACK: u64 = 256;

/// Average wall-clock seconds per entropy unit, used to estimate which unit
/// will exist at a given future time. An estimate, not a guarantee: real
/// unit times drift and the resolvable window drifts with them.
pub const DEFAULT_UNIT_TIME_SECS: u64 = 12;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Default wait after a lottery deadline before the draw may happen.
/// Five minutes lets the entropy unit after the deadline get produced.
pub const DEFAULT_RESOLUTION_DELAY_SECS: i64 = 300;

/// Default window in which a drawn winner must claim. After it lapses the
/// lottery is voided and every ticket becomes refundable.
pub const DEFAULT_CLAIM_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Runtime parameters shared by all contract books.
///
/// Missing fields fall back to the constants above, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Units an entropy value stays readable after it is produced.
    pub entropy_lookback: u64,
    /// Estimated seconds per entropy unit.
    pub unit_time_secs: u64,
    /// Resolution delay for entropy-drawn agreements that do not set one.
    pub resolution_delay_secs: i64,
    /// Claim window for winner-take-all agreements that do not set one.
    pub claim_window_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entropy_lookback: DEFAULT_ENTROPY_LOOKBACK,
            unit_time_secs: DEFAULT_UNIT_TIME_SECS,
            resolution_delay_secs: DEFAULT_RESOLUTION_DELAY_SECS,
            claim_window_secs: DEFAULT_CLAIM_WINDOW_SECS,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`CovenantError::InvalidParameters`] on malformed JSON or on
    /// any value rejected by [`validate`](Self::validate).
    pub fn from_json_str(raw: &str) -> Result<Self, CovenantError> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| CovenantError::InvalidParameters(format!("engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the engine cannot operate with.
    pub fn validate(&self) -> Result<(), CovenantError> {
        if self.entropy_lookback == 0 {
            return Err(CovenantError::InvalidParameters(
                "entropy_lookback must be at least 1".into(),
            ));
        }
        if self.unit_time_secs == 0 {
            return Err(CovenantError::InvalidParameters(
                "unit_time_secs must be positive".into(),
            ));
        }
        if self.resolution_delay_secs < 0 {
            return Err(CovenantError::InvalidParameters(
                "resolution_delay_secs must not be negative".into(),
            ));
        }
        if self.claim_window_secs <= 0 {
            return Err(CovenantError::InvalidParameters(
                "claim_window_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = EngineConfig::from_json_str(r#"{"unit_time_secs": 2}"#).unwrap();
        assert_eq!(config.unit_time_secs, 2);
        assert_eq!(config.entropy_lookback, DEFAULT_ENTROPY_LOOKBACK);
    }

    #[test]
    fn zero_lookback_rejected() {
        let result = EngineConfig::from_json_str(r#"{"entropy_lookback": 0}"#);
        assert!(matches!(result, Err(CovenantError::InvalidParameters(_))));
    }

    #[test]
    fn malformed_json_rejected() {
        let result = EngineConfig::from_json_str("{not json");
        assert!(matches!(result, Err(CovenantError::InvalidParameters(_))));
    }

    #[test]
    fn precision_leaves_headroom_for_u64_amounts() {
        // u64::MAX * PRECISION must fit in u128 for the pro-rata math.
        assert!((u64::MAX as u128).checked_mul(PRECISION).is_some());
    }
}
