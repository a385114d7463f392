//! Fixed-point pro-rata distribution.
//!
//! ```text
//! reward_per_unit = reward_pool * PRECISION / total_stake
//! share(stake)    = stake * reward_per_unit / PRECISION
//! ```
//!
//! All intermediate values are `u128`. Each share rounds down, so the sum of
//! shares never exceeds the reward pool; the remainder is dust.

use crate::config::PRECISION;
use crate::error::{CovenantError, Result};
use crate::types::Amount;

/// Reward per staked unit, scaled by [`PRECISION`].
///
/// # Errors
///
/// [`CovenantError::InvalidParameters`] if `total_stake` is zero.
pub fn reward_per_unit(reward_pool: Amount, total_stake: Amount) -> Result<u128> {
    if total_stake == 0 {
        return Err(CovenantError::InvalidParameters(
            "cannot distribute over zero stake".into(),
        ));
    }
    Ok(u128::from(reward_pool) * PRECISION / u128::from(total_stake))
}

/// The reward owed to `stake`, rounded down.
pub fn share(stake: Amount, reward_per_unit: u128) -> Result<Amount> {
    let scaled = u128::from(stake)
        .checked_mul(reward_per_unit)
        .ok_or(CovenantError::AmountOverflow)?;
    Amount::try_from(scaled / PRECISION).map_err(|_| CovenantError::AmountOverflow)
}

/// `amount * rate / PRECISION`, for prices quoted as a scaled rate.
pub fn scale(amount: Amount, rate: u128) -> Result<Amount> {
    share(amount, rate)
}
