//! # Settlement
//!
//! Everything that moves value out of (or into) an entity goes through the
//! [`SettlementEngine`], which keeps entity bookkeeping and the external
//! ledger in step and enforces at-most-once payout.
//!
//! ```text
//! engine.rs  - two-phase payouts, refunds, releases, atomic exchanges
//! pro_rata.rs - fixed-point reward distribution (PRECISION = 10^18)
//! ```

pub mod engine;
pub mod pro_rata;

pub use engine::SettlementEngine;
