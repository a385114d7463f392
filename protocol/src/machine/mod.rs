//! # Entity State Machine
//!
//! Deadline-gated lifecycle shared by every agreement:
//!
//! ```text
//! phase.rs    - Phase, VoidReason, Resolution
//! schedule.rs - deadline, resolution delay, claim window
//! entity.rs   - EntityCore: pool, ledger, memoized outcome, lazy transitions
//! ```

pub mod entity;
pub mod phase;
pub mod schedule;

pub use entity::{EntityCore, VoidRecord};
pub use phase::{Phase, Resolution, VoidReason};
pub use schedule::Schedule;
