//! # Entropy
//!
//! Winner selection reads an unpredictable value from an external source
//! (e.g. a block hash at a given height) that did not exist when
//! contributions were accepted.
//!
//! ```text
//! source.rs - EntropySource trait and LocalBeacon (in-memory hash chain)
//! handle.rs - EntropyHandle (Pending / Readable / Expired) and draw_index
//! ```
//!
//! ## Known weaknesses
//!
//! The producer of the source value can choose not to publish it, or
//! grind it, and the target unit is only an estimate derived from average
//! unit time. Neither is corrected here; if the value is never readable the
//! entity is voided and refunds open.

pub mod handle;
pub mod source;

pub use handle::{draw_index, EntropyHandle, EntropyState};
pub use source::{EntropySource, LocalBeacon};
