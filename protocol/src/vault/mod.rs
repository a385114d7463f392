//! # Vault: Asset Movement
//!
//! The engine's only window onto real value. Everything that leaves or
//! enters escrow goes through the [`AssetTransfer`] trait.
//!
//! ```text
//! transfer.rs - AssetTransfer trait, TransferOrder, TransferError
//! balance.rs - Vault: in-memory reference ledger with fault injection
//! ```

pub mod balance;
pub mod transfer;

pub use balance::Vault;
pub use transfer::{AssetTransfer, TransferError, TransferOrder};
