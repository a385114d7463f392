// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Covenant Core Library
//!
//! Covenant is the engine behind a family of small value-transfer
//! agreements: lotteries, auctions, fundraisers, vesting deals, staking
//! periods, swaps, sales and token exchange offers. They look different but
//! share one hard part: a deadline-gated, single-writer state machine over
//! pooled funds, with at-most-once payout and a refund fallback.
//!
//! ## Architecture
//!
//! - **registry**: append-only, sequentially indexed entity store with a lock per entity.
//! - **machine**: the lifecycle every entity follows: Open, Locked, Resolved, Settled, Voided.
//! - **ledger**: who contributed how much, under which participation policy.
//! - **settlement**: the only code that moves value, with rollback on failure.
//! - **entropy**: scheduled reads of an external randomness source.
//! - **vault**: the asset-transfer collaborator trait and an in-memory ledger.
//! - **events**, **metrics**, **logging**: observability.
//! - **config**, **clock**, **types**, **error**: the plumbing.
//!
//! ## Invariants
//!
//! 1. `pool + paid_out == total recorded`, for every entity, after every call.
//! 2. Each party is paid at most once per payout path, and never on both the
//!    primary and the refund path.
//! 3. A contribution succeeds only while `now <= deadline`.
//! 4. Resolution is computed once; later calls return the stored outcome.

pub mod clock;
pub mod config;
pub mod entropy;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod machine;
pub mod metrics;
pub mod registry;
pub mod settlement;
pub mod types;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CovenantError, ErrorClass, Result};
pub use events::{CovenantEvent, EventSink, PayoutPath};
pub use ledger::{ContributionLedger, ContributionPolicy};
pub use machine::{EntityCore, Phase, Resolution, Schedule, VoidReason};
pub use registry::Registry;
pub use settlement::SettlementEngine;
pub use types::{Amount, AssetKind, EntityId, EntityKind, PartyId};
pub use vault::{AssetTransfer, TransferError, TransferOrder, Vault};
