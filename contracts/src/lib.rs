//! # Covenant Agreements
//!
//! The agreement families built on the `covenant-protocol` engine. Each one
//! is a thin set of business rules over the same deadline-gated state
//! machine:
//!
//! - **Fundraiser**: donations until a deadline; the beneficiary withdraws
//!   if the goal is met, donors refund otherwise.
//! - **Lottery**: one fixed-price ticket per party; the winner is drawn from
//!   scheduled entropy and claims the pool within a claim window.
//! - **Auction**: English auction for a unique item with pending-return
//!   withdrawals and a reserve price.
//! - **Staking**: fixed reward pool split pro rata over stakes.
//! - **Vesting**: linear release with a cliff, revocable by the funder.
//! - **Swap**: two parties exchange escrowed assets atomically.
//! - **Marketplace**: fixed-price sale of an escrowed item.
//! - **Exchange**: fixed-rate token sale in partial fills.
//!
//! ## Design Principles
//!
//! 1. Every book owns a [`Registry`](covenant_protocol::Registry) and holds
//!    an entity's lock for the whole of an operation, transfers included.
//! 2. Value only moves through the
//!    [`SettlementEngine`](covenant_protocol::SettlementEngine), which
//!    reserves before transferring and rolls back on failure.
//! 3. Outcomes are computed once and memoized; later calls see the same
//!    answer whatever the time.
//! 4. Every public type is serializable (serde) for snapshots and events.

pub mod auction;
pub mod context;
pub mod error;
pub mod exchange;
pub mod fundraiser;
pub mod lottery;
pub mod marketplace;
pub mod staking;
pub mod swap;
pub mod vesting;

pub use auction::{Auction, AuctionBook, AuctionOutcome, AuctionParams};
pub use context::ContractContext;
pub use error::{ContractError, ContractResult};
pub use exchange::{ExchangeBook, ExchangeOffer, ExchangeOutcome, ExchangeParams};
pub use fundraiser::{Fundraiser, FundraiserBook, FundraiserOutcome, FundraiserParams};
pub use lottery::{Lottery, LotteryBook, LotteryOutcome, LotteryParams};
pub use marketplace::{Listing, ListingBook, ListingOutcome, ListingParams, ListingStatus};
pub use staking::{StakingBook, StakingOutcome, StakingParams, StakingPeriod};
pub use swap::{Swap, SwapBook, SwapExecuted, SwapLeg, SwapParams, SwapStatus, SwapTerms};
pub use vesting::{VestingBook, VestingCompleted, VestingParams, VestingSchedule};
