//! Shared harness for the agreement integration tests.
//!
//! Wires every book to an in-memory vault, a manual clock, a local entropy
//! beacon and a recording event sink, so a test can move time and entropy
//! by hand and inspect balances and events afterwards.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use covenant_contracts::ContractContext;
use covenant_protocol::entropy::LocalBeacon;
use covenant_protocol::events::RecordingSink;
use covenant_protocol::logging::init_test_logging;
use covenant_protocol::{Amount, AssetKind, EngineConfig, ManualClock, PartyId, Vault};

pub struct Harness {
    pub vault: Arc<Vault>,
    pub clock: Arc<ManualClock>,
    pub beacon: Arc<LocalBeacon>,
    pub events: Arc<RecordingSink>,
    pub ctx: ContractContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_test_logging("warn");
        let vault = Arc::new(Vault::new());
        let clock = Arc::new(ManualClock::starting_now());
        let beacon = Arc::new(LocalBeacon::with_lookback(b"covenant-tests", config.entropy_lookback));
        let events = Arc::new(RecordingSink::new());
        let ctx = ContractContext::new(
            vault.clone(),
            clock.clone(),
            beacon.clone(),
            events.clone(),
            config,
        )
        .unwrap();
        Self {
            vault,
            clock,
            beacon,
            events,
            ctx,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn set_time(&self, to: DateTime<Utc>) {
        self.clock.set(to);
    }

    /// A party holding `amount` of `asset`.
    pub fn funded(&self, name: &str, asset: &AssetKind, amount: Amount) -> PartyId {
        let party = party(name);
        self.vault.mint(&party, asset, amount).unwrap();
        party
    }

    pub fn balance(&self, party: &PartyId, asset: &AssetKind) -> Amount {
        self.vault.balance_of(party, asset)
    }

    pub fn escrow(&self, asset: &AssetKind) -> Amount {
        self.vault.escrow_balance(asset)
    }
}

pub fn party(name: &str) -> PartyId {
    PartyId::from(name)
}

pub fn usd() -> AssetKind {
    AssetKind::token("USD")
}
