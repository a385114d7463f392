//! Integration tests for the engine's building blocks working together.
//!
//! A registry of generic entities, a settlement engine over the in-memory
//! vault, and the metrics sink are composed here without any agreement
//! rules on top. The tests check the accounting properties every agreement
//! relies on: value is conserved, payouts happen at most once, and concurrent
//! operations on one entity serialize.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use covenant_protocol::events::{FanoutSink, RecordingSink};
use covenant_protocol::metrics::CovenantMetrics;
use covenant_protocol::{
    AssetKind, ContributionPolicy, CovenantError, EntityCore, EntityId, EntityKind, EventSink,
    PartyId, Phase, Registry, Resolution, Schedule, SettlementEngine, TransferOrder, Vault,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// `true` once decided means "the creator takes the pool".
type Pool = EntityCore<bool>;

struct Stack {
    vault: Arc<Vault>,
    sink: Arc<RecordingSink>,
    engine: SettlementEngine,
    registry: Registry<Pool>,
    start: DateTime<Utc>,
}

fn stack_with(events: Arc<dyn EventSink>, sink: Arc<RecordingSink>) -> Stack {
    let vault = Arc::new(Vault::new());
    let engine = SettlementEngine::new(vault.clone(), events.clone());
    Stack {
        vault,
        sink,
        engine,
        registry: Registry::new(EntityKind::Fundraiser, events),
        start: Utc::now(),
    }
}

fn stack() -> Stack {
    let sink = Arc::new(RecordingSink::new());
    stack_with(sink.clone(), sink)
}

fn open(stack: &Stack, deadline: Duration) -> EntityId {
    let creator = PartyId::from("creator");
    stack
        .registry
        .create_with(&creator, |id| {
            Ok::<_, CovenantError>(EntityCore::new(
                id,
                EntityKind::Fundraiser,
                creator.clone(),
                AssetKind::Native,
                Schedule::new(stack.start, stack.start + deadline),
                ContributionPolicy::Accumulate,
            ))
        })
        .unwrap()
}

fn contribute(stack: &Stack, id: EntityId, party: &PartyId, amount: u64) -> Result<u64, CovenantError> {
    stack
        .registry
        .with_entity(id, |core| stack.engine.accept(core, stack.start, party, amount))
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[test]
fn randomized_contributions_and_payouts_conserve_value() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let s = stack();
    let parties: Vec<PartyId> = (0..20).map(|i| PartyId::new(format!("p{}", i))).collect();
    for p in &parties {
        s.vault.mint(p, &AssetKind::Native, 1_000).unwrap();
    }
    let supply = s.vault.total_supply(&AssetKind::Native);

    let ids: Vec<EntityId> = (0..4).map(|_| open(&s, Duration::days(1))).collect();

    for _ in 0..400 {
        let id = ids[rng.gen_range(0..ids.len())];
        let party = &parties[rng.gen_range(0..parties.len())];
        let amount = rng.gen_range(1..=120);
        if rng.gen_bool(0.05) {
            s.vault.fail_next(1);
        }
        // Failures (balance or injected) must leave no trace.
        let _ = contribute(&s, id, party, amount);

        let core = s.registry.get(id).unwrap();
        assert!(core.is_conserved());
    }

    let pooled: u64 = ids.iter().map(|id| s.registry.get(*id).unwrap().pool()).sum();
    assert_eq!(s.vault.escrow_balance(&AssetKind::Native), pooled);

    // Half the entities pay the creator, the other half refund everyone.
    let later = s.start + Duration::days(1) + Duration::seconds(1);
    for (n, id) in ids.iter().enumerate() {
        let creator_takes = n % 2 == 0;
        s.registry
            .with_entity(*id, |core| {
                s.engine
                    .resolve(core, later, |_| Ok(Resolution::Decided(creator_takes)))?;
                if creator_takes {
                    let pool = core.pool();
                    if pool > 0 {
                        s.engine.pay_primary(core, &PartyId::from("creator"), pool)?;
                    }
                } else {
                    for p in &parties {
                        if core.amount_of(p) > 0 {
                            s.engine.refund(core, p)?;
                        }
                    }
                }
                Ok::<_, CovenantError>(())
            })
            .unwrap();

        let core = s.registry.get(*id).unwrap();
        assert_eq!(core.pool(), 0);
        assert!(core.is_conserved());
    }

    assert_eq!(s.vault.escrow_balance(&AssetKind::Native), 0);
    assert_eq!(s.vault.total_supply(&AssetKind::Native), supply);
}

#[test]
fn each_party_is_paid_at_most_once() {
    let s = stack();
    let alice = PartyId::from("alice");
    s.vault.mint(&alice, &AssetKind::Native, 100).unwrap();
    let id = open(&s, Duration::hours(1));
    contribute(&s, id, &alice, 60).unwrap();

    let later = s.start + Duration::hours(2);
    let refund = || {
        s.registry.with_entity(id, |core| {
            s.engine
                .resolve(core, later, |_| Ok(Resolution::Decided(false)))?;
            s.engine.refund(core, &alice)
        })
    };

    assert_eq!(refund().unwrap(), 60);
    assert!(matches!(refund(), Err(CovenantError::AlreadyClaimed { .. })));
    assert_eq!(s.vault.balance_of(&alice, &AssetKind::Native), 100);
    assert_eq!(s.sink.count("paid"), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_contributions_serialize_per_entity() {
    let s = stack();
    let id = open(&s, Duration::days(1));
    let parties: Vec<PartyId> = (0..8).map(|i| PartyId::new(format!("t{}", i))).collect();
    for p in &parties {
        s.vault.mint(p, &AssetKind::Native, 50).unwrap();
    }

    std::thread::scope(|scope| {
        for p in &parties {
            let s = &s;
            scope.spawn(move || {
                for _ in 0..50 {
                    contribute(s, id, p, 1).unwrap();
                }
            });
        }
    });

    let core = s.registry.get(id).unwrap();
    assert_eq!(core.pool(), 400);
    assert_eq!(core.ledger().participant_count(), 8);
    assert!(core.is_conserved());
    assert_eq!(s.vault.escrow_balance(&AssetKind::Native), 400);
    assert_eq!(s.sink.count("contributed"), 400);
}

#[test]
fn ids_are_sequential_and_never_reused() {
    let s = stack();
    let first = open(&s, Duration::days(1));
    let second = open(&s, Duration::days(1));
    assert_eq!((first, second), (EntityId(0), EntityId(1)));

    s.registry
        .with_slot(first, |slot| {
            *slot = None;
            Ok::<_, CovenantError>(())
        })
        .unwrap();

    assert_eq!(open(&s, Duration::days(1)), EntityId(2));
    assert_eq!(s.registry.ids(), vec![EntityId(1), EntityId(2)]);
    assert_eq!(s.sink.count("cleared"), 1);
}

// ---------------------------------------------------------------------------
// Phases and metrics
// ---------------------------------------------------------------------------

#[test]
fn phases_follow_time_and_payouts() {
    let s = stack();
    let alice = PartyId::from("alice");
    s.vault.mint(&alice, &AssetKind::Native, 10).unwrap();
    let id = open(&s, Duration::hours(1));
    contribute(&s, id, &alice, 10).unwrap();

    let phase_at = |offset: Duration| {
        s.registry
            .with_entity(id, |core| Ok::<_, CovenantError>(s.engine.observe(core, s.start + offset)))
            .unwrap()
    };
    assert_eq!(phase_at(Duration::hours(1)), Phase::Open);
    assert_eq!(phase_at(Duration::hours(1) + Duration::seconds(1)), Phase::Locked);

    let later = s.start + Duration::hours(2);
    s.registry
        .with_entity(id, |core| {
            s.engine
                .resolve(core, later, |_| Ok(Resolution::Decided(true)))?;
            assert_eq!(core.phase(), Phase::Resolved);
            s.engine.pay_primary(core, &PartyId::from("creator"), 10)
        })
        .unwrap();
    assert_eq!(s.registry.get(id).unwrap().phase(), Phase::Settled);
}

#[test]
fn metrics_follow_the_event_stream() {
    let sink = Arc::new(RecordingSink::new());
    let metrics = Arc::new(CovenantMetrics::new().unwrap());
    let fanout: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(sink.clone())
            .with(metrics.clone()),
    );
    let s = stack_with(fanout, sink);
    let alice = PartyId::from("alice");
    s.vault.mint(&alice, &AssetKind::Native, 100).unwrap();

    let id = open(&s, Duration::hours(1));
    contribute(&s, id, &alice, 40).unwrap();
    contribute(&s, id, &alice, 2).unwrap();

    assert_eq!(metrics.contributions_total.get(), 2);
    assert_eq!(metrics.escrow_value.with_label_values(&["native"]).get(), 42);
    assert_eq!(
        metrics
            .entities_created_total
            .with_label_values(&["fundraiser"])
            .get(),
        1
    );
    let text = metrics.encode().unwrap();
    assert!(text.contains("covenant_contributions_total 2"));
    assert_eq!(s.sink.count("contributed"), 2);

    // An escrowed item sold for native value leaves escrow through an
    // exchange, not a payout.
    let ape = AssetKind::item("apes", 9);
    let seller = PartyId::from("seller");
    s.vault.mint(&seller, &ape, 1).unwrap();
    let mut listing: EntityCore<()> = EntityCore::new(
        EntityId(99),
        EntityKind::Listing,
        seller.clone(),
        ape.clone(),
        Schedule::new(s.start, s.start + Duration::days(1)),
        ContributionPolicy::SingleTicket { price: 1 },
    );
    s.engine.accept(&mut listing, s.start, &seller, 1).unwrap();
    assert_eq!(metrics.escrow_value.with_label_values(&["apes"]).get(), 1);

    s.engine
        .release_with(
            &mut listing,
            1,
            &[
                TransferOrder::new(ape.clone(), PartyId::escrow(), alice.clone(), 1),
                TransferOrder::new(AssetKind::Native, alice.clone(), seller, 30),
            ],
        )
        .unwrap();

    assert_eq!(s.vault.escrow_balance(&ape), 0);
    assert_eq!(metrics.escrow_value.with_label_values(&["apes"]).get(), 0);
    assert_eq!(metrics.escrow_value.with_label_values(&["native"]).get(), 42);
    assert_eq!(metrics.exchanges_total.get(), 1);
}
