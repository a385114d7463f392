//! # Lifecycle Events
//!
//! Every state change the engine makes is announced to an [`EventSink`].
//! Sinks are the observer hook hosts attach indexers, notifications or
//! metrics to; the engine never depends on what they do with an event.
//!
//! Three sinks ship with the crate:
//!
//! - [`TracingSink`] writes each event as a structured `tracing` record.
//! - [`RecordingSink`] keeps events in memory for assertions.
//! - [`FanoutSink`] forwards to several sinks in order.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{Amount, AssetKind, EntityId, EntityKind, PartyId};
use crate::vault::TransferOrder;

// ---------------------------------------------------------------------------
// PayoutPath
// ---------------------------------------------------------------------------

/// Which payout path moved value out of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutPath {
    /// The outcome's designated payout (winner, beneficiary, seller).
    Primary,
    /// A party taking back its own contribution.
    Refund,
    /// A partial release of pooled value (vesting, remainders, dust).
    Release,
}

impl std::fmt::Display for PayoutPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayoutPath::Primary => write!(f, "primary"),
            PayoutPath::Refund => write!(f, "refund"),
            PayoutPath::Release => write!(f, "release"),
        }
    }
}

// ---------------------------------------------------------------------------
// CovenantEvent
// ---------------------------------------------------------------------------

/// Something that happened to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CovenantEvent {
    Created {
        id: EntityId,
        kind: EntityKind,
        creator: PartyId,
    },
    /// A contribution entered the pool.
    Contributed {
        id: EntityId,
        party: PartyId,
        asset: AssetKind,
        amount: Amount,
    },
    /// Value outside the pool (an escrowed item, a reward deposit, a swap
    /// leg) was pulled into escrow.
    Collected {
        id: EntityId,
        from: PartyId,
        asset: AssetKind,
        amount: Amount,
    },
    Resolved {
        id: EntityId,
        outcome: String,
    },
    Voided {
        id: EntityId,
        reason: String,
    },
    Paid {
        id: EntityId,
        to: PartyId,
        asset: AssetKind,
        amount: Amount,
        path: PayoutPath,
    },
    /// A payout's transfer failed and its reservation was rolled back.
    PayoutReverted {
        id: EntityId,
        to: PartyId,
        amount: Amount,
        error: String,
    },
    /// A multi-leg exchange settled atomically. Legs from or to the escrow
    /// account move value out of or into escrow.
    Exchanged {
        id: EntityId,
        legs: Vec<TransferOrder>,
    },
    /// The entity record was removed from its registry.
    Cleared {
        id: EntityId,
    },
}

impl CovenantEvent {
    pub fn entity_id(&self) -> EntityId {
        match self {
            CovenantEvent::Created { id, .. }
            | CovenantEvent::Contributed { id, .. }
            | CovenantEvent::Collected { id, .. }
            | CovenantEvent::Resolved { id, .. }
            | CovenantEvent::Voided { id, .. }
            | CovenantEvent::Paid { id, .. }
            | CovenantEvent::PayoutReverted { id, .. }
            | CovenantEvent::Exchanged { id, .. }
            | CovenantEvent::Cleared { id } => *id,
        }
    }

    /// Short stable name, used as a metrics label and log field.
    pub fn name(&self) -> &'static str {
        match self {
            CovenantEvent::Created { .. } => "created",
            CovenantEvent::Contributed { .. } => "contributed",
            CovenantEvent::Collected { .. } => "collected",
            CovenantEvent::Resolved { .. } => "resolved",
            CovenantEvent::Voided { .. } => "voided",
            CovenantEvent::Paid { .. } => "paid",
            CovenantEvent::PayoutReverted { .. } => "payout_reverted",
            CovenantEvent::Exchanged { .. } => "exchanged",
            CovenantEvent::Cleared { .. } => "cleared",
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives every event the engine emits. Called while the entity's lock is
/// held, so implementations must not call back into the same registry.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CovenantEvent);
}

/// Logs every event at `info` with the event serialized as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &CovenantEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        info!(
            entity_id = event.entity_id().0,
            event = event.name(),
            %payload,
            "covenant event"
        );
    }
}

/// Stores events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CovenantEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CovenantEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, id: EntityId) -> Vec<CovenantEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.entity_id() == id)
            .cloned()
            .collect()
    }

    /// Number of recorded events with the given [`CovenantEvent::name`].
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &CovenantEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &CovenantEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_filters_by_entity() {
        let sink = RecordingSink::new();
        sink.emit(&CovenantEvent::Cleared { id: EntityId(1) });
        sink.emit(&CovenantEvent::Cleared { id: EntityId(2) });
        sink.emit(&CovenantEvent::Exchanged {
            id: EntityId(1),
            legs: Vec::new(),
        });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.events_for(EntityId(1)).len(), 2);
        assert_eq!(sink.count("cleared"), 2);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());

        fanout.emit(&CovenantEvent::Voided {
            id: EntityId(0),
            reason: "cancelled".into(),
        });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = CovenantEvent::Paid {
            id: EntityId(3),
            to: PartyId::from("alice"),
            asset: AssetKind::Native,
            amount: 30,
            path: PayoutPath::Primary,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "paid");
        assert_eq!(json["amount"], 30);
    }
}
