//! # Entity Registry
//!
//! Append-only store of one agreement family. Ids are sequential from zero
//! and never reused, even after a record is cleared.
//!
//! ## Locking
//!
//! ```text
//! creating: Mutex<()>                     serializes creations only
//! slots: RwLock<Vec<Arc<Mutex<Option<E>>>>>
//!          │           │
//!          │           └── per-entity lock, held for a whole operation
//!          └── taken for writing only to append a built entity
//! ```
//!
//! Operations on different entities never contend beyond a brief read lock
//! on the slot list. Operations on the same entity are serialized by its
//! mutex, which is held across the synchronous asset transfer. A creation
//! whose build step pulls value into escrow blocks other creations of the
//! same kind, never reads or operations on existing entities.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::CovenantError;
use crate::events::{CovenantEvent, EventSink};
use crate::types::{EntityId, EntityKind, PartyId};

type Slot<E> = Arc<Mutex<Option<E>>>;

/// Sequentially indexed entities of one kind.
pub struct Registry<E> {
    kind: EntityKind,
    creating: Mutex<()>,
    slots: RwLock<Vec<Slot<E>>>,
    events: Arc<dyn EventSink>,
}

impl<E: Clone> Registry<E> {
    pub fn new(kind: EntityKind, events: Arc<dyn EventSink>) -> Self {
        Self {
            kind,
            creating: Mutex::new(()),
            slots: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Builds and stores a new entity under the next id.
    ///
    /// `build` receives the id the entity will have. If it fails, nothing is
    /// stored and the id is not consumed. Creations are serialized with each
    /// other; the slot list itself is only write-locked for the append.
    pub fn create_with<F, Er>(&self, creator: &PartyId, build: F) -> Result<EntityId, Er>
    where
        F: FnOnce(EntityId) -> Result<E, Er>,
    {
        let id = {
            let _creating = self.creating.lock();
            let id = EntityId(self.slots.read().len() as u64);
            let entity = build(id)?;
            self.slots.write().push(Arc::new(Mutex::new(Some(entity))));
            id
        };

        debug!(entity_id = id.0, kind = %self.kind, creator = %creator, "entity created");
        self.events.emit(&CovenantEvent::Created {
            id,
            kind: self.kind,
            creator: creator.clone(),
        });
        Ok(id)
    }

    /// `true` if `id` was assigned and its record has not been cleared.
    pub fn exists(&self, id: EntityId) -> bool {
        self.slot(id).map_or(false, |slot| slot.lock().is_some())
    }

    /// Snapshot of the entity. `None` for unknown or cleared ids.
    pub fn get(&self, id: EntityId) -> Option<E> {
        self.slot(id)?.lock().clone()
    }

    /// Runs `f` with exclusive access to the entity.
    ///
    /// # Errors
    ///
    /// [`CovenantError::EntityNotFound`] for unknown or cleared ids, plus
    /// whatever `f` returns.
    pub fn with_entity<T, F, Er>(&self, id: EntityId, f: F) -> Result<T, Er>
    where
        F: FnOnce(&mut E) -> Result<T, Er>,
        Er: From<CovenantError>,
    {
        let slot = self.slot(id).ok_or(CovenantError::EntityNotFound(id))?;
        let mut guard = slot.lock();
        let entity = guard.as_mut().ok_or(CovenantError::EntityNotFound(id))?;
        f(entity)
    }

    /// Like [`with_entity`](Self::with_entity), but `f` may clear the record
    /// by taking it out of the slot. A [`CovenantEvent::Cleared`] is emitted
    /// when that happens.
    pub fn with_slot<T, F, Er>(&self, id: EntityId, f: F) -> Result<T, Er>
    where
        F: FnOnce(&mut Option<E>) -> Result<T, Er>,
        Er: From<CovenantError>,
    {
        let slot = self.slot(id).ok_or(CovenantError::EntityNotFound(id))?;
        let mut guard = slot.lock();
        if guard.is_none() {
            return Err(CovenantError::EntityNotFound(id).into());
        }

        let result = f(&mut guard);
        if guard.is_none() {
            debug!(entity_id = id.0, kind = %self.kind, "entity record cleared");
            self.events.emit(&CovenantEvent::Cleared { id });
        }
        result
    }

    /// Number of ids assigned so far, cleared records included.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live (not cleared) entity, in creation order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots
            .read()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.lock().is_some())
            .map(|(i, _)| EntityId(i as u64))
            .collect()
    }

    fn slot(&self, id: EntityId) -> Option<Slot<E>> {
        let index = usize::try_from(id.0).ok()?;
        self.slots.read().get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;

    fn registry() -> (Registry<u64>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (Registry::new(EntityKind::Swap, sink.clone()), sink)
    }

    #[test]
    fn ids_are_sequential_from_zero() {
        let (registry, sink) = registry();
        let creator = PartyId::from("alice");
        let a = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(10))
            .unwrap();
        let b = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(20))
            .unwrap();

        assert_eq!(a, EntityId(0));
        assert_eq!(b, EntityId(1));
        assert_eq!(registry.get(b), Some(20));
        assert_eq!(sink.count("created"), 2);
    }

    #[test]
    fn failed_build_consumes_no_id() {
        let (registry, sink) = registry();
        let creator = PartyId::from("alice");
        let result = registry.create_with(&creator, |_| {
            Err::<u64, _>(CovenantError::InvalidParameters("no".into()))
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
        assert_eq!(sink.count("created"), 0);

        let id = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(1))
            .unwrap();
        assert_eq!(id, EntityId(0));
    }

    #[test]
    fn existing_entities_stay_usable_while_one_is_built() {
        let (registry, _) = registry();
        let creator = PartyId::from("alice");
        let first = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(5))
            .unwrap();

        let second = registry
            .create_with(&creator, |id| {
                assert_eq!(registry.get(first), Some(5));
                registry.with_entity(first, |value| {
                    *value += 1;
                    Ok::<_, CovenantError>(())
                })?;
                assert!(!registry.exists(id));
                Ok::<_, CovenantError>(7)
            })
            .unwrap();

        assert_eq!(second, EntityId(1));
        assert_eq!(registry.get(first), Some(6));
        assert_eq!(registry.ids(), vec![first, second]);
    }

    #[test]
    fn unknown_ids_are_absent_not_errors_for_reads() {
        let (registry, _) = registry();
        assert!(!registry.exists(EntityId(7)));
        assert_eq!(registry.get(EntityId(7)), None);

        let result: Result<(), CovenantError> = registry.with_entity(EntityId(7), |_| Ok(()));
        assert_eq!(result, Err(CovenantError::EntityNotFound(EntityId(7))));
    }

    #[test]
    fn with_entity_mutates_in_place() {
        let (registry, _) = registry();
        let id = registry
            .create_with(&PartyId::from("alice"), |_| Ok::<_, CovenantError>(1))
            .unwrap();
        registry
            .with_entity(id, |value| {
                *value += 41;
                Ok::<_, CovenantError>(())
            })
            .unwrap();
        assert_eq!(registry.get(id), Some(42));
    }

    #[test]
    fn cleared_records_keep_their_id() {
        let (registry, sink) = registry();
        let creator = PartyId::from("alice");
        let id = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(5))
            .unwrap();

        registry
            .with_slot(id, |slot| {
                slot.take();
                Ok::<_, CovenantError>(())
            })
            .unwrap();

        assert!(!registry.exists(id));
        assert_eq!(registry.len(), 1);
        assert!(registry.ids().is_empty());
        assert_eq!(sink.count("cleared"), 1);

        let next = registry
            .create_with(&creator, |_| Ok::<_, CovenantError>(6))
            .unwrap();
        assert_eq!(next, EntityId(1));
    }
}
