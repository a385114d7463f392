//! Shared collaborators handed to every agreement book.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use covenant_protocol::entropy::EntropySource;
use covenant_protocol::{
    AssetTransfer, Clock, CovenantError, EngineConfig, EntityKind, EventSink, PartyId, Registry,
    SettlementEngine,
};

/// Clock, entropy, event sink, settlement engine and configuration.
///
/// Cheap to clone; every book keeps its own copy.
#[derive(Clone)]
pub struct ContractContext {
    pub clock: Arc<dyn Clock>,
    pub entropy: Arc<dyn EntropySource>,
    pub events: Arc<dyn EventSink>,
    pub settlement: SettlementEngine,
    pub config: EngineConfig,
}

impl ContractContext {
    /// # Errors
    ///
    /// [`CovenantError::InvalidParameters`] if `config` fails validation.
    pub fn new(
        transfer: Arc<dyn AssetTransfer>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Result<Self, CovenantError> {
        config.validate()?;
        Ok(Self {
            settlement: SettlementEngine::new(transfer, events.clone()),
            clock,
            entropy,
            events,
            config,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A fresh, empty registry reporting to this context's event sink.
    pub fn registry<E: Clone>(&self, kind: EntityKind) -> Registry<E> {
        Registry::new(kind, self.events.clone())
    }

    /// # Errors
    ///
    /// [`CovenantError::NotAuthorized`] unless `caller == expected`.
    pub fn authorize(&self, caller: &PartyId, expected: &PartyId, action: &'static str) -> Result<(), CovenantError> {
        if caller != expected {
            return Err(CovenantError::NotAuthorized {
                party: caller.clone(),
                action,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`CovenantError::NotAuthorized`] if `caller == excluded`.
    pub fn exclude(&self, caller: &PartyId, excluded: &PartyId, action: &'static str) -> Result<(), CovenantError> {
        if caller == excluded {
            return Err(CovenantError::NotAuthorized {
                party: caller.clone(),
                action,
            });
        }
        Ok(())
    }
}
