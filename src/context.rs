use std::sync::Arc;

use crate::config::EmsConfig;
use crate::store::EventStore;

/// Explicit state in place of process-wide globals (`event_list`,
/// `state_access_delay_ms`, `thread_id_wait`, `delay_wait`). One
/// `EmsContext` is owned by each binary's `main` and cloned (cheaply, via
/// the inner `Arc`s) into every worker thread.
#[derive(Clone)]
pub struct EmsContext {
    pub store: Arc<EventStore>,
    pub config: Arc<EmsConfig>,
}

impl EmsContext {
    pub fn new(config: EmsConfig) -> Self {
        Self { store: Arc::new(EventStore::new()), config: Arc::new(config) }
    }
}
