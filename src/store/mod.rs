pub mod event;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{EmsError, Result};
use event::Event;

/// Lifecycle flag plus the access delay fixed at `initialize` time. Guarded
/// by `init_lock`.
struct Lifecycle {
    initialized: bool,
    access_delay: Duration,
}

/// Owns the event list and enforces the locking discipline: `init_lock`
/// (shared by almost everything, exclusive only for initialize/terminate)
/// sits above `list_lock` (membership), which sits above each event's own
/// seat lock. No operation ever holds two event locks at once.
pub struct EventStore {
    init_lock: RwLock<Lifecycle>,
    list_lock: RwLock<Vec<Arc<Event>>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            init_lock: RwLock::new(Lifecycle { initialized: false, access_delay: Duration::ZERO }),
            list_lock: RwLock::new(Vec::new()),
        }
    }

    pub fn initialize(&self, access_delay: Duration) -> Result<()> {
        let mut lifecycle = self.init_lock.write().expect("init lock poisoned");
        if lifecycle.initialized {
            return Err(EmsError::AlreadyInitialized);
        }
        lifecycle.initialized = true;
        lifecycle.access_delay = access_delay;
        Ok(())
    }

    pub fn terminate(&self) -> Result<()> {
        let mut lifecycle = self.init_lock.write().expect("init lock poisoned");
        if !lifecycle.initialized {
            return Err(EmsError::NotInitialized);
        }
        lifecycle.initialized = false;
        self.list_lock.write().expect("list lock poisoned").clear();
        Ok(())
    }

    pub fn access_delay(&self) -> Result<Duration> {
        Ok(self.require_initialized()?.access_delay)
    }

    /// Acquires `init_lock` shared and checks the lifecycle flag, returning
    /// the held guard so callers can keep it for the duration of a
    /// subsequent `list_lock` acquisition — a concurrent `terminate` cannot
    /// slip in between the init check and the membership read/write.
    fn require_initialized(&self) -> Result<std::sync::RwLockReadGuard<'_, Lifecycle>> {
        let lifecycle = self.init_lock.read().expect("init lock poisoned");
        if !lifecycle.initialized {
            return Err(EmsError::NotInitialized);
        }
        Ok(lifecycle)
    }

    pub fn create(&self, event_id: u32, rows: usize, cols: usize) -> Result<()> {
        let lifecycle = self.require_initialized()?;
        let delay = lifecycle.access_delay;

        let mut events = self.list_lock.write().expect("list lock poisoned");
        std::thread::sleep(delay);
        if events.iter().any(|e| e.id == event_id) {
            return Err(EmsError::EventAlreadyExists(event_id));
        }
        events.push(Arc::new(Event::new(event_id, rows, cols)));
        Ok(())
    }

    pub fn lookup(&self, event_id: u32) -> Result<Arc<Event>> {
        let lifecycle = self.require_initialized()?;
        let delay = lifecycle.access_delay;

        let events = self.list_lock.read().expect("list lock poisoned");
        std::thread::sleep(delay);
        events
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or(EmsError::EventNotFound(event_id))
    }

    pub fn snapshot_ids(&self) -> Result<Vec<u32>> {
        let _lifecycle = self.require_initialized()?;
        let events = self.list_lock.read().expect("list lock poisoned");
        Ok(events.iter().map(|e| e.id).collect())
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_lookup() {
        let store = EventStore::new();
        store.initialize(Duration::ZERO).unwrap();
        store.create(1, 2, 2).unwrap();
        let event = store.lookup(1).unwrap();
        assert_eq!(event.rows, 2);
        assert_eq!(event.cols, 2);
    }

    #[test]
    fn double_initialize_is_rejected() {
        let store = EventStore::new();
        store.initialize(Duration::ZERO).unwrap();
        assert!(matches!(store.initialize(Duration::ZERO), Err(EmsError::AlreadyInitialized)));
    }

    #[test]
    fn operations_before_initialize_fail() {
        let store = EventStore::new();
        assert!(matches!(store.create(1, 1, 1), Err(EmsError::NotInitialized)));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = EventStore::new();
        store.initialize(Duration::ZERO).unwrap();
        store.create(1, 1, 1).unwrap();
        assert!(matches!(store.create(1, 1, 1), Err(EmsError::EventAlreadyExists(1))));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = EventStore::new();
        store.initialize(Duration::ZERO).unwrap();
        for id in [7, 3, 5] {
            store.create(id, 1, 1).unwrap();
        }
        assert_eq!(store.snapshot_ids().unwrap(), vec![7, 3, 5]);
    }

    #[test]
    fn terminate_clears_events() {
        let store = EventStore::new();
        store.initialize(Duration::ZERO).unwrap();
        store.create(1, 1, 1).unwrap();
        store.terminate().unwrap();
        assert!(matches!(store.lookup(1), Err(EmsError::NotInitialized)));
    }
}
