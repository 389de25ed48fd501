use std::time::Duration;

/// Explicit, scoped configuration in place of process-wide globals
/// (`state_access_delay_ms`, `thread_id_wait`, `delay_wait`). Constructed
/// once by each binary's `main` and threaded through as part of
/// `EmsContext`.
#[derive(Debug, Clone)]
pub struct EmsConfig {
    /// Sleep injected into every event lookup and seat access, simulating a
    /// slow memory resource. Load-bearing: it is what makes the lock
    /// discipline's correctness observable under concurrency.
    pub access_delay: Duration,
    /// Upper bound on concurrently-running child processes (process pool
    /// stage). Unused by the single-process server stage.
    pub max_processes: usize,
    /// Upper bound on concurrently-running worker threads per input file.
    pub max_threads: usize,
}

impl EmsConfig {
    pub fn new(access_delay: Duration, max_processes: usize, max_threads: usize) -> Self {
        Self { access_delay, max_processes, max_threads }
    }

    /// Server-stage config: no process/thread pool, just an access delay.
    pub fn for_server(access_delay: Duration) -> Self {
        Self { access_delay, max_processes: 1, max_threads: 1 }
    }
}

impl Default for EmsConfig {
    fn default() -> Self {
        Self { access_delay: Duration::from_millis(0), max_processes: 1, max_threads: 1 }
    }
}
