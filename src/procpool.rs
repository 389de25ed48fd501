use std::path::{Path, PathBuf};
use std::process::{Child, Command as OsCommand};
use std::time::Duration;

use crate::error::{EmsError, Result};

/// Env var the re-exec'd child reads to learn which single input file it
/// owns. Rust has no direct `fork()` in std, so the process-per-file model
/// is implemented by re-invoking the current executable with this variable
/// set; `std::process::Command::current_exe` gives the same binary.
pub const WORKER_FILE_ENV: &str = "EMS_WORKER_FILE";

/// Bounded pool of child processes, one per input file. `active_children`
/// is a plain `Vec`: linear removal is fine since `max_processes` is small.
pub struct ProcessPool {
    max_processes: usize,
    active_children: Vec<Child>,
}

impl ProcessPool {
    pub fn new(max_processes: usize) -> Self {
        Self { max_processes: max_processes.max(1), active_children: Vec::new() }
    }

    /// Runs `files` to completion, `max_processes` at a time. `access_delay`
    /// and `max_threads` are forwarded to each child as CLI arguments so
    /// every child's File Thread Pool is configured identically.
    pub fn run(
        &mut self,
        files: impl IntoIterator<Item = PathBuf>,
        max_threads: usize,
        access_delay: Duration,
    ) -> Result<()> {
        for file in files {
            while self.active_children.len() >= self.max_processes {
                self.reap_one()?;
            }
            self.spawn_child(&file, max_threads, access_delay)?;
        }
        self.wait_all()
    }

    fn spawn_child(&mut self, file: &Path, max_threads: usize, access_delay: Duration) -> Result<()> {
        let exe = std::env::current_exe().map_err(EmsError::from)?;
        let child = OsCommand::new(exe)
            .env(WORKER_FILE_ENV, file)
            .arg(max_threads.to_string())
            .arg(access_delay.as_millis().to_string())
            .spawn()
            .map_err(EmsError::from)?;
        self.active_children.push(child);
        Ok(())
    }

    /// Blocks until any one active child terminates, then removes it.
    fn reap_one(&mut self) -> Result<()> {
        loop {
            for i in 0..self.active_children.len() {
                if let Some(_status) = self.active_children[i].try_wait().map_err(EmsError::from)? {
                    self.active_children.remove(i);
                    return Ok(());
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_all(&mut self) -> Result<()> {
        for mut child in self.active_children.drain(..) {
            child.wait().map_err(EmsError::from)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_starts_empty() {
        let pool = ProcessPool::new(4);
        assert_eq!(pool.active_children.len(), 0);
        assert_eq!(pool.max_processes, 4);
    }

    #[test]
    fn zero_is_clamped_to_one() {
        let pool = ProcessPool::new(0);
        assert_eq!(pool.max_processes, 1);
    }
}
