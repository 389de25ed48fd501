use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::context::EmsContext;
use crate::error::Result;
use crate::executor::{self, Sink};
use crate::parser::{self, Command};

/// One in-flight command, spawned per the pool's admission rule. `state`
/// carries a pending WAIT delay the dispatcher may still attach before the
/// worker's first Store access; the `Mutex` makes "has this worker already
/// started" and "attach a delay" a single atomic step, so a broadcast WAIT
/// can never race a worker past the point where the delay would apply.
struct WorkerState {
    delay: Option<Duration>,
    started: bool,
}

struct Worker {
    state: Arc<Mutex<WorkerState>>,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

enum Work {
    Cmd(Command),
    Invalid(String),
}

/// Drains a parsed command stream for one input file against a bounded pool
/// of `max_threads` workers, implementing admission, capacity recycling,
/// WAIT, and BARRIER.
pub fn drain<W, I>(ctx: &EmsContext, lines: I, sink: &Arc<Sink<W>>, max_threads: usize) -> Result<()>
where
    W: Write + Send + 'static,
    I: IntoIterator<Item = String>,
{
    let mut slots: Vec<Option<Worker>> = (0..max_threads.max(1)).map(|_| None).collect();

    for line in lines {
        let work = match parser::parse_line(&line) {
            Ok(Command::Eoc) => break,
            Ok(Command::Barrier) => {
                join_all(&mut slots);
                continue;
            }
            Ok(Command::Wait { delay_ms, thread_id }) => {
                apply_wait(&slots, Duration::from_millis(delay_ms), thread_id);
                Work::Cmd(Command::Wait { delay_ms, thread_id })
            }
            Ok(cmd) => Work::Cmd(cmd),
            Err(e) => Work::Invalid(e.to_string()),
        };

        admit(ctx, &mut slots, work, sink);
    }

    join_all(&mut slots);
    Ok(())
}

/// Broadcast (`thread_id` is `None` or `0`) or targeted WAIT: attaches the
/// delay to every admitted worker that has not yet started executing its
/// command. Workers admitted after this call are unaffected.
fn apply_wait(slots: &[Option<Worker>], delay: Duration, thread_id: Option<u32>) {
    let mark = |w: &Worker| {
        let mut st = w.state.lock().expect("worker state poisoned");
        if !st.started {
            st.delay = Some(delay);
        }
    };

    match thread_id {
        None | Some(0) => {
            for slot in slots.iter().flatten() {
                mark(slot);
            }
        }
        Some(tid) => {
            if let Some(Some(w)) = slots.get(tid as usize - 1) {
                mark(w);
            }
        }
    }
}

/// Allocates a `ThreadInfo` slot for `work` and spawns a worker to execute
/// it. When every slot is full, polls for the first inactive worker and
/// reuses its slot (joining it first).
fn admit<W>(ctx: &EmsContext, slots: &mut [Option<Worker>], work: Work, sink: &Arc<Sink<W>>)
where
    W: Write + Send + 'static,
{
    let index = reclaim_slot(slots);

    let state = Arc::new(Mutex::new(WorkerState { delay: None, started: false }));
    let active = Arc::new(AtomicBool::new(true));

    let ctx = ctx.clone();
    let sink = sink.clone();
    let state_for_thread = state.clone();
    let active_for_thread = active.clone();

    let handle = std::thread::spawn(move || {
        let delay = {
            let mut st = state_for_thread.lock().expect("worker state poisoned");
            st.started = true;
            st.delay.take()
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        match work {
            Work::Invalid(msg) => {
                let _ = sink.write_record(&format!("ERR: invalid command: {msg}\n"));
                log::warn!("invalid command: {msg}");
            }
            Work::Cmd(Command::Wait { .. }) => {
                // The worker that receives WAIT performs no further action.
            }
            Work::Cmd(cmd) => {
                if let Err(e) = executor::run_one(&ctx, &cmd, &sink) {
                    log::error!("fatal error executing command: {e}");
                }
            }
        }

        active_for_thread.store(false, Ordering::SeqCst);
    });

    slots[index] = Some(Worker { state, active, handle });
}

fn reclaim_slot(slots: &mut [Option<Worker>]) -> usize {
    if let Some(i) = slots.iter().position(|s| s.is_none()) {
        return i;
    }

    loop {
        if let Some(i) = slots.iter().position(|s| matches!(s, Some(w) if !w.active.load(Ordering::SeqCst))) {
            if let Some(w) = slots[i].take() {
                let _ = w.handle.join();
            }
            return i;
        }
        std::thread::yield_now();
    }
}

/// BARRIER and termination both join every currently-live worker; BARRIER
/// additionally leaves every slot free so the next admitted worker gets
/// thread index 1.
fn join_all(slots: &mut [Option<Worker>]) {
    for slot in slots.iter_mut() {
        if let Some(w) = slot.take() {
            let _ = w.handle.join();
        }
    }
}
