pub mod wire;

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::context::EmsContext;
use crate::error::{EmsError, Result};
use wire::OpCode;

/// Fixed size of the server's worker-thread pool: a fixed-size slot table
/// of `MAX_SESSIONS` concurrent sessions.
pub const MAX_SESSIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Claimed,
    Active,
    Closing,
}

struct SlotData {
    state: SlotState,
    request_fifo: String,
    response_fifo: String,
}

/// One persistent worker-thread binding. Workers are spawned once at
/// startup and re-enter their wait for the next `Claimed` notification —
/// each is bound to its slot for the lifetime of the server.
struct Slot {
    data: Mutex<SlotData>,
    claimed: Condvar,
}

/// A long-running daemon serving up to `MAX_SESSIONS` concurrent clients
/// over named FIFOs.
pub struct SessionServer {
    ctx: EmsContext,
    slots: Arc<Vec<Slot>>,
    free_count: Arc<(Mutex<usize>, Condvar)>,
    closing: Arc<AtomicBool>,
    /// Path of the well-known server FIFO, recorded once `run()` has
    /// created it so `shutdown()` can open it for write and unstick the
    /// accept loop's blocking `open()` read.
    server_pipe: Mutex<Option<String>>,
}

impl SessionServer {
    pub fn new(ctx: EmsContext) -> Self {
        let slots = Arc::new(
            (0..MAX_SESSIONS)
                .map(|_| Slot {
                    data: Mutex::new(SlotData {
                        state: SlotState::Free,
                        request_fifo: String::new(),
                        response_fifo: String::new(),
                    }),
                    claimed: Condvar::new(),
                })
                .collect(),
        );
        Self {
            ctx,
            slots,
            free_count: Arc::new((Mutex::new(MAX_SESSIONS), Condvar::new())),
            closing: Arc::new(AtomicBool::new(false)),
            server_pipe: Mutex::new(None),
        }
    }

    /// Creates the server FIFO, spawns the persistent worker pool, then
    /// blocks the calling thread accepting connect handshakes until
    /// `shutdown()` is called from another thread (typically the SIGINT
    /// handler installed by the `ems-server` binary).
    pub fn run(&self, server_pipe: &str) -> Result<()> {
        if fs::metadata(server_pipe).is_ok() {
            fs::remove_file(server_pipe).map_err(EmsError::from)?;
        }
        mkfifo(server_pipe, Mode::from_bits_truncate(0o666))
            .map_err(|e| EmsError::FifoProtocolError(format!("mkfifo failed: {e}")))?;

        *self.server_pipe.lock().expect("server pipe lock poisoned") = Some(server_pipe.to_string());

        let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(MAX_SESSIONS);
        for index in 0..MAX_SESSIONS {
            let ctx = self.ctx.clone();
            let slots = self.slots.clone();
            let free_count = self.free_count.clone();
            let closing = self.closing.clone();
            workers.push(std::thread::spawn(move || {
                worker_loop(index, ctx, slots, free_count, closing);
            }));
        }

        self.accept_loop(server_pipe)?;

        for w in workers {
            let _ = w.join();
        }
        let _ = fs::remove_file(server_pipe);
        Ok(())
    }

    fn accept_loop(&self, server_pipe: &str) -> Result<()> {
        while !self.closing.load(Ordering::SeqCst) {
            let fd = OpenOptions::new().read(true).open(server_pipe);
            let mut reader = match fd {
                Ok(f) => BufReader::new(f),
                Err(_) if self.closing.load(Ordering::SeqCst) => break,
                Err(e) => return Err(EmsError::from(e)),
            };

            let opcode = match wire::read_u8(&mut reader) {
                Ok(b) => b,
                Err(_) => continue,
            };
            if OpCode::try_from(opcode) != Ok(OpCode::Connect) {
                continue;
            }

            let request_fifo = wire::read_pipe_name(&mut reader)?;
            let response_fifo = wire::read_pipe_name(&mut reader)?;

            let slot_index = self.claim_free_slot();
            {
                let slot = &self.slots[slot_index];
                let mut data = slot.data.lock().expect("slot lock poisoned");
                data.request_fifo = request_fifo;
                data.response_fifo = response_fifo;
                data.state = SlotState::Claimed;
                slot.claimed.notify_one();
            }

            if let Ok(mut ack) = OpenOptions::new().write(true).open(server_pipe) {
                let _ = wire::write_usize(&mut ack, slot_index);
            }
        }
        Ok(())
    }

    fn claim_free_slot(&self) -> usize {
        let (lock, cond) = &*self.free_count;
        let mut count = lock.lock().expect("free-count lock poisoned");
        while *count == 0 {
            count = cond.wait(count).expect("free-count lock poisoned");
        }
        *count -= 1;
        drop(count);

        self.slots
            .iter()
            .position(|s| s.data.lock().expect("slot lock poisoned").state == SlotState::Free)
            .expect("free slot must exist: free_count was decremented under the same invariant")
    }

    /// Prints every event's grid to stdout; the `SIGUSR1` introspection
    /// hook.
    pub fn dump_events(&self) {
        if let Ok(ids) = self.ctx.store.snapshot_ids() {
            for id in ids {
                if let Ok(event) = self.ctx.store.lookup(id) {
                    let delay = self.ctx.store.access_delay().unwrap_or_default();
                    let cells = event.snapshot(delay);
                    println!("Event: {id}");
                    for row in 0..event.rows {
                        let slice = &cells[row * event.cols..(row + 1) * event.cols];
                        let line: Vec<String> = slice.iter().map(|c| c.to_string()).collect();
                        println!("{}", line.join(" "));
                    }
                }
            }
        }
    }

    /// Orderly shutdown: unlink happens in `run()` after the accept loop
    /// returns. This flips the flag every worker and the accept loop poll,
    /// wakes every slot's condition variable, and — since the accept loop
    /// is typically parked in a blocking `open()` of the server FIFO for
    /// reading, which only returns once a writer shows up — opens the FIFO
    /// for write itself so that blocked `open()` call completes and the
    /// loop observes `closing` on its next iteration.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        for slot in self.slots.iter() {
            slot.claimed.notify_all();
        }
        if let Some(path) = &*self.server_pipe.lock().expect("server pipe lock poisoned") {
            let _ = OpenOptions::new().write(true).open(path);
        }
    }
}

fn worker_loop(
    index: usize,
    ctx: EmsContext,
    slots: Arc<Vec<Slot>>,
    free_count: Arc<(Mutex<usize>, Condvar)>,
    closing: Arc<AtomicBool>,
) {
    let slot = &slots[index];
    loop {
        let (request_fifo, response_fifo) = {
            let mut data = slot.data.lock().expect("slot lock poisoned");
            while data.state != SlotState::Claimed {
                if closing.load(Ordering::SeqCst) {
                    return;
                }
                data = slot.claimed.wait(data).expect("slot lock poisoned");
            }
            data.state = SlotState::Active;
            (data.request_fifo.clone(), data.response_fifo.clone())
        };

        if let Err(e) = serve_session(&ctx, &request_fifo, &response_fifo) {
            log::warn!("session on slot {index} ended: {e}");
        }

        {
            let mut data = slot.data.lock().expect("slot lock poisoned");
            data.state = SlotState::Free;
        }
        let (lock, cond) = &*free_count;
        *lock.lock().expect("free-count lock poisoned") += 1;
        cond.notify_one();
    }
}

fn serve_session(ctx: &EmsContext, request_fifo: &str, response_fifo: &str) -> Result<()> {
    let req_file = File::open(request_fifo).map_err(EmsError::from)?;
    let resp_file = OpenOptions::new().write(true).open(response_fifo).map_err(EmsError::from)?;
    let mut req = BufReader::new(req_file);
    let mut resp = BufWriter::new(resp_file);

    loop {
        let opcode_byte = match wire::read_u8(&mut req) {
            Ok(b) => b,
            Err(_) => return Ok(()), // peer closed: treat as a clean disconnect, not a protocol error.
        };
        let opcode = OpCode::try_from(opcode_byte)?;

        match opcode {
            OpCode::Quit => return Ok(()),
            OpCode::Create => handle_create(ctx, &mut req, &mut resp)?,
            OpCode::Reserve => handle_reserve(ctx, &mut req, &mut resp)?,
            OpCode::Show => handle_show(ctx, &mut req, &mut resp)?,
            OpCode::List => handle_list(ctx, &mut req, &mut resp)?,
            OpCode::Connect => return Err(EmsError::FifoProtocolError("unexpected connect mid-session".into())),
        }
        resp.flush().map_err(EmsError::from)?;
    }
}

fn handle_create(ctx: &EmsContext, req: &mut impl std::io::Read, resp: &mut impl std::io::Write) -> Result<()> {
    let event_id = wire::read_u32(req)?;
    let rows = wire::read_usize(req)?;
    let cols = wire::read_usize(req)?;

    match ctx.store.create(event_id, rows, cols) {
        Ok(()) => wire::write_u8(resp, 0),
        Err(e) if e.is_recoverable() => {
            wire::write_u8(resp, 1)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn handle_reserve(ctx: &EmsContext, req: &mut impl std::io::Read, resp: &mut impl std::io::Write) -> Result<()> {
    let event_id = wire::read_u32(req)?;
    let n = wire::read_usize(req)?;
    let xs: Vec<usize> = (0..n).map(|_| wire::read_usize(req)).collect::<Result<_>>()?;
    let ys: Vec<usize> = (0..n).map(|_| wire::read_usize(req)).collect::<Result<_>>()?;
    let coords: Vec<(usize, usize)> = xs.into_iter().zip(ys).collect();

    match crate::reserve::reserve(&ctx.store, event_id, &coords) {
        Ok(_rid) => wire::write_u8(resp, 0),
        Err(e) if e.is_recoverable() => {
            wire::write_u8(resp, 1)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn handle_show(ctx: &EmsContext, req: &mut impl std::io::Read, resp: &mut impl std::io::Write) -> Result<()> {
    let event_id = wire::read_u32(req)?;

    match ctx.store.lookup(event_id) {
        Ok(event) => {
            let delay = ctx.store.access_delay()?;
            let cells = event.snapshot(delay);
            wire::write_u8(resp, 0)?;
            wire::write_usize(resp, event.rows)?;
            wire::write_usize(resp, event.cols)?;
            for cell in cells {
                wire::write_u32(resp, cell)?;
            }
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            wire::write_u8(resp, 1)?;
            wire::write_error_text(resp, &e.to_string())
        }
        Err(e) => Err(e),
    }
}

fn handle_list(ctx: &EmsContext, _req: &mut impl std::io::Read, resp: &mut impl std::io::Write) -> Result<()> {
    let ids = ctx.store.snapshot_ids()?;
    wire::write_u8(resp, 0)?;
    wire::write_usize(resp, ids.len())?;
    for id in ids {
        wire::write_u32(resp, id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmsConfig;
    use std::time::Duration;

    #[test]
    fn new_server_has_all_slots_free() {
        let ctx = EmsContext::new(EmsConfig::default());
        ctx.store.initialize(Duration::ZERO).unwrap();
        let server = SessionServer::new(ctx);
        let free = *server.free_count.0.lock().unwrap();
        assert_eq!(free, MAX_SESSIONS);
    }

    #[test]
    fn shutdown_sets_closing_flag() {
        let ctx = EmsContext::new(EmsConfig::default());
        ctx.store.initialize(Duration::ZERO).unwrap();
        let server = SessionServer::new(ctx);
        server.shutdown();
        assert!(server.closing.load(Ordering::SeqCst));
    }
}
