use std::io::Write;
use std::sync::Mutex;

use crate::context::EmsContext;
use crate::error::{EmsError, Result};
use crate::parser::Command;
use crate::reserve;

/// Serializes writes to one output sink across concurrently-running
/// workers, matching the original's `write_mutex` guarding SHOW/LIST
/// output records.
pub struct Sink<W: Write> {
    inner: Mutex<W>,
}

impl<W: Write> Sink<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: Mutex::new(writer) }
    }

    pub(crate) fn write_record(&self, record: &str) -> Result<()> {
        let mut guard = self.inner.lock().expect("write lock poisoned");
        guard.write_all(record.as_bytes()).map_err(EmsError::from)
    }
}

/// What running one command produced, for callers that want to distinguish
/// "ran fine", "recoverable failure already logged", and "stop the loop".
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Recovered,
    Terminate,
}

/// Dispatches one parsed command to the Store/Engine and to the sink. WAIT
/// and BARRIER are handled by the file thread pool's dispatcher, not here —
/// this function treats them (and HELP/EMPTY) as no-ops for the
/// single-threaded and server call sites.
pub fn run_one<W: Write>(ctx: &EmsContext, cmd: &Command, sink: &Sink<W>) -> Result<Outcome> {
    match cmd {
        Command::Create { event_id, rows, cols } => {
            match ctx.store.create(*event_id, *rows, *cols) {
                Ok(()) => Ok(Outcome::Ok),
                Err(e) if e.is_recoverable() => {
                    sink.write_record(&format!("ERR: {}\n", e))?;
                    Ok(Outcome::Recovered)
                }
                Err(e) => Err(e),
            }
        }
        Command::Reserve { event_id, coords } => {
            match reserve::reserve(&ctx.store, *event_id, coords) {
                Ok(_rid) => Ok(Outcome::Ok),
                Err(e) if e.is_recoverable() => {
                    sink.write_record(&format!("ERR: {}\n", e))?;
                    Ok(Outcome::Recovered)
                }
                Err(e) => Err(e),
            }
        }
        Command::Show { event_id } => match show(ctx, *event_id) {
            Ok(body) => {
                sink.write_record(&body)?;
                Ok(Outcome::Ok)
            }
            Err(e) if e.is_recoverable() => {
                sink.write_record(&format!("ERR: {}\n", e))?;
                Ok(Outcome::Recovered)
            }
            Err(e) => Err(e),
        },
        Command::List => {
            let body = list(ctx)?;
            sink.write_record(&body)?;
            Ok(Outcome::Ok)
        }
        Command::Help => {
            sink.write_record(HELP_TEXT)?;
            Ok(Outcome::Ok)
        }
        Command::Wait { .. } | Command::Barrier | Command::Empty => Ok(Outcome::Ok),
        Command::Eoc => Ok(Outcome::Terminate),
    }
}

/// SHOW: one line per row, cells separated by a single space.
fn show(ctx: &EmsContext, event_id: u32) -> Result<String> {
    let event = ctx.store.lookup(event_id)?;
    let delay = ctx.store.access_delay()?;
    let cells = event.snapshot(delay);

    let mut out = String::new();
    for row in 0..event.rows {
        let slice = &cells[row * event.cols..(row + 1) * event.cols];
        for (i, cell) in slice.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&cell.to_string());
        }
        out.push('\n');
    }
    Ok(out)
}

/// LIST: `Event: <id>\n` per event in insertion order, `No events\n` when
/// empty.
fn list(ctx: &EmsContext) -> Result<String> {
    let ids = ctx.store.snapshot_ids()?;
    if ids.is_empty() {
        return Ok("No events\n".to_string());
    }
    let mut out = String::new();
    for id in ids {
        out.push_str(&format!("Event: {}\n", id));
    }
    Ok(out)
}

pub const HELP_TEXT: &str = "Available commands:\n\
  CREATE <event_id> <num_rows> <num_columns>\n\
  RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]\n\
  SHOW <event_id>\n\
  LIST\n\
  WAIT <delay_ms> [thread_id]\n\
  BARRIER\n\
  HELP\n";
