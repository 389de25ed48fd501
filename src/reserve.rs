use crate::error::{EmsError, Result};
use crate::store::EventStore;
use crate::store::event::ReserveError;

/// RESERVE(event_id, coords): looks the event up under the store's locks,
/// then delegates the atomic multi-seat write to `Event::reserve`, which
/// holds the event's own seat lock for the whole validate-then-write
/// sequence.
pub fn reserve(store: &EventStore, event_id: u32, coords: &[(usize, usize)]) -> Result<u32> {
    let event = store.lookup(event_id)?;
    let delay = store.access_delay()?;

    event.reserve(coords, delay).map_err(|e| match e {
        ReserveError::InvalidSeat { row, col } => EmsError::InvalidSeat { row, col },
        ReserveError::SeatTaken { row, col } => EmsError::SeatTaken { row, col },
    })
}
