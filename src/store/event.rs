use std::sync::RwLock;
use std::time::Duration;

/// A single event's seat grid.
///
/// `seats` is dense, row-major, `rows * cols` long. A cell holds `0` when
/// free or a positive reservation id. `next_reservation_id` is both the
/// next id to hand out and the count of reservations committed so far.
#[derive(Debug)]
pub struct Event {
    pub id: u32,
    pub rows: usize,
    pub cols: usize,
    seats: RwLock<SeatGrid>,
}

#[derive(Debug)]
struct SeatGrid {
    cells: Vec<u32>,
    next_reservation_id: u32,
}

impl Event {
    pub fn new(id: u32, rows: usize, cols: usize) -> Self {
        Self {
            id,
            rows,
            cols,
            seats: RwLock::new(SeatGrid { cells: vec![0; rows * cols], next_reservation_id: 0 }),
        }
    }

    fn index(&self, row: usize, col: usize) -> usize {
        (row - 1) * self.cols + (col - 1)
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row >= 1 && row <= self.rows && col >= 1 && col <= self.cols
    }

    /// Reads one cell's value after sleeping `delay` to simulate a costly
    /// memory access.
    pub fn read_cell(&self, row: usize, col: usize, delay: Duration) -> u32 {
        std::thread::sleep(delay);
        let idx = self.index(row, col);
        let grid = self.seats.read().expect("seat lock poisoned");
        grid.cells[idx]
    }

    /// Snapshot of the whole grid, row-major, each cell access delayed
    /// individually (matching the original's per-cell `get_seat_with_delay`
    /// calls inside SHOW).
    pub fn snapshot(&self, delay: Duration) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.rows * self.cols);
        for row in 1..=self.rows {
            for col in 1..=self.cols {
                out.push(self.read_cell(row, col, delay));
            }
        }
        out
    }

    /// Attempts to reserve every listed `(row, col)` coordinate atomically.
    ///
    /// Validation (bounds, then conflicts) fully precedes any write, so on
    /// failure no cell is ever touched — no rollback pass is needed.
    /// Duplicate coordinates within one call are legal and idempotent: the
    /// same `rid` is written to the same cell twice.
    pub fn reserve(&self, coords: &[(usize, usize)], delay: Duration) -> Result<u32, ReserveError> {
        for &(row, col) in coords {
            if !self.in_bounds(row, col) {
                return Err(ReserveError::InvalidSeat { row, col });
            }
        }

        let mut grid = self.seats.write().expect("seat lock poisoned");
        for &(row, col) in coords {
            std::thread::sleep(delay);
            let idx = self.index(row, col);
            if grid.cells[idx] != 0 {
                return Err(ReserveError::SeatTaken { row, col });
            }
        }

        let rid = grid.next_reservation_id + 1;
        grid.next_reservation_id = rid;
        for &(row, col) in coords {
            std::thread::sleep(delay);
            let idx = self.index(row, col);
            grid.cells[idx] = rid;
        }
        Ok(rid)
    }

    pub fn reservation_count(&self) -> u32 {
        self.seats.read().expect("seat lock poisoned").next_reservation_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveError {
    InvalidSeat { row: usize, col: usize },
    SeatTaken { row: usize, col: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_event_is_all_zero() {
        let e = Event::new(1, 2, 2);
        assert_eq!(e.snapshot(Duration::ZERO), vec![0, 0, 0, 0]);
    }

    #[test]
    fn basic_reserve_and_show() {
        let e = Event::new(1, 2, 2);
        let rid = e.reserve(&[(1, 1), (1, 2)], Duration::ZERO).unwrap();
        assert_eq!(rid, 1);
        assert_eq!(e.snapshot(Duration::ZERO), vec![1, 1, 0, 0]);
    }

    #[test]
    fn conflicting_reserve_fails_and_leaves_state_untouched() {
        let e = Event::new(1, 1, 2);
        e.reserve(&[(1, 1), (1, 2)], Duration::ZERO).unwrap();
        let err = e.reserve(&[(1, 2)], Duration::ZERO).unwrap_err();
        assert_eq!(err, ReserveError::SeatTaken { row: 1, col: 2 });
        assert_eq!(e.snapshot(Duration::ZERO), vec![1, 1]);
    }

    #[test]
    fn out_of_bounds_reserve_is_atomic() {
        let e = Event::new(1, 2, 2);
        let err = e.reserve(&[(1, 1), (3, 3)], Duration::ZERO).unwrap_err();
        assert_eq!(err, ReserveError::InvalidSeat { row: 3, col: 3 });
        assert_eq!(e.snapshot(Duration::ZERO), vec![0, 0, 0, 0]);
        assert_eq!(e.reservation_count(), 0);
    }

    #[test]
    fn duplicate_coordinates_are_idempotent() {
        let e = Event::new(1, 1, 1);
        let rid = e.reserve(&[(1, 1), (1, 1)], Duration::ZERO).unwrap();
        assert_eq!(e.snapshot(Duration::ZERO), vec![rid]);
    }

    #[test]
    fn concurrent_disjoint_reserves_both_succeed() {
        let e = std::sync::Arc::new(Event::new(1, 1, 4));
        let e1 = e.clone();
        let e2 = e.clone();
        let t1 = std::thread::spawn(move || e1.reserve(&[(1, 1), (1, 2)], Duration::from_millis(5)));
        let t2 = std::thread::spawn(move || e2.reserve(&[(1, 3), (1, 4)], Duration::from_millis(5)));
        let r1 = t1.join().unwrap().unwrap();
        let r2 = t2.join().unwrap().unwrap();
        assert_ne!(r1, r2);
        assert_eq!(e.snapshot(Duration::ZERO).iter().filter(|&&c| c != 0).count(), 4);
    }

    #[test]
    fn concurrent_overlapping_reserves_have_one_winner() {
        let e = std::sync::Arc::new(Event::new(1, 1, 2));
        let e1 = e.clone();
        let e2 = e.clone();
        let t1 = std::thread::spawn(move || e1.reserve(&[(1, 1)], Duration::from_millis(5)));
        let t2 = std::thread::spawn(move || e2.reserve(&[(1, 1)], Duration::from_millis(5)));
        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();
        let oks = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(oks, 1);
    }
}
