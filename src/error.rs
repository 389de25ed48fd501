use thiserror::Error;

/// Error kinds surfaced by the EMS core. Every command path and every FIFO
/// opcode handler resolves to one of these.
#[derive(Debug, Error)]
pub enum EmsError {
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("usage error: {0}")]
    UsageError(String),

    #[error("EMS state must be initialized first")]
    NotInitialized,

    #[error("EMS state is already initialized")]
    AlreadyInitialized,

    #[error("out of memory during {0}")]
    OutOfMemory(&'static str),

    #[error("event {0} already exists")]
    EventAlreadyExists(u32),

    #[error("event {0} not found")]
    EventNotFound(u32),

    #[error("invalid seat at ({row}, {col})")]
    InvalidSeat { row: usize, col: usize },

    #[error("seat at ({row}, {col}) is already reserved")]
    SeatTaken { row: usize, col: usize },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("FIFO protocol error: {0}")]
    FifoProtocolError(String),
}

impl EmsError {
    /// `true` for kinds classified as locally recoverable: the executor
    /// emits a diagnostic and moves on to the next command.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EmsError::ParseError(_)
                | EmsError::SeatTaken { .. }
                | EmsError::InvalidSeat { .. }
                | EmsError::EventNotFound(_)
                | EmsError::EventAlreadyExists(_)
                | EmsError::AlreadyInitialized
        )
    }
}

pub type Result<T> = std::result::Result<T, EmsError>;
