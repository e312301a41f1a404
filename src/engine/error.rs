use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::SlotTime;

#[derive(Debug)]
pub enum EngineError {
    CourtNotFound(Ulid),
    /// Date is neither stored nor inside the rolling horizon.
    DayNotFound {
        court_id: Ulid,
        date: NaiveDate,
    },
    SlotNotFound {
        date: NaiveDate,
        time: SlotTime,
    },
    ReservationNotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidState(&'static str),
    Validation(String),
    /// Overlaps an active reservation.
    Conflict(Ulid),
    SlotUnavailable {
        date: NaiveDate,
        time: SlotTime,
    },
    ConcurrencyConflict(String),
    LimitExceeded(&'static str),
    WalError(String),
}

/// Caller-facing error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    Conflict,
    ConcurrencyConflict,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::CourtNotFound(_)
            | EngineError::DayNotFound { .. }
            | EngineError::SlotNotFound { .. }
            | EngineError::ReservationNotFound(_) => ErrorKind::NotFound,
            EngineError::InvalidState(_) => ErrorKind::InvalidState,
            EngineError::Validation(_) | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::AlreadyExists(_) | EngineError::Conflict(_) | EngineError::SlotUnavailable { .. } => {
                ErrorKind::Conflict
            }
            EngineError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::CourtNotFound(id) => write!(f, "court not found: {id}"),
            EngineError::DayNotFound { court_id, date } => {
                write!(f, "no calendar day {date} for court {court_id}")
            }
            EngineError::SlotNotFound { date, time } => write!(f, "no slot at {time} on {date}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            EngineError::SlotUnavailable { date, time } => {
                write!(f, "slot {time} on {date} is not open for booking")
            }
            EngineError::ConcurrencyConflict(msg) => write!(f, "concurrency conflict: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
