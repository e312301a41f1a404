//! Reservation phases derived from stored status plus the current time.
//! Nothing here is persisted; phases are recomputed on every read.

use chrono::NaiveDateTime;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservationPhase {
    Upcoming,
    Ongoing,
    Past,
    /// Cancelled by a slot edit or day closure rather than by the customer.
    Invalidated,
}

pub fn classify(reservation: &Reservation, now: NaiveDateTime) -> ReservationPhase {
    if reservation.status == ReservationStatus::Cancelled {
        return match reservation.cancel_reason {
            Some(reason) if reason.is_cascade() => ReservationPhase::Invalidated,
            _ => ReservationPhase::Past,
        };
    }
    if now < reservation.starts_at() {
        ReservationPhase::Upcoming
    } else if now <= reservation.ends_at() {
        ReservationPhase::Ongoing
    } else {
        ReservationPhase::Past
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseSummary {
    pub upcoming: usize,
    pub ongoing: usize,
    pub past: usize,
    pub invalidated: usize,
}

pub fn summarize<'a>(reservations: impl IntoIterator<Item = &'a Reservation>, now: NaiveDateTime) -> PhaseSummary {
    let mut summary = PhaseSummary::default();
    for r in reservations {
        match classify(r, now) {
            ReservationPhase::Upcoming => summary.upcoming += 1,
            ReservationPhase::Ongoing => summary.ongoing += 1,
            ReservationPhase::Past => summary.past += 1,
            ReservationPhase::Invalidated => summary.invalidated += 1,
        }
    }
    summary
}
