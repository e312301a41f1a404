use ulid::Ulid;

use crate::model::*;

use super::EngineError;

// ── Availability state machine ────────────────────────────────────
//
// A day is Open (independent per-slot flags) or Closed (every slot disabled).
//   close:  Open -> Closed, Closed -> Closed (no-op)
//   reopen: Closed -> Open with catalog defaults
//   toggle: Open -> Open only
// Each plan_* function validates a transition against the current state and
// returns what the committed event must carry. Nothing here mutates.

/// Active reservations covering `time`. At most one when the day is consistent.
pub fn occupants(ds: &DayState, time: SlotTime) -> Vec<Ulid> {
    ds.active().filter(|r| r.occupies(time)).map(|r| r.id).collect()
}

/// Reservations a slot edit cancels. Any edit of an occupied slot cancels its
/// occupant: disabling would leave it on a disabled slot, and re-opening hands
/// the slot back to the pool.
pub fn plan_toggle(ds: &DayState, time: SlotTime) -> Result<Vec<Ulid>, EngineError> {
    if ds.day.is_closed {
        return Err(EngineError::InvalidState("day is closed; reopen it before editing slots"));
    }
    if ds.day.slot(time).is_none() {
        return Err(EngineError::SlotNotFound {
            date: ds.day.date,
            time,
        });
    }
    Ok(occupants(ds, time))
}

/// Reservations a day closure cancels: every active one. Empty on a second close.
pub fn plan_close(ds: &DayState) -> Vec<Ulid> {
    ds.active().map(|r| r.id).collect()
}

/// Slots a reopened day gets. Only closed days can be reopened.
pub fn plan_reopen(ds: &DayState, catalog: Vec<Slot>) -> Result<Vec<Slot>, EngineError> {
    if !ds.day.is_closed {
        return Err(EngineError::InvalidState("day is not closed"));
    }
    Ok(catalog)
}

/// Invariants every committed day satisfies: a closed day has no enabled slot,
/// active reservations sit on enabled slots only, and never overlap.
pub fn is_consistent(ds: &DayState) -> bool {
    if ds.day.is_closed && ds.day.slots.iter().any(|s| s.enabled) {
        return false;
    }
    let active: Vec<&Reservation> = ds.active().collect();
    for (i, r) in active.iter().enumerate() {
        let on_enabled_slots = ds
            .day
            .slots
            .iter()
            .filter(|s| r.occupies(s.time))
            .all(|s| s.enabled);
        if ds.day.is_closed || !on_enabled_slots {
            return false;
        }
        if active[i + 1..].iter().any(|o| o.overlaps(r.start, r.end)) {
            return false;
        }
    }
    true
}
