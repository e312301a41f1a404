use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedDayState;

/// Calendar day store: one lock per (court, date), plus a reservation index.
/// Callers take the day's lock for the whole of a mutation; distinct keys never contend.
pub struct CalendarStore {
    days: DashMap<DayKey, SharedDayState>,
    reservation_to_day: DashMap<Ulid, DayKey>,
}

impl Default for CalendarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarStore {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            reservation_to_day: DashMap::new(),
        }
    }

    // ── Days ─────────────────────────────────────────────────

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn contains_day(&self, key: &DayKey) -> bool {
        self.days.contains_key(key)
    }

    pub fn get_day(&self, key: &DayKey) -> Option<SharedDayState> {
        self.days.get(key).map(|e| e.value().clone())
    }

    /// Insert unless present. Returns the stored entry either way.
    pub fn insert_day(&self, day: CalendarDay) -> SharedDayState {
        self.days
            .entry(day.key())
            .or_insert_with(|| Arc::new(RwLock::new(DayState::new(day))))
            .value()
            .clone()
    }

    pub fn day_keys(&self) -> Vec<DayKey> {
        let mut keys: Vec<DayKey> = self.days.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    // ── Reservation index ────────────────────────────────────

    pub fn day_for_reservation(&self, id: &Ulid) -> Option<DayKey> {
        self.reservation_to_day.get(id).map(|e| *e.value())
    }

    /// Reserve `id` for a placement on `key`. Fails if the id is indexed or
    /// already claimed by a placement in flight. The claim is released on
    /// drop unless the placement commits.
    pub fn claim_reservation(self: &Arc<Self>, id: Ulid, key: DayKey) -> Option<ReservationClaim> {
        match self.reservation_to_day.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                v.insert(key);
                Some(ReservationClaim {
                    store: self.clone(),
                    id,
                    committed: false,
                })
            }
        }
    }

    // ── Event application ────────────────────────────────────

    /// Apply a day-level event to its day (no locking, caller holds the write lock).
    pub fn apply_event(&self, ds: &mut DayState, event: &Event) {
        match event {
            Event::SlotToggled {
                time,
                enabled,
                cancelled,
                ..
            } => {
                if let Some(slot) = ds.day.slot_mut(*time) {
                    slot.enabled = *enabled;
                }
                cancel_all(ds, cancelled, CancelReason::SlotEdited);
            }
            Event::DayClosed { cancelled, .. } => {
                ds.day.is_closed = true;
                for slot in &mut ds.day.slots {
                    slot.enabled = false;
                }
                cancel_all(ds, cancelled, CancelReason::DayClosed);
            }
            Event::DayReopened { slots, .. } => {
                ds.day.is_closed = false;
                ds.day.slots = slots.clone();
            }
            Event::ReservationPlaced { reservation } => {
                self.reservation_to_day
                    .insert(reservation.id, DayKey::new(reservation.court_id, reservation.date));
                ds.insert_reservation(reservation.clone());
            }
            Event::ReservationConfirmed { id, .. } => {
                if let Some(r) = ds.reservation_mut(*id) {
                    r.status = ReservationStatus::Confirmed;
                }
            }
            Event::ReservationCancelled { id, reason, .. } => {
                if let Some(r) = ds.reservation_mut(*id) {
                    r.cancel(*reason);
                }
            }
            // Materialization is handled at the map level; court events don't touch days.
            Event::DayMaterialized { .. }
            | Event::CourtCreated { .. }
            | Event::ScheduleUpdated { .. }
            | Event::PricingReplaced { .. } => {}
        }
    }
}

/// An index entry held for a reservation that is not committed yet.
pub struct ReservationClaim {
    store: Arc<CalendarStore>,
    id: Ulid,
    committed: bool,
}

impl ReservationClaim {
    /// The placement reached the WAL and the day; the index entry stays.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ReservationClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.store.reservation_to_day.remove(&self.id);
        }
    }
}

fn cancel_all(ds: &mut DayState, ids: &[Ulid], reason: CancelReason) {
    for id in ids {
        if let Some(r) = ds.reservation_mut(*id) {
            r.cancel(reason);
        }
    }
}
