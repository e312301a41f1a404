//! Slot catalog: which half-hour slots a court's day can contain.

use chrono::{Datelike, NaiveDate};

use crate::model::*;

/// Slot start times for one weekday: every aligned half hour in `[open, close)`
/// that fits a full slot. Empty when the weekday is not enabled.
pub fn slot_times(hours: &DayHours) -> Vec<SlotTime> {
    if !hours.enabled {
        return Vec::new();
    }
    let mut times = Vec::new();
    let mut t = hours.open;
    while let Some(next) = t.plus_minutes(SLOT_MINUTES) {
        if next > hours.close {
            break;
        }
        times.push(t);
        t = next;
    }
    times
}

/// Catalog defaults for a date: all slots enabled.
pub fn default_slots(schedule: &WeeklySchedule, date: NaiveDate) -> Vec<Slot> {
    slot_times(&schedule.hours(date.weekday()))
        .into_iter()
        .map(|time| Slot { time, enabled: true })
        .collect()
}

/// A fresh, open calendar day seeded from the catalog.
pub fn default_day(court_id: ulid::Ulid, schedule: &WeeklySchedule, date: NaiveDate) -> CalendarDay {
    CalendarDay {
        court_id,
        date,
        is_closed: false,
        slots: default_slots(schedule, date),
    }
}

/// Schedule checks applied when a court is created or its schedule replaced.
pub fn validate_schedule(schedule: &WeeklySchedule) -> Result<(), String> {
    for (weekday, hours) in schedule.iter() {
        if !hours.enabled {
            continue;
        }
        if !hours.open.is_slot_aligned() || !hours.close.is_slot_aligned() {
            return Err(format!(
                "{weekday}: opening hours {}-{} are not on half-hour boundaries",
                hours.open, hours.close
            ));
        }
        if hours.open >= hours.close {
            return Err(format!(
                "{weekday}: close {} must be after open {}",
                hours.close, hours.open
            ));
        }
    }
    Ok(())
}
