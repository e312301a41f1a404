use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("court name too long"));
    }
    Ok(())
}

/// Check that a reservation of `duration` starting at `start` fits the day:
/// aligned start, every covered slot present and enabled, day open, and no
/// active reservation in the way. Returns the exclusive end time.
pub(crate) fn check_bookable(
    ds: &DayState,
    start: SlotTime,
    duration: BookingDuration,
) -> Result<SlotTime, EngineError> {
    if !start.is_slot_aligned() {
        return Err(EngineError::Validation(format!(
            "start {start} is not on a half-hour boundary"
        )));
    }
    let end = start
        .plus_minutes(duration.minutes())
        .ok_or_else(|| EngineError::Validation(format!("reservation at {start} runs past midnight")))?;
    if ds.reservations.len() >= MAX_RESERVATIONS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many reservations on day"));
    }
    let date = ds.day.date;
    if ds.day.is_closed {
        return Err(EngineError::SlotUnavailable { date, time: start });
    }

    let mut time = start;
    while time < end {
        match ds.day.slot(time) {
            Some(slot) if slot.enabled => {}
            _ => return Err(EngineError::SlotUnavailable { date, time }),
        }
        time = time
            .plus_minutes(SLOT_MINUTES)
            .ok_or(EngineError::SlotUnavailable { date, time })?;
    }

    if let Some(other) = ds.active().find(|r| r.overlaps(start, end)) {
        return Err(EngineError::Conflict(other.id));
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn day_with(times: &[(&str, bool)]) -> DayState {
        DayState::new(CalendarDay {
            court_id: Ulid::new(),
            date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            is_closed: false,
            slots: times
                .iter()
                .map(|(s, enabled)| Slot { time: t(s), enabled: *enabled })
                .collect(),
        })
    }

    #[test]
    fn fits_on_enabled_slots() {
        let ds = day_with(&[("18:00", true), ("18:30", true), ("19:00", true)]);
        assert_eq!(check_bookable(&ds, t("18:00"), BookingDuration::OneHourHalf).unwrap(), t("19:30"));
    }

    #[test]
    fn rejects_disabled_slot_inside_range() {
        let ds = day_with(&[("18:00", true), ("18:30", false), ("19:00", true)]);
        let err = check_bookable(&ds, t("18:00"), BookingDuration::OneHour).unwrap_err();
        assert!(matches!(err, EngineError::SlotUnavailable { time, .. } if time == t("18:30")));
    }

    #[test]
    fn rejects_running_past_closing() {
        let ds = day_with(&[("21:00", true), ("21:30", true)]);
        assert!(matches!(
            check_bookable(&ds, t("21:00"), BookingDuration::OneHourHalf),
            Err(EngineError::SlotUnavailable { .. })
        ));
    }

    #[test]
    fn rejects_misaligned_start() {
        let ds = day_with(&[("18:00", true), ("18:30", true)]);
        assert!(matches!(
            check_bookable(&ds, t("18:15"), BookingDuration::OneHour),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn rejects_overlap_with_active_reservation() {
        let mut ds = day_with(&[("18:00", true), ("18:30", true), ("19:00", true), ("19:30", true)]);
        let id = Ulid::new();
        ds.insert_reservation(Reservation {
            id,
            court_id: ds.day.court_id,
            date: ds.day.date,
            start: t("18:30"),
            end: t("19:30"),
            duration: BookingDuration::OneHour,
            price: Money::from(20),
            status: ReservationStatus::Pending,
            cancel_reason: None,
        });
        assert!(matches!(
            check_bookable(&ds, t("18:00"), BookingDuration::OneHour),
            Err(EngineError::Conflict(c)) if c == id
        ));
        assert!(check_bookable(&ds, t("19:30"), BookingDuration::OneHour).is_err()); // only one slot left
    }

    #[test]
    fn rejects_closed_day() {
        let mut ds = day_with(&[("18:00", false), ("18:30", false)]);
        ds.day.is_closed = true;
        assert!(matches!(
            check_bookable(&ds, t("18:00"), BookingDuration::OneHour),
            Err(EngineError::SlotUnavailable { .. })
        ));
    }
}
