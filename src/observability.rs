use std::net::SocketAddr;

use crate::model::Event;

// ── Commit metrics ──────────────────────────────────────────────

/// Counter: committed events. Labels: event.
pub const EVENTS_TOTAL: &str = "courtside_events_total";

/// Counter: reservations cancelled by an availability edit. Labels: reason.
pub const CASCADE_CANCELLATIONS_TOTAL: &str = "courtside_cascade_cancellations_total";

/// Counter: days materialized into the store.
pub const DAYS_MATERIALIZED_TOTAL: &str = "courtside_days_materialized_total";

/// Counter: lock waits that hit the timeout. Labels: lock.
pub const LOCK_TIMEOUTS_TOTAL: &str = "courtside_lock_timeouts_total";

/// Counter: price quotes served. Labels: tier.
pub const PRICE_QUOTES_TOTAL: &str = "courtside_price_quotes_total";

// ── Facility metrics ────────────────────────────────────────────

/// Gauge: number of loaded facilities (engines).
pub const FACILITIES_ACTIVE: &str = "courtside_facilities_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtside_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtside_wal_flush_batch_size";

/// Histogram: WAL compaction duration in seconds.
pub const WAL_COMPACT_DURATION_SECONDS: &str = "courtside_wal_compact_duration_seconds";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an event variant.
pub fn event_label(event: &Event) -> &'static str {
    match event {
        Event::CourtCreated { .. } => "court_created",
        Event::ScheduleUpdated { .. } => "schedule_updated",
        Event::PricingReplaced { .. } => "pricing_replaced",
        Event::DayMaterialized { .. } => "day_materialized",
        Event::SlotToggled { .. } => "slot_toggled",
        Event::DayClosed { .. } => "day_closed",
        Event::DayReopened { .. } => "day_reopened",
        Event::ReservationPlaced { .. } => "reservation_placed",
        Event::ReservationConfirmed { .. } => "reservation_confirmed",
        Event::ReservationCancelled { .. } => "reservation_cancelled",
    }
}

/// Count a committed event and the cancellations it cascaded.
pub fn record_event(event: &Event) {
    metrics::counter!(EVENTS_TOTAL, "event" => event_label(event)).increment(1);
    match event {
        Event::DayMaterialized { .. } => metrics::counter!(DAYS_MATERIALIZED_TOTAL).increment(1),
        Event::SlotToggled { cancelled, .. } if !cancelled.is_empty() => {
            metrics::counter!(CASCADE_CANCELLATIONS_TOTAL, "reason" => "slot_edited")
                .increment(cancelled.len() as u64)
        }
        Event::DayClosed { cancelled, .. } if !cancelled.is_empty() => {
            metrics::counter!(CASCADE_CANCELLATIONS_TOTAL, "reason" => "day_closed")
                .increment(cancelled.len() as u64)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn labels_are_distinct_snake_case() {
        let id = Ulid::new();
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let events = [
            Event::ScheduleUpdated {
                id,
                schedule: crate::model::WeeklySchedule::closed(),
            },
            Event::DayClosed {
                court_id: id,
                date,
                cancelled: Vec::new(),
            },
            Event::ReservationConfirmed { id, court_id: id, date },
        ];
        let labels: Vec<_> = events.iter().map(event_label).collect();
        assert_eq!(labels, ["schedule_updated", "day_closed", "reservation_confirmed"]);
    }

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }
}
