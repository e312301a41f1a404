use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-court broadcast of committed events. Consoles subscribe to surface
/// cascades ("2 bookings were cancelled") as they happen.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a court's events. Creates the channel if needed.
    pub fn subscribe(&self, court_id: Ulid) -> broadcast::Receiver<Event> {
        self.channels
            .entry(court_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, court_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&court_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose receivers are all gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
        before - self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn closed(court_id: Ulid, cancelled: Vec<Ulid>) -> Event {
        Event::DayClosed {
            court_id,
            date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            cancelled,
        }
    }

    #[tokio::test]
    async fn subscriber_sees_cascade() {
        let hub = NotifyHub::new();
        let court = Ulid::new();
        let mut rx = hub.subscribe(court);

        let event = closed(court, vec![Ulid::new(), Ulid::new()]);
        hub.send(court, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.cascaded().len(), 2);
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn channels_are_per_court() {
        let hub = NotifyHub::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut rx_a = hub.subscribe(a);

        hub.send(b, &closed(b, Vec::new()));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let court = Ulid::new();
        hub.send(court, &closed(court, Vec::new()));
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let kept = hub.subscribe(Ulid::new());
        drop(hub.subscribe(Ulid::new()));
        assert_eq!(hub.prune(), 1);
        drop(kept);
        assert_eq!(hub.prune(), 1);
    }
}
