use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::catalog;
use crate::limits::*;
use crate::model::*;
use crate::pricing;

use super::availability::{plan_close, plan_reopen, plan_toggle};
use super::conflict::{check_bookable, validate_name};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_court(
        &self,
        id: Ulid,
        name: Option<String>,
        schedule: WeeklySchedule,
        pricing: PricingRuleSet,
    ) -> Result<(), EngineError> {
        let permit = self.begin_commit().await;
        let creating = self.court_creation.clone().lock_owned().await;
        if self.courts.len() >= MAX_COURTS_PER_FACILITY {
            return Err(EngineError::LimitExceeded("too many courts"));
        }
        validate_name(name.as_deref())?;
        catalog::validate_schedule(&schedule).map_err(EngineError::Validation)?;
        pricing::validate_rule_set(&pricing).map_err(EngineError::Validation)?;
        if self.courts.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CourtCreated {
            id,
            name: name.clone(),
            schedule: schedule.clone(),
            pricing: pricing.clone(),
        };
        let cs = CourtState::new(id, name, schedule, pricing);
        self.commit_court(&permit, creating, event, cs).await?;
        tracing::info!(court = %id, "court created");
        Ok(())
    }

    /// Replace the weekly schedule. Days already materialized keep their slots;
    /// new days and later reopens follow the new hours.
    pub async fn update_schedule(&self, id: Ulid, schedule: WeeklySchedule) -> Result<(), EngineError> {
        let permit = self.begin_commit().await;
        catalog::validate_schedule(&schedule).map_err(EngineError::Validation)?;
        let rs = self.court(id)?;
        let guard = self.bounded("court", rs.write_owned()).await?;
        let event = Event::ScheduleUpdated { id, schedule };
        self.persist_and_apply_court(&permit, guard, event).await?;
        Ok(())
    }

    /// Full replace of a court's pricing rules. With `expected_revision` set,
    /// a concurrent replace since the caller's read is rejected. Returns the
    /// new revision.
    pub async fn set_pricing_rule_set(
        &self,
        court_id: Ulid,
        rules: PricingRuleSet,
        expected_revision: Option<u64>,
    ) -> Result<u64, EngineError> {
        let permit = self.begin_commit().await;
        pricing::validate_rule_set(&rules).map_err(EngineError::Validation)?;
        let rs = self.court(court_id)?;
        let guard = self.bounded("court", rs.write_owned()).await?;
        if let Some(expected) = expected_revision
            && expected != guard.pricing_revision
        {
            return Err(EngineError::ConcurrencyConflict(format!(
                "pricing revision is {}, caller expected {expected}",
                guard.pricing_revision
            )));
        }

        let revision = guard.pricing_revision + 1;
        let event = Event::PricingReplaced {
            id: court_id,
            pricing: rules,
            revision,
        };
        self.persist_and_apply_court(&permit, guard, event).await?;
        tracing::info!(court = %court_id, revision, "pricing rules replaced");
        Ok(revision)
    }

    // ── Availability ─────────────────────────────────────────

    /// Set one slot's flag. An active reservation on the slot is cancelled in
    /// the same WAL record.
    pub async fn toggle_slot(
        &self,
        court_id: Ulid,
        date: NaiveDate,
        time: SlotTime,
        enabled: bool,
    ) -> Result<AvailabilityChange, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        let ds = self.day_entry(&permit, &court, date).await?;
        let guard = self.bounded("day", ds.write_owned()).await?;
        drop(court);

        let cancelled = plan_toggle(&guard, time)?;
        let event = Event::SlotToggled {
            court_id,
            date,
            time,
            enabled,
            cancelled: cancelled.clone(),
        };
        let guard = self.persist_and_apply(&permit, guard, event).await?;
        if !cancelled.is_empty() {
            tracing::info!(court = %court_id, %date, %time, enabled, cancelled = cancelled.len(), "slot edit cancelled reservations");
        }
        Ok(AvailabilityChange {
            day: guard.day.clone(),
            cancelled,
        })
    }

    /// Close the whole day, cancelling every active reservation on it.
    /// Closing a closed day commits nothing and cancels nothing.
    pub async fn close_day(&self, court_id: Ulid, date: NaiveDate) -> Result<AvailabilityChange, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        let ds = self.day_entry(&permit, &court, date).await?;
        let guard = self.bounded("day", ds.write_owned()).await?;
        drop(court);

        if guard.day.is_closed {
            return Ok(AvailabilityChange {
                day: guard.day.clone(),
                cancelled: Vec::new(),
            });
        }

        let cancelled = plan_close(&guard);
        let event = Event::DayClosed {
            court_id,
            date,
            cancelled: cancelled.clone(),
        };
        let guard = self.persist_and_apply(&permit, guard, event).await?;
        tracing::info!(court = %court_id, %date, cancelled = cancelled.len(), "day closed");
        Ok(AvailabilityChange {
            day: guard.day.clone(),
            cancelled,
        })
    }

    /// Reopen a closed day with the court's current catalog slots, all enabled.
    pub async fn reopen_day(&self, court_id: Ulid, date: NaiveDate) -> Result<AvailabilityChange, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        let ds = self.day_entry(&permit, &court, date).await?;
        let guard = self.bounded("day", ds.write_owned()).await?;

        let slots = plan_reopen(&guard, catalog::default_slots(&court.schedule, date))?;
        drop(court);
        let event = Event::DayReopened { court_id, date, slots };
        let guard = self.persist_and_apply(&permit, guard, event).await?;
        tracing::info!(court = %court_id, %date, "day reopened");
        Ok(AvailabilityChange {
            day: guard.day.clone(),
            cancelled: Vec::new(),
        })
    }

    // ── Reservations ─────────────────────────────────────────

    /// Place a pending reservation.
    pub async fn hold_reservation(
        &self,
        id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        start: SlotTime,
        duration: BookingDuration,
    ) -> Result<Reservation, EngineError> {
        self.place_reservation(id, court_id, date, start, duration, ReservationStatus::Pending)
            .await
    }

    /// Place a confirmed reservation.
    pub async fn book_reservation(
        &self,
        id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        start: SlotTime,
        duration: BookingDuration,
    ) -> Result<Reservation, EngineError> {
        self.place_reservation(id, court_id, date, start, duration, ReservationStatus::Confirmed)
            .await
    }

    async fn place_reservation(
        &self,
        id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        start: SlotTime,
        duration: BookingDuration,
        status: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let permit = self.begin_commit().await;
        // The claim makes the id unique across days before any lock is taken;
        // it is released on every path that doesn't commit.
        let claim = self
            .store
            .claim_reservation(id, DayKey::new(court_id, date))
            .ok_or(EngineError::AlreadyExists(id))?;
        let court = self.court_read(court_id).await?;
        let ds = self.day_entry(&permit, &court, date).await?;
        let guard = self.bounded("day", ds.write_owned()).await?;

        let end = check_bookable(&guard, start, duration)?;
        let price = pricing::resolve_price(&court.pricing, date, start, duration);
        drop(court);

        let reservation = Reservation {
            id,
            court_id,
            date,
            start,
            end,
            duration,
            price,
            status,
            cancel_reason: None,
        };
        let event = Event::ReservationPlaced {
            reservation: reservation.clone(),
        };
        self.commit_day(&permit, guard, event, Some(claim)).await?;
        Ok(reservation)
    }

    pub async fn confirm_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let permit = self.begin_commit().await;
        let guard = self.resolve_reservation_write(id).await?;
        let current = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        if current.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidState("only pending reservations can be confirmed"));
        }

        let event = Event::ReservationConfirmed {
            id,
            court_id: current.court_id,
            date: current.date,
        };
        let guard = self.persist_and_apply(&permit, guard, event).await?;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Customer cancellation.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let permit = self.begin_commit().await;
        let guard = self.resolve_reservation_write(id).await?;
        let current = guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        if !current.is_active() {
            return Err(EngineError::InvalidState("reservation already cancelled"));
        }

        let event = Event::ReservationCancelled {
            id,
            court_id: current.court_id,
            date: current.date,
            reason: CancelReason::Customer,
        };
        let guard = self.persist_and_apply(&permit, guard, event).await?;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    // ── Horizon ──────────────────────────────────────────────

    /// Materialize every missing day of the rolling horizon for a court.
    /// Returns how many days were created.
    pub async fn materialize_horizon(&self, court_id: Ulid) -> Result<usize, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        let today = self.options.clock.today();
        let mut created = 0;
        for date in today.iter_days().take(self.options.horizon_days as usize) {
            if self.store.contains_day(&DayKey::new(court_id, date)) {
                continue;
            }
            self.materialize(&permit, &court, date).await?;
            created += 1;
        }
        Ok(created)
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _commit = self.commit_gate.write().await;
        let mut events = Vec::new();

        let mut court_ids: Vec<Ulid> = self.courts.iter().map(|e| *e.key()).collect();
        court_ids.sort();
        for id in court_ids {
            let Some(rs) = self.court_handle(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::CourtCreated {
                id: guard.id,
                name: guard.name.clone(),
                schedule: guard.schedule.clone(),
                pricing: guard.pricing.clone(),
            });
            if guard.pricing_revision > 0 {
                events.push(Event::PricingReplaced {
                    id: guard.id,
                    pricing: guard.pricing.clone(),
                    revision: guard.pricing_revision,
                });
            }
        }

        for key in self.store.day_keys() {
            let Some(ds) = self.store.get_day(&key) else { continue };
            let guard = ds.read().await;
            events.push(Event::DayMaterialized {
                court_id: key.court_id,
                date: key.date,
                is_closed: guard.day.is_closed,
                slots: guard.day.slots.clone(),
            });
            // Current status and cancel reason travel inside the reservation.
            for reservation in &guard.reservations {
                events.push(Event::ReservationPlaced {
                    reservation: reservation.clone(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::debug!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
