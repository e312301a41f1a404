use chrono::NaiveDate;
use ulid::Ulid;

use crate::catalog;
use crate::model::*;
use crate::pricing::{self, PriceQuote};
use crate::projector::{self, ReservationPhase};

use super::{CommitPermit, CourtRead, Engine, EngineError};

impl Engine {
    // ── Courts ───────────────────────────────────────────────

    pub async fn list_courts(&self) -> Vec<CourtInfo> {
        let shared: Vec<_> = self.courts.iter().map(|e| e.value().clone()).collect();
        let mut result = Vec::with_capacity(shared.len());
        for rs in shared {
            let guard = rs.read().await;
            result.push(info_of(&guard));
        }
        result.sort_by_key(|c| c.id);
        result
    }

    pub async fn get_court(&self, court_id: Ulid) -> Result<CourtInfo, EngineError> {
        let rs = self.court(court_id)?;
        let guard = self.bounded("court", rs.read_owned()).await?;
        Ok(info_of(&guard))
    }

    // ── Calendar ─────────────────────────────────────────────

    /// Stored day if present, materialized if inside the horizon, else a
    /// catalog preview that is not persisted.
    pub async fn get_calendar_day(&self, court_id: Ulid, date: NaiveDate) -> Result<CalendarDay, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        self.day_view(&permit, &court, date).await
    }

    /// One entry per date of the month, ascending.
    pub async fn get_calendar_month(&self, court_id: Ulid, month: YearMonth) -> Result<Vec<CalendarDay>, EngineError> {
        let permit = self.begin_commit().await;
        let court = self.court_read(court_id).await?;
        let mut days = Vec::new();
        for date in month.days() {
            days.push(self.day_view(&permit, &court, date).await?);
        }
        Ok(days)
    }

    async fn day_view(&self, permit: &CommitPermit, court: &CourtRead, date: NaiveDate) -> Result<CalendarDay, EngineError> {
        let key = DayKey::new(court.id, date);
        let shared = match self.store.get_day(&key) {
            Some(ds) => ds,
            None if self.in_horizon(date) => self.materialize(permit, court, date).await?,
            None => return Ok(catalog::default_day(court.id, &court.schedule, date)),
        };
        let guard = self.bounded("day", shared.read_owned()).await?;
        Ok(guard.day.clone())
    }

    // ── Pricing ──────────────────────────────────────────────

    pub async fn get_pricing_rule_set(&self, court_id: Ulid) -> Result<PricingRuleSet, EngineError> {
        Ok(self.pricing_snapshot(court_id).await?.0)
    }

    /// Rule set plus the revision a later `set_pricing_rule_set` should expect.
    pub async fn pricing_snapshot(&self, court_id: Ulid) -> Result<(PricingRuleSet, u64), EngineError> {
        let rs = self.court(court_id)?;
        let guard = self.bounded("court", rs.read_owned()).await?;
        Ok((guard.pricing.clone(), guard.pricing_revision))
    }

    pub async fn resolve_price(
        &self,
        court_id: Ulid,
        date: NaiveDate,
        start: SlotTime,
        duration: BookingDuration,
    ) -> Result<Money, EngineError> {
        let rules = self.get_pricing_rule_set(court_id).await?;
        Ok(pricing::resolve_price(&rules, date, start, duration))
    }

    pub async fn quote_price(
        &self,
        court_id: Ulid,
        date: NaiveDate,
        start: SlotTime,
        duration: BookingDuration,
    ) -> Result<PriceQuote, EngineError> {
        let rules = self.get_pricing_rule_set(court_id).await?;
        let quote = pricing::quote_price(&rules, date, start, duration);
        metrics::counter!(crate::observability::PRICE_QUOTES_TOTAL, "tier" => quote.tier.label()).increment(1);
        Ok(quote)
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let key = self
            .store
            .day_for_reservation(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let ds = self.store.get_day(&key).ok_or(EngineError::ReservationNotFound(id))?;
        let guard = self.bounded("day", ds.read_owned()).await?;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Every reservation on the day, cancelled ones included, ordered by start.
    pub async fn list_reservations(&self, court_id: Ulid, date: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        if !self.courts.contains_key(&court_id) {
            return Err(EngineError::CourtNotFound(court_id));
        }
        let Some(ds) = self.store.get_day(&DayKey::new(court_id, date)) else {
            return Ok(Vec::new());
        };
        let guard = self.bounded("day", ds.read_owned()).await?;
        Ok(guard.reservations.clone())
    }

    pub async fn reservation_phase(&self, id: Ulid) -> Result<ReservationPhase, EngineError> {
        let reservation = self.get_reservation(id).await?;
        Ok(projector::classify(&reservation, self.options.clock.now()))
    }

    /// Each reservation on the day with its phase as of now.
    pub async fn project_reservations(
        &self,
        court_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<(Reservation, ReservationPhase)>, EngineError> {
        let now = self.options.clock.now();
        Ok(self
            .list_reservations(court_id, date)
            .await?
            .into_iter()
            .map(|r| {
                let phase = projector::classify(&r, now);
                (r, phase)
            })
            .collect())
    }
}

fn info_of(cs: &CourtState) -> CourtInfo {
    CourtInfo {
        id: cs.id,
        name: cs.name.clone(),
        schedule: cs.schedule.clone(),
        pricing_revision: cs.pricing_revision,
    }
}
