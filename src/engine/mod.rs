mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{is_consistent, occupants, plan_close, plan_reopen, plan_toggle};
pub use error::{EngineError, ErrorKind};
pub use store::{CalendarStore, ReservationClaim};

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use tokio::sync::{
    mpsc, oneshot, Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::catalog;
use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCourtState = Arc<RwLock<CourtState>>;
pub type SharedDayState = Arc<RwLock<DayState>>;

/// Shared hold on the commit gate. Every commit task keeps a clone, so
/// compaction also waits for commits whose callers have gone away.
pub(super) type CommitPermit = Arc<OwnedRwLockReadGuard<()>>;
/// Court read lock a commit task can keep past its caller.
pub(super) type CourtRead = Arc<OwnedRwLockReadGuard<CourtState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
                }
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// Source of "now". Dates and phases are facility-local wall-clock values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => chrono::Local::now().naive_local(),
            Clock::Fixed(at) => *at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Days from today that are materialized on first touch.
    pub horizon_days: u32,
    /// Upper bound on waiting for a court or day lock.
    pub lock_timeout: Duration,
    pub clock: Clock,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            clock: Clock::System,
        }
    }
}

pub struct Engine {
    pub(super) courts: Arc<DashMap<Ulid, SharedCourtState>>,
    pub(super) store: Arc<CalendarStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) options: EngineOptions,
    /// Shared by every committing operation, exclusive for compaction, so a
    /// compaction snapshot never misses an appended event.
    pub(super) commit_gate: Arc<RwLock<()>>,
    /// Serializes court creation so an id is checked and committed as one step.
    pub(super) court_creation: Arc<Mutex<()>>,
}

/// Apply a court-level event (no locking, caller holds the lock).
fn apply_to_court(cs: &mut CourtState, event: &Event) {
    match event {
        Event::ScheduleUpdated { schedule, .. } => cs.schedule = schedule.clone(),
        Event::PricingReplaced { pricing, revision, .. } => {
            cs.pricing = pricing.clone();
            cs.pricing_revision = *revision;
        }
        _ => {}
    }
}

/// Write event to WAL via the background group-commit writer.
async fn append_event(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

/// Await a commit task. The task runs to completion even if this future is dropped.
async fn join_commit<T>(task: JoinHandle<Result<T, EngineError>>) -> Result<T, EngineError> {
    task.await
        .map_err(|e| EngineError::WalError(format!("commit task failed: {e}")))?
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, options: EngineOptions) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            courts: Arc::new(DashMap::new()),
            store: Arc::new(CalendarStore::new()),
            wal_tx,
            notify,
            options,
            commit_gate: Arc::new(RwLock::new(())),
            court_creation: Arc::new(Mutex::new(())),
        };

        // Replay: we're the sole owner of these Arcs, so try_write always succeeds.
        // Never block here; this may run inside an async context (lazy facility creation).
        for event in &events {
            match event {
                Event::CourtCreated {
                    id,
                    name,
                    schedule,
                    pricing,
                } => {
                    let cs = CourtState::new(*id, name.clone(), schedule.clone(), pricing.clone());
                    engine.courts.insert(*id, Arc::new(RwLock::new(cs)));
                }
                Event::ScheduleUpdated { id, .. } | Event::PricingReplaced { id, .. } => {
                    if let Some(rs) = engine.court_handle(id)
                        && let Ok(mut guard) = rs.try_write()
                    {
                        apply_to_court(&mut guard, event);
                    }
                }
                Event::DayMaterialized {
                    court_id,
                    date,
                    is_closed,
                    slots,
                } => {
                    engine.store.insert_day(CalendarDay {
                        court_id: *court_id,
                        date: *date,
                        is_closed: *is_closed,
                        slots: slots.clone(),
                    });
                }
                other => {
                    if let Some(key) = other.day_key()
                        && let Some(ds) = engine.store.get_day(&key)
                        && let Ok(mut guard) = ds.try_write()
                    {
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }

        tracing::debug!(
            "replayed {} events: {} courts, {} days",
            events.len(),
            engine.courts.len(),
            engine.store.day_count()
        );
        Ok(engine)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn court_handle(&self, id: &Ulid) -> Option<SharedCourtState> {
        self.courts.get(id).map(|e| e.value().clone())
    }

    pub(super) fn court(&self, id: Ulid) -> Result<SharedCourtState, EngineError> {
        self.court_handle(&id).ok_or(EngineError::CourtNotFound(id))
    }

    /// Dates in `[today, today + horizon_days)` are materialized on first touch.
    pub fn in_horizon(&self, date: NaiveDate) -> bool {
        let today = self.options.clock.today();
        date >= today && (date - today).num_days() < i64::from(self.options.horizon_days)
    }

    /// Await a lock, giving up after the configured timeout.
    pub(super) async fn bounded<F: Future>(&self, what: &'static str, lock: F) -> Result<F::Output, EngineError> {
        match tokio::time::timeout(self.options.lock_timeout, lock).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!(crate::observability::LOCK_TIMEOUTS_TOTAL, "lock" => what).increment(1);
                tracing::warn!("timed out waiting for {what} lock");
                Err(EngineError::ConcurrencyConflict(format!("timed out waiting for {what} lock")))
            }
        }
    }

    /// Hold the commit gate for one public operation.
    pub(super) async fn begin_commit(&self) -> CommitPermit {
        Arc::new(self.commit_gate.clone().read_owned().await)
    }

    pub(super) async fn court_read(&self, id: Ulid) -> Result<CourtRead, EngineError> {
        let rs = self.court(id)?;
        Ok(Arc::new(self.bounded("court", rs.read_owned()).await?))
    }

    /// WAL-append + apply + notify for a day-level event. Hands the lock back
    /// once the event is applied.
    pub(super) async fn persist_and_apply(
        &self,
        permit: &CommitPermit,
        ds: OwnedRwLockWriteGuard<DayState>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        self.commit_day(permit, ds, event, None).await
    }

    /// Append and apply run in their own task, which owns the day lock, so a
    /// caller dropped mid-commit never leaves an event on disk but not in
    /// memory. A placement's id claim is kept only if the event is applied.
    pub(super) async fn commit_day(
        &self,
        permit: &CommitPermit,
        mut ds: OwnedRwLockWriteGuard<DayState>,
        event: Event,
        claim: Option<ReservationClaim>,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let permit = permit.clone();
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        let notify = self.notify.clone();
        join_commit(tokio::spawn(async move {
            let _permit = permit;
            append_event(&wal_tx, &event).await?;
            store.apply_event(&mut ds, &event);
            if let Some(claim) = claim {
                claim.commit();
            }
            debug_assert!(is_consistent(&ds), "day {} left inconsistent", ds.day.date);
            crate::observability::record_event(&event);
            notify.send(event.court_id(), &event);
            Ok::<_, EngineError>(ds)
        }))
        .await
    }

    /// WAL-append + apply + notify for a court-level event, in a task that owns
    /// the court's write lock.
    pub(super) async fn persist_and_apply_court(
        &self,
        permit: &CommitPermit,
        mut cs: OwnedRwLockWriteGuard<CourtState>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<CourtState>, EngineError> {
        let permit = permit.clone();
        let wal_tx = self.wal_tx.clone();
        let notify = self.notify.clone();
        join_commit(tokio::spawn(async move {
            let _permit = permit;
            append_event(&wal_tx, &event).await?;
            apply_to_court(&mut cs, &event);
            crate::observability::record_event(&event);
            notify.send(cs.id, &event);
            Ok::<_, EngineError>(cs)
        }))
        .await
    }

    /// Commit a new court. The creation lock travels with the task, so a
    /// second create of the same id waits for this one to land.
    pub(super) async fn commit_court(
        &self,
        permit: &CommitPermit,
        creating: OwnedMutexGuard<()>,
        event: Event,
        cs: CourtState,
    ) -> Result<(), EngineError> {
        let permit = permit.clone();
        let wal_tx = self.wal_tx.clone();
        let courts = self.courts.clone();
        let notify = self.notify.clone();
        join_commit(tokio::spawn(async move {
            let _permit = permit;
            let _creating = creating;
            append_event(&wal_tx, &event).await?;
            let id = cs.id;
            courts.insert(id, Arc::new(RwLock::new(cs)));
            crate::observability::record_event(&event);
            notify.send(id, &event);
            Ok::<_, EngineError>(())
        }))
        .await
    }

    /// Stored day, or a freshly materialized one when `date` is inside the horizon.
    pub(super) async fn day_entry(
        &self,
        permit: &CommitPermit,
        court: &CourtRead,
        date: NaiveDate,
    ) -> Result<SharedDayState, EngineError> {
        let key = DayKey::new(court.id, date);
        if let Some(ds) = self.store.get_day(&key) {
            return Ok(ds);
        }
        if !self.in_horizon(date) {
            return Err(EngineError::DayNotFound {
                court_id: court.id,
                date,
            });
        }
        self.materialize(permit, court, date).await
    }

    /// The commit task keeps the court read lock until the day is stored, which
    /// pins the schedule the day was built from.
    pub(super) async fn materialize(
        &self,
        permit: &CommitPermit,
        court: &CourtRead,
        date: NaiveDate,
    ) -> Result<SharedDayState, EngineError> {
        let day = catalog::default_day(court.id, &court.schedule, date);
        let event = Event::DayMaterialized {
            court_id: court.id,
            date,
            is_closed: day.is_closed,
            slots: day.slots.clone(),
        };
        let permit = permit.clone();
        let court = court.clone();
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        let notify = self.notify.clone();
        join_commit(tokio::spawn(async move {
            let _permit = permit;
            append_event(&wal_tx, &event).await?;
            // Concurrent materializations build identical days under the same
            // court lock; the first insert wins, as it does on replay.
            let shared = store.insert_day(day);
            crate::observability::record_event(&event);
            notify.send(court.id, &event);
            Ok::<_, EngineError>(shared)
        }))
        .await
    }

    /// Lookup reservation → day, acquire the day's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<DayState>, EngineError> {
        let key = self
            .store
            .day_for_reservation(&id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let ds = self.store.get_day(&key).ok_or(EngineError::ReservationNotFound(id))?;
        self.bounded("day", ds.write_owned()).await
    }
}
