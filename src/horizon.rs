use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that keeps the rolling horizon materialized for every court,
/// so the first read of a day doesn't pay for the WAL round trip.
pub async fn run_horizon(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        extend_horizon(&engine).await;
        let pruned = engine.notify.prune();
        if pruned > 0 {
            tracing::debug!("pruned {pruned} idle notify channels");
        }
    }
}

/// One pass over all courts. Returns how many days were created.
pub async fn extend_horizon(engine: &Engine) -> usize {
    let mut created = 0;
    for court in engine.list_courts().await {
        match engine.materialize_horizon(court.id).await {
            Ok(n) => created += n,
            // Court lock busy or WAL trouble; the next pass retries.
            Err(e) => tracing::debug!("horizon skip {}: {e}", court.id),
        }
    }
    if created > 0 {
        info!("materialized {created} days");
    }
    created
}

/// Background task that compacts the WAL once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// Returns true when a compaction ran and succeeded.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    let started = std::time::Instant::now();
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::histogram!(crate::observability::WAL_COMPACT_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}
