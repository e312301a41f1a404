use std::sync::Arc;

use tracing::info;

use courtside::config::Config;
use courtside::facility::FacilityManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    courtside::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let facilities = Arc::new(FacilityManager::from_config(&config));
    for name in &config.facilities {
        let engine = facilities.get_or_create(name)?;
        let courts = engine.list_courts().await;
        info!("facility {name}: {} courts", courts.len());
    }

    info!("courtside running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  horizon: {} days", config.horizon_days);
    info!("  lock_timeout: {:?}", config.lock_timeout);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Run until SIGTERM/ctrl-c, then leave every WAL compacted.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received, compacting WALs");
    facilities.compact_all().await;
    info!("courtside stopped");
    Ok(())
}
