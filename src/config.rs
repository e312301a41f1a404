use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::{Clock, EngineOptions};
use crate::limits::*;

/// Daemon settings, read from `COURTSIDE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub horizon_days: u32,
    pub lock_timeout: Duration,
    pub compact_threshold: u64,
    /// How often background tasks extend the horizon and check for compaction.
    pub maintenance_interval: Duration,
    /// Facilities loaded at startup.
    pub facilities: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            horizon_days: DEFAULT_HORIZON_DAYS,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            maintenance_interval: Duration::from_secs(60),
            facilities: Vec::new(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparsable {key}={raw:?}");
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("COURTSIDE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "COURTSIDE_METRICS_PORT"),
            horizon_days: parsed(&lookup, "COURTSIDE_HORIZON_DAYS")
                .unwrap_or(defaults.horizon_days)
                .clamp(1, MAX_HORIZON_DAYS),
            lock_timeout: parsed(&lookup, "COURTSIDE_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            compact_threshold: parsed(&lookup, "COURTSIDE_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            maintenance_interval: parsed(&lookup, "COURTSIDE_MAINTENANCE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.maintenance_interval),
            facilities: lookup("COURTSIDE_FACILITIES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            horizon_days: self.horizon_days,
            lock_timeout: self.lock_timeout,
            clock: Clock::System,
        }
    }
}
