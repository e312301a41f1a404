use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::Config;
use crate::engine::{Engine, EngineOptions};
use crate::horizon;
use crate::limits::*;
use crate::notify::NotifyHub;

/// Per-facility engines. Each facility gets its own Engine, WAL file and
/// background horizon/compaction tasks.
pub struct FacilityManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    options: EngineOptions,
    compact_threshold: u64,
    maintenance_interval: Duration,
}

/// Keep only characters that are safe in a file name.
fn sanitize(facility: &str) -> String {
    facility
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl FacilityManager {
    pub fn new(
        data_dir: PathBuf,
        options: EngineOptions,
        compact_threshold: u64,
        maintenance_interval: Duration,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            options,
            compact_threshold,
            maintenance_interval,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.engine_options(),
            config.compact_threshold,
            config.maintenance_interval,
        )
    }

    /// Get or lazily create the engine for a facility. Names that sanitize to
    /// the same file share one engine.
    pub fn get_or_create(&self, facility: &str) -> std::io::Result<Arc<Engine>> {
        if facility.len() > MAX_FACILITY_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "facility name too long",
            ));
        }
        let safe_name = sanitize(facility);
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty facility name",
            ));
        }
        if let Some(engine) = self.engines.get(&safe_name) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_FACILITIES {
            return Err(std::io::Error::other("too many facilities"));
        }

        // The entry guard serializes concurrent first opens of one facility,
        // so its WAL is replayed and its tasks spawned exactly once.
        let entry = self.engines.entry(safe_name.clone());
        let engine = match entry {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(v) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let notify = Arc::new(NotifyHub::new());
                let engine = Arc::new(Engine::new(wal_path, notify, self.options.clone())?);
                v.insert(engine.clone());
                engine
            }
        };

        let horizon_engine = engine.clone();
        let every = self.maintenance_interval;
        tokio::spawn(async move {
            horizon::run_horizon(horizon_engine, every).await;
        });
        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            horizon::run_compactor(compactor_engine, threshold, every).await;
        });

        metrics::gauge!(crate::observability::FACILITIES_ACTIVE).set(self.engines.len() as f64);
        tracing::info!("facility {safe_name} loaded");
        Ok(engine)
    }

    pub fn get(&self, facility: &str) -> Option<Arc<Engine>> {
        self.engines.get(&sanitize(facility)).map(|e| e.value().clone())
    }

    /// Loaded facility names, sorted.
    pub fn facilities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Compact every loaded facility's WAL. Used on shutdown.
    pub async fn compact_all(&self) {
        let engines: Vec<(String, Arc<Engine>)> = self
            .engines
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (name, engine) in engines {
            if let Err(e) = engine.compact_wal().await {
                tracing::error!("compaction of {name} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Clock;
    use crate::model::*;
    use chrono::NaiveDate;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("courtside_test_facility").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> FacilityManager {
        let options = EngineOptions {
            clock: Clock::Fixed(
                NaiveDate::from_ymd_opt(2025, 6, 1)
                    .unwrap()
                    .and_hms_opt(8, 0, 0)
                    .unwrap(),
            ),
            ..EngineOptions::default()
        };
        FacilityManager::new(dir, options, 1000, Duration::from_secs(3600))
    }

    fn schedule() -> WeeklySchedule {
        WeeklySchedule::uniform(&WEEK, SlotTime::new(9, 0).unwrap(), SlotTime::new(22, 0).unwrap())
    }

    fn flat(amount: i64) -> PricingRuleSet {
        PricingRuleSet::Flat {
            prices: DurationPrice::new(Money::from(amount), Money::from(amount + 10)),
        }
    }

    #[tokio::test]
    async fn facility_isolation() {
        let fm = manager(test_data_dir("isolation"));
        let north = fm.get_or_create("north").unwrap();
        let south = fm.get_or_create("south").unwrap();

        // Same court id in both facilities
        let court = Ulid::new();
        north.create_court(court, None, schedule(), flat(20)).await.unwrap();
        south.create_court(court, None, schedule(), flat(30)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let change = north.close_day(court, date).await.unwrap();
        assert!(change.day.is_closed);

        let other = south.get_calendar_day(court, date).await.unwrap();
        assert!(!other.is_closed);
        let price = south
            .resolve_price(court, date, SlotTime::new(18, 0).unwrap(), BookingDuration::OneHour)
            .await
            .unwrap();
        assert_eq!(price, Money::from(30));
    }

    #[tokio::test]
    async fn facility_lazy_creation() {
        let dir = test_data_dir("lazy");
        let fm = manager(dir.clone());

        assert!(fs::read_dir(&dir).unwrap().next().is_none());
        let _engine = fm.get_or_create("club_7").unwrap();
        assert!(dir.join("club_7.wal").exists());
        assert_eq!(fm.facilities(), ["club_7"]);
    }

    #[tokio::test]
    async fn same_engine_returned() {
        let fm = manager(test_data_dir("same_engine"));
        let a = fm.get_or_create("padel").unwrap();
        let b = fm.get_or_create("padel").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(fm.get("padel").is_some_and(|c| Arc::ptr_eq(&a, &c)));
        assert!(fm.get("tennis").is_none());
    }

    #[tokio::test]
    async fn facility_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let fm = manager(dir.clone());

        let _engine = fm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        assert!(fm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn facility_name_too_long() {
        let fm = manager(test_data_dir("name_too_long"));
        let err = fm
            .get_or_create(&"x".repeat(MAX_FACILITY_NAME_LEN + 1))
            .err()
            .unwrap();
        assert!(err.to_string().contains("facility name too long"));
    }

    #[tokio::test]
    async fn facility_state_survives_reload() {
        let dir = test_data_dir("reload");
        let court = Ulid::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        {
            let fm = manager(dir.clone());
            let engine = fm.get_or_create("riverside").unwrap();
            engine.create_court(court, Some("Center".into()), schedule(), flat(20)).await.unwrap();
            engine.close_day(court, date).await.unwrap();
        }

        let fm = manager(dir);
        let engine = fm.get_or_create("riverside").unwrap();
        assert_eq!(engine.get_court(court).await.unwrap().name.as_deref(), Some("Center"));
        assert!(engine.get_calendar_day(court, date).await.unwrap().is_closed);
    }
}
