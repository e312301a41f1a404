use std::time::Duration;

pub const MAX_COURTS_PER_FACILITY: usize = 1_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 128;
pub const MAX_RULES_PER_TIER: usize = 500;
pub const MAX_WEEKDAYS_PER_RULE: usize = 7;
pub const MAX_RESERVATIONS_PER_DAY: usize = 1_000;

pub const MAX_FACILITIES: usize = 10_000;
pub const MAX_FACILITY_NAME_LEN: usize = 200;

/// Days from today, inclusive of today, that are materialized on first read.
pub const DEFAULT_HORIZON_DAYS: u32 = 60;
pub const MAX_HORIZON_DAYS: u32 = 730;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// WAL appends between automatic compactions.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1_000;
