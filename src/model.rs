use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Currency amount. Inputs are pre-quantized; nothing here rounds.
pub type Money = Decimal;

/// Length of one bookable slot in minutes.
pub const SLOT_MINUTES: u16 = 30;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Monday-first, matching `Weekday::num_days_from_monday`.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

// ── Time of day ──────────────────────────────────────────────────

/// Minute-precision time of day, rendered `HH:MM`.
/// `24:00` exists so a day can close at midnight; it never names a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime(u16);

impl SlotTime {
    pub const MIDNIGHT: SlotTime = SlotTime(0);
    pub const END_OF_DAY: SlotTime = SlotTime(MINUTES_PER_DAY);

    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        hour.checked_mul(60)
            .and_then(|m| m.checked_add(minute))
            .and_then(Self::from_minutes)
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn is_slot_aligned(self) -> bool {
        self.0 % SLOT_MINUTES == 0
    }

    pub fn plus_minutes(self, minutes: u16) -> Option<Self> {
        self.0.checked_add(minutes).and_then(Self::from_minutes)
    }

    /// Anchor this time on a calendar date. `24:00` lands on the next midnight.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.0))
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for SlotTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError(format!("invalid time {s:?}: expected HH:MM"));
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        let two_digits = |p: &str| p.len() == 2 && p.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(h) || !two_digits(m) {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        SlotTime::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotTime> for String {
    fn from(value: SlotTime) -> Self {
        value.to_string()
    }
}

// ── Calendar month ───────────────────────────────────────────────

/// A calendar month, rendered `YYYY-MM`. Stored as its first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn of(date: NaiveDate) -> Self {
        Self(date - Duration::days(i64::from(date.day0())))
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let month = self.0.month();
        self.0.iter_days().take_while(move |d| d.month() == month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.0.year(), self.0.month())
    }
}

impl FromStr for YearMonth {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError(format!("invalid month {s:?}: expected YYYY-MM"));
        let (y, m) = s.split_once('-').ok_or_else(err)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(err());
        }
        let year: i32 = y.parse().map_err(|_| err())?;
        let month: u32 = m.parse().map_err(|_| err())?;
        YearMonth::new(year, month).ok_or_else(err)
    }
}

// ── Opening schedule ─────────────────────────────────────────────

/// Opening hours for one weekday. Slots cover `[open, close)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub enabled: bool,
    pub open: SlotTime,
    pub close: SlotTime,
}

impl DayHours {
    pub fn closed() -> Self {
        Self {
            enabled: false,
            open: SlotTime::MIDNIGHT,
            close: SlotTime::MIDNIGHT,
        }
    }

    pub fn open(open: SlotTime, close: SlotTime) -> Self {
        Self {
            enabled: true,
            open,
            close,
        }
    }
}

/// A court's weekly opening schedule, one entry per weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: [DayHours; 7],
}

impl WeeklySchedule {
    pub fn closed() -> Self {
        Self {
            days: [DayHours::closed(); 7],
        }
    }

    /// Same hours on each of `weekdays`, closed on the rest.
    pub fn uniform(weekdays: &[Weekday], open: SlotTime, close: SlotTime) -> Self {
        weekdays
            .iter()
            .fold(Self::closed(), |s, &wd| s.with_day(wd, DayHours::open(open, close)))
    }

    pub fn with_day(mut self, weekday: Weekday, hours: DayHours) -> Self {
        self.days[weekday.num_days_from_monday() as usize] = hours;
        self
    }

    pub fn hours(&self, weekday: Weekday) -> DayHours {
        self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, DayHours)> + '_ {
        WEEK.iter().map(|&wd| (wd, self.hours(wd)))
    }
}

// ── Calendar days ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub time: SlotTime,
    pub enabled: bool,
}

/// Store key: one calendar day of one court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey {
    pub court_id: Ulid,
    pub date: NaiveDate,
}

impl DayKey {
    pub fn new(court_id: Ulid, date: NaiveDate) -> Self {
        Self { court_id, date }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarDay {
    pub court_id: Ulid,
    pub date: NaiveDate,
    pub is_closed: bool,
    /// Sorted by `time`.
    pub slots: Vec<Slot>,
}

impl CalendarDay {
    pub fn key(&self) -> DayKey {
        DayKey::new(self.court_id, self.date)
    }

    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    pub fn slot(&self, time: SlotTime) -> Option<&Slot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &self.slots[i])
    }

    pub fn slot_mut(&mut self, time: SlotTime) -> Option<&mut Slot> {
        self.slots
            .binary_search_by_key(&time, |s| s.time)
            .ok()
            .map(|i| &mut self.slots[i])
    }

    pub fn enabled_count(&self) -> usize {
        self.slots.iter().filter(|s| s.enabled).count()
    }
}

// ── Reservations ─────────────────────────────────────────────────

/// The two sellable reservation lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingDuration {
    OneHour,
    OneHourHalf,
}

impl BookingDuration {
    pub const ALL: [BookingDuration; 2] = [BookingDuration::OneHour, BookingDuration::OneHourHalf];

    pub fn minutes(self) -> u16 {
        match self {
            BookingDuration::OneHour => 60,
            BookingDuration::OneHourHalf => 90,
        }
    }

    pub fn slot_count(self) -> usize {
        usize::from(self.minutes() / SLOT_MINUTES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Why a reservation was cancelled. Cascades are told apart from customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Customer,
    SlotEdited,
    DayClosed,
}

impl CancelReason {
    pub fn is_cascade(self) -> bool {
        matches!(self, CancelReason::SlotEdited | CancelReason::DayClosed)
    }

    pub fn label(self) -> &'static str {
        match self {
            CancelReason::Customer => "customer",
            CancelReason::SlotEdited => "slot_edited",
            CancelReason::DayClosed => "day_closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub court_id: Ulid,
    pub date: NaiveDate,
    pub start: SlotTime,
    /// Exclusive.
    pub end: SlotTime,
    pub duration: BookingDuration,
    /// Resolved at booking time.
    pub price: Money,
    pub status: ReservationStatus,
    pub cancel_reason: Option<CancelReason>,
}

impl Reservation {
    /// Pending and confirmed reservations both hold their slots.
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }

    pub fn occupies(&self, time: SlotTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, start: SlotTime, end: SlotTime) -> bool {
        self.start < end && start < self.end
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.start.on(self.date)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.end.on(self.date)
    }

    pub(crate) fn cancel(&mut self, reason: CancelReason) {
        self.status = ReservationStatus::Cancelled;
        self.cancel_reason = Some(reason);
    }
}

// ── Pricing rules ────────────────────────────────────────────────

/// Price pair for the two sellable durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationPrice {
    pub one_hour: Money,
    pub one_hour_half: Money,
}

impl DurationPrice {
    pub fn new(one_hour: Money, one_hour_half: Money) -> Self {
        Self {
            one_hour,
            one_hour_half,
        }
    }

    pub fn get(&self, duration: BookingDuration) -> Money {
        match duration {
            BookingDuration::OneHour => self.one_hour,
            BookingDuration::OneHourHalf => self.one_hour_half,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub date: NaiveDate,
    pub label: String,
    pub prices: DurationPrice,
}

/// Inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodOverride {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub label: String,
    pub prices: DurationPrice,
}

/// Recurring time-of-day price over `[start, end)`. Empty `days_of_week` means every day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlotPrice {
    pub start: SlotTime,
    pub end: SlotTime,
    pub days_of_week: Vec<Weekday>,
    pub label: String,
    pub prices: DurationPrice,
}

impl TimeSlotPrice {
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days_of_week.is_empty() || self.days_of_week.contains(&weekday)
    }
}

/// One override tier. Disabled tiers keep their rules but never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTier<T> {
    pub enabled: bool,
    pub rules: Vec<T>,
}

impl<T> RuleTier<T> {
    pub fn enabled(rules: Vec<T>) -> Self {
        Self { enabled: true, rules }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            rules: Vec::new(),
        }
    }

    /// Rules that take part in resolution, in order.
    pub fn active(&self) -> &[T] {
        if self.enabled { self.rules.as_slice() } else { &[] }
    }
}

impl<T> Default for RuleTier<T> {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedPricing {
    pub base: DurationPrice,
    pub date_overrides: RuleTier<DateOverride>,
    pub period_overrides: RuleTier<PeriodOverride>,
    pub time_slot_pricing: RuleTier<TimeSlotPrice>,
}

impl AdvancedPricing {
    pub fn with_base(base: DurationPrice) -> Self {
        Self {
            base,
            date_overrides: RuleTier::default(),
            period_overrides: RuleTier::default(),
            time_slot_pricing: RuleTier::default(),
        }
    }
}

/// Full pricing configuration of a court. Replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingRuleSet {
    Flat { prices: DurationPrice },
    Advanced(AdvancedPricing),
}

// ── Court state ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CourtState {
    pub id: Ulid,
    pub name: Option<String>,
    pub schedule: WeeklySchedule,
    pub pricing: PricingRuleSet,
    /// Bumped on every pricing replace.
    pub pricing_revision: u64,
}

impl CourtState {
    pub fn new(id: Ulid, name: Option<String>, schedule: WeeklySchedule, pricing: PricingRuleSet) -> Self {
        Self {
            id,
            name,
            schedule,
            pricing,
            pricing_revision: 0,
        }
    }
}

/// One calendar day plus every reservation made on it. Guarded by a single lock,
/// so availability edits and the cancellations they cause commit together.
#[derive(Debug, Clone)]
pub struct DayState {
    pub day: CalendarDay,
    /// Sorted by `start`, cancelled ones included.
    pub reservations: Vec<Reservation>,
}

impl DayState {
    pub fn new(day: CalendarDay) -> Self {
        Self {
            day,
            reservations: Vec::new(),
        }
    }

    /// Insert reservation maintaining sort order by start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start <= reservation.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(|r| r.is_active())
    }
}

/// WAL record format. One mutation, one event: a slot change and the
/// cancellations it causes are never split across records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourtCreated {
        id: Ulid,
        name: Option<String>,
        schedule: WeeklySchedule,
        pricing: PricingRuleSet,
    },
    ScheduleUpdated {
        id: Ulid,
        schedule: WeeklySchedule,
    },
    PricingReplaced {
        id: Ulid,
        pricing: PricingRuleSet,
        revision: u64,
    },
    DayMaterialized {
        court_id: Ulid,
        date: NaiveDate,
        is_closed: bool,
        slots: Vec<Slot>,
    },
    SlotToggled {
        court_id: Ulid,
        date: NaiveDate,
        time: SlotTime,
        enabled: bool,
        cancelled: Vec<Ulid>,
    },
    DayClosed {
        court_id: Ulid,
        date: NaiveDate,
        cancelled: Vec<Ulid>,
    },
    DayReopened {
        court_id: Ulid,
        date: NaiveDate,
        slots: Vec<Slot>,
    },
    ReservationPlaced {
        reservation: Reservation,
    },
    ReservationConfirmed {
        id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
    },
    ReservationCancelled {
        id: Ulid,
        court_id: Ulid,
        date: NaiveDate,
        reason: CancelReason,
    },
}

impl Event {
    pub fn court_id(&self) -> Ulid {
        match self {
            Event::CourtCreated { id, .. }
            | Event::ScheduleUpdated { id, .. }
            | Event::PricingReplaced { id, .. } => *id,
            Event::DayMaterialized { court_id, .. }
            | Event::SlotToggled { court_id, .. }
            | Event::DayClosed { court_id, .. }
            | Event::DayReopened { court_id, .. }
            | Event::ReservationConfirmed { court_id, .. }
            | Event::ReservationCancelled { court_id, .. } => *court_id,
            Event::ReservationPlaced { reservation } => reservation.court_id,
        }
    }

    /// The calendar day an event touches; `None` for court-level events.
    pub fn day_key(&self) -> Option<DayKey> {
        match self {
            Event::CourtCreated { .. } | Event::ScheduleUpdated { .. } | Event::PricingReplaced { .. } => None,
            Event::DayMaterialized { court_id, date, .. }
            | Event::SlotToggled { court_id, date, .. }
            | Event::DayClosed { court_id, date, .. }
            | Event::DayReopened { court_id, date, .. }
            | Event::ReservationConfirmed { court_id, date, .. }
            | Event::ReservationCancelled { court_id, date, .. } => Some(DayKey::new(*court_id, *date)),
            Event::ReservationPlaced { reservation } => {
                Some(DayKey::new(reservation.court_id, reservation.date))
            }
        }
    }

    /// Reservations cancelled as a side effect of this event.
    pub fn cascaded(&self) -> &[Ulid] {
        match self {
            Event::SlotToggled { cancelled, .. } | Event::DayClosed { cancelled, .. } => cancelled,
            _ => &[],
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub schedule: WeeklySchedule,
    pub pricing_revision: u64,
}

/// Result of an availability mutation: the day as committed plus every
/// reservation the mutation cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityChange {
    pub day: CalendarDay,
    pub cancelled: Vec<Ulid>,
}

impl AvailabilityChange {
    pub fn cancellation_count(&self) -> usize {
        self.cancelled.len()
    }
}
