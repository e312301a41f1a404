//! Price resolution over a court's pricing rule set.
//!
//! Resolution is a pure function of the rule set and the request. The booking
//! flow and the management console both call [`resolve_price`], so a preview
//! computed from a cached rule set always agrees with the price charged.
//!
//! Advanced rule sets are evaluated tier by tier, most specific first:
//! exact date, then date period, then recurring time-of-day, then base. The
//! first tier with a matching rule decides the price.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::limits::*;
use crate::model::*;

/// Which tier produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    Flat,
    Date,
    Period,
    TimeOfDay,
    Base,
}

impl PriceTier {
    pub fn label(self) -> &'static str {
        match self {
            PriceTier::Flat => "flat",
            PriceTier::Date => "date",
            PriceTier::Period => "period",
            PriceTier::TimeOfDay => "time_of_day",
            PriceTier::Base => "base",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    pub amount: Money,
    pub tier: PriceTier,
    /// Label of the matching override, if any.
    pub label: Option<String>,
}

/// The rule that won for a (date, start) pair.
enum Matched<'a> {
    Flat(&'a DurationPrice),
    Date(&'a DateOverride),
    Period(&'a PeriodOverride),
    TimeOfDay(&'a TimeSlotPrice),
    Base(&'a DurationPrice),
}

fn matching_rule<'a>(rules: &'a PricingRuleSet, date: NaiveDate, start: SlotTime) -> Matched<'a> {
    let advanced = match rules {
        PricingRuleSet::Flat { prices } => return Matched::Flat(prices),
        PricingRuleSet::Advanced(advanced) => advanced,
    };
    if let Some(rule) = advanced.date_overrides.active().iter().find(|r| r.date == date) {
        return Matched::Date(rule);
    }
    if let Some(rule) = advanced
        .period_overrides
        .active()
        .iter()
        .find(|r| r.start_date <= date && date <= r.end_date)
    {
        return Matched::Period(rule);
    }
    let weekday = date.weekday();
    if let Some(rule) = advanced
        .time_slot_pricing
        .active()
        .iter()
        .find(|r| r.start <= start && start < r.end && r.applies_on(weekday))
    {
        return Matched::TimeOfDay(rule);
    }
    Matched::Base(&advanced.base)
}

/// Price of a reservation of `duration` starting at `start` on `date`.
pub fn resolve_price(rules: &PricingRuleSet, date: NaiveDate, start: SlotTime, duration: BookingDuration) -> Money {
    let prices = match matching_rule(rules, date, start) {
        Matched::Flat(p) | Matched::Base(p) => p,
        Matched::Date(r) => &r.prices,
        Matched::Period(r) => &r.prices,
        Matched::TimeOfDay(r) => &r.prices,
    };
    prices.get(duration)
}

/// Like [`resolve_price`], also reporting which tier matched.
pub fn quote_price(rules: &PricingRuleSet, date: NaiveDate, start: SlotTime, duration: BookingDuration) -> PriceQuote {
    let (prices, tier, label) = match matching_rule(rules, date, start) {
        Matched::Flat(p) => (p, PriceTier::Flat, None),
        Matched::Base(p) => (p, PriceTier::Base, None),
        Matched::Date(r) => (&r.prices, PriceTier::Date, Some(r.label.clone())),
        Matched::Period(r) => (&r.prices, PriceTier::Period, Some(r.label.clone())),
        Matched::TimeOfDay(r) => (&r.prices, PriceTier::TimeOfDay, Some(r.label.clone())),
    };
    PriceQuote {
        amount: prices.get(duration),
        tier,
        label,
    }
}

// ── Write-time validation ────────────────────────────────────────

fn check_prices(what: &str, prices: &DurationPrice) -> Result<(), String> {
    for duration in BookingDuration::ALL {
        if prices.get(duration).is_sign_negative() {
            return Err(format!("{what}: negative price for {duration:?}"));
        }
    }
    Ok(())
}

fn check_label(what: &str, label: &str) -> Result<(), String> {
    if label.len() > MAX_LABEL_LEN {
        return Err(format!("{what}: label longer than {MAX_LABEL_LEN} bytes"));
    }
    Ok(())
}

fn check_tier_len<T>(what: &str, tier: &RuleTier<T>) -> Result<(), String> {
    if tier.rules.len() > MAX_RULES_PER_TIER {
        return Err(format!("{what}: more than {MAX_RULES_PER_TIER} rules"));
    }
    Ok(())
}

fn days_intersect(a: &TimeSlotPrice, b: &TimeSlotPrice) -> bool {
    a.days_of_week.is_empty()
        || b.days_of_week.is_empty()
        || a.days_of_week.iter().any(|d| b.days_of_week.contains(d))
}

/// Reject malformed rule sets before they are stored. Rules inside one tier may
/// not overlap, so resolution never depends on rule order. Disabled tiers are
/// checked too: enabling one later must not surface a bad rule.
pub fn validate_rule_set(rules: &PricingRuleSet) -> Result<(), String> {
    let advanced = match rules {
        PricingRuleSet::Flat { prices } => return check_prices("flat prices", prices),
        PricingRuleSet::Advanced(advanced) => advanced,
    };
    check_prices("base prices", &advanced.base)?;

    check_tier_len("date overrides", &advanced.date_overrides)?;
    let mut seen = HashSet::new();
    for rule in &advanced.date_overrides.rules {
        let what = format!("date override {}", rule.date);
        check_prices(&what, &rule.prices)?;
        check_label(&what, &rule.label)?;
        if !seen.insert(rule.date) {
            return Err(format!("{what}: duplicate date"));
        }
    }

    check_tier_len("period overrides", &advanced.period_overrides)?;
    let periods = &advanced.period_overrides.rules;
    for (i, rule) in periods.iter().enumerate() {
        let what = format!("period override {}..{}", rule.start_date, rule.end_date);
        check_prices(&what, &rule.prices)?;
        check_label(&what, &rule.label)?;
        if rule.end_date < rule.start_date {
            return Err(format!("{what}: end date before start date"));
        }
        if let Some(other) = periods[..i]
            .iter()
            .find(|o| o.start_date <= rule.end_date && rule.start_date <= o.end_date)
        {
            return Err(format!(
                "{what}: overlaps period override {}..{}",
                other.start_date, other.end_date
            ));
        }
    }

    check_tier_len("time slot pricing", &advanced.time_slot_pricing)?;
    let slots = &advanced.time_slot_pricing.rules;
    for (i, rule) in slots.iter().enumerate() {
        let what = format!("time slot price {}-{}", rule.start, rule.end);
        check_prices(&what, &rule.prices)?;
        check_label(&what, &rule.label)?;
        if rule.start >= rule.end {
            return Err(format!("{what}: empty time range"));
        }
        if rule.days_of_week.len() > MAX_WEEKDAYS_PER_RULE {
            return Err(format!("{what}: too many weekdays"));
        }
        let distinct: HashSet<_> = rule.days_of_week.iter().collect();
        if distinct.len() != rule.days_of_week.len() {
            return Err(format!("{what}: duplicate weekday"));
        }
        if let Some(other) = slots[..i]
            .iter()
            .find(|o| o.start < rule.end && rule.start < o.end && days_intersect(o, rule))
        {
            return Err(format!("{what}: overlaps time slot price {}-{}", other.start, other.end));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn eur(one_hour: i64, one_hour_half: i64) -> DurationPrice {
        DurationPrice::new(Money::from(one_hour), Money::from(one_hour_half))
    }

    fn peak(start: &str, end: &str, days: &[Weekday], prices: DurationPrice) -> TimeSlotPrice {
        TimeSlotPrice {
            start: t(start),
            end: t(end),
            days_of_week: days.to_vec(),
            label: "Peak".into(),
            prices,
        }
    }

    /// Christmas override, December period, evening peak, base.
    fn december_rules() -> AdvancedPricing {
        AdvancedPricing {
            base: eur(20, 28),
            date_overrides: RuleTier::enabled(vec![DateOverride {
                date: d("2025-12-25"),
                label: "Christmas".into(),
                prices: eur(50, 70),
            }]),
            period_overrides: RuleTier::enabled(vec![PeriodOverride {
                start_date: d("2025-12-01"),
                end_date: d("2025-12-31"),
                label: "December".into(),
                prices: eur(30, 42),
            }]),
            time_slot_pricing: RuleTier::enabled(vec![peak("18:00", "22:00", &[], eur(25, 35))]),
        }
    }

    #[test]
    fn date_override_beats_every_other_tier() {
        let rules = PricingRuleSet::Advanced(december_rules());
        assert_eq!(
            resolve_price(&rules, d("2025-12-25"), t("19:00"), BookingDuration::OneHour),
            Money::from(50)
        );
        assert_eq!(
            resolve_price(&rules, d("2025-12-25"), t("19:00"), BookingDuration::OneHourHalf),
            Money::from(70)
        );
    }

    #[test]
    fn each_tier_falls_through_to_the_next() {
        let rules = PricingRuleSet::Advanced(december_rules());
        let price = |date: &str, time: &str| resolve_price(&rules, d(date), t(time), BookingDuration::OneHour);
        assert_eq!(price("2025-12-24", "19:00"), Money::from(30)); // period
        assert_eq!(price("2025-11-30", "19:00"), Money::from(25)); // time of day
        assert_eq!(price("2025-11-30", "10:00"), Money::from(20)); // base
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let rules = PricingRuleSet::Advanced(december_rules());
        let quote = |date: &str| quote_price(&rules, d(date), t("10:00"), BookingDuration::OneHour).tier;
        assert_eq!(quote("2025-12-01"), PriceTier::Period);
        assert_eq!(quote("2025-12-31"), PriceTier::Period);
        assert_eq!(quote("2026-01-01"), PriceTier::Base);
    }

    #[test]
    fn time_range_is_half_open() {
        let rules = PricingRuleSet::Advanced(december_rules());
        let tier = |time: &str| quote_price(&rules, d("2025-11-03"), t(time), BookingDuration::OneHour).tier;
        assert_eq!(tier("17:30"), PriceTier::Base);
        assert_eq!(tier("18:00"), PriceTier::TimeOfDay);
        assert_eq!(tier("21:30"), PriceTier::TimeOfDay);
        assert_eq!(tier("22:00"), PriceTier::Base);
    }

    #[test]
    fn weekday_filter_limits_time_slot_rules() {
        let mut rules = december_rules();
        rules.time_slot_pricing = RuleTier::enabled(vec![peak("18:00", "22:00", &[Weekday::Sat, Weekday::Sun], eur(25, 35))]);
        let rules = PricingRuleSet::Advanced(rules);
        // 2025-11-01 is a Saturday, 2025-11-03 a Monday.
        assert_eq!(
            resolve_price(&rules, d("2025-11-01"), t("19:00"), BookingDuration::OneHour),
            Money::from(25)
        );
        assert_eq!(
            resolve_price(&rules, d("2025-11-03"), t("19:00"), BookingDuration::OneHour),
            Money::from(20)
        );
    }

    #[test]
    fn disabled_tiers_are_skipped() {
        let mut rules = december_rules();
        rules.date_overrides.enabled = false;
        rules.period_overrides.enabled = false;
        let rules = PricingRuleSet::Advanced(rules);
        let quote = quote_price(&rules, d("2025-12-25"), t("19:00"), BookingDuration::OneHour);
        assert_eq!(quote.amount, Money::from(25));
        assert_eq!(quote.tier, PriceTier::TimeOfDay);
        assert_eq!(quote.label.as_deref(), Some("Peak"));
    }

    #[test]
    fn flat_mode_ignores_everything_else() {
        let rules = PricingRuleSet::Flat { prices: eur(20, 28) };
        for (date, time) in [("2025-12-25", "19:00"), ("2025-06-10", "07:00"), ("2026-02-28", "23:30")] {
            assert_eq!(resolve_price(&rules, d(date), t(time), BookingDuration::OneHour), Money::from(20));
            assert_eq!(resolve_price(&rules, d(date), t(time), BookingDuration::OneHourHalf), Money::from(28));
        }
        assert_eq!(
            quote_price(&rules, d("2025-12-25"), t("19:00"), BookingDuration::OneHour).tier,
            PriceTier::Flat
        );
    }

    #[test]
    fn first_rule_in_order_wins_within_a_tier() {
        // Resolution stays total even for sets that never passed validation.
        let mut rules = december_rules();
        rules.date_overrides.rules.push(DateOverride {
            date: d("2025-12-25"),
            label: "Shadowed".into(),
            prices: eur(99, 99),
        });
        let rules = PricingRuleSet::Advanced(rules);
        assert_eq!(
            resolve_price(&rules, d("2025-12-25"), t("10:00"), BookingDuration::OneHour),
            Money::from(50)
        );
    }

    #[test]
    fn decimal_prices_are_returned_verbatim() {
        let rules = PricingRuleSet::Flat {
            prices: DurationPrice::new(Money::new(1999, 2), Money::new(2875, 2)),
        };
        let price = resolve_price(&rules, d("2025-06-10"), t("09:00"), BookingDuration::OneHourHalf);
        assert_eq!(price.to_string(), "28.75");
    }

    #[test]
    fn validation_accepts_well_formed_sets() {
        assert!(validate_rule_set(&PricingRuleSet::Advanced(december_rules())).is_ok());
        assert!(validate_rule_set(&PricingRuleSet::Flat { prices: eur(0, 0) }).is_ok());
    }

    #[test]
    fn validation_rejects_negative_prices() {
        let rules = PricingRuleSet::Flat { prices: eur(-1, 28) };
        assert!(validate_rule_set(&rules).is_err());

        let mut advanced = december_rules();
        advanced.period_overrides.rules[0].prices = eur(30, -42);
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_err());
    }

    #[test]
    fn validation_rejects_inverted_period_and_empty_time_range() {
        let mut advanced = december_rules();
        advanced.period_overrides.rules[0].end_date = d("2025-11-30");
        let err = validate_rule_set(&PricingRuleSet::Advanced(advanced)).unwrap_err();
        assert!(err.contains("end date before start date"), "{err}");

        let mut advanced = december_rules();
        advanced.time_slot_pricing.rules[0].end = t("18:00");
        let err = validate_rule_set(&PricingRuleSet::Advanced(advanced)).unwrap_err();
        assert!(err.contains("empty time range"), "{err}");
    }

    #[test]
    fn validation_rejects_same_tier_overlaps() {
        let mut advanced = december_rules();
        advanced.date_overrides.rules.push(DateOverride {
            date: d("2025-12-25"),
            label: "Again".into(),
            prices: eur(1, 1),
        });
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_err());

        let mut advanced = december_rules();
        advanced.period_overrides.rules.push(PeriodOverride {
            start_date: d("2025-12-31"),
            end_date: d("2026-01-06"),
            label: "New year".into(),
            prices: eur(1, 1),
        });
        let err = validate_rule_set(&PricingRuleSet::Advanced(advanced)).unwrap_err();
        assert!(err.contains("overlaps"), "{err}");

        let mut advanced = december_rules();
        advanced.time_slot_pricing.rules.push(peak("21:00", "23:00", &[Weekday::Fri], eur(1, 1)));
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_err());
    }

    #[test]
    fn time_slots_on_disjoint_weekdays_may_share_hours() {
        let mut advanced = december_rules();
        advanced.time_slot_pricing = RuleTier::enabled(vec![
            peak("18:00", "22:00", &[Weekday::Mon, Weekday::Tue], eur(25, 35)),
            peak("18:00", "22:00", &[Weekday::Sat], eur(30, 40)),
            peak("22:00", "23:00", &[Weekday::Mon], eur(22, 30)),
        ]);
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_ok());
    }

    #[test]
    fn validation_checks_disabled_tiers_too() {
        let mut advanced = december_rules();
        advanced.time_slot_pricing.enabled = false;
        advanced.time_slot_pricing.rules[0].start = t("23:00");
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_err());
    }

    #[test]
    fn validation_rejects_long_labels() {
        let mut advanced = december_rules();
        advanced.date_overrides.rules[0].label = "x".repeat(MAX_LABEL_LEN + 1);
        assert!(validate_rule_set(&PricingRuleSet::Advanced(advanced)).is_err());
    }
}
