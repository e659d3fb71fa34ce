//! Three-tier time-of-use electricity tariff (Taiwan high-voltage schedule).
//!
//! Lookups are pure functions of plant-local wall-clock time. Prices are in
//! NT$/kWh.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::helpers::f64_to_decimal_2dp;

/// Summer season runs from May 16 to October 15 inclusive, as (month, day).
const SUMMER_START: (u32, u32) = (5, 16);
const SUMMER_END: (u32, u32) = (10, 15);

/// Off-peak price used if no tier of a table covers an hour.
const FALLBACK_OFF_PEAK: Decimal = Decimal::from_parts(232, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Saturday,
    Sunday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Summer,
    NonSummer,
}

/// Tariff tier, listed in lookup precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Peak,
    SemiPeak,
    OffPeak,
}

/// One tier of one (day type, season) table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PricingPeriod {
    pub day_type: DayType,
    pub season: Season,
    pub tier: Tier,
    /// None when the tier does not apply to this table
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    /// Half-open `[start, end)` hour ranges
    #[schema(value_type = Vec<Vec<u32>>)]
    pub hour_ranges: Vec<(u32, u32)>,
}

/// Resolved tariff for one instant.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Tariff {
    pub tier: Tier,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub season: Season,
    pub day_type: DayType,
}

/// Tariff for one hour of a preview window.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HourlyPrice {
    /// Local time at the start of the hour
    #[schema(value_type = String)]
    pub starts_at: NaiveDateTime,
    pub hour: u32,
    pub tier: Tier,
    #[schema(value_type = String)]
    pub price: Decimal,
}

struct TierRow {
    price: Option<Decimal>,
    ranges: &'static [(u32, u32)],
}

fn nt(cents: i64) -> Option<Decimal> {
    Some(Decimal::new(cents, 2))
}

/// Peak, semi-peak and off-peak rows for a table, in precedence order.
fn table(day_type: DayType, season: Season) -> [(Tier, TierRow); 3] {
    const NONE: &[(u32, u32)] = &[];
    let (peak, semi, off) = match (day_type, season) {
        (DayType::Weekday, Season::Summer) => (
            TierRow { price: nt(939), ranges: &[(16, 22)] },
            TierRow { price: nt(585), ranges: &[(9, 16), (22, 24)] },
            TierRow { price: nt(253), ranges: &[(0, 9)] },
        ),
        (DayType::Weekday, Season::NonSummer) => (
            TierRow { price: None, ranges: NONE },
            TierRow { price: nt(547), ranges: &[(6, 11), (14, 24)] },
            TierRow { price: nt(232), ranges: &[(0, 6), (11, 14)] },
        ),
        (DayType::Saturday, Season::Summer) => (
            TierRow { price: None, ranges: NONE },
            TierRow { price: nt(260), ranges: &[(9, 24)] },
            TierRow { price: nt(253), ranges: &[(0, 9)] },
        ),
        (DayType::Saturday, Season::NonSummer) => (
            TierRow { price: None, ranges: NONE },
            TierRow { price: nt(241), ranges: &[(6, 11), (14, 24)] },
            TierRow { price: nt(232), ranges: &[(0, 6), (11, 14)] },
        ),
        (DayType::Sunday, Season::Summer) => (
            TierRow { price: None, ranges: NONE },
            TierRow { price: None, ranges: NONE },
            TierRow { price: nt(253), ranges: &[(0, 24)] },
        ),
        (DayType::Sunday, Season::NonSummer) => (
            TierRow { price: None, ranges: NONE },
            TierRow { price: None, ranges: NONE },
            TierRow { price: nt(232), ranges: &[(0, 24)] },
        ),
    };
    [(Tier::Peak, peak), (Tier::SemiPeak, semi), (Tier::OffPeak, off)]
}

pub fn season_of(date: NaiveDateTime) -> Season {
    let md = (date.month(), date.day());
    if md >= SUMMER_START && md <= SUMMER_END {
        Season::Summer
    } else {
        Season::NonSummer
    }
}

pub fn day_type_of(date: NaiveDateTime) -> DayType {
    match date.weekday() {
        Weekday::Sun => DayType::Sunday,
        Weekday::Sat => DayType::Saturday,
        _ => DayType::Weekday,
    }
}

/// Resolve the tariff in force at a local wall-clock time.
pub fn current_tariff(local: NaiveDateTime) -> Tariff {
    let season = season_of(local);
    let day_type = day_type_of(local);
    let hour = local.hour();
    let rows = table(day_type, season);

    for (tier, row) in &rows {
        if let Some(price) = row.price {
            if row.ranges.iter().any(|&(s, e)| hour >= s && hour < e) {
                return Tariff {
                    tier: *tier,
                    price,
                    season,
                    day_type,
                };
            }
        }
    }

    Tariff {
        tier: Tier::OffPeak,
        price: rows[2].1.price.unwrap_or(FALLBACK_OFF_PEAK),
        season,
        day_type,
    }
}

/// Tariffs for `hours` consecutive hours starting at `start`, each resolved
/// independently so the window may cross day-type and season boundaries.
pub fn hourly_preview(start: NaiveDateTime, hours: u32) -> Vec<HourlyPrice> {
    (0..hours)
        .map(|i| {
            let at = start + Duration::hours(i as i64);
            let tariff = current_tariff(at);
            HourlyPrice {
                starts_at: at,
                hour: at.hour(),
                tier: tariff.tier,
                price: tariff.price,
            }
        })
        .collect()
}

/// Electricity cost of running a load of `kw` for `hours` at `price` NT$/kWh.
pub fn running_cost(kw: f64, hours: f64, price: Decimal) -> Decimal {
    (f64_to_decimal_2dp(kw * hours) * price).round_dp(2)
}

/// Every tier of every table, for display and auditing.
pub fn all_periods() -> Vec<PricingPeriod> {
    let mut periods = Vec::with_capacity(18);
    for day_type in [DayType::Weekday, DayType::Saturday, DayType::Sunday] {
        for season in [Season::Summer, Season::NonSummer] {
            for (tier, row) in table(day_type, season) {
                periods.push(PricingPeriod {
                    day_type,
                    season,
                    tier,
                    price: row.price,
                    hour_ranges: row.ranges.to_vec(),
                });
            }
        }
    }
    periods
}
