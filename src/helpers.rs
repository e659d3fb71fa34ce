//! Shared numeric and time helpers.
//!
//! Weather values are carried as f64 and rounded for display; money is carried
//! as `Decimal` so tariff arithmetic stays exact.

use chrono::{DateTime, Duration, TimeZone, Timelike};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Round to one decimal place. Non-finite input yields 0.
pub(crate) fn round_1dp(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    (v * 10.0).round() / 10.0
}

/// Convert an f64 to Decimal, rounded to 2 decimal places.
///
/// Used for currency amounts derived from kW figures.
pub(crate) fn f64_to_decimal_2dp(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_2dp received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_f64(v).unwrap_or_default().round_dp(2)
}

/// Floor a datetime to the start of its hour.
pub(crate) fn floor_to_hour<Tz: TimeZone>(dt: DateTime<Tz>) -> DateTime<Tz> {
    let excess = Duration::minutes(dt.minute() as i64)
        + Duration::seconds(dt.second() as i64)
        + Duration::nanoseconds(dt.nanosecond() as i64);
    dt - excess
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use std::str::FromStr;

    #[test]
    fn test_round_1dp() {
        assert_eq!(round_1dp(59.96), 60.0);
        assert_eq!(round_1dp(59.94), 59.9);
        assert_eq!(round_1dp(f64::NAN), 0.0);
    }

    #[test]
    fn test_f64_to_decimal_2dp() {
        assert_eq!(
            f64_to_decimal_2dp(3868.68),
            Decimal::from_str("3868.68").unwrap()
        );
        assert_eq!(f64_to_decimal_2dp(f64::INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_floor_to_hour_keeps_offset() {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let dt = tz.with_ymd_and_hms(2025, 7, 1, 17, 42, 13).unwrap();
        let floored = floor_to_hour(dt);
        assert_eq!(floored, tz.with_ymd_and_hms(2025, 7, 1, 17, 0, 0).unwrap());

        let utc = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(floor_to_hour(utc), utc);
    }
}
