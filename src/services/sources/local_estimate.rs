//! Offline seasonal estimate. Used when every remote source fails; never fails
//! itself and always yields a full 24-hour series.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use std::f64::consts::PI;

use super::{
    hourly_slots, ForecastPoint, ForecastSeries, SourceError, SourceFetch, SourceLabel,
    WeatherSample, WeatherSource, FORECAST_HOURS,
};
use crate::helpers::round_1dp;

const ESTIMATE_HUMIDITY_RANGE: (f64, f64) = (40.0, 95.0);

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEstimateSource;

/// (base temperature, temperature amplitude, base humidity) for a month.
fn seasonal_profile(month: u32) -> (f64, f64, f64) {
    match month {
        6..=9 => (28.0, 5.0, 75.0),
        12 | 1 | 2 => (14.0, 4.0, 70.0),
        _ => (22.0, 5.0, 70.0),
    }
}

/// Estimated (temperature, humidity) at a local hour of a month.
/// Temperature peaks mid-afternoon; humidity bottoms out around 14:00.
pub fn estimate_at(month: u32, hour: u32) -> (f64, f64) {
    let (base_t, amp_t, base_h) = seasonal_profile(month);
    let h = hour as f64;
    let temp = base_t + amp_t * ((h - 6.0) * PI / 12.0).sin();
    let hum = base_h + 10.0 * ((h - 14.0) * PI / 12.0).cos();
    (
        round_1dp(temp),
        hum.clamp(ESTIMATE_HUMIDITY_RANGE.0, ESTIMATE_HUMIDITY_RANGE.1).round(),
    )
}

impl LocalEstimateSource {
    /// Infallible fetch used as the terminal step of the chain.
    pub fn estimate(&self, now: DateTime<FixedOffset>) -> SourceFetch {
        let points: Vec<ForecastPoint> = hourly_slots(now, FORECAST_HOURS)
            .into_iter()
            .enumerate()
            .map(|(i, ts)| {
                let (temp, hum) = estimate_at(ts.month(), ts.hour());
                ForecastPoint::new(i as u32, ts, temp, hum)
            })
            .collect();
        let sample = WeatherSample::new(
            points[0].temperature_c(),
            points[0].relative_humidity_pct(),
            SourceLabel::LocalEstimate,
        );
        let series = ForecastSeries::new(SourceLabel::LocalEstimate, points)
            .unwrap_or_else(|e| unreachable!("hourly slots always form a valid series: {}", e));
        SourceFetch { sample, series }
    }
}

#[async_trait]
impl WeatherSource for LocalEstimateSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::LocalEstimate
    }

    async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
        Ok(self.estimate(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sources::test_support::taipei;

    #[test]
    fn test_always_24_points() {
        for month in 1..=12 {
            let fetch = LocalEstimateSource.estimate(taipei(2025, month, 10, 13, 45));
            assert_eq!(fetch.series.len(), 24);
            assert_eq!(fetch.series.source(), SourceLabel::LocalEstimate);
            assert_eq!(fetch.sample.source(), SourceLabel::LocalEstimate);
        }
    }

    #[test]
    fn test_summer_afternoon_peak() {
        // sin peaks at 12:00, cos bottoms at 02:00 and tops at 14:00
        let (t, h) = estimate_at(7, 12);
        assert_eq!(t, 33.0);
        assert!((h - 83.7).abs() < 1.0);
        let (t, _) = estimate_at(1, 0);
        assert_eq!(t, 10.0);
    }

    #[test]
    fn test_humidity_clamped() {
        for month in 1..=12 {
            for hour in 0..24 {
                let (_, h) = estimate_at(month, hour);
                assert!((40.0..=95.0).contains(&h));
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let now = taipei(2025, 8, 3, 9, 0);
        assert_eq!(
            LocalEstimateSource.estimate(now).series,
            LocalEstimateSource.estimate(now).series
        );
    }
}
