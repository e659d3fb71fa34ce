//! wttr.in JSON (`format=j1`) client.
//!
//! wttr.in reports 3-hourly values per day; hourly points are linearly
//! interpolated between the bracketing reports.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Timelike};
use serde::Deserialize;
use std::time::Duration as StdDuration;

use super::{
    hourly_slots, json_number, ForecastPoint, ForecastSeries, HttpFetcher, SourceError,
    SourceFetch, SourceLabel, WeatherSample, WeatherSource, FORECAST_HOURS, MIN_REMOTE_POINTS,
};
use crate::helpers::round_1dp;

const WTTR_TIMEOUT: StdDuration = StdDuration::from_secs(10);

// --- wttr.in JSON response types ---

#[derive(Debug, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    current_condition: Vec<WttrCurrent>,
    #[serde(default)]
    weather: Vec<WttrDay>,
}

#[derive(Debug, Deserialize)]
struct WttrCurrent {
    #[serde(rename = "temp_C", default)]
    temp_c: serde_json::Value,
    #[serde(default)]
    humidity: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WttrDay {
    #[serde(default)]
    hourly: Vec<WttrHourly>,
}

#[derive(Debug, Deserialize)]
struct WttrHourly {
    /// "0", "300", ..., "2100"
    #[serde(default)]
    time: serde_json::Value,
    #[serde(rename = "tempC", default)]
    temp_c: serde_json::Value,
    #[serde(default)]
    humidity: serde_json::Value,
}

/// A report placed on an hour axis counted from midnight of the first day.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AbsoluteReport {
    hour: f64,
    temp: f64,
    hum: f64,
}

#[derive(Debug, Clone)]
pub struct WttrSource {
    http: HttpFetcher,
    base_url: String,
    latitude: f64,
    longitude: f64,
}

impl WttrSource {
    pub fn new(http: HttpFetcher, base_url: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            latitude,
            longitude,
        }
    }
}

#[async_trait]
impl WeatherSource for WttrSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::Wttr
    }

    async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
        let url = format!(
            "{}/{},{}?format=j1",
            self.base_url, self.latitude, self.longitude
        );
        let body: WttrResponse = self.http.get_json(&url, WTTR_TIMEOUT, true).await?;
        parse_response(body, now)
    }
}

fn flatten_reports(days: &[WttrDay]) -> Vec<AbsoluteReport> {
    let mut reports: Vec<AbsoluteReport> = days
        .iter()
        .enumerate()
        .flat_map(|(day_index, day)| {
            day.hourly.iter().filter_map(move |h| {
                let hour = json_number(&h.time)? / 100.0;
                let temp = json_number(&h.temp_c)?;
                let hum = json_number(&h.humidity)?;
                Some(AbsoluteReport {
                    hour: day_index as f64 * 24.0 + hour,
                    temp,
                    hum,
                })
            })
        })
        .collect();
    reports.sort_by(|a, b| a.hour.total_cmp(&b.hour));
    reports
}

/// Value at `target` hours: linear between bracketing reports, nearest at the ends.
fn interpolate_at(reports: &[AbsoluteReport], target: f64) -> Option<(f64, f64)> {
    let prev = reports.iter().rev().find(|r| r.hour <= target);
    let next = reports.iter().find(|r| r.hour >= target);
    match (prev, next) {
        (Some(p), Some(n)) if n.hour > p.hour => {
            let frac = (target - p.hour) / (n.hour - p.hour);
            Some((
                p.temp + (n.temp - p.temp) * frac,
                p.hum + (n.hum - p.hum) * frac,
            ))
        }
        (Some(p), _) => Some((p.temp, p.hum)),
        (None, Some(n)) => Some((n.temp, n.hum)),
        (None, None) => None,
    }
}

fn parse_response(body: WttrResponse, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
    if body.weather.is_empty() {
        return Err(SourceError::Malformed("no weather days".to_string()));
    }
    let reports = flatten_reports(&body.weather);

    let start_hour = now.hour() as f64;
    let points: Vec<ForecastPoint> = hourly_slots(now, FORECAST_HOURS)
        .into_iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let (temp, hum) = interpolate_at(&reports, start_hour + i as f64)?;
            Some(ForecastPoint::new(i as u32, ts, round_1dp(temp), hum.round()))
        })
        .collect();

    if points.len() < MIN_REMOTE_POINTS {
        return Err(SourceError::InsufficientPoints {
            got: points.len(),
            need: MIN_REMOTE_POINTS,
        });
    }

    let (temp, hum) = body
        .current_condition
        .first()
        .and_then(|c| Some((json_number(&c.temp_c)?, json_number(&c.humidity)?)))
        .unwrap_or((points[0].temperature_c(), points[0].relative_humidity_pct()));

    Ok(SourceFetch {
        sample: WeatherSample::new(temp, hum, SourceLabel::Wttr),
        series: ForecastSeries::new(SourceLabel::Wttr, points)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sources::test_support::taipei;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Three days of 3-hourly reports, temperature rising 1 °C per report.
    fn three_day_body() -> serde_json::Value {
        let days: Vec<serde_json::Value> = (0..3)
            .map(|d| {
                let hourly: Vec<serde_json::Value> = (0..8)
                    .map(|k| {
                        serde_json::json!({
                            "time": (k * 300).to_string(),
                            "tempC": (20 + d * 8 + k).to_string(),
                            "humidity": "80"
                        })
                    })
                    .collect();
                serde_json::json!({ "hourly": hourly })
            })
            .collect();
        serde_json::json!({
            "current_condition": [{"temp_C": "29", "humidity": "74"}],
            "weather": days
        })
    }

    #[test]
    fn test_interpolation_between_reports() {
        let reports = vec![
            AbsoluteReport { hour: 0.0, temp: 20.0, hum: 80.0 },
            AbsoluteReport { hour: 3.0, temp: 23.0, hum: 74.0 },
        ];
        assert_eq!(interpolate_at(&reports, 1.5), Some((21.5, 77.0)));
        assert_eq!(interpolate_at(&reports, 3.0), Some((23.0, 74.0)));
        // Past the last report holds its value
        assert_eq!(interpolate_at(&reports, 7.0), Some((23.0, 74.0)));
        assert_eq!(interpolate_at(&[], 1.0), None);
    }

    #[test]
    fn test_flatten_orders_across_days() {
        let body: WttrResponse = serde_json::from_value(three_day_body()).unwrap();
        let reports = flatten_reports(&body.weather);
        assert_eq!(reports.len(), 24);
        assert_eq!(reports[8].hour, 24.0);
        assert!(reports.windows(2).all(|w| w[0].hour < w[1].hour));
    }

    #[tokio::test]
    async fn test_fetch_interpolates_hourly_series() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/25.04294,121.61377"))
            .and(query_param("format", "j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(three_day_body()))
            .mount(&server)
            .await;

        let source = WttrSource::new(
            HttpFetcher::new("test", None),
            &server.uri(),
            25.04294,
            121.61377,
        );
        let fetch = source.fetch(taipei(2025, 7, 1, 4, 30)).await.unwrap();

        let points = fetch.series.points();
        assert_eq!(points.len(), 24);
        // 04:00 lies between 03:00 (21 °C) and 06:00 (22 °C)
        assert_eq!(points[0].temperature_c(), 21.3);
        assert_eq!(points[0].hour_of_day(), 4);
        assert_eq!(fetch.sample.temperature_c(), 29.0);
        assert_eq!(fetch.sample.relative_humidity_pct(), 74.0);
    }

    #[tokio::test]
    async fn test_sparse_payload_is_insufficient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "weather": [{"hourly": []}]
            })))
            .mount(&server)
            .await;

        let source = WttrSource::new(HttpFetcher::new("test", None), &server.uri(), 1.0, 2.0);
        let result = source.fetch(taipei(2025, 7, 1, 4, 0)).await;
        assert!(matches!(
            result,
            Err(SourceError::InsufficientPoints { got: 0, .. })
        ));
    }
}
