//! Weather sources: the sample and forecast types every source produces, the
//! `WeatherSource` trait, and the HTTP plumbing shared by the remote sources.
//!
//! A source either returns a complete `SourceFetch` or an error. Nothing is
//! merged across sources.

pub mod cwa;
pub mod local_estimate;
pub mod open_meteo;
pub mod wttr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Timelike};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration as StdDuration;
use utoipa::ToSchema;

use crate::helpers::floor_to_hour;
use crate::services::enthalpy::enthalpy;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Length of a full forecast series (hours).
pub const FORECAST_HOURS: usize = 24;

/// Fewest points a remote source must yield to be accepted.
pub const MIN_REMOTE_POINTS: usize = 12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which source produced a sample or series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceLabel {
    OpenMeteo,
    Cwa,
    Wttr,
    LocalEstimate,
}

impl SourceLabel {
    pub fn display_name(self) -> &'static str {
        match self {
            SourceLabel::OpenMeteo => "Open-Meteo",
            SourceLabel::Cwa => "CWA",
            SourceLabel::Wttr => "wttr.in",
            SourceLabel::LocalEstimate => "local estimate",
        }
    }
}

impl std::fmt::Display for SourceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Current outdoor conditions. Enthalpy is always derived from temperature
/// and humidity at construction.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WeatherSample {
    temperature_c: f64,
    relative_humidity_pct: f64,
    enthalpy: f64,
    source: SourceLabel,
}

impl WeatherSample {
    pub fn new(temperature_c: f64, relative_humidity_pct: f64, source: SourceLabel) -> Self {
        let relative_humidity_pct = relative_humidity_pct.clamp(0.0, 100.0);
        Self {
            temperature_c,
            relative_humidity_pct,
            enthalpy: enthalpy(temperature_c, relative_humidity_pct),
            source,
        }
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn relative_humidity_pct(&self) -> f64 {
        self.relative_humidity_pct
    }

    pub fn enthalpy(&self) -> f64 {
        self.enthalpy
    }

    pub fn source(&self) -> SourceLabel {
        self.source
    }
}

/// One hour of a forecast series.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastPoint {
    hour_of_day: u32,
    hours_from_now: u32,
    temperature_c: f64,
    relative_humidity_pct: f64,
    enthalpy: f64,
    #[schema(value_type = String)]
    timestamp: DateTime<FixedOffset>,
}

impl ForecastPoint {
    pub fn new(
        hours_from_now: u32,
        timestamp: DateTime<FixedOffset>,
        temperature_c: f64,
        relative_humidity_pct: f64,
    ) -> Self {
        let relative_humidity_pct = relative_humidity_pct.clamp(0.0, 100.0);
        Self {
            hour_of_day: timestamp.hour(),
            hours_from_now,
            temperature_c,
            relative_humidity_pct,
            enthalpy: enthalpy(temperature_c, relative_humidity_pct),
            timestamp,
        }
    }

    pub fn hour_of_day(&self) -> u32 {
        self.hour_of_day
    }

    pub fn hours_from_now(&self) -> u32 {
        self.hours_from_now
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn relative_humidity_pct(&self) -> f64 {
        self.relative_humidity_pct
    }

    pub fn enthalpy(&self) -> f64 {
        self.enthalpy
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }
}

/// Up to 24 hourly points from a single source, index 0 = current hour.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastSeries {
    source: SourceLabel,
    points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// Build a series, rejecting empty, oversized or out-of-order input.
    pub fn new(source: SourceLabel, points: Vec<ForecastPoint>) -> Result<Self, SourceError> {
        if points.is_empty() {
            return Err(SourceError::InvalidSeries("no points".to_string()));
        }
        if points.len() > FORECAST_HOURS {
            return Err(SourceError::InvalidSeries(format!(
                "{} points exceeds {}",
                points.len(),
                FORECAST_HOURS
            )));
        }
        if points
            .windows(2)
            .any(|w| w[1].hours_from_now <= w[0].hours_from_now)
        {
            return Err(SourceError::InvalidSeries(
                "hours_from_now is not strictly increasing".to_string(),
            ));
        }
        Ok(Self { source, points })
    }

    pub fn source(&self) -> SourceLabel {
        self.source
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, index: usize) -> Option<&ForecastPoint> {
        self.points.get(index)
    }
}

/// What one successful source attempt yields.
#[derive(Debug, Clone)]
pub struct SourceFetch {
    pub sample: WeatherSample,
    pub series: ForecastSeries,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("invalid reading: {0}")]
    InvalidReading(String),

    #[error("only {got} forecast points, need {need}")]
    InsufficientPoints { got: usize, need: usize },

    #[error("invalid series: {0}")]
    InvalidSeries(String),
}

/// A provider of current conditions plus a 24-hour forecast.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    fn label(&self) -> SourceLabel;

    /// Fetch a complete sample and series relative to plant-local `now`.
    async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError>;
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// HTTP client shared by the remote sources, with optional CORS relay.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    relay_url: Option<String>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, relay_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");
        Self { client, relay_url }
    }

    /// GET `url` and decode JSON, bounded by `timeout`. When `via_relay` is set
    /// and a relay is configured, the request goes to `<relay>?url=<url>`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: StdDuration,
        via_relay: bool,
    ) -> Result<T, SourceError> {
        let target = match (&self.relay_url, via_relay) {
            (Some(relay), true) => reqwest::Url::parse_with_params(relay, &[("url", url)])
                .map_err(|e| SourceError::Request(format!("invalid relay URL: {}", e)))?
                .to_string(),
            _ => url.to_string(),
        };

        let response = self
            .client
            .get(&target)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(timeout.as_secs())
            } else {
                SourceError::Malformed(e.to_string())
            }
        })
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: StdDuration) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout(timeout.as_secs())
    } else {
        SourceError::Request(e.to_string())
    }
}

/// Numbers arrive either as JSON numbers or numeric strings.
pub(crate) fn json_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Start-of-hour timestamps for `count` consecutive hours beginning at `now`'s hour.
pub(crate) fn hourly_slots(now: DateTime<FixedOffset>, count: usize) -> Vec<DateTime<FixedOffset>> {
    let base = floor_to_hour(now);
    (0..count)
        .map(|i| base + Duration::hours(i as i64))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::taipei;
    use super::*;

    #[test]
    fn test_sample_derives_enthalpy() {
        let s = WeatherSample::new(30.0, 70.0, SourceLabel::Cwa);
        assert_eq!(s.enthalpy(), enthalpy(30.0, 70.0));
        assert_eq!(s.source(), SourceLabel::Cwa);
    }

    #[test]
    fn test_sample_clamps_humidity() {
        let s = WeatherSample::new(25.0, 130.0, SourceLabel::Wttr);
        assert_eq!(s.relative_humidity_pct(), 100.0);
    }

    #[test]
    fn test_point_hour_of_day_from_timestamp() {
        let p = ForecastPoint::new(3, taipei(2025, 7, 1, 23, 0), 27.0, 80.0);
        assert_eq!(p.hour_of_day(), 23);
        assert_eq!(p.hours_from_now(), 3);
    }

    #[test]
    fn test_series_rejects_unordered_points() {
        let now = taipei(2025, 7, 1, 10, 0);
        let points = vec![
            ForecastPoint::new(0, now, 25.0, 70.0),
            ForecastPoint::new(2, now, 25.0, 70.0),
            ForecastPoint::new(1, now, 25.0, 70.0),
        ];
        assert!(matches!(
            ForecastSeries::new(SourceLabel::OpenMeteo, points),
            Err(SourceError::InvalidSeries(_))
        ));
    }

    #[test]
    fn test_series_rejects_empty_and_oversized() {
        assert!(ForecastSeries::new(SourceLabel::OpenMeteo, vec![]).is_err());
        let now = taipei(2025, 7, 1, 10, 0);
        let points = (0..25)
            .map(|i| ForecastPoint::new(i, now, 25.0, 70.0))
            .collect();
        assert!(ForecastSeries::new(SourceLabel::OpenMeteo, points).is_err());
    }

    #[test]
    fn test_hourly_slots_floor_and_wrap() {
        let slots = hourly_slots(taipei(2025, 7, 1, 22, 37), 3);
        assert_eq!(slots[0], taipei(2025, 7, 1, 22, 0));
        assert_eq!(slots[2], taipei(2025, 7, 2, 0, 0));
    }

    #[tokio::test]
    async fn test_relay_wraps_target_url() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let relay = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .and(query_param("url", "https://wttr.in/1,2?format=j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&relay)
            .await;

        let fetcher = HttpFetcher::new("test", Some(format!("{}/raw", relay.uri())));
        let body: serde_json::Value = fetcher
            .get_json(
                "https://wttr.in/1,2?format=j1",
                StdDuration::from_secs(2),
                true,
            )
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("test", None);
        let result: Result<serde_json::Value, _> = fetcher
            .get_json(&server.uri(), StdDuration::from_secs(2), false)
            .await;
        assert!(matches!(result, Err(SourceError::Status(503))));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(StdDuration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new("test", None);
        let result: Result<serde_json::Value, _> = fetcher
            .get_json(&server.uri(), StdDuration::from_millis(200), false)
            .await;
        assert!(matches!(result, Err(SourceError::Timeout(_))));
    }
}
