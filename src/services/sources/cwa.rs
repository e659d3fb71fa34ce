//! Central Weather Administration (CWA) station observation client.
//!
//! CWA publishes current conditions only (dataset O-A0003-001), so the
//! 24-hour series is projected from the single reading with a fixed diurnal
//! curve.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Timelike};
use serde::Deserialize;
use std::time::Duration as StdDuration;

use super::{
    hourly_slots, json_number, ForecastPoint, ForecastSeries, HttpFetcher, SourceError, SourceFetch,
    SourceLabel, WeatherSample, WeatherSource, FORECAST_HOURS,
};
use crate::helpers::round_1dp;

const CWA_TIMEOUT: StdDuration = StdDuration::from_secs(8);

/// CWA reports missing observations as -99.
const CWA_MISSING_SENTINEL: f64 = -99.0;

/// Projected values are clamped to these physical ranges.
const PROJECTED_TEMP_RANGE: (f64, f64) = (5.0, 40.0);
const PROJECTED_HUMIDITY_RANGE: (f64, f64) = (20.0, 100.0);

// --- CWA JSON response types ---

#[derive(Debug, Deserialize)]
struct CwaResponse {
    #[serde(default)]
    success: serde_json::Value,
    records: Option<CwaRecords>,
}

#[derive(Debug, Deserialize)]
struct CwaRecords {
    #[serde(rename = "Station", default)]
    station: Vec<CwaStation>,
}

#[derive(Debug, Deserialize)]
struct CwaStation {
    #[serde(rename = "StationName")]
    station_name: Option<String>,
    #[serde(rename = "WeatherElement")]
    weather_element: CwaWeatherElement,
}

#[derive(Debug, Deserialize)]
struct CwaWeatherElement {
    #[serde(rename = "AirTemperature", default)]
    air_temperature: serde_json::Value,
    #[serde(rename = "RelativeHumidity", default)]
    relative_humidity: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CwaSource {
    http: HttpFetcher,
    base_url: String,
    api_key: Option<String>,
    station_id: String,
}

impl CwaSource {
    pub fn new(http: HttpFetcher, base_url: &str, api_key: Option<String>, station_id: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            api_key,
            station_id: station_id.to_string(),
        }
    }
}

#[async_trait]
impl WeatherSource for CwaSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::Cwa
    }

    async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SourceError::NotConfigured("CWA API key"))?;

        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("Authorization", api_key),
                ("StationId", self.station_id.as_str()),
            ],
        )
        .map_err(|e| SourceError::Request(format!("invalid CWA URL: {}", e)))?;

        let body: CwaResponse = self.http.get_json(url.as_str(), CWA_TIMEOUT, true).await?;
        let (temp, hum, station) = parse_reading(body)?;
        tracing::debug!(
            "CWA station {}: {}°C, {}%",
            station.as_deref().unwrap_or("?"),
            temp,
            hum
        );

        Ok(SourceFetch {
            sample: WeatherSample::new(temp, hum, SourceLabel::Cwa),
            series: project_series(temp, hum, now)?,
        })
    }
}

fn is_success(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_reading(body: CwaResponse) -> Result<(f64, f64, Option<String>), SourceError> {
    if !is_success(&body.success) {
        return Err(SourceError::Malformed("CWA reported failure".to_string()));
    }
    let station = body
        .records
        .and_then(|r| r.station.into_iter().next())
        .ok_or_else(|| SourceError::Malformed("no station record".to_string()))?;

    let temp = json_number(&station.weather_element.air_temperature);
    // Humidity is an integer percentage
    let hum = json_number(&station.weather_element.relative_humidity).map(f64::trunc);

    match (temp, hum) {
        (Some(t), Some(h))
            if t.is_finite() && h.is_finite() && t != CWA_MISSING_SENTINEL && h != CWA_MISSING_SENTINEL =>
        {
            Ok((t, h, station.station_name))
        }
        _ => Err(SourceError::InvalidReading(format!(
            "temperature={} humidity={}",
            station.weather_element.air_temperature, station.weather_element.relative_humidity
        ))),
    }
}

/// Temperature offset (°C) for a local hour relative to the observation.
fn diurnal_offset(hour: u32) -> f64 {
    if (6..=14).contains(&hour) {
        (hour as f64 - 6.0) * 0.5
    } else if hour > 14 && hour < 20 {
        (20.0 - hour as f64) * 0.3
    } else {
        -1.0
    }
}

fn project_series(
    temp: f64,
    hum: f64,
    now: DateTime<FixedOffset>,
) -> Result<ForecastSeries, SourceError> {
    let points = hourly_slots(now, FORECAST_HOURS)
        .into_iter()
        .enumerate()
        .map(|(i, ts)| {
            let temp_offset = diurnal_offset(ts.hour());
            let hum_offset = -temp_offset * 2.0;
            let t = (temp + temp_offset).clamp(PROJECTED_TEMP_RANGE.0, PROJECTED_TEMP_RANGE.1);
            let h = (hum + hum_offset).clamp(PROJECTED_HUMIDITY_RANGE.0, PROJECTED_HUMIDITY_RANGE.1);
            ForecastPoint::new(i as u32, ts, round_1dp(t), h.round())
        })
        .collect();
    ForecastSeries::new(SourceLabel::Cwa, points)
}
