//! Open-Meteo hourly forecast client.
//!
//! See: https://open-meteo.com/en/docs

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Timelike};
use serde::Deserialize;
use std::time::Duration as StdDuration;

use super::{
    hourly_slots, ForecastPoint, ForecastSeries, HttpFetcher, SourceError, SourceFetch,
    SourceLabel, WeatherSample, WeatherSource, FORECAST_HOURS, MIN_REMOTE_POINTS,
};

const OPEN_METEO_TIMEOUT: StdDuration = StdDuration::from_secs(8);
const HOURLY_VARS: &str = "temperature_2m,relative_humidity_2m";

// --- Open-Meteo JSON response types ---

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: Option<OmCurrent>,
    hourly: Option<OmHourly>,
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OmHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relative_humidity_2m: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    http: HttpFetcher,
    base_url: String,
    latitude: f64,
    longitude: f64,
    timezone: String,
}

impl OpenMeteoSource {
    pub fn new(
        http: HttpFetcher,
        base_url: &str,
        latitude: f64,
        longitude: f64,
        timezone: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            latitude,
            longitude,
            timezone: timezone.to_string(),
        }
    }

    fn request_url(&self) -> Result<String, SourceError> {
        let lat = self.latitude.to_string();
        let lon = self.longitude.to_string();
        reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("hourly", HOURLY_VARS),
                ("current", HOURLY_VARS),
                ("forecast_days", "2"),
                ("timezone", self.timezone.as_str()),
            ],
        )
        .map(|u| u.to_string())
        .map_err(|e| SourceError::Request(format!("invalid Open-Meteo URL: {}", e)))
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    fn label(&self) -> SourceLabel {
        SourceLabel::OpenMeteo
    }

    async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
        let url = self.request_url()?;
        let body: OpenMeteoResponse = self.http.get_json(&url, OPEN_METEO_TIMEOUT, false).await?;
        parse_response(body, now)
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

/// Align the hourly arrays to the current local hour and build the series.
fn parse_response(
    body: OpenMeteoResponse,
    now: DateTime<FixedOffset>,
) -> Result<SourceFetch, SourceError> {
    let hourly = body
        .hourly
        .ok_or_else(|| SourceError::Malformed("missing hourly block".to_string()))?;
    if hourly.temperature_2m.is_empty() {
        return Err(SourceError::Malformed("empty hourly data".to_string()));
    }

    // Times are plant-local "YYYY-MM-DDTHH:MM"; fall back to the hour index
    // when the current hour is not listed.
    let current_hour_str = now.format("%Y-%m-%dT%H:00").to_string();
    let start = match hourly.time.iter().position(|t| *t == current_hour_str) {
        Some(idx) => idx,
        None => {
            tracing::warn!(
                "Open-Meteo times do not include {}; check SITE_TIMEZONE against UTC_OFFSET_HOURS",
                current_hour_str
            );
            now.hour() as usize
        }
    };

    let slots = hourly_slots(now, FORECAST_HOURS);
    let offset = *now.offset();
    let mut points = Vec::with_capacity(FORECAST_HOURS);
    for (i, slot) in slots.into_iter().enumerate() {
        let idx = start + i;
        if idx >= hourly.temperature_2m.len() {
            break;
        }
        let temp = finite(hourly.temperature_2m[idx]);
        let hum = finite(hourly.relative_humidity_2m.get(idx).copied().flatten());
        // Points must stay contiguous from the current hour
        let (Some(temp), Some(hum)) = (temp, hum) else {
            break;
        };
        let timestamp = hourly
            .time
            .get(idx)
            .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M").ok())
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .unwrap_or(slot);
        points.push(ForecastPoint::new(i as u32, timestamp, temp, hum));
    }

    if points.len() < MIN_REMOTE_POINTS {
        return Err(SourceError::InsufficientPoints {
            got: points.len(),
            need: MIN_REMOTE_POINTS,
        });
    }

    let (temp, hum) = body
        .current
        .and_then(|c| Some((finite(c.temperature_2m)?, finite(c.relative_humidity_2m)?)))
        .unwrap_or((points[0].temperature_c(), points[0].relative_humidity_pct()));
    let sample = WeatherSample::new(temp, hum, SourceLabel::OpenMeteo);

    Ok(SourceFetch {
        sample,
        series: ForecastSeries::new(SourceLabel::OpenMeteo, points)?,
    })
}
