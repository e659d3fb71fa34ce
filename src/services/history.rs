//! Hourly weather snapshots and reminder-marker retention.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::services::rules::RuleBand;
use crate::services::sources::WeatherSample;
use crate::services::store::{self, KeyValueStore, StoreError};

pub const WEATHER_HISTORY_KEY: &str = "chillerHistory";

/// Snapshots and markers older than this are dropped.
pub const RETENTION_DAYS: i64 = 7;

const MARKER_PREFIXES: [&str; 3] = ["pre-alert-", "reminder-", "high-load-"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherSnapshot {
    pub enthalpy: f64,
    #[serde(rename = "temp")]
    pub temperature_c: f64,
    #[serde(rename = "hum")]
    pub humidity_pct: f64,
    pub rule: RuleBand,
    pub timestamp: DateTime<Utc>,
}

/// Snapshots keyed `YYYY-MM-DD_HH` in plant-local time; keys sort chronologically.
pub type WeatherHistory = BTreeMap<String, WeatherSnapshot>;

pub fn snapshot_key(now: DateTime<FixedOffset>) -> String {
    now.format("%Y-%m-%d_%H").to_string()
}

/// Record the current sample under this hour's key and drop entries older
/// than the retention window. Returns the number of entries kept.
pub async fn record_snapshot(
    store: &dyn KeyValueStore,
    sample: &WeatherSample,
    now: DateTime<FixedOffset>,
) -> Result<usize, StoreError> {
    let mut history: WeatherHistory = store::get_json(store, WEATHER_HISTORY_KEY).await?;

    history.insert(
        snapshot_key(now),
        WeatherSnapshot {
            enthalpy: sample.enthalpy(),
            temperature_c: sample.temperature_c(),
            humidity_pct: sample.relative_humidity_pct(),
            rule: RuleBand::classify(sample.enthalpy()),
            timestamp: now.with_timezone(&Utc),
        },
    );

    let cutoff = (now.date_naive() - Duration::days(RETENTION_DAYS))
        .format("%Y-%m-%d")
        .to_string();
    history.retain(|k, _| k.as_str() >= cutoff.as_str());

    store::set_json(store, WEATHER_HISTORY_KEY, &history).await?;
    Ok(history.len())
}

pub async fn load_history(store: &dyn KeyValueStore) -> Result<WeatherHistory, StoreError> {
    store::get_json(store, WEATHER_HISTORY_KEY).await
}

/// Date embedded in a marker key such as `reminder-2025-07-01-8`.
fn marker_date(key: &str) -> Option<NaiveDate> {
    let rest = MARKER_PREFIXES.iter().find_map(|p| key.strip_prefix(p))?;
    let date = rest.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Delete reminder markers dated before the retention window. Returns how
/// many were removed.
pub async fn sweep_markers(store: &dyn KeyValueStore, today: NaiveDate) -> Result<usize, StoreError> {
    let cutoff = today - Duration::days(RETENTION_DAYS);
    let mut removed = 0;
    for prefix in MARKER_PREFIXES {
        for key in store.keys(prefix).await? {
            if marker_date(&key).is_some_and(|d| d < cutoff) {
                store.delete(&key).await?;
                removed += 1;
            }
        }
    }
    if removed > 0 {
        tracing::debug!("Swept {} expired reminder markers", removed);
    }
    Ok(removed)
}
