//! Ordered weather-source fallback.
//!
//! Sources are tried strictly one after another; the first complete result
//! wins and every earlier failure is recorded. The local estimate terminates
//! the chain, so a refresh always produces data.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::services::sources::cwa::CwaSource;
use crate::services::sources::local_estimate::LocalEstimateSource;
use crate::services::sources::open_meteo::OpenMeteoSource;
use crate::services::sources::wttr::WttrSource;
use crate::services::sources::{
    ForecastSeries, HttpFetcher, SourceFetch, SourceLabel, WeatherSample, WeatherSource,
};

/// Progress of the chain, published while a refresh runs.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChainStatus {
    Idle,
    /// Attempt number (1-based) in progress
    Trying { attempt: usize, source: SourceLabel },
    Success { source: SourceLabel },
    /// All remote sources failed; the local estimate takes over
    Exhausted { failed: usize },
}

impl ChainStatus {
    pub fn line(&self) -> String {
        match self {
            ChainStatus::Idle => "Waiting for first refresh".to_string(),
            ChainStatus::Trying { attempt: 1, source } => {
                format!("Fetching forecast ({})...", source)
            }
            ChainStatus::Trying { source, .. } => {
                format!("Previous source unavailable, trying {}...", source)
            }
            ChainStatus::Success {
                source: SourceLabel::LocalEstimate,
            } => "Estimated values (no source reachable)".to_string(),
            ChainStatus::Success { source } => format!("Live data from {}", source),
            ChainStatus::Exhausted { failed } => {
                format!("{} sources unreachable, using local estimate...", failed)
            }
        }
    }
}

/// A source that failed during one refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FailedAttempt {
    pub source: SourceLabel,
    pub reason: String,
}

/// Result of one chain run. `sample` and `series` come from the same source.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChainOutcome {
    pub sample: WeatherSample,
    pub series: ForecastSeries,
    pub source: SourceLabel,
    pub failures: Vec<FailedAttempt>,
    pub fetched_at: DateTime<Utc>,
}

pub struct WeatherChain {
    sources: Vec<Arc<dyn WeatherSource>>,
    fallback: LocalEstimateSource,
    status: watch::Sender<ChainStatus>,
}

impl WeatherChain {
    pub fn new(sources: Vec<Arc<dyn WeatherSource>>) -> Self {
        let (status, _) = watch::channel(ChainStatus::Idle);
        Self {
            sources,
            fallback: LocalEstimateSource,
            status,
        }
    }

    /// Open-Meteo, then CWA, then wttr.in, then the local estimate.
    pub fn from_config(config: &AppConfig) -> Self {
        let http = HttpFetcher::new(&config.user_agent, config.cors_relay_url.clone());
        Self::new(vec![
            Arc::new(OpenMeteoSource::new(
                http.clone(),
                &config.open_meteo_url,
                config.latitude,
                config.longitude,
                &config.timezone,
            )),
            Arc::new(CwaSource::new(
                http.clone(),
                &config.cwa_url,
                config.cwa_api_key.clone(),
                &config.cwa_station_id,
            )),
            Arc::new(WttrSource::new(
                http,
                &config.wttr_url,
                config.latitude,
                config.longitude,
            )),
        ])
    }

    pub fn subscribe(&self) -> watch::Receiver<ChainStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> ChainStatus {
        self.status.borrow().clone()
    }

    fn publish(&self, status: ChainStatus) {
        tracing::debug!("Weather chain: {}", status.line());
        self.status.send_replace(status);
    }

    pub async fn fetch(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        let mut failures = Vec::new();

        for (i, source) in self.sources.iter().enumerate() {
            let label = source.label();
            self.publish(ChainStatus::Trying {
                attempt: i + 1,
                source: label,
            });
            match source.fetch(now).await {
                Ok(fetch) => return self.finish(fetch, failures),
                Err(e) => {
                    tracing::warn!("Weather source {} failed: {}", label, e);
                    failures.push(FailedAttempt {
                        source: label,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.publish(ChainStatus::Exhausted {
            failed: failures.len(),
        });
        let fetch = self.fallback.estimate(now);
        self.finish(fetch, failures)
    }

    fn finish(&self, fetch: SourceFetch, failures: Vec<FailedAttempt>) -> ChainOutcome {
        let source = fetch.series.source();
        self.publish(ChainStatus::Success { source });
        tracing::info!(
            "Weather refreshed from {} ({} points, enthalpy {:.1}, {} failed attempts)",
            source,
            fetch.series.len(),
            fetch.sample.enthalpy(),
            failures.len()
        );
        ChainOutcome {
            sample: fetch.sample,
            series: fetch.series,
            source,
            failures,
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::services::sources::test_support::series_from_temps;
    use crate::services::sources::SourceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Source that always fails, recording each call.
    pub struct FailingSource {
        pub label: SourceLabel,
        pub calls: Arc<Mutex<Vec<SourceLabel>>>,
    }

    #[async_trait]
    impl WeatherSource for FailingSource {
        fn label(&self) -> SourceLabel {
            self.label
        }

        async fn fetch(&self, _now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
            self.calls.lock().unwrap().push(self.label);
            Err(SourceError::Status(503))
        }
    }

    /// Source returning a flat series at a fixed temperature.
    pub struct FixedSource {
        pub label: SourceLabel,
        pub temps: Vec<f64>,
        pub calls: Arc<Mutex<Vec<SourceLabel>>>,
    }

    #[async_trait]
    impl WeatherSource for FixedSource {
        fn label(&self) -> SourceLabel {
            self.label
        }

        async fn fetch(&self, now: DateTime<FixedOffset>) -> Result<SourceFetch, SourceError> {
            self.calls.lock().unwrap().push(self.label);
            let series = series_from_temps(self.label, now, &self.temps);
            Ok(SourceFetch {
                sample: WeatherSample::new(self.temps[0], 60.0, self.label),
                series,
            })
        }
    }

    /// Chain with a single fixed source producing the given temperatures.
    pub fn fixed_chain(temps: Vec<f64>) -> WeatherChain {
        WeatherChain::new(vec![Arc::new(FixedSource {
            label: SourceLabel::OpenMeteo,
            temps,
            calls: Arc::default(),
        })])
    }
}
