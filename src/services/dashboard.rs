//! Foreground weather state.
//!
//! Holds the latest chain outcome and the alerts derived from it. Routes read
//! it, the forecast refresh task and manual refreshes write it.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::services::alerts::{generate_alerts, Advisory};
use crate::services::history;
use crate::services::store::SharedStore;
use crate::services::weather_chain::{ChainOutcome, ChainStatus, WeatherChain};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DashboardState {
    pub latest: Option<ChainOutcome>,
    pub alerts: Vec<Advisory>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub total_refreshes: u64,
}

pub struct Dashboard {
    chain: WeatherChain,
    store: SharedStore,
    offset: FixedOffset,
    state: RwLock<DashboardState>,
}

pub type SharedDashboard = Arc<Dashboard>;

impl Dashboard {
    pub fn new(chain: WeatherChain, store: SharedStore, offset: FixedOffset) -> Self {
        Self {
            chain,
            store,
            offset,
            state: RwLock::new(DashboardState::default()),
        }
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub fn chain_status(&self) -> ChainStatus {
        self.chain.status()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    /// Run the weather chain, derive alerts and record the hourly snapshot.
    pub async fn refresh_at(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        let outcome = self.chain.fetch(now).await;
        let alerts = generate_alerts(outcome.sample.enthalpy(), &outcome.series);
        tracing::debug!(
            "Dashboard refresh: enthalpy {:.1}, {} advisories",
            outcome.sample.enthalpy(),
            alerts.len()
        );

        if let Err(e) = history::record_snapshot(self.store.as_ref(), &outcome.sample, now).await {
            tracing::warn!("Failed to record weather snapshot: {}", e);
        }

        let mut s = self.state.write().await;
        s.latest = Some(outcome.clone());
        s.alerts = alerts;
        s.last_refresh_at = Some(outcome.fetched_at);
        s.total_refreshes += 1;
        outcome
    }

    /// Latest outcome, fetching once if nothing has been loaded yet.
    pub async fn current_at(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        if let Some(latest) = self.state.read().await.latest.clone() {
            return latest;
        }
        self.refresh_at(now).await
    }

    pub async fn alerts(&self) -> Vec<Advisory> {
        self.state.read().await.alerts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history::load_history;
    use crate::services::sources::test_support::taipei;
    use crate::services::store::MemoryStore;
    use crate::services::weather_chain::test_support::fixed_chain;

    fn dashboard(temps: Vec<f64>) -> Dashboard {
        Dashboard::new(
            fixed_chain(temps),
            Arc::new(MemoryStore::new()),
            FixedOffset::east_opt(8 * 3600).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_refresh_populates_state_and_history() {
        let d = dashboard(vec![30.0; 24]);
        let now = taipei(2025, 7, 1, 10, 15);
        let outcome = d.refresh_at(now).await;

        let s = d.snapshot().await;
        assert_eq!(s.total_refreshes, 1);
        assert_eq!(
            s.latest.as_ref().map(|o| o.sample.enthalpy()),
            Some(outcome.sample.enthalpy())
        );
        // Flat series: no crossings, one steady-state advisory
        assert_eq!(s.alerts.len(), 1);

        let history = load_history(d.store().as_ref()).await.unwrap();
        assert!(history.contains_key("2025-07-01_10"));
    }

    #[tokio::test]
    async fn test_current_fetches_once() {
        let d = dashboard(vec![25.0; 24]);
        let now = taipei(2025, 7, 1, 10, 0);
        d.current_at(now).await;
        d.current_at(now).await;
        assert_eq!(d.snapshot().await.total_refreshes, 1);
    }

    #[tokio::test]
    async fn test_rising_series_produces_alerts() {
        // 24 C -> 34 C at 60% RH crosses band 2 and 3 thresholds
        let mut temps = vec![24.0, 26.0, 28.0, 31.0, 34.0, 34.0];
        temps.resize(24, 34.0);
        let d = dashboard(temps);
        d.refresh_at(taipei(2025, 7, 1, 10, 0)).await;
        let alerts = d.alerts().await;
        assert!(alerts.len() >= 2);
        assert!(alerts
            .windows(2)
            .all(|w| w[0].hours_from_now <= w[1].hours_from_now));
    }
}
