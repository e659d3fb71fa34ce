//! Weather HTTP endpoints.
//!
//! - GET  /api/v1/weather
//! - POST /api/v1/weather/refresh
//! - GET  /api/v1/weather/alerts
//! - GET  /api/v1/weather/history

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::services::alerts::Advisory;
use crate::services::dashboard::SharedDashboard;
use crate::services::history::{self, WeatherSnapshot};
use crate::services::rules::{Recommendation, RuleBand};
use crate::services::weather_chain::{ChainOutcome, ChainStatus};

/// Current conditions with the forecast they came with.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    #[serde(flatten)]
    pub outcome: ChainOutcome,
    pub recommendation: Recommendation,
    pub status: ChainStatus,
    /// Human-readable chain status
    pub status_line: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertsResponse {
    pub current_enthalpy: f64,
    pub alerts: Vec<Advisory>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryItem {
    /// Plant-local hour key, `YYYY-MM-DD_HH`
    pub hour: String,
    #[serde(flatten)]
    pub snapshot: WeatherSnapshot,
}

fn to_response(outcome: ChainOutcome, status: ChainStatus) -> WeatherResponse {
    WeatherResponse {
        recommendation: RuleBand::classify(outcome.sample.enthalpy()).recommendation(),
        status_line: status.line(),
        status,
        outcome,
    }
}

/// Latest weather, forecast and rule recommendation.
///
/// Runs the source chain first if nothing has been fetched yet.
#[utoipa::path(
    get,
    path = "/api/v1/weather",
    tag = "Weather",
    responses(
        (status = 200, description = "Latest weather and 24-hour forecast", body = WeatherResponse),
    )
)]
pub async fn get_weather(State(dashboard): State<SharedDashboard>) -> Json<WeatherResponse> {
    let outcome = dashboard.current_at(dashboard.local_now()).await;
    Json(to_response(outcome, dashboard.chain_status()))
}

/// Re-run the weather source chain now.
#[utoipa::path(
    post,
    path = "/api/v1/weather/refresh",
    tag = "Weather",
    responses(
        (status = 200, description = "Fresh weather and forecast", body = WeatherResponse),
    )
)]
pub async fn refresh_weather(State(dashboard): State<SharedDashboard>) -> Json<WeatherResponse> {
    let outcome = dashboard.refresh_at(dashboard.local_now()).await;
    Json(to_response(outcome, dashboard.chain_status()))
}

/// Rule-boundary advisories for the next six hours.
#[utoipa::path(
    get,
    path = "/api/v1/weather/alerts",
    tag = "Weather",
    responses(
        (status = 200, description = "Forecast advisories in chronological order", body = AlertsResponse),
    )
)]
pub async fn get_alerts(State(dashboard): State<SharedDashboard>) -> Json<AlertsResponse> {
    let outcome = dashboard.current_at(dashboard.local_now()).await;
    Json(AlertsResponse {
        current_enthalpy: outcome.sample.enthalpy(),
        alerts: dashboard.alerts().await,
    })
}

/// Hourly weather snapshots for the last seven days, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/weather/history",
    tag = "Weather",
    responses(
        (status = 200, description = "Hourly snapshots", body = Vec<HistoryItem>),
        (status = 500, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_weather_history(
    State(dashboard): State<SharedDashboard>,
) -> Result<Json<Vec<HistoryItem>>, AppError> {
    let items = history::load_history(dashboard.store().as_ref())
        .await?
        .into_iter()
        .map(|(hour, snapshot)| HistoryItem { hour, snapshot })
        .collect();
    Ok(Json(items))
}
