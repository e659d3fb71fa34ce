//! Chiller analysis and settings endpoints.
//!
//! - POST   /api/v1/analysis
//! - GET    /api/v1/analysis/history
//! - DELETE /api/v1/analysis/history
//! - PUT    /api/v1/settings/api-key
//! - DELETE /api/v1/settings/api-key

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::services::analysis::{
    self, AnalysisHistoryEntry, AnalysisRequest, AnalysisResult, AnalysisService,
};
use crate::services::dashboard::SharedDashboard;

/// Shared state for analysis endpoints.
#[derive(Clone)]
pub struct AnalysisState {
    pub analysis: Arc<AnalysisService>,
    pub dashboard: SharedDashboard,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApiKeyRequest {
    /// OpenRouter API key
    pub api_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyStatus {
    pub configured: bool,
}

/// Analyse the current cooling load against the latest weather.
///
/// Always returns the rule-based part. The AI assessment is included when an
/// API key is configured; if every model fails, `ai_error` is set and the
/// rule-based part is still returned.
#[utoipa::path(
    post,
    path = "/api/v1/analysis",
    tag = "Analysis",
    request_body = AnalysisRequest,
    responses(
        (status = 200, description = "Analysis result", body = AnalysisResult),
        (status = 400, description = "Invalid load or unknown chiller", body = ErrorResponse),
    )
)]
pub async fn run_analysis(
    State(state): State<AnalysisState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResult>, AppError> {
    let now = state.dashboard.local_now();
    let outcome = state.dashboard.current_at(now).await;
    let result = state
        .analysis
        .analyze(&request, &outcome.sample, Some(&outcome.series), now.naive_local())
        .await?;
    Ok(Json(result))
}

/// Past AI analyses, newest first (at most 50).
#[utoipa::path(
    get,
    path = "/api/v1/analysis/history",
    tag = "Analysis",
    responses(
        (status = 200, description = "Analysis history", body = Vec<AnalysisHistoryEntry>),
        (status = 500, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn get_analysis_history(
    State(state): State<AnalysisState>,
) -> Result<Json<Vec<AnalysisHistoryEntry>>, AppError> {
    Ok(Json(analysis::load_history(state.analysis.store()).await?))
}

/// Clear the analysis history.
#[utoipa::path(
    delete,
    path = "/api/v1/analysis/history",
    tag = "Analysis",
    responses(
        (status = 204, description = "History cleared"),
        (status = 500, description = "Store unavailable", body = ErrorResponse),
    )
)]
pub async fn clear_analysis_history(
    State(state): State<AnalysisState>,
) -> Result<StatusCode, AppError> {
    analysis::clear_history(state.analysis.store()).await?;
    tracing::info!("Analysis history cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// Store the OpenRouter API key used for AI analysis.
#[utoipa::path(
    put,
    path = "/api/v1/settings/api-key",
    tag = "Settings",
    request_body = ApiKeyRequest,
    responses(
        (status = 200, description = "Key stored", body = ApiKeyStatus),
        (status = 400, description = "Empty key", body = ErrorResponse),
    )
)]
pub async fn set_api_key(
    State(state): State<AnalysisState>,
    Json(body): Json<ApiKeyRequest>,
) -> Result<Json<ApiKeyStatus>, AppError> {
    state.analysis.set_api_key(&body.api_key).await?;
    Ok(Json(ApiKeyStatus { configured: true }))
}

/// Forget the stored API key. A key from the environment, if any, applies again.
#[utoipa::path(
    delete,
    path = "/api/v1/settings/api-key",
    tag = "Settings",
    responses(
        (status = 200, description = "Stored key removed", body = ApiKeyStatus),
    )
)]
pub async fn reset_api_key(
    State(state): State<AnalysisState>,
) -> Result<Json<ApiKeyStatus>, AppError> {
    state.analysis.clear_api_key().await?;
    let configured = state.analysis.api_key().await?.is_some();
    Ok(Json(ApiKeyStatus { configured }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::test_support::ScriptedChat;
    use crate::services::dashboard::Dashboard;
    use crate::services::store::{MemoryStore, SharedStore};
    use crate::services::weather_chain::test_support::fixed_chain;
    use chrono::FixedOffset;

    fn state(key: Option<&str>) -> AnalysisState {
        let store: SharedStore = Arc::new(MemoryStore::new());
        AnalysisState {
            analysis: Arc::new(AnalysisService::new(
                Arc::new(ScriptedChat {
                    reply: "Keep one large chiller running.".to_string(),
                    ..Default::default()
                }),
                vec!["a/model".to_string()],
                store.clone(),
                key.map(str::to_string),
            )),
            dashboard: Arc::new(Dashboard::new(
                fixed_chain(vec![30.0; 24]),
                store,
                FixedOffset::east_opt(8 * 3600).unwrap(),
            )),
        }
    }

    fn request(load_rt: f64) -> AnalysisRequest {
        AnalysisRequest {
            load_rt,
            running_chillers: vec![],
            supply_temp_c: None,
            return_temp_c: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_non_positive_load() {
        let err = run_analysis(State(state(None)), Json(request(0.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_analysis_records_history_and_clears() {
        let s = state(Some("k"));
        let Json(result) = run_analysis(State(s.clone()), Json(request(600.0)))
            .await
            .unwrap();
        assert!(result.ai.is_some());

        let Json(history) = get_analysis_history(State(s.clone())).await.unwrap();
        assert_eq!(history.len(), 1);

        let status = clear_analysis_history(State(s.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let Json(history) = get_analysis_history(State(s)).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_api_key_set_and_reset() {
        let s = state(None);
        let Json(status) = set_api_key(
            State(s.clone()),
            Json(ApiKeyRequest {
                api_key: "sk-1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(status.configured);

        let Json(status) = reset_api_key(State(s)).await.unwrap();
        assert!(!status.configured);
    }
}
