use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when the DB is unreachable)
    pub status: String,
    /// API version
    pub version: String,
    /// "postgres" or "memory"
    pub store: String,
    /// Whether the database is reachable; always true for the in-memory store
    pub database: bool,
}

/// Health check endpoint.
///
/// Returns the API status and version. With a PostgreSQL store configured,
/// verifies connectivity with a simple query and reports "degraded" (still
/// 200) if it fails, so load balancers can distinguish partial failures.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<Option<PgPool>>) -> Json<HealthResponse> {
    let (store, db_ok) = match &pool {
        Some(pool) => ("postgres", queries::ping(pool).await),
        None => ("memory", true),
    };

    Json(HealthResponse {
        status: if db_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
        database: db_ok,
    })
}
