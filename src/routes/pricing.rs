//! Electricity pricing endpoints.
//!
//! - GET /api/v1/pricing/current
//! - GET /api/v1/pricing/preview?hours=N
//! - GET /api/v1/pricing/schedule

use axum::extract::{Query, State};
use axum::Json;
use chrono::{FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::helpers::floor_to_hour;
use crate::services::pricing::{self, HourlyPrice, PricingPeriod, Tariff};

/// Default number of hours in a preview.
const DEFAULT_PREVIEW_HOURS: u32 = 6;
/// Largest preview window accepted.
const MAX_PREVIEW_HOURS: u32 = 48;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PreviewQuery {
    /// Number of hours to preview, 1-48 (default 6)
    pub hours: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentPricingResponse {
    /// Plant-local time the tariff was resolved for
    #[schema(value_type = String)]
    pub local_time: NaiveDateTime,
    #[serde(flatten)]
    pub tariff: Tariff,
}

fn local_now(offset: FixedOffset) -> NaiveDateTime {
    Utc::now().with_timezone(&offset).naive_local()
}

/// Tariff in force right now at the plant.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/current",
    tag = "Pricing",
    responses(
        (status = 200, description = "Current tariff", body = CurrentPricingResponse),
    )
)]
pub async fn get_current_pricing(
    State(offset): State<FixedOffset>,
) -> Json<CurrentPricingResponse> {
    let local_time = local_now(offset);
    Json(CurrentPricingResponse {
        local_time,
        tariff: pricing::current_tariff(local_time),
    })
}

/// Tariffs for the coming hours, starting with the current hour.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/preview",
    tag = "Pricing",
    params(PreviewQuery),
    responses(
        (status = 200, description = "Hourly tariffs", body = Vec<HourlyPrice>),
        (status = 400, description = "hours outside 1-48", body = ErrorResponse),
    )
)]
pub async fn get_pricing_preview(
    State(offset): State<FixedOffset>,
    Query(params): Query<PreviewQuery>,
) -> Result<Json<Vec<HourlyPrice>>, AppError> {
    let hours = params.hours.unwrap_or(DEFAULT_PREVIEW_HOURS);
    if !(1..=MAX_PREVIEW_HOURS).contains(&hours) {
        return Err(AppError::BadRequest(format!(
            "hours must be between 1 and {}",
            MAX_PREVIEW_HOURS
        )));
    }
    let start = floor_to_hour(Utc::now().with_timezone(&offset)).naive_local();
    Ok(Json(pricing::hourly_preview(start, hours)))
}

/// The full tariff table.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/schedule",
    tag = "Pricing",
    responses(
        (status = 200, description = "Every tier of every day-type and season table", body = Vec<PricingPeriod>),
    )
)]
pub async fn get_pricing_schedule() -> Json<Vec<PricingPeriod>> {
    Json(pricing::all_periods())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taipei() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[tokio::test]
    async fn test_preview_default_and_bounds() {
        let Json(prices) = get_pricing_preview(State(taipei()), Query(PreviewQuery { hours: None }))
            .await
            .unwrap();
        assert_eq!(prices.len(), 6);
        assert!(prices
            .iter()
            .all(|p| p.starts_at.format("%M:%S").to_string() == "00:00"));

        for bad in [0, 49] {
            let err = get_pricing_preview(State(taipei()), Query(PreviewQuery { hours: Some(bad) }))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        let Json(max) = get_pricing_preview(State(taipei()), Query(PreviewQuery { hours: Some(48) }))
            .await
            .unwrap();
        assert_eq!(max.len(), 48);
    }

    #[tokio::test]
    async fn test_schedule_lists_every_tier() {
        let Json(periods) = get_pricing_schedule().await;
        assert_eq!(periods.len(), 18);
    }
}
