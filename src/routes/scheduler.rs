//! Scheduler status and notification test endpoints.
//!
//! - GET  /api/v1/scheduler/status
//! - POST /api/v1/notifications/test?kind=plain|reminder|pre_alert

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::services::dashboard::SharedDashboard;
use crate::services::notify::Notification;
use crate::services::scheduler::{HostStatus, ReminderHost, TestKind};
use crate::services::weather_chain::ChainStatus;

/// The running hosts and the dashboard whose clock and chain they use.
#[derive(Clone)]
pub struct SchedulerState {
    pub foreground: Arc<ReminderHost>,
    pub background: Option<Arc<ReminderHost>>,
    pub dashboard: SharedDashboard,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SchedulerStatusResponse {
    pub foreground: HostStatus,
    /// Absent when the background host is disabled
    pub background: Option<HostStatus>,
    pub weather_chain: ChainStatus,
    pub weather_chain_line: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TestQuery {
    /// plain, reminder or pre_alert (default plain)
    pub kind: Option<TestKind>,
}

/// Get the state of both reminder hosts.
///
/// Includes the schedule, countdown to the next formal reminder, recently
/// fired events and the foreground weather chain status.
#[utoipa::path(
    get,
    path = "/api/v1/scheduler/status",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Current scheduler status", body = SchedulerStatusResponse),
    )
)]
pub async fn get_scheduler_status(
    State(state): State<SchedulerState>,
) -> Json<SchedulerStatusResponse> {
    let foreground = state.foreground.status().read().await.clone();
    let background = match &state.background {
        Some(bg) => Some(bg.status().read().await.clone()),
        None => None,
    };
    let weather_chain = state.dashboard.chain_status();
    Json(SchedulerStatusResponse {
        foreground,
        background,
        weather_chain_line: weather_chain.line(),
        weather_chain,
    })
}

/// Send a test notification through the foreground host.
///
/// Does not write any reminder marker, so the real schedule is unaffected.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/test",
    tag = "Scheduler",
    params(TestQuery),
    responses(
        (status = 200, description = "The notification that was sent", body = Notification),
    )
)]
pub async fn send_test_notification(
    State(state): State<SchedulerState>,
    Query(params): Query<TestQuery>,
) -> Json<Notification> {
    let kind = params.kind.unwrap_or(TestKind::Plain);
    let now = state.dashboard.local_now();
    Json(state.foreground.trigger_test(kind, now).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dashboard::Dashboard;
    use crate::services::notify::test_support::RecordingSink;
    use crate::services::reminders::ReminderTable;
    use crate::services::scheduler::HostKind;
    use crate::services::store::{MemoryStore, Namespaced, SharedStore};
    use crate::services::weather_chain::test_support::fixed_chain;
    use chrono::FixedOffset;

    fn state(with_background: bool) -> (SchedulerState, Arc<RecordingSink>) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let dashboard = Arc::new(Dashboard::new(
            fixed_chain(vec![28.0; 24]),
            Arc::new(Namespaced::new(store.clone(), "fg:")),
            FixedOffset::east_opt(8 * 3600).unwrap(),
        ));
        let foreground = Arc::new(ReminderHost::new(
            HostKind::Foreground,
            ReminderTable::foreground(),
            Arc::new(Namespaced::new(store.clone(), "fg:")),
            sink.clone(),
            dashboard.clone(),
        ));
        let background = with_background.then(|| {
            Arc::new(ReminderHost::new(
                HostKind::Background,
                ReminderTable::background(),
                Arc::new(Namespaced::new(store, "bg:")),
                sink.clone(),
                dashboard.clone(),
            ))
        });
        (
            SchedulerState {
                foreground,
                background,
                dashboard,
            },
            sink,
        )
    }

    #[tokio::test]
    async fn test_status_reports_both_hosts() {
        let (s, _) = state(true);
        let Json(resp) = get_scheduler_status(State(s)).await;
        assert_eq!(resp.foreground.host, HostKind::Foreground);
        assert_eq!(resp.background.map(|b| b.schedule.formal[2].hour), Some(18));
        assert_eq!(resp.weather_chain, ChainStatus::Idle);
    }

    #[tokio::test]
    async fn test_status_without_background() {
        let (s, _) = state(false);
        let Json(resp) = get_scheduler_status(State(s)).await;
        assert!(resp.background.is_none());
    }

    #[tokio::test]
    async fn test_default_test_notification_is_plain() {
        let (s, sink) = state(false);
        let Json(n) = send_test_notification(State(s), Query(TestQuery { kind: None })).await;
        assert_eq!(n.title, "Test notification");
        assert_eq!(sink.titles(), vec!["Test notification".to_string()]);
    }

    #[test]
    fn test_kind_query_parses_snake_case() {
        let q: TestQuery = serde_json::from_str(r#"{"kind":"pre_alert"}"#).unwrap();
        assert_eq!(q.kind, Some(TestKind::PreAlert));
    }
}
