//! Operator notifications. Delivery is fire-and-forget: sinks log their own
//! failures and never report back to the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use utoipa::ToSchema;

const WEBHOOK_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Alert sound requested from the delivery side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SoundKind {
    Warning,
    Reminder,
    Test,
    None,
}

impl SoundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundKind::Warning => "warning",
            SoundKind::Reminder => "reminder",
            SoundKind::Test => "test",
            SoundKind::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub sound: SoundKind,
    /// Replaces an earlier notification with the same tag on the receiving side
    pub tag: String,
    pub sent_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, sound: SoundKind) -> Self {
        let sent_at = Utc::now();
        Self {
            title: title.into(),
            body: body.into(),
            sound,
            tag: format!("chiller-{}-{}", sound.as_str(), sent_at.timestamp_millis()),
            sent_at,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

pub type SharedSink = Arc<dyn NotificationSink>;

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, n: &Notification) {
        tracing::info!(
            sound = n.sound.as_str(),
            tag = %n.tag,
            "Notification: {} | {}",
            n.title,
            n.body
        );
    }
}

/// POSTs each notification as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, n: &Notification) {
        let result = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(n)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!("Webhook returned HTTP {} for '{}'", resp.status(), n.tag),
            Err(e) => tracing::warn!("Webhook delivery failed for '{}': {}", n.tag, e),
        }
    }
}

/// Delivers to every inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, n: &Notification) {
        for sink in &self.sinks {
            sink.notify(n).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_tag_includes_sound_kind() {
        let n = Notification::new("t", "b", SoundKind::Warning);
        assert!(n.tag.starts_with("chiller-warning-"));
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "title": "Reminder",
                "sound": "reminder"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(&format!("{}/hook", server.uri()), "test");
        sink.notify(&Notification::new("Reminder", "check plant", SoundKind::Reminder))
            .await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        let sink = WebhookSink::new("http://127.0.0.1:9/unreachable", "test");
        // Must return without panicking
        sink.notify(&Notification::new("x", "y", SoundKind::None)).await;
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone(), Arc::new(LogSink)]);
        fanout
            .notify(&Notification::new("hello", "", SoundKind::Test))
            .await;
        assert_eq!(a.titles(), vec!["hello".to_string()]);
        assert_eq!(b.titles(), vec!["hello".to_string()]);
    }
}
