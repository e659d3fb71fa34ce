//! Reminder scheduler hosts.
//!
//! Two hosts run the same reminder logic with different tables:
//! - Foreground: polls every 30 seconds, ticks a countdown every second and
//!   refreshes the dashboard forecast every 30 minutes
//! - Background: wakes on its own interval and re-derives weather with a
//!   separate chain instance
//!
//! The hosts share no in-memory state. Each writes its "sent" markers under
//! its own store namespace, and a marker is always written before the
//! notification goes out, so a crash between the two loses a reminder rather
//! than duplicating one.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use crate::services::dashboard::Dashboard;
use crate::services::history;
use crate::services::notify::{Notification, SharedSink, SoundKind};
use crate::services::reminders::{
    self, assess_pre_alert, ReminderEvent, ReminderKind, ReminderMessage, ReminderTable,
};
use crate::services::store::{SharedStore, StoreError};
use crate::services::weather_chain::{ChainOutcome, WeatherChain};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Foreground reminder poll interval.
pub const FOREGROUND_POLL_SECS: u64 = 30;

/// Foreground countdown tick.
pub const COUNTDOWN_TICK_SECS: u64 = 1;

/// Value written to a marker key once its event has fired.
const SENT_MARKER: &str = "sent";

/// How many fired events the status endpoint remembers per host.
const MAX_RECENT_EVENTS: usize = 20;

// ---------------------------------------------------------------------------
// Scheduled tasks
// ---------------------------------------------------------------------------

/// A periodic job running on its own tokio task until cancelled.
pub struct ScheduledTask {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `job` every `period`. The first run happens immediately when
    /// `run_now` is set, otherwise after one period. Cancelling `parent`
    /// cancels the task too.
    pub fn every<F, Fut>(
        name: &'static str,
        period: StdDuration,
        run_now: bool,
        parent: &CancellationToken,
        mut job: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let cancelled = token.clone();
        let start = if run_now {
            Instant::now()
        } else {
            Instant::now() + period
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!("Scheduled task '{}' started ({:?})", name, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => job().await,
                }
            }
            tracing::debug!("Scheduled task '{}' stopped", name);
        });

        Self {
            name,
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the task to finish after cancellation.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Scheduled task '{}' panicked: {}", self.name, e);
        }
    }
}

// ---------------------------------------------------------------------------
// Weather feeds
// ---------------------------------------------------------------------------

/// Where a host gets its weather from.
#[async_trait]
pub trait WeatherFeed: Send + Sync {
    /// A recent outcome, fetched on demand when none is fresh enough.
    async fn current(&self, now: DateTime<FixedOffset>) -> ChainOutcome;
    /// Always run the chain.
    async fn refresh(&self, now: DateTime<FixedOffset>) -> ChainOutcome;
}

#[async_trait]
impl WeatherFeed for Dashboard {
    async fn current(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        self.current_at(now).await
    }

    async fn refresh(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        self.refresh_at(now).await
    }
}

/// Private chain instance for the background host. Outcomes are reused
/// until older than `max_age`.
pub struct ChainFeed {
    chain: WeatherChain,
    max_age: chrono::Duration,
    last: RwLock<Option<ChainOutcome>>,
}

impl ChainFeed {
    pub fn new(chain: WeatherChain, max_age: StdDuration) -> Self {
        Self {
            chain,
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::minutes(30)),
            last: RwLock::new(None),
        }
    }
}

#[async_trait]
impl WeatherFeed for ChainFeed {
    async fn current(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        if let Some(last) = self.last.read().await.as_ref() {
            if Utc::now() - last.fetched_at < self.max_age {
                return last.clone();
            }
        }
        self.refresh(now).await
    }

    async fn refresh(&self, now: DateTime<FixedOffset>) -> ChainOutcome {
        let outcome = self.chain.fetch(now).await;
        *self.last.write().await = Some(outcome.clone());
        outcome
    }
}

// ---------------------------------------------------------------------------
// Host state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    Foreground,
    Background,
}

impl HostKind {
    /// Store namespace for this host's markers.
    pub fn namespace(self) -> &'static str {
        match self {
            HostKind::Foreground => "fg:",
            HostKind::Background => "bg:",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FiredKind {
    PreAlert,
    Formal,
    HighLoad,
}

/// One notification sent by a host.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FiredEvent {
    pub kind: FiredKind,
    /// Marker key guarding the event
    pub key: String,
    pub title: String,
    pub fired_at: DateTime<Utc>,
}

/// Host status, exposed via the scheduler status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostStatus {
    pub host: HostKind,
    pub active: bool,
    pub schedule: ReminderTable,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub total_polls: u64,
    /// Plant-local time of the next formal reminder
    #[schema(value_type = Option<String>)]
    pub next_reminder_at: Option<NaiveDateTime>,
    pub countdown: Option<String>,
    pub recent_events: Vec<FiredEvent>,
    pub last_error: Option<String>,
    #[schema(value_type = Option<String>)]
    pub last_sweep_date: Option<NaiveDate>,
}

impl HostStatus {
    fn new(host: HostKind, schedule: ReminderTable) -> Self {
        Self {
            host,
            active: true,
            schedule,
            last_poll_at: None,
            total_polls: 0,
            next_reminder_at: None,
            countdown: None,
            recent_events: Vec::new(),
            last_error: None,
            last_sweep_date: None,
        }
    }
}

pub type SharedHostStatus = Arc<RwLock<HostStatus>>;

// ---------------------------------------------------------------------------
// Reminder host
// ---------------------------------------------------------------------------

pub struct ReminderHost {
    kind: HostKind,
    table: ReminderTable,
    store: SharedStore,
    sink: SharedSink,
    feed: Arc<dyn WeatherFeed>,
    status: SharedHostStatus,
}

impl ReminderHost {
    /// `store` must already be scoped to this host's namespace.
    pub fn new(
        kind: HostKind,
        table: ReminderTable,
        store: SharedStore,
        sink: SharedSink,
        feed: Arc<dyn WeatherFeed>,
    ) -> Self {
        let status = Arc::new(RwLock::new(HostStatus::new(kind, table.clone())));
        Self {
            kind,
            table,
            store,
            sink,
            feed,
            status,
        }
    }

    pub fn status(&self) -> SharedHostStatus {
        self.status.clone()
    }

    /// Write the marker for `key` unless present. Returns whether the caller
    /// should fire.
    async fn claim(&self, key: &str) -> Result<bool, StoreError> {
        if self.store.get(key).await?.is_some() {
            return Ok(false);
        }
        self.store.set(key, SENT_MARKER).await?;
        Ok(true)
    }

    async fn send(&self, kind: FiredKind, key: String, msg: ReminderMessage, sound: SoundKind) -> FiredEvent {
        let notification = Notification::new(msg.title, msg.body, sound);
        tracing::info!("{:?} host firing {:?} '{}'", self.kind, kind, key);
        self.sink.notify(&notification).await;
        FiredEvent {
            kind,
            key,
            title: notification.title,
            fired_at: notification.sent_at,
        }
    }

    async fn fire_pre_alert(&self, event: &ReminderEvent, now: DateTime<FixedOffset>) -> ReminderMessage {
        let outcome = self.feed.refresh(now).await;
        let next = outcome.series.get(1).map(|p| p.enthalpy());
        let assessment = assess_pre_alert(outcome.sample.enthalpy(), next);
        if assessment.strategy_change {
            tracing::info!(
                "Pre-alert: rule {} now, rule {:?} expected at {:02}:00",
                assessment.current_band,
                assessment.next_band.map(|b| b.number()),
                event.target_hour
            );
        }
        reminders::pre_alert_message(event, &assessment)
    }

    async fn fire_formal(&self, event: &ReminderEvent, now: DateTime<FixedOffset>) -> ReminderMessage {
        let outcome = self.feed.current(now).await;
        reminders::formal_message(event, Some(outcome.sample.enthalpy()))
    }

    /// One reminder poll at `now`. Returns the events fired.
    pub async fn poll_at(&self, now: DateTime<FixedOffset>) -> Result<Vec<FiredEvent>, StoreError> {
        let date = now.date_naive();
        let local = now.naive_local();
        let mut fired = Vec::new();

        for event in self.table.due_events(local) {
            let key = event.dedupe_key(date);
            if !self.claim(&key).await? {
                continue;
            }
            let (kind, msg, sound) = match event.kind {
                ReminderKind::PreAlert => (
                    FiredKind::PreAlert,
                    self.fire_pre_alert(event, now).await,
                    SoundKind::Warning,
                ),
                ReminderKind::Formal => (
                    FiredKind::Formal,
                    self.fire_formal(event, now).await,
                    SoundKind::Reminder,
                ),
            };
            fired.push(self.send(kind, key, msg, sound).await);
        }

        if now.minute() < reminders::FIRE_WINDOW_MINUTES {
            let enthalpy = self.feed.current(now).await.sample.enthalpy();
            if reminders::high_load_due(enthalpy, local) {
                let key = reminders::high_load_key(date, now.hour());
                if self.claim(&key).await? {
                    let msg = reminders::high_load_message(enthalpy);
                    fired.push(self.send(FiredKind::HighLoad, key, msg, SoundKind::Warning).await);
                }
            }
        }

        Ok(fired)
    }

    /// Poll, sweep old markers once per day and publish status.
    pub async fn tick(&self, now: DateTime<FixedOffset>) {
        let result = self.poll_at(now).await;

        let today = now.date_naive();
        let needs_sweep = self.status.read().await.last_sweep_date != Some(today);
        let sweep = if needs_sweep {
            Some(history::sweep_markers(self.store.as_ref(), today).await)
        } else {
            None
        };

        let mut s = self.status.write().await;
        s.last_poll_at = Some(Utc::now());
        s.total_polls += 1;
        s.next_reminder_at = self.table.next_formal(now.naive_local());
        match result {
            Ok(fired) => {
                s.last_error = None;
                for event in fired {
                    s.recent_events.insert(0, event);
                }
                s.recent_events.truncate(MAX_RECENT_EVENTS);
            }
            Err(e) => {
                tracing::error!("{:?} reminder poll failed: {}", self.kind, e);
                s.last_error = Some(e.to_string());
            }
        }
        match sweep {
            Some(Ok(_)) => s.last_sweep_date = Some(today),
            Some(Err(e)) => tracing::warn!("{:?} marker sweep failed: {}", self.kind, e),
            None => {}
        }
    }

    /// Refresh the countdown to the next formal reminder.
    pub async fn update_countdown(&self, now: DateTime<FixedOffset>) {
        let local = now.naive_local();
        let next = self.table.next_formal(local);
        let mut s = self.status.write().await;
        s.next_reminder_at = next;
        s.countdown = next.map(|at| reminders::format_countdown(at - local));
    }

    /// Send a test notification without touching any marker.
    pub async fn trigger_test(&self, kind: TestKind, now: DateTime<FixedOffset>) -> Notification {
        let hour = now.hour();
        let (msg, sound) = match kind {
            TestKind::Plain => (
                ReminderMessage {
                    title: "Test notification".to_string(),
                    body: "Notifications are working.".to_string(),
                },
                SoundKind::Test,
            ),
            TestKind::Reminder => {
                let event = ReminderEvent {
                    hour,
                    minute: 0,
                    kind: ReminderKind::Formal,
                    label: reminders::label_for_hour(hour).to_string(),
                    target_hour: hour,
                };
                (self.fire_formal(&event, now).await, SoundKind::Reminder)
            }
            TestKind::PreAlert => {
                let target = (hour + 1) % 24;
                let event = ReminderEvent {
                    hour,
                    minute: 0,
                    kind: ReminderKind::PreAlert,
                    label: format!("{} pre-alert", reminders::label_for_hour(target)),
                    target_hour: target,
                };
                (self.fire_pre_alert(&event, now).await, SoundKind::Warning)
            }
        };
        let notification = Notification::new(msg.title, msg.body, sound);
        self.sink.notify(&notification).await;
        notification
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Plain,
    Reminder,
    PreAlert,
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

fn local_now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Start the foreground reminder poll, countdown and forecast refresh tasks.
pub fn spawn_foreground(
    host: Arc<ReminderHost>,
    dashboard: Arc<Dashboard>,
    refresh_every: StdDuration,
    offset: FixedOffset,
    shutdown: &CancellationToken,
) -> Vec<ScheduledTask> {
    let poll_host = host.clone();
    let countdown_host = host;
    vec![
        ScheduledTask::every("forecast-refresh", refresh_every, true, shutdown, move || {
            let dashboard = dashboard.clone();
            async move {
                dashboard.refresh_at(local_now(offset)).await;
            }
        }),
        ScheduledTask::every(
            "foreground-reminders",
            StdDuration::from_secs(FOREGROUND_POLL_SECS),
            true,
            shutdown,
            move || {
                let host = poll_host.clone();
                async move { host.tick(local_now(offset)).await }
            },
        ),
        ScheduledTask::every(
            "countdown",
            StdDuration::from_secs(COUNTDOWN_TICK_SECS),
            true,
            shutdown,
            move || {
                let host = countdown_host.clone();
                async move { host.update_countdown(local_now(offset)).await }
            },
        ),
    ]
}

/// Start the background host's wake loop.
pub fn spawn_background(
    host: Arc<ReminderHost>,
    wake_every: StdDuration,
    offset: FixedOffset,
    shutdown: &CancellationToken,
) -> ScheduledTask {
    ScheduledTask::every("background-reminders", wake_every, true, shutdown, move || {
        let host = host.clone();
        async move { host.tick(local_now(offset)).await }
    })
}

/// Cancel every task and wait for them to stop, marking the hosts inactive.
pub async fn shutdown_all(tasks: Vec<ScheduledTask>, statuses: &[SharedHostStatus]) {
    for task in &tasks {
        task.cancel();
    }
    for task in tasks {
        task.join().await;
    }
    for status in statuses {
        status.write().await.active = false;
    }
    tracing::info!("Scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notify::test_support::RecordingSink;
    use crate::services::sources::test_support::taipei;
    use crate::services::store::{MemoryStore, Namespaced};
    use crate::services::weather_chain::test_support::fixed_chain;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        host: ReminderHost,
        sink: Arc<RecordingSink>,
        shared: SharedStore,
    }

    fn host_with(kind: HostKind, table: ReminderTable, temps: Vec<f64>) -> Fixture {
        let shared: SharedStore = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let feed = Arc::new(ChainFeed::new(fixed_chain(temps), StdDuration::from_secs(1800)));
        let host = ReminderHost::new(
            kind,
            table,
            Arc::new(Namespaced::new(shared.clone(), kind.namespace())),
            sink.clone(),
            feed,
        );
        Fixture { host, sink, shared }
    }

    fn foreground(temps: Vec<f64>) -> Fixture {
        host_with(HostKind::Foreground, ReminderTable::foreground(), temps)
    }

    #[tokio::test]
    async fn test_formal_fires_once_per_window() {
        let f = foreground(vec![25.0; 24]);

        let fired = f.host.poll_at(taipei(2025, 7, 1, 8, 2)).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, FiredKind::Formal);
        assert_eq!(fired[0].key, "reminder-2025-07-01-8");

        let again = f.host.poll_at(taipei(2025, 7, 1, 8, 4)).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(f.sink.titles().len(), 1);
        assert!(f
            .shared
            .get("fg:reminder-2025-07-01-8")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_outside_window_nothing_fires() {
        let f = foreground(vec![25.0; 24]);
        assert!(f.host.poll_at(taipei(2025, 7, 1, 8, 6)).await.unwrap().is_empty());
        assert!(f.host.poll_at(taipei(2025, 7, 1, 9, 30)).await.unwrap().is_empty());
        assert!(f.sink.titles().is_empty());
    }

    #[tokio::test]
    async fn test_pre_alert_flags_strategy_change() {
        // 24 C now, 31 C next hour at 60% RH: band 1 -> band 3
        let mut temps = vec![24.0, 31.0];
        temps.resize(24, 31.0);
        let f = foreground(temps);

        let fired = f.host.poll_at(taipei(2025, 7, 1, 7, 0)).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, FiredKind::PreAlert);

        let sent = f.sink.sent.lock().unwrap();
        assert_eq!(sent[0].sound, SoundKind::Warning);
        assert!(sent[0].body.contains("will need adjusting"));
        assert!(sent[0].body.contains("08:00"));
    }

    #[tokio::test]
    async fn test_high_load_guarded_per_hour() {
        // 34 C at 60% RH is band 4
        let f = foreground(vec![34.0; 24]);
        let fired = f.host.poll_at(taipei(2025, 7, 1, 14, 1)).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, FiredKind::HighLoad);
        assert!(f.host.poll_at(taipei(2025, 7, 1, 14, 3)).await.unwrap().is_empty());
        // Next hour is a new key
        assert_eq!(f.host.poll_at(taipei(2025, 7, 1, 15, 0)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hosts_use_disjoint_markers() {
        let shared: SharedStore = Arc::new(MemoryStore::new());
        let mk = |kind: HostKind, table: ReminderTable, sink: Arc<RecordingSink>| {
            ReminderHost::new(
                kind,
                table,
                Arc::new(Namespaced::new(shared.clone(), kind.namespace())),
                sink,
                Arc::new(ChainFeed::new(fixed_chain(vec![25.0; 24]), StdDuration::from_secs(1800))),
            )
        };
        let fg_sink = Arc::new(RecordingSink::default());
        let bg_sink = Arc::new(RecordingSink::default());
        let fg = mk(HostKind::Foreground, ReminderTable::foreground(), fg_sink.clone());
        let bg = mk(HostKind::Background, ReminderTable::background(), bg_sink.clone());

        let noon = taipei(2025, 7, 1, 12, 1);
        assert_eq!(fg.poll_at(noon).await.unwrap().len(), 1);
        assert_eq!(bg.poll_at(noon).await.unwrap().len(), 1);

        // 17:00 is formal for the foreground only; the background pre-alerts for 18:00
        let five = taipei(2025, 7, 1, 17, 0);
        let fg_fired = fg.poll_at(five).await.unwrap();
        let bg_fired = bg.poll_at(five).await.unwrap();
        assert_eq!(fg_fired[0].kind, FiredKind::Formal);
        assert_eq!(bg_fired[0].kind, FiredKind::PreAlert);
        assert!(shared.get("bg:pre-alert-2025-07-01-17").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tick_publishes_status_and_sweeps() {
        let f = foreground(vec![25.0; 24]);
        f.shared
            .set("fg:reminder-2025-06-01-8", "sent")
            .await
            .unwrap();

        f.host.tick(taipei(2025, 7, 1, 8, 0)).await;

        let s = f.host.status().read().await.clone();
        assert_eq!(s.total_polls, 1);
        assert_eq!(s.recent_events.len(), 1);
        assert_eq!(s.last_sweep_date, NaiveDate::from_ymd_opt(2025, 7, 1));
        assert_eq!(
            s.next_reminder_at,
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap().and_hms_opt(12, 0, 0)
        );
        assert!(f.shared.get("fg:reminder-2025-06-01-8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_countdown() {
        let f = foreground(vec![25.0; 24]);
        f.host.update_countdown(taipei(2025, 7, 1, 10, 45)).await;
        let s = f.host.status().read().await.clone();
        assert_eq!(s.countdown.as_deref(), Some("1h 15m"));
    }

    #[tokio::test]
    async fn test_trigger_test_leaves_no_marker() {
        let f = foreground(vec![25.0; 24]);
        let now = taipei(2025, 7, 1, 8, 1);
        let n = f.host.trigger_test(TestKind::Reminder, now).await;
        assert_eq!(n.sound, SoundKind::Reminder);
        let n = f.host.trigger_test(TestKind::PreAlert, now).await;
        assert!(n.body.contains("09:00"));
        f.host.trigger_test(TestKind::Plain, now).await;
        assert_eq!(f.sink.titles().len(), 3);

        // The real 08:00 reminder still fires
        assert_eq!(f.host.poll_at(now).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_runs_until_cancelled() {
        let shutdown = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = ScheduledTask::every("test", StdDuration::from_secs(30), true, &shutdown, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(StdDuration::from_secs(95)).await;
        // Immediate run plus ticks at 30, 60 and 90 seconds
        assert_eq!(count.load(Ordering::SeqCst), 4);

        shutdown.cancel();
        assert!(task.is_cancelled());
        task.join().await;
        tokio::time::sleep(StdDuration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_start() {
        let shutdown = CancellationToken::new();
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = ScheduledTask::every("delayed", StdDuration::from_secs(60), false, &shutdown, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(StdDuration::from_secs(31)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(task.name(), "delayed");
        task.cancel();
        task.join().await;
    }
}
