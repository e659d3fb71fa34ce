//! Reminder schedule logic shared by the foreground and background hosts.
//!
//! Everything here is a pure function of the wall-clock time passed in, so
//! the hosts differ only in their tables, their store namespace and how
//! often they wake.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::rules::{RuleBand, THRESHOLD_BAND_4};

/// Minutes after the configured minute during which an event may still fire.
pub const FIRE_WINDOW_MINUTES: u32 = 5;

/// Formal check times for the foreground host.
pub const FOREGROUND_FORMAL_HOURS: [u32; 3] = [8, 12, 17];

/// Formal check times for the background host. The last slot differs from
/// the foreground table; see DESIGN.md.
pub const BACKGROUND_FORMAL_HOURS: [u32; 3] = [8, 12, 18];

/// Pre-alerts run this many hours before each formal time.
const PRE_ALERT_LEAD_HOURS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Fetch a fresh forecast and warn if the next hour changes the rule band
    PreAlert,
    /// Plain "time to check the plant" reminder
    Formal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReminderEvent {
    pub hour: u32,
    pub minute: u32,
    pub kind: ReminderKind,
    pub label: String,
    /// Formal hour this event prepares for (equal to `hour` for formal events)
    pub target_hour: u32,
}

/// Greeting label for a local hour.
pub fn label_for_hour(hour: u32) -> &'static str {
    if hour < 12 {
        "morning"
    } else if hour < 17 {
        "noon"
    } else {
        "afternoon"
    }
}

impl ReminderEvent {
    /// Marker key guarding this event on `date`; the host adds its namespace.
    pub fn dedupe_key(&self, date: NaiveDate) -> String {
        let kind = match self.kind {
            ReminderKind::PreAlert => "pre-alert",
            ReminderKind::Formal => "reminder",
        };
        format!("{}-{}-{}", kind, date.format("%Y-%m-%d"), self.hour)
    }

    /// Whether `now` falls inside this event's firing window.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.hour() == self.hour
            && now.minute() >= self.minute
            && now.minute() <= self.minute + FIRE_WINDOW_MINUTES
    }
}

/// One host's schedule: pre-alerts followed by formal reminders.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReminderTable {
    pub pre_alerts: Vec<ReminderEvent>,
    pub formal: Vec<ReminderEvent>,
}

impl ReminderTable {
    pub fn from_formal_hours(hours: &[u32]) -> Self {
        let formal = hours
            .iter()
            .map(|&h| ReminderEvent {
                hour: h,
                minute: 0,
                kind: ReminderKind::Formal,
                label: label_for_hour(h).to_string(),
                target_hour: h,
            })
            .collect();
        let pre_alerts = hours
            .iter()
            .map(|&h| {
                let hour = (h + 24 - PRE_ALERT_LEAD_HOURS) % 24;
                ReminderEvent {
                    hour,
                    minute: 0,
                    kind: ReminderKind::PreAlert,
                    label: format!("{} pre-alert", label_for_hour(h)),
                    target_hour: h,
                }
            })
            .collect();
        Self { pre_alerts, formal }
    }

    pub fn foreground() -> Self {
        Self::from_formal_hours(&FOREGROUND_FORMAL_HOURS)
    }

    pub fn background() -> Self {
        Self::from_formal_hours(&BACKGROUND_FORMAL_HOURS)
    }

    /// Events whose window contains `now`, pre-alerts first.
    pub fn due_events(&self, now: NaiveDateTime) -> Vec<&ReminderEvent> {
        self.pre_alerts
            .iter()
            .chain(self.formal.iter())
            .filter(|e| e.is_due(now))
            .collect()
    }

    /// Next formal reminder strictly after `now`: later today, else the
    /// earliest one tomorrow.
    pub fn next_formal(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let today = now.date();
        let at = |date: NaiveDate, e: &ReminderEvent| date.and_hms_opt(e.hour, e.minute, 0);

        let later_today = self
            .formal
            .iter()
            .filter_map(|e| at(today, e))
            .filter(|t| *t > now)
            .min();
        later_today.or_else(|| {
            let tomorrow = today.succ_opt()?;
            self.formal.iter().filter_map(|e| at(tomorrow, e)).min()
        })
    }
}

/// Marker key for the hourly high-load check.
pub fn high_load_key(date: NaiveDate, hour: u32) -> String {
    format!("high-load-{}-{}", date.format("%Y-%m-%d"), hour)
}

/// High-load advisory fires in the first minutes of an hour at band 4 or above.
pub fn high_load_due(enthalpy: f64, now: NaiveDateTime) -> bool {
    enthalpy >= THRESHOLD_BAND_4 && now.minute() < FIRE_WINDOW_MINUTES
}

/// "Xh Ym", "Ym Zs", "Zs", or "now" once the target has passed.
pub fn format_countdown(remaining: Duration) -> String {
    let total = remaining.num_seconds();
    if total <= 0 {
        return "now".to_string();
    }
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Rendered notification text.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderMessage {
    pub title: String,
    pub body: String,
}

pub fn formal_message(event: &ReminderEvent, latest_enthalpy: Option<f64>) -> ReminderMessage {
    let mut body = format!(
        "Good {}! It is {:02}:00, time to review chiller operation.",
        event.label, event.hour
    );
    if let Some(e) = latest_enthalpy {
        let band = RuleBand::classify(e);
        body.push_str(&format!(
            "\nCurrent enthalpy {:.1} kJ/kg (rule {}): {}",
            e,
            band,
            band.recommendation().equipment
        ));
    }
    ReminderMessage {
        title: "Chiller analysis reminder".to_string(),
        body,
    }
}

/// Result of comparing the current band with the next forecast hour.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PreAlertAssessment {
    pub current_enthalpy: f64,
    pub current_band: RuleBand,
    pub next_enthalpy: Option<f64>,
    pub next_band: Option<RuleBand>,
    pub strategy_change: bool,
}

pub fn assess_pre_alert(current_enthalpy: f64, next_enthalpy: Option<f64>) -> PreAlertAssessment {
    let current_band = RuleBand::classify(current_enthalpy);
    let next_band = next_enthalpy.map(RuleBand::classify);
    PreAlertAssessment {
        current_enthalpy,
        current_band,
        next_enthalpy,
        next_band,
        strategy_change: next_band.is_some_and(|b| b != current_band),
    }
}

pub fn pre_alert_message(event: &ReminderEvent, assessment: &PreAlertAssessment) -> ReminderMessage {
    let mut body = format!(
        "{} analysis\nCurrent enthalpy {:.1} kJ/kg (rule {})",
        event.label, assessment.current_enthalpy, assessment.current_band
    );
    match (assessment.next_enthalpy, assessment.next_band) {
        (Some(next), Some(band)) => {
            body.push_str(&format!(
                "\nExpected at {:02}:00: {:.1} kJ/kg (rule {})\n",
                event.target_hour, next, band
            ));
            body.push_str(if assessment.strategy_change {
                "Attention: operating strategy will need adjusting"
            } else {
                "No change to operating strategy needed"
            });
            ReminderMessage {
                title: format!("{} - forecast check", event.label),
                body,
            }
        }
        _ => pre_alert_fallback(event, Some(assessment.current_enthalpy)),
    }
}

/// Plain pre-alert used when no forecast is available.
pub fn pre_alert_fallback(event: &ReminderEvent, current_enthalpy: Option<f64>) -> ReminderMessage {
    let mut body = format!("{} analysis\n", event.label);
    if let Some(e) = current_enthalpy {
        body.push_str(&format!(
            "Current enthalpy {:.1} kJ/kg (rule {})\n",
            e,
            RuleBand::classify(e)
        ));
    }
    body.push_str(&format!(
        "The {:02}:00 check is coming up; prepare to review the chillers.",
        event.target_hour
    ));
    ReminderMessage {
        title: event.label.clone(),
        body,
    }
}

pub fn high_load_message(enthalpy: f64) -> ReminderMessage {
    let band = RuleBand::classify(enthalpy);
    ReminderMessage {
        title: "High load".to_string(),
        body: format!(
            "Enthalpy {:.1} kJ/kg (rule {}): {}",
            enthalpy,
            band,
            band.recommendation().equipment
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_foreground_and_background_tables() {
        let fg = ReminderTable::foreground();
        let hours: Vec<u32> = fg.formal.iter().map(|e| e.hour).collect();
        assert_eq!(hours, vec![8, 12, 17]);
        let pre: Vec<u32> = fg.pre_alerts.iter().map(|e| e.hour).collect();
        assert_eq!(pre, vec![7, 11, 16]);

        let bg = ReminderTable::background();
        assert_eq!(bg.formal[2].hour, 18);
        assert_eq!(bg.pre_alerts[2].hour, 17);
        assert_eq!(bg.pre_alerts[2].target_hour, 18);
    }

    #[test]
    fn test_fire_window() {
        let fg = ReminderTable::foreground();
        assert_eq!(fg.due_events(at(8, 0)).len(), 1);
        assert_eq!(fg.due_events(at(8, 5)).len(), 1);
        assert!(fg.due_events(at(8, 6)).is_empty());
        assert!(fg.due_events(at(9, 2)).is_empty());
        let due = fg.due_events(at(7, 3));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, ReminderKind::PreAlert);
        assert_eq!(due[0].target_hour, 8);
    }

    #[test]
    fn test_background_at_17_only_pre_alert() {
        let table = ReminderTable::background();
        let due = table.due_events(at(17, 1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, ReminderKind::PreAlert);
    }

    #[test]
    fn test_dedupe_keys() {
        let fg = ReminderTable::foreground();
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(fg.formal[0].dedupe_key(date), "reminder-2025-07-01-8");
        assert_eq!(fg.pre_alerts[0].dedupe_key(date), "pre-alert-2025-07-01-7");
        assert_eq!(high_load_key(date, 14), "high-load-2025-07-01-14");
    }

    #[test]
    fn test_next_formal_today_and_tomorrow() {
        let fg = ReminderTable::foreground();
        assert_eq!(fg.next_formal(at(9, 0)), Some(at(12, 0)));
        // Exactly at a reminder time, the next one is the following slot
        assert_eq!(fg.next_formal(at(12, 0)), Some(at(17, 0)));
        let tomorrow_8 = NaiveDate::from_ymd_opt(2025, 7, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(fg.next_formal(at(17, 30)), Some(tomorrow_8));
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::seconds(2 * 3600 + 15 * 60 + 9)), "2h 15m");
        assert_eq!(format_countdown(Duration::seconds(15 * 60 + 9)), "15m 9s");
        assert_eq!(format_countdown(Duration::seconds(42)), "42s");
        assert_eq!(format_countdown(Duration::zero()), "now");
        assert_eq!(format_countdown(Duration::seconds(-5)), "now");
    }

    #[test]
    fn test_high_load_due() {
        assert!(high_load_due(85.0, at(14, 4)));
        assert!(!high_load_due(85.0, at(14, 5)));
        assert!(!high_load_due(84.9, at(14, 0)));
    }

    #[test]
    fn test_pre_alert_assessment() {
        let a = assess_pre_alert(70.0, Some(74.0));
        assert!(a.strategy_change);
        assert_eq!(a.next_band, Some(RuleBand::Three));

        let same = assess_pre_alert(60.0, Some(65.0));
        assert!(!same.strategy_change);

        let none = assess_pre_alert(60.0, None);
        assert!(!none.strategy_change);
        let fg = ReminderTable::foreground();
        let msg = pre_alert_message(&fg.pre_alerts[0], &none);
        assert!(msg.body.contains("08:00 check is coming up"));
    }

    #[test]
    fn test_formal_message_includes_band_when_known() {
        let fg = ReminderTable::foreground();
        let msg = formal_message(&fg.formal[1], Some(86.0));
        assert!(msg.body.contains("Good noon"));
        assert!(msg.body.contains("rule 4"));
        let plain = formal_message(&fg.formal[1], None);
        assert!(!plain.body.contains("rule"));
    }
}
