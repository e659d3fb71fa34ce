//! Forecast alerts: scan the next six forecast hours for rule-band crossings.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::rules::{
    RuleBand, THRESHOLD_BAND_2, THRESHOLD_BAND_3, THRESHOLD_BAND_4, THRESHOLD_BAND_5,
};
use crate::services::sources::ForecastSeries;

/// Forecast points examined after the current hour.
pub const ALERT_LOOKAHEAD_HOURS: usize = 6;

/// Minutes before the projected hour by which a large chiller should be running.
const SWITCH_LEAD_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Info,
}

/// What an advisory asks the operator to do, in detection precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// Rising through 72: bring a large chiller online
    SwitchToLarge,
    /// Falling below 56: small chiller #4 alone
    SingleSmallChiller,
    /// Rising through 85: add a small chiller to the large one
    HighLoad,
    /// Rising through 95: everything on
    ExtremeLoad,
    /// Falling below 72: small chillers may suffice again
    ReturnToSmall,
    /// Rising through 56: add small chiller #5
    AddSecondSmall,
    /// Falling below 85 while staying at or above 72
    HighLoadEasing,
    /// Falling below 95 while staying at or above 85
    ExtremeLoadEasing,
    /// No crossing ahead; current band holds
    SteadyState,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Advisory {
    pub kind: AdvisoryKind,
    pub severity: Severity,
    pub from_band: RuleBand,
    pub to_band: RuleBand,
    /// Local hour the crossing is projected for; None for steady state
    pub projected_hour: Option<u32>,
    pub hours_from_now: Option<u32>,
    /// Enthalpy at the projected hour (current enthalpy for steady state)
    pub enthalpy: f64,
    /// Local "HH:MM" by which to act, for large-chiller switches
    pub act_by: Option<String>,
    pub message: String,
}

/// Classify a crossing between two consecutive enthalpy values.
fn crossing_kind(prev: f64, next: f64) -> Option<AdvisoryKind> {
    let up = |t: f64| next >= t && prev < t;
    let down = |t: f64| next < t && prev >= t;

    if up(THRESHOLD_BAND_3) {
        Some(AdvisoryKind::SwitchToLarge)
    } else if down(THRESHOLD_BAND_2) {
        Some(AdvisoryKind::SingleSmallChiller)
    } else if up(THRESHOLD_BAND_4) {
        Some(AdvisoryKind::HighLoad)
    } else if up(THRESHOLD_BAND_5) {
        Some(AdvisoryKind::ExtremeLoad)
    } else if down(THRESHOLD_BAND_3) {
        Some(AdvisoryKind::ReturnToSmall)
    } else if up(THRESHOLD_BAND_2) {
        Some(AdvisoryKind::AddSecondSmall)
    } else if down(THRESHOLD_BAND_4) {
        Some(AdvisoryKind::HighLoadEasing)
    } else if down(THRESHOLD_BAND_5) {
        Some(AdvisoryKind::ExtremeLoadEasing)
    } else {
        None
    }
}

/// "HH:MM" of `minutes` before `hour`:00, wrapping past midnight.
fn time_before(hour: u32, minutes: u32) -> String {
    let total = (hour * 60 + 24 * 60 - minutes) % (24 * 60);
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn crossing_advisory(
    kind: AdvisoryKind,
    from_band: RuleBand,
    to_band: RuleBand,
    hour: u32,
    hours_from_now: u32,
    enthalpy: f64,
) -> Advisory {
    let at = format!("{:02}:00", hour);
    let mut act_by = None;
    let (severity, message) = match kind {
        AdvisoryKind::SwitchToLarge => {
            let by = time_before(hour, SWITCH_LEAD_MINUTES);
            let msg = format!(
                "Enthalpy expected to reach {:.0} at {}; switch to a large chiller by {}",
                enthalpy, at, by
            );
            act_by = Some(by);
            (Severity::Warning, msg)
        }
        AdvisoryKind::SingleSmallChiller => (
            Severity::Info,
            format!(
                "Enthalpy expected to fall to {:.0} at {}; small chiller #4 can run alone (rule 1)",
                enthalpy, at
            ),
        ),
        AdvisoryKind::HighLoad => (
            Severity::Warning,
            format!(
                "High load expected at {} (enthalpy {:.0}); add a small chiller",
                at, enthalpy
            ),
        ),
        AdvisoryKind::ExtremeLoad => (
            Severity::Warning,
            format!(
                "Extreme load expected at {} (enthalpy {:.0}); run all chillers",
                at, enthalpy
            ),
        ),
        AdvisoryKind::ReturnToSmall => (
            Severity::Info,
            format!(
                "Enthalpy expected to fall to {:.0} at {}; consider returning to small chillers",
                enthalpy, at
            ),
        ),
        AdvisoryKind::AddSecondSmall => (
            Severity::Info,
            format!(
                "Enthalpy expected to rise to {:.0} at {}; add small chiller #5 (rule 2)",
                enthalpy, at
            ),
        ),
        AdvisoryKind::HighLoadEasing => (
            Severity::Info,
            format!(
                "High load easing at {} (enthalpy {:.0}); the extra small chiller can stop",
                at, enthalpy
            ),
        ),
        AdvisoryKind::ExtremeLoadEasing => (
            Severity::Info,
            format!(
                "Extreme load easing at {} (enthalpy {:.0}); return to one large plus #4",
                at, enthalpy
            ),
        ),
        AdvisoryKind::SteadyState => (Severity::Info, String::new()),
    };

    Advisory {
        kind,
        severity,
        from_band,
        to_band,
        projected_hour: Some(hour),
        hours_from_now: Some(hours_from_now),
        enthalpy,
        act_by,
        message,
    }
}

fn steady_state(current_enthalpy: f64) -> Advisory {
    let band = RuleBand::classify(current_enthalpy);
    let rec = band.recommendation();
    Advisory {
        kind: AdvisoryKind::SteadyState,
        severity: Severity::Info,
        from_band: band,
        to_band: band,
        projected_hour: None,
        hours_from_now: None,
        enthalpy: current_enthalpy,
        act_by: None,
        message: format!(
            "Current enthalpy {:.1} (rule {}): {}. No rule change in the next {} hours",
            current_enthalpy, band, rec.equipment, ALERT_LOOKAHEAD_HOURS
        ),
    }
}

/// Advisories for the next six hours, in chronological order.
///
/// The first comparison is between the current sample and forecast point 1.
/// Each band transition (e.g. 3→4) is reported at most once per scan. When
/// nothing crosses, a single steady-state advisory for the current band is
/// returned.
pub fn generate_alerts(current_enthalpy: f64, series: &ForecastSeries) -> Vec<Advisory> {
    let points = series.points();
    let mut alerts = Vec::new();
    let mut seen: Vec<(RuleBand, RuleBand)> = Vec::new();

    let last = ALERT_LOOKAHEAD_HOURS.min(points.len().saturating_sub(1));
    for i in 1..=last {
        let point = &points[i];
        let prev = if i == 1 {
            current_enthalpy
        } else {
            points[i - 1].enthalpy()
        };
        let next = point.enthalpy();
        let (from, to) = (RuleBand::classify(prev), RuleBand::classify(next));
        if from == to || seen.contains(&(from, to)) {
            continue;
        }
        if let Some(kind) = crossing_kind(prev, next) {
            seen.push((from, to));
            alerts.push(crossing_advisory(
                kind,
                from,
                to,
                point.hour_of_day(),
                point.hours_from_now(),
                next,
            ));
        }
    }

    if alerts.is_empty() {
        alerts.push(steady_state(current_enthalpy));
    }
    alerts
}
