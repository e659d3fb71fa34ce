//! Enthalpy-driven operating rules for the chiller plant.
//!
//! The five bands and their thresholds are shared by live classification,
//! forecast alerts, pre-alert comparison and both reminder hosts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lower enthalpy bound (kJ/kg) of band 2.
pub const THRESHOLD_BAND_2: f64 = 56.0;
/// Lower bound of band 3: a large chiller is required.
pub const THRESHOLD_BAND_3: f64 = 72.0;
/// Lower bound of band 4: high load.
pub const THRESHOLD_BAND_4: f64 = 85.0;
/// Lower bound of band 5: extreme load.
pub const THRESHOLD_BAND_5: f64 = 95.0;

/// Operating rule band, ordered by increasing cooling load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RuleBand {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
}

/// Standing recommendation attached to a band.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Recommendation {
    pub band: RuleBand,
    /// Enthalpy range label, e.g. "72-84"
    pub range: String,
    /// Equipment combination to run
    pub equipment: String,
    /// Chilled-water pump guidance
    pub pump: String,
    pub summary: String,
}

// Documented as the bare band number it serializes to
impl utoipa::PartialSchema for RuleBand {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        <u8 as utoipa::PartialSchema>::schema()
    }
}

impl ToSchema for RuleBand {}

impl From<RuleBand> for u8 {
    fn from(band: RuleBand) -> u8 {
        band as u8
    }
}

impl TryFrom<u8> for RuleBand {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        RuleBand::ALL
            .into_iter()
            .find(|b| b.number() == n)
            .ok_or_else(|| format!("rule band must be 1-5, got {}", n))
    }
}

impl RuleBand {
    pub const ALL: [RuleBand; 5] = [
        RuleBand::One,
        RuleBand::Two,
        RuleBand::Three,
        RuleBand::Four,
        RuleBand::Five,
    ];

    /// Classify an enthalpy value. Monotonic step function; NaN falls into band 1.
    pub fn classify(enthalpy: f64) -> RuleBand {
        if enthalpy >= THRESHOLD_BAND_5 {
            RuleBand::Five
        } else if enthalpy >= THRESHOLD_BAND_4 {
            RuleBand::Four
        } else if enthalpy >= THRESHOLD_BAND_3 {
            RuleBand::Three
        } else if enthalpy >= THRESHOLD_BAND_2 {
            RuleBand::Two
        } else {
            RuleBand::One
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Lower enthalpy bound of this band (0 for band 1).
    pub fn lower_bound(self) -> f64 {
        match self {
            RuleBand::One => 0.0,
            RuleBand::Two => THRESHOLD_BAND_2,
            RuleBand::Three => THRESHOLD_BAND_3,
            RuleBand::Four => THRESHOLD_BAND_4,
            RuleBand::Five => THRESHOLD_BAND_5,
        }
    }

    pub fn recommendation(self) -> Recommendation {
        let (range, equipment, pump, summary) = match self {
            RuleBand::One => (
                "<56",
                "Small chiller #4 alone",
                "Chilled-water pump at or below 45 Hz",
                "Low load: one small chiller covers demand",
            ),
            RuleBand::Two => (
                "56-71",
                "Small chillers #4 and #5",
                "Chilled-water pumps at or below 40 Hz",
                "Moderate load: run both small chillers",
            ),
            RuleBand::Three => (
                "72-84",
                "One large chiller (#1 or #2), small chillers off",
                "Chilled-water pump at or below 48 Hz",
                "Medium-high load: switch to a large chiller",
            ),
            RuleBand::Four => (
                "85-94",
                "One large chiller at 100% plus small chiller #4",
                "Large-chiller pump 48 Hz, small-chiller pump 40-42 Hz",
                "High load: large chiller plus one small chiller",
            ),
            RuleBand::Five => (
                ">=95",
                "One large chiller plus small chillers #4 and #5",
                "All pumps up; maximise heat rejection",
                "Extreme load: run everything",
            ),
        };
        Recommendation {
            band: self,
            range: range.to_string(),
            equipment: equipment.to_string(),
            pump: pump.to_string(),
            summary: summary.to_string(),
        }
    }
}

impl std::fmt::Display for RuleBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}
