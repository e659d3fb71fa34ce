//! Moist-air specific enthalpy (kJ/kg dry air) from dry-bulb temperature and
//! relative humidity at standard sea-level pressure.

use crate::helpers::round_1dp;

/// Standard atmospheric pressure (hPa).
const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// Compute enthalpy rounded to 0.1 kJ/kg.
///
/// A zero or non-finite temperature or humidity yields 0. Sources report
/// missing readings that way, and 0 keeps the plant in its lightest band
/// rather than failing the refresh.
pub fn enthalpy(temperature_c: f64, relative_humidity_pct: f64) -> f64 {
    if !is_present(temperature_c) || !is_present(relative_humidity_pct) {
        return 0.0;
    }
    let t = temperature_c;
    // Magnus saturation vapour pressure (hPa)
    let es = 6.112 * ((17.67 * t) / (t + 243.5)).exp();
    let e = es * relative_humidity_pct / 100.0;
    let w = 0.622 * e / (STANDARD_PRESSURE_HPA - e);
    round_1dp(1.006 * t + w * (2501.0 + 1.86 * t))
}

fn is_present(v: f64) -> bool {
    v.is_finite() && v != 0.0
}
