/// ============================================================
///  Solar Geometry & Orientation Correction
///
///  Algorithm pipeline:
///   1. Day of year       – from the UTC date of the instant
///   2. Declination       – single-harmonic approximation
///   3. Solar hour        – UTC clock hour + 4 min per degree longitude
///   4. Hour angle        – 15° per hour from solar noon
///   5. Altitude/azimuth  – spherical trigonometry, clamped inputs
///   6. Correction factor – directional acceptance cone × altitude ramp
///                          plus a diffuse share
/// ============================================================

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::models::forecast::{Location, PanelConfig, SolarPosition};

// ─── Model constants ─────────────────────────────────────────
const ANGULAR_SPEED: f64 = 360.0 / 365.25; // degrees per day
const SIN_AXIAL_TILT: f64 = 0.3978;
const DIFFUSE_SHARE: f64 = 0.18;
/// At or below this altitude the sun contributes nothing
const NIGHT_ALTITUDE: f64 = -2.0;
/// From this altitude on the sun counts at full strength
const FULL_ALTITUDE: f64 = 5.0;

/// Sun altitude and compass azimuth for a location at an instant.
///
/// The longitude term converts the UTC clock into local mean solar time, so
/// no separate time-zone offset is involved. Never panics; a degenerate
/// geometry shows up as a non-finite value in the result.
pub fn sun_position(location: &Location, instant: DateTime<Utc>) -> SolarPosition {
    let doy = instant.ordinal() as f64;

    // ── Declination ───────────────────────────────────────────
    let day_offset = 81.0 - 2.0 * (ANGULAR_SPEED * (doy - 2.0)).to_radians().sin();
    let sin_decl = SIN_AXIAL_TILT * (ANGULAR_SPEED * (doy - day_offset)).to_radians().sin();
    let decl = sin_decl.clamp(-1.0, 1.0).asin();

    // ── Solar time & hour angle ───────────────────────────────
    let clock_h = instant.hour() as f64
        + instant.minute() as f64 / 60.0
        + instant.second() as f64 / 3600.0;
    let solar_h = clock_h + 4.0 * location.longitude / 60.0;
    let hour_angle = (15.0 * (12.0 - solar_h)).to_radians(); // positive before noon

    // ── Altitude ──────────────────────────────────────────────
    let lat = location.latitude.to_radians();
    let sin_alt = lat.sin() * decl.sin() + lat.cos() * decl.cos() * hour_angle.cos();
    let altitude = sin_alt.clamp(-1.0, 1.0).asin();
    let cos_alt = altitude.cos();

    // ── Azimuth (from north, clockwise) ───────────────────────
    let cos_az = (decl.sin() * lat.cos() - decl.cos() * lat.sin() * hour_angle.cos()) / cos_alt;
    let mut azimuth = cos_az.clamp(-1.0, 1.0).acos().to_degrees();
    if decl.cos() * hour_angle.sin() / cos_alt < 0.0 {
        azimuth = 360.0 - azimuth;
    }
    if azimuth >= 360.0 {
        azimuth -= 360.0;
    }

    SolarPosition {
        altitude_deg: altitude.to_degrees(),
        azimuth_deg: azimuth,
    }
}

/// Compass bearing of the panel normal. Panel azimuth is given from south
/// (-90 east, 90 west), the sun's from north.
#[inline]
pub fn panel_bearing(panel_azimuth: f64) -> f64 {
    panel_azimuth + 180.0
}

/// Signed angle from the panel bearing to the sun, in (-180, 180].
pub fn azimuth_difference(sun_azimuth: f64, panel_bearing: f64) -> f64 {
    let d = (sun_azimuth - panel_bearing).rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Share of direct radiation accepted by the panel. The ramp exists on one
/// side only.
pub fn direct_factor(d: f64) -> f64 {
    if d >= -55.0 {
        1.0
    } else if d >= -100.0 {
        ((d + 100.0) / 45.0).max(0.15)
    } else {
        0.1
    }
}

pub fn altitude_factor(altitude_deg: f64) -> f64 {
    if altitude_deg <= NIGHT_ALTITUDE {
        0.0
    } else if altitude_deg < FULL_ALTITUDE {
        0.15 + 0.85 * (altitude_deg - NIGHT_ALTITUDE) / (FULL_ALTITUDE - NIGHT_ALTITUDE)
    } else {
        1.0
    }
}

/// Multiplier in [0, 1] turning raw capacity output into the output expected
/// for this panel orientation.
pub fn correction_factor(sun: &SolarPosition, panel: &PanelConfig, capacity_percent: f64) -> f64 {
    if capacity_percent <= 0.0 || sun.altitude_deg <= NIGHT_ALTITUDE {
        return 0.0;
    }

    let d = azimuth_difference(sun.azimuth_deg, panel_bearing(panel.azimuth));
    let alt = altitude_factor(sun.altitude_deg);
    let direct = direct_factor(d) * alt;
    let diffuse = DIFFUSE_SHARE * alt;

    (direct + diffuse).clamp(0.0, 1.0)
}
