use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, TimeDelta, TimeZone, Utc};
use tracing::{debug, warn};

use crate::errors::PointError;
use crate::models::forecast::{CorrectedEstimate, DailyTotal, Location, PanelConfig, RawUtilizationPoint};
use crate::services::solar_algorithm;

/// A raw point that could not be turned into an estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPoint {
    pub index: usize,
    pub valid_from: String,
    pub reason: PointError,
}

/// Result of one pipeline run: estimates in input order plus what was dropped.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CorrectionReport {
    pub estimates: Vec<CorrectedEstimate>,
    pub skipped: Vec<SkippedPoint>,
}

/// Corrects a single raw point for the panel orientation.
pub fn correct_point(
    point: &RawUtilizationPoint,
    location: &Location,
    panel: &PanelConfig,
) -> Result<CorrectedEstimate, PointError> {
    let timestamp = DateTime::parse_from_rfc3339(point.valid_from.trim())
        .map_err(|_| PointError::Timestamp(point.valid_from.clone()))?
        .with_timezone(&Utc);

    if !point.capacity_percent.is_finite() {
        return Err(PointError::Capacity(point.capacity_percent));
    }
    let capacity = point.capacity_percent.clamp(0.0, 100.0);

    let sun = solar_algorithm::sun_position(location, timestamp);
    if !sun.altitude_deg.is_finite() || !sun.azimuth_deg.is_finite() {
        return Err(PointError::Geometry(point.valid_from.clone()));
    }

    let factor = solar_algorithm::correction_factor(&sun, panel, capacity);
    let kwh = panel.peak_power_kw * (capacity / 100.0) * factor;
    if !kwh.is_finite() {
        return Err(PointError::Geometry(point.valid_from.clone()));
    }

    Ok(CorrectedEstimate {
        timestamp,
        watts: (kwh * 1000.0).round() as i64,
        kwh,
    })
}

/// Runs every raw point through the correction. A bad point is recorded in
/// the report and never stops the batch.
pub fn correct(raw: &[RawUtilizationPoint], location: &Location, panel: &PanelConfig) -> CorrectionReport {
    let mut report = CorrectionReport::default();
    for (index, point) in raw.iter().enumerate() {
        match correct_point(point, location, panel) {
            Ok(estimate) => report.estimates.push(estimate),
            Err(reason) => {
                warn!("[CORRECT] skipping point {} ({}): {}", index, point.valid_from, reason);
                report.skipped.push(SkippedPoint {
                    index,
                    valid_from: point.valid_from.clone(),
                    reason,
                });
            }
        }
    }
    debug!(
        "[CORRECT] {} estimates, {} skipped",
        report.estimates.len(),
        report.skipped.len()
    );
    report
}

/// Keeps only slots that have not ended yet, i.e. start at or after the
/// beginning of the current hour.
pub fn retain_upcoming(estimates: &mut Vec<CorrectedEstimate>, now: DateTime<Utc>) {
    let hour_start = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
    estimates.retain(|e| e.timestamp >= hour_start);
}

/// Sums estimates per local calendar date.
pub fn daily_totals<Tz: TimeZone>(estimates: &[CorrectedEstimate], tz: &Tz) -> Vec<DailyTotal> {
    let mut days = BTreeMap::new();
    for e in estimates {
        *days.entry(e.timestamp.with_timezone(tz).date_naive()).or_insert(0.0) += e.kwh;
    }
    days.into_iter().map(|(date, kwh)| DailyTotal { date, kwh }).collect()
}
