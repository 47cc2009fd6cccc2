//! The correlation engine.
//!
//! Matches alerts against ground reports over a bounded temporal window and
//! writes verification results back to the store. Correlation is a full
//! recompute every time: re-running it on an already-verified alert
//! overwrites rather than accumulates, so the result only depends on the
//! alert and the reports visible at that moment.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use stormcheck_common::geo;
use stormcheck_common::{Alert, AlertStatus, MatchMethod, StormReport};
use stormcheck_store::Store;

use crate::area::AreaIndex;
use crate::category;

pub const EXACT_CONFIDENCE: f64 = 0.9;
pub const PROXIMATE_CONFIDENCE: f64 = 0.7;

/// Half-width of the temporal window around an alert's effective time.
const TEMPORAL_WINDOW_HOURS: i64 = 2;

pub struct Engine {
    store: Store,
    area_index: Arc<dyn AreaIndex>,
    proximity_radius_miles: f64,
    recheck_horizon_hours: i64,
}

/// Outcome of correlating one alert, ready to write back.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub status: AlertStatus,
    pub confidence: Option<f64>,
    pub method: Option<MatchMethod>,
    pub matched_report_ids: Vec<String>,
}

impl Correlation {
    pub fn verified(&self) -> bool {
        self.status == AlertStatus::Verified
    }

    fn failed() -> Self {
        Self {
            status: AlertStatus::VerificationFailed,
            confidence: None,
            method: None,
            matched_report_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VerifyStats {
    pub examined: u32,
    pub verified: u32,
    pub failed: u32,
    pub errors: u32,
}

impl fmt::Display for VerifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined={} verified={} failed={} errors={}",
            self.examined, self.verified, self.failed, self.errors
        )
    }
}

/// A verification pass's stats plus the alerts that just transitioned to
/// verified, for notification rule evaluation.
pub struct VerifyOutcome {
    pub stats: VerifyStats,
    pub newly_verified: Vec<Alert>,
}

impl Engine {
    pub fn new(
        store: Store,
        area_index: Arc<dyn AreaIndex>,
        proximity_radius_miles: f64,
        recheck_horizon_hours: i64,
    ) -> Self {
        Self {
            store,
            area_index,
            proximity_radius_miles,
            recheck_horizon_hours,
        }
    }

    /// Correlate one alert against the stored ground reports.
    ///
    /// Every matching report is collected, but the confidence comes from the
    /// best tier found: an exact administrative match outranks a proximity
    /// match no matter the evaluation order.
    pub async fn correlate(&self, alert: &Alert) -> Result<Correlation> {
        let categories = category::expected_categories(&alert.event);
        if categories.is_empty() {
            debug!(alert_id = %alert.id, event = %alert.event, "Event has no report category mapping");
            return Ok(Correlation::failed());
        }

        let dates = covered_dates(alert.effective);
        let candidates = self.store.candidate_reports(&dates, categories).await?;

        let mut matched_report_ids = Vec::new();
        let mut best: Option<MatchMethod> = None;
        for report in &candidates {
            let Some(method) = self.match_report(alert, report) else {
                continue;
            };
            matched_report_ids.push(report.id.clone());
            best = Some(best_tier(best, method));
        }

        match best {
            Some(method) => Ok(Correlation {
                status: AlertStatus::Verified,
                confidence: Some(confidence_for(method)),
                method: Some(method),
                matched_report_ids,
            }),
            None => Ok(Correlation::failed()),
        }
    }

    /// Geographic tests in priority order, first hit wins for this report.
    /// A report with sentinel coordinates can still match exactly; a report
    /// in a county the index cannot resolve can still match by distance.
    fn match_report(&self, alert: &Alert, report: &StormReport) -> Option<MatchMethod> {
        if let Some(code) = self.area_index.area_code(&report.county, &report.state) {
            if alert.area_codes.iter().any(|c| c == &code) {
                return Some(MatchMethod::Exact);
            }
        }

        let lat = report.lat?;
        let lon = report.lon?;
        let ring = alert.polygon.as_deref()?;
        if let Some(bbox) = alert.bbox {
            if bbox.distance_miles(lat, lon) > self.proximity_radius_miles {
                return None;
            }
        }
        if geo::distance_to_ring_miles(lat, lon, ring) <= self.proximity_radius_miles {
            return Some(MatchMethod::Proximate);
        }
        None
    }

    /// Correlate one alert and write the result back atomically.
    pub async fn correlate_and_apply(&self, alert: &Alert) -> Result<Correlation> {
        let correlation = self.correlate(alert).await?;
        let verified_at = if correlation.verified() {
            Some(Utc::now())
        } else {
            None
        };
        self.store
            .apply_verification(
                &alert.id,
                correlation.status,
                correlation.confidence,
                correlation.method,
                &correlation.matched_report_ids,
                verified_at,
            )
            .await?;
        Ok(correlation)
    }

    /// One verification pass: examine pending alerts oldest first, each in
    /// its own failure domain. An error on one alert leaves it for the next
    /// pass and never aborts the batch.
    pub async fn correlate_pending(&self, limit: i64) -> Result<VerifyOutcome> {
        let failed_since = Utc::now() - Duration::hours(self.recheck_horizon_hours);
        let pending = self
            .store
            .alerts_pending_verification(failed_since, limit)
            .await?;

        let mut stats = VerifyStats::default();
        let mut newly_verified = Vec::new();

        for alert in pending {
            match self.correlate_and_apply(&alert).await {
                Ok(correlation) => {
                    stats.examined += 1;
                    if correlation.verified() {
                        stats.verified += 1;
                        if alert.status != AlertStatus::Verified {
                            let mut updated = alert;
                            updated.status = correlation.status;
                            updated.match_confidence = correlation.confidence;
                            updated.match_method = correlation.method;
                            updated.matched_report_ids = correlation.matched_report_ids;
                            newly_verified.push(updated);
                        }
                    } else {
                        stats.failed += 1;
                    }
                }
                Err(error) => {
                    warn!(alert_id = %alert.id, error = %error, "Correlation failed for alert, continuing");
                    stats.errors += 1;
                }
            }
        }

        info!(%stats, "Verification pass complete");
        Ok(VerifyOutcome {
            stats,
            newly_verified,
        })
    }
}

fn confidence_for(method: MatchMethod) -> f64 {
    match method {
        MatchMethod::Exact => EXACT_CONFIDENCE,
        MatchMethod::Proximate => PROXIMATE_CONFIDENCE,
    }
}

/// Exact outranks proximate regardless of evaluation order.
fn best_tier(best: Option<MatchMethod>, method: MatchMethod) -> MatchMethod {
    match (best, method) {
        (Some(MatchMethod::Exact), _) | (_, MatchMethod::Exact) => MatchMethod::Exact,
        _ => MatchMethod::Proximate,
    }
}

/// Calendar dates touched by the window around an alert's effective time.
///
/// Report dates are meteorological-day labels assigned upstream and carry
/// no timezone; they are compared as received, never shifted.
fn covered_dates(effective: DateTime<Utc>) -> Vec<NaiveDate> {
    let start = (effective - Duration::hours(TEMPORAL_WINDOW_HOURS)).date_naive();
    let end = (effective + Duration::hours(TEMPORAL_WINDOW_HOURS)).date_naive();

    let mut dates = vec![start];
    let mut day = start;
    while day < end {
        day = day.succ_opt().unwrap_or(end);
        dates.push(day);
    }
    dates
}
