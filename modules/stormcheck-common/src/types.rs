use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

// --- Enums ---

/// Severity as reported by the alert feed. Unrecognized strings are kept as
/// `Unknown` rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Extreme,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Extreme => "extreme",
            Severity::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "minor" => Severity::Minor,
            "moderate" => Severity::Moderate,
            "severe" => Severity::Severe,
            "extreme" => Severity::Extreme,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verification lifecycle of an alert. Alerts are never deleted; `active`
/// is derived from `expires`, not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Unverified,
    Verified,
    VerificationFailed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Unverified => "unverified",
            AlertStatus::Verified => "verified",
            AlertStatus::VerificationFailed => "verification_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(AlertStatus::Unverified),
            "verified" => Some(AlertStatus::Verified),
            "verification_failed" => Some(AlertStatus::VerificationFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three report families the ground-truth feed publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    Tornado,
    Wind,
    Hail,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Tornado => "tornado",
            ReportCategory::Wind => "wind",
            ReportCategory::Hail => "hail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tornado" => Some(ReportCategory::Tornado),
            "wind" => Some(ReportCategory::Wind),
            "hail" => Some(ReportCategory::Hail),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a verified alert was matched to its reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Proximate,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Proximate => "proximate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchMethod::Exact),
            "proximate" => Some(MatchMethod::Proximate),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- Alerts ---

/// Quantitative threat parameters extracted from a warning narrative.
/// Either field is `None` when the narrative does not state the value with
/// an adjacent unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningParams {
    pub hail_size_in: Option<f64>,
    pub wind_speed_mph: Option<f64>,
}

impl WarningParams {
    pub fn is_empty(&self) -> bool {
        self.hail_size_in.is_none() && self.wind_speed_mph.is_none()
    }
}

/// One alert from the warning feed, keyed by its upstream id.
///
/// `fingerprint` is a hash over every feed-supplied mutable field; the store
/// compares it to decide between update and no-op on re-ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub event: String,
    pub severity: Severity,
    pub headline: Option<String>,
    pub description: String,
    pub area_desc: String,
    pub sent: DateTime<Utc>,
    pub effective: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    /// Outer ring of the alert polygon, when the feed supplies geometry.
    pub polygon: Option<Vec<LatLon>>,
    pub bbox: Option<BoundingBox>,
    /// Administrative area codes covered by the alert, as supplied upstream.
    pub area_codes: Vec<String>,
    pub params: WarningParams,
    pub status: AlertStatus,
    pub match_confidence: Option<f64>,
    pub match_method: Option<MatchMethod>,
    pub matched_report_ids: Vec<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub fingerprint: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Alert {
    /// An alert is active between its effective and expiry times. Derived,
    /// never stored.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.effective <= now && now < self.expires
    }
}

// --- Storm reports ---

/// One ground-truth storm report row.
///
/// `raw_row` is the delimited line exactly as received, sentinels included;
/// `id` is a content hash over date, category and that raw text. Parsed
/// fields are views for matching and display only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StormReport {
    pub id: String,
    /// Meteorological day the feed filed this report under. Stored exactly
    /// as addressed, never timezone-adjusted.
    pub report_date: NaiveDate,
    pub category: ReportCategory,
    /// Raw time column (HHMM), verbatim.
    pub time: String,
    /// Raw magnitude column, verbatim. May carry the upstream unknown
    /// sentinel.
    pub magnitude: String,
    /// Parsed magnitude in the category's native unit. `None` for sentinel
    /// or non-numeric text.
    pub magnitude_value: Option<f64>,
    pub location: String,
    pub county: String,
    pub state: String,
    /// Parsed coordinates. `None` when the row carries a sentinel.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub comments: String,
    pub raw_row: String,
    pub ingested_at: DateTime<Utc>,
}

// --- Operations ---

/// The three recurring operation kinds the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AlertPoll,
    ReportPoll,
    Verification,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AlertPoll => "alert_poll",
            OperationKind::ReportPoll => "report_poll",
            OperationKind::Verification => "verification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "alert_poll" => Some(OperationKind::AlertPoll),
            "report_poll" => Some(OperationKind::ReportPoll),
            "verification" => Some(OperationKind::Verification),
            _ => None,
        }
    }

    pub const ALL: [OperationKind; 3] = [
        OperationKind::AlertPoll,
        OperationKind::ReportPoll,
        OperationKind::Verification,
    ];
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What fired an operation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduler,
    Manual,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Scheduler => "scheduler",
            TriggerSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduler" => Some(TriggerSource::Scheduler),
            "manual" => Some(TriggerSource::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit row for one operation run. `finished_at`, `success` and the counts
/// stay empty while the run is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub kind: OperationKind,
    pub trigger: TriggerSource,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub records_processed: Option<i32>,
    pub records_new: Option<i32>,
    pub error: Option<String>,
}
