//! Client and parser for the date-addressed ground report feed.
//!
//! Each meteorological day is a single delimited file with three sections,
//! one per report category, each opened by its own header line. The last
//! field is free text and may contain the delimiter, so rows split on at
//! most seven commas and the remainder stays intact. Unknown-value
//! sentinels are preserved verbatim in the stored row; numeric views exist
//! only for matching and notification thresholds.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use stormcheck_common::{ReportCategory, StormReport};

pub struct ReportFeedClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReportFeedClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("stormcheck/0.1 (alert cross-verification service)")
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the raw report file for one meteorological day. A day the
    /// upstream has not published yet reads as empty rather than failing
    /// the poll.
    pub async fn fetch_day(&self, date: NaiveDate) -> Result<String> {
        let url = format!("{}/{}_rpts.csv", self.base_url, date.format("%y%m%d"));
        debug!(%date, url = %url, "Fetching report day");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Report feed request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!(%date, "Report day not published yet, treating as empty");
            return Ok(String::new());
        }
        if !response.status().is_success() {
            anyhow::bail!("Report feed returned {}", response.status());
        }

        response
            .text()
            .await
            .context("Failed to read report feed body")
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub struct ParsedDay {
    pub reports: Vec<StormReport>,
    pub malformed: u32,
}

/// Parse one day's report file into domain reports.
///
/// A malformed row is logged and counted, never fatal: one bad line must not
/// block the rest of the day. A correction republished with real values in
/// place of sentinels hashes to a new id, so it lands as a new row beside
/// the original.
pub fn parse_daily_reports(date: NaiveDate, body: &str) -> ParsedDay {
    let mut reports = Vec::new();
    let mut malformed = 0;
    let mut section: Option<ReportCategory> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(category) = section_header(line) {
            section = Some(category);
            continue;
        }
        let Some(category) = section else {
            warn!(%date, row = line, "Report row before any section header, skipping");
            malformed += 1;
            continue;
        };
        match parse_row(date, category, line) {
            Some(report) => reports.push(report),
            None => {
                warn!(%date, category = %category, row = line, "Skipping malformed report row");
                malformed += 1;
            }
        }
    }

    ParsedDay { reports, malformed }
}

fn section_header(line: &str) -> Option<ReportCategory> {
    if line.starts_with("Time,F_Scale,") {
        Some(ReportCategory::Tornado)
    } else if line.starts_with("Time,Speed,") {
        Some(ReportCategory::Wind)
    } else if line.starts_with("Time,Size,") {
        Some(ReportCategory::Hail)
    } else {
        None
    }
}

fn parse_row(date: NaiveDate, category: ReportCategory, raw: &str) -> Option<StormReport> {
    let fields: Vec<&str> = raw.splitn(8, ',').collect();
    if fields.len() != 8 {
        return None;
    }

    Some(StormReport {
        id: report_id(date, category, raw),
        report_date: date,
        category,
        time: fields[0].to_string(),
        magnitude: fields[1].to_string(),
        magnitude_value: parse_magnitude(category, fields[1]),
        location: fields[2].to_string(),
        county: fields[3].to_string(),
        state: fields[4].to_string(),
        lat: parse_coordinate(fields[5]),
        lon: parse_coordinate(fields[6]),
        comments: fields[7].to_string(),
        raw_row: raw.to_string(),
        ingested_at: Utc::now(),
    })
}

/// Content hash identifying one published row. Any byte difference in the
/// raw row, sentinel filled in or comment reworded, yields a distinct id.
pub fn report_id(date: NaiveDate, category: ReportCategory, raw_row: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", date, category.as_str(), raw_row));
    hex::encode(hasher.finalize())
}

/// Numeric view of the magnitude field. Units differ by category: tornado
/// rows carry a damage-scale rating, wind rows mph, hail rows hundredths of
/// an inch (stored here as inches). Sentinels and blanks yield `None`.
fn parse_magnitude(category: ReportCategory, field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("UNK") {
        return None;
    }
    match category {
        ReportCategory::Tornado => trimmed
            .trim_start_matches("EF")
            .trim_start_matches('F')
            .parse()
            .ok(),
        ReportCategory::Wind => trimmed.parse().ok(),
        ReportCategory::Hail => trimmed.parse::<f64>().ok().map(|hundredths| hundredths / 100.0),
    }
}

/// Coordinates use a numeric sentinel for "unknown"; those and unparsable
/// values read as absent.
fn parse_coordinate(field: &str) -> Option<f64> {
    let value: f64 = field.trim().parse().ok()?;
    if value == -999.0 || value == -9999.0 {
        return None;
    }
    Some(value)
}
