//! Client and mapper for the paginated active-alert feed.
//!
//! The feed is tolerant-read: every property the upstream may omit is
//! optional on the wire structs, and mapping decides per record whether
//! enough survives to keep it. Delivery is at-least-once and pages are
//! unordered, so callers must treat repeated ids as normal.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use stormcheck_common::geo::BoundingBox;
use stormcheck_common::{Alert, AlertStatus, LatLon, Severity};

use crate::params;

/// Hard cap on pages followed in one poll, against a runaway cursor chain.
const MAX_PAGES_PER_POLL: usize = 10;
const PAGE_LIMIT: u32 = 500;

pub struct AlertFeedClient {
    http: reqwest::Client,
    base_url: String,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AlertDocument {
    #[serde(default)]
    pub features: Vec<AlertFeature>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertFeature {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    pub properties: AlertProperties,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Rings of `[lon, lat]` positions, outer ring first.
    #[serde(default)]
    pub coordinates: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProperties {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub area_desc: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effective: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub geocode: Geocode,
}

#[derive(Debug, Default, Deserialize)]
pub struct Geocode {
    #[serde(rename = "SAME", default)]
    pub same: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl AlertFeedClient {
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

    /// Fetch every currently active alert, following the pagination cursor
    /// until the feed stops handing one back or the page cap is reached.
    pub async fn fetch_active(&self) -> Result<Vec<AlertFeature>> {
        let mut url = format!("{}/alerts/active?limit={}", self.base_url, PAGE_LIMIT);
        let mut features = Vec::new();

        for page in 0.. {
            if page >= MAX_PAGES_PER_POLL {
                warn!(
                    pages = MAX_PAGES_PER_POLL,
                    "Alert feed still paginating at page cap, stopping early"
                );
                break;
            }

            debug!(page, url = %url, "Fetching alert feed page");
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .context("Alert feed request failed")?;
            if !response.status().is_success() {
                anyhow::bail!("Alert feed returned {}", response.status());
            }
            let document: AlertDocument = response
                .json()
                .await
                .context("Failed to parse alert feed page")?;
            features.extend(document.features);

            match document.pagination.and_then(|p| p.next) {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(features)
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Map one feed feature into a domain alert.
///
/// Records missing an id or the sent/expires timestamps are unusable and
/// come back as errors; the caller logs and skips them without failing the
/// surrounding poll. An effective time after expires is kept as received.
pub fn map_feature(feature: AlertFeature) -> Result<Alert> {
    let AlertFeature {
        id,
        geometry,
        properties,
    } = feature;

    if id.is_empty() {
        anyhow::bail!("feature missing id");
    }
    let sent = properties
        .sent
        .ok_or_else(|| anyhow!("feature {id} missing sent"))?;
    let expires = properties
        .expires
        .ok_or_else(|| anyhow!("feature {id} missing expires"))?;
    let effective = properties.effective.unwrap_or(sent);

    if effective > expires {
        warn!(alert_id = %id, %effective, %expires, "Alert effective after expires, keeping as received");
    }

    let polygon = geometry.and_then(polygon_ring);
    let bbox = polygon.as_deref().and_then(BoundingBox::of_ring);
    let severity = Severity::parse(properties.severity.as_deref().unwrap_or(""));
    let params = params::extract(&properties.description, &properties.event);
    let area_codes = properties.geocode.same;

    let fingerprint = feature_fingerprint(
        &properties.event,
        severity,
        properties.headline.as_deref(),
        &properties.description,
        &properties.area_desc,
        sent,
        effective,
        expires,
        polygon.as_deref(),
        &area_codes,
    );

    let now = Utc::now();
    Ok(Alert {
        id,
        event: properties.event,
        severity,
        headline: properties.headline,
        description: properties.description,
        area_desc: properties.area_desc,
        sent,
        effective,
        expires,
        polygon,
        bbox,
        area_codes,
        params,
        status: AlertStatus::Unverified,
        match_confidence: None,
        match_method: None,
        matched_report_ids: Vec::new(),
        verified_at: None,
        summary: None,
        fingerprint,
        first_seen_at: now,
        last_seen_at: now,
    })
}

/// Outer ring of a polygon geometry, flipped from the feed's `[lon, lat]`
/// order. Degenerate rings with fewer than three usable positions are
/// treated as no geometry at all.
fn polygon_ring(geometry: Geometry) -> Option<Vec<LatLon>> {
    if !geometry.kind.eq_ignore_ascii_case("polygon") {
        return None;
    }
    let ring = geometry.coordinates.into_iter().next()?;
    let points: Vec<LatLon> = ring
        .into_iter()
        .filter_map(|position| match (position.first(), position.get(1)) {
            (Some(&lon), Some(&lat)) => Some(LatLon { lat, lon }),
            _ => None,
        })
        .collect();
    if points.len() < 3 {
        None
    } else {
        Some(points)
    }
}

/// Content hash over the feed-supplied fields that can change across
/// re-deliveries of the same alert id. Derived fields stay out of the hash.
#[allow(clippy::too_many_arguments)]
fn feature_fingerprint(
    event: &str,
    severity: Severity,
    headline: Option<&str>,
    description: &str,
    area_desc: &str,
    sent: DateTime<Utc>,
    effective: DateTime<Utc>,
    expires: DateTime<Utc>,
    polygon: Option<&[LatLon]>,
    area_codes: &[String],
) -> String {
    let mut hasher = Sha256::new();
    let mut part = |bytes: &[u8]| {
        hasher.update(bytes);
        hasher.update([0u8]);
    };

    part(event.as_bytes());
    part(severity.as_str().as_bytes());
    part(headline.unwrap_or("").as_bytes());
    part(description.as_bytes());
    part(area_desc.as_bytes());
    part(sent.to_rfc3339().as_bytes());
    part(effective.to_rfc3339().as_bytes());
    part(expires.to_rfc3339().as_bytes());
    for point in polygon.unwrap_or(&[]) {
        part(format!("{},{}", point.lat, point.lon).as_bytes());
    }
    part(area_codes.join(",").as_bytes());

    hex::encode(hasher.finalize())
}
