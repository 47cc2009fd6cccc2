//! Integration tests for the correlation engine.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use stormcheck_common::geo::BoundingBox;
use stormcheck_common::{
    Alert, AlertStatus, LatLon, MatchMethod, ReportCategory, Severity, StormReport, WarningParams,
};
use stormcheck_store::Store;
use stormcheck_verify::{Engine, StaticAreaIndex};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn test_store() -> Option<Store> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = Store::connect(&url).await.ok()?;
    Some(store)
}

static SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique suffix per call so tests never collide on shared tables.
fn unique(prefix: &str) -> String {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}-{nanos}-{n}")
}

fn engine_with(store: &Store, pairs: &[(&str, &str, &str)]) -> Engine {
    Engine::new(
        store.clone(),
        Arc::new(StaticAreaIndex::from_pairs(pairs)),
        25.0,
        72,
    )
}

fn moore_ring() -> Vec<LatLon> {
    vec![
        LatLon { lat: 35.10, lon: -97.60 },
        LatLon { lat: 35.10, lon: -97.30 },
        LatLon { lat: 35.35, lon: -97.30 },
        LatLon { lat: 35.35, lon: -97.60 },
    ]
}

fn sample_alert(id: &str, event: &str, effective: DateTime<Utc>) -> Alert {
    let ring = moore_ring();
    Alert {
        id: id.into(),
        event: event.into(),
        severity: Severity::Severe,
        headline: None,
        description: "At 902 PM, a dangerous storm was located near Norman.".into(),
        area_desc: "Cleveland, OK".into(),
        sent: effective,
        effective,
        expires: effective + Duration::hours(1),
        bbox: BoundingBox::of_ring(&ring),
        polygon: Some(ring),
        area_codes: vec![],
        params: WarningParams::default(),
        status: AlertStatus::Unverified,
        match_confidence: None,
        match_method: None,
        matched_report_ids: vec![],
        verified_at: None,
        summary: None,
        fingerprint: "fp-v1".into(),
        first_seen_at: effective,
        last_seen_at: effective,
    }
}

fn sample_report(id: &str, date: NaiveDate, category: ReportCategory) -> StormReport {
    StormReport {
        id: id.into(),
        report_date: date,
        category,
        time: "2102".into(),
        magnitude: "61".into(),
        magnitude_value: Some(61.0),
        location: "1 E NORMAN".into(),
        county: "CLEVELAND".into(),
        state: "OK".into(),
        lat: Some(35.22),
        lon: Some(-97.44),
        comments: "Trees down. (OUN)".into(),
        raw_row: format!("row-{id}"),
        ingested_at: Utc::now(),
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exact_match_verifies_with_high_confidence() {
    let Some(store) = test_store().await else {
        return;
    };
    let county = unique("X-COUNTY");
    let code = unique("A");
    let engine = engine_with(&store, &[(&county, "OK", &code)]);

    let effective = "2025-06-01T20:00:00Z".parse().unwrap();
    let mut report = sample_report(&unique("rpt"), day(2025, 6, 1), ReportCategory::Tornado);
    report.county = county.clone();
    store.insert_reports(&[report.clone()]).await.unwrap();

    let mut alert = sample_alert(&unique("alert"), "Tornado Warning", effective);
    alert.area_codes = vec![code];
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert!(correlation.verified());
    assert_eq!(correlation.confidence, Some(0.9));
    assert_eq!(correlation.method, Some(MatchMethod::Exact));
    assert_eq!(correlation.matched_report_ids, vec![report.id.clone()]);

    let stored = store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::Verified);
    assert_eq!(stored.match_confidence, Some(0.9));
    assert_eq!(stored.match_method, Some(MatchMethod::Exact));
    assert_eq!(stored.matched_report_ids, vec![report.id]);
    assert!(stored.verified_at.is_some());
}

#[tokio::test]
async fn proximate_match_verifies_with_lower_confidence() {
    let Some(store) = test_store().await else {
        return;
    };
    // Empty index: no county resolves, only the distance test can match.
    let engine = engine_with(&store, &[]);

    let effective = "2025-06-05T20:00:00Z".parse().unwrap();
    let county = unique("P-COUNTY");

    let mut inside = sample_report(&unique("rpt"), day(2025, 6, 5), ReportCategory::Wind);
    inside.county = county.clone();
    let mut far_away = sample_report(&unique("rpt"), day(2025, 6, 5), ReportCategory::Wind);
    far_away.county = county.clone();
    far_away.lat = Some(38.0);
    store
        .insert_reports(&[inside.clone(), far_away.clone()])
        .await
        .unwrap();

    let alert = sample_alert(
        &unique("alert"),
        "Severe Thunderstorm Warning",
        effective,
    );
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert!(correlation.verified());
    assert_eq!(correlation.confidence, Some(0.7));
    assert_eq!(correlation.method, Some(MatchMethod::Proximate));
    assert_eq!(correlation.matched_report_ids, vec![inside.id]);
}

#[tokio::test]
async fn exact_tier_sets_confidence_over_proximate() {
    let Some(store) = test_store().await else {
        return;
    };
    let exact_county = unique("E-COUNTY");
    let code = unique("A");
    let engine = engine_with(&store, &[(&exact_county, "OK", &code)]);

    let effective = "2025-06-10T20:00:00Z".parse().unwrap();

    // Proximate-only candidate: unresolvable county, coordinates in the
    // polygon. Sorted first by report time.
    let near_county = unique("N-COUNTY");
    let mut proximate = sample_report(&unique("rpt"), day(2025, 6, 10), ReportCategory::Wind);
    proximate.county = near_county;
    proximate.time = "2010".into();

    // Exact candidate: sentinel coordinates, resolvable county.
    let mut exact = sample_report(&unique("rpt"), day(2025, 6, 10), ReportCategory::Hail);
    exact.county = exact_county.clone();
    exact.lat = None;
    exact.lon = None;
    exact.time = "2030".into();

    store
        .insert_reports(&[proximate.clone(), exact.clone()])
        .await
        .unwrap();

    let mut alert = sample_alert(
        &unique("alert"),
        "Severe Thunderstorm Warning",
        effective,
    );
    alert.area_codes = vec![code];
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert!(correlation.verified());
    assert_eq!(correlation.confidence, Some(0.9));
    assert_eq!(correlation.method, Some(MatchMethod::Exact));
    assert_eq!(correlation.matched_report_ids.len(), 2);
    assert!(correlation.matched_report_ids.contains(&proximate.id));
    assert!(correlation.matched_report_ids.contains(&exact.id));
}

#[tokio::test]
async fn no_candidates_marks_verification_failed() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = engine_with(&store, &[]);

    let effective = "2025-06-14T20:00:00Z".parse().unwrap();
    let mut alert = sample_alert(&unique("alert"), "Tornado Warning", effective);
    alert.polygon = None;
    alert.bbox = None;
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert!(!correlation.verified());
    assert_eq!(correlation.status, AlertStatus::VerificationFailed);
    assert_eq!(correlation.confidence, None);
    assert_eq!(correlation.method, None);
    assert!(correlation.matched_report_ids.is_empty());

    let stored = store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::VerificationFailed);
    assert_eq!(stored.match_confidence, None);
    assert!(stored.matched_report_ids.is_empty());
    assert!(stored.verified_at.is_none());
}

#[tokio::test]
async fn unmapped_event_fails_without_matching() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = engine_with(&store, &[]);

    let effective = "2025-06-18T20:00:00Z".parse().unwrap();
    let alert = sample_alert(&unique("alert"), "Flood Warning", effective);
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert_eq!(correlation.status, AlertStatus::VerificationFailed);
    assert!(correlation.matched_report_ids.is_empty());
}

#[tokio::test]
async fn recompute_is_deterministic_and_never_accumulates() {
    let Some(store) = test_store().await else {
        return;
    };
    let county = unique("D-COUNTY");
    let code = unique("A");
    let engine = engine_with(&store, &[(&county, "OK", &code)]);

    let effective = "2025-06-22T20:00:00Z".parse().unwrap();
    let mut report = sample_report(&unique("rpt"), day(2025, 6, 22), ReportCategory::Tornado);
    report.county = county.clone();
    store.insert_reports(&[report.clone()]).await.unwrap();

    let mut alert = sample_alert(&unique("alert"), "Tornado Warning", effective);
    alert.area_codes = vec![code];
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let first = engine.correlate(&alert).await.unwrap();
    let second = engine.correlate(&alert).await.unwrap();
    assert_eq!(first, second);

    engine.correlate_and_apply(&alert).await.unwrap();
    engine.correlate_and_apply(&alert).await.unwrap();

    let stored = store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.matched_report_ids, vec![report.id]);
}

#[tokio::test]
async fn window_follows_report_dates_across_midnight() {
    let Some(store) = test_store().await else {
        return;
    };
    let county = unique("W-COUNTY");
    let code = unique("A");
    let engine = engine_with(&store, &[(&county, "OK", &code)]);

    // Effective 23:30, so the window touches both the 15th and the 16th.
    let effective = "2025-06-15T23:30:00Z".parse().unwrap();

    let mut next_day = sample_report(&unique("rpt"), day(2025, 6, 16), ReportCategory::Wind);
    next_day.county = county.clone();
    let mut two_days_out = sample_report(&unique("rpt"), day(2025, 6, 17), ReportCategory::Wind);
    two_days_out.county = county.clone();
    store
        .insert_reports(&[next_day.clone(), two_days_out.clone()])
        .await
        .unwrap();

    let mut alert = sample_alert(
        &unique("alert"),
        "Severe Thunderstorm Warning",
        effective,
    );
    alert.area_codes = vec![code];
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let correlation = engine.correlate_and_apply(&alert).await.unwrap();
    assert!(correlation.verified());
    assert_eq!(correlation.matched_report_ids, vec![next_day.id]);
}

#[tokio::test]
async fn pending_selection_honors_failed_horizon() {
    let Some(store) = test_store().await else {
        return;
    };
    let engine = engine_with(&store, &[]);

    let now = Utc::now();
    let mut stale_failed = sample_alert(&unique("alert"), "Tornado Warning", now - Duration::hours(100));
    stale_failed.polygon = None;
    stale_failed.bbox = None;
    let mut recent_failed = sample_alert(&unique("alert"), "Tornado Warning", now - Duration::hours(2));
    recent_failed.polygon = None;
    recent_failed.bbox = None;
    store
        .commit_alerts(&[stale_failed.clone(), recent_failed.clone()])
        .await
        .unwrap();

    engine.correlate_and_apply(&stale_failed).await.unwrap();
    engine.correlate_and_apply(&recent_failed).await.unwrap();

    let pending = store
        .alerts_pending_verification(now - Duration::hours(72), 100_000)
        .await
        .unwrap();
    let ids: Vec<&str> = pending.iter().map(|a| a.id.as_str()).collect();
    assert!(ids.contains(&recent_failed.id.as_str()));
    assert!(!ids.contains(&stale_failed.id.as_str()));
}

#[tokio::test]
async fn correlate_pending_verifies_and_reports_transitions() {
    let Some(store) = test_store().await else {
        return;
    };
    let county = unique("B-COUNTY");
    let code = unique("A");
    let engine = engine_with(&store, &[(&county, "OK", &code)]);

    let effective = "2025-06-26T20:00:00Z".parse().unwrap();
    let mut report = sample_report(&unique("rpt"), day(2025, 6, 26), ReportCategory::Tornado);
    report.county = county.clone();
    store.insert_reports(&[report.clone()]).await.unwrap();

    let mut alert = sample_alert(&unique("alert"), "Tornado Warning", effective);
    alert.area_codes = vec![code];
    store.commit_alerts(&[alert.clone()]).await.unwrap();

    let outcome = engine.correlate_pending(100_000).await.unwrap();
    assert!(outcome.stats.examined >= 1);
    assert!(outcome.newly_verified.iter().any(|a| a.id == alert.id));

    let stored = store.get_alert(&alert.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::Verified);

    // A second pass leaves it verified and does not re-report the
    // transition.
    let outcome = engine.correlate_pending(100_000).await.unwrap();
    assert!(!outcome.newly_verified.iter().any(|a| a.id == alert.id));
}
