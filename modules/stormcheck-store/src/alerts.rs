//! Alert persistence: fingerprint-gated upserts, verification write-back and
//! read queries.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Postgres;
use tracing::warn;

use stormcheck_common::geo::BoundingBox;
use stormcheck_common::{Alert, AlertStatus, MatchMethod, Severity, WarningParams};

use crate::Store;

/// Outcome of committing one alert against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCommit {
    New,
    Updated,
    Unchanged,
}

/// Filters for the alert list query.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub event: Option<String>,
    pub active_only: bool,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AlertRow {
    id: String,
    event: String,
    severity: String,
    headline: Option<String>,
    description: String,
    area_desc: String,
    sent: DateTime<Utc>,
    effective: DateTime<Utc>,
    expires: DateTime<Utc>,
    polygon: Option<serde_json::Value>,
    bbox_min_lat: Option<f64>,
    bbox_min_lon: Option<f64>,
    bbox_max_lat: Option<f64>,
    bbox_max_lon: Option<f64>,
    area_codes: Vec<String>,
    hail_size_in: Option<f64>,
    wind_speed_mph: Option<f64>,
    status: String,
    match_confidence: Option<f64>,
    match_method: Option<String>,
    matched_report_ids: Vec<String>,
    verified_at: Option<DateTime<Utc>>,
    summary: Option<String>,
    fingerprint: String,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl AlertRow {
    fn into_alert(self) -> Result<Alert> {
        let status = AlertStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("unknown alert status in store: {}", self.status))?;
        let polygon = match self.polygon {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        let bbox = match (
            self.bbox_min_lat,
            self.bbox_min_lon,
            self.bbox_max_lat,
            self.bbox_max_lon,
        ) {
            (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => Some(BoundingBox {
                min_lat,
                min_lon,
                max_lat,
                max_lon,
            }),
            _ => None,
        };
        Ok(Alert {
            id: self.id,
            event: self.event,
            severity: Severity::parse(&self.severity),
            headline: self.headline,
            description: self.description,
            area_desc: self.area_desc,
            sent: self.sent,
            effective: self.effective,
            expires: self.expires,
            polygon,
            bbox,
            area_codes: self.area_codes,
            params: WarningParams {
                hail_size_in: self.hail_size_in,
                wind_speed_mph: self.wind_speed_mph,
            },
            status,
            match_confidence: self.match_confidence,
            match_method: self.match_method.as_deref().and_then(MatchMethod::parse),
            matched_report_ids: self.matched_report_ids,
            verified_at: self.verified_at,
            summary: self.summary,
            fingerprint: self.fingerprint,
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
        })
    }
}

impl Store {
    /// Commit a batch of mapped alerts in one transaction. Returns one
    /// outcome per input alert, in input order.
    ///
    /// Identity is the upstream id; the fingerprint decides between a field
    /// update and a no-op. Verification state and first_seen_at survive
    /// updates untouched.
    pub async fn commit_alerts(&self, alerts: &[Alert]) -> Result<Vec<AlertCommit>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(alerts.len());
        let now = Utc::now();

        for alert in alerts {
            let existing = sqlx::query_as::<Postgres, (String,)>(
                "SELECT fingerprint FROM alerts WHERE id = $1 FOR UPDATE",
            )
            .bind(&alert.id)
            .fetch_optional(&mut *tx)
            .await?;

            let outcome = match existing {
                None => {
                    insert_alert(&mut tx, alert, now).await?;
                    AlertCommit::New
                }
                Some((fingerprint,)) if fingerprint == alert.fingerprint => {
                    sqlx::query("UPDATE alerts SET last_seen_at = $2 WHERE id = $1")
                        .bind(&alert.id)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?;
                    AlertCommit::Unchanged
                }
                Some(_) => {
                    update_alert(&mut tx, alert, now).await?;
                    AlertCommit::Updated
                }
            };
            outcomes.push(outcome);
        }

        tx.commit().await?;
        Ok(outcomes)
    }

    /// Write back the result of a verification pass for one alert. The pass
    /// recomputes from scratch, so this overwrites rather than accumulates.
    pub async fn apply_verification(
        &self,
        alert_id: &str,
        status: AlertStatus,
        confidence: Option<f64>,
        method: Option<MatchMethod>,
        matched_report_ids: &[String],
        verified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = $2,
                match_confidence = $3,
                match_method = $4,
                matched_report_ids = $5,
                verified_at = $6
            WHERE id = $1
            "#,
        )
        .bind(alert_id)
        .bind(status.as_str())
        .bind(confidence)
        .bind(method.map(|m| m.as_str()))
        .bind(matched_report_ids)
        .bind(verified_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(alert_id = %alert_id, "Verification write-back matched no alert");
        }
        Ok(())
    }

    /// Store a generated summary on an alert.
    pub async fn set_alert_summary(&self, alert_id: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE alerts SET summary = $2 WHERE id = $1")
            .bind(alert_id)
            .bind(summary)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_alert(&self, id: &str) -> Result<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AlertRow::into_alert).transpose()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM alerts WHERE 1=1 ");

        if let Some(status) = filter.status {
            qb.push("AND status = ");
            qb.push_bind(status.as_str());
            qb.push(" ");
        }
        if let Some(event) = &filter.event {
            qb.push("AND event ILIKE ");
            qb.push_bind(format!("%{event}%"));
            qb.push(" ");
        }
        if filter.active_only {
            qb.push("AND effective <= now() AND expires > now() ");
        }

        qb.push("ORDER BY sent DESC LIMIT ");
        qb.push_bind(filter.limit);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset);

        let rows = qb
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Alerts a verification pass should examine: everything still
    /// unverified, plus failed alerts recent enough that late reports may
    /// still corroborate them. Oldest first.
    pub async fn alerts_pending_verification(
        &self,
        failed_since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT * FROM alerts
            WHERE status = 'unverified'
               OR (status = 'verification_failed' AND sent >= $1)
            ORDER BY sent ASC
            LIMIT $2
            "#,
        )
        .bind(failed_since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Verified alerts that still lack a summary, oldest verification first.
    pub async fn alerts_missing_summary(&self, limit: i64) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r#"
            SELECT * FROM alerts
            WHERE status = 'verified' AND summary IS NULL
            ORDER BY verified_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }
}

async fn insert_alert(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    alert: &Alert,
    now: DateTime<Utc>,
) -> Result<()> {
    let polygon = alert.polygon.as_ref().map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        INSERT INTO alerts
            (id, event, severity, headline, description, area_desc,
             sent, effective, expires, polygon,
             bbox_min_lat, bbox_min_lon, bbox_max_lat, bbox_max_lon,
             area_codes, hail_size_in, wind_speed_mph,
             status, fingerprint, first_seen_at, last_seen_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
        "#,
    )
    .bind(&alert.id)
    .bind(&alert.event)
    .bind(alert.severity.as_str())
    .bind(&alert.headline)
    .bind(&alert.description)
    .bind(&alert.area_desc)
    .bind(alert.sent)
    .bind(alert.effective)
    .bind(alert.expires)
    .bind(polygon)
    .bind(alert.bbox.map(|b| b.min_lat))
    .bind(alert.bbox.map(|b| b.min_lon))
    .bind(alert.bbox.map(|b| b.max_lat))
    .bind(alert.bbox.map(|b| b.max_lon))
    .bind(&alert.area_codes)
    .bind(alert.params.hail_size_in)
    .bind(alert.params.wind_speed_mph)
    .bind(AlertStatus::Unverified.as_str())
    .bind(&alert.fingerprint)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_alert(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    alert: &Alert,
    now: DateTime<Utc>,
) -> Result<()> {
    let polygon = alert.polygon.as_ref().map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        UPDATE alerts
        SET event = $2,
            severity = $3,
            headline = $4,
            description = $5,
            area_desc = $6,
            sent = $7,
            effective = $8,
            expires = $9,
            polygon = $10,
            bbox_min_lat = $11,
            bbox_min_lon = $12,
            bbox_max_lat = $13,
            bbox_max_lon = $14,
            area_codes = $15,
            hail_size_in = $16,
            wind_speed_mph = $17,
            fingerprint = $18,
            last_seen_at = $19
        WHERE id = $1
        "#,
    )
    .bind(&alert.id)
    .bind(&alert.event)
    .bind(alert.severity.as_str())
    .bind(&alert.headline)
    .bind(&alert.description)
    .bind(&alert.area_desc)
    .bind(alert.sent)
    .bind(alert.effective)
    .bind(alert.expires)
    .bind(polygon)
    .bind(alert.bbox.map(|b| b.min_lat))
    .bind(alert.bbox.map(|b| b.min_lon))
    .bind(alert.bbox.map(|b| b.max_lat))
    .bind(alert.bbox.map(|b| b.max_lon))
    .bind(&alert.area_codes)
    .bind(alert.params.hail_size_in)
    .bind(alert.params.wind_speed_mph)
    .bind(&alert.fingerprint)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
