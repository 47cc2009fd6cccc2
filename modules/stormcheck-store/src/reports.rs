//! Storm report persistence. The table is append-only: content-hash ids make
//! re-ingest a no-op and corrections new rows.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};

use stormcheck_common::{ReportCategory, StormReport};

use crate::Store;

/// Filters for the report list query.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub date: Option<NaiveDate>,
    pub category: Option<ReportCategory>,
    pub state: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReportRow {
    id: String,
    report_date: NaiveDate,
    category: String,
    report_time: String,
    magnitude: String,
    magnitude_value: Option<f64>,
    location: String,
    county: String,
    state: String,
    lat: Option<f64>,
    lon: Option<f64>,
    comments: String,
    raw_row: String,
    ingested_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_report(self) -> Result<StormReport> {
        let category = ReportCategory::parse(&self.category)
            .ok_or_else(|| anyhow!("unknown report category in store: {}", self.category))?;
        Ok(StormReport {
            id: self.id,
            report_date: self.report_date,
            category,
            time: self.report_time,
            magnitude: self.magnitude,
            magnitude_value: self.magnitude_value,
            location: self.location,
            county: self.county,
            state: self.state,
            lat: self.lat,
            lon: self.lon,
            comments: self.comments,
            raw_row: self.raw_row,
            ingested_at: self.ingested_at,
        })
    }
}

impl Store {
    /// Insert a batch of parsed reports in one transaction. Rows whose
    /// content hash is already present are left untouched. Returns
    /// (new, duplicate) counts.
    pub async fn insert_reports(&self, reports: &[StormReport]) -> Result<(u32, u32)> {
        let mut tx = self.pool.begin().await?;
        let mut new = 0u32;
        let mut duplicate = 0u32;

        for report in reports {
            let result = sqlx::query(
                r#"
                INSERT INTO storm_reports
                    (id, report_date, category, report_time, magnitude,
                     magnitude_value, location, county, state, lat, lon,
                     comments, raw_row, ingested_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&report.id)
            .bind(report.report_date)
            .bind(report.category.as_str())
            .bind(&report.time)
            .bind(&report.magnitude)
            .bind(report.magnitude_value)
            .bind(&report.location)
            .bind(&report.county)
            .bind(&report.state)
            .bind(report.lat)
            .bind(report.lon)
            .bind(&report.comments)
            .bind(&report.raw_row)
            .bind(report.ingested_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                new += 1;
            } else {
                duplicate += 1;
            }
        }

        tx.commit().await?;
        Ok((new, duplicate))
    }

    pub async fn get_report(&self, id: &str) -> Result<Option<StormReport>> {
        let row = sqlx::query_as::<_, ReportRow>("SELECT * FROM storm_reports WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReportRow::into_report).transpose()
    }

    pub async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<StormReport>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM storm_reports WHERE 1=1 ");

        if let Some(date) = filter.date {
            qb.push("AND report_date = ");
            qb.push_bind(date);
            qb.push(" ");
        }
        if let Some(category) = filter.category {
            qb.push("AND category = ");
            qb.push_bind(category.as_str());
            qb.push(" ");
        }
        if let Some(state) = &filter.state {
            qb.push("AND state = ");
            qb.push_bind(state.to_uppercase());
            qb.push(" ");
        }

        qb.push("ORDER BY report_date DESC, report_time ASC LIMIT ");
        qb.push_bind(filter.limit);
        qb.push(" OFFSET ");
        qb.push_bind(filter.offset);

        let rows = qb
            .build_query_as::<ReportRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }

    /// Candidate reports for correlation: any of the given meteorological
    /// days, in any of the given categories.
    pub async fn candidate_reports(
        &self,
        dates: &[NaiveDate],
        categories: &[ReportCategory],
    ) -> Result<Vec<StormReport>> {
        let category_names: Vec<String> =
            categories.iter().map(|c| c.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT * FROM storm_reports
            WHERE report_date = ANY($1) AND category = ANY($2)
            ORDER BY report_date ASC, report_time ASC
            "#,
        )
        .bind(dates)
        .bind(&category_names)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }

    /// Fetch reports by id, preserving no particular order.
    pub async fn reports_by_ids(&self, ids: &[String]) -> Result<Vec<StormReport>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ReportRow>(
            "SELECT * FROM storm_reports WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReportRow::into_report).collect()
    }
}
