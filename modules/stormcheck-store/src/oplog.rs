//! Operation log: one audit row per scheduled or manually triggered run.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use stormcheck_common::{OperationKind, OperationLogEntry, TriggerSource};

use crate::Store;

#[derive(Debug, Clone, sqlx::FromRow)]
struct OperationRow {
    id: i64,
    kind: String,
    trigger_source: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    success: Option<bool>,
    records_processed: Option<i32>,
    records_new: Option<i32>,
    error: Option<String>,
}

impl OperationRow {
    fn into_entry(self) -> Result<OperationLogEntry> {
        let kind = OperationKind::parse(&self.kind)
            .ok_or_else(|| anyhow!("unknown operation kind in store: {}", self.kind))?;
        let trigger = TriggerSource::parse(&self.trigger_source)
            .ok_or_else(|| anyhow!("unknown trigger source in store: {}", self.trigger_source))?;
        Ok(OperationLogEntry {
            id: self.id,
            kind,
            trigger,
            started_at: self.started_at,
            finished_at: self.finished_at,
            success: self.success,
            records_processed: self.records_processed,
            records_new: self.records_new,
            error: self.error,
        })
    }
}

impl Store {
    /// Open an audit row for a run that is starting. Returns its id.
    pub async fn start_operation(
        &self,
        kind: OperationKind,
        trigger: TriggerSource,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO operation_log (kind, trigger_source, started_at)
            VALUES ($1, $2, now())
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(trigger.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Close an audit row with its outcome. A skipped malformed record is
    /// not a failure; `error` is set only when the operation itself failed.
    pub async fn finish_operation(
        &self,
        id: i64,
        success: bool,
        records_processed: Option<i32>,
        records_new: Option<i32>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE operation_log
            SET finished_at = now(),
                success = $2,
                records_processed = $3,
                records_new = $4,
                error = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(records_processed)
        .bind(records_new)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_operations(
        &self,
        kind: Option<OperationKind>,
        limit: i64,
    ) -> Result<Vec<OperationLogEntry>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM operation_log WHERE 1=1 ");

        if let Some(kind) = kind {
            qb.push("AND kind = ");
            qb.push_bind(kind.as_str());
            qb.push(" ");
        }

        qb.push("ORDER BY started_at DESC LIMIT ");
        qb.push_bind(limit);

        let rows = qb
            .build_query_as::<OperationRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(OperationRow::into_entry).collect()
    }
}
