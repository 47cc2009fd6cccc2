//! The two polling operations: fetch upstream, map, commit, count.

use std::fmt;

use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use stormcheck_common::Alert;
use stormcheck_store::{AlertCommit, Store};

use crate::alert_feed::{self, AlertFeedClient};
use crate::report_feed::{self, ReportFeedClient};

/// Owns the feed clients and runs the polling operations against the store.
/// Cheap to share; the scheduler and the manual-trigger route both call it.
pub struct Ingestor {
    store: Store,
    alert_feed: AlertFeedClient,
    report_feed: ReportFeedClient,
}

/// What one alert poll did, per record. `skipped` counts malformed records
/// dropped during mapping; they never fail the poll.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlertPollStats {
    pub fetched: u32,
    pub new: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub skipped: u32,
}

impl AlertPollStats {
    /// Records that made it into the store in any form.
    pub fn processed(&self) -> u32 {
        self.new + self.updated + self.unchanged
    }
}

impl fmt::Display for AlertPollStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} new={} updated={} unchanged={} skipped={}",
            self.fetched, self.new, self.updated, self.unchanged, self.skipped
        )
    }
}

/// An alert poll's stats plus the per-alert commit outcomes, in commit
/// order. The caller uses the outcomes to drive notification rules.
pub struct AlertPollOutcome {
    pub stats: AlertPollStats,
    pub committed: Vec<(Alert, AlertCommit)>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReportPollStats {
    pub days: u32,
    pub rows: u32,
    pub new: u32,
    pub duplicate: u32,
    pub malformed: u32,
}

impl ReportPollStats {
    /// Rows that reached the store, whether newly inserted or already there.
    pub fn processed(&self) -> u32 {
        self.new + self.duplicate
    }
}

impl fmt::Display for ReportPollStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "days={} rows={} new={} duplicate={} malformed={}",
            self.days, self.rows, self.new, self.duplicate, self.malformed
        )
    }
}

impl Ingestor {
    pub fn new(store: Store, alert_feed_url: &str, report_feed_url: &str) -> Self {
        Self {
            store,
            alert_feed: AlertFeedClient::new(alert_feed_url),
            report_feed: ReportFeedClient::new(report_feed_url),
        }
    }

    /// Pull every active alert and commit the batch in one transaction.
    ///
    /// Malformed records are skipped with a warning; an unreachable feed or
    /// a failed commit is the only way the poll itself fails.
    pub async fn poll_alerts(&self) -> Result<AlertPollOutcome> {
        let features = self.alert_feed.fetch_active().await?;

        let mut stats = AlertPollStats {
            fetched: features.len() as u32,
            ..Default::default()
        };

        let mut alerts = Vec::with_capacity(features.len());
        for feature in features {
            match alert_feed::map_feature(feature) {
                Ok(alert) => alerts.push(alert),
                Err(error) => {
                    warn!(error = %error, "Skipping malformed alert record");
                    stats.skipped += 1;
                }
            }
        }

        let outcomes = self.store.commit_alerts(&alerts).await?;
        for outcome in &outcomes {
            match outcome {
                AlertCommit::New => stats.new += 1,
                AlertCommit::Updated => stats.updated += 1,
                AlertCommit::Unchanged => stats.unchanged += 1,
            }
        }

        info!(%stats, "Alert poll complete");
        Ok(AlertPollOutcome {
            stats,
            committed: alerts.into_iter().zip(outcomes).collect(),
        })
    }

    /// Pull the current meteorological day's reports and the previous
    /// day's, then append whatever is new. Re-fetching a day is free: rows
    /// are content-addressed, so replays collapse into duplicates.
    pub async fn poll_reports(&self) -> Result<ReportPollStats> {
        let today = Utc::now().date_naive();
        let days = [today.pred_opt().unwrap_or(today), today];

        let mut fetches = stream::iter(days)
            .map(|date| async move { (date, self.report_feed.fetch_day(date).await) })
            .buffer_unordered(days.len());

        let mut stats = ReportPollStats::default();
        while let Some((date, result)) = fetches.next().await {
            let body = result?;
            let parsed = report_feed::parse_daily_reports(date, &body);
            let (new, duplicate) = self.store.insert_reports(&parsed.reports).await?;

            stats.days += 1;
            stats.rows += parsed.reports.len() as u32;
            stats.new += new;
            stats.duplicate += duplicate;
            stats.malformed += parsed.malformed;
        }

        info!(%stats, "Report poll complete");
        Ok(stats)
    }
}
