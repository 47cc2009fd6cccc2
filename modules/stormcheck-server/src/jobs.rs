//! Binds the three recurring operations to their domain crates.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use stormcheck_common::OperationKind;
use stormcheck_ingest::Ingestor;
use stormcheck_store::{AlertCommit, Store};
use stormcheck_verify::Engine;

use crate::notify::Notifier;
use crate::scheduler::{OpCounts, OperationRunner};
use crate::summary::SummaryClient;

/// Alerts picked up per verification pass.
const VERIFY_BATCH: i64 = 500;
/// Summaries generated per verification pass.
const SUMMARY_BATCH: i64 = 5;

pub struct Jobs {
    store: Store,
    ingestor: Ingestor,
    engine: Arc<Engine>,
    notifier: Notifier,
    summarizer: Option<SummaryClient>,
}

impl Jobs {
    pub fn new(
        store: Store,
        ingestor: Ingestor,
        engine: Arc<Engine>,
        notifier: Notifier,
        summarizer: Option<SummaryClient>,
    ) -> Self {
        Self {
            store,
            ingestor,
            engine,
            notifier,
            summarizer,
        }
    }

    async fn alert_poll(&self) -> Result<OpCounts> {
        let outcome = self.ingestor.poll_alerts().await?;
        for (alert, commit) in &outcome.committed {
            if matches!(commit, AlertCommit::New | AlertCommit::Updated) {
                self.notifier.alert_committed(alert).await;
            }
        }
        Ok(OpCounts {
            processed: outcome.stats.processed() as i32,
            new: outcome.stats.new as i32,
        })
    }

    async fn report_poll(&self) -> Result<OpCounts> {
        let stats = self.ingestor.poll_reports().await?;
        Ok(OpCounts {
            processed: stats.processed() as i32,
            new: stats.new as i32,
        })
    }

    async fn verification(&self) -> Result<OpCounts> {
        let outcome = self.engine.correlate_pending(VERIFY_BATCH).await?;
        for alert in &outcome.newly_verified {
            self.notifier.alert_verified(alert).await;
        }
        if let Some(summarizer) = &self.summarizer {
            self.summarize_batch(summarizer).await;
        }
        Ok(OpCounts {
            processed: outcome.stats.examined as i32,
            new: outcome.newly_verified.len() as i32,
        })
    }

    /// Fills in summaries for verified alerts that lack one. Failures are
    /// logged and retried on a later pass.
    async fn summarize_batch(&self, summarizer: &SummaryClient) {
        let alerts = match self.store.alerts_missing_summary(SUMMARY_BATCH).await {
            Ok(alerts) => alerts,
            Err(error) => {
                warn!(error = %error, "Failed to load alerts for summarization");
                return;
            }
        };
        for alert in &alerts {
            match summarizer.summarize(alert).await {
                Ok(summary) => {
                    if let Err(error) = self.store.set_alert_summary(&alert.id, &summary).await {
                        warn!(alert_id = %alert.id, error = %error, "Failed to store summary");
                    }
                }
                Err(error) => {
                    warn!(alert_id = %alert.id, error = %error, "Summarization failed");
                }
            }
        }
    }
}

#[async_trait]
impl OperationRunner for Jobs {
    async fn run(&self, kind: OperationKind) -> Result<OpCounts> {
        match kind {
            OperationKind::AlertPoll => self.alert_poll().await,
            OperationKind::ReportPoll => self.report_poll().await,
            OperationKind::Verification => self.verification().await,
        }
    }
}
