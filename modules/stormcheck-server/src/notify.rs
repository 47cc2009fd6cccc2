//! Outbound notifications for threshold-exceeding and newly-verified
//! alerts.
//!
//! Delivery is best effort: a failed send is logged and never fails the
//! operation that produced the change. The store remains the authoritative
//! record either way.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use stormcheck_common::geo::BoundingBox;
use stormcheck_common::Alert;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyReason {
    ThresholdExceeded,
    Verified,
}

/// The fields a downstream rule engine needs to act on an alert change.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub reason: NotifyReason,
    pub alert_id: String,
    pub event: String,
    pub severity: String,
    pub area_desc: String,
    pub area_codes: Vec<String>,
    pub bbox: Option<BoundingBox>,
    pub hail_size_in: Option<f64>,
    pub wind_speed_mph: Option<f64>,
    pub status: String,
    pub match_confidence: Option<f64>,
}

impl Notification {
    fn for_alert(reason: NotifyReason, alert: &Alert) -> Self {
        Self {
            reason,
            alert_id: alert.id.clone(),
            event: alert.event.clone(),
            severity: alert.severity.to_string(),
            area_desc: alert.area_desc.clone(),
            area_codes: alert.area_codes.clone(),
            bbox: alert.bbox,
            hail_size_in: alert.params.hail_size_in,
            wind_speed_mph: alert.params.wind_speed_mph,
            status: alert.status.to_string(),
            match_confidence: alert.match_confidence,
        }
    }
}

#[async_trait]
pub trait NotifyBackend: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// POSTs each notification as JSON to a configured webhook.
pub struct WebhookBackend {
    http: reqwest::Client,
    url: String,
}

impl WebhookBackend {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotifyBackend for WebhookBackend {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .context("Webhook request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("Webhook returned {}", response.status());
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
pub struct NoopBackend;

#[async_trait]
impl NotifyBackend for NoopBackend {
    async fn send(&self, notification: &Notification) -> Result<()> {
        debug!(alert_id = %notification.alert_id, reason = ?notification.reason, "Notification (no backend configured)");
        Ok(())
    }
}

/// Applies the notification rules and hands matching changes to the
/// backend.
pub struct Notifier {
    backend: Box<dyn NotifyBackend>,
    hail_threshold_in: f64,
    wind_threshold_mph: f64,
}

impl Notifier {
    pub fn new(
        backend: Box<dyn NotifyBackend>,
        hail_threshold_in: f64,
        wind_threshold_mph: f64,
    ) -> Self {
        Self {
            backend,
            hail_threshold_in,
            wind_threshold_mph,
        }
    }

    /// A new or updated alert whose extracted magnitudes meet a threshold.
    pub async fn alert_committed(&self, alert: &Alert) {
        if !self.exceeds_threshold(alert) {
            return;
        }
        self.dispatch(Notification::for_alert(NotifyReason::ThresholdExceeded, alert))
            .await;
    }

    /// An alert that just transitioned to verified.
    pub async fn alert_verified(&self, alert: &Alert) {
        self.dispatch(Notification::for_alert(NotifyReason::Verified, alert))
            .await;
    }

    fn exceeds_threshold(&self, alert: &Alert) -> bool {
        let hail = alert
            .params
            .hail_size_in
            .is_some_and(|size| size >= self.hail_threshold_in);
        let wind = alert
            .params
            .wind_speed_mph
            .is_some_and(|speed| speed >= self.wind_threshold_mph);
        hail || wind
    }

    async fn dispatch(&self, notification: Notification) {
        match self.backend.send(&notification).await {
            Ok(()) => {
                info!(alert_id = %notification.alert_id, reason = ?notification.reason, "Notification sent");
            }
            Err(error) => {
                warn!(alert_id = %notification.alert_id, error = %error, "Notification delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use chrono::Utc;

    use stormcheck_common::{AlertStatus, Severity, WarningParams};

    struct CountingBackend {
        sent: Arc<AtomicU32>,
    }

    #[async_trait]
    impl NotifyBackend for CountingBackend {
        async fn send(&self, _notification: &Notification) -> Result<()> {
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn notifier_with_counter() -> (Notifier, Arc<AtomicU32>) {
        let sent = Arc::new(AtomicU32::new(0));
        let backend = CountingBackend { sent: sent.clone() };
        (Notifier::new(Box::new(backend), 1.0, 58.0), sent)
    }

    fn alert_with_params(params: WarningParams) -> Alert {
        let now = Utc::now();
        Alert {
            id: "test-alert".into(),
            event: "Severe Thunderstorm Warning".into(),
            severity: Severity::Severe,
            headline: None,
            description: String::new(),
            area_desc: "Cleveland, OK".into(),
            sent: now,
            effective: now,
            expires: now,
            polygon: None,
            bbox: None,
            area_codes: vec![],
            params,
            status: AlertStatus::Unverified,
            match_confidence: None,
            match_method: None,
            matched_report_ids: vec![],
            verified_at: None,
            summary: None,
            fingerprint: "fp".into(),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    #[tokio::test]
    async fn threshold_rule_requires_a_reading_at_or_above() {
        let (notifier, sent) = notifier_with_counter();

        let below = alert_with_params(WarningParams {
            hail_size_in: Some(0.75),
            wind_speed_mph: Some(40.0),
        });
        notifier.alert_committed(&below).await;
        assert_eq!(sent.load(Ordering::Relaxed), 0);

        let at_threshold = alert_with_params(WarningParams {
            hail_size_in: Some(1.0),
            wind_speed_mph: None,
        });
        notifier.alert_committed(&at_threshold).await;
        assert_eq!(sent.load(Ordering::Relaxed), 1);

        let wind_only = alert_with_params(WarningParams {
            hail_size_in: None,
            wind_speed_mph: Some(60.0),
        });
        notifier.alert_committed(&wind_only).await;
        assert_eq!(sent.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn absent_readings_never_notify() {
        let (notifier, sent) = notifier_with_counter();
        let empty = alert_with_params(WarningParams::default());
        notifier.alert_committed(&empty).await;
        assert_eq!(sent.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn verification_always_notifies() {
        let (notifier, sent) = notifier_with_counter();
        let alert = alert_with_params(WarningParams::default());
        notifier.alert_verified(&alert).await;
        assert_eq!(sent.load(Ordering::Relaxed), 1);
    }
}
