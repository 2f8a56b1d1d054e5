//! Notification dispatch
//!
//! After every completed cycle the [`Notifier`]:
//! - runs every configured webhook, unconditionally
//! - renders the alert templates and hands them to the [`AlertSink`] when the
//!   notify mode asks for it
//!
//! Failures on either path are logged and never affect the cycle result.

pub mod template;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::{Config, NotifyMode};
use crate::engine::CycleReport;
use crate::traits::{AlertMessage, AlertSink};

pub use webhook::WebhookRequest;

/// Topic under which alerts are sent
pub const ALERT_TOPIC: &str = "ddns";

/// Timeout of a single webhook call
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Report dispatcher
pub struct Notifier {
    client: reqwest::Client,
    alert_sink: Arc<dyn AlertSink>,
}

impl Notifier {
    pub fn new(alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_default(),
            alert_sink,
        }
    }

    pub fn with_alert_sink(mut self, alert_sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sink = alert_sink;
        self
    }

    /// Run webhooks and alerts for `report`
    pub async fn dispatch(&self, config: &Config, report: &CycleReport, cancel: &CancelToken) {
        let tags = report.tags();

        for hook in &config.webhooks {
            let result = cancel
                .guard(webhook::send(&self.client, hook, &tags))
                .await;
            match result {
                Ok(()) => tracing::debug!("Webhook {} sent", hook.name),
                Err(e) if e.is_cancelled() => return,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        if !should_alert(config.notify.mode, report) {
            return;
        }

        let message = AlertMessage {
            html: template::render(&config.notify.html_template, &tags),
            markdown: template::render(&config.notify.markdown_template, &tags),
        };
        if let Err(e) = self.alert_sink.send(ALERT_TOPIC, &message).await {
            tracing::warn!("Failed to send {} alert: {}", ALERT_TOPIC, e);
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

/// Whether `mode` asks for an alert about `report`
pub fn should_alert(mode: NotifyMode, report: &CycleReport) -> bool {
    match mode {
        NotifyMode::Disabled => false,
        NotifyMode::OnError => report.has_errors(),
        NotifyMode::Always => true,
    }
}

/// Alert sink that writes the Markdown rendering to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, topic: &str, message: &AlertMessage) -> crate::Result<()> {
        tracing::info!("[{}] {}", topic, message.markdown.trim());
        Ok(())
    }
}
