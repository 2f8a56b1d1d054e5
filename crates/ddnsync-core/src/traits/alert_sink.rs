// # Alert Sink Trait
//
// Boundary to the external alerting subsystem (e-mail, IM, ...). The engine
// renders the report and hands over the content pair under a fixed topic; how
// it is delivered is not its concern.

use async_trait::async_trait;

/// Rendered alert content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub html: String,
    pub markdown: String,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver `message` under `topic`, best effort
    async fn send(&self, topic: &str, message: &AlertMessage) -> Result<(), crate::Error>;
}
