//! Error types for the ddnsync system
//!
//! This module defines all error types used throughout the crate.
//!
//! Only provider failures escape a reconciliation cycle (as
//! [`Error::Providers`]). Every other variant is contained by the engine
//! and observable through logs.

use std::fmt;
use thiserror::Error;

/// Result type alias for ddnsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ddnsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Address detection failed (interface, command or API lookup)
    #[error("IP detection error: {0}")]
    IpDetect(String),

    /// Live DNS lookup used for the skip-or-write decision failed
    #[error("DNS resolution error: {0}")]
    Resolve(String),

    /// On-disk cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A raw domain entry could not be normalized
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Webhook execution errors
    #[error("Webhook error ({webhook}): {message}")]
    Webhook {
        /// Webhook name
        webhook: String,
        /// Error message
        message: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider (service) name
        provider: String,
        /// Error message
        message: String,
    },

    /// Every provider failure of one reconciliation cycle
    #[error("{0}")]
    Providers(ProviderFailures),

    /// The surrounding cycle was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IP detection error
    pub fn ip_detect(msg: impl Into<String>) -> Self {
        Self::IpDetect(msg.into())
    }

    /// Create a DNS resolution error
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid domain error
    pub fn invalid_domain(msg: impl Into<String>) -> Self {
        Self::InvalidDomain(msg.into())
    }

    /// Create a webhook error
    pub fn webhook(webhook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Webhook {
            webhook: webhook.into(),
            message: message.into(),
        }
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Provider errors collected over one cycle, displayed as one line
#[derive(Debug, Default)]
pub struct ProviderFailures(Vec<Error>);

impl ProviderFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// `Ok(())` when nothing failed, otherwise the aggregate error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Providers(self))
        }
    }
}

impl fmt::Display for ProviderFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}
