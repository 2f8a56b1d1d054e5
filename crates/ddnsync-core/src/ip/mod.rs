//! IP resolution
//!
//! [`IpDetector`] is the production [`IpSource`]: it dispatches on the
//! family's [`IpSourceConfig`] to one of three strategies.
//!
//! - [`interface`]: local interface enumeration
//! - [`api`]: HTTP "what is my IP" endpoints
//! - [`command`]: a user command whose output is scanned
//!
//! Every strategy returns an address of the requested family or an error;
//! none of them retries.

pub mod api;
pub mod command;
pub mod extract;
pub mod interface;

use async_trait::async_trait;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::{IpFamilyConfig, IpSourceConfig};
use crate::traits::{IpFamily, IpSource};
use crate::{Error, Result};

pub use api::LookupCache;

/// Timeout of a single HTTP lookup
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Production IP source
#[derive(Debug)]
pub struct IpDetector {
    client: reqwest::Client,
    lookup_cache: Option<LookupCache>,
}

impl IpDetector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            lookup_cache: None,
        }
    }

    /// Cache built-in endpoint answers at `path` for `ttl`
    pub fn with_lookup_cache(mut self, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        self.lookup_cache = Some(LookupCache::new(path, ttl));
        self
    }
}

impl Default for IpDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IpSource for IpDetector {
    async fn current(
        &self,
        family: IpFamily,
        config: &IpFamilyConfig,
        cancel: &CancelToken,
    ) -> Result<IpAddr> {
        let ip = match &config.source {
            IpSourceConfig::Interface { name, filter } => {
                interface::detect(family, name.as_deref(), filter)?
            }
            IpSourceConfig::Api { url } => {
                api::detect(
                    &self.client,
                    family,
                    url.as_deref(),
                    self.lookup_cache.as_ref(),
                    cancel,
                )
                .await?
            }
            IpSourceConfig::Command {
                command,
                env,
                timeout_secs,
            } => command::detect(family, command, env, *timeout_secs, cancel).await?,
        };

        if !family.matches(&ip) {
            return Err(Error::ip_detect(format!(
                "Expected an {family} address, got {ip}"
            )));
        }

        tracing::debug!("Detected {} address: {}", family, ip);
        Ok(ip)
    }
}
