//! HTTP API address source
//!
//! Asks a "what is my IP" service. A configured URL is queried once; without
//! one the built-in endpoints are tried in order until one answers.
//!
//! Answers from the built-in endpoints can be kept in a small on-disk
//! lookup cache so frequent cycles do not hammer free services:
//!
//! ```json
//! {
//!   "ipv4": { "addr": "203.0.113.7", "fetched_at": "2026-01-09T12:00:00Z" }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cancel::CancelToken;
use crate::ip::extract;
use crate::traits::IpFamily;
use crate::{Error, Result};

/// Built-in IPv4 endpoints, tried in order
pub const IPV4_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://ipv4.icanhazip.com",
    "https://ifconfig.me/ip",
];

/// Built-in IPv6 endpoints, tried in order
pub const IPV6_ENDPOINTS: &[&str] = &[
    "https://api6.ipify.org",
    "https://ipv6.icanhazip.com",
    "https://v6.ident.me",
];

pub fn default_endpoints(family: IpFamily) -> &'static [&'static str] {
    match family {
        IpFamily::V4 => IPV4_ENDPOINTS,
        IpFamily::V6 => IPV6_ENDPOINTS,
    }
}

/// Detect through HTTP
///
/// # Parameters
///
/// - `url`: Configured endpoint; `None` uses the built-in list
/// - `lookup_cache`: Consulted and refreshed for built-in endpoints only
pub async fn detect(
    client: &reqwest::Client,
    family: IpFamily,
    url: Option<&str>,
    lookup_cache: Option<&LookupCache>,
    cancel: &CancelToken,
) -> Result<IpAddr> {
    if let Some(url) = url.map(str::trim).filter(|url| !url.is_empty()) {
        return cancel.guard(fetch(client, url, family)).await;
    }

    if let Some(cache) = lookup_cache
        && let Some(ip) = cache.fresh(family).await
    {
        tracing::debug!("Using cached {} lookup: {}", family, ip);
        return Ok(ip);
    }

    let mut last_error = None;
    for endpoint in default_endpoints(family) {
        match cancel.guard(fetch(client, endpoint, family)).await {
            Ok(ip) => {
                if let Some(cache) = lookup_cache
                    && let Err(e) = cache.record(family, ip).await
                {
                    tracing::warn!("Failed to write IP lookup cache: {}", e);
                }
                return Ok(ip);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::debug!("IP lookup via {} failed: {}", endpoint, e);
                last_error = Some(e);
            }
        }
    }

    Err(Error::ip_detect(format!(
        "All built-in {} lookup endpoints failed{}",
        family,
        last_error.map(|e| format!(", last error: {e}")).unwrap_or_default()
    )))
}

async fn fetch(client: &reqwest::Client, url: &str, family: IpFamily) -> Result<IpAddr> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::ip_detect(format!("Request to {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::ip_detect(format!(
            "{url} answered with HTTP {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::ip_detect(format!("Failed to read response from {url}: {e}")))?;

    extract::first_ip(&body, family)
        .ok_or_else(|| Error::ip_detect(format!("No {family} address in response from {url}")))
}

/// Short-lived on-disk cache of built-in endpoint answers
#[derive(Debug)]
pub struct LookupCache {
    path: PathBuf,
    ttl: Duration,
    lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LookupFile {
    #[serde(default)]
    ipv4: Option<LookupEntry>,
    #[serde(default)]
    ipv6: Option<LookupEntry>,
}

impl LookupFile {
    fn entry(&self, family: IpFamily) -> Option<&LookupEntry> {
        match family {
            IpFamily::V4 => self.ipv4.as_ref(),
            IpFamily::V6 => self.ipv6.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LookupEntry {
    addr: IpAddr,
    fetched_at: DateTime<Utc>,
}

impl LookupCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached answer for `family` younger than the TTL
    pub async fn fresh(&self, family: IpFamily) -> Option<IpAddr> {
        let _guard = self.lock.lock().await;
        let file = self.read().await;
        let entry = file.entry(family)?;

        let age = Utc::now().signed_duration_since(entry.fetched_at);
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        (age >= chrono::Duration::zero() && age < ttl && family.matches(&entry.addr))
            .then_some(entry.addr)
    }

    /// Store a fresh answer
    pub async fn record(&self, family: IpFamily, ip: IpAddr) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await;
        let entry = Some(LookupEntry {
            addr: ip,
            fetched_at: Utc::now(),
        });
        match family {
            IpFamily::V4 => file.ipv4 = entry,
            IpFamily::V6 => file.ipv6 = entry,
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&file)?;
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to rename {} to {}: {}",
                temp.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Unreadable or missing files count as empty
    async fn read(&self) -> LookupFile {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::debug!("Ignoring unreadable IP lookup cache: {}", e);
                LookupFile::default()
            }),
            Err(_) => LookupFile::default(),
        }
    }
}
