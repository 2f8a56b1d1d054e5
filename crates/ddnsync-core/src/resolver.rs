//! Live DNS lookups
//!
//! [`HickoryRecordResolver`] answers "what does DNS currently say for this
//! name" so the engine can skip writes that would not change anything.
//! One client is kept per resolver address. Record caching is off: every
//! lookup goes to the wire.

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::traits::{RecordResolver, RecordType};
use crate::{Error, Result};

const DNS_PORT: u16 = 53;
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// [`RecordResolver`] backed by `hickory-resolver`
///
/// Clones share the client table.
#[derive(Clone, Default)]
pub struct HickoryRecordResolver {
    /// Keyed by the trimmed resolver address; `None` is the system resolver
    clients: Arc<Mutex<HashMap<Option<String>, TokioAsyncResolver>>>,
}

impl HickoryRecordResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client for `resolver`, built on first use
    fn client(&self, resolver: Option<&str>) -> Result<TokioAsyncResolver> {
        let key = resolver
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = Self::build(key.as_deref())?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn build(resolver: Option<&str>) -> Result<TokioAsyncResolver> {
        let mut opts = ResolverOpts::default();
        opts.timeout = LOOKUP_TIMEOUT;
        opts.attempts = 1;
        opts.cache_size = 0;

        let config = match resolver {
            Some(addr) => {
                let server = parse_server(addr)?;
                ResolverConfig::from_parts(
                    None,
                    vec![],
                    NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true),
                )
            }
            None => match hickory_resolver::system_conf::read_system_conf() {
                Ok((config, _)) => config,
                Err(e) => {
                    tracing::debug!("No usable system resolver configuration: {}", e);
                    ResolverConfig::default()
                }
            },
        };

        Ok(TokioAsyncResolver::tokio(config, opts))
    }

    fn client_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for HickoryRecordResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryRecordResolver")
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Parse `ip` or `ip:port` (IPv6 with port as `[ip]:port`)
pub fn parse_server(addr: &str) -> Result<SocketAddr> {
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }
    addr.parse::<SocketAddr>()
        .map_err(|_| Error::config(format!("Invalid DNS resolver address: {addr}")))
}

/// Absolute form of `fqdn`, with exactly one trailing dot
fn absolute(fqdn: &str) -> String {
    format!("{}.", fqdn.trim().trim_end_matches('.'))
}

#[async_trait]
impl RecordResolver for HickoryRecordResolver {
    async fn resolve(
        &self,
        fqdn: &str,
        resolver: Option<&str>,
        record_type: RecordType,
    ) -> Result<IpAddr> {
        let client = self.client(resolver)?;
        let name = absolute(fqdn);

        let answer = match record_type {
            RecordType::A => client
                .ipv4_lookup(name.as_str())
                .await
                .map_err(|e| Error::resolve(format!("A lookup for {name} failed: {e}")))?
                .iter()
                .next()
                .map(|a| IpAddr::V4(a.0)),
            RecordType::Aaaa => client
                .ipv6_lookup(name.as_str())
                .await
                .map_err(|e| Error::resolve(format!("AAAA lookup for {name} failed: {e}")))?
                .iter()
                .next()
                .map(|aaaa| IpAddr::V6(aaaa.0)),
        };

        answer.ok_or_else(|| Error::resolve(format!("No {record_type} record for {name}")))
    }
}
