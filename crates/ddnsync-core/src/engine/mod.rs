//! Core DDNS engine
//!
//! The DdnsEngine runs one reconciliation cycle at a time:
//! - Detecting the current address per family via IpSource
//! - Comparing it with the last observed address (IpCache)
//! - Checking each domain's live record via RecordResolver
//! - Writing stale records through the registered DnsProvider plugins
//! - Reporting the outcome via the Notifier
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐      ┌──────────────┐      ┌────────────────┐
//! │  IpSource   │─────▶│  DdnsEngine  │◀────▶│    IpCache     │
//! └─────────────┘      └──────────────┘      └────────────────┘
//!                              │
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//! ┌────────────────┐  ┌─────────────────┐  ┌──────────────┐
//! │ RecordResolver │  │ ProviderRegistry│  │   Notifier   │
//! │ (skip check)   │  │ → DnsProvider   │  │ (webhooks,   │
//! └────────────────┘  └─────────────────┘  │  alerts)     │
//!                                          └──────────────┘
//! ```
//!
//! ## Cycle Flow
//!
//! 1. Reset every domain status to idle
//! 2. Per family, IPv4 first: detect, compare with the cached address
//! 3. On change, persist the address, then batch the domains whose live
//!    record is stale and hand each batch to its provider
//! 4. Build the CycleReport and notify
//!
//! ## No Retries
//!
//! A failed detection skips the family; a failed provider is reported. The
//! control loop's next tick is the only retry.

pub mod report;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::MemoryIpCache;
use crate::cancel::CancelToken;
use crate::config::{Config, DnsService};
use crate::domain::{Domain, UpdateStatus, parse_domains};
use crate::error::{Error, ProviderFailures, Result};
use crate::ip::IpDetector;
use crate::notify::{LogAlertSink, Notifier};
use crate::registry::ProviderRegistry;
use crate::resolver::HickoryRecordResolver;
use crate::traits::{AlertSink, IpCache, IpFamily, IpSource, RecordResolver, RecordType};

pub use report::{CycleReport, DomainOutcome, FamilyReport, Tags};

/// Domain aggregate
///
/// Built from the configuration by [`DdnsEngine::load_domains`], mutated in
/// place by [`DdnsEngine::update`]. Every enabled service has an entry,
/// possibly empty, in both maps.
#[derive(Debug, Clone, Default)]
pub struct Domains {
    /// Last observed IPv4 address
    pub ipv4_addr: Option<IpAddr>,
    /// Last observed IPv6 address
    pub ipv6_addr: Option<IpAddr>,
    /// IPv4 domains by service key
    pub ipv4_domains: BTreeMap<String, Vec<Domain>>,
    /// IPv6 domains by service key
    pub ipv6_domains: BTreeMap<String, Vec<Domain>>,
    /// Report of the last completed cycle
    pub last_report: Option<CycleReport>,
}

impl Domains {
    pub fn addr(&self, family: IpFamily) -> Option<IpAddr> {
        match family {
            IpFamily::V4 => self.ipv4_addr,
            IpFamily::V6 => self.ipv6_addr,
        }
    }

    pub fn set_addr(&mut self, family: IpFamily, ip: IpAddr) {
        match family {
            IpFamily::V4 => self.ipv4_addr = Some(ip),
            IpFamily::V6 => self.ipv6_addr = Some(ip),
        }
    }

    pub fn domains(&self, family: IpFamily) -> &BTreeMap<String, Vec<Domain>> {
        match family {
            IpFamily::V4 => &self.ipv4_domains,
            IpFamily::V6 => &self.ipv6_domains,
        }
    }

    pub fn domains_mut(&mut self, family: IpFamily) -> &mut BTreeMap<String, Vec<Domain>> {
        match family {
            IpFamily::V4 => &mut self.ipv4_domains,
            IpFamily::V6 => &mut self.ipv6_domains,
        }
    }

    /// Every domain of `family`, across services
    pub fn iter(&self, family: IpFamily) -> impl Iterator<Item = &Domain> {
        self.domains(family).values().flatten()
    }

    fn set_family_status(&mut self, family: IpFamily, status: UpdateStatus) {
        for domain in self.domains_mut(family).values_mut().flatten() {
            domain.update_status = status;
        }
    }

    fn reset_statuses(&mut self) {
        for family in IpFamily::ALL {
            self.set_family_status(family, UpdateStatus::Idle);
        }
    }
}

/// Core DDNS engine
///
/// Stateless between cycles apart from its collaborators; all cycle state
/// lives in the [`Domains`] aggregate passed to [`DdnsEngine::update`].
///
/// ## Collaborators
///
/// Production defaults are installed by [`DdnsEngine::new`]; tests and
/// embedders swap them with the `with_*` builders.
pub struct DdnsEngine {
    registry: Arc<ProviderRegistry>,
    ip_source: Arc<dyn IpSource>,
    record_resolver: Arc<dyn RecordResolver>,
    ip_cache: Arc<dyn IpCache>,
    notifier: Notifier,
}

impl DdnsEngine {
    /// Create an engine with production collaborators
    ///
    /// The IP cache defaults to memory; daemons install a
    /// [`crate::cache::FileIpCache`].
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            ip_source: Arc::new(IpDetector::new()),
            record_resolver: Arc::new(HickoryRecordResolver::new()),
            ip_cache: Arc::new(MemoryIpCache::new()),
            notifier: Notifier::new(Arc::new(LogAlertSink)),
        }
    }

    pub fn with_ip_source(mut self, ip_source: Arc<dyn IpSource>) -> Self {
        self.ip_source = ip_source;
        self
    }

    pub fn with_record_resolver(mut self, record_resolver: Arc<dyn RecordResolver>) -> Self {
        self.record_resolver = record_resolver;
        self
    }

    pub fn with_ip_cache(mut self, ip_cache: Arc<dyn IpCache>) -> Self {
        self.ip_cache = ip_cache;
        self
    }

    pub fn with_alert_sink(mut self, alert_sink: Arc<dyn AlertSink>) -> Self {
        self.notifier = self.notifier.with_alert_sink(alert_sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Build the domain aggregate from `config`
    ///
    /// Cached addresses are loaded from the IP cache. A service whose domain
    /// list does not parse keeps an empty list for that family; the error is
    /// logged and the remaining services are unaffected.
    pub async fn load_domains(&self, config: &Config) -> Domains {
        let mut domains = Domains::default();

        for family in IpFamily::ALL {
            match self.ip_cache.load(family).await {
                Ok(Some(ip)) => {
                    debug!("Cached {} address: {}", family, ip);
                    domains.set_addr(family, ip);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to load cached {} address: {}", family, e),
            }
        }

        for service in config.enabled_services() {
            for family in IpFamily::ALL {
                let parsed = parse_domains(service.domains(family)).unwrap_or_else(|e| {
                    error!(
                        "Ignoring {} domains of service {}: {}",
                        family,
                        service.key(),
                        e
                    );
                    Vec::new()
                });
                domains
                    .domains_mut(family)
                    .insert(service.key().to_string(), parsed);
            }
        }

        debug!(
            "Loaded {} IPv4 and {} IPv6 domains",
            domains.iter(IpFamily::V4).count(),
            domains.iter(IpFamily::V6).count()
        );
        domains
    }

    /// Run one reconciliation cycle
    ///
    /// # Returns
    ///
    /// - `Ok(())`: No provider failed (including "nothing to do")
    /// - `Err(Error::Providers)`: Every provider failure of the cycle
    /// - `Err(Error::Cancelled)`: `cancel` fired; the cycle was abandoned and
    ///   no report was produced
    pub async fn update(
        &self,
        domains: &mut Domains,
        config: &Config,
        cancel: &CancelToken,
    ) -> Result<()> {
        if !config.ipv4.enabled && !config.ipv6.enabled {
            debug!("IPv4 and IPv6 both disabled, nothing to reconcile");
            return Ok(());
        }

        domains.reset_statuses();
        let mut failures = ProviderFailures::new();

        for family in IpFamily::ALL {
            if !config.family(family).enabled {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.reconcile_family(family, domains, config, cancel, &mut failures)
                .await?;
        }

        let report = CycleReport::build(domains, &failures);
        self.notifier.dispatch(config, &report, cancel).await;
        domains.last_report = Some(report);

        failures.into_result()
    }

    /// Reconcile one family
    ///
    /// Only cancellation is returned as an error; everything else is logged or
    /// collected into `failures`.
    async fn reconcile_family(
        &self,
        family: IpFamily,
        domains: &mut Domains,
        config: &Config,
        cancel: &CancelToken,
        failures: &mut ProviderFailures,
    ) -> Result<()> {
        let ip = match self
            .ip_source
            .current(family, config.family(family), cancel)
            .await
        {
            Ok(ip) => ip,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                warn!("Failed to detect {} address: {}", family, e);
                return Ok(());
            }
        };

        let previous = domains.addr(family);
        if previous == Some(ip) {
            debug!("{} address unchanged: {}", family, ip);
            domains.set_family_status(family, UpdateStatus::Unchanged);
            return Ok(());
        }

        info!(
            "{} address changed: {} -> {}",
            family,
            previous.map(|ip| ip.to_string()).unwrap_or_else(|| "none".to_string()),
            ip
        );

        // Recorded before any write: the cache tracks the last observed address
        domains.set_addr(family, ip);
        if let Err(e) = self.ip_cache.store(family, ip).await {
            warn!("Failed to persist {} address to the IP cache: {}", family, e);
        }

        let record_type = family.record_type();
        for service in config.enabled_services() {
            let Some(list) = domains.domains_mut(family).get_mut(service.key()) else {
                continue;
            };
            if list.is_empty() {
                continue;
            }

            let stale = self
                .stale_domains(list, ip, record_type, config.dns_resolver.as_deref(), cancel)
                .await?;
            if stale.is_empty() {
                debug!("All {} records of {} are current", record_type, service.key());
                continue;
            }

            let mut batch: Vec<Domain> = stale.iter().map(|&i| list[i].clone()).collect();
            let result = self
                .run_provider(service, record_type, ip, &mut batch, cancel)
                .await;

            let settled = if result.is_ok() {
                UpdateStatus::Success
            } else {
                UpdateStatus::Failed
            };
            for (&i, mut domain) in stale.iter().zip(batch) {
                if domain.update_status == UpdateStatus::Idle {
                    domain.update_status = settled;
                }
                list[i] = domain;
            }

            match result {
                Ok(()) => {
                    for &i in &stale {
                        if list[i].update_status == UpdateStatus::Success {
                            info!("Updated {} {} -> {}", record_type, list[i], ip);
                        }
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!("DNS service {} failed: {}", service.key(), e);
                    failures.push(attribute(service, e));
                }
            }
        }

        Ok(())
    }

    /// Indices of the domains whose live record differs from what would be
    /// written; the rest are marked unchanged
    ///
    /// Resolution failures count as stale.
    async fn stale_domains(
        &self,
        list: &mut [Domain],
        ip: IpAddr,
        record_type: RecordType,
        resolver: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<usize>> {
        let mut stale = Vec::new();

        for (i, domain) in list.iter_mut().enumerate() {
            let fqdn = domain.fqdn();
            let wanted = domain.format_ip(ip).parse::<IpAddr>().ok();

            let lookup = cancel.guard(self.record_resolver.resolve(&fqdn, resolver, record_type));
            match lookup.await {
                Ok(current) if Some(current) == wanted => {
                    debug!("{} {} already points to {}", record_type, fqdn, current);
                    domain.update_status = UpdateStatus::Unchanged;
                }
                Ok(current) => {
                    debug!("{} {} points to {}, needs update", record_type, fqdn, current);
                    stale.push(i);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    debug!("Could not resolve {} {}, updating anyway: {}", record_type, fqdn, e);
                    stale.push(i);
                }
            }
        }

        Ok(stale)
    }

    /// Create, check, initialize and run the provider of `service`
    async fn run_provider(
        &self,
        service: &DnsService,
        record_type: RecordType,
        ip: IpAddr,
        batch: &mut [Domain],
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut provider = self.registry.create(&service.provider).ok_or_else(|| {
            Error::provider(
                service.key(),
                format!("Unknown DNS provider: {}", service.provider),
            )
        })?;

        let support = provider.support();
        if !support.record_type(record_type) {
            return Err(Error::provider(
                service.key(),
                format!("{} does not support {} records", provider.name(), record_type),
            ));
        }
        if !support.line
            && let Some(domain) = batch.iter().find(|domain| domain.line.is_some())
        {
            warn!(
                "{} does not support lines, ignoring the line of {}",
                provider.name(),
                domain
            );
        }

        provider.init(&service.settings, batch)?;
        cancel
            .guard(provider.update(cancel, record_type, ip, batch))
            .await
    }
}

/// Attribute `err` to `service` unless it already names a provider
fn attribute(service: &DnsService, err: Error) -> Error {
    match err {
        Error::Provider { message, .. } => Error::provider(service.key(), message),
        other => Error::provider(service.key(), other.to_string()),
    }
}

impl std::fmt::Debug for DdnsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdnsEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_accessors() {
        let mut domains = Domains::default();
        let ip: IpAddr = "198.51.100.1".parse().unwrap();
        domains.set_addr(IpFamily::V4, ip);
        assert_eq!(domains.addr(IpFamily::V4), Some(ip));
        assert_eq!(domains.addr(IpFamily::V6), None);

        domains
            .domains_mut(IpFamily::V6)
            .insert("svc".to_string(), vec![Domain::new("example.com", "v6")]);
        domains.set_family_status(IpFamily::V6, UpdateStatus::Failed);
        assert_eq!(
            domains.iter(IpFamily::V6).next().unwrap().update_status,
            UpdateStatus::Failed
        );

        domains.reset_statuses();
        assert_eq!(
            domains.iter(IpFamily::V6).next().unwrap().update_status,
            UpdateStatus::Idle
        );
    }

    #[test]
    fn test_attribute_keys_errors_by_service() {
        let service = DnsService::new("cloudflare").with_name("work");
        let err = attribute(&service, Error::provider("cloudflare", "denied"));
        assert!(matches!(
            err,
            Error::Provider { ref provider, ref message } if provider == "work" && message == "denied"
        ));

        let err = attribute(&service, Error::config("missing api_token"));
        assert!(matches!(err, Error::Provider { ref provider, .. } if provider == "work"));
    }

    #[tokio::test]
    async fn test_load_domains_keeps_entry_per_service() {
        let mut config = Config::default();
        config.dns_services.push(
            DnsService::new("alpha").with_ipv4_domains(["a.example.com", "example.org"]),
        );
        config
            .dns_services
            .push(DnsService::new("beta").with_ipv6_domains(["localhost"]));
        let mut disabled = DnsService::new("gamma").with_ipv4_domains(["g.example.com"]);
        disabled.enabled = false;
        config.dns_services.push(disabled);

        let engine = DdnsEngine::new(Arc::new(ProviderRegistry::new()));
        let domains = engine.load_domains(&config).await;

        assert_eq!(domains.ipv4_domains.len(), 2);
        assert_eq!(domains.ipv6_domains.len(), 2);
        assert_eq!(domains.ipv4_domains["alpha"].len(), 2);
        assert!(domains.ipv4_domains["beta"].is_empty());
        assert!(domains.ipv6_domains["beta"].is_empty(), "invalid list dropped");
        assert!(!domains.ipv4_domains.contains_key("gamma"));
    }
}
