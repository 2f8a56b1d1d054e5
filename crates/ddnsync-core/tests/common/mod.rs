//! Test doubles and common utilities for contract tests
//!
//! Every double shares its counters through `Arc`s so a test can keep a
//! handle after moving the double into the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use ddnsync_core::cancel::CancelToken;
use ddnsync_core::config::{Config, DnsService, IpFamilyConfig};
use ddnsync_core::domain::{Domain, UpdateStatus};
use ddnsync_core::error::{Error, Result};
use ddnsync_core::registry::ProviderRegistry;
use ddnsync_core::traits::{
    AlertMessage, AlertSink, ConfigItemSpec, DnsProvider, IpCache, IpFamily, IpSource,
    RecordResolver, RecordType, Settings, Support,
};
use ddnsync_core::{DdnsEngine, MemoryIpCache};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid test address")
}

/// An IP source returning scripted addresses per family
#[derive(Clone, Default)]
pub struct ScriptedIpSource {
    addrs: Arc<Mutex<HashMap<IpFamily, IpAddr>>>,
    calls: Arc<Mutex<Vec<IpFamily>>>,
    delay: Option<Duration>,
}

impl ScriptedIpSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `family` with `ip` from now on
    pub fn set(&self, family: IpFamily, ip: IpAddr) {
        self.addrs.lock().unwrap().insert(family, ip);
    }

    /// Fail detection of `family` from now on
    pub fn fail(&self, family: IpFamily) {
        self.addrs.lock().unwrap().remove(&family);
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Families in the order they were asked for
    pub fn calls(&self) -> Vec<IpFamily> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(
        &self,
        family: IpFamily,
        _config: &IpFamilyConfig,
        _cancel: &CancelToken,
    ) -> Result<IpAddr> {
        self.calls.lock().unwrap().push(family);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let answer = self.addrs.lock().unwrap().get(&family).copied();
        answer.ok_or_else(|| Error::ip_detect(format!("scripted {family} failure")))
    }
}

/// A resolver answering from a fixed table; unknown names fail
#[derive(Clone, Default)]
pub struct ScriptedResolver {
    records: Arc<Mutex<HashMap<String, IpAddr>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fqdn: &str, ip: IpAddr) {
        self.records.lock().unwrap().insert(fqdn.to_string(), ip);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordResolver for ScriptedResolver {
    async fn resolve(
        &self,
        fqdn: &str,
        _resolver: Option<&str>,
        record_type: RecordType,
    ) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(fqdn)
            .copied()
            .ok_or_else(|| Error::resolve(format!("no {record_type} record for {fqdn}")))
    }
}

/// One recorded `DnsProvider::update` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub record_type: RecordType,
    pub ip: IpAddr,
    pub fqdns: Vec<String>,
    /// Cached address of the family at the time of the call, when watched
    pub cached: Option<IpAddr>,
}

struct MockShared {
    name: &'static str,
    support: Support,
    failing: AtomicBool,
    failing_fqdns: Mutex<Vec<String>>,
    inits: AtomicUsize,
    updates: Mutex<Vec<UpdateCall>>,
    cache_watch: Mutex<Option<MemoryIpCache>>,
}

/// Handle on a mock provider registered in a registry
///
/// Every instance the registry creates shares this handle's counters.
#[derive(Clone)]
pub struct MockProvider {
    shared: Arc<MockShared>,
}

impl MockProvider {
    pub fn new(name: &'static str) -> Self {
        Self::with_support(
            name,
            Support {
                a: true,
                aaaa: true,
                line: false,
            },
        )
    }

    pub fn with_support(name: &'static str, support: Support) -> Self {
        Self {
            shared: Arc::new(MockShared {
                name,
                support,
                failing: AtomicBool::new(false),
                failing_fqdns: Mutex::new(Vec::new()),
                inits: AtomicUsize::new(0),
                updates: Mutex::new(Vec::new()),
                cache_watch: Mutex::new(None),
            }),
        }
    }

    pub fn register(&self, registry: &mut ProviderRegistry) {
        let shared = self.shared.clone();
        registry.register(self.shared.name, move || {
            Box::new(MockProvider {
                shared: shared.clone(),
            }) as Box<dyn DnsProvider>
        });
    }

    /// Make every following update fail
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail every update whose batch contains `fqdn`
    pub fn fail_for(&self, fqdn: &str) {
        self.shared.failing_fqdns.lock().unwrap().push(fqdn.to_string());
    }

    /// Record the cache contents at every update
    pub fn watch_cache(&self, cache: MemoryIpCache) {
        *self.shared.cache_watch.lock().unwrap() = Some(cache);
    }

    pub fn init_count(&self) -> usize {
        self.shared.inits.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.shared.updates.lock().unwrap().len()
    }

    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.shared.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.shared.name
    }

    fn description(&self) -> &'static str {
        "Mock provider for contract tests"
    }

    fn sign_up_url(&self) -> &'static str {
        "https://mock.example.com"
    }

    fn support(&self) -> Support {
        self.shared.support
    }

    fn config_items(&self) -> Vec<ConfigItemSpec> {
        Vec::new()
    }

    fn init(&mut self, _settings: &Settings, _domains: &[Domain]) -> Result<()> {
        self.shared.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(
        &mut self,
        _cancel: &CancelToken,
        record_type: RecordType,
        ip: IpAddr,
        domains: &mut [Domain],
    ) -> Result<()> {
        let watched = self.shared.cache_watch.lock().unwrap().clone();
        let cached = match watched {
            Some(cache) => {
                let family = match record_type {
                    RecordType::A => IpFamily::V4,
                    RecordType::Aaaa => IpFamily::V6,
                };
                cache.load(family).await?
            }
            None => None,
        };

        let fqdns: Vec<String> = domains.iter().map(Domain::fqdn).collect();
        let batch_fails = {
            let failing_fqdns = self.shared.failing_fqdns.lock().unwrap();
            fqdns.iter().any(|fqdn| failing_fqdns.contains(fqdn))
        };

        self.shared.updates.lock().unwrap().push(UpdateCall {
            record_type,
            ip,
            fqdns,
            cached,
        });

        if batch_fails || self.shared.failing.load(Ordering::SeqCst) {
            return Err(Error::provider(self.shared.name, "simulated failure"));
        }

        for domain in domains.iter_mut() {
            domain.update_status = UpdateStatus::Success;
        }
        Ok(())
    }
}

/// An alert sink that counts deliveries
#[derive(Clone, Default)]
pub struct CountingAlertSink {
    messages: Arc<Mutex<Vec<(String, AlertMessage)>>>,
}

impl CountingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<(String, AlertMessage)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for CountingAlertSink {
    async fn send(&self, topic: &str, message: &AlertMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), message.clone()));
        Ok(())
    }
}

/// Everything a contract test needs to drive the engine
pub struct Harness {
    pub engine: DdnsEngine,
    pub ip_source: ScriptedIpSource,
    pub resolver: ScriptedResolver,
    pub cache: MemoryIpCache,
    pub alerts: CountingAlertSink,
}

impl Harness {
    /// Engine over `providers`, with every collaborator scripted
    pub fn new(providers: &[&MockProvider]) -> Self {
        let mut registry = ProviderRegistry::new();
        for provider in providers {
            provider.register(&mut registry);
        }

        let ip_source = ScriptedIpSource::new();
        let resolver = ScriptedResolver::new();
        let cache = MemoryIpCache::new();
        let alerts = CountingAlertSink::new();

        let engine = DdnsEngine::new(Arc::new(registry))
            .with_ip_source(Arc::new(ip_source.clone()))
            .with_record_resolver(Arc::new(resolver.clone()))
            .with_ip_cache(Arc::new(cache.clone()))
            .with_alert_sink(Arc::new(alerts.clone()));

        Self {
            engine,
            ip_source,
            resolver,
            cache,
            alerts,
        }
    }
}

/// Configuration with IPv4 enabled and the given services
pub fn ipv4_config(services: Vec<DnsService>) -> Config {
    let mut config = Config::default();
    config.ipv4.enabled = true;
    config.dns_services = services;
    config
}

/// Configuration with both families enabled and the given services
pub fn dual_stack_config(services: Vec<DnsService>) -> Config {
    let mut config = ipv4_config(services);
    config.ipv6.enabled = true;
    config
}

/// Statuses of one service's domains for `family`
pub fn statuses(
    domains: &ddnsync_core::Domains,
    family: IpFamily,
    service: &str,
) -> Vec<UpdateStatus> {
    domains.domains(family)[service]
        .iter()
        .map(|domain| domain.update_status)
        .collect()
}
