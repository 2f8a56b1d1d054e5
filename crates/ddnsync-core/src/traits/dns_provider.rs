// # DNS Provider Trait
//
// Defines the plugin interface for DNS provider integrations.
//
// ## Implementations
//
// - Cloudflare: `ddnsync-provider-cloudflare` crate
// - Any other provider: implement `DnsProvider`, then register a factory
//   with `ProviderRegistry::register`
//
// ## Lifecycle
//
// ```rust,ignore
// let mut provider = registry.create("cloudflare").unwrap();
// provider.init(&service.settings, &batch)?;
// provider.update(&cancel, RecordType::A, ip, &mut batch).await?;
// // every domain in `batch` now carries its UpdateStatus
// ```

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::cancel::CancelToken;
use crate::domain::Domain;

/// Opaque provider settings, as written in the configuration document
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// DNS record type written by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags a provider advertises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Support {
    /// Can write A records
    pub a: bool,
    /// Can write AAAA records
    pub aaaa: bool,
    /// Understands routing lines
    pub line: bool,
}

impl Support {
    pub fn record_type(&self, record_type: RecordType) -> bool {
        match record_type {
            RecordType::A => self.a,
            RecordType::Aaaa => self.aaaa,
        }
    }
}

/// One settings key a provider expects, for configuration UIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigItemSpec {
    /// Key in the service's `settings` map
    pub key: &'static str,
    /// Human readable label
    pub label: &'static str,
    /// Must be present for `init` to succeed
    pub required: bool,
    /// Should be masked when displayed
    pub secret: bool,
}

impl ConfigItemSpec {
    pub const fn required(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: true,
            secret: false,
        }
    }

    pub const fn optional(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: false,
            secret: false,
        }
    }

    pub const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Trait for DNS provider plugins
///
/// The engine creates a fresh instance per service per cycle, calls
/// [`DnsProvider::init`] once, then [`DnsProvider::update`] once per record
/// type. Instances are never shared between concurrent updates.
///
/// # Contract
///
/// - `update` must set `update_status` on every domain it was given:
///   `Success` after a write, `Unchanged` when the provider already holds the
///   value, `Failed` otherwise. Domains left `Idle` are settled by the engine.
/// - `update` must honor `cancel`; [`CancelToken::guard`] around each request
///   is enough, dropping a `reqwest` future aborts the request.
/// - Network failures are returned as errors, never panics.
/// - No retries and no background tasks: the control loop's next tick is the
///   retry.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Registry name (e.g., "cloudflare")
    fn name(&self) -> &'static str;

    /// One-line description for configuration UIs
    fn description(&self) -> &'static str;

    /// Where to create an account or API credential
    fn sign_up_url(&self) -> &'static str;

    /// Documentation of routing line identifiers, if the provider has lines
    fn line_type_url(&self) -> &'static str {
        ""
    }

    /// Capability flags
    fn support(&self) -> Support;

    /// Settings keys this provider reads
    fn config_items(&self) -> Vec<ConfigItemSpec>;

    /// Prepare for one cycle
    ///
    /// # Parameters
    ///
    /// - `settings`: The service's opaque settings map
    /// - `domains`: The batch that the following `update` calls will receive
    fn init(&mut self, settings: &Settings, domains: &[Domain]) -> Result<(), crate::Error>;

    /// Create or modify the record of every domain in `domains`
    ///
    /// # Parameters
    ///
    /// - `cancel`: Cycle cancellation
    /// - `record_type`: `A` or `AAAA`
    /// - `ip`: The detected address; apply [`Domain::format_ip`] before writing
    /// - `domains`: The batch passed to `init`, statuses updated in place
    async fn update(
        &mut self,
        cancel: &CancelToken,
        record_type: RecordType,
        ip: IpAddr,
        domains: &mut [Domain],
    ) -> Result<(), crate::Error>;
}

/// Constructor of provider instances, stored in the registry
pub trait DnsProviderFactory: Send + Sync {
    /// Create a fresh, uninitialized provider
    fn create(&self) -> Box<dyn DnsProvider>;
}

impl<F> DnsProviderFactory for F
where
    F: Fn() -> Box<dyn DnsProvider> + Send + Sync,
{
    fn create(&self) -> Box<dyn DnsProvider> {
        self()
    }
}

/// Read a string setting; empty strings count as absent
pub fn setting_str<'a>(settings: &'a Settings, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Read a boolean setting, accepting `true`/`false` strings as well
pub fn setting_bool(settings: &Settings, key: &str) -> Option<bool> {
    match settings.get(key)? {
        serde_json::Value::Bool(value) => Some(*value),
        serde_json::Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

/// Read an unsigned setting, accepting numeric strings as well
pub fn setting_u64(settings: &Settings, key: &str) -> Option<u64> {
    match settings.get(key)? {
        serde_json::Value::Number(value) => value.as_u64(),
        serde_json::Value::String(value) => value.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> Settings {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn setting_helpers_accept_strings() {
        let s = settings(json!({
            "token": "  abc ",
            "blank": "",
            "proxied": "true",
            "dry_run": false,
            "ttl": "120",
            "port": 53,
        }));

        assert_eq!(setting_str(&s, "token"), Some("abc"));
        assert_eq!(setting_str(&s, "blank"), None);
        assert_eq!(setting_str(&s, "missing"), None);
        assert_eq!(setting_bool(&s, "proxied"), Some(true));
        assert_eq!(setting_bool(&s, "dry_run"), Some(false));
        assert_eq!(setting_u64(&s, "ttl"), Some(120));
        assert_eq!(setting_u64(&s, "port"), Some(53));
        assert_eq!(setting_u64(&s, "token"), None);
    }

    #[test]
    fn support_by_record_type() {
        let support = Support {
            a: true,
            aaaa: false,
            line: false,
        };
        assert!(support.record_type(RecordType::A));
        assert!(!support.record_type(RecordType::Aaaa));
        assert_eq!(RecordType::Aaaa.to_string(), "AAAA");
    }
}
