//! Configuration types for the ddnsync system
//!
//! The configuration is a YAML document. [`ConfigStore`] owns the live copy;
//! every reader takes a cloned [`ConfigStore::snapshot`] so an in-flight
//! reconciliation cycle never observes a half-applied edit.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::traits::{IpFamily, Settings};
use crate::{Error, Result};

/// Interval used when the configuration does not set one
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Shortest interval the control loop accepts
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default timeout for the command IP source
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

/// Main ddnsync configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kill switch: when set the control loop stays idle
    pub closed: bool,

    /// IPv4 detection settings
    pub ipv4: IpFamilyConfig,

    /// IPv6 detection settings
    pub ipv6: IpFamilyConfig,

    /// Configured provider services and their domains
    pub dns_services: Vec<DnsService>,

    /// Resolver used to check records before writing (`ip` or `ip:port`)
    pub dns_resolver: Option<String>,

    /// Alert settings
    pub notify: NotifyConfig,

    /// Webhooks run after every cycle
    pub webhooks: Vec<Webhook>,

    /// Reconciliation interval in seconds
    pub interval_secs: Option<u64>,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for one address family
    pub fn family(&self, family: IpFamily) -> &IpFamilyConfig {
        match family {
            IpFamily::V4 => &self.ipv4,
            IpFamily::V6 => &self.ipv6,
        }
    }

    /// Enabled services, in configuration order
    pub fn enabled_services(&self) -> impl Iterator<Item = &DnsService> {
        self.dns_services.iter().filter(|service| service.enabled)
    }

    /// Whether the control loop may run with this configuration
    ///
    /// At least one address family must be enabled and at least one enabled
    /// service must carry at least one domain.
    pub fn is_valid(&self) -> bool {
        let family_enabled = self.ipv4.enabled || self.ipv6.enabled;
        let has_domains = self.enabled_services().any(|service| {
            has_entries(&service.ipv4_domains) || has_entries(&service.ipv6_domains)
        });
        family_enabled && has_domains
    }

    /// Effective reconciliation interval (default 5 minutes, floor 1 second)
    pub fn interval(&self) -> Duration {
        match self.interval_secs {
            None => DEFAULT_INTERVAL,
            Some(secs) => Duration::from_secs(secs).max(MIN_INTERVAL),
        }
    }

    /// Validate structural problems that make the document unusable
    ///
    /// An "invalid" (idle) configuration in the [`Config::is_valid`] sense is
    /// not an error here.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for service in &self.dns_services {
            if service.provider.trim().is_empty() {
                return Err(Error::config("DNS service provider cannot be empty"));
            }
            if !keys.insert(service.key()) {
                return Err(Error::config(format!(
                    "Duplicate DNS service name: {}. Set a distinct `name` for each service \
                     using the same provider",
                    service.key()
                )));
            }
        }

        self.ipv4.source.validate()?;
        self.ipv6.source.validate()?;

        for webhook in &self.webhooks {
            if webhook.url.trim().is_empty() {
                return Err(Error::config(format!(
                    "Webhook {} has an empty URL",
                    webhook.name
                )));
            }
        }

        Ok(())
    }
}

fn has_entries(raw: &[String]) -> bool {
    raw.iter().any(|entry| !entry.trim().is_empty())
}

/// Detection settings for one address family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpFamilyConfig {
    /// Whether this family is reconciled at all
    pub enabled: bool,

    /// Where the current address comes from
    pub source: IpSourceConfig,
}

/// Address source for one family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpSourceConfig {
    /// Read the address of a local network interface
    Interface {
        /// Interface to read (e.g., "eth0"); any interface when unset
        #[serde(default)]
        name: Option<String>,
        /// Include/exclude patterns
        #[serde(default)]
        filter: InterfaceFilter,
    },

    /// Ask an HTTP "what is my IP" service
    Api {
        /// Endpoint to query; built-in endpoints when unset
        #[serde(default)]
        url: Option<String>,
    },

    /// Run a local command and scan its output
    Command {
        /// Command line, run through the platform shell
        command: String,
        /// Environment overrides
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Timeout in seconds (default 10)
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<()> {
        match self {
            IpSourceConfig::Command { command, .. } => {
                if command.trim().is_empty() {
                    return Err(Error::config("Command IP source command cannot be empty"));
                }
                Ok(())
            }
            IpSourceConfig::Api { url: Some(url) } => {
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(Error::config(format!(
                        "API IP source URL must use HTTP or HTTPS scheme. Got: {url}"
                    )));
                }
                Ok(())
            }
            IpSourceConfig::Interface { filter, .. } => filter.validate(),
            IpSourceConfig::Api { url: None } => Ok(()),
        }
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        IpSourceConfig::Api { url: None }
    }
}

/// Include/exclude regular expressions for interface addresses
///
/// A candidate matches a pattern when the pattern matches either the
/// interface name or the address text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceFilter {
    pub include: Option<String>,
    pub exclude: Option<String>,
}

impl InterfaceFilter {
    pub fn validate(&self) -> Result<()> {
        for pattern in [&self.include, &self.exclude].into_iter().flatten() {
            regex::Regex::new(pattern).map_err(|e| {
                Error::config(format!("Invalid interface filter pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// One configured use of a DNS provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsService {
    /// Distinct name when the same provider is configured more than once
    #[serde(default)]
    pub name: Option<String>,

    /// Registry name of the provider plugin (e.g., "cloudflare")
    pub provider: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Opaque provider settings, interpreted by the plugin only
    #[serde(default)]
    pub settings: Settings,

    /// Raw IPv4 domain entries
    #[serde(default)]
    pub ipv4_domains: Vec<String>,

    /// Raw IPv6 domain entries
    #[serde(default)]
    pub ipv6_domains: Vec<String>,
}

impl DnsService {
    /// Create a service for `provider` with no domains
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            name: None,
            provider: provider.into(),
            enabled: true,
            settings: Settings::new(),
            ipv4_domains: Vec::new(),
            ipv6_domains: Vec::new(),
        }
    }

    /// Set a distinct service name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a provider setting
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Set the IPv4 domain entries
    pub fn with_ipv4_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ipv4_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Set the IPv6 domain entries
    pub fn with_ipv6_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ipv6_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Key used by the domain maps and in reports
    pub fn key(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.provider)
    }

    /// Raw domain entries for one family
    pub fn domains(&self, family: IpFamily) -> &[String] {
        match family {
            IpFamily::V4 => &self.ipv4_domains,
            IpFamily::V6 => &self.ipv6_domains,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// When alerts are sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyMode {
    #[default]
    Disabled,
    OnError,
    Always,
}

/// Alert settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub mode: NotifyMode,
    pub html_template: String,
    pub markdown_template: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            mode: NotifyMode::Disabled,
            html_template: DEFAULT_HTML_TEMPLATE.to_string(),
            markdown_template: DEFAULT_MARKDOWN_TEMPLATE.to_string(),
        }
    }
}

const DEFAULT_HTML_TEMPLATE: &str = "<h3>DDNS update</h3>\
<p>IPv4 #{ipv4Addr}: #{ipv4Result}<br/>#{ipv4Providers}</p>\
<p>IPv6 #{ipv6Addr}: #{ipv6Result}<br/>#{ipv6Providers}</p>\
<p>#{error}</p>";

const DEFAULT_MARKDOWN_TEMPLATE: &str = "### DDNS update\n\n\
- IPv4 #{ipv4Addr}: #{ipv4Result} (#{ipv4Providers})\n\
- IPv6 #{ipv6Addr}: #{ipv6Result} (#{ipv6Providers})\n\n\
#{error}\n";

/// One outbound HTTP call made after every cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Webhook {
    pub name: String,
    /// HTTP method; GET for an empty body, POST otherwise when unset
    pub method: Option<String>,
    /// URL template
    pub url: String,
    /// Body template
    pub body: String,
    /// Header template, one `Key: Value` per line
    pub headers: String,
}

/// Owner of the live configuration
///
/// Readers get cloned snapshots; writers replace the whole document.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Config>,
}

impl ConfigStore {
    /// Load the configuration file at `path`
    ///
    /// A missing file yields the default (idle) configuration so a fresh
    /// install can be configured through [`ConfigStore::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = read_config(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(config),
        })
    }

    /// A store with no backing file
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Consistent copy of the current configuration
    pub fn snapshot(&self) -> Config {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the backing file; a store without a file keeps its contents
    pub fn reload(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let config = read_config(path)?;
            self.replace(config);
            tracing::debug!("Reloaded configuration from {}", path.display());
        }
        Ok(())
    }

    /// Swap in a new configuration without touching the backing file
    pub fn replace(&self, config: Config) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Validate, persist atomically, then swap in `config`
    pub fn save(&self, config: Config) -> Result<()> {
        config.validate()?;

        if let Some(path) = &self.path {
            let yaml = serde_yaml::to_string(&config)?;

            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            // Write to temporary file first, then rename over the original
            let mut temp = path.clone();
            temp.set_extension("yaml.tmp");
            std::fs::write(&temp, yaml.as_bytes()).map_err(|e| {
                Error::config(format!(
                    "Failed to write temp config {}: {}",
                    temp.display(),
                    e
                ))
            })?;
            std::fs::rename(&temp, path).map_err(|e| {
                Error::config(format!(
                    "Failed to rename {} to {}: {}",
                    temp.display(),
                    path.display(),
                    e
                ))
            })?;
            tracing::info!("Configuration saved to {}", path.display());
        }

        self.replace(config);
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(
            "Configuration file {} does not exist, starting idle",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = serde_yaml::from_str(&content).map_err(|e| {
        Error::config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r##"
ipv4:
  enabled: true
  source:
    type: interface
    name: eth0
    filter:
      exclude: "^10\\."
ipv6:
  enabled: false
  source:
    type: command
    command: "ip -6 addr show dev eth0"
    timeout_secs: 3
dns_services:
  - provider: cloudflare
    settings:
      api_token: secret
      proxied: false
    ipv4_domains:
      - home.example.com
      - "example.org?line=telecom"
notify:
  mode: on-error
webhooks:
  - name: chat
    url: "https://hooks.example.net/post?ip=#{ipv4Addr}"
    body: '{"text": "#{ipv4Result}"}'
interval_secs: 60
"##;

    #[test]
    fn parses_sample_document() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();

        assert!(config.ipv4.enabled);
        assert_eq!(
            config.ipv4.source,
            IpSourceConfig::Interface {
                name: Some("eth0".to_string()),
                filter: InterfaceFilter {
                    include: None,
                    exclude: Some("^10\\.".to_string()),
                },
            }
        );
        assert!(matches!(
            config.ipv6.source,
            IpSourceConfig::Command {
                timeout_secs: Some(3),
                ..
            }
        ));
        assert_eq!(config.dns_services.len(), 1);
        assert_eq!(config.dns_services[0].key(), "cloudflare");
        assert!(config.dns_services[0].enabled);
        assert_eq!(
            config.dns_services[0].settings["api_token"],
            serde_json::json!("secret")
        );
        assert_eq!(config.notify.mode, NotifyMode::OnError);
        assert!(config.notify.markdown_template.contains("#{ipv4Addr}"));
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert!(config.is_valid());
        config.validate().unwrap();
    }

    #[test]
    fn defaults_to_api_source_and_idle() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.ipv4.source, IpSourceConfig::Api { url: None });
        assert!(!config.is_valid());
        assert_eq!(config.interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn interval_has_floor() {
        let config = Config {
            interval_secs: Some(0),
            ..Config::default()
        };
        assert_eq!(config.interval(), MIN_INTERVAL);
    }

    #[test]
    fn validity_requires_family_and_domains() {
        let mut config = Config::default();
        config
            .dns_services
            .push(DnsService::new("cloudflare").with_ipv6_domains(["v6.example.com"]));
        assert!(!config.is_valid(), "no family enabled");

        config.ipv4.enabled = true;
        assert!(config.is_valid());

        config.dns_services[0].enabled = false;
        assert!(!config.is_valid(), "only disabled services carry domains");
    }

    #[test]
    fn duplicate_service_keys_rejected() {
        let mut config = Config::default();
        config.dns_services.push(DnsService::new("cloudflare"));
        config.dns_services.push(DnsService::new("cloudflare"));
        assert!(config.validate().is_err());

        config.dns_services[1].name = Some("cloudflare-work".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_filter_pattern_rejected() {
        let source = IpSourceConfig::Interface {
            name: None,
            filter: InterfaceFilter {
                include: Some("(".to_string()),
                exclude: None,
            },
        };
        assert!(source.validate().is_err());
    }

    #[test]
    fn store_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ddnsync.yaml");

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.snapshot(), Config::default());

        let mut config = Config::default();
        config.ipv4.enabled = true;
        config
            .dns_services
            .push(DnsService::new("cloudflare").with_ipv4_domains(["a.example.com"]));
        store.save(config.clone()).unwrap();
        assert!(path.exists());

        let reopened = ConfigStore::load(&path).unwrap();
        assert_eq!(reopened.snapshot(), config);

        // Edit on disk, then reload into the first store
        let mut edited = config.clone();
        edited.closed = true;
        std::fs::write(&path, serde_yaml::to_string(&edited).unwrap()).unwrap();
        store.reload().unwrap();
        assert!(store.snapshot().closed);
    }

    #[test]
    fn store_rejects_invalid_save() {
        let store = ConfigStore::in_memory(Config::default());
        let mut config = Config::default();
        config.dns_services.push(DnsService::new(""));
        assert!(store.save(config).is_err());
        assert_eq!(store.snapshot(), Config::default());
    }
}
