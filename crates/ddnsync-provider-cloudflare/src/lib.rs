// # Cloudflare DNS Provider
//
// Writes A and AAAA records through the Cloudflare API v4.
//
// ## Behavior
//
// - One record per domain: looked up by name and type, then created (POST)
//   when missing or modified (PUT) when its content differs
// - Records already holding the formatted address are left alone
// - Zones are looked up by the registrable domain unless `zone_id` is set,
//   and remembered for the rest of the cycle
// - No retries: the control loop's next tick is the retry
//
// ## Settings
//
// | key        | required | default | meaning                              |
// |------------|----------|---------|--------------------------------------|
// | `api_token`| yes      |         | API token with Zone:DNS:Edit         |
// | `zone_id`  | no       | lookup  | Skip the zone lookup                 |
// | `ttl`      | no       | 1       | Record TTL in seconds (1 = automatic)|
// | `proxied`  | no       | false   | Route through the Cloudflare proxy   |
// | `dry_run`  | no       | false   | Look up records but never write      |
//
// ## Security
//
// The API token never appears in logs, errors or `Debug` output.
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddnsync_core::cancel::CancelToken;
use ddnsync_core::domain::{Domain, UpdateStatus};
use ddnsync_core::traits::{
    ConfigItemSpec, DnsProvider, RecordType, Settings, Support, setting_bool, setting_str,
    setting_u64,
};
use ddnsync_core::{Error, ProviderRegistry, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Registry name
pub const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// TTL value Cloudflare treats as "automatic"
const AUTO_TTL: u64 = 1;

/// Cloudflare DNS provider
///
/// Created uninitialized by the registry; [`DnsProvider::init`] reads the
/// service settings.
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Pre-configured zone, skips the lookup
    zone_id: Option<String>,

    ttl: u64,
    proxied: bool,

    /// Dry-run mode: perform lookups but skip POST/PUT
    dry_run: bool,

    client: reqwest::Client,
    api_base: String,

    /// Zone IDs found during this cycle, by zone name
    zones: HashMap<String, String>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("ttl", &self.ttl)
            .field("proxied", &self.proxied)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Default for CloudflareProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    proxied: Option<bool>,
}

impl CloudflareProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            api_token: String::new(),
            zone_id: None,
            ttl: AUTO_TTL,
            proxied: false,
            dry_run: false,
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            zones: HashMap::new(),
        }
    }

    /// Point the provider at another API root (tests, API gateways)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Bring one domain's record in line with `ip`
    async fn sync_record(
        &mut self,
        record_type: RecordType,
        domain: &Domain,
        ip: IpAddr,
    ) -> Result<UpdateStatus> {
        let fqdn = domain.fqdn();
        let content = domain.format_ip(ip);

        let zone_id = self.zone_id_for(&domain.domain_name).await?;
        let existing = self.find_record(&zone_id, &fqdn, record_type).await?;

        if let Some(record) = &existing
            && record.content == content
            && record.proxied.unwrap_or(false) == self.proxied
        {
            tracing::info!("DNS record already has correct value: {} -> {}", fqdn, content);
            return Ok(UpdateStatus::Unchanged);
        }

        let payload = serde_json::json!({
            "type": record_type.as_str(),
            "name": fqdn,
            "content": content,
            "ttl": self.ttl,
            "proxied": self.proxied,
        });

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would {} {} record {} with payload: {}",
                if existing.is_some() { "update" } else { "create" },
                record_type,
                fqdn,
                payload
            );
            return Ok(UpdateStatus::Success);
        }

        let request = match &existing {
            Some(record) => {
                tracing::info!(
                    "Updating DNS record: {} -> {} (was: {})",
                    fqdn,
                    content,
                    record.content
                );
                let url = format!("{}/zones/{}/dns_records/{}", self.api_base, zone_id, record.id);
                self.client.put(url)
            }
            None => {
                tracing::info!("Creating DNS record: {} -> {}", fqdn, content);
                let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
                self.client.post(url)
            }
        };

        let response = request
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;
        let _: DnsRecord = read_result(response, &format!("write {fqdn}")).await?;

        tracing::info!("DNS record written successfully: {} -> {}", fqdn, content);
        Ok(UpdateStatus::Success)
    }

    /// Zone ID of `zone_name`, from settings, this cycle's lookups, or the API
    async fn zone_id_for(&mut self, zone_name: &str) -> Result<String> {
        if let Some(zone_id) = &self.zone_id {
            return Ok(zone_id.clone());
        }
        if let Some(zone_id) = self.zones.get(zone_name) {
            return Ok(zone_id.clone());
        }

        tracing::debug!("Looking up zone ID for domain: {}", zone_name);
        let response = self
            .client
            .get(format!("{}/zones", self.api_base))
            .query(&[("name", zone_name)])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;

        let zones: Vec<Zone> = read_result(response, &format!("zone lookup {zone_name}")).await?;
        let zone = zones.into_iter().next().ok_or_else(|| {
            Error::provider(PROVIDER_NAME, format!("Zone not found: {zone_name}"))
        })?;

        tracing::debug!("Found zone ID for {}", zone_name);
        self.zones.insert(zone_name.to_string(), zone.id.clone());
        Ok(zone.id)
    }

    async fn find_record(
        &self,
        zone_id: &str,
        fqdn: &str,
        record_type: RecordType,
    ) -> Result<Option<DnsRecord>> {
        tracing::debug!("Looking up record: {} (type: {})", fqdn, record_type);

        let response = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
            .query(&[("type", record_type.as_str()), ("name", fqdn)])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {e}")))?;

        let records: Vec<DnsRecord> =
            read_result(response, &format!("record lookup {fqdn}")).await?;
        Ok(records.into_iter().next())
    }
}

/// Check the status code and unwrap the envelope's `result`
async fn read_result<T>(response: reqwest::Response, context: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(status_error(status, context, &body));
    }

    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {e}")))?;
    unwrap_envelope(envelope, context)
}

fn unwrap_envelope<T>(envelope: Envelope<T>, context: &str) -> Result<T> {
    if !envelope.success {
        let detail = envelope
            .errors
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::provider(
            PROVIDER_NAME,
            format!("{context} rejected: {detail}"),
        ));
    }
    envelope.result.ok_or_else(|| {
        Error::provider(
            PROVIDER_NAME,
            format!("{context}: invalid response format, result is missing"),
        )
    })
}

/// Map a non-2xx answer to a provider error
fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {status}"
        ),
        404 => format!("{context}: not found"),
        409 => format!("{context}: conflict, record is being changed elsewhere. Status: {status}"),
        429 => format!("Rate limit exceeded. Status: {status}"),
        500..=599 => format!("Cloudflare server error (transient): {status} - {}", body.trim()),
        _ => format!("{context} failed: {status} - {}", body.trim()),
    };
    Error::provider(PROVIDER_NAME, message)
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn description(&self) -> &'static str {
        "Cloudflare DNS via API v4 (API token with Zone:DNS:Edit)"
    }

    fn sign_up_url(&self) -> &'static str {
        "https://dash.cloudflare.com/profile/api-tokens"
    }

    fn support(&self) -> Support {
        Support {
            a: true,
            aaaa: true,
            line: false,
        }
    }

    fn config_items(&self) -> Vec<ConfigItemSpec> {
        vec![
            ConfigItemSpec::required("api_token", "API Token").secret(),
            ConfigItemSpec::optional("zone_id", "Zone ID"),
            ConfigItemSpec::optional("ttl", "TTL"),
            ConfigItemSpec::optional("proxied", "Proxied"),
            ConfigItemSpec::optional("dry_run", "Dry run"),
        ]
    }

    fn init(&mut self, settings: &Settings, _domains: &[Domain]) -> Result<()> {
        self.api_token = setting_str(settings, "api_token")
            .ok_or_else(|| Error::config("Cloudflare API token is required"))?
            .to_string();
        self.zone_id = setting_str(settings, "zone_id").map(str::to_string);
        self.ttl = setting_u64(settings, "ttl").unwrap_or(AUTO_TTL);
        self.proxied = setting_bool(settings, "proxied").unwrap_or(false);
        self.dry_run = setting_bool(settings, "dry_run").unwrap_or(false);
        self.zones.clear();

        if self.dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }
        Ok(())
    }

    async fn update(
        &mut self,
        cancel: &CancelToken,
        record_type: RecordType,
        ip: IpAddr,
        domains: &mut [Domain],
    ) -> Result<()> {
        let mut failed = Vec::new();

        for domain in domains.iter_mut() {
            match cancel.guard(self.sync_record(record_type, domain, ip)).await {
                Ok(status) => domain.update_status = status,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!("Failed to update {} record of {}: {}", record_type, domain, e);
                    domain.update_status = UpdateStatus::Failed;
                    failed.push(format!("{}: {}", domain.fqdn(), provider_message(e)));
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::provider(PROVIDER_NAME, failed.join(", ")))
        }
    }
}

/// Message of a provider error without the provider prefix
fn provider_message(err: Error) -> String {
    match err {
        Error::Provider { message, .. } => message,
        other => other.to_string(),
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ddnsync_core::ProviderRegistry;
///
/// let mut registry = ProviderRegistry::new();
/// ddnsync_provider_cloudflare::register(&mut registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mut ProviderRegistry) {
    registry.register(PROVIDER_NAME, || {
        Box::new(CloudflareProvider::new()) as Box<dyn DnsProvider>
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> Settings {
        value.as_object().cloned().unwrap()
    }

    fn initialized(value: serde_json::Value) -> CloudflareProvider {
        let mut provider = CloudflareProvider::new();
        provider.init(&settings(value), &[]).unwrap();
        provider
    }

    #[test]
    fn test_init_reads_settings() {
        let provider = initialized(json!({
            "api_token": "token",
            "zone_id": "zone-1",
            "ttl": "300",
            "proxied": true,
        }));

        assert_eq!(provider.zone_id.as_deref(), Some("zone-1"));
        assert_eq!(provider.ttl, 300);
        assert!(provider.proxied);
        assert!(!provider.dry_run);
    }

    #[test]
    fn test_init_defaults() {
        let provider = initialized(json!({ "api_token": "token" }));
        assert_eq!(provider.zone_id, None);
        assert_eq!(provider.ttl, AUTO_TTL);
        assert!(!provider.proxied);
    }

    #[test]
    fn test_init_missing_token() {
        let mut provider = CloudflareProvider::new();
        let err = provider
            .init(&settings(json!({ "api_token": "  " })), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = initialized(json!({ "api_token": "secret_token_12345" }));

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));
    }

    #[tokio::test]
    async fn test_preconfigured_zone_skips_lookup() {
        // Unroutable base: any request would fail
        let mut provider = initialized(json!({ "api_token": "token", "zone_id": "zone-1" }))
            .with_api_base("http://127.0.0.1:9/");
        assert_eq!(provider.api_base, "http://127.0.0.1:9");
        assert_eq!(provider.zone_id_for("example.com").await.unwrap(), "zone-1");
    }

    #[test]
    fn test_status_mapping() {
        let auth = status_error(StatusCode::FORBIDDEN, "zone lookup", "");
        assert!(auth.to_string().contains("Authentication failed"));

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, "write", "");
        assert!(limited.to_string().contains("Rate limit"));

        let server = status_error(StatusCode::BAD_GATEWAY, "write", " upstream ");
        assert!(server.to_string().contains("transient"));
        assert!(server.to_string().ends_with("upstream"));

        let missing = status_error(StatusCode::NOT_FOUND, "record lookup a.example.com", "");
        assert!(matches!(missing, Error::Provider { .. }));
    }

    #[test]
    fn test_envelope_errors_are_reported() {
        let envelope: Envelope<Vec<DnsRecord>> = serde_json::from_value(json!({
            "success": false,
            "errors": [{ "code": 9109, "message": "Invalid access token" }],
            "result": null,
        }))
        .unwrap();

        let err = unwrap_envelope(envelope, "record lookup").unwrap_err();
        assert!(err.to_string().contains("Invalid access token (9109)"));
    }

    #[test]
    fn test_envelope_result() {
        let envelope: Envelope<Vec<DnsRecord>> = serde_json::from_value(json!({
            "success": true,
            "errors": [],
            "result": [{ "id": "rec-1", "content": "203.0.113.7", "proxied": false, "ttl": 1 }],
        }))
        .unwrap();

        let records = unwrap_envelope(envelope, "record lookup").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rec-1");
        assert_eq!(records[0].proxied, Some(false));
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_every_domain() {
        let mut provider = initialized(json!({ "api_token": "token", "zone_id": "zone-1" }))
            .with_api_base("http://127.0.0.1:9");
        let mut domains = vec![
            Domain::new("example.com", "a"),
            Domain::new("example.com", "b"),
        ];

        let err = provider
            .update(
                &CancelToken::never(),
                RecordType::A,
                "203.0.113.7".parse().unwrap(),
                &mut domains,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider { .. }));
        assert!(err.to_string().contains("a.example.com"));
        assert!(
            domains
                .iter()
                .all(|domain| domain.update_status == UpdateStatus::Failed)
        );
    }

    #[test]
    fn test_register() {
        let mut registry = ProviderRegistry::new();
        register(&mut registry);

        let provider = registry.create(PROVIDER_NAME).unwrap();
        assert_eq!(provider.name(), "cloudflare");
        assert!(provider.support().aaaa);
        assert!(provider.config_items().iter().any(|item| item.secret));
    }
}
