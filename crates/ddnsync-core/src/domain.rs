//! Domain normalization
//!
//! Turns user-supplied entries such as `home.example.co.uk` into a
//! [`Domain`] split at the registrable root (`example.co.uk` / `home`) using
//! the public suffix list.
//!
//! Accepted entry forms:
//!
//! - `sub.example.com` / `example.com`: split with public-suffix rules
//! - `sub:example.com`: explicit split, for roots the suffix list gets wrong
//! - either form followed by `?key=value&...`: `line` and `ipformat` set the
//!   matching fields, any other key lands in [`Domain::extra`]

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use crate::{Error, Result};

/// Placeholder replaced by the raw address in an IP-format template
pub const IP_PLACEHOLDER: &str = "#{ip}";

/// Outcome of the last reconciliation attempt for one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// Not attempted this cycle
    #[default]
    Idle,
    /// Record already held the address
    Unchanged,
    /// Record written
    Success,
    /// Write attempted and failed
    Failed,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::Unchanged => "unchanged",
            UpdateStatus::Success => "success",
            UpdateStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One DNS record target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Domain {
    /// Registrable root, e.g. `example.com`
    pub domain_name: String,
    /// Labels left of the root; empty for the apex
    pub sub_domain: String,
    /// Routing line selector
    pub line: Option<String>,
    /// Template applied to the address before writing
    pub ip_format: Option<String>,
    pub update_status: UpdateStatus,
    /// Provider-specific parameters
    pub extra: BTreeMap<String, String>,
}

impl Domain {
    pub fn new(domain_name: impl Into<String>, sub_domain: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            sub_domain: sub_domain.into(),
            ..Self::default()
        }
    }

    /// Whether this is the apex of its root
    pub fn is_apex(&self) -> bool {
        self.sub_domain.is_empty()
    }

    /// Fully qualified name without the trailing dot
    pub fn fqdn(&self) -> String {
        if self.is_apex() {
            self.domain_name.clone()
        } else {
            format!("{}.{}", self.sub_domain, self.domain_name)
        }
    }

    /// Sub-domain, or `apex` for the apex (e.g. `"@"` for most provider APIs)
    pub fn host_or<'a>(&'a self, apex: &'a str) -> &'a str {
        if self.is_apex() { apex } else { &self.sub_domain }
    }

    /// Value to write for `ip`, after the IP-format template
    pub fn format_ip(&self, ip: IpAddr) -> String {
        match self.ip_format.as_deref() {
            Some(template) if !template.trim().is_empty() => {
                template.replace(IP_PLACEHOLDER, &ip.to_string())
            }
            _ => ip.to_string(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_apex() {
            f.write_str(&self.domain_name)
        } else {
            write!(f, "{}.{}", self.sub_domain, self.domain_name)
        }
    }
}

/// Parse raw domain entries
///
/// Blank entries are skipped. The first invalid entry fails the whole call;
/// no partial list is returned.
pub fn parse_domains<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Domain>> {
    let mut domains = Vec::with_capacity(raw.len());
    for entry in raw {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }
        domains.push(parse_domain(entry)?);
    }
    Ok(domains)
}

/// Parse a single, non-blank entry
pub fn parse_domain(entry: &str) -> Result<Domain> {
    let (name, params) = match entry.split_once('?') {
        Some((name, params)) => (name.trim(), Some(params)),
        None => (entry.trim(), None),
    };

    let mut domain = match name.split_once(':') {
        Some((sub, root)) => {
            let root = normalize_name(root, entry)?;
            let sub = sub.trim().trim_matches('.').to_ascii_lowercase();
            Domain::new(root, sub)
        }
        None => split_registrable(&normalize_name(name, entry)?),
    };

    if let Some(params) = params {
        apply_params(&mut domain, params);
    }

    Ok(domain)
}

/// Lowercase, drop the trailing dot, and require at least two non-empty labels
fn normalize_name(name: &str, entry: &str) -> Result<String> {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = name.split('.').collect();

    if labels.len() < 2 {
        return Err(Error::invalid_domain(format!(
            "{entry:?} needs at least two labels (e.g. example.com)"
        )));
    }
    if labels.iter().any(|label| label.is_empty()) {
        return Err(Error::invalid_domain(format!("{entry:?} has an empty label")));
    }

    Ok(name)
}

fn split_registrable(name: &str) -> Domain {
    let root = match psl::domain_str(name) {
        Some(root) => root.to_string(),
        None => {
            // The name is itself a public suffix (e.g. `co.uk`); treat its last
            // two labels as the root.
            let labels: Vec<&str> = name.rsplitn(3, '.').collect();
            format!("{}.{}", labels[1], labels[0])
        }
    };

    let sub = name
        .strip_suffix(root.as_str())
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_string();

    Domain::new(root, sub)
}

fn apply_params(domain: &mut Domain, params: &str) {
    for pair in params.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (pair.trim(), ""),
        };
        if key.is_empty() {
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "line" => domain.line = Some(value.to_string()).filter(|v| !v.is_empty()),
            "ipformat" | "ip_format" => {
                domain.ip_format = Some(value.to_string()).filter(|v| !v.is_empty())
            }
            _ => {
                domain.extra.insert(key.to_string(), value.to_string());
            }
        }
    }
}
