//! Cycle reports
//!
//! A [`CycleReport`] is the immutable summary of one reconciliation cycle. It
//! feeds the notification templates through [`CycleReport::tags`] and is
//! kept on the aggregate for observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::domain::{Domain, UpdateStatus};
use crate::engine::Domains;
use crate::error::ProviderFailures;

/// Template tag name to rendered value
pub type Tags = BTreeMap<&'static str, String>;

/// Outcome for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainOutcome {
    pub fqdn: String,
    pub status: UpdateStatus,
}

impl From<&Domain> for DomainOutcome {
    fn from(domain: &Domain) -> Self {
        Self {
            fqdn: domain.fqdn(),
            status: domain.update_status,
        }
    }
}

/// Outcome for one address family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FamilyReport {
    /// Last observed address
    pub addr: Option<IpAddr>,
    /// Aggregate over every domain of the family
    pub status: UpdateStatus,
    /// Per-service outcomes, keyed by service key
    pub providers: BTreeMap<String, Vec<DomainOutcome>>,
}

impl FamilyReport {
    fn build(addr: Option<IpAddr>, domains: &BTreeMap<String, Vec<Domain>>) -> Self {
        let providers: BTreeMap<String, Vec<DomainOutcome>> = domains
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(key, list)| (key.clone(), list.iter().map(DomainOutcome::from).collect()))
            .collect();

        let status = aggregate(
            providers
                .values()
                .flatten()
                .map(|outcome| outcome.status),
        );

        Self {
            addr,
            status,
            providers,
        }
    }

    /// Every domain name, comma separated
    pub fn domains_text(&self) -> String {
        self.providers
            .values()
            .flatten()
            .map(|outcome| outcome.fqdn.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `service: name status, ...` per service, `; ` separated
    pub fn providers_text(&self) -> String {
        self.providers
            .iter()
            .map(|(key, outcomes)| {
                let detail = outcomes
                    .iter()
                    .map(|o| format!("{} {}", o.fqdn, o.status))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{key}: {detail}")
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Aggregate domain statuses: any failed, else any success, else any
/// unchanged, else idle
pub fn aggregate(statuses: impl IntoIterator<Item = UpdateStatus>) -> UpdateStatus {
    let mut seen = [false; 3];
    for status in statuses {
        match status {
            UpdateStatus::Failed => seen[0] = true,
            UpdateStatus::Success => seen[1] = true,
            UpdateStatus::Unchanged => seen[2] = true,
            UpdateStatus::Idle => {}
        }
    }

    if seen[0] {
        UpdateStatus::Failed
    } else if seen[1] {
        UpdateStatus::Success
    } else if seen[2] {
        UpdateStatus::Unchanged
    } else {
        UpdateStatus::Idle
    }
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub ipv4: FamilyReport,
    pub ipv6: FamilyReport,
    /// Provider error messages, in occurrence order
    pub errors: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    pub fn build(domains: &Domains, failures: &ProviderFailures) -> Self {
        Self {
            ipv4: FamilyReport::build(domains.ipv4_addr, &domains.ipv4_domains),
            ipv6: FamilyReport::build(domains.ipv6_addr, &domains.ipv6_domains),
            errors: failures.iter().map(ToString::to_string).collect(),
            finished_at: Utc::now(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Values for every template tag
    pub fn tags(&self) -> Tags {
        let mut tags = Tags::new();
        let families = [
            (&self.ipv4, ["ipv4Addr", "ipv4Result", "ipv4Domains", "ipv4Providers"]),
            (&self.ipv6, ["ipv6Addr", "ipv6Result", "ipv6Domains", "ipv6Providers"]),
        ];
        for (report, [addr, result, domains, providers]) in families {
            tags.insert(addr, report.addr.map(|ip| ip.to_string()).unwrap_or_default());
            tags.insert(result, report.status.to_string());
            tags.insert(domains, report.domains_text());
            tags.insert(providers, report.providers_text());
        }
        tags.insert("error", self.errors.join("; "));
        tags
    }
}
