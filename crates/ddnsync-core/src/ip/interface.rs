//! Interface address source
//!
//! Enumerates local interfaces through `pnet::datalink` and picks the first
//! usable address of the wanted family.
//!
//! Usable means: the interface is up, and the address is
//! - IPv4: not loopback, link-local, multicast, broadcast or unspecified
//! - IPv6: inside the global unicast range `2000::/3`

use pnet::datalink;
use regex::Regex;
use std::net::{IpAddr, Ipv6Addr};

use crate::config::InterfaceFilter;
use crate::traits::IpFamily;
use crate::{Error, Result};

/// One address found on a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub interface: String,
    pub ip: IpAddr,
}

impl Candidate {
    pub fn new(interface: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            interface: interface.into(),
            ip,
        }
    }
}

/// Addresses of every interface that is up, in enumeration order
pub fn enumerate() -> Vec<Candidate> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up())
        .flat_map(|iface| {
            let name = iface.name.clone();
            iface
                .ips
                .into_iter()
                .map(move |net| Candidate::new(name.clone(), net.ip()))
        })
        .collect()
}

/// Detect from the live interface list
pub fn detect(family: IpFamily, name: Option<&str>, filter: &InterfaceFilter) -> Result<IpAddr> {
    select(&enumerate(), family, name, filter)
}

/// Pick the first usable candidate
///
/// # Parameters
///
/// - `name`: Only consider this interface when set
/// - `filter`: `include` must match and `exclude` must not, where a pattern
///   matches when it matches the interface name or the address text
pub fn select(
    candidates: &[Candidate],
    family: IpFamily,
    name: Option<&str>,
    filter: &InterfaceFilter,
) -> Result<IpAddr> {
    let include = compile(filter.include.as_deref())?;
    let exclude = compile(filter.exclude.as_deref())?;

    let name = name.map(str::trim).filter(|name| !name.is_empty());
    if let Some(name) = name
        && !candidates.iter().any(|c| c.interface == name)
    {
        return Err(Error::ip_detect(format!(
            "Interface {name} not found or not up"
        )));
    }

    candidates
        .iter()
        .filter(|c| name.is_none_or(|name| c.interface == name))
        .filter(|c| family.matches(&c.ip) && is_usable(&c.ip))
        .filter(|c| include.as_ref().is_none_or(|re| matches(re, c)))
        .filter(|c| !exclude.as_ref().is_some_and(|re| matches(re, c)))
        .map(|c| c.ip)
        .next()
        .ok_or_else(|| {
            Error::ip_detect(format!(
                "No usable {family} address on {}",
                name.unwrap_or("any interface")
            ))
        })
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p)
                .map_err(|e| Error::config(format!("Invalid interface filter pattern {p:?}: {e}")))
        })
        .transpose()
}

fn matches(re: &Regex, candidate: &Candidate) -> bool {
    re.is_match(&candidate.interface) || re.is_match(&candidate.ip.to_string())
}

/// Whether `ip` can be published as a public record
pub fn is_usable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_broadcast()
                || v4.is_unspecified())
        }
        IpAddr::V6(v6) => is_global_unicast_v6(v6),
    }
}

fn is_global_unicast_v6(ip: &Ipv6Addr) -> bool {
    // 2000::/3
    ip.segments()[0] & 0xe000 == 0x2000
}
