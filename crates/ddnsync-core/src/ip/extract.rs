//! Address extraction from free-form text
//!
//! Command output and API bodies are scanned for address-looking tokens;
//! every token is validated by the standard parser before it is accepted.

use std::net::{IpAddr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;

use crate::traits::IpFamily;

static IPV4_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("static IPv4 pattern")
});

/// Maximal runs of characters that may appear in an IPv6 address. Labels
/// such as `IPv6:` or `addr:` leave hex digits and colons glued to the
/// front, so each run is narrowed by [`ipv6_in_run`].
static IPV6_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Fa-f:.]+").expect("static IPv6 pattern"));

/// First valid address of `family` appearing in `text`
pub fn first_ip(text: &str, family: IpFamily) -> Option<IpAddr> {
    all_ips(text, family).into_iter().next()
}

/// Every valid address of `family` in `text`, in order of appearance
pub fn all_ips(text: &str, family: IpFamily) -> Vec<IpAddr> {
    match family {
        IpFamily::V4 => IPV4_CANDIDATE
            .find_iter(text)
            .filter_map(|m| m.as_str().parse::<IpAddr>().ok())
            .filter(|ip| family.matches(ip))
            .collect(),
        IpFamily::V6 => IPV6_RUN
            .find_iter(text)
            .filter_map(|m| ipv6_in_run(m.as_str()))
            .map(IpAddr::V6)
            .collect(),
    }
}

/// Address inside one run: the whole run or a suffix starting after a
/// colon, longest first. A global unicast reading wins over any other.
fn ipv6_in_run(run: &str) -> Option<Ipv6Addr> {
    let run = run.trim_matches('.');
    if run.matches(':').count() < 2 {
        return None;
    }

    let suffixes = run.match_indices(':').map(|(i, _)| &run[i + 1..]);
    let mut fallback = None;
    for candidate in std::iter::once(run).chain(suffixes) {
        let Ok(addr) = candidate.parse::<Ipv6Addr>() else {
            continue;
        };
        if is_global_unicast(&addr) {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

/// 2000::/3
fn is_global_unicast(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xe000 == 0x2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_ipv4_in_noise() {
        let text = "inet 999.1.1.1 bogus\ninet 192.0.2.44/24 brd 192.0.2.255 scope global eth0";
        assert_eq!(first_ip(text, IpFamily::V4), "192.0.2.44".parse().ok());
        assert_eq!(all_ips(text, IpFamily::V4).len(), 2);
    }

    #[test]
    fn finds_ipv6_in_noise() {
        let text = "time 12:30:45 inet6 2001:db8:0:1::25/64 scope global dynamic";
        assert_eq!(first_ip(text, IpFamily::V6), "2001:db8:0:1::25".parse().ok());
    }

    #[test]
    fn labels_glued_to_ipv6_are_stripped() {
        let expected = "2001:db8::1".parse().ok();
        assert_eq!(first_ip("IPv6:2001:db8::1", IpFamily::V6), expected);
        assert_eq!(first_ip("v6:2001:db8::1", IpFamily::V6), expected);
        assert_eq!(first_ip("addr:2001:db8::1", IpFamily::V6), expected);
        assert_eq!(first_ip("ip=[2001:db8::1]", IpFamily::V6), expected);
    }

    #[test]
    fn non_global_ipv6_is_still_found() {
        assert_eq!(first_ip("inet6 ::1/128 scope host", IpFamily::V6), "::1".parse().ok());
        assert_eq!(
            first_ip("inet6 fe80::1/64 scope link", IpFamily::V6),
            "fe80::1".parse().ok()
        );
        assert_eq!(first_ip("ether aa:bb:cc:dd:ee:ff", IpFamily::V6), None);
    }

    #[test]
    fn plain_body() {
        assert_eq!(first_ip("203.0.113.9\n", IpFamily::V4), "203.0.113.9".parse().ok());
        assert_eq!(first_ip("203.0.113.9\n", IpFamily::V6), None);
        assert_eq!(first_ip("no address here", IpFamily::V4), None);
    }
}
