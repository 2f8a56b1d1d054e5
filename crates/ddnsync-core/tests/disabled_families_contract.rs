//! Contract Test: Disabled Address Families
//!
//! Constraints verified:
//! - With both families disabled a cycle returns Ok and touches nothing
//! - A disabled family is never detected or written
//! - A failed detection skips only its own family

mod common;

use common::*;
use ddnsync_core::config::DnsService;
use ddnsync_core::domain::UpdateStatus;
use ddnsync_core::traits::{IpCache, IpFamily};
use ddnsync_core::CancelToken;

#[tokio::test]
async fn both_families_disabled_touches_nothing() {
    let provider = MockProvider::new("alpha");
    let harness = Harness::new(&[&provider]);
    harness.ip_source.set(IpFamily::V4, ip("203.0.113.10"));

    let mut config = ipv4_config(vec![
        DnsService::new("alpha").with_ipv4_domains(["home.example.com"]),
    ]);
    let mut domains = harness.engine.load_domains(&config).await;
    config.ipv4.enabled = false;

    // A status left over from an earlier cycle must survive untouched
    domains.ipv4_domains.get_mut("alpha").unwrap()[0].update_status = UpdateStatus::Success;

    let result = harness
        .engine
        .update(&mut domains, &config, &CancelToken::never())
        .await;

    tokio_test::assert_ok!(result);
    assert_eq!(harness.ip_source.call_count(), 0);
    assert_eq!(provider.init_count(), 0);
    assert_eq!(provider.update_count(), 0);
    assert_eq!(harness.alerts.count(), 0);
    assert!(domains.last_report.is_none());
    assert_eq!(statuses(&domains, IpFamily::V4, "alpha"), vec![UpdateStatus::Success]);
}

#[tokio::test]
async fn disabled_family_is_never_detected() {
    let provider = MockProvider::new("alpha");
    let harness = Harness::new(&[&provider]);
    harness.ip_source.set(IpFamily::V4, ip("203.0.113.10"));
    harness.ip_source.set(IpFamily::V6, ip("2001:db8::10"));

    let config = ipv4_config(vec![DnsService::new("alpha")
        .with_ipv4_domains(["home.example.com"])
        .with_ipv6_domains(["home6.example.com"])]);
    let mut domains = harness.engine.load_domains(&config).await;

    harness
        .engine
        .update(&mut domains, &config, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(harness.ip_source.calls(), vec![IpFamily::V4]);
    let calls = provider.update_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].fqdns, vec!["home.example.com".to_string()]);
    assert_eq!(statuses(&domains, IpFamily::V6, "alpha"), vec![UpdateStatus::Idle]);
    assert_eq!(harness.cache.load(IpFamily::V6).await.unwrap(), None);
}

#[tokio::test]
async fn failed_detection_skips_only_that_family() {
    let provider = MockProvider::new("alpha");
    let harness = Harness::new(&[&provider]);
    harness.ip_source.fail(IpFamily::V4);
    harness.ip_source.set(IpFamily::V6, ip("2001:db8::10"));

    let config = dual_stack_config(vec![DnsService::new("alpha")
        .with_ipv4_domains(["home.example.com"])
        .with_ipv6_domains(["home6.example.com"])]);
    let mut domains = harness.engine.load_domains(&config).await;

    let result = harness
        .engine
        .update(&mut domains, &config, &CancelToken::never())
        .await;

    // Detection failures are soft
    tokio_test::assert_ok!(result);
    assert_eq!(harness.ip_source.calls(), vec![IpFamily::V4, IpFamily::V6]);
    assert_eq!(statuses(&domains, IpFamily::V4, "alpha"), vec![UpdateStatus::Idle]);
    assert_eq!(statuses(&domains, IpFamily::V6, "alpha"), vec![UpdateStatus::Success]);
    assert_eq!(domains.ipv4_addr, None);
    assert_eq!(domains.ipv6_addr, Some(ip("2001:db8::10")));
}
