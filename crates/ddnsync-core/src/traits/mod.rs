//! Core traits for the ddnsync system
//!
//! This module defines the abstract interfaces at every seam of the engine.
//!
//! - [`DnsProvider`]: Create or modify records via a provider API (plugins)
//! - [`IpSource`]: Detect the current address of one family
//! - [`RecordResolver`]: Live DNS lookup used to skip redundant writes
//! - [`IpCache`]: Persist the last observed address per family
//! - [`AlertSink`]: Hand rendered reports to an alerting subsystem

pub mod alert_sink;
pub mod dns_provider;
pub mod ip_cache;
pub mod ip_source;
pub mod record_resolver;

pub use alert_sink::{AlertMessage, AlertSink};
pub use dns_provider::{
    ConfigItemSpec, DnsProvider, DnsProviderFactory, RecordType, Settings, Support, setting_bool,
    setting_str, setting_u64,
};
pub use ip_cache::IpCache;
pub use ip_source::{IpFamily, IpSource};
pub use record_resolver::RecordResolver;
