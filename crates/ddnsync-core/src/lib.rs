// # ddnsync-core
//
// Core library for the interval-driven DDNS reconciliation system.
//
// ## Architecture Overview
//
// - **IpSource**: Detects the current address of one family (interface, API, command)
// - **DnsProvider**: Plugin trait for writing records via provider APIs
// - **RecordResolver**: Live DNS lookup used to skip redundant writes
// - **IpCache**: Persists the last observed address per family
// - **DdnsEngine**: Runs one reconciliation cycle over the domain aggregate
// - **ProviderRegistry**: Name to factory map populated by provider crates
// - **Notifier**: Webhooks and alerts after every cycle
// - **Boot**: Owns the single background loop (start/stop/reset)
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider implementations
// 2. **Interval-Driven**: One sequential cycle per tick, the next tick is the retry
// 3. **Plugin-Based**: Providers are registered by name, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin shell around `Boot`
// 5. **Fail Open**: When unsure whether a record is current, write it

pub mod boot;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ip;
pub mod notify;
pub mod registry;
pub mod resolver;
pub mod traits;

// Re-export core types for convenience
pub use boot::Boot;
pub use cache::{FileIpCache, MemoryIpCache};
pub use cancel::{CancelToken, Canceller};
pub use config::{Config, ConfigStore, DnsService, IpFamilyConfig, IpSourceConfig, NotifyMode};
pub use domain::{Domain, UpdateStatus, parse_domains};
pub use engine::{CycleReport, DdnsEngine, Domains};
pub use error::{Error, ProviderFailures, Result};
pub use ip::IpDetector;
pub use notify::{LogAlertSink, Notifier};
pub use registry::{ProviderInfo, ProviderRegistry};
pub use resolver::HickoryRecordResolver;
pub use traits::{AlertSink, DnsProvider, IpCache, IpFamily, IpSource, RecordResolver, RecordType};
