// # IP Source Trait
//
// Defines the interface for detecting the current address of one family.
//
// ## Implementations
//
// - `ip::IpDetector`: interface, HTTP API and command sources
// - Test doubles in `tests/common`
//
// Unlike a watcher, an IP source is polled once per reconciliation cycle by
// the engine; failures are returned, never retried internally.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

use crate::cancel::CancelToken;
use crate::config::IpFamilyConfig;
use crate::traits::RecordType;

/// Address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Both families, in reconciliation order
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Record type holding addresses of this family
    pub fn record_type(&self) -> RecordType {
        match self {
            IpFamily::V4 => RecordType::A,
            IpFamily::V6 => RecordType::Aaaa,
        }
    }

    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpFamily::V4 => ip.is_ipv4(),
            IpFamily::V6 => ip.is_ipv6(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::V4 => "ipv4",
            IpFamily::V6 => "ipv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for address detection
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Get the current address of `family`
    ///
    /// # Parameters
    ///
    /// - `family`: Which family to detect
    /// - `config`: That family's source settings
    /// - `cancel`: Cycle cancellation; abandon I/O once it fires
    ///
    /// # Returns
    ///
    /// - `Ok(IpAddr)`: The current address, always of `family`
    /// - `Err(Error)`: If unable to determine the address
    async fn current(
        &self,
        family: IpFamily,
        config: &IpFamilyConfig,
        cancel: &CancelToken,
    ) -> Result<IpAddr, crate::Error>;
}
