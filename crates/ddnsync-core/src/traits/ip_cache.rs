// # IP Cache Trait
//
// Persists the last observed address of each family so a process restart
// does not force a redundant global update.
//
// ## Semantics
//
// The cache records "last observed", not "last successfully published": the
// engine stores a new address before it attempts any provider write. A
// provider that failed will be retried only when the address changes again or
// its record is found stale by the DNS check after a restart.
//
// ## Implementations
//
// - `cache::FileIpCache`: JSON document with atomic writes and backup
// - `cache::MemoryIpCache`: non-persistent, for tests and embedding

use async_trait::async_trait;
use std::net::IpAddr;

use crate::traits::IpFamily;

/// Trait for last-known address storage
///
/// # Trust Level: Trusted (Core Component)
///
/// Only the reconciliation engine writes to the cache. Implementations may do
/// I/O but must not spawn background tasks.
#[async_trait]
pub trait IpCache: Send + Sync {
    /// Last observed address of `family`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(IpAddr))`: The last observed address
    /// - `Ok(None)`: Nothing observed yet
    /// - `Err(Error)`: Storage error
    async fn load(&self, family: IpFamily) -> Result<Option<IpAddr>, crate::Error>;

    /// Record a newly observed address, durably
    async fn store(&self, family: IpFamily, ip: IpAddr) -> Result<(), crate::Error>;
}
