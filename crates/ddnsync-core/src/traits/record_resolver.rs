// # Record Resolver Trait
//
// Live DNS lookup of a candidate record, used only to decide whether a
// provider write can be skipped. Callers treat every error as "assume stale"
// and write anyway.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::traits::RecordType;

#[async_trait]
pub trait RecordResolver: Send + Sync {
    /// Resolve the first `record_type` answer for `fqdn`
    ///
    /// # Parameters
    ///
    /// - `fqdn`: Fully qualified name, with or without the trailing dot
    /// - `resolver`: `ip` or `ip:port` of the resolver; system configuration
    ///   when `None`
    /// - `record_type`: `A` or `AAAA`
    async fn resolve(
        &self,
        fqdn: &str,
        resolver: Option<&str>,
        record_type: RecordType,
    ) -> Result<IpAddr, crate::Error>;
}
