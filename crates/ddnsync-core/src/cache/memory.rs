// # Memory IP Cache
//
// In-memory implementation of IpCache.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - The first cycle after a restart treats both families as changed and
//   falls back to the live DNS check to avoid redundant writes

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::{IpCache, IpFamily};

/// In-memory IP cache
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryIpCache {
    inner: Arc<RwLock<Slots>>,
}

#[derive(Debug, Default)]
struct Slots {
    ipv4: Option<IpAddr>,
    ipv6: Option<IpAddr>,
}

impl Slots {
    fn get(&self, family: IpFamily) -> Option<IpAddr> {
        match family {
            IpFamily::V4 => self.ipv4,
            IpFamily::V6 => self.ipv6,
        }
    }

    fn slot(&mut self, family: IpFamily) -> &mut Option<IpAddr> {
        match family {
            IpFamily::V4 => &mut self.ipv4,
            IpFamily::V6 => &mut self.ipv6,
        }
    }
}

impl MemoryIpCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both families
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        *guard = Slots::default();
    }
}

#[async_trait]
impl IpCache for MemoryIpCache {
    async fn load(&self, family: IpFamily) -> Result<Option<IpAddr>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(family))
    }

    async fn store(&self, family: IpFamily, ip: IpAddr) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard.slot(family) = Some(ip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_basic() {
        let cache = MemoryIpCache::new();
        assert_eq!(cache.load(IpFamily::V4).await.unwrap(), None);

        let v4: IpAddr = "198.51.100.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        cache.store(IpFamily::V4, v4).await.unwrap();
        cache.store(IpFamily::V6, v6).await.unwrap();

        // Clones see the same slots
        let shared = cache.clone();
        assert_eq!(shared.load(IpFamily::V4).await.unwrap(), Some(v4));
        assert_eq!(shared.load(IpFamily::V6).await.unwrap(), Some(v6));

        cache.clear().await;
        assert_eq!(shared.load(IpFamily::V6).await.unwrap(), None);
    }
}
