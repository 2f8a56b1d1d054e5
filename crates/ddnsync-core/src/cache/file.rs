// # File IP Cache
//
// File-based implementation of IpCache with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "ipv4": "203.0.113.7",
//   "ipv6": null,
//   "updated_at": "2026-01-09T12:00:00Z"
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::{IpCache, IpFamily};

/// Cache file format version
const CACHE_FILE_VERSION: &str = "1.0";

/// File-based IP cache with crash recovery
///
/// Every `store` is written through to disk before it returns.
///
/// # Example
///
/// ```rust,no_run
/// use ddnsync_core::cache::FileIpCache;
/// use ddnsync_core::traits::{IpCache, IpFamily};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = FileIpCache::new("/var/lib/ddnsync/ip_cache.json").await?;
///     cache.store(IpFamily::V4, "203.0.113.7".parse()?).await?;
///     assert_eq!(cache.load(IpFamily::V4).await?, Some("203.0.113.7".parse()?));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileIpCache {
    path: PathBuf,
    state: Mutex<CacheFileFormat>,
}

/// Serializable cache file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheFileFormat {
    version: String,
    #[serde(default)]
    ipv4: Option<IpAddr>,
    #[serde(default)]
    ipv6: Option<IpAddr>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl CacheFileFormat {
    fn empty() -> Self {
        Self {
            version: CACHE_FILE_VERSION.to_string(),
            ..Self::default()
        }
    }

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

impl FileIpCache {
    /// Create or load a file IP cache
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing cache file
    /// 3. If it is corrupted, try the backup
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let state = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<CacheFileFormat, Error> {
        match Self::load_file(path).await {
            Ok(state) => Ok(state),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "IP cache file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty IP cache.");
                    return Ok(CacheFileFormat::empty());
                }

                match Self::load_file(&backup_path).await {
                    Ok(state) => {
                        tracing::info!("Recovered IP cache from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore IP cache file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(state)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty IP cache.",
                            backup_err
                        );
                        Ok(CacheFileFormat::empty())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load_file(path: &Path) -> Result<CacheFileFormat, Error> {
        if !path.exists() {
            tracing::debug!("IP cache file does not exist: {}", path.display());
            return Ok(CacheFileFormat::empty());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to read IP cache file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state: CacheFileFormat = serde_json::from_str(&content)?;

        if state.version != CACHE_FILE_VERSION {
            tracing::warn!(
                "IP cache version mismatch: expected {}, got {}. Attempting to load anyway.",
                CACHE_FILE_VERSION,
                state.version
            );
        }

        Ok(state)
    }

    /// Write `state` to the backing file atomically
    async fn write_file(&self, state: &CacheFileFormat) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create IP cache backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("IP cache written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl IpCache for FileIpCache {
    async fn load(&self, family: IpFamily) -> Result<Option<IpAddr>, Error> {
        let state = self.state.lock().await;
        Ok(state.get(family))
    }

    async fn store(&self, family: IpFamily, ip: IpAddr) -> Result<(), Error> {
        // Held across the write so concurrent stores hit the disk in order
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        *next.slot(family) = Some(ip);
        next.updated_at = Some(Utc::now());

        self.write_file(&next).await?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_cache_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip_cache.json");

        let cache = FileIpCache::new(&path).await.unwrap();
        assert_eq!(cache.load(IpFamily::V4).await.unwrap(), None);

        let v4: IpAddr = "203.0.113.7".parse().unwrap();
        cache.store(IpFamily::V4, v4).await.unwrap();
        assert_eq!(cache.load(IpFamily::V4).await.unwrap(), Some(v4));
        assert_eq!(cache.load(IpFamily::V6).await.unwrap(), None);
        assert!(path.exists());

        // Load new instance and verify persistence
        let reopened = FileIpCache::new(&path).await.unwrap();
        assert_eq!(reopened.load(IpFamily::V4).await.unwrap(), Some(v4));
    }

    #[tokio::test]
    async fn test_file_cache_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state/ip_cache.json");

        let cache = FileIpCache::new(&path).await.unwrap();
        cache
            .store(IpFamily::V6, "2001:db8::7".parse().unwrap())
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_cache_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip_cache.json");

        let cache = FileIpCache::new(&path).await.unwrap();
        let first: IpAddr = "203.0.113.1".parse().unwrap();
        let second: IpAddr = "203.0.113.2".parse().unwrap();
        cache.store(IpFamily::V4, first).await.unwrap();
        // Second write leaves the first in the backup
        cache.store(IpFamily::V4, second).await.unwrap();
        assert!(FileIpCache::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileIpCache::new(&path).await.unwrap();
        assert_eq!(recovered.load(IpFamily::V4).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_file_cache_corrupted_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ip_cache.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let cache = FileIpCache::new(&path).await.unwrap();
        assert_eq!(cache.load(IpFamily::V4).await.unwrap(), None);
    }
}
