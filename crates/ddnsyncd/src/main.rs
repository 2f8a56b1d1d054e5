// # ddnsyncd - DDNS Daemon
//
// Thin integration layer around `ddnsync_core::Boot`:
// 1. Reading daemon settings from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering providers and building the engine
// 4. Starting the control loop and reacting to signals
//
// All DDNS logic lives in ddnsync-core.
//
// ## Environment
//
// - `DDNSYNC_CONFIG`: YAML configuration file (default `/etc/ddnsync/config.yaml`)
// - `DDNSYNC_CACHE_DIR`: Directory of the IP and lookup caches (default `/var/lib/ddnsync`)
// - `DDNSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
// - `DDNSYNC_LOOKUP_CACHE_SECS`: Reuse public address lookups for this long (default 0, off)
//
// ## Signals
//
// - SIGHUP: reload the configuration file and restart the loop
// - SIGINT/SIGTERM: stop the loop and exit
//
// ## Example
//
// ```bash
// export DDNSYNC_CONFIG=/etc/ddnsync/config.yaml
// export DDNSYNC_LOG_LEVEL=debug
//
// ddnsyncd
// ```

use anyhow::{Context, Result};
use ddnsync_core::{Boot, ConfigStore, DdnsEngine, FileIpCache, IpDetector, ProviderRegistry};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_CONFIG_PATH: &str = "/etc/ddnsync/config.yaml";
const DEFAULT_CACHE_DIR: &str = "/var/lib/ddnsync";

/// How long shutdown may take before the process exits anyway
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings
#[derive(Debug)]
struct DaemonConfig {
    config_path: PathBuf,
    cache_dir: PathBuf,
    log_level: String,
    lookup_cache_secs: u64,
}

impl DaemonConfig {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        let lookup_cache_secs = match env::var("DDNSYNC_LOOKUP_CACHE_SECS") {
            Ok(value) => value.trim().parse().with_context(|| {
                format!("DDNSYNC_LOOKUP_CACHE_SECS must be a number of seconds. Got: {value}")
            })?,
            Err(_) => 0,
        };

        Ok(Self {
            config_path: env::var("DDNSYNC_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            cache_dir: env::var("DDNSYNC_CACHE_DIR")
                .unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string())
                .into(),
            log_level: env::var("DDNSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            lookup_cache_secs,
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!("DDNSYNC_CONFIG cannot be empty");
        }
        if self.cache_dir.as_os_str().is_empty() {
            anyhow::bail!("DDNSYNC_CACHE_DIR cannot be empty");
        }

        if self.lookup_cache_secs > 86_400 {
            anyhow::bail!(
                "DDNSYNC_LOOKUP_CACHE_SECS must be at most 86400 seconds. Got: {}",
                self.lookup_cache_secs
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let config = match DaemonConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsyncd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let boot = match build(&config).await {
            Ok(boot) => boot,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(boot).await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

fn registry() -> ProviderRegistry {
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    ddnsync_provider_cloudflare::register(&mut registry);

    info!("Registered providers: {}", registry.list_providers().join(", "));
    registry
}

/// Load the configuration and wire the engine
async fn build(config: &DaemonConfig) -> Result<Boot> {
    let store = ConfigStore::load(&config.config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config.config_path.display()
        )
    })?;
    info!("Configuration loaded from {}", config.config_path.display());

    let ip_cache = FileIpCache::new(config.cache_dir.join("ip_cache.json"))
        .await
        .context("Failed to open IP cache")?;

    let mut ip_source = IpDetector::new();
    if config.lookup_cache_secs > 0 {
        ip_source = ip_source.with_lookup_cache(
            config.cache_dir.join("ip_lookup.json"),
            Duration::from_secs(config.lookup_cache_secs),
        );
    }

    let engine = DdnsEngine::new(Arc::new(registry()))
        .with_ip_cache(Arc::new(ip_cache))
        .with_ip_source(Arc::new(ip_source));

    Ok(Boot::new(Arc::new(store), Arc::new(engine)))
}

/// Run until a shutdown signal arrives
async fn run_daemon(boot: Boot) -> Result<()> {
    boot.start().await.context("Failed to start control loop")?;

    let signal = wait_for_shutdown(&boot).await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, boot.stop())
        .await
        .is_err()
    {
        anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT, resetting the loop on every SIGHUP
#[cfg(unix)]
async fn wait_for_shutdown(boot: &Boot) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok("SIGTERM"),
            _ = sigint.recv() => return Ok("SIGINT"),
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                if let Err(e) = boot.reset().await {
                    warn!("Reload failed, keeping the current configuration: {}", e);
                }
            }
        }
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown(_boot: &Boot) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
