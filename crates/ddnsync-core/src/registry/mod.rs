//! Plugin-based provider registry
//!
//! The registry maps provider names to factories so the engine can build a
//! fresh provider per service per cycle, without hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddnsync_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! ddnsync_provider_cloudflare::register(&mut registry);
//!
//! // Shared read-only from here on
//! let engine = DdnsEngine::new(Arc::new(registry));
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut ProviderRegistry) {
//!     registry.register("cloudflare", || {
//!         Box::new(CloudflareProvider::new()) as Box<dyn DnsProvider>
//!     });
//! }
//! ```

use serde::Serialize;
use std::collections::HashMap;

use crate::traits::{ConfigItemSpec, DnsProvider, DnsProviderFactory, Support};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// Registration takes `&mut self` and happens during startup. Afterwards the
/// registry is shared behind an `Arc` and only read.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn DnsProviderFactory>>,
}

/// What a registered provider advertises
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub description: &'static str,
    pub sign_up_url: &'static str,
    pub line_type_url: &'static str,
    pub support: Support,
    pub config_items: Vec<ConfigItemSpec>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// Registering a name twice replaces the earlier factory.
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name used in `DnsService::provider` (e.g., "cloudflare")
    /// - `factory`: Constructor of fresh provider instances
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: DnsProviderFactory + 'static,
    {
        let name = name.into();
        if self.providers.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::debug!("Replaced DNS provider factory: {}", name);
        } else {
            tracing::debug!("Registered DNS provider: {}", name);
        }
    }

    /// Create a fresh provider instance
    ///
    /// # Returns
    ///
    /// - `Some(Box<dyn DnsProvider>)`: A new, uninitialized provider
    /// - `None`: If no provider is registered under `name`
    pub fn create(&self, name: &str) -> Option<Box<dyn DnsProvider>> {
        self.providers.get(name).map(|factory| factory.create())
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata of every registered provider, sorted by name
    pub fn descriptors(&self) -> Vec<ProviderInfo> {
        self.list_providers()
            .into_iter()
            .filter_map(|name| {
                let provider = self.create(&name)?;
                Some(ProviderInfo {
                    description: provider.description(),
                    sign_up_url: provider.sign_up_url(),
                    line_type_url: provider.line_type_url(),
                    support: provider.support(),
                    config_items: provider.config_items(),
                    name,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}
