//! Plugin-based provider registry
//!
//! The registry allows DNS providers and interface sources to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddns_core::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! ddns_provider_hetzner::register(&registry);
//! ddns_ip_opnsense::register(&registry);
//!
//! let provider = registry.create_provider("hetzner", &config)?;
//! let source = registry.create_interface_source("opnsense", &config)?;
//! ```
//!
//! ## Registration
//!
//! Implementations register themselves under a stable name:
//!
//! ```rust,ignore
//! // In ddns-provider-hetzner
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("hetzner", Box::new(HetznerFactory));
//! }
//! ```

use crate::config::DdnsConfig;
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, InterfaceSource, InterfaceSourceFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of DNS provider and interface source factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,

    /// Registered interface source factories
    interface_sources: RwLock<HashMap<String, Box<dyn InterfaceSourceFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "hetzner")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register an interface source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "opnsense")
    /// - `factory`: Factory object for creating source instances
    pub fn register_interface_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn InterfaceSourceFactory>,
    ) {
        self.interface_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a DNS provider
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `name` is not registered, or whatever the factory returns.
    pub fn create_provider(&self, name: &str, config: &DdnsConfig) -> Result<Box<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {name}")))?;

        factory.create(config)
    }

    /// Create an interface source
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `name` is not registered, or whatever the factory returns.
    pub fn create_interface_source(
        &self,
        name: &str,
        config: &DdnsConfig,
    ) -> Result<Box<dyn InterfaceSource>> {
        let sources = self
            .interface_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown interface source type: {name}")))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered interface source types
    pub fn list_interface_sources(&self) -> Vec<String> {
        let sources = self
            .interface_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if an interface source type is registered
    pub fn has_interface_source(&self, name: &str) -> bool {
        self.interface_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
