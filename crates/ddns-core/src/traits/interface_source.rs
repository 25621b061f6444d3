// # Interface Source Trait
//
// Defines the interface for reading the current IPv4 address of router
// interfaces.
//
// ## Implementations
//
// - OPNsense diagnostics API: `ddns-ip-opnsense` crate
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::InterfaceSource;
//
// // logical name -> router interface name
// let mapping = BTreeMap::from([("wan".to_string(), "igb0".to_string())]);
// let addresses = source.fetch(&mapping).await?;
// if let Some(ip) = addresses.get("wan") {
//     println!("wan is {ip}");
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Trait for interface address sources
///
/// # Trust Level: Semi-Trusted
///
/// Sources query the router once per [`fetch`](InterfaceSource::fetch) call
/// and hold no cache. Callers decide the cadence.
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    /// Resolve logical interface names to their current IPv4 address
    ///
    /// `mapping` maps logical names to router-side interface names. Logical
    /// names whose interface is missing from the router response, or which
    /// carry no usable address, are omitted from the result with a warning.
    /// An empty result is not an error.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Upstream`] on transport failure or a non-2xx status.
    async fn fetch(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Ipv4Addr>, crate::Error>;

    /// Whether the router API is reachable within `timeout`
    ///
    /// Never fails; every problem maps to `false`.
    async fn health_check(&self, timeout: Duration) -> bool;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing interface sources from configuration
pub trait InterfaceSourceFactory: Send + Sync {
    /// Create an InterfaceSource instance from configuration
    fn create(&self, config: &crate::DdnsConfig) -> Result<Box<dyn InterfaceSource>, crate::Error>;
}
