// # DNS Provider Trait
//
// Defines the raw, single-shot interface to a DNS provider's record-set API.
//
// ## Implementations
//
// - Hetzner Cloud DNS: `ddns-provider-hetzner` crate
//
// ## Usage
//
// Providers are not called directly by the engine. They are wrapped in
// [`crate::RecordSync`], which adds zone caching, rate limiting, retries and
// the set-equality sync decision:
//
// ```rust,ignore
// use ddns_core::{RecordSync, RateLimiter, RetryPolicy};
//
// let sync = RecordSync::new(provider, "example.com", 300, RateLimiter::new(30), RetryPolicy::default());
// let changed = sync.sync("home", &desired, false).await?;
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// The only record type managed by this system
pub const A_RECORD: &str = "A";

/// A DNS zone as known by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Provider-assigned zone identifier
    pub id: String,
    /// Zone name (e.g. "example.com")
    pub name: String,
}

/// A record set: every record sharing one name and type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    /// Zone the set belongs to
    pub zone_id: String,
    /// Name relative to the zone ("@" for the apex)
    pub name: String,
    /// Record type (always "A" here)
    pub record_type: String,
    /// TTL in seconds, if the provider reports one
    pub ttl: Option<u32>,
    /// Current addresses
    pub values: BTreeSet<Ipv4Addr>,
}

/// Trait for DNS provider implementations
///
/// # Trust Level: Untrusted
///
/// Implementations perform exactly one API call per method invocation and
/// report failures as [`crate::Error::Upstream`] with the HTTP status when
/// one was received. They must not:
///
/// - retry or sleep (retries and pacing belong to [`crate::RecordSync`])
/// - cache zone ids or record sets
/// - decide whether a change is needed
/// - spawn tasks
///
/// A provider that retries on its own multiplies the request rate the
/// [`crate::RateLimiter`] is supposed to bound.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Look up a zone by exact name
    ///
    /// Returns `Ok(None)` when the provider knows no zone with that name.
    async fn find_zone(&self, name: &str) -> Result<Option<Zone>, crate::Error>;

    /// Fetch one record set, `Ok(None)` when it does not exist
    async fn get_rrset(
        &self,
        zone_id: &str,
        name: &str,
        record_type: &str,
    ) -> Result<Option<RecordSet>, crate::Error>;

    /// Create an A record set with the given TTL and values
    async fn create_rrset(
        &self,
        zone_id: &str,
        name: &str,
        ttl: u32,
        values: &[Ipv4Addr],
    ) -> Result<(), crate::Error>;

    /// Replace the values of an existing A record set, keeping its TTL
    ///
    /// The replacement must be a single provider-side operation: the set is
    /// never absent while it happens.
    async fn set_rrset_records(
        &self,
        zone_id: &str,
        name: &str,
        values: &[Ipv4Addr],
    ) -> Result<(), crate::Error>;

    /// Delete an A record set
    async fn delete_rrset(&self, zone_id: &str, name: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(&self, config: &crate::DdnsConfig) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
