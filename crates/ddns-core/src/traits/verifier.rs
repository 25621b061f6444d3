// # Verifier Trait
//
// Propagation check run after a record set changed. Results are advisory:
// they are logged and reported as events but never retried or raised.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Confirms that authoritative nameservers serve the expected addresses
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Check `hostname` in `zone` against `expected`
    ///
    /// Returns `true` when the answer equals `expected` exactly, or when the
    /// name has no A records and `expected` is empty. Every other outcome,
    /// including resolution failures, is `false`.
    async fn verify(
        &self,
        hostname: &str,
        zone: &str,
        expected: &BTreeSet<Ipv4Addr>,
        timeout: Duration,
    ) -> bool;
}
