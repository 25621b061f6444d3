// # Authoritative Nameserver Verification
//
// Confirms that a changed record set is served by the provider's
// authoritative nameservers, bypassing any caching resolver.
//
// ## Flow
//
// 1. Resolve the configured nameserver hostnames to IPv4 addresses with
//    the system resolver (failures are skipped).
// 2. Build a resolver bound to exactly those addresses, cache disabled.
// 3. Query `<hostname>.<zone>` for A records and compare with the expected set.
//
// Results are advisory: every outcome is a bool plus a log line.

use async_trait::async_trait;
use ddns_core::config::HETZNER_NAMESERVERS;
use ddns_core::traits::Verifier;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const DNS_PORT: u16 = 53;

/// Result of one A-record query against the authoritative servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The name has these A records
    Answer(BTreeSet<Ipv4Addr>),
    /// NXDOMAIN, or the name exists without A records
    NoRecords,
    /// Timeout, refused, network error, ...
    Failed(String),
}

/// Fully-qualified name queried for `hostname` in `zone`
///
/// `@` and the empty hostname denote the zone apex.
pub fn fqdn(hostname: &str, zone: &str) -> String {
    let zone = zone.trim().trim_end_matches('.');
    let hostname = hostname.trim().trim_end_matches('.');
    if hostname.is_empty() || hostname == "@" {
        zone.to_string()
    } else {
        format!("{hostname}.{zone}")
    }
}

/// Decide whether `outcome` confirms `expected`, logging the verdict
pub fn evaluate(hostname: &str, zone: &str, expected: &BTreeSet<Ipv4Addr>, outcome: &LookupOutcome) -> bool {
    match outcome {
        LookupOutcome::Answer(actual) if actual == expected => {
            tracing::debug!(hostname, zone, ips = ?actual, "DNS verification passed");
            true
        }
        LookupOutcome::Answer(actual) => {
            tracing::warn!(hostname, zone, expected = ?expected, actual = ?actual, "DNS verification mismatch");
            false
        }
        LookupOutcome::NoRecords if expected.is_empty() => {
            tracing::debug!(hostname, zone, "DNS verification passed (no A records expected)");
            true
        }
        LookupOutcome::NoRecords => {
            tracing::warn!(hostname, zone, expected = ?expected, "DNS verification failed: no A records");
            false
        }
        LookupOutcome::Failed(error) => {
            tracing::error!(hostname, zone, error = %error, "DNS verification error");
            false
        }
    }
}

/// Resolve nameserver hostnames to IPv4 addresses, skipping failures
pub async fn resolve_nameserver_ips(nameservers: &[String], timeout: Duration) -> Vec<IpAddr> {
    let mut ips: Vec<IpAddr> = Vec::new();

    for ns in nameservers {
        match tokio::time::timeout(timeout, tokio::net::lookup_host((ns.as_str(), DNS_PORT))).await {
            Ok(Ok(addrs)) => {
                for addr in addrs.filter(|a| a.is_ipv4()) {
                    if !ips.contains(&addr.ip()) {
                        ips.push(addr.ip());
                    }
                }
            }
            Ok(Err(e)) => tracing::debug!(nameserver = %ns, error = %e, "Nameserver lookup failed"),
            Err(_) => tracing::debug!(nameserver = %ns, "Nameserver lookup timed out"),
        }
    }

    ips
}

/// [`Verifier`] that queries the provider's authoritative nameservers
#[derive(Debug, Clone)]
pub struct AuthoritativeVerifier {
    nameservers: Vec<String>,
    port: u16,
}

impl Default for AuthoritativeVerifier {
    fn default() -> Self {
        Self::new(HETZNER_NAMESERVERS.iter().map(|s| s.to_string()).collect())
    }
}

impl AuthoritativeVerifier {
    /// Verifier querying the given nameserver hostnames
    pub fn new(nameservers: Vec<String>) -> Self {
        Self {
            nameservers,
            port: DNS_PORT,
        }
    }

    /// Query the nameservers on `port` instead of 53
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn nameservers(&self) -> &[String] {
        &self.nameservers
    }

    async fn query(&self, server_ips: &[IpAddr], name: &str, timeout: Duration) -> LookupOutcome {
        let group = NameServerConfigGroup::from_ips_clear(server_ips, self.port, true);
        let config = ResolverConfig::from_parts(None, vec![], group);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        let resolver = TokioAsyncResolver::tokio(config, opts);

        // absolute name, no search list
        match resolver.ipv4_lookup(format!("{name}.")).await {
            Ok(lookup) => LookupOutcome::Answer(lookup.iter().map(|a| a.0).collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => LookupOutcome::NoRecords,
                _ => LookupOutcome::Failed(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl Verifier for AuthoritativeVerifier {
    async fn verify(&self, hostname: &str, zone: &str, expected: &BTreeSet<Ipv4Addr>, timeout: Duration) -> bool {
        let server_ips = resolve_nameserver_ips(&self.nameservers, timeout).await;
        if server_ips.is_empty() {
            tracing::warn!(nameservers = ?self.nameservers, "Could not resolve any authoritative nameservers");
            return false;
        }

        let name = fqdn(hostname, zone);
        tracing::debug!(name = %name, servers = ?server_ips, "Querying authoritative nameservers");

        let outcome = self.query(&server_ips, &name, timeout).await;
        evaluate(hostname, zone, expected, &outcome)
    }
}
