//! Test doubles and common utilities for contract tests
//!
//! The doubles keep their counters and call logs behind `Arc`s so a test can
//! hand one instance to the engine and keep a `sharing_counters_with` twin
//! for assertions.

#![allow(dead_code)]

use async_trait::async_trait;
use ddns_core::error::{Error, Result};
use ddns_core::traits::{AnnotationUpdater, DnsProvider, InterfaceSource, RecordSet, Verifier, Zone};
use ddns_core::{DdnsConfig, RateLimiter, RecordSync, RetryPolicy};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ZONE: &str = "example.com";
pub const ZONE_ID: &str = "zone-1";

pub fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}

pub fn ips(list: &[Ipv4Addr]) -> BTreeSet<Ipv4Addr> {
    list.iter().copied().collect()
}

/// Build a validated config with interfaces `wan`, `wan2` and `lte` and the
/// given `(hostname, interfaces)` records
pub fn test_config(records: &[(&str, &[&str])]) -> DdnsConfig {
    let mut yaml = String::from(
        r#"
opnsense:
  url: "https://fw.local"
  key: "key"
  secret: "secret"
  interfaces:
    wan: "igb0"
    wan2: "igb1"
    lte: "ue0"
hetzner:
  token: "token"
  zone: "example.com"
settings:
  verify_delay: 2.0
records:
"#,
    );
    for (hostname, interfaces) in records {
        yaml.push_str(&format!(
            "  - hostname: \"{hostname}\"\n    interfaces: [{}]\n",
            interfaces.join(", ")
        ));
    }
    DdnsConfig::from_yaml_str_with(&yaml, |_| None).expect("test config is valid")
}

/// RecordSync without pacing or backoff delays
pub fn fast_sync<P: DnsProvider + ?Sized>(provider: Arc<P>) -> RecordSync<P> {
    RecordSync::new(
        provider,
        ZONE,
        300,
        RateLimiter::with_interval(Duration::ZERO),
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO).with_seed(1),
    )
}

/// Interface source returning a fixed router view
pub struct StaticInterfaceSource {
    /// Router interface name -> address
    router: Arc<Mutex<HashMap<String, Ipv4Addr>>>,
    /// Whether fetch fails with a transport error
    failing: bool,
    fetch_call_count: Arc<AtomicUsize>,
}

impl StaticInterfaceSource {
    pub fn new(router: &[(&str, Ipv4Addr)]) -> Self {
        Self {
            router: Arc::new(Mutex::new(
                router.iter().map(|(n, ip)| (n.to_string(), *ip)).collect(),
            )),
            failing: false,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(&[])
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            router: Arc::clone(&other.router),
            failing: other.failing,
            fetch_call_count: Arc::clone(&other.fetch_call_count),
        }
    }

    /// Change the address the router reports for `interface`
    pub fn set(&self, interface: &str, ip: Ipv4Addr) {
        self.router.lock().unwrap().insert(interface.to_string(), ip);
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterfaceSource for StaticInterfaceSource {
    async fn fetch(&self, mapping: &BTreeMap<String, String>) -> Result<BTreeMap<String, Ipv4Addr>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::upstream("opnsense", "connection refused"));
        }

        let router = self.router.lock().unwrap();
        Ok(mapping
            .iter()
            .filter_map(|(logical, iface)| router.get(iface).map(|ip| (logical.clone(), *ip)))
            .collect())
    }

    async fn health_check(&self, _timeout: Duration) -> bool {
        !self.failing
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// A provider call, as observed by [`MockDnsProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    FindZone(String),
    GetRrset(String),
    Create {
        name: String,
        ttl: u32,
        values: Vec<Ipv4Addr>,
    },
    SetRecords {
        name: String,
        values: Vec<Ipv4Addr>,
    },
    Delete(String),
}

impl ProviderCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::SetRecords { .. } | Self::Delete(_)
        )
    }
}

/// In-memory record-set provider that logs every call
pub struct MockDnsProvider {
    rrsets: Arc<Mutex<HashMap<String, RecordSet>>>,
    calls: Arc<Mutex<Vec<ProviderCall>>>,
    /// Statuses returned by the next calls, one per call
    scripted_failures: Arc<Mutex<VecDeque<u16>>>,
    /// Hostnames whose record-set reads always fail
    broken_hostnames: Arc<Mutex<HashSet<String>>>,
    zone_exists: bool,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            rrsets: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            scripted_failures: Arc::new(Mutex::new(VecDeque::new())),
            broken_hostnames: Arc::new(Mutex::new(HashSet::new())),
            zone_exists: true,
        }
    }

    pub fn without_zone() -> Self {
        Self {
            zone_exists: false,
            ..Self::new()
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            rrsets: Arc::clone(&other.rrsets),
            calls: Arc::clone(&other.calls),
            scripted_failures: Arc::clone(&other.scripted_failures),
            broken_hostnames: Arc::clone(&other.broken_hostnames),
            zone_exists: other.zone_exists,
        }
    }

    /// Seed an existing record set
    pub fn with_rrset(self, name: &str, values: &[Ipv4Addr]) -> Self {
        self.rrsets.lock().unwrap().insert(
            name.to_string(),
            RecordSet {
                zone_id: ZONE_ID.to_string(),
                name: name.to_string(),
                record_type: "A".to_string(),
                ttl: Some(600),
                values: ips(values),
            },
        );
        self
    }

    /// Make the next `times` calls fail with `status`
    pub fn fail_next(&self, status: u16, times: usize) {
        let mut failures = self.scripted_failures.lock().unwrap();
        failures.extend(std::iter::repeat_n(status, times));
    }

    /// Make every read of `hostname` fail with a 500
    pub fn break_hostname(&self, hostname: &str) {
        self.broken_hostnames.lock().unwrap().insert(hostname.to_string());
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<ProviderCall> {
        self.calls().into_iter().filter(ProviderCall::is_mutation).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn rrset_values(&self, name: &str) -> Option<BTreeSet<Ipv4Addr>> {
        self.rrsets.lock().unwrap().get(name).map(|s| s.values.clone())
    }

    fn record(&self, call: ProviderCall) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.scripted_failures.lock().unwrap().pop_front() {
            Some(status) => Err(Error::upstream_status("mock", status, "scripted failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    async fn find_zone(&self, name: &str) -> Result<Option<Zone>> {
        self.record(ProviderCall::FindZone(name.to_string()))?;
        Ok(self.zone_exists.then(|| Zone {
            id: ZONE_ID.to_string(),
            name: name.to_string(),
        }))
    }

    async fn get_rrset(&self, _zone_id: &str, name: &str, _record_type: &str) -> Result<Option<RecordSet>> {
        self.record(ProviderCall::GetRrset(name.to_string()))?;
        if self.broken_hostnames.lock().unwrap().contains(name) {
            return Err(Error::upstream_status("mock", 500, "broken hostname"));
        }
        Ok(self.rrsets.lock().unwrap().get(name).cloned())
    }

    async fn create_rrset(&self, zone_id: &str, name: &str, ttl: u32, values: &[Ipv4Addr]) -> Result<()> {
        self.record(ProviderCall::Create {
            name: name.to_string(),
            ttl,
            values: values.to_vec(),
        })?;
        self.rrsets.lock().unwrap().insert(
            name.to_string(),
            RecordSet {
                zone_id: zone_id.to_string(),
                name: name.to_string(),
                record_type: "A".to_string(),
                ttl: Some(ttl),
                values: ips(values),
            },
        );
        Ok(())
    }

    async fn set_rrset_records(&self, _zone_id: &str, name: &str, values: &[Ipv4Addr]) -> Result<()> {
        self.record(ProviderCall::SetRecords {
            name: name.to_string(),
            values: values.to_vec(),
        })?;
        let mut rrsets = self.rrsets.lock().unwrap();
        let set = rrsets
            .get_mut(name)
            .ok_or_else(|| Error::upstream_status("mock", 404, "rrset not found"))?;
        set.values = ips(values);
        Ok(())
    }

    async fn delete_rrset(&self, _zone_id: &str, name: &str) -> Result<()> {
        self.record(ProviderCall::Delete(name.to_string()))?;
        self.rrsets.lock().unwrap().remove(name);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Verifier that records its queries and returns a fixed answer
pub struct RecordingVerifier {
    answer: bool,
    queries: Arc<Mutex<Vec<(String, String, BTreeSet<Ipv4Addr>)>>>,
}

impl RecordingVerifier {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            answer: other.answer,
            queries: Arc::clone(&other.queries),
        }
    }

    /// `(hostname, zone, expected)` per verification
    pub fn queries(&self) -> Vec<(String, String, BTreeSet<Ipv4Addr>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Verifier for RecordingVerifier {
    async fn verify(&self, hostname: &str, zone: &str, expected: &BTreeSet<Ipv4Addr>, _timeout: Duration) -> bool {
        self.queries
            .lock()
            .unwrap()
            .push((hostname.to_string(), zone.to_string(), expected.clone()));
        self.answer
    }
}

/// Annotation updater that records its calls
pub struct RecordingAnnotationUpdater {
    failing: bool,
    calls: Arc<Mutex<Vec<(Vec<Ipv4Addr>, String, bool)>>>,
}

impl RecordingAnnotationUpdater {
    pub fn new() -> Self {
        Self {
            failing: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            failing: other.failing,
            calls: Arc::clone(&other.calls),
        }
    }

    /// `(ips, label_selector, dry_run)` per call
    pub fn calls(&self) -> Vec<(Vec<Ipv4Addr>, String, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnnotationUpdater for RecordingAnnotationUpdater {
    async fn update_apex_annotations(&self, ips: &[Ipv4Addr], label_selector: &str, dry_run: bool) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((ips.to_vec(), label_selector.to_string(), dry_run));
        if self.failing {
            return Err(Error::upstream("kubernetes", "API unavailable"));
        }
        Ok(true)
    }
}

/// Type-erased synchronizer for wiring into the engine
pub fn engine_sync(provider: MockDnsProvider) -> Arc<RecordSync> {
    let provider: Arc<dyn DnsProvider> = Arc::new(provider);
    Arc::new(fast_sync(provider))
}
