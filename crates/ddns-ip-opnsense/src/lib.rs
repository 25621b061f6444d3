// # OPNsense Interface Source
//
// This crate reads the current IPv4 address of router interfaces from the
// OPNsense diagnostics API.
//
// ## Architecture
//
// One GET to `<url>/api/diagnostics/interface/getInterfaceConfig` per
// `fetch` call, authenticated with the API key/secret pair (HTTP basic auth).
// The response is an object keyed by router interface name; each logical
// interface from the configuration is looked up there.
//
// Address extraction order for an interface entry:
// 1. first element of the `ipv4` list carrying an `ipaddr`
// 2. a direct `ipaddr` field
//
// Nothing is cached: the engine decides the polling cadence.

use async_trait::async_trait;
use ddns_core::traits::{InterfaceSource, InterfaceSourceFactory};
use ddns_core::{DdnsConfig, Error, ProviderRegistry, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const INTERFACE_CONFIG_PATH: &str = "diagnostics/interface/getInterfaceConfig";

const SOURCE: &str = "opnsense";

/// OPNsense diagnostics API client
///
/// # Security
///
/// The Debug implementation does NOT expose the API key or secret.
pub struct OpnsenseSource {
    /// API base, always ending in `/api`
    base_url: String,

    /// API key
    /// ⚠️ NEVER log this value
    key: String,

    /// API secret
    /// ⚠️ NEVER log this value
    secret: String,

    client: reqwest::Client,
}

impl std::fmt::Debug for OpnsenseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpnsenseSource")
            .field("base_url", &self.base_url)
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

impl OpnsenseSource {
    /// Create a client for the router at `url`
    ///
    /// `/api` is appended unless `url` already ends with it. With
    /// `verify_ssl = false` the router certificate is not checked.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(url: &str, key: impl Into<String>, secret: impl Into<String>, verify_ssl: bool) -> Result<Self> {
        if !verify_ssl {
            tracing::warn!(url, "TLS certificate verification disabled for OPNsense");
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: api_base(url),
            key: key.into(),
            secret: secret.into(),
            client,
        })
    }

    /// Endpoint queried by `fetch` and `health_check`
    pub fn interface_config_url(&self) -> String {
        format!("{}/{INTERFACE_CONFIG_PATH}", self.base_url)
    }

    fn request(&self) -> reqwest::RequestBuilder {
        self.client
            .get(self.interface_config_url())
            .basic_auth(&self.key, Some(&self.secret))
    }
}

/// Normalize the configured URL to an API base ending in `/api`
fn api_base(url: &str) -> String {
    let base = url.trim().trim_end_matches('/');
    if base.ends_with("/api") {
        base.to_string()
    } else {
        format!("{base}/api")
    }
}

/// Pick the raw IPv4 text out of one interface entry
fn extract_ipv4(info: &Value) -> Option<&str> {
    let from_list = info
        .get("ipv4")
        .and_then(Value::as_array)
        .and_then(|addrs| addrs.iter().find_map(|addr| addr.get("ipaddr")))
        .and_then(Value::as_str);

    from_list
        .or_else(|| info.get("ipaddr").and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Accept `a.b.c.d` or `a.b.c.d/prefix`
fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    raw.split('/').next()?.trim().parse().ok()
}

/// Resolve logical interface names against a getInterfaceConfig response
///
/// Logical names without a router entry or without a usable IPv4 address
/// are left out, each with a warning.
pub fn map_interfaces(response: &Value, mapping: &BTreeMap<String, String>) -> BTreeMap<String, Ipv4Addr> {
    let mut result = BTreeMap::new();

    for (logical, router_name) in mapping {
        let Some(info) = response.get(router_name) else {
            let available: Vec<&str> = response
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            tracing::warn!(
                logical_name = %logical,
                opnsense_name = %router_name,
                available = ?available,
                "Interface not found in OPNsense"
            );
            continue;
        };

        match extract_ipv4(info).map(|raw| (raw, parse_ipv4(raw))) {
            Some((_, Some(ip))) => {
                tracing::debug!(logical_name = %logical, opnsense_name = %router_name, %ip, "Found interface IP");
                result.insert(logical.clone(), ip);
            }
            Some((raw, None)) => {
                tracing::warn!(
                    logical_name = %logical,
                    opnsense_name = %router_name,
                    value = raw,
                    "Interface address is not IPv4"
                );
            }
            None => {
                tracing::warn!(
                    logical_name = %logical,
                    opnsense_name = %router_name,
                    "No IPv4 address found for interface"
                );
            }
        }
    }

    result
}

#[async_trait]
impl InterfaceSource for OpnsenseSource {
    async fn fetch(&self, mapping: &BTreeMap<String, String>) -> Result<BTreeMap<String, Ipv4Addr>> {
        tracing::debug!(url = %self.interface_config_url(), "Querying OPNsense interface config");

        let response = self
            .request()
            .send()
            .await
            .map_err(|e| Error::upstream(SOURCE, format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream_status(
                SOURCE,
                status.as_u16(),
                format!("getInterfaceConfig returned {status}"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::upstream(SOURCE, format!("Invalid response: {}", e.without_url())))?;

        Ok(map_interfaces(&body, mapping))
    }

    async fn health_check(&self, timeout: Duration) -> bool {
        match self.request().timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::error!(status = %response.status(), "OPNsense health check failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e.without_url(), "OPNsense health check failed");
                false
            }
        }
    }

    fn source_name(&self) -> &'static str {
        SOURCE
    }
}

/// Factory for creating OPNsense interface sources
pub struct OpnsenseFactory;

impl InterfaceSourceFactory for OpnsenseFactory {
    fn create(&self, config: &DdnsConfig) -> Result<Box<dyn InterfaceSource>> {
        let router = &config.opnsense;
        Ok(Box::new(OpnsenseSource::new(
            &router.url,
            router.key.clone(),
            router.secret.clone(),
            router.verify_ssl,
        )?))
    }
}

/// Register the OPNsense interface source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_interface_source(SOURCE, Box::new(OpnsenseFactory));
}
