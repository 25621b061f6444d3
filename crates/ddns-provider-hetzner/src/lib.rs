// # Hetzner Cloud DNS Provider
//
// This crate provides the Hetzner Cloud DNS provider for the DDNS system.
//
// Every method issues exactly one HTTP request and maps the outcome to
// `ddns_core::Error`. Zone caching, rate limiting, retries and the decision
// whether anything must change live in `ddns_core::RecordSync`.
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (DNS Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS API calls to the Hetzner Cloud API only
// - ✅ Parse provider-specific responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Implement retry logic or backoff (owned by RecordSync)
// - ❌ Cache zone ids or record sets (owned by RecordSync)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Provider fails fast if the token is empty
//
// ## API Reference
//
// - Base: `https://api.hetzner.cloud/v1`, `Authorization: Bearer <token>`
// - List zones: GET `/zones?name=...`
// - Get RRSet: GET `/zones/:zone_id/rrsets/:name/:type`
// - Create RRSet: POST `/zones/:zone_id/rrsets`
// - Replace records: POST `/zones/:zone_id/rrsets/:name/:type/actions/set_records`
// - Delete RRSet: DELETE `/zones/:zone_id/rrsets/:name/:type`

use async_trait::async_trait;
use ddns_core::traits::{A_RECORD, DnsProvider, DnsProviderFactory, RecordSet, Zone};
use ddns_core::{DdnsConfig, Error, Result};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Hetzner Cloud API base URL
pub const HETZNER_API_BASE: &str = "https://api.hetzner.cloud/v1";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on error body text carried into error messages
const MAX_ERROR_BODY: usize = 256;

const SOURCE: &str = "hetzner";

/// One record value in an RRSet payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordValue {
    value: String,
}

#[derive(Debug, Serialize)]
struct CreateRrSetRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: &'a str,
    ttl: u32,
    records: Vec<RecordValue>,
}

#[derive(Debug, Serialize)]
struct SetRecordsRequest {
    records: Vec<RecordValue>,
}

#[derive(Debug, Deserialize)]
struct ZonesResponse {
    #[serde(default)]
    zones: Vec<ZoneItem>,
}

#[derive(Debug, Deserialize)]
struct ZoneItem {
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct RrSetResponse {
    rrset: RrSetItem,
}

#[derive(Debug, Deserialize)]
struct RrSetItem {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    records: Vec<RecordValue>,
}

/// Hetzner Cloud DNS provider
///
/// # Trust Level: Untrusted
///
/// Isolated, stateless and single-shot.
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API token.
pub struct HetznerProvider {
    /// Hetzner Cloud API token
    /// ⚠️ NEVER log this value
    token: String,

    /// API base URL
    base_url: Url,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for HetznerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerProvider")
            .field("token", &"<REDACTED>")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HetznerProvider {
    /// Create a provider talking to the public Hetzner Cloud API
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the token is empty or the HTTP client cannot be built.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, HETZNER_API_BASE)
    }

    /// Create a provider against an explicit API base URL
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::config("Hetzner API token cannot be empty"));
        }

        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid Hetzner API URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid Hetzner API URL '{base_url}'")));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            token,
            base_url,
            client,
        })
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send one request, mapping transport failures and non-2xx statuses
    ///
    /// A 404 is returned as `Ok(None)` when `allow_not_found` is set.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        action: &str,
        allow_not_found: bool,
    ) -> Result<Option<reqwest::Response>> {
        tracing::debug!(method = %method, path = url.path(), "Hetzner API request");

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream(SOURCE, format!("{action}: {}", e.without_url())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if allow_not_found && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, action, &body))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response, action: &str) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::upstream(SOURCE, format!("{action}: {}", e.without_url())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::upstream(SOURCE, format!("{action}: invalid response: {e}")))
    }
}

/// Map a non-2xx response to an upstream error carrying the status
fn status_error(status: StatusCode, action: &str, body: &str) -> Error {
    let hint = match status.as_u16() {
        401 | 403 => "authentication failed, check the API token and its permissions",
        404 => "not found",
        409 => "conflict",
        422 => "invalid request",
        429 => "rate limit exceeded",
        500..=599 => "server error",
        _ => "unexpected status",
    };
    let detail = truncate(body.trim(), MAX_ERROR_BODY);
    let message = if detail.is_empty() {
        format!("{action}: {hint}")
    } else {
        format!("{action}: {hint}: {detail}")
    };
    Error::upstream_status(SOURCE, status.as_u16(), message)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Zone ids are numbers in the Cloud API, strings in older payloads
fn zone_id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize_zone(name: &str) -> &str {
    name.trim().trim_end_matches('.')
}

fn record_values(values: &[Ipv4Addr]) -> Vec<RecordValue> {
    values
        .iter()
        .map(|ip| RecordValue {
            value: ip.to_string(),
        })
        .collect()
}

/// Parse record values, dropping (and logging) anything that is not IPv4
fn parse_values(name: &str, records: &[RecordValue]) -> BTreeSet<Ipv4Addr> {
    records
        .iter()
        .filter_map(|record| match record.value.trim().parse::<Ipv4Addr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(hostname = name, value = %record.value, "Ignoring non-IPv4 A record value");
                None
            }
        })
        .collect()
}

#[async_trait]
impl DnsProvider for HetznerProvider {
    async fn find_zone(&self, name: &str) -> Result<Option<Zone>> {
        let wanted = normalize_zone(name);
        let mut url = self.url(&["zones"]);
        url.query_pairs_mut().append_pair("name", wanted);

        let response = self
            .send::<()>(Method::GET, url, None, "list zones", false)
            .await?
            .ok_or_else(|| Error::upstream(SOURCE, "list zones: empty response"))?;
        let zones: ZonesResponse = Self::parse(response, "list zones").await?;

        for zone in zones.zones {
            if normalize_zone(&zone.name) != wanted {
                continue;
            }
            let id = zone_id_string(&zone.id)
                .ok_or_else(|| Error::upstream(SOURCE, "list zones: zone without id"))?;
            tracing::debug!(zone = wanted, zone_id = %id, "Found zone");
            return Ok(Some(Zone { id, name: zone.name }));
        }

        Ok(None)
    }

    async fn get_rrset(&self, zone_id: &str, name: &str, record_type: &str) -> Result<Option<RecordSet>> {
        let url = self.url(&["zones", zone_id, "rrsets", name, record_type]);

        let Some(response) = self
            .send::<()>(Method::GET, url, None, "get rrset", true)
            .await?
        else {
            tracing::debug!(hostname = name, "RRSet does not exist");
            return Ok(None);
        };
        let body: RrSetResponse = Self::parse(response, "get rrset").await?;

        let values = parse_values(name, &body.rrset.records);
        tracing::debug!(hostname = name, count = values.len(), "Found A records");

        Ok(Some(RecordSet {
            zone_id: zone_id.to_string(),
            name: body.rrset.name,
            record_type: body.rrset.record_type,
            ttl: body.rrset.ttl,
            values,
        }))
    }

    async fn create_rrset(&self, zone_id: &str, name: &str, ttl: u32, values: &[Ipv4Addr]) -> Result<()> {
        let url = self.url(&["zones", zone_id, "rrsets"]);
        let body = CreateRrSetRequest {
            name,
            record_type: A_RECORD,
            ttl,
            records: record_values(values),
        };

        self.send(Method::POST, url, Some(&body), "create rrset", false)
            .await?;
        tracing::info!(hostname = name, values = ?values, ttl, "Created A record set");
        Ok(())
    }

    async fn set_rrset_records(&self, zone_id: &str, name: &str, values: &[Ipv4Addr]) -> Result<()> {
        let url = self.url(&["zones", zone_id, "rrsets", name, A_RECORD, "actions", "set_records"]);
        let body = SetRecordsRequest {
            records: record_values(values),
        };

        self.send(Method::POST, url, Some(&body), "set rrset records", false)
            .await?;
        tracing::info!(hostname = name, values = ?values, "Replaced A record set values");
        Ok(())
    }

    async fn delete_rrset(&self, zone_id: &str, name: &str) -> Result<()> {
        let url = self.url(&["zones", zone_id, "rrsets", name, A_RECORD]);

        self.send::<()>(Method::DELETE, url, None, "delete rrset", false)
            .await?;
        tracing::info!(hostname = name, "Deleted A record set");
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        SOURCE
    }
}

/// Factory for creating Hetzner providers
pub struct HetznerFactory;

impl DnsProviderFactory for HetznerFactory {
    fn create(&self, config: &DdnsConfig) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(HetznerProvider::new(config.hetzner.token.clone())?))
    }
}

/// Register the Hetzner provider with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_hetzner::register(&registry);
/// assert!(registry.has_provider("hetzner"));
/// ```
pub fn register(registry: &ddns_core::ProviderRegistry) {
    registry.register_provider(SOURCE, Box::new(HetznerFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_token_rejected() {
        let err = HetznerProvider::new("").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let provider = HetznerProvider::new("secret_token_12345").unwrap();

        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("HetznerProvider"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[test]
    fn test_provider_name() {
        let provider = HetznerProvider::new("token").unwrap();
        assert_eq!(provider.provider_name(), "hetzner");
    }

    #[test]
    fn urls_encode_segments() {
        let provider = HetznerProvider::with_base_url("t", "http://localhost:1234/v1/").unwrap();
        assert_eq!(
            provider.url(&["zones", "42", "rrsets", "@", "A"]).as_str(),
            "http://localhost:1234/v1/zones/42/rrsets/@/A"
        );
        assert_eq!(
            provider.url(&["zones", "42", "rrsets", "a b", "A"]).as_str(),
            "http://localhost:1234/v1/zones/42/rrsets/a%20b/A"
        );
    }

    #[test]
    fn create_payload_shape() {
        let body = CreateRrSetRequest {
            name: "home",
            record_type: A_RECORD,
            ttl: 300,
            records: record_values(&[Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(5, 6, 7, 8)]),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "name": "home",
                "type": "A",
                "ttl": 300,
                "records": [{"value": "1.2.3.4"}, {"value": "5.6.7.8"}]
            })
        );
    }

    #[test]
    fn zone_ids_accept_numbers_and_strings() {
        assert_eq!(zone_id_string(&json!(12345)), Some("12345".to_string()));
        assert_eq!(zone_id_string(&json!("abc")), Some("abc".to_string()));
        assert_eq!(zone_id_string(&json!("")), None);
        assert_eq!(zone_id_string(&json!(null)), None);
    }

    #[test]
    fn rrset_values_skip_garbage() {
        let body: RrSetResponse = serde_json::from_value(json!({
            "rrset": {
                "name": "home",
                "type": "A",
                "ttl": 600,
                "records": [
                    {"value": "9.9.9.9", "comment": ""},
                    {"value": "not-an-ip"},
                    {"value": "1.1.1.1"}
                ]
            }
        }))
        .unwrap();

        let values = parse_values("home", &body.rrset.records);
        assert_eq!(
            values.into_iter().collect::<Vec<_>>(),
            vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(9, 9, 9, 9)]
        );
        assert_eq!(body.rrset.ttl, Some(600));
    }

    #[test]
    fn status_errors_carry_status_and_retryability() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, "get rrset", "");
        assert_eq!(err.status(), Some(429));
        assert!(err.is_retryable());

        let err = status_error(StatusCode::UNAUTHORIZED, "list zones", "{\"error\":\"unauthorized\"}");
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("authentication failed"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = status_error(StatusCode::BAD_GATEWAY, "create rrset", &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_factory_uses_config_token() {
        let config = DdnsConfig::from_yaml_str_with(
            r#"
opnsense: { url: "https://fw", key: k, secret: s, interfaces: { wan: igb0 } }
hetzner: { token: "tok", zone: example.com }
records: [ { hostname: home, interfaces: [wan] } ]
"#,
            |_| None,
        )
        .unwrap();

        let provider = HetznerFactory.create(&config).unwrap();
        assert_eq!(provider.provider_name(), "hetzner");
    }
}
