//! Configuration types for the DDNS system
//!
//! Configuration is read from a YAML file in which any `${VAR}` pattern is
//! replaced with the value of the environment variable `VAR` before the
//! document is deserialized. When no file is available the same structure is
//! assembled from plain environment variables (see [`DdnsConfig::from_env`]).

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/opnsense-dyndns-hetzner/config.yaml";

/// Hetzner's authoritative nameservers
pub const HETZNER_NAMESERVERS: [&str; 3] = [
    "helium.ns.hetzner.de",
    "hydrogen.ns.hetzner.com",
    "oxygen.ns.hetzner.com",
];

static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env pattern is a valid regex"));

/// Main DDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DdnsConfig {
    /// Router (interface address source) configuration
    pub opnsense: OpnsenseConfig,

    /// DNS provider configuration
    pub hetzner: HetznerConfig,

    /// Loop, verification and health settings
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Backoff policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Optional ingress annotation integration
    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// DNS records to manage, processed in this order
    pub records: Vec<RecordConfig>,
}

/// Where a configuration was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A YAML file
    File(PathBuf),
    /// Environment variables
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "file:{}", path.display()),
            ConfigSource::Environment => f.write_str("environment"),
        }
    }
}

impl DdnsConfig {
    /// Parse a YAML document, substituting `${VAR}` from the process environment
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_yaml_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse a YAML document using `lookup` to resolve `${VAR}` references
    pub fn from_yaml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Invalid YAML: {e}")))?;
        let processed = process_env_vars(raw, &lookup)?;
        let config: Self = serde_yaml::from_value(processed)
            .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Build configuration from environment-style variables
    ///
    /// Required: `OPNSENSE_URL`, `OPNSENSE_KEY`, `OPNSENSE_SECRET`,
    /// `OPNSENSE_INTERFACES` (`logical:name,...`), `HETZNER_TOKEN`,
    /// `HETZNER_ZONE`, `DYNDNS_RECORDS` (`host:iface1+iface2,...`).
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::config(format!("Environment variable {name} is required")))
        };

        let interfaces = parse_pairs(&required("OPNSENSE_INTERFACES")?, "OPNSENSE_INTERFACES")?
            .into_iter()
            .collect::<BTreeMap<_, _>>();

        let records = parse_pairs(&required("DYNDNS_RECORDS")?, "DYNDNS_RECORDS")?
            .into_iter()
            .map(|(hostname, ifaces)| RecordConfig {
                hostname,
                interfaces: ifaces.split('+').map(|s| s.trim().to_string()).collect(),
            })
            .collect();

        let mut settings = SettingsConfig::default();
        if let Some(v) = lookup("DYNDNS_INTERVAL") {
            settings.interval = parse_env("DYNDNS_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("DYNDNS_DRY_RUN") {
            settings.dry_run = parse_bool("DYNDNS_DRY_RUN", &v)?;
        }
        if let Some(v) = lookup("DYNDNS_HEALTH_PORT") {
            settings.health_port = Some(parse_env("DYNDNS_HEALTH_PORT", &v)?);
        }
        if let Some(v) = lookup("DYNDNS_VERIFY_DELAY") {
            settings.verify_delay = parse_env("DYNDNS_VERIFY_DELAY", &v)?;
        }

        let config = Self {
            opnsense: OpnsenseConfig {
                url: required("OPNSENSE_URL")?,
                key: required("OPNSENSE_KEY")?,
                secret: required("OPNSENSE_SECRET")?,
                verify_ssl: match lookup("OPNSENSE_VERIFY_SSL") {
                    Some(v) => parse_bool("OPNSENSE_VERIFY_SSL", &v)?,
                    None => true,
                },
                interfaces,
            },
            hetzner: HetznerConfig {
                token: required("HETZNER_TOKEN")?,
                zone: required("HETZNER_ZONE")?,
                ttl: match lookup("HETZNER_TTL") {
                    Some(v) => parse_env("HETZNER_TTL", &v)?,
                    None => default_ttl(),
                },
                requests_per_minute: default_requests_per_minute(),
            },
            settings,
            retry: RetryConfig::default(),
            kubernetes: KubernetesConfig::default(),
            records,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.records.is_empty() {
            return Err(Error::config("No records configured"));
        }

        self.opnsense.validate()?;
        self.hetzner.validate()?;
        self.settings.validate()?;
        self.retry.validate()?;

        for record in &self.records {
            if record.hostname.trim().is_empty() {
                return Err(Error::config("Record hostname cannot be empty"));
            }
            if record.interfaces.is_empty() {
                return Err(Error::config(format!(
                    "Record '{}' has no interfaces",
                    record.hostname
                )));
            }
            if let Some(unknown) = record
                .interfaces
                .iter()
                .find(|name| !self.opnsense.interfaces.contains_key(*name))
            {
                return Err(Error::config(format!(
                    "Record '{}' references unknown interface '{}'",
                    record.hostname, unknown
                )));
            }
        }

        if self.kubernetes.enabled && self.kubernetes.trigger_hostname.trim().is_empty() {
            return Err(Error::config(
                "kubernetes.trigger_hostname is required when kubernetes is enabled",
            ));
        }

        Ok(())
    }
}

/// Load configuration from `path`, the default file, or the environment
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_PATH`] is used
/// when present, otherwise the environment.
pub fn load_config_auto(path: Option<&Path>) -> Result<(DdnsConfig, ConfigSource)> {
    if let Some(path) = path {
        return Ok((DdnsConfig::load(path)?, ConfigSource::File(path.to_path_buf())));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return Ok((
            DdnsConfig::load(default_path)?,
            ConfigSource::File(default_path.to_path_buf()),
        ));
    }

    Ok((DdnsConfig::from_env()?, ConfigSource::Environment))
}

/// Replace every `${VAR}` in `value` using `lookup`
///
/// A reference to an unset variable is a configuration error.
pub fn substitute_env_vars<F>(value: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut last = 0;

    for caps in ENV_PATTERN.captures_iter(value) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let replacement = lookup(name.as_str()).ok_or_else(|| {
            Error::config(format!("Environment variable '{}' not set", name.as_str()))
        })?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(&replacement);
        last = whole.end();
    }

    out.push_str(&value[last..]);
    Ok(out)
}

/// Recursively substitute environment references in every string of a YAML tree
pub fn process_env_vars<F>(value: serde_yaml::Value, lookup: &F) -> Result<serde_yaml::Value>
where
    F: Fn(&str) -> Option<String>,
{
    use serde_yaml::Value;

    Ok(match value {
        Value::String(s) => Value::String(substitute_env_vars(&s, lookup)?),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| process_env_vars(item, lookup))
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, process_env_vars(v, lookup)?);
            }
            Value::Mapping(out)
        }
        other => other,
    })
}

/// OPNsense API configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct OpnsenseConfig {
    /// Base URL of the OPNsense API (e.g. "https://opnsense.local/api")
    pub url: String,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,

    /// Verify the router's TLS certificate
    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Logical interface name -> OPNsense interface name
    pub interfaces: BTreeMap<String, String>,
}

impl std::fmt::Debug for OpnsenseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpnsenseConfig")
            .field("url", &self.url)
            .field("key", &"<REDACTED>")
            .field("secret", &"<REDACTED>")
            .field("verify_ssl", &self.verify_ssl)
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

impl OpnsenseConfig {
    /// Validate the router configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::config("opnsense.url cannot be empty"));
        }
        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            return Err(Error::config(format!(
                "opnsense.url must use HTTP or HTTPS scheme. Got: {}",
                self.url
            )));
        }
        if self.key.is_empty() || self.secret.is_empty() {
            return Err(Error::config("opnsense.key and opnsense.secret are required"));
        }
        if self.interfaces.is_empty() {
            return Err(Error::config("opnsense.interfaces cannot be empty"));
        }
        Ok(())
    }
}

/// Hetzner Cloud DNS configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct HetznerConfig {
    /// Hetzner Cloud API token
    /// ⚠️ NEVER log this value
    pub token: String,

    /// DNS zone name (e.g. "example.com")
    pub zone: String,

    /// TTL for created record sets, in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Maximum API requests per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl std::fmt::Debug for HetznerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HetznerConfig")
            .field("token", &"<REDACTED>")
            .field("zone", &self.zone)
            .field("ttl", &self.ttl)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl HetznerConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::config("Hetzner API token cannot be empty"));
        }
        if self.zone.trim().trim_end_matches('.').is_empty() {
            return Err(Error::config("hetzner.zone cannot be empty"));
        }
        if self.ttl < 60 {
            return Err(Error::config(format!(
                "hetzner.ttl must be at least 60 seconds. Got: {}",
                self.ttl
            )));
        }
        if self.requests_per_minute == 0 {
            return Err(Error::config("hetzner.requests_per_minute must be > 0"));
        }
        Ok(())
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Seconds between reconciliation cycles
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Log intended changes without mutating anything
    #[serde(default)]
    pub dry_run: bool,

    /// Port for the liveness/readiness endpoints (disabled when unset)
    #[serde(default)]
    pub health_port: Option<u16>,

    /// Seconds to wait after a change before verifying propagation
    #[serde(default = "default_verify_delay")]
    pub verify_delay: f64,

    /// Per-query timeout for verification lookups, in seconds
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout: f64,

    /// Authoritative nameserver hostnames queried during verification
    #[serde(default = "default_nameservers")]
    pub nameservers: Vec<String>,
}

impl SettingsConfig {
    /// Validate loop settings
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::config("settings.interval must be > 0"));
        }
        checked_seconds("settings.verify_delay", self.verify_delay)?;
        checked_seconds("settings.verify_timeout", self.verify_timeout)?;
        Ok(())
    }

    /// Interval between cycles
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Delay before verification
    pub fn verify_delay(&self) -> Duration {
        seconds(self.verify_delay)
    }

    /// Verification query timeout
    pub fn verify_timeout(&self) -> Duration {
        seconds(self.verify_timeout)
    }
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            dry_run: false,
            health_port: None,
            verify_delay: default_verify_delay(),
            verify_timeout: default_verify_timeout(),
            nameservers: default_nameservers(),
        }
    }
}

/// Retry/backoff configuration for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in seconds
    #[serde(default = "default_base_delay")]
    pub base_delay: f64,

    /// Upper bound for the un-jittered backoff delay in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay: f64,
}

impl RetryConfig {
    /// Validate the backoff bounds
    pub fn validate(&self) -> Result<()> {
        checked_seconds("retry.base_delay", self.base_delay)?;
        checked_seconds("retry.max_delay", self.max_delay)?;
        if self.max_delay < self.base_delay {
            return Err(Error::config("retry.max_delay must be >= retry.base_delay"));
        }
        Ok(())
    }

    /// Initial backoff delay
    pub fn base_delay(&self) -> Duration {
        seconds(self.base_delay)
    }

    /// Backoff cap
    pub fn max_delay(&self) -> Duration {
        seconds(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

/// Kubernetes annotation integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Whether annotations are updated at all
    #[serde(default)]
    pub enabled: bool,

    /// Hostname whose change triggers the annotation update
    #[serde(default = "default_trigger_hostname")]
    pub trigger_hostname: String,

    /// Label selector for Ingresses and HTTPRoutes
    #[serde(default = "default_label_selector")]
    pub label_selector: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_hostname: default_trigger_hostname(),
            label_selector: default_label_selector(),
        }
    }
}

/// DNS record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Hostname relative to the zone ("@" for the apex)
    pub hostname: String,

    /// Logical interface names whose addresses make up the record
    pub interfaces: Vec<String>,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new<I, S>(hostname: impl Into<String>, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hostname: hostname.into(),
            interfaces: interfaces.into_iter().map(Into::into).collect(),
        }
    }
}

/// Seconds as a `Duration`, rejecting negative, non-finite and out-of-range values
fn checked_seconds(name: &str, value: f64) -> Result<Duration> {
    if value < 0.0 {
        return Err(Error::config(format!(
            "{name} must be a non-negative number of seconds. Got: {value}"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::config(format!("{name} is out of range. Got: {value}")))
}

/// Saturating conversion for values that already passed validation
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn parse_pairs(raw: &str, var: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| {
                    Error::config(format!("{var}: expected 'name:value', got '{pair}'"))
                })
        })
        .collect()
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{var} has an invalid value: '{value}'")))
}

fn parse_bool(var: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::config(format!("{var} must be a boolean. Got: '{value}'"))),
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u32 {
    300
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_interval() -> u64 {
    300
}

fn default_verify_delay() -> f64 {
    2.0
}

fn default_verify_timeout() -> f64 {
    5.0
}

fn default_nameservers() -> Vec<String> {
    HETZNER_NAMESERVERS.iter().map(|s| s.to_string()).collect()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_trigger_hostname() -> String {
    "@".to_string()
}

fn default_label_selector() -> String {
    "ginsys.net/apex-dns=true".to_string()
}
