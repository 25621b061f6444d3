//! Error types for the DDNS system
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP statuses that indicate a transient provider-side condition
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or HTTP failure talking to the router or the DNS provider
    #[error("{source_name} request failed{}: {message}", status_suffix(.status))]
    Upstream {
        /// Upstream system name (e.g. "hetzner", "opnsense")
        source_name: String,
        /// Human readable cause
        message: String,
        /// HTTP status code, when the failure came with a response
        status: Option<u16>,
    },

    /// A configured entity (e.g. the zone) does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl Error {
    /// Create an upstream error without a status code (transport failure)
    pub fn upstream(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create an upstream error carrying the HTTP status code
    pub fn upstream_status(
        source_name: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// HTTP status carried by an upstream error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the provider failure is worth retrying (429 and gateway-class 5xx)
    pub fn is_retryable(&self) -> bool {
        self.status()
            .is_some_and(|status| RETRYABLE_STATUSES.contains(&status))
    }
}
