//! Readiness snapshot for health probes
//!
//! Probes only see a [`ReadinessCheck`]; they never reach into engine state.

use crate::records::RecordSync;
use crate::traits::InterfaceSource;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for the router reachability probe
pub const ROUTER_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-only readiness predicate
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Whether every upstream dependency is currently reachable
    async fn is_ready(&self) -> bool;
}

/// Ready iff the router API and the DNS provider both respond
pub struct Readiness {
    source: Arc<dyn InterfaceSource>,
    records: Arc<RecordSync>,
}

impl Readiness {
    /// Create a readiness check over the engine's collaborators
    pub fn new(source: Arc<dyn InterfaceSource>, records: Arc<RecordSync>) -> Self {
        Self { source, records }
    }
}

#[async_trait]
impl ReadinessCheck for Readiness {
    async fn is_ready(&self) -> bool {
        // Short-circuit: the provider is not queried when the router is down
        self.source.health_check(ROUTER_PROBE_TIMEOUT).await && self.records.health_check().await
    }
}
