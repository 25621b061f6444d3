//! Core DDNS engine
//!
//! The DdnsEngine drives reconciliation cycles:
//! - Fetching interface addresses via InterfaceSource
//! - Computing the desired address set per configured record
//! - Syncing each record set via RecordSync
//! - Verifying changed records and triggering annotation updates
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ InterfaceSource │─── logical name -> IPv4 ───┐
//! └─────────────────┘                            │
//!                                                ▼
//!                                       ┌──────────────┐
//!                                       │  DdnsEngine  │
//!                                       └──────────────┘
//!                                                │ per record, in order
//!         ┌──────────────────────┬───────────────┼──────────────────────┐
//!         ▼                      ▼               ▼                      ▼
//! ┌──────────────┐      ┌──────────────┐ ┌───────────────────┐ ┌─────────────┐
//! │  RecordSync  │      │   Verifier   │ │ AnnotationUpdater │ │   Events    │
//! │   (sync)     │      │ (if changed) │ │ (trigger record)  │ │  (notify)   │
//! └──────────────┘      └──────────────┘ └───────────────────┘ └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Fetch interfaces; a failure aborts the cycle before any record is touched
//! 2. For each record: compute desired addresses, skip when empty
//! 3. Sync; a failure is logged and the next record is processed
//! 4. On a real change: wait `verify_delay`, then verify (advisory)
//! 5. On a change of the trigger hostname: update annotations (failure logged)

use crate::config::{DdnsConfig, KubernetesConfig, RecordConfig};
use crate::records::RecordSync;
use crate::traits::{AnnotationUpdater, InterfaceSource, Verifier};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Granularity at which the inter-cycle sleep checks the shutdown flag
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Cycle started
    CycleStarted { iteration: u64 },

    /// Interface fetch failed, no record was processed
    CycleAborted { iteration: u64, error: String },

    /// Record set already matched
    RecordUnchanged { hostname: String },

    /// Record set was changed (or would be, in dry-run mode)
    RecordChanged {
        hostname: String,
        ips: Vec<Ipv4Addr>,
        dry_run: bool,
    },

    /// No configured interface of the record had an address
    RecordSkipped {
        hostname: String,
        missing: Vec<String>,
    },

    /// Sync of the record failed
    RecordFailed { hostname: String, error: String },

    /// Propagation check finished
    Verified { hostname: String, success: bool },

    /// Annotation update finished
    AnnotationsUpdated { hostname: String, changed: bool },

    /// Annotation update failed
    AnnotationsFailed { hostname: String, error: String },

    /// Cycle finished
    CycleCompleted { iteration: u64, report: CycleReport },
}

/// Per-cycle outcome, hostnames in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records whose set changed (or would change in dry-run mode)
    pub changed: Vec<String>,
    /// Records already in the desired state
    pub unchanged: Vec<String>,
    /// Records with no resolvable interface
    pub skipped: Vec<String>,
    /// Records whose sync failed
    pub failed: Vec<String>,
    /// Whether the interface fetch failed
    pub aborted: bool,
}

impl CycleReport {
    /// Whether any record changed
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Desired addresses of one record, derived from fetched interfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    /// Record hostname
    pub hostname: String,
    /// Union of the addresses of every resolved interface
    pub ips: BTreeSet<Ipv4Addr>,
    /// Configured interfaces absent from the fetch result
    pub missing: Vec<String>,
}

impl DesiredState {
    /// Compute the desired state of `record` from `interfaces`
    pub fn compute(record: &RecordConfig, interfaces: &BTreeMap<String, Ipv4Addr>) -> Self {
        let mut ips = BTreeSet::new();
        let mut missing = Vec::new();

        for name in &record.interfaces {
            match interfaces.get(name) {
                Some(ip) => {
                    ips.insert(*ip);
                }
                None => missing.push(name.clone()),
            }
        }

        Self {
            hostname: record.hostname.clone(),
            ips,
            missing,
        }
    }
}

/// Annotation integration: the updater plus when and how to call it
struct AnnotationTrigger {
    updater: Arc<dyn AnnotationUpdater>,
    hostname: String,
    label_selector: String,
}

/// Core DDNS engine
///
/// The engine runs one reconciliation cycle at a time, processing records
/// sequentially in configuration order.
///
/// ## Lifecycle
///
/// 1. Create with [`DdnsEngine::new()`]
/// 2. Optionally attach a verifier and an annotation updater
/// 3. Drive with [`DdnsEngine::run_cycle()`] or [`DdnsEngine::run_until()`]
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped (logged) when it is full
/// - **Rate limiting and retries**: owned by [`RecordSync`]
pub struct DdnsEngine {
    /// Interface address source
    source: Arc<dyn InterfaceSource>,

    /// Record set synchronizer for the configured zone
    records: Arc<RecordSync>,

    /// Propagation verifier
    verifier: Option<Arc<dyn Verifier>>,

    /// Annotation integration
    annotations: Option<AnnotationTrigger>,

    /// Logical name -> router interface name
    interfaces: BTreeMap<String, String>,

    /// DNS records to manage
    record_configs: Vec<RecordConfig>,

    /// Kubernetes settings, used when an updater is attached
    kubernetes: KubernetesConfig,

    dry_run: bool,
    verify_delay: Duration,
    verify_timeout: Duration,

    /// Completed and started cycles
    iteration: AtomicU64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `source`: interface address source
    /// - `records`: record set synchronizer for the configured zone
    /// - `config`: DDNS configuration (`settings.dry_run` is honored as is)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Arc<dyn InterfaceSource>,
        records: Arc<RecordSync>,
        config: &DdnsConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let engine = Self {
            source,
            records,
            verifier: None,
            annotations: None,
            interfaces: config.opnsense.interfaces.clone(),
            record_configs: config.records.clone(),
            kubernetes: config.kubernetes.clone(),
            dry_run: config.settings.dry_run,
            verify_delay: config.settings.verify_delay(),
            verify_timeout: config.settings.verify_timeout(),
            iteration: AtomicU64::new(0),
            event_tx: tx,
        };

        (engine, rx)
    }

    /// Verify changed records with `verifier`
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Update annotations with `updater` when the trigger hostname changes
    ///
    /// Ignored unless `kubernetes.enabled` is set in the configuration.
    pub fn with_annotation_updater(mut self, updater: Arc<dyn AnnotationUpdater>) -> Self {
        if self.kubernetes.enabled {
            self.annotations = Some(AnnotationTrigger {
                updater,
                hostname: self.kubernetes.trigger_hostname.clone(),
                label_selector: self.kubernetes.label_selector.clone(),
            });
        } else {
            debug!("Kubernetes integration disabled, annotation updater not attached");
        }
        self
    }

    /// Whether changes are only logged
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one reconciliation cycle
    ///
    /// Never fails: every error is logged, reported in the returned
    /// [`CycleReport`] and emitted as an event.
    pub async fn run_cycle(&self) -> CycleReport {
        let iteration = self.iteration.fetch_add(1, Ordering::SeqCst) + 1;
        info!(iteration, "Starting update cycle");
        self.emit_event(EngineEvent::CycleStarted { iteration });

        let mut report = CycleReport::default();

        let interfaces = match self.source.fetch(&self.interfaces).await {
            Ok(interfaces) => interfaces,
            Err(e) => {
                error!(
                    source = self.source.source_name(),
                    error = %e,
                    "Failed to get interface addresses"
                );
                report.aborted = true;
                self.emit_event(EngineEvent::CycleAborted {
                    iteration,
                    error: e.to_string(),
                });
                return report;
            }
        };

        if interfaces.is_empty() {
            warn!("No interface addresses found");
        } else {
            debug!(interfaces = ?interfaces, "Retrieved interface addresses");
        }

        for record in &self.record_configs {
            let desired = DesiredState::compute(record, &interfaces);
            self.process_record(desired, &mut report).await;
        }

        if report.has_changes() {
            info!(
                iteration,
                changed = report.changed.len(),
                failed = report.failed.len(),
                "Update cycle complete"
            );
        } else {
            info!(iteration, "No DNS changes needed, all records up to date");
        }

        self.emit_event(EngineEvent::CycleCompleted {
            iteration,
            report: report.clone(),
        });
        report
    }

    /// Run cycles every `interval` until `shutdown` is set
    ///
    /// The sleep between cycles checks the flag every
    /// [`SHUTDOWN_POLL_INTERVAL`], bounding shutdown latency. An in-flight
    /// cycle is always completed.
    pub async fn run_until(&self, shutdown: &AtomicBool, interval: Duration) {
        while !shutdown.load(Ordering::SeqCst) {
            self.run_cycle().await;

            info!(
                next_check_seconds = interval.as_secs(),
                "Update cycle complete, sleeping"
            );

            let mut remaining = interval;
            while !remaining.is_zero() {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let step = remaining.min(SHUTDOWN_POLL_INTERVAL);
                tokio::time::sleep(step).await;
                remaining -= step;
            }
        }

        info!("Shutdown requested, engine stopped");
    }

    /// Sync, verify and propagate one record
    async fn process_record(&self, desired: DesiredState, report: &mut CycleReport) {
        let hostname = desired.hostname.clone();

        if !desired.missing.is_empty() {
            warn!(
                hostname = %hostname,
                missing = ?desired.missing,
                "Missing interfaces for record"
            );
        }

        if desired.ips.is_empty() {
            warn!(hostname = %hostname, "No IPs available for record, skipping");
            report.skipped.push(hostname.clone());
            self.emit_event(EngineEvent::RecordSkipped {
                hostname,
                missing: desired.missing,
            });
            return;
        }

        let changed = match self.records.sync(&hostname, &desired.ips, self.dry_run).await {
            Ok(changed) => changed,
            Err(e) => {
                error!(
                    hostname = %hostname,
                    zone = self.records.zone(),
                    status = e.status(),
                    error = %e,
                    "Failed to sync DNS records"
                );
                report.failed.push(hostname.clone());
                self.emit_event(EngineEvent::RecordFailed {
                    hostname,
                    error: e.to_string(),
                });
                return;
            }
        };

        if !changed {
            report.unchanged.push(hostname.clone());
            self.emit_event(EngineEvent::RecordUnchanged { hostname });
            return;
        }

        let ips: Vec<Ipv4Addr> = desired.ips.iter().copied().collect();
        report.changed.push(hostname.clone());
        self.emit_event(EngineEvent::RecordChanged {
            hostname: hostname.clone(),
            ips: ips.clone(),
            dry_run: self.dry_run,
        });

        if !self.dry_run {
            self.verify(&hostname, &desired.ips).await;
        }

        if let Some(trigger) = self.annotations.as_ref().filter(|t| t.hostname == hostname) {
            self.update_annotations(trigger, &hostname, &ips).await;
        }
    }

    async fn verify(&self, hostname: &str, expected: &BTreeSet<Ipv4Addr>) {
        let Some(verifier) = &self.verifier else {
            return;
        };

        // Give the provider time to push the change to its nameservers
        tokio::time::sleep(self.verify_delay).await;

        let success = verifier
            .verify(hostname, self.records.zone(), expected, self.verify_timeout)
            .await;
        if success {
            info!(hostname, "DNS verification succeeded");
        } else {
            warn!(hostname, expected = ?expected, "DNS verification failed");
        }

        self.emit_event(EngineEvent::Verified {
            hostname: hostname.to_string(),
            success,
        });
    }

    async fn update_annotations(&self, trigger: &AnnotationTrigger, hostname: &str, ips: &[Ipv4Addr]) {
        info!(hostname, ips = ?ips, "Triggering kubernetes annotation update");

        match trigger
            .updater
            .update_apex_annotations(ips, &trigger.label_selector, self.dry_run)
            .await
        {
            Ok(changed) => {
                info!(hostname, changed, "Kubernetes annotations processed");
                self.emit_event(EngineEvent::AnnotationsUpdated {
                    hostname: hostname.to_string(),
                    changed,
                });
            }
            Err(e) => {
                error!(hostname, error = %e, "Failed to update kubernetes annotations");
                self.emit_event(EngineEvent::AnnotationsFailed {
                    hostname: hostname.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => warn!("Event channel full, dropping event"),
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
