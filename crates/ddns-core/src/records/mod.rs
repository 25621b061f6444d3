//! Record set synchronization
//!
//! [`RecordSync`] turns a raw [`DnsProvider`] into the operations the engine
//! needs: a cached zone lookup, record set reads, and an idempotent
//! [`sync`](RecordSync::sync) that drives one hostname's A record set to a
//! desired address set.
//!
//! ## Strategy
//!
//! The provider models all A records of a name as one set-valued resource.
//! `sync` compares sets, and when they differ it performs exactly one of:
//!
//! | current set | desired set | call                |
//! |-------------|-------------|---------------------|
//! | exists      | empty       | `delete_rrset`      |
//! | exists      | non-empty   | `set_rrset_records` |
//! | absent      | non-empty   | `create_rrset`      |
//!
//! Every provider request first waits on the shared [`RateLimiter`] and runs
//! under the [`RetryPolicy`], retrying only [`Error::is_retryable`] failures.

use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::traits::{DnsProvider, RecordSet, A_RECORD};
use std::collections::BTreeSet;
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Idempotent A record synchronization for one zone
pub struct RecordSync<P: DnsProvider + ?Sized = dyn DnsProvider> {
    provider: Arc<P>,
    zone: String,
    ttl: u32,
    limiter: RateLimiter,
    retry: RetryPolicy,
    zone_id: OnceCell<String>,
}

impl<P: DnsProvider + ?Sized> std::fmt::Debug for RecordSync<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSync")
            .field("provider", &self.provider.provider_name())
            .field("zone", &self.zone)
            .field("ttl", &self.ttl)
            .field("zone_id", &self.zone_id.get())
            .finish()
    }
}

impl<P: DnsProvider + ?Sized> RecordSync<P> {
    /// Create a synchronizer for `zone`
    ///
    /// `ttl` is used only when a record set has to be created.
    pub fn new(
        provider: Arc<P>,
        zone: impl Into<String>,
        ttl: u32,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            zone: zone.into(),
            ttl,
            limiter,
            retry,
            zone_id: OnceCell::new(),
        }
    }

    /// Configured zone name
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Resolve the configured zone to its id
    ///
    /// The first successful lookup is cached for the lifetime of this value.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the provider has no zone with that name.
    pub async fn get_zone_id(&self) -> Result<String> {
        let id = self
            .zone_id
            .get_or_try_init(|| async {
                debug!(zone = %self.zone, "Looking up zone");
                let zone = self
                    .paced(|| self.provider.find_zone(&self.zone))
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Zone '{}' not found", self.zone)))?;
                debug!(zone = %self.zone, zone_id = %zone.id, "Found zone");
                Ok::<_, Error>(zone.id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Fetch the A record set for `hostname`, `None` when absent
    pub async fn get_record_set(&self, zone_id: &str, hostname: &str) -> Result<Option<RecordSet>> {
        self.paced(|| self.provider.get_rrset(zone_id, hostname, A_RECORD))
            .await
    }

    /// Drive the A record set of `hostname` to exactly `desired`
    ///
    /// Returns `Ok(false)` without any mutating call when the current values
    /// already equal `desired`. Otherwise returns `Ok(true)`; in dry-run mode
    /// nothing is mutated.
    pub async fn sync(
        &self,
        hostname: &str,
        desired: &BTreeSet<Ipv4Addr>,
        dry_run: bool,
    ) -> Result<bool> {
        let zone_id = self.get_zone_id().await?;
        let current = self.get_record_set(&zone_id, hostname).await?;
        let current_values = current
            .as_ref()
            .map(|set| set.values.clone())
            .unwrap_or_default();

        if &current_values == desired {
            debug!(hostname, current = ?current_values, "No changes needed");
            return Ok(false);
        }

        info!(
            hostname,
            zone = %self.zone,
            current = ?current_values,
            desired = ?desired,
            dry_run,
            "Syncing A records"
        );

        if dry_run {
            return Ok(true);
        }

        // BTreeSet iteration is sorted, so the value list is deterministic
        let values: Vec<Ipv4Addr> = desired.iter().copied().collect();

        match current {
            Some(_) if values.is_empty() => {
                info!(hostname, "Deleting A record set");
                self.paced(|| self.provider.delete_rrset(&zone_id, hostname))
                    .await?;
            }
            Some(_) => {
                info!(hostname, values = ?values, "Replacing A record set values");
                self.paced(|| self.provider.set_rrset_records(&zone_id, hostname, &values))
                    .await?;
            }
            None => {
                info!(hostname, values = ?values, ttl = self.ttl, "Creating A record set");
                self.paced(|| self.provider.create_rrset(&zone_id, hostname, self.ttl, &values))
                    .await?;
            }
        }

        Ok(true)
    }

    /// Whether the configured zone currently resolves
    ///
    /// Bypasses the zone cache and the retry policy, and never fails.
    pub async fn health_check(&self) -> bool {
        self.limiter.wait().await;
        match self.provider.find_zone(&self.zone).await {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(zone = %self.zone, "Health check: zone not found");
                false
            }
            Err(e) => {
                warn!(zone = %self.zone, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Run one provider request under the rate limiter and retry policy
    async fn paced<T, F, Fut>(&self, request: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = &self.limiter;
        let request = &request;
        self.retry
            .execute(
                move || async move {
                    limiter.wait().await;
                    request().await
                },
                Error::is_retryable,
            )
            .await
    }
}
