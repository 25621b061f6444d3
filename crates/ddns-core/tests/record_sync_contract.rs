//! Contract Test: Record Set Sync
//!
//! Verifies that `RecordSync::sync` is idempotent and minimal:
//! - Equal sets (order irrelevant) cause zero mutating calls
//! - Otherwise exactly one of create / replace / delete is issued
//! - Dry-run reports the same outcome without mutating anything
//! - Retryable provider failures are retried, others surface immediately
//!
//! If this test fails, the reconciler may churn or corrupt record sets.

mod common;

use common::*;
use ddns_core::error::Error;
use ddns_core::{RateLimiter, RecordSync, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;

fn sync_with(provider: &MockDnsProvider) -> RecordSync<MockDnsProvider> {
    fast_sync(Arc::new(MockDnsProvider::sharing_counters_with(provider)))
}

#[tokio::test]
async fn equal_sets_issue_no_mutations() {
    let provider = MockDnsProvider::new().with_rrset("home", &[ip(5, 6, 7, 8), ip(1, 2, 3, 4)]);
    let sync = sync_with(&provider);

    let changed = sync
        .sync("home", &ips(&[ip(1, 2, 3, 4), ip(5, 6, 7, 8)]), false)
        .await
        .unwrap();

    assert!(!changed);
    assert!(provider.mutations().is_empty());
}

#[tokio::test]
async fn replaces_existing_set_with_sorted_values() {
    let provider = MockDnsProvider::new().with_rrset("home", &[ip(9, 9, 9, 9)]);
    let sync = sync_with(&provider);

    let changed = sync
        .sync("home", &ips(&[ip(5, 6, 7, 8), ip(1, 2, 3, 4)]), false)
        .await
        .unwrap();

    assert!(changed);
    assert_eq!(
        provider.mutations(),
        vec![ProviderCall::SetRecords {
            name: "home".into(),
            values: vec![ip(1, 2, 3, 4), ip(5, 6, 7, 8)],
        }]
    );
    assert_eq!(
        provider.rrset_values("home"),
        Some(ips(&[ip(1, 2, 3, 4), ip(5, 6, 7, 8)]))
    );
}

#[tokio::test]
async fn creates_missing_set_with_configured_ttl() {
    let provider = MockDnsProvider::new();
    let sync = sync_with(&provider);

    assert!(sync.sync("vpn", &ips(&[ip(1, 2, 3, 4)]), false).await.unwrap());

    assert_eq!(
        provider.mutations(),
        vec![ProviderCall::Create {
            name: "vpn".into(),
            ttl: 300,
            values: vec![ip(1, 2, 3, 4)],
        }]
    );
}

#[tokio::test]
async fn deletes_set_when_desired_is_empty() {
    let provider = MockDnsProvider::new().with_rrset("old", &[ip(1, 1, 1, 1)]);
    let sync = sync_with(&provider);

    assert!(sync.sync("old", &ips(&[]), false).await.unwrap());

    assert_eq!(provider.mutations(), vec![ProviderCall::Delete("old".into())]);
    assert_eq!(provider.rrset_values("old"), None);
}

#[tokio::test]
async fn empty_desired_and_absent_set_is_unchanged() {
    let provider = MockDnsProvider::new();
    let sync = sync_with(&provider);

    assert!(!sync.sync("gone", &ips(&[]), false).await.unwrap());
    assert!(provider.mutations().is_empty());
}

#[tokio::test]
async fn second_sync_is_a_no_op() {
    let provider = MockDnsProvider::new().with_rrset("home", &[ip(9, 9, 9, 9)]);
    let sync = sync_with(&provider);
    let desired = ips(&[ip(1, 2, 3, 4)]);

    assert!(sync.sync("home", &desired, false).await.unwrap());
    assert!(!sync.sync("home", &desired, false).await.unwrap());
    assert_eq!(provider.mutations().len(), 1);
}

#[tokio::test]
async fn dry_run_matches_real_outcome_without_mutating() {
    let cases = [
        (MockDnsProvider::new().with_rrset("h", &[ip(9, 9, 9, 9)]), ips(&[ip(1, 2, 3, 4)])),
        (MockDnsProvider::new(), ips(&[ip(1, 2, 3, 4)])),
        (MockDnsProvider::new().with_rrset("h", &[ip(9, 9, 9, 9)]), ips(&[])),
        (MockDnsProvider::new().with_rrset("h", &[ip(1, 2, 3, 4)]), ips(&[ip(1, 2, 3, 4)])),
    ];

    for (provider, desired) in cases {
        let dry = sync_with(&provider).sync("h", &desired, true).await.unwrap();
        assert!(provider.mutations().is_empty(), "dry run mutated for {desired:?}");

        let real = sync_with(&provider).sync("h", &desired, false).await.unwrap();
        assert_eq!(dry, real, "dry run disagrees for {desired:?}");
        assert_eq!(provider.mutations().len(), usize::from(real));
    }
}

#[tokio::test]
async fn zone_id_is_cached() {
    let provider = MockDnsProvider::new();
    let sync = sync_with(&provider);

    assert_eq!(sync.get_zone_id().await.unwrap(), ZONE_ID);
    sync.sync("a", &ips(&[ip(1, 1, 1, 1)]), false).await.unwrap();
    sync.sync("b", &ips(&[ip(2, 2, 2, 2)]), false).await.unwrap();

    let lookups = provider
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ProviderCall::FindZone(_)))
        .count();
    assert_eq!(lookups, 1);
}

#[tokio::test]
async fn missing_zone_is_not_found() {
    let provider = MockDnsProvider::without_zone();
    let sync = sync_with(&provider);

    let err = sync.sync("home", &ips(&[ip(1, 2, 3, 4)]), false).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(ref m) if m.contains(ZONE)));
    assert!(provider.mutations().is_empty());
}

#[tokio::test]
async fn retryable_failures_are_retried_transparently() {
    let provider = MockDnsProvider::new().with_rrset("home", &[ip(9, 9, 9, 9)]);
    let sync = sync_with(&provider);
    // find_zone fails twice with 503, then everything succeeds
    provider.fail_next(503, 2);

    assert!(sync.sync("home", &ips(&[ip(1, 2, 3, 4)]), false).await.unwrap());
    assert_eq!(
        provider.calls(),
        vec![
            ProviderCall::FindZone(ZONE.into()),
            ProviderCall::FindZone(ZONE.into()),
            ProviderCall::FindZone(ZONE.into()),
            ProviderCall::GetRrset("home".into()),
            ProviderCall::SetRecords {
                name: "home".into(),
                values: vec![ip(1, 2, 3, 4)],
            },
        ]
    );
}

#[tokio::test]
async fn non_retryable_failure_surfaces_with_status() {
    let provider = MockDnsProvider::new();
    let sync = sync_with(&provider);
    provider.fail_next(401, 1);

    let err = sync.sync("home", &ips(&[ip(1, 2, 3, 4)]), false).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_last_failure() {
    let provider = MockDnsProvider::new();
    let sync = sync_with(&provider);
    provider.fail_next(429, 10);

    let err = sync.get_zone_id().await.unwrap_err();
    assert_eq!(err.status(), Some(429));
    // one attempt plus three retries
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn health_check_never_fails_or_retries() {
    let provider = MockDnsProvider::new();
    assert!(sync_with(&provider).health_check().await);

    let provider = MockDnsProvider::without_zone();
    assert!(!sync_with(&provider).health_check().await);

    let provider = MockDnsProvider::new();
    provider.fail_next(503, 5);
    assert!(!sync_with(&provider).health_check().await);
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn every_request_is_paced() {
    let provider = MockDnsProvider::new();
    let sync = RecordSync::new(
        Arc::new(MockDnsProvider::sharing_counters_with(&provider)),
        ZONE,
        300,
        RateLimiter::new(60),
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO),
    );
    let start = tokio::time::Instant::now();

    // find_zone, get_rrset, create_rrset
    sync.sync("home", &ips(&[ip(1, 2, 3, 4)]), false).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}
