//! Integration tests for the per-tenant reference data cache
//!
//! Time is paused so TTL expiry is driven with `tokio::time::advance`.

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use helpers::{fuel_tenant, MockStore, TenantData};
use ledgerlens_ai::services::{CacheError, ReferenceDataCache};
use ledgerlens_common::events::{EventBus, PipelineEvent};

const TTL: Duration = Duration::from_secs(300);

fn cache_over(store: &Arc<MockStore>) -> Arc<ReferenceDataCache> {
    Arc::new(ReferenceDataCache::new(Arc::clone(store) as _, TTL))
}

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_gets_within_ttl_share_one_snapshot() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    let cache = cache_over(&store);

    let first = cache.get("t1").await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    let second = cache.get("t1").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.load_count(), 1);
    assert_eq!(first.accounts.len(), 5);
    assert_eq!(first.templates.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_snapshot_reloaded_once_for_concurrent_callers() {
    let store = Arc::new(MockStore::new(fuel_tenant()).with_load_delay(Duration::from_millis(50)));
    let cache = cache_over(&store);

    let original = cache.get("t1").await.unwrap();
    assert_eq!(store.load_count(), 1);

    // Step 1: Expire the snapshot and change the backing data
    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    store.replace(TenantData {
        templates: Vec::new(),
        ..fuel_tenant()
    });

    // Step 2: Ten callers race for the reload
    let mut join_set = JoinSet::new();
    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        join_set.spawn(async move { cache.get("t1").await.unwrap() });
    }

    let mut snapshots = Vec::new();
    while let Some(result) = join_set.join_next().await {
        snapshots.push(result.unwrap());
    }

    // Step 3: Exactly one reload, every caller got the new snapshot
    assert_eq!(store.load_count(), 2);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    assert!(!Arc::ptr_eq(&snapshots[0], &original));
    assert!(snapshots[0].templates.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_reload_keeps_previous_snapshot() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    let cache = cache_over(&store);

    let original = cache.get("t1").await.unwrap();

    tokio::time::advance(TTL + Duration::from_secs(1)).await;
    store.set_failing(true);

    let result = cache.get("t1").await;
    match result {
        Err(CacheError::BackingStore { tenant_id, .. }) => assert_eq!(tenant_id, "t1"),
        Ok(_) => panic!("reload against a failing store must not succeed"),
    }

    let stale = cache.stale("t1").await.unwrap();
    assert!(Arc::ptr_eq(&stale, &original));

    // Recovery: the next get after the store comes back reloads
    store.set_failing(false);
    let recovered = cache.get("t1").await.unwrap();
    assert!(!Arc::ptr_eq(&recovered, &original));
    assert_eq!(store.load_count(), 3);
}

#[tokio::test]
async fn test_first_load_failure_has_no_stale_snapshot() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    store.set_failing(true);
    let cache = cache_over(&store);

    assert!(cache.get("t1").await.is_err());
    assert!(cache.stale("t1").await.is_none());
}

// ============================================================================
// Tenant isolation and maintenance
// ============================================================================

#[tokio::test]
async fn test_tenants_cached_independently() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    let cache = cache_over(&store);

    let a = cache.get("tenant-a").await.unwrap();
    let b = cache.get("tenant-b").await.unwrap();

    assert_eq!(a.tenant_id, "tenant-a");
    assert_eq!(b.tenant_id, "tenant-b");
    assert_eq!(store.load_count(), 2);
    assert_eq!(cache.cached_tenants().await, vec!["tenant-a", "tenant-b"]);

    cache.invalidate("tenant-a").await;
    cache.get("tenant-a").await.unwrap();
    cache.get("tenant-b").await.unwrap();
    assert_eq!(store.load_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired_and_clear_all() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    let cache = cache_over(&store);

    cache.get("old").await.unwrap();
    tokio::time::advance(Duration::from_secs(200)).await;
    cache.get("new").await.unwrap();
    tokio::time::advance(Duration::from_secs(150)).await;

    assert_eq!(cache.purge_expired().await, 1);
    assert_eq!(cache.cached_tenants().await, vec!["new"]);

    cache.clear_all().await;
    assert!(cache.cached_tenants().await.is_empty());
}

#[tokio::test]
async fn test_reload_emits_event() {
    let store = Arc::new(MockStore::new(fuel_tenant()));
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let cache = ReferenceDataCache::new(store, TTL).with_event_bus(bus);

    cache.get("t1").await.unwrap();
    cache.get("t1").await.unwrap();

    match events.try_recv().unwrap() {
        PipelineEvent::ReferenceDataReloaded {
            tenant_id,
            accounts,
            journals,
            parties,
            templates,
            ..
        } => {
            assert_eq!(tenant_id, "t1");
            assert_eq!((accounts, journals, parties, templates), (5, 2, 1, 2));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // Second get was a cache hit
    assert!(events.try_recv().is_err());
}
