//! Reference Data Cache
//!
//! Per-tenant, time-bounded cache of [`ReferenceDataSnapshot`]s.
//!
//! **Locking:**
//! - The tenant map lock only guards slot lookup and creation
//! - Each tenant slot has its own `RwLock`, so tenants never contend
//! - A stale slot is reloaded under its write lock after re-checking
//!   freshness, so N concurrent callers trigger exactly one load
//!
//! A failed reload leaves the previous snapshot in place; [`stale`] exposes it
//! to callers that accept stale data.
//!
//! [`stale`]: ReferenceDataCache::stale

use chrono::Utc;
use ledgerlens_common::events::{EventBus, PipelineEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::db::ReferenceStore;
use crate::models::{PartyRole, ReferenceDataSnapshot};

/// Default snapshot time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Any backing-store read failed; the load was abandoned as a whole
    #[error("Backing store failure for tenant {tenant_id}: {source}")]
    BackingStore {
        tenant_id: String,
        #[source]
        source: ledgerlens_common::Error,
    },
}

struct CachedSnapshot {
    snapshot: Arc<ReferenceDataSnapshot>,
    loaded_at: Instant,
}

#[derive(Default)]
struct TenantSlot {
    entry: RwLock<Option<CachedSnapshot>>,
}

/// Reference Data Cache
pub struct ReferenceDataCache {
    store: Arc<dyn ReferenceStore>,
    ttl: Duration,
    slots: RwLock<HashMap<String, Arc<TenantSlot>>>,
    event_bus: Option<EventBus>,
}

impl ReferenceDataCache {
    pub fn new(store: Arc<dyn ReferenceStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            slots: RwLock::new(HashMap::new()),
            event_bus: None,
        }
    }

    /// Emit `ReferenceDataReloaded` events on the given bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the tenant's snapshot, loading it on miss or expiry
    ///
    /// # Errors
    /// Returns `BackingStore` if any collection fails to load. The previous
    /// snapshot, if any, is kept.
    pub async fn get(&self, tenant_id: &str) -> Result<Arc<ReferenceDataSnapshot>, CacheError> {
        let slot = self.slot(tenant_id).await;

        {
            let entry = slot.entry.read().await;
            if let Some(cached) = entry.as_ref().filter(|c| self.is_fresh(c)) {
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let mut entry = slot.entry.write().await;

        // Another caller may have reloaded while we waited for the write lock
        if let Some(cached) = entry.as_ref().filter(|c| self.is_fresh(c)) {
            return Ok(Arc::clone(&cached.snapshot));
        }

        let snapshot = Arc::new(self.load(tenant_id).await?);
        *entry = Some(CachedSnapshot {
            snapshot: Arc::clone(&snapshot),
            loaded_at: Instant::now(),
        });

        Ok(snapshot)
    }

    /// Present snapshot regardless of age
    pub async fn stale(&self, tenant_id: &str) -> Option<Arc<ReferenceDataSnapshot>> {
        let slot = self.slots.read().await.get(tenant_id).cloned()?;
        let entry = slot.entry.read().await;
        entry.as_ref().map(|c| Arc::clone(&c.snapshot))
    }

    /// Drop the tenant's snapshot; the next `get` reloads
    pub async fn invalidate(&self, tenant_id: &str) {
        if self.slots.write().await.remove(tenant_id).is_some() {
            tracing::debug!(tenant_id, "Reference data invalidated");
        }
    }

    /// Drop every tenant's snapshot
    pub async fn clear_all(&self) {
        let mut slots = self.slots.write().await;
        let count = slots.len();
        slots.clear();
        tracing::debug!(count, "Reference data cache cleared");
    }

    /// Drop expired snapshots; slots currently being loaded are left alone
    ///
    /// # Returns
    /// Number of tenants removed
    pub async fn purge_expired(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot.entry.try_read() {
            Ok(entry) => entry.as_ref().map(|c| self.is_fresh(c)).unwrap_or(false),
            Err(_) => true,
        });
        before - slots.len()
    }

    /// Tenants with a slot in the cache
    pub async fn cached_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.slots.read().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    fn is_fresh(&self, cached: &CachedSnapshot) -> bool {
        cached.loaded_at.elapsed() < self.ttl
    }

    async fn slot(&self, tenant_id: &str) -> Arc<TenantSlot> {
        if let Some(slot) = self.slots.read().await.get(tenant_id) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(tenant_id.to_string()).or_default())
    }

    /// Load every collection concurrently as one logical operation
    async fn load(&self, tenant_id: &str) -> Result<ReferenceDataSnapshot, CacheError> {
        let started = std::time::Instant::now();
        let store = &self.store;

        let loaded = tokio::try_join!(
            store.load_accounts(tenant_id),
            store.load_journals(tenant_id),
            store.load_parties(tenant_id, PartyRole::Creditor),
            store.load_parties(tenant_id, PartyRole::Debtor),
            store.load_templates(tenant_id),
            store.load_profile(tenant_id),
        );

        let (accounts, journals, creditors, debtors, templates, profile) = match loaded {
            Ok(collections) => collections,
            Err(source) => {
                tracing::error!(
                    tenant_id,
                    error = %source,
                    "Reference data load failed"
                );
                return Err(CacheError::BackingStore {
                    tenant_id: tenant_id.to_string(),
                    source,
                });
            }
        };

        let snapshot = ReferenceDataSnapshot {
            tenant_id: tenant_id.to_string(),
            accounts,
            journals,
            creditors,
            debtors,
            templates,
            profile,
            loaded_at: Utc::now(),
        };

        tracing::info!(
            tenant_id,
            accounts = snapshot.accounts.len(),
            journals = snapshot.journals.len(),
            creditors = snapshot.creditors.len(),
            debtors = snapshot.debtors.len(),
            templates = snapshot.templates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reference data loaded"
        );

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(PipelineEvent::ReferenceDataReloaded {
                tenant_id: tenant_id.to_string(),
                accounts: snapshot.accounts.len(),
                journals: snapshot.journals.len(),
                parties: snapshot.party_count(),
                templates: snapshot.templates.len(),
                timestamp: snapshot.loaded_at,
            });
        }

        Ok(snapshot)
    }
}
