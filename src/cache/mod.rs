pub mod analytics;
pub mod belief;
pub mod content;
pub mod entry;
pub mod fragments;
pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::cache::analytics::AnalyticsCache;
use crate::cache::belief::{BeliefContextCache, BeliefRegistry};
use crate::cache::content::ContentCache;
use crate::cache::fragments::FragmentStore;
use crate::cache::session::{FingerprintIndex, SessionCache};
use crate::error::{CoreError, CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::TenantId;

/// The cache domains for one tenant (spec §4.3's domain table), bundled so
/// a tenant's entire cache footprint can be dropped in one operation (e.g.
/// on archival).
#[derive(Default, Debug)]
pub struct TenantCache {
    pub content: ContentCache,
    pub sessions: SessionCache,
    pub fragments: FragmentStore,
    pub analytics: AnalyticsCache,
    pub fingerprints: FingerprintIndex,
    pub belief_registry: BeliefRegistry,
    pub belief_contexts: BeliefContextCache,
}

/// The outer tenant map, sharded the same way the teacher's
/// `PgPoolManager::tenant_pools` shards database pools: one
/// `std::sync::RwLock` around a `HashMap`, so looking up an unrelated
/// tenant's shard never contends with this one (spec §4.3's isolation
/// requirement — no cross-tenant key collisions, no shared lock across
/// tenants).
#[derive(Default)]
pub struct CacheManager {
    tenants: RwLock<HashMap<TenantId, Arc<TenantCache>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly brings up an empty shard for `tenant_id`, called by the
    /// Tenant Context Manager when a tenant's context is activated.
    /// Idempotent: re-initializing an already-initialized tenant is a
    /// no-op that returns the existing shard.
    pub fn init_shard(&self, tenant_id: &TenantId) -> CoreResult<Arc<TenantCache>> {
        if let Some(shard) = self.existing_shard(tenant_id)? {
            return Ok(shard);
        }
        let mut guard = self.tenants.write().map_err(write_lock_poisoned)?;
        Ok(guard
            .entry(tenant_id.clone())
            .or_insert_with(|| Arc::new(TenantCache::default()))
            .clone())
    }

    /// Returns the tenant's cache shard. Fails with `TenantNotInitialized`
    /// rather than lazily creating one — the cache only exists for tenants
    /// whose context has been explicitly activated (spec §4.3's testable
    /// property: "a read on an uninitialized tenant raises
    /// TenantNotInitialized, not a miss").
    pub fn shard(&self, tenant_id: &TenantId) -> CoreResult<Arc<TenantCache>> {
        self.existing_shard(tenant_id)?
            .ok_or_else(|| CoreError::TenantNotInitialized(tenant_id.clone()))
    }

    fn existing_shard(&self, tenant_id: &TenantId) -> CoreResult<Option<Arc<TenantCache>>> {
        let guard = self.tenants.read().map_err(read_lock_poisoned)?;
        Ok(guard.get(tenant_id).cloned())
    }

    /// Drops a tenant's entire cache footprint, e.g. when the Tenant
    /// Context Manager closes the tenant's context.
    pub fn drop_tenant(&self, tenant_id: &TenantId) -> CoreResult<()> {
        let mut guard = self.tenants.write().map_err(write_lock_poisoned)?;
        guard.remove(tenant_id);
        Ok(())
    }

    pub fn tenant_ids(&self) -> CoreResult<Vec<TenantId>> {
        let guard = self.tenants.read().map_err(read_lock_poisoned)?;
        Ok(guard.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separate_tenants_get_separate_shards() {
        let manager = CacheManager::new();
        let a = manager.init_shard(&TenantId::from("a")).unwrap();
        let b = manager.init_shard(&TenantId::from("b")).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn repeated_lookups_return_the_same_shard() {
        let manager = CacheManager::new();
        let first = manager.init_shard(&TenantId::from("a")).unwrap();
        let second = manager.shard(&TenantId::from("a")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn drop_tenant_evicts_its_shard() {
        let manager = CacheManager::new();
        let first = manager.init_shard(&TenantId::from("a")).unwrap();
        manager.drop_tenant(&TenantId::from("a")).unwrap();
        let second = manager.init_shard(&TenantId::from("a")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn shard_on_an_uninitialized_tenant_fails_instead_of_creating_one() {
        let manager = CacheManager::new();
        let err = manager.shard(&TenantId::from("ghost")).unwrap_err();
        assert!(matches!(err, CoreError::TenantNotInitialized(_)));
    }
}
