use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::cache::CacheManager;
use crate::error::{CoreError, CoreResult, read_lock_poisoned, write_lock_poisoned};
use crate::ids::TenantId;
use crate::registry::{TenantStatus, TenantsRepository};

/// The live, in-memory handle for one active tenant: its database pool and
/// the moment it was brought into memory. Cheap to clone (`PgPool` is an
/// `Arc` internally); dropping the last clone does not close the pool — the
/// manager owns the canonical copy.
#[derive(Clone, Debug)]
pub struct TenantContext {
    tenant_id: TenantId,
    pool: PgPool,
}

impl TenantContext {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// The pool-sizing knobs applied to every tenant pool the manager opens
/// (spec §6): only `max_pool_size` varies per tenant record, the rest are
/// process-wide settings taken from the main database config.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
}

/// Outcome of a batch [`TenantContextManager::pre_activate`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreActivationReport {
    pub activated: usize,
    pub failed: usize,
}

/// Generalizes the teacher's `PgPoolManager` (one main pool + one default
/// tenant pool + a sharded map of tenant pools) into a manager that holds
/// exactly one pool per *active* tenant, built on demand from the tenant
/// registry rather than pre-seeded at startup (spec §4.2).
pub struct TenantContextManager {
    registry: Arc<dyn TenantsRepository>,
    cache: Arc<CacheManager>,
    pool_options: PoolOptions,
    contexts: RwLock<HashMap<TenantId, TenantContext>>,
}

impl TenantContextManager {
    pub fn new(registry: Arc<dyn TenantsRepository>, cache: Arc<CacheManager>, pool_options: PoolOptions) -> Self {
        Self {
            registry,
            cache,
            pool_options,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached context for `tenant_id`, building and caching one
    /// if this is the first request for an active tenant this process has
    /// seen. Errors if the tenant is unknown or not active.
    pub async fn get_context(&self, tenant_id: &TenantId) -> CoreResult<TenantContext> {
        if let Some(ctx) = self.cached(tenant_id)? {
            return Ok(ctx);
        }
        self.new_context_from_id(tenant_id).await
    }

    fn cached(&self, tenant_id: &TenantId) -> CoreResult<Option<TenantContext>> {
        let guard = self.contexts.read().map_err(read_lock_poisoned)?;
        Ok(guard.get(tenant_id).cloned())
    }

    /// Loads the tenant record, rejects inactive/unknown tenants, opens a
    /// fresh pool, and caches it. Called both from `get_context` on a cache
    /// miss and directly when pre-activating a tenant ahead of first use.
    pub async fn new_context_from_id(&self, tenant_id: &TenantId) -> CoreResult<TenantContext> {
        let record = self
            .registry
            .load(tenant_id)
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.clone()))?;
        if !record.status().is_usable() {
            return Err(CoreError::TenantNotActive(tenant_id.clone()));
        }
        self.open_pool_for(tenant_id, &record).await
    }

    /// Opens and caches a tenant's pool without checking the record's
    /// status, so the pre-activation sweep can probe a not-yet-active
    /// tenant's connection before flipping its status.
    async fn open_pool_for(
        &self,
        tenant_id: &TenantId,
        record: &crate::registry::TenantRecord,
    ) -> CoreResult<TenantContext> {
        let pool = PgPoolOptions::new()
            .max_connections(record.max_pool_size())
            .min_connections(self.pool_options.min_connections)
            .max_lifetime(self.pool_options.max_lifetime)
            .idle_timeout(self.pool_options.idle_timeout)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&record.database_url())
            .await?;
        sqlx::migrate!("./migrations/tenant").run(&pool).await?;
        let context = TenantContext {
            tenant_id: tenant_id.clone(),
            pool,
        };
        {
            let mut guard = self.contexts.write().map_err(write_lock_poisoned)?;
            guard.insert(tenant_id.clone(), context.clone());
        }
        self.cache.init_shard(tenant_id)?;
        Ok(context)
    }

    /// Batch pre-activation (spec §4.2): walks every registered tenant and
    /// brings each one not already active or reserved into the active
    /// state, probing its connection along the way. Run once at startup and
    /// whenever an operator wants every provisioned tenant warmed without
    /// waiting on first request.
    pub async fn pre_activate(&self) -> CoreResult<PreActivationReport> {
        let mut report = PreActivationReport::default();
        for record in self.registry.load_all().await? {
            let status = record.status();
            if matches!(status, TenantStatus::Active | TenantStatus::Reserved) {
                continue;
            }
            let tenant_id = record.tenant_id();
            match self.open_pool_for(&tenant_id, &record).await {
                Ok(_) => {
                    self.registry.update_status(&tenant_id, TenantStatus::Active).await?;
                    report.activated += 1;
                }
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Drops a tenant's cached context, e.g. on archival. The pool closes
    /// when its last clone (held by in-flight requests) is dropped.
    pub fn close(&self, tenant_id: &TenantId) -> CoreResult<()> {
        let mut guard = self.contexts.write().map_err(write_lock_poisoned)?;
        guard.remove(tenant_id);
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MockTenantsRepository, TenantRecord};

    fn test_pool_options() -> PoolOptions {
        PoolOptions {
            min_connections: 1,
            max_lifetime: Duration::from_secs(1800),
            idle_timeout: Duration::from_secs(180),
        }
    }

    fn manager(mock: MockTenantsRepository) -> TenantContextManager {
        TenantContextManager::new(Arc::new(mock), Arc::new(CacheManager::new()), test_pool_options())
    }

    fn inactive_record(tenant_id: &str) -> TenantRecord {
        TenantRecord {
            id: uuid::Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            status_raw: "inactive".to_string(),
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_username: "u".to_string(),
            db_password: "p".to_string(),
            db_name: "d".to_string(),
            db_max_pool_size: Some(2),
        }
    }

    #[tokio::test]
    async fn rejects_inactive_tenant() {
        let mut mock = MockTenantsRepository::new();
        mock.expect_load()
            .returning(|id| Ok(Some(inactive_record(id.as_str()))));
        let manager = manager(mock);
        let err = manager
            .new_context_from_id(&TenantId::from("acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TenantNotActive(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_tenant() {
        let mut mock = MockTenantsRepository::new();
        mock.expect_load().returning(|_| Ok(None));
        let manager = manager(mock);
        let err = manager.get_context(&TenantId::from("ghost")).await.unwrap_err();
        assert!(matches!(err, CoreError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn pre_activate_skips_tenants_that_are_already_active_or_reserved() {
        let mut mock = MockTenantsRepository::new();
        mock.expect_load_all().returning(|| {
            Ok(vec![
                TenantRecord {
                    status_raw: "active".to_string(),
                    ..inactive_record("already-active")
                },
                TenantRecord {
                    status_raw: "reserved".to_string(),
                    ..inactive_record("still-reserved")
                },
            ])
        });
        let manager = manager(mock);
        let report = manager.pre_activate().await.unwrap();
        assert_eq!(report, PreActivationReport { activated: 0, failed: 0 });
    }

    #[tokio::test]
    async fn pre_activate_counts_a_dead_tenant_pool_as_failed() {
        let mut mock = MockTenantsRepository::new();
        mock.expect_load_all()
            .returning(|| Ok(vec![inactive_record("unreachable")]));
        let manager = manager(mock);
        let report = manager.pre_activate().await.unwrap();
        assert_eq!(report, PreActivationReport { activated: 0, failed: 1 });
    }
}
