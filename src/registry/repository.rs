use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use sqlx::PgPool;

use crate::error::{CoreError, CoreResult};
use crate::ids::TenantId;
use crate::registry::model::{TenantRecord, TenantStatus};

/// Persistence contract for the tenant registry (spec §4.1): load the full
/// table, register a newly-seen tenant as `inactive`, failing if it's
/// already registered, and transition a tenant's status. Kept as a trait so
/// the Tenant Context Manager can be exercised against a mock registry in
/// tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantsRepository: Send + Sync {
    async fn load(&self, tenant_id: &TenantId) -> CoreResult<Option<TenantRecord>>;
    async fn load_all(&self) -> CoreResult<Vec<TenantRecord>>;
    async fn register(&self, tenant_id: &TenantId) -> CoreResult<TenantRecord>;
    async fn update_status(&self, tenant_id: &TenantId, status: TenantStatus) -> CoreResult<()>;
}

/// Distinguishes "tenant already registered" (a unique-violation on
/// `tenant_id`) and "the registry itself is unreachable" (a pool timeout,
/// closed pool, or I/O failure) from any other database error, since both
/// are conditions callers need to handle distinctly from a generic
/// `CoreError::Database` (spec §7).
fn map_register_error(tenant_id: &TenantId, e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
    {
        return CoreError::AlreadyExists(tenant_id.clone());
    }
    if matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) {
        return CoreError::RegistryUnavailable(tenant_id.clone());
    }
    CoreError::Database(e)
}

pub struct PgTenantsRepository {
    pool: PgPool,
}

impl PgTenantsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantsRepository for PgTenantsRepository {
    async fn load(&self, tenant_id: &TenantId) -> CoreResult<Option<TenantRecord>> {
        let record = sqlx::query_as::<_, TenantRecord>(
            "SELECT id, tenant_id, status_raw, db_host, db_port, db_username, db_password, \
             db_name, db_max_pool_size FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn load_all(&self) -> CoreResult<Vec<TenantRecord>> {
        let records = sqlx::query_as::<_, TenantRecord>(
            "SELECT id, tenant_id, status_raw, db_host, db_port, db_username, db_password, \
             db_name, db_max_pool_size FROM tenants",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn register(&self, tenant_id: &TenantId) -> CoreResult<TenantRecord> {
        let record = sqlx::query_as::<_, TenantRecord>(
            "INSERT INTO tenants (id, tenant_id, status_raw, db_host, db_port, db_username, \
             db_password, db_name, db_max_pool_size) \
             VALUES (gen_random_uuid(), $1, 'inactive', '', 0, '', '', '', NULL) \
             RETURNING id, tenant_id, status_raw, db_host, db_port, db_username, db_password, \
             db_name, db_max_pool_size",
        )
        .bind(tenant_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_register_error(tenant_id, e))?;
        Ok(record)
    }

    async fn update_status(&self, tenant_id: &TenantId, status: TenantStatus) -> CoreResult<()> {
        let status_raw = match status {
            TenantStatus::Reserved => "reserved",
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
            TenantStatus::Archived => "archived",
        };
        let result = sqlx::query("UPDATE tenants SET status_raw = $1 WHERE tenant_id = $2")
            .bind(status_raw)
            .bind(tenant_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::TenantNotFound(tenant_id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_registry_reports_missing_tenant() {
        let mut mock = MockTenantsRepository::new();
        mock.expect_load()
            .withf(|id: &TenantId| id.as_str() == "acme")
            .returning(|_| Ok(None));
        let result = mock.load(&TenantId::from("acme")).await.unwrap();
        assert!(result.is_none());
    }
}
