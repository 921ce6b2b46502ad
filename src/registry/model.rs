use serde::{Deserialize, Serialize};

use crate::ids::TenantId;

/// Lifecycle state of a tenant row, per the registry's state machine
/// (reserved on first sight, activated once provisioning completes,
/// archived when retired). Status transitions are one-directional except
/// `active <-> inactive`, which toggles on suspend/resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    Reserved,
    Active,
    Inactive,
    Archived,
}

impl TenantStatus {
    pub fn is_usable(self) -> bool {
        matches!(self, TenantStatus::Active)
    }
}

/// A row in the tenant registry. `database` is opaque connection
/// configuration the context manager uses to build a pool; the registry
/// itself never opens a connection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRecord {
    pub id: uuid::Uuid,
    pub tenant_id: String,
    pub status_raw: String,
    pub db_host: String,
    pub db_port: i32,
    pub db_username: String,
    pub db_password: String,
    pub db_name: String,
    pub db_max_pool_size: Option<i32>,
}

impl TenantRecord {
    pub fn tenant_id(&self) -> TenantId {
        TenantId(self.tenant_id.clone())
    }

    pub fn status(&self) -> TenantStatus {
        match self.status_raw.as_str() {
            "active" => TenantStatus::Active,
            "inactive" => TenantStatus::Inactive,
            "archived" => TenantStatus::Archived,
            _ => TenantStatus::Reserved,
        }
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_username, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }

    pub fn max_pool_size(&self) -> u32 {
        self.db_max_pool_size.unwrap_or(5).max(1) as u32
    }
}
