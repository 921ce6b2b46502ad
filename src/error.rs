use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{Level, event};

use crate::ids::TenantId;

/// Every fallible operation in the core (registry, context manager, cache,
/// repositories, cleanup worker, push broadcaster) returns `CoreError`. The
/// variant set mirrors the error kinds enumerated for the invalidation and
/// caching pipeline: lock poisoning, missing tenants/pools, stale ETags,
/// and the underlying database driver.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown tenant: {0}")]
    TenantNotFound(TenantId),

    #[error("tenant is not active: {0}")]
    TenantNotActive(TenantId),

    #[error("tenant pool not found for {0}")]
    TenantPoolNotFound(TenantId),

    #[error("tenant identifier missing from request")]
    TenantMissing,

    #[error("tenant already registered: {0}")]
    AlreadyExists(TenantId),

    #[error("registry unavailable while handling {0}")]
    RegistryUnavailable(TenantId),

    #[error("tenant cache not initialized: {0}")]
    TenantNotInitialized(TenantId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cache read lock poisoned: {0}")]
    CacheReadLock(String),

    #[error("cache write lock poisoned: {0}")]
    CacheWriteLock(String),

    #[error("stale write: expected etag {expected}, found {found}")]
    StaleEtag { expected: String, found: String },

    #[error("fingerprint {0} not found in session index")]
    FingerprintNotFound(String),

    #[error("{0}")]
    Custom(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Records the error at a level appropriate to its kind and returns it
    /// unchanged, so call sites can `.traced()` at the point they're raised
    /// without splitting the log statement from the construction.
    pub fn traced(self) -> Self {
        match &self {
            CoreError::TenantNotFound(_) | CoreError::TenantMissing => {
                event!(Level::DEBUG, error = %self, "rejecting request");
            }
            CoreError::TenantNotActive(_) | CoreError::InvalidInput(_) | CoreError::AlreadyExists(_) => {
                event!(Level::INFO, error = %self, "rejecting request");
            }
            CoreError::StaleEtag { .. } => {
                event!(Level::DEBUG, error = %self, "conditional write rejected");
            }
            CoreError::CacheReadLock(_) | CoreError::CacheWriteLock(_) => {
                event!(Level::ERROR, error = %self, "lock poisoned");
            }
            CoreError::TenantNotInitialized(_) | CoreError::RegistryUnavailable(_) => {
                event!(Level::WARN, error = %self, "tenant not ready");
            }
            _ => {
                event!(Level::ERROR, error = %self, "internal failure");
            }
        }
        self
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::TenantMissing | CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::TenantNotActive(_) => StatusCode::FORBIDDEN,
            CoreError::AlreadyExists(_) => StatusCode::CONFLICT,
            CoreError::RegistryUnavailable(_) | CoreError::TenantNotInitialized(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoreError::StaleEtag { .. } => StatusCode::PRECONDITION_FAILED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            CoreError::Database(_)
            | CoreError::Migrate(_)
            | CoreError::CacheReadLock(_)
            | CoreError::CacheWriteLock(_)
            | CoreError::Internal(_) => {
                json!({ "error": "an unexpected error occurred" })
            }
            other => json!({ "error": other.to_string() }),
        };
        self.traced();
        (status, axum::Json(body)).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Maps a poisoned `RwLock` read guard to its `CoreError` variant. Kept as a
/// free function rather than a blanket `From` impl so read and write
/// poisoning stay distinguishable at the call site.
pub fn read_lock_poisoned<T>(e: std::sync::PoisonError<T>) -> CoreError {
    CoreError::CacheReadLock(e.to_string())
}

pub fn write_lock_poisoned<T>(e: std::sync::PoisonError<T>) -> CoreError {
    CoreError::CacheWriteLock(e.to_string())
}
