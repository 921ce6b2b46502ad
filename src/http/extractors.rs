use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::CoreError;
use crate::ids::TenantId;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Reads the tenant identifier from the `x-tenant-id` header (spec §6).
/// Unlike the teacher's `ClientContext` (infallible, always falls back to
/// a default), this extractor is fallible: a missing or empty header is a
/// client error, not something the server can guess at.
pub struct TenantHeader(pub TenantId);

impl<S> FromRequestParts<S> for TenantHeader
where
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CoreError::TenantMissing)?;
        Ok(TenantHeader(TenantId::from(value)))
    }
}
