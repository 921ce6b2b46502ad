use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::header::ETAG;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;

use crate::app_state::AppState;
use crate::error::CoreError;
use crate::http::extractors::TenantHeader;
use crate::ids::{ContentId, Variant};

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    variant: Option<String>,
    slug: Option<String>,
}

fn parse_id(raw: &str) -> Result<ContentId, CoreError> {
    raw.parse::<uuid::Uuid>()
        .map(ContentId)
        .map_err(|_| CoreError::InvalidInput(format!("invalid content id: {raw}")))
}

/// Reads one content entity through the Repository Facade for the kind
/// named in the path, by id or (with `?slug=`) by slug — the one real HTTP
/// surface exercising `ContentRepository<K>`'s cache-then-DB read-through
/// (spec §4.5/§6).
pub async fn get_one(
    State(state): State<AppState>,
    TenantHeader(tenant_id): TenantHeader,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<ContentQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let context = state.contexts.get_context(&tenant_id).await?;
    let pool = context.pool();
    let variant = query.variant.map(Variant).unwrap_or_default();
    let content = &state.content;

    let result: Option<(Value, String)> = match (kind.as_str(), &query.slug) {
        ("storyfragments", Some(slug)) => content.storyfragment.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("storyfragments", None) => content.storyfragment.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("panes", Some(slug)) => content.pane.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("panes", None) => content.pane.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("menus", Some(slug)) => content.menu.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("menus", None) => content.menu.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("resources", Some(slug)) => content.resource.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("resources", None) => content.resource.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("tractstacks", Some(slug)) => content.tractstack.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("tractstacks", None) => content.tractstack.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("files", Some(slug)) => content.file.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("files", None) => content.file.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("beliefs", Some(slug)) => content.belief.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("beliefs", None) => content.belief.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        ("epinets", Some(slug)) => content.epinet.find_by_slug(pool, &tenant_id, slug, &variant).await?,
        ("epinets", None) => content.epinet.find_by_id(pool, &tenant_id, parse_id(&id)?, &variant).await?,
        (other, _) => return Err(CoreError::InvalidInput(format!("unknown content kind: {other}"))),
    };

    match result {
        Some((payload, etag)) => Ok((axum::http::StatusCode::OK, [(ETAG, etag)], Json(payload)).into_response()),
        None => {
            let body = Json(serde_json::json!({ "error": format!("content not found: {kind}/{id}") }));
            Ok((axum::http::StatusCode::NOT_FOUND, body).into_response())
        }
    }
}
