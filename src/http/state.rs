use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::CoreError;
use crate::http::extractors::TenantHeader;
use crate::ids::{FingerprintId, PaneId, SessionId, StoryFragmentId};

#[derive(Debug, Deserialize)]
pub struct StateEvent {
    fingerprint: uuid::Uuid,
    session: uuid::Uuid,
    storyfragment: uuid::Uuid,
    belief: String,
    value: String,
    goto_pane_id: Option<uuid::Uuid>,
}

/// The client state-event endpoint (spec §4.7/§6): the request entry point
/// for the Invalidation Pipeline, the only production call site for
/// `InvalidationPipeline::apply_belief_update`.
pub async fn state_event(
    State(state): State<AppState>,
    TenantHeader(tenant_id): TenantHeader,
    Json(event): Json<StateEvent>,
) -> Result<impl IntoResponse, CoreError> {
    let outcome = state.pipeline.apply_belief_update(
        &tenant_id,
        SessionId(event.session),
        FingerprintId(event.fingerprint),
        StoryFragmentId(event.storyfragment),
        &event.belief,
        &event.value,
        event.goto_pane_id.map(PaneId),
    )?;

    Ok(Json(serde_json::json!({
        "affectedPanes": outcome.affected_panes,
        "invalidatedFragmentCount": outcome.invalidated_fragment_count,
        "notifiedSessions": outcome.notified_sessions,
    })))
}
