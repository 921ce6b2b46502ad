use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{Level, event};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::CoreError;
use crate::http::extractors::TenantHeader;
use crate::ids::{SessionId, TenantId};
use crate::push::PushBroadcaster;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SseParams {
    session_id: Uuid,
}

/// The SSE push endpoint (spec §4.8/§6): registers the caller's session
/// with the `PushBroadcaster` and streams `PushEvent`s as they arrive,
/// following the `ReceiverStream` + `Sse::keep_alive` shape used for
/// real-time streaming elsewhere in the retrieved pack.
pub async fn events(
    State(state): State<AppState>,
    TenantHeader(tenant_id): TenantHeader,
    Query(params): Query<SseParams>,
) -> Result<impl IntoResponse, CoreError> {
    let session_id = SessionId(params.session_id);
    let capacity = state.config.push().channel_capacity();
    let rx = state
        .broadcaster
        .add_client(tenant_id.clone(), session_id, capacity)?;

    event!(Level::DEBUG, tenant = %tenant_id, session = %session_id, "sse client connected");

    let _cleanup = DisconnectGuard {
        broadcaster: state.broadcaster.clone(),
        tenant_id: tenant_id.clone(),
        session_id,
    };

    let stream = ReceiverStream::new(rx).map(move |push_event| {
        let _keep_alive = &_cleanup;
        let data = serde_json::to_string(&push_event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, Infallible>(Event::default().event("panes_updated").data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().text("keep-alive")))
}

/// Removes the session's channel from the broadcaster once the SSE stream
/// (and therefore this guard) is dropped, whether the client disconnected
/// or the connection errored out.
struct DisconnectGuard {
    broadcaster: Arc<PushBroadcaster>,
    tenant_id: TenantId,
    session_id: SessionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if let Err(e) = self.broadcaster.remove_client(&self.tenant_id, &self.session_id) {
            event!(Level::WARN, error = %e, "failed to remove disconnected sse client");
        }
    }
}
