use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::http::{content, sse, state};

/// Builds the `/api` router, mirroring the teacher's `init_default_app`
/// shape (per-module `.merge(routes(...))` composition under a shared
/// `TraceLayer`): the SSE push endpoint, a read-through content route
/// exercising the Repository Facades, and the state-event route driving
/// the Invalidation Pipeline.
pub fn router(state_: AppState) -> Router {
    Router::new()
        .route("/api/events", get(sse::events))
        .route("/api/content/{kind}/{id}", get(content::get_one))
        .route("/api/state", post(state::state_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state_)
}
