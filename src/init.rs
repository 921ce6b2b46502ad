use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::cleanup::CleanupWorker;
use crate::config::AppConfig;
use crate::http;

pub fn init_subscriber() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Builds the composition root, runs the registry's migrations, starts the
/// cleanup worker, and returns the router plus a cancellation token the
/// caller uses to stop the worker on graceful shutdown — generalizing the
/// teacher's `init_default_app` (state construction, migrations, router
/// assembly) to this spec's smaller external surface.
pub async fn init_default_app() -> Result<(Arc<AppConfig>, axum::Router, CancellationToken)> {
    let config = AppConfig::from_env()?;
    let state = AppState::init(config).await?;
    let config = state.config.clone();

    sqlx::migrate!("./migrations/main").run(&state.main_pool).await?;

    let report = state.contexts.pre_activate().await?;
    event!(
        Level::INFO,
        activated = report.activated,
        failed = report.failed,
        "tenant pre-activation sweep complete"
    );

    let token = CancellationToken::new();
    let worker = Arc::new(CleanupWorker::new(
        state.cache.clone(),
        state.registry.clone(),
        state.config.cleanup().interval(),
        state.config.cleanup().verbose(),
        state.config.cache().analytics_ttl(),
        state.config.cache().current_hour_ttl(),
    ));
    worker.spawn(token.clone());

    let router = http::router(state);
    Ok((config, router, token))
}
