#![forbid(unsafe_code)]
mod app_state;
mod cache;
mod cleanup;
mod config;
mod content;
mod context;
mod error;
mod http;
mod ids;
mod init;
mod push;
mod registry;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::init::{init_default_app, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    serve().await
}

async fn serve() -> anyhow::Result<()> {
    init_subscriber();
    let (config, app, cleanup_token) = init_default_app().await?;

    let addr = format!("{}:{}", config.server().host(), config.server().port());
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_token))
        .await?;
    Ok(())
}

async fn shutdown_signal(cleanup_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    cleanup_token.cancel();
}
