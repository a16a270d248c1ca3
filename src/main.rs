//! P2P Live Share 시그널링 서버 실행 파일

use anyhow::Context;
use live_share_signaling::{build_router, config::Config, state::AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(&config));
    let app = build_router(state);

    let addr = config.display_addr();
    let listener = tokio::net::TcpListener::bind((config.hostname.as_str(), config.port))
        .await
        .inspect_err(|e| tracing::error!(address = %addr, error = %e, "Failed to bind"))
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Starting WebSocket signaling server");
    tracing::info!("Listening on ws://{}/", addr);
    if config.manual_delay_ms > 0 {
        tracing::info!(delay_ms = config.manual_delay_ms, "Manual relay delay enabled");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Ctrl-C 또는 SIGTERM 대기
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutting down server...");
}
