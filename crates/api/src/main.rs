use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stemsep_api::config::ServerConfig;
use stemsep_api::router::build_app_router;
use stemsep_api::state::AppState;
use stemsep_core::config::EngineConfig;
use stemsep_core::engine::SeparationEngine;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "stemsep_api=debug,stemsep_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let engine_config = EngineConfig::from_env();
    tracing::info!(
        upload_dir = %engine_config.upload_dir.display(),
        output_dir = %engine_config.output_dir.display(),
        separator = %engine_config.toolchain.separator_bin.display(),
        "Loaded engine configuration",
    );

    // --- Engine ---
    let engine = SeparationEngine::new(engine_config);
    engine
        .init()
        .await
        .expect("Failed to create upload/output directories");

    let report = engine.check_installation().await;
    if report.all_installed {
        tracing::info!("External tools found");
    } else {
        tracing::warn!(
            dependencies = ?report.dependencies.keys().collect::<Vec<_>>(),
            "{}; jobs will fail until they are installed",
            report.message,
        );
    }

    // --- Router ---
    let state = AppState::new(engine, config.clone());
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    // Bound the drain of in-flight requests (e.g. long downloads).
    let server = async move {
        let mut server = std::pin::pin!(server.into_future());
        tokio::select! {
            res = &mut server => res,
            () = async {
                shutdown_signal().await;
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                tracing::warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Shutdown timeout elapsed, dropping open connections",
                );
                Ok(())
            }
        }
    };
    server.await.expect("Server error");

    // Running separator processes are killed when their tasks are dropped.
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
