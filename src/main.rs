mod classifier;
mod config;
mod gemini;
mod line;
mod notion;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::prelude::*;

use config::Config;
use gemini::GeminiClient;
use line::LineClient;
use notion::NotionClient;
use server::AppState;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            ),
    );

    let _guard = if let Some(ref log_dir) = config.log_dir {
        std::fs::create_dir_all(log_dir).ok();
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("memoline.log"))
            .expect("Failed to open log file");
        let (non_blocking, guard) = tracing_appender::non_blocking(log_file);
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(
                        tracing_subscriber::EnvFilter::from_default_env()
                            .add_directive(tracing::Level::INFO.into()),
                    ),
            )
            .init();
        Some(guard)
    } else {
        registry.init();
        None
    };

    info!("🚀 Starting memoline...");
    info!("Gemini model: {}", config.gemini_model);

    let state = Arc::new(AppState {
        channel_secret: config.line_channel_secret.clone(),
        model: Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
        )),
        store: Arc::new(NotionClient::new(
            config.notion_api_key.clone(),
            config.notion_database_id.clone(),
        )),
        messenger: Arc::new(LineClient::new(config.line_channel_access_token.clone())),
    });

    let router = server::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    info!("Listening on {addr}");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        () = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
