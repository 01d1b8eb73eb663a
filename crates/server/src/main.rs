mod bootstrap;
mod chat;
mod health;
mod pdf;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mercalytica_core::config::{AppConfig, LoadOptions};
use tokio::net::TcpListener;
use tokio::sync::Notify;

fn init_logging(config: &AppConfig) {
    use mercalytica_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging comes up before bootstrap so store mode decisions are visible.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("binding {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        store_mode = app.store.mode().as_str(),
        "mercalytica-server listening"
    );

    let shutdown = Arc::new(Notify::new());
    let drain_deadline = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let server = axum::serve(listener, app.router())
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()))
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(drain_deadline).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                graceful_shutdown_secs = drain_deadline.as_secs(),
                "in-flight requests did not finish before the drain deadline"
            );
        }
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "mercalytica-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown(shutdown: Arc<Notify>) {
    shutdown_on(tokio::signal::ctrl_c(), shutdown).await;
}

/// Completes once `signal` fires. A signal that cannot be registered never
/// completes, so the server keeps running instead of stopping at startup.
async fn shutdown_on<F>(signal: F, shutdown: Arc<Notify>)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(error) = signal.await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal, graceful shutdown disabled"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "shutdown signal received, draining connections"
    );
    shutdown.notify_one();
}
