//! Startup helpers for the chat digest server.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::digest::core::config::DigestConfig;
use crate::server::{self, AppState};

/// Run the server (used by the `chat-digest-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting chat digest v{}", env!("CARGO_PKG_VERSION"));

    match serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn serve() -> anyhow::Result<()> {
    let (config, state) = initialize()?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    rt.block_on(server::run_server_with_shutdown(
        state,
        &config.server,
        shutdown_signal(),
    ))
    .map_err(|e| anyhow::anyhow!("Server error: {e}"))
}

/// Load configuration from the environment and build application state
/// without starting the server.
///
/// # Errors
/// Returns an error if the configuration is invalid or state creation fails.
pub fn initialize() -> anyhow::Result<(DigestConfig, Arc<AppState>)> {
    let config = DigestConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        "Completion endpoint: {} (model {}, {} mode, json_mode={}, {} retries)",
        config.llm.api_url,
        config.llm.model,
        config.llm.response_mode,
        config.llm.json_mode,
        config.llm.max_retries
    );

    let state = AppState::from_config(&config).context("Failed to create state")?;
    Ok((config, state))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
