/// Codeden
/// Self-hosted code editor backend: files and one-shot commands confined to
/// a root directory, plus an opt-in interactive terminal served by a
/// separate, supervised process.
///
/// Module structure:
/// - commands: HTTP action handlers (web client -> backend)
/// - services: Business logic for files, commands, terminals and git
/// - models: Shared data types
/// - server: axum routers for the API server and the terminal host

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
pub mod services;

use commands::AppState;
use config::Config;
use server::{api_router, shutdown_signal, terminal_router, TerminalHost};
use services::{SessionRegistry, TerminalOptions};
use std::path::PathBuf;
use std::sync::Arc;

/// Run the request-handling server until a shutdown signal arrives.
pub async fn run_server(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config, config_path)?);

    log::info!("[Server] Root: {}", state.root.display());
    log::info!(
        "[Server] Password protection: {}",
        if config.password().is_some() { "enabled" } else { "disabled" }
    );
    log::info!(
        "[Server] Interactive terminal: {}",
        if config.terminal.enabled {
            format!("enabled on port {}", config.terminal.port)
        } else {
            "disabled".to_string()
        }
    );

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);

    let app = api_router(state, config.password().map(str::to_string));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run the terminal host: one PTY per WebSocket connection, every shell
/// killed on shutdown.
pub async fn run_terminal_host(
    config: Config,
    port: u16,
    shell: String,
    password: Option<String>,
) -> anyhow::Result<()> {
    if !config.terminal.enabled {
        anyhow::bail!("interactive terminal is disabled (set terminal.enabled = true)");
    }

    let registry = Arc::new(SessionRegistry::new());
    let host = Arc::new(TerminalHost {
        options: TerminalOptions::new(shell.clone()),
        registry: registry.clone(),
        allowed_origins: config.terminal.allowed_origins.clone(),
        password,
    });

    let addr = format!("{}:{}", config.terminal.bind, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!(
        "[Terminal] Host listening on ws://{} with shell {}",
        listener.local_addr()?,
        shell
    );

    axum::serve(listener, terminal_router(host))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = tokio::task::spawn_blocking(move || registry.close_all()).await;
        })
        .await?;
    Ok(())
}
