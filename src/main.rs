#![forbid(unsafe_code)]

//! `streamgate`: resumable MCP Streamable HTTP server binary.
//!
//! Bootstraps configuration, the session store, the idle sweeper and the
//! HTTP transport, then waits for a shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use streamgate::config::GlobalConfig;
use streamgate::mcp::auth;
use streamgate::mcp::handler::BuiltinHandler;
use streamgate::mcp::http::{self, AppState};
use streamgate::mcp::router::Router;
use streamgate::orchestrator::idle_sweeper;
use streamgate::orchestrator::session_store::SessionStore;
use streamgate::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "streamgate", about = "Resumable MCP Streamable HTTP server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the listen host.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = load_config(&args)?;
    init_tracing(args.log_format, &config.log_level)?;
    info!("streamgate server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(config))
}

/// File (or defaults), then environment, then command line.
fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(host) = &args.host {
        config.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: GlobalConfig) -> Result<()> {
    let config = Arc::new(config);
    info!(
        host = %config.host,
        port = config.port,
        endpoint = %config.endpoint,
        auth = config.auth_enabled(),
        "configuration loaded"
    );

    // ── Build shared application state ──────────────────
    let store = Arc::new(SessionStore::new(config.session.buffer_capacity));
    let handler = Arc::new(BuiltinHandler::new(
        config.server_info.name.clone(),
        config.server_info.version.clone(),
    ));
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        store: Arc::clone(&store),
        router: Router::new(handler, config.session.mirror_responses_to_stream),
        authorizer: auth::from_api_key(config.api_key.as_deref()),
    });

    // ── Start idle sweeper ──────────────────────────────
    let ct = CancellationToken::new();
    let sweeper_handle = idle_sweeper::spawn_idle_sweeper(
        Arc::clone(&store),
        config.session.sweep_interval(),
        config.session.idle_timeout(),
        ct.clone(),
    );
    info!("idle sweeper started");

    // ── Start transport ─────────────────────────────────
    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_http(http_state, http_ct).await {
            error!(%err, "http transport failed");
        }
    });

    info!("MCP server ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(http_handle, sweeper_handle);
    let remaining = store.terminate_all();
    info!(remaining, "streamgate shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, default_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
