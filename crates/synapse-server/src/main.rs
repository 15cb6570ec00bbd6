//! Synapse Server
//!
//! Stores each user's settings and app state as encrypted, versioned blobs
//! and serves them to Synapse clients.
//!
//! ## Endpoints
//!
//! - `GET /health`
//! - `GET|POST /api/settings`
//! - `GET|POST /api/app-state`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use synapse_server::{api, auth::Sessions, crypto::PayloadCipher, db::Database, ServerState};

/// Synapse Server - encrypted state sync for Synapse clients
#[derive(Parser, Debug)]
#[command(name = "synapse-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Data directory for the record database
    #[arg(long, default_value = "data", env = "SYNAPSE_SERVER_DATA_DIR")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value = "8080", env = "SYNAPSE_SERVER_PORT")]
    port: u16,

    /// Base64-encoded 32-byte key for payload encryption
    #[arg(long, env = "SYNAPSE_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: String,

    /// TOML file mapping bearer tokens to user ids
    #[arg(long, env = "SYNAPSE_SESSIONS")]
    sessions: PathBuf,

    /// Log level
    #[arg(long, default_value = "info", env = "SYNAPSE_LOG")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Synapse Server");
    info!(data_dir = %args.data_dir.display(), "Data directory");

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .context("Failed to create data directory")?;

    let db_path = args.data_dir.join("synapse.db");
    let db = Arc::new(Database::open(&db_path).context("Failed to open database")?);
    info!(path = %db_path.display(), "Database initialized");

    let cipher =
        PayloadCipher::from_base64(&args.encryption_key).context("Invalid encryption key")?;

    let sessions = Sessions::load(&args.sessions)?;
    if sessions.is_empty() {
        warn!(path = %args.sessions.display(), "No sessions configured, every request will be rejected");
    } else {
        info!(count = sessions.len(), "Sessions loaded");
    }

    let state = ServerState::new(db, cipher, sessions);
    let app = api::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Synapse Server shutting down");
    Ok(())
}

/// Wait for a ctrl-c signal for graceful shutdown
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl-c, initiating graceful shutdown"),
        Err(e) => {
            error!(error = %e, "Failed to listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
