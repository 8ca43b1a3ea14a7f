//! # foremand
//!
//! Foreman server binary: boots the store, registers the tool surface,
//! starts the stale sweeper, and serves newline-delimited JSON tool calls
//! over stdio. HTTP/MCP transports wrap this same envelope externally.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use foreman_core::ForemanConfig;
use foreman_engine::Foreman;
use foreman_rpc::types::{error_response, with_id, RpcRequest};
use foreman_rpc::{MethodRegistry, RpcContext, RpcError};

/// Foreman task-coordination server.
#[derive(Parser, Debug)]
#[command(name = "foremand", about = "Task coordinator for agent fleets")]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides the config file; omit for an
    /// in-memory store).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Reservation lease timeout in hours (overrides the config file).
    #[arg(long)]
    stale_timeout_hours: Option<f64>,
}

impl Cli {
    fn resolve_config(&self) -> Result<ForemanConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?
            }
            None => ForemanConfig::default(),
        };
        if let Some(ref db_path) = self.db_path {
            config.db_path = Some(db_path.clone());
        }
        if let Some(timeout) = self.stale_timeout_hours {
            config.stale_timeout_hours = timeout;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let sweep_interval = config.sweep_interval();

    let foreman = Foreman::open(config).context("failed to open the store")?;
    let registry = foreman_rpc::build_registry();
    let ctx = RpcContext::new(foreman.clone());

    info!(
        tools = registry.methods().len(),
        sweep_interval_secs = sweep_interval.as_secs(),
        "foremand ready"
    );

    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(foreman.sweeper().run(cancel.clone()));

    let served = serve_stdio(&registry, &ctx).await;

    cancel.cancel();
    let _ = sweeper.await;
    served
}

/// Serve `{method, params}` requests, one JSON document per line.
async fn serve_stdio(registry: &MethodRegistry, ctx: &RpcContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => {
                let id = request.id.clone();
                with_id(registry.dispatch(&request, ctx).await, id)
            }
            Err(err) => {
                error!(error = %err, "malformed request line");
                error_response(&RpcError::invalid_params(format!(
                    "malformed request: {err}"
                )))
            }
        };

        let mut serialized = serde_json::to_vec(&response)?;
        serialized.push(b'\n');
        stdout.write_all(&serialized).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
