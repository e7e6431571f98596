//! Node binary: wires the storage engine, the cluster coordinator, and
//! the `/v0` HTTP service together from CLI flags.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meridiandb::cluster::{Coordinator, Topology};
use meridiandb::engine::{Engine, EngineConfig};
use meridiandb::service;

#[derive(Parser, Debug)]
#[command(name = "meridiandb", about = "Replicated LSM key-value store")]
struct Args {
    /// Directory holding this node's tables.
    #[arg(long)]
    data_dir: PathBuf,

    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// This node's base URL exactly as peers address it.
    #[arg(long)]
    public_url: String,

    /// Base URL of another cluster node; repeat once per peer.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Memtable size estimate (bytes) that triggers a background flush.
    #[arg(long, default_value_t = EngineConfig::default().flush_threshold)]
    flush_threshold: usize,

    /// Background flush worker threads.
    #[arg(long, default_value_t = EngineConfig::default().flush_workers)]
    flush_workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let engine = Engine::open(
        &args.data_dir,
        EngineConfig {
            flush_threshold: args.flush_threshold,
            flush_workers: args.flush_workers,
        },
    )
    .with_context(|| format!("opening engine at {}", args.data_dir.display()))?;

    let mut nodes = args.peers.clone();
    nodes.push(args.public_url.clone());
    let topology = Topology::new(args.public_url, nodes).context("building topology")?;
    let coordinator =
        Arc::new(Coordinator::new(engine.clone(), topology).context("building coordinator")?);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(listen = %args.listen, "serving /v0");

    axum::serve(listener, service::router(coordinator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    engine.close().context("closing engine")?;
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
