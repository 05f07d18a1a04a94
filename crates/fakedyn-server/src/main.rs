//! fakedyn server binary.
//!
//! Opens an engine (replaying its log, if persistent) and serves it over a
//! Unix domain socket.

use std::path::{Path, PathBuf};

use clap::Parser;
use fakedyn_core::{Engine, EngineConfig};
use fakedyn_server::FakedynServer;
use tracing::info;

/// fakedyn: a local DynamoDB-compatible store served over a Unix socket.
#[derive(Parser, Debug)]
#[command(name = "fakedyn-server", version)]
struct Cli {
    /// Persistence log path (default: ~/.local/share/fakedyn/fakedyn.log).
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Unix socket path (default: ~/.local/share/fakedyn/server.sock).
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// JSON file with engine limits and log settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep everything in memory; nothing is persisted.
    #[arg(long, conflicts_with = "log")]
    in_memory: bool,

    /// Log size in bytes that triggers compaction.
    #[arg(long)]
    compaction_threshold: Option<u64>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fakedyn")
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = default_data_dir();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.in_memory {
        config.log.path = None;
    } else if let Some(log) = cli.log {
        config.log.path = Some(log);
    } else if config.log.path.is_none() {
        config.log.path = Some(data_dir.join("fakedyn.log"));
    }
    if let Some(threshold) = cli.compaction_threshold {
        config.log.compaction_threshold = threshold;
    }
    let socket_path = cli.socket.unwrap_or_else(|| data_dir.join("server.sock"));

    // Ensure parent directories exist.
    if let Some(parent) = config.log.path.as_deref().and_then(Path::parent) {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    info!(
        log = %config.log.path.as_deref().map_or("<memory>".to_string(), |p| p.display().to_string()),
        socket = %socket_path.display(),
        "starting"
    );

    let engine = Engine::open(config)?;
    let server = FakedynServer::new(engine, socket_path);
    server.run().await?;

    Ok(())
}
