use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use filewatch::{FileWatchServer, ServerConfig};
use tokio::net::TcpListener;

/// Streams lines appended to a file to WebSocket clients.
#[derive(Debug, Parser)]
#[command(name = "filewatch", version)]
struct Cli {
    /// HTTP service address, e.g. `:8080` or `127.0.0.1:8080`
    #[arg(long, env = "FILEWATCH_ADDR")]
    addr: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(long, env = "FILEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Append synthetic lines to the tailed files in the background
    #[arg(long)]
    demo: bool,

    /// File to tail, optionally followed by the file to switch over to
    #[arg(num_args = 0..=2)]
    files: Vec<PathBuf>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => ServerConfig::default(),
        };
        if let Some(addr) = self.addr {
            config.addr = normalize_addr(&addr);
        }
        if !self.files.is_empty() {
            config.paths = self.files;
        }
        config.demo |= self.demo;
        Ok(config)
    }
}

/// Accepts the `:port` shorthand for all interfaces.
fn normalize_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let server = FileWatchServer::new(config)?;

    let addr = server.config().addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
        }
        shutdown.cancel();
    });

    server.serve(listener).await?;
    Ok(())
}
