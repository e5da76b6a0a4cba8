use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::RngCore;
use satchel_server::{SatchelServer, ServerConfig};
use satchel_store::{MemoryBlobStore, MemoryDocumentStore};

#[derive(Parser)]
#[command(name = "satcheld", about = "Satchel backend server", version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the config file
    #[arg(short, long)]
    bind: Option<std::net::SocketAddr>,

    /// Shared secret, overrides the config file
    #[arg(long)]
    secret: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(secret) = &cli.secret {
        config.secret = secret.clone();
    }
    Ok(config)
}

fn generated_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    let config = load_config(&cli)?;

    // A missing secret is not filled in silently: the operator must persist
    // the generated one in their config and in every client.
    if config.secret.is_empty() {
        let secret = generated_secret();
        tracing::warn!("no secret configured, generated a new one");
        eprintln!("Generated secret (copy it to your config and clients):\n\n  {secret}\n");
        anyhow::bail!("no secret configured");
    }
    if !config.secret_is_valid() {
        anyhow::bail!("secret must be 64 hex characters");
    }

    tracing::info!(
        bind_addr = %config.bind_addr,
        path_prefix = %config.path_prefix,
        allow_destroy = config.allow_destroy,
        allow_drop = config.allow_drop,
        secret = "[redacted]",
        "starting satchel"
    );

    let server = SatchelServer::new(
        config,
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(MemoryBlobStore::new()),
    );
    server.serve().await?;
    Ok(())
}
