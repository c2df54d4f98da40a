//! Deal or No Deal HTTP server binary

use clap::Parser;
use dealornot::{api::ApiServer, ConfigLoader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dealornot")]
#[command(about = "Deal or No Deal game server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API host
    #[arg(long)]
    host: Option<String>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override RocksDB directory
    #[arg(long)]
    db_path: Option<String>,

    /// Keep all state in memory
    #[arg(long)]
    no_persist: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.db_path = db_path;
    }
    if args.no_persist {
        config.storage.enabled = false;
    }
    config.validate()?;

    if let Some(path) = &args.write_config {
        loader.save(&config, path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "dealornot={},tower_http=info",
                    config.monitoring.log_level.as_filter()
                )
                .into()
            }),
        )
        .init();

    ApiServer::new(config).run().await
}
