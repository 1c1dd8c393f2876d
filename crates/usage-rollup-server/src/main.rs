use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use usage_rollup_server::{server, ServerConfig};

#[derive(Parser)]
#[command(name = "usage-rollup-server")]
#[command(about = "Weekly usage aggregation service", long_about = None)]
struct Args {
    #[arg(short, long, help = "Path to the TOML configuration file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = ServerConfig::load(args.config.as_deref())?;
    let config = loaded.config;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting usage rollup server");
    if loaded.created {
        info!(path = ?loaded.path, "Configuration file not found, wrote defaults");
    } else {
        info!(path = ?loaded.path, "Loaded configuration");
    }

    if let Err(e) = server::run(config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Usage rollup server stopped");
    Ok(())
}
