use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "usage-rollup-ctl")]
#[command(about = "Usage rollup CLI control tool", long_about = None)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "USAGE_ROLLUP_URL",
        default_value = "http://127.0.0.1:8080",
        help = "Base URL of the usage rollup server"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the week a rollup would aggregate
    Window {
        #[arg(long, help = "RFC3339 reference instant (defaults to now)")]
        at: Option<String>,
    },

    /// Mint a device token for a user
    Token {
        #[arg(short, long)]
        user: String,
        #[arg(long, env = "USAGE_ROLLUP_TOKEN_KEY", hide_env_values = true)]
        key: String,
    },

    /// Generate a random secret for the admin trigger or token signing key
    Secret,

    /// Push a pre-aggregated weekly summary as a device
    Push {
        #[arg(long, env = "USAGE_ROLLUP_DEVICE_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(short, long, help = "JSON file with weekStart, generatedAt and apps")]
        file: PathBuf,
    },

    /// Upload daily usage rows as a device
    Upload {
        #[arg(long, env = "USAGE_ROLLUP_DEVICE_TOKEN", hide_env_values = true)]
        token: String,
        #[arg(short, long, help = "JSON file with an array of {date, packageName, minutes}")]
        file: PathBuf,
    },

    /// Run the weekly aggregation now
    Trigger {
        #[arg(long, env = "USAGE_ROLLUP_ADMIN_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long, help = "RFC3339 reference instant; the week before it is aggregated")]
        at: Option<String>,
    },

    /// Check server and store health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Window { at } => commands::window::show(at.as_deref())?,
        Commands::Token { user, key } => commands::token::issue(&user, key)?,
        Commands::Secret => commands::token::secret(),
        Commands::Push { token, file } => commands::device::push(&cli.server, &token, &file).await?,
        Commands::Upload { token, file } => {
            commands::device::upload(&cli.server, &token, &file).await?
        }
        Commands::Trigger { secret, at } => {
            commands::trigger::run(&cli.server, &secret, at.as_deref()).await?
        }
        Commands::Health => commands::trigger::health(&cli.server).await?,
    }

    Ok(())
}
