mod output;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "redlock",
    about = "Redlock: quorum locks over independent key-value stores",
    version
)]
struct Cli {
    /// JSON configuration file (see RedlockConfig)
    #[arg(long, global = true, env = "REDLOCK_CONFIG")]
    config: Option<PathBuf>,

    /// Store backend: "redis", "memory" or "sqlite:<dir>"
    #[arg(long, global = true, default_value = "redis", env = "REDLOCK_STORAGE")]
    storage: String,

    /// Store endpoint host:port[/db]; repeat once per instance. Overrides the config file.
    #[arg(long = "endpoint", global = true)]
    endpoints: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a lock, hold it, then release it
    Lock {
        /// Resources to lock together
        #[arg(required = true)]
        resources: Vec<String>,

        /// Lock time-to-live in milliseconds (defaults to the configured TTL)
        #[arg(long)]
        ttl_ms: Option<u64>,

        /// How long to hold the lock before releasing it
        #[arg(long, default_value = "0")]
        hold_ms: u64,

        /// Extend the lock to this TTL halfway through the hold
        #[arg(long)]
        extend_ms: Option<u64>,
    },

    /// Run the two-caller contention walkthrough against the configured stores
    Demo {
        /// Resource to contend on
        #[arg(long, default_value = "demo-resource")]
        resource: String,

        /// Lock time-to-live in milliseconds
        #[arg(long, default_value = "1000")]
        ttl_ms: u64,
    },

    /// Validate and print the resolved configuration
    Config,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match runner::load_config(cli.config.as_deref(), &cli.endpoints) {
        Ok(config) => config,
        Err(e) => runner::fail(e),
    };

    let code = match cli.command {
        Commands::Lock {
            resources,
            ttl_ms,
            hold_ms,
            extend_ms,
        } => runner::lock(&cli.storage, &config, resources, ttl_ms, hold_ms, extend_ms).await,
        Commands::Demo { resource, ttl_ms } => {
            runner::demo(&cli.storage, &config, &resource, ttl_ms).await
        }
        Commands::Config => runner::show_config(&cli.storage, &config),
        Commands::Version => {
            println!("redlock {}", env!("CARGO_PKG_VERSION"));
            println!("Quorum locks over independent key-value stores");
            0
        }
    };

    std::process::exit(code);
}
