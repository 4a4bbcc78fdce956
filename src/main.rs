use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use canoe::agent::Agent;
use canoe::app::App;
use canoe::cli::{self, Commands};
use canoe::config::Config;

#[derive(Parser)]
#[command(name = "canoe")]
#[command(about = "A Nostr social client for the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.canoe/canoe.toml")]
    config: String,

    /// Validate configuration and exit
    #[arg(long)]
    test: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    config
        .expand_paths()
        .with_context(|| "Failed to expand paths in config")?;

    init_logging(&config.logging.level)?;

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;

    if cli.test {
        println!("✓ Configuration is valid");
        println!("  Data dir: {}", config.data_dir().display());
        return Ok(());
    }

    let agent = Agent::connect(&config);
    let app = App::open(&config, agent);
    // Default to whoami if no subcommand specified
    let command = cli.command.unwrap_or(Commands::Whoami);
    cli::handle_command(command, &app, &config).await
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}
