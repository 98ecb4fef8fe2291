//! threadkeep - session store maintenance CLI
//!
#![doc = "threadkeep - session store maintenance CLI"]
#![doc = "Main entry point for the threadkeep operator commands."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use threadkeep::cli::Cli;
use threadkeep::commands;
use threadkeep::config::Config;

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/threadkeep.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    tracing::debug!("Running {:?} for owner {:?}", cli.command, cli.owner);
    commands::sessions::handle_sessions(cli.command, &config, cli.owner.as_deref())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "threadkeep=debug"
    } else {
        "threadkeep=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
