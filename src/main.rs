mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use dispatchbox::config::Config;
use dispatchbox::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = Config::load(args.config)
                .map_err(|e| format!("Failed to load config: {e}"))?;
            init_tracing(&config.telemetry.log_filter);
            dispatchbox::api::run(config, args.address).await?
        }
    }

    Ok(())
}
