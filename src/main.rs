mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use mediagrab::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mediagrab::observability::init_tracing();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run(args) => server::run(config, args.address).await?,
        Commands::Check => server::check(config).await?,
    }

    Ok(())
}
