use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediagrab")]
#[command(about = "Media download bot", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MEDIAGRAB_CONFIG or config/mediagrab.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bot and its health endpoint
    Run(RunArgs),
    /// Check external tools and the bot token, then exit
    Check,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Address for the health endpoint, overrides `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
