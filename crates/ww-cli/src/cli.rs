use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ww", about = "ww cluster node", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log output format
    #[arg(long, global = true, env = "WW_LOGFMT", default_value = "text")]
    pub logfmt: LogFormat,

    /// Log level filter (e.g. "info", "ww_pubsub=debug")
    #[arg(long, global = true, env = "WW_LOGLVL", default_value = "info")]
    pub loglvl: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
    None,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a node and run until interrupted
    Start(StartArgs),
    /// Generate a new peer identity
    Keygen(KeygenArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct StartArgs {
    /// Path to a TOML config file
    #[arg(short, long, env = "WW_CONFIG")]
    pub config: Option<PathBuf>,
    /// Cluster namespace
    #[arg(long, env = "WW_NS")]
    pub ns: Option<String>,
    /// Address of the HTTP status endpoint
    #[arg(long)]
    pub status: Option<SocketAddr>,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Print only the secret
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Path to a TOML config file
    #[arg(short, long, env = "WW_CONFIG")]
    pub config: Option<PathBuf>,
}
