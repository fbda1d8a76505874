use colored::Colorize;
use tracing::info;
use ww_server::{ServerConfig, WwServer};
use ww_types::Keypair;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Start(args) => cmd_start(args).await,
        Command::Keygen(args) => cmd_keygen(args),
        Command::Config(args) => cmd_config(args),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => Ok(ServerConfig::load(path)?),
        None => Ok(ServerConfig::default()),
    }
}

async fn cmd_start(args: StartArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(ns) = args.ns {
        config.ns = ns;
    }
    if let Some(addr) = args.status {
        config.status_addr = Some(addr);
    }

    let server = WwServer::new(config)?;
    println!("{} Node {} started", "✓".green().bold(), server.peer_id().short_id().cyan());
    println!("  Namespace: {}", server.config().ns.yellow());
    if let Some(addr) = server.config().status_addr {
        println!("  Status: {}", format!("http://{addr}/v1/health").blue());
    }

    let stop = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
        }
        stop.cancel();
    });

    server.serve().await?;
    println!("{} Node stopped.", "✓".green());
    Ok(())
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let keypair = Keypair::generate();
    if args.quiet {
        println!("{}", keypair.secret_hex());
    } else {
        println!("Peer:   {}", keypair.peer_id().to_hex().cyan());
        println!("Secret: {}", keypair.secret_hex().yellow());
        println!("\nAdd to your config file:\n  identity = \"{}\"", keypair.secret_hex());
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_toml()?);
    Ok(())
}
