use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::LogFormat;

fn init_logging(format: LogFormat, level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level)?;
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::None => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_logging(cli.logfmt, &cli.loglvl)?;
    commands::run_command(cli).await
}
