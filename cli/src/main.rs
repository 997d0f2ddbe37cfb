//! Image extender CLI entry point.

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use extender_cli::commands::{dispatch, Cli};
use extender_core::{ExtendConfig, LogLevel};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = cli.log_level.unwrap_or(ExtendConfig::default().log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn default_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level.into()).into())
}
