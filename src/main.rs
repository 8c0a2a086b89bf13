//! hcdump - Diagnostic dumps of hosted clusters and their control planes

use anyhow::Result;
use clap::Parser;
use hcdump::cli::{Cli, Command};
use hcdump::commands;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose);

    if cli.no_color {
        owo_colors::set_override(false);
    }

    let result = match cli.command {
        Command::Cluster(ref args) => {
            commands::run_dump(cli.context.as_deref(), args, cli.output).await
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Dump failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
