//! tmpsync - volume plugin daemon
//!
//! Loads the volume registry and serves the plugin socket.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use std::sync::Arc;
use tmpsync::cli::Cli;
use tmpsync::config::DriverOptions;
use tmpsync::error::TmpsyncResult;
use tmpsync::plugin::PluginServer;
use tmpsync::TmpsyncDriver;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> TmpsyncResult<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise 0 = warn, 1 = info, 2+ = debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("tmpsync=warn"),
        1 => EnvFilter::new("tmpsync=info"),
        _ => EnvFilter::new("tmpsync=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = DriverOptions::new(&cli.root)?.with_pairs(&cli.opts)?;
    let driver = Arc::new(TmpsyncDriver::new(options).await?);

    PluginServer::new(cli.socket, driver).run().await
}
