use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hmlink_core::{
    CentralController, StatusSink, SystemAdapter, TargetDescriptor, event_channel,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hmlink")]
#[command(author, version, about = "Monitor for HM-10/HM-11 BLE serial modules", long_about = None)]
struct Cli {
    /// Advertised local name to connect to
    #[arg(short, long, default_value = hmlink_types::uuid::DEFAULT_LOCAL_NAME)]
    name: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

/// Prints status lines to stdout, mirroring what a status label would show.
struct StdoutSink;

impl StatusSink for StdoutSink {
    fn report(&self, text: &str) {
        println!("{text}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (events, receiver) = event_channel();
    let adapter = Arc::new(
        SystemAdapter::new(events)
            .await
            .context("no Bluetooth adapter found")?,
    );

    let cancel = CancellationToken::new();
    let pump = adapter.spawn_event_pump(cancel.clone());

    let controller = CentralController::new(
        adapter,
        Arc::new(StdoutSink),
        TargetDescriptor::new(&cli.name),
    );
    let run = tokio::spawn(controller.run(receiver, cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::debug!("shutdown requested");
    cancel.cancel();

    run.await.context("controller task panicked")??;
    pump.await.context("event pump task panicked")?;

    Ok(())
}
