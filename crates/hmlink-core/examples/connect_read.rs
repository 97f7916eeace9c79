//! Example: Connecting to an HM-10 Module
//!
//! This example runs the full central lifecycle against the system
//! Bluetooth adapter: scan for a module advertising "HMSoft", connect,
//! discover the FFE0/FFE1 pair, and print the manufacturer string.
//! Press ctrl-c to stop.
//!
//! Run with: `cargo run --example connect_read`

use std::sync::Arc;

use hmlink_core::{CentralController, StatusSink, SystemAdapter, TargetDescriptor, event_channel};
use tokio_util::sync::CancellationToken;

struct PrintSink;

impl StatusSink for PrintSink {
    fn report(&self, text: &str) {
        println!("{text}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Looking for an HM-10 module advertising \"HMSoft\"...");
    println!();

    let (events, receiver) = event_channel();
    let adapter = Arc::new(SystemAdapter::new(events).await?);

    let cancel = CancellationToken::new();
    adapter.spawn_event_pump(cancel.clone());

    let controller = CentralController::new(
        adapter,
        Arc::new(PrintSink),
        TargetDescriptor::default(),
    );
    let run = tokio::spawn(controller.run(receiver, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    run.await??;

    Ok(())
}
