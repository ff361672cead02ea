//! scbridge daemon entrypoint.
//!
//! Supervises one sclang process and serves its output to any number of
//! JSON-lines clients until SIGINT or SIGTERM.

mod signals;

use anyhow::Result;
use scbridge::telemetry::{init_tracing, install_panic_hook};
use scbridge::{Bridge, BridgeConfig};
use std::thread;
use std::time::Duration;

const SIGNAL_POLL: Duration = Duration::from_millis(100);

fn main() -> Result<()> {
    let config = BridgeConfig::parse_args()?;
    init_tracing(&config);
    install_panic_hook();
    signals::install_shutdown_handlers()?;

    let bridge = Bridge::start(&config)?;
    println!("scbridge listening on {}", bridge.local_addr());

    while !signals::shutdown_requested() {
        thread::sleep(SIGNAL_POLL);
    }
    tracing::info!("shutdown requested");
    bridge.shutdown();
    Ok(())
}
