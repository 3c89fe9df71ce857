//! portfwd
//!
//! Listens at a local port and relays every connection, byte for byte, to
//! a fixed destination. Pressing ENTER cycles the session log level:
//! silent, lifecycle events, then full data dumps on stdout.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing::error;

mod config;
mod logging;

use config::Config;
use portfwd::{DataDump, ForwardOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(config.log_format);

    let options = ForwardOptions {
        initial_level: config.log_level,
        console: !config.no_console,
        dump: DataDump::stdout(),
        buffer_size: config.buffer_size,
    };

    if let Err(e) = portfwd::forward_with(&config.local, &config.destination, options).await {
        error!(error = %e, "Forwarder stopped");
        if e.is_usage() {
            eprintln!("{}", Config::command().render_usage());
        }
        std::process::exit(1);
    }

    Ok(())
}
