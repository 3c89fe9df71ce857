//! Programmatic entry point.
//!
//! `forward("8080", "10.0.0.5:8080")` is all an embedding program needs:
//! it parses both addresses, binds, starts the console toggle on stdin and
//! serves until the listener fails.

use std::sync::Arc;

use portfwd_address::AddressSpec;
use tokio::io::BufReader;
use tracing::info;

use crate::error::ForwardError;
use crate::log_level::{run_console, LogLevel, LogLevelControl};
use crate::proxy::{DataDump, Forwarder, ForwarderConfig, DEFAULT_BUFFER_SIZE};

/// Knobs for [`forward_with`].
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Level in effect before the first console line.
    pub initial_level: LogLevel,
    /// Read stdin lines to cycle the level.
    pub console: bool,
    /// Where `Data` level dumps go.
    pub dump: DataDump,
    /// Read buffer per direction.
    pub buffer_size: usize,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            initial_level: LogLevel::Silent,
            console: true,
            dump: DataDump::stdout(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Parse `[localAddress:]port` and `[destHost:]port` into a forwarder config.
pub fn parse_config(local: &str, destination: &str) -> Result<ForwarderConfig, ForwardError> {
    let local = AddressSpec::parse(local)?;
    let destination = AddressSpec::parse(destination)?;
    if destination.port() == 0 {
        return Err(ForwardError::MissingDestinationPort);
    }
    Ok(ForwarderConfig::new(local, destination))
}

/// Forward connections on `local` to `destination` with default options.
pub async fn forward(local: &str, destination: &str) -> Result<(), ForwardError> {
    forward_with(local, destination, ForwardOptions::default()).await
}

pub async fn forward_with(
    local: &str,
    destination: &str,
    options: ForwardOptions,
) -> Result<(), ForwardError> {
    let mut config = parse_config(local, destination)?;
    config.buffer_size = options.buffer_size;

    info!(
        local = %config.local,
        destination = %config.destination,
        log_level = %options.initial_level,
        "Using parameters"
    );

    let log_level = LogLevelControl::new(options.initial_level);
    let bind_addr = config.local.clone();
    let forwarder = Forwarder::bind(config, log_level.clone(), options.dump)
        .await
        .map_err(|source| ForwardError::Bind {
            addr: bind_addr,
            source,
        })?;

    if options.console {
        info!("Press ENTER to toggle Log level.");
        tokio::spawn(run_console(log_level, BufReader::new(tokio::io::stdin())));
    }

    Arc::new(forwarder).run().await?;
    Ok(())
}
