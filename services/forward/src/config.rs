//! Command-line configuration.
//!
//! Positional addresses come from the command line; logging knobs can also
//! be set through `PORTFWD_*` environment variables.

use clap::{Parser, ValueEnum};
use portfwd::proxy::DEFAULT_BUFFER_SIZE;
use portfwd::LogLevel;

/// Log output format for the status stream (stderr).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Listen at a local port and forward connections to destination host:port.
#[derive(Debug, Parser)]
#[command(
    name = "portfwd",
    version,
    after_help = "Note:\n  IPv6 address must be wrapped by square brackets, e.g. [::1]:8080\n  Press ENTER while running to cycle the log level."
)]
pub struct Config {
    /// Address to listen on.
    #[arg(value_name = "[localAddress:]port")]
    pub local: String,

    /// Address to forward every connection to.
    #[arg(value_name = "[destHost:]port")]
    pub destination: String,

    /// Initial session log level (silent, lifecycle, data or 0-2).
    #[arg(long, env = "PORTFWD_LOG_LEVEL", default_value = "silent")]
    pub log_level: LogLevel,

    /// Do not read stdin to toggle the log level.
    #[arg(long)]
    pub no_console: bool,

    /// Status log format.
    #[arg(long, env = "PORTFWD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Read buffer per direction, in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
}
