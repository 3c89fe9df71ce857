pub mod error;
pub mod log_level;
pub mod proxy;
mod service;

#[cfg(test)]
mod test_support;

pub use error::ForwardError;
pub use log_level::{run_console, LogLevel, LogLevelControl};
pub use portfwd_address::{AddressError, AddressSpec, Host};
pub use proxy::{
    DataDump, Direction, Forwarder, ForwarderConfig, ForwarderStats, Pump, PumpAction, PumpEvent,
    PumpState, Session, SessionConfig, SessionOutcome,
};
pub use service::{forward, forward_with, parse_config, ForwardOptions};
