//! TCP forwarding proxy.
//!
//! This module provides:
//! - The listener that accepts connections on the local address
//! - Per-session dialing of the fixed destination
//! - Two pumps per session relaying bytes in each direction
//! - Framed data dumps for the `Data` log level
//!
//! ## Architecture
//!
//! ```text
//! Client -> Forwarder -> Session -+- <REQ> Pump -> Destination
//!                                 +- <RES> Pump <- Destination
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use portfwd::{DataDump, Forwarder, ForwarderConfig, LogLevelControl};
//!
//! let config = ForwarderConfig::new("8080".parse()?, "127.0.0.1:9000".parse()?);
//! let forwarder = Forwarder::bind(config, LogLevelControl::default(), DataDump::stdout()).await?;
//! Arc::new(forwarder).run().await?;
//! ```

mod dump;
mod forwarder;
mod pump;
mod session;

pub use dump::{DataDump, END_MARKER};
pub use forwarder::{Forwarder, ForwarderConfig, ForwarderStats};
pub use pump::{session_tag, Direction, Pump, PumpAction, PumpEvent, PumpState};
pub use session::{
    run_pump, Session, SessionConfig, SessionOutcome, SocketHandle, SocketStatus,
    DEFAULT_BUFFER_SIZE,
};
