//! One direction of a forwarded session.
//!
//! A [`Pump`] reacts to events from its source socket and tells the driver
//! what to do with the destination socket:
//!
//! ```text
//! Established --End--> EndReceived        destination write half ended
//! Established | EndReceived --Close--> Closed    destination destroyed
//! Established | EndReceived --Error--> Errored   destination destroyed
//! ```
//!
//! `Closed` and `Errored` are terminal; later events are ignored. The pump
//! performs no I/O itself, see [`super::session`] for the driver.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tracing::{debug, warn};

use super::dump::DataDump;
use crate::log_level::{LogLevel, LogLevelControl};

/// Relay direction within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Downstream (accepted) socket to upstream socket.
    Request,
    /// Upstream socket back to downstream socket.
    Response,
}

impl Direction {
    pub fn marker(self) -> &'static str {
        match self {
            Direction::Request => "<REQ>",
            Direction::Response => "<RES>",
        }
    }
}

/// Pump lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Established,
    EndReceived,
    Closed,
    Errored,
}

/// Something that happened on the pump's source socket.
#[derive(Debug)]
pub enum PumpEvent<'a> {
    /// A chunk of bytes was read.
    Data(&'a [u8]),
    /// The peer finished sending.
    End,
    /// The socket is fully closed or was destroyed.
    Close,
    /// The socket failed.
    Error(&'a io::Error),
}

/// What the driver must do with the destination socket.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpAction<'a> {
    /// Write these bytes, unmodified.
    Forward(&'a [u8]),
    /// Gracefully end the write half.
    EndDestination,
    /// Tear the destination down immediately.
    DestroyDestination,
    Ignore,
}

/// Tag prefixed to every message about one session.
pub fn session_tag(peer: SocketAddr) -> String {
    format!("====[{}]:{} ", peer.ip(), peer.port())
}

pub struct Pump {
    tag: String,
    state: PumpState,
    log_level: LogLevelControl,
    dump: DataDump,
    bytes_forwarded: u64,
}

impl Pump {
    pub fn new(
        peer: SocketAddr,
        direction: Direction,
        log_level: LogLevelControl,
        dump: DataDump,
    ) -> Self {
        Self {
            tag: format!("{}{}", session_tag(peer), direction.marker()),
            state: PumpState::Established,
            log_level,
            dump,
            bytes_forwarded: 0,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, PumpState::Closed | PumpState::Errored)
    }

    /// Total bytes handed out through [`PumpAction::Forward`].
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    pub fn on_event<'a>(&mut self, event: PumpEvent<'a>) -> PumpAction<'a> {
        match (self.state, event) {
            (PumpState::Established, PumpEvent::Data(data)) => {
                self.bytes_forwarded += data.len() as u64;
                self.dump_chunk(data);
                PumpAction::Forward(data)
            }
            (PumpState::Established, PumpEvent::End) => {
                self.state = PumpState::EndReceived;
                self.log_lifecycle(format_args!("Ended"));
                PumpAction::EndDestination
            }
            (PumpState::Established | PumpState::EndReceived, PumpEvent::Close) => {
                self.state = PumpState::Closed;
                self.log_lifecycle(format_args!("Closed"));
                PumpAction::DestroyDestination
            }
            (PumpState::Established | PumpState::EndReceived, PumpEvent::Error(e)) => {
                self.state = PumpState::Errored;
                self.log_lifecycle(format_args!("Error: {e}"));
                PumpAction::DestroyDestination
            }
            (state, event) => {
                debug!(tag = %self.tag, ?state, ?event, "Event ignored");
                PumpAction::Ignore
            }
        }
    }

    pub fn log_lifecycle(&self, message: fmt::Arguments<'_>) {
        self.log_level.lifecycle(format_args!("{}{}", self.tag, message));
    }

    fn dump_chunk(&self, data: &[u8]) {
        if !self.log_level.enabled(LogLevel::Data) {
            return;
        }
        if let Err(e) = self.dump.chunk(&self.tag, data) {
            warn!(tag = %self.tag, error = %e, "Failed to write data dump");
        }
    }
}

impl fmt::Debug for Pump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pump")
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("bytes_forwarded", &self.bytes_forwarded)
            .finish()
    }
}
