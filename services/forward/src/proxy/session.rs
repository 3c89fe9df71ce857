//! Session driver: runs the two pumps of one forwarded connection.
//!
//! Each socket in a session gets a [`SocketHandle`] that both pumps can see.
//! The request pump reads the downstream socket and writes the upstream
//! one; the response pump does the reverse. A socket counts as closed once
//! it is destroyed or both of its halves have ended, which is what turns
//! into a [`PumpEvent::Close`] for the pump reading it.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use super::dump::DataDump;
use super::pump::{session_tag, Direction, Pump, PumpAction, PumpEvent};
use crate::log_level::LogLevelControl;

/// Default read buffer per pump.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Settings shared by every session of a forwarder.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub log_level: LogLevelControl,
    pub dump: DataDump,
    pub buffer_size: usize,
}

impl SessionConfig {
    pub fn new(log_level: LogLevelControl, dump: DataDump) -> Self {
        Self {
            log_level,
            dump,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    fn pump(&self, peer: SocketAddr, direction: Direction) -> Pump {
        Pump::new(peer, direction, self.log_level.clone(), self.dump.clone())
    }
}

/// Observable state of one socket in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketStatus {
    /// The remote side finished sending.
    pub read_ended: bool,
    /// Our write half was shut down.
    pub write_ended: bool,
    /// The socket was torn down.
    pub destroyed: bool,
}

impl SocketStatus {
    pub fn is_closed(&self) -> bool {
        self.destroyed || (self.read_ended && self.write_ended)
    }
}

/// Status channel for one socket, shared by the two pumps of a session.
#[derive(Debug)]
pub struct SocketHandle {
    status: watch::Sender<SocketStatus>,
}

impl SocketHandle {
    pub fn new() -> Self {
        let (status, _) = watch::channel(SocketStatus::default());
        Self { status }
    }

    pub fn status(&self) -> SocketStatus {
        *self.status.borrow()
    }

    pub fn mark_read_ended(&self) {
        self.status.send_modify(|s| s.read_ended = true);
    }

    pub fn mark_write_ended(&self) {
        self.status.send_modify(|s| s.write_ended = true);
    }

    pub fn destroy(&self) {
        self.status.send_modify(|s| s.destroyed = true);
    }

    /// Resolves once the socket is closed.
    pub async fn closed(&self) {
        let mut rx = self.status.subscribe();
        // The sender lives in `self`, so waiting cannot fail.
        let _ = rx.wait_for(SocketStatus::is_closed).await;
    }

    /// Resolves once the socket is destroyed.
    pub async fn destroyed(&self) {
        let mut rx = self.status.subscribe();
        let _ = rx.wait_for(|s| s.destroyed).await;
    }
}

impl Default for SocketHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes relayed by a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    pub bytes_to_upstream: u64,
    pub bytes_from_upstream: u64,
}

/// The two pumps of one accepted connection.
///
/// Created at accept time, before the destination is dialed, so a failed
/// dial is reported through the response pump like any other socket error.
#[derive(Debug)]
pub struct Session {
    tag: String,
    log_level: LogLevelControl,
    request: Pump,
    response: Pump,
    buffer_size: usize,
}

impl Session {
    pub fn new(peer: SocketAddr, config: &SessionConfig) -> Self {
        Self {
            tag: session_tag(peer),
            log_level: config.log_level.clone(),
            request: config.pump(peer, Direction::Request),
            response: config.pump(peer, Direction::Response),
            buffer_size: config.buffer_size,
        }
    }

    /// Log a message about the session as a whole.
    pub fn log_lifecycle(&self, message: fmt::Arguments<'_>) {
        self.log_level.lifecycle(format_args!("{}{}", self.tag, message));
    }

    /// The destination could not be reached. The response direction
    /// records the error and its destroy closes the request direction.
    /// Dropping the accepted socket afterwards is the actual teardown.
    pub fn upstream_failed(&mut self, error: &io::Error) {
        if self.response.on_event(PumpEvent::Error(error)) == PumpAction::DestroyDestination {
            // There is no upstream socket to destroy in return.
            let _ = self.request.on_event(PumpEvent::Close);
        }
    }

    /// Relay between `downstream` (accepted) and `upstream` (dialed) until
    /// both pumps reach a terminal state.
    pub async fn run<D, U>(self, downstream: D, upstream: U) -> SessionOutcome
    where
        D: AsyncRead + AsyncWrite,
        U: AsyncRead + AsyncWrite,
    {
        let (down_read, down_write) = tokio::io::split(downstream);
        let (up_read, up_write) = tokio::io::split(upstream);

        let down = SocketHandle::new();
        let up = SocketHandle::new();

        let (bytes_to_upstream, bytes_from_upstream) = tokio::join!(
            run_pump(self.request, down_read, up_write, &down, &up, self.buffer_size),
            run_pump(self.response, up_read, down_write, &up, &down, self.buffer_size),
        );

        SessionOutcome {
            bytes_to_upstream,
            bytes_from_upstream,
        }
    }
}

/// Drive one pump until it reaches a terminal state.
///
/// Returns the number of bytes forwarded to the destination.
pub async fn run_pump<R, W>(
    mut pump: Pump,
    mut reader: R,
    mut writer: W,
    source: &SocketHandle,
    destination: &SocketHandle,
    buffer_size: usize,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut reading = true;

    while !pump.is_finished() {
        let read = if reading {
            tokio::select! {
                biased;
                _ = source.closed() => None,
                result = reader.read(&mut buf) => Some(result),
            }
        } else {
            source.closed().await;
            None
        };

        let event = match &read {
            None => PumpEvent::Close,
            Some(Ok(0)) => {
                reading = false;
                source.mark_read_ended();
                PumpEvent::End
            }
            Some(Ok(n)) => PumpEvent::Data(&buf[..*n]),
            Some(Err(e)) => {
                reading = false;
                source.destroy();
                PumpEvent::Error(e)
            }
        };

        match pump.on_event(event) {
            PumpAction::Forward(data) => {
                if destination.status().destroyed {
                    continue;
                }
                let written = tokio::select! {
                    biased;
                    _ = destination.destroyed() => Ok(()),
                    result = writer.write_all(data) => result,
                };
                if let Err(e) = written {
                    pump.log_lifecycle(format_args!("Write failed: {e}"));
                    destination.destroy();
                }
            }
            PumpAction::EndDestination => {
                if destination.status().destroyed {
                    continue;
                }
                match writer.shutdown().await {
                    Ok(()) => destination.mark_write_ended(),
                    Err(e) => {
                        pump.log_lifecycle(format_args!("Shutdown failed: {e}"));
                        destination.destroy();
                    }
                }
            }
            PumpAction::DestroyDestination => destination.destroy(),
            PumpAction::Ignore => {}
        }
    }

    pump.bytes_forwarded()
}
