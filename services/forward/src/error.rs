//! Error types for the forwarder.

use std::io;

use portfwd_address::{AddressError, AddressSpec};
use thiserror::Error;

/// Errors that stop a forwarder from starting or running.
///
/// Per-session failures never surface here; they end their own session.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// A local or destination address did not parse.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// The destination has no usable port.
    #[error("destination port must not be 0")]
    MissingDestinationPort,

    /// The local address could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind { addr: AddressSpec, source: io::Error },

    /// The listener failed after binding.
    #[error("listener failed: {0}")]
    Io(#[from] io::Error),
}

impl ForwardError {
    /// Whether the caller supplied bad arguments, as opposed to a runtime
    /// failure.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            ForwardError::Address(_) | ForwardError::MissingDestinationPort
        )
    }
}
