//! TCP listener and session handling.
//!
//! The forwarder accepts connections on the local address and, for each
//! one, dials the destination once and relays bytes both ways until the
//! session ends. Half-open connections are kept: a client may finish
//! sending while the destination is still answering.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portfwd_address::AddressSpec;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, Instrument};

use super::dump::DataDump;
use super::session::{Session, SessionConfig, DEFAULT_BUFFER_SIZE};
use crate::log_level::LogLevelControl;

/// Back-off after a failed accept.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a forwarder.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Address to listen on.
    pub local: AddressSpec,
    /// Address every accepted connection is relayed to.
    pub destination: AddressSpec,
    /// Read buffer per direction.
    pub buffer_size: usize,
}

impl ForwarderConfig {
    pub fn new(local: AddressSpec, destination: AddressSpec) -> Self {
        Self {
            local,
            destination,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Statistics for a forwarder.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    /// Total connections accepted.
    pub sessions_accepted: AtomicU64,
    /// Sessions currently relaying.
    pub sessions_active: AtomicU64,
    /// Sessions finished, including failed dials.
    pub sessions_closed: AtomicU64,
    /// Successful destination dials.
    pub upstream_connected: AtomicU64,
    /// Failed destination dials.
    pub upstream_failed: AtomicU64,
    /// Bytes relayed to the destination.
    pub bytes_to_upstream: AtomicU64,
    /// Bytes relayed back from the destination.
    pub bytes_from_upstream: AtomicU64,
}

/// A bound TCP forwarder.
pub struct Forwarder {
    config: ForwarderConfig,
    listener: TcpListener,
    session_config: SessionConfig,
    stats: Arc<ForwarderStats>,
}

impl Forwarder {
    /// Bind the local address.
    ///
    /// Every bind candidate of the local address is tried in order; the
    /// error of the last one is returned if none succeeds.
    pub async fn bind(
        config: ForwarderConfig,
        log_level: LogLevelControl,
        dump: DataDump,
    ) -> io::Result<Self> {
        let listener = bind_listener(&config.local).await?;
        let local_addr = listener.local_addr()?;

        info!("Listening at [{}]:{}", local_addr.ip(), local_addr.port());
        info!(
            "Incoming connection will be forwarded to {}",
            config.destination
        );

        let mut session_config = SessionConfig::new(log_level, dump);
        session_config.buffer_size = config.buffer_size;

        Ok(Self {
            config,
            listener,
            session_config,
            stats: Arc::new(ForwarderStats::default()),
        })
    }

    /// Get the local address this forwarder is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn destination(&self) -> &AddressSpec {
        &self.config.destination
    }

    /// Get forwarder statistics.
    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }

    /// Run the accept loop. Only returns if the local address can no longer
    /// be read back from the listener.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        debug!(bind_addr = %local_addr, "Accept loop started");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.stats.sessions_accepted.fetch_add(1, Ordering::Relaxed);
                    self.stats.sessions_active.fetch_add(1, Ordering::Relaxed);

                    let forwarder = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            forwarder.handle_session(stream, peer_addr).await;

                            forwarder
                                .stats
                                .sessions_active
                                .fetch_sub(1, Ordering::Relaxed);
                            forwarder
                                .stats
                                .sessions_closed
                                .fetch_add(1, Ordering::Relaxed);
                        }
                        .instrument(tracing::info_span!("session", peer = %peer_addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Relay one accepted connection to the destination.
    async fn handle_session(&self, downstream: TcpStream, peer_addr: SocketAddr) {
        let destination = &self.config.destination;

        let mut session = Session::new(peer_addr, &self.session_config);
        session.log_lifecycle(format_args!(
            "Connected from [{}]:{}",
            peer_addr.ip(),
            peer_addr.port()
        ));
        session.log_lifecycle(format_args!("Connect to {destination}"));

        let upstream =
            match TcpStream::connect((destination.connect_host(), destination.port())).await {
                Ok(stream) => stream,
                Err(e) => {
                    self.stats.upstream_failed.fetch_add(1, Ordering::Relaxed);
                    session.upstream_failed(&e);
                    return;
                }
            };
        self.stats.upstream_connected.fetch_add(1, Ordering::Relaxed);

        if let (Ok(remote), Ok(local)) = (upstream.peer_addr(), upstream.local_addr()) {
            session.log_lifecycle(format_args!(
                "Connected to [{}]:{} src [{}]:{}",
                remote.ip(),
                remote.port(),
                local.ip(),
                local.port()
            ));
        }

        let outcome = session.run(downstream, upstream).await;

        self.stats
            .bytes_to_upstream
            .fetch_add(outcome.bytes_to_upstream, Ordering::Relaxed);
        self.stats
            .bytes_from_upstream
            .fetch_add(outcome.bytes_from_upstream, Ordering::Relaxed);

        debug!(
            bytes_to_upstream = outcome.bytes_to_upstream,
            bytes_from_upstream = outcome.bytes_from_upstream,
            "Session closed"
        );
    }
}

async fn bind_listener(local: &AddressSpec) -> io::Result<TcpListener> {
    let mut last_error = None;
    for candidate in local.bind_candidates() {
        match TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(host = candidate.0, port = candidate.1, error = %e, "Bind attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to bind")
    }))
}
