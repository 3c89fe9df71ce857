//! Listen and destination address parsing.
//!
//! Addresses are given on the command line as `[host]:port`, `host:port`
//! or a bare `port`. IPv6 literals must be wrapped in square brackets
//! (`[::1]:8080`) since they contain colons themselves.
//!
//! A host of `*` (or no host at all) means "any interface" and is kept as
//! the [`Host::Any`] sentinel rather than an empty string.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Host name used when connecting to an address that has no host.
pub const DEFAULT_CONNECT_HOST: &str = "localhost";

/// Address parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// No port could be extracted from the input.
    #[error("missing port in address: {input:?}")]
    MissingPort { input: String },

    /// The port text is not a decimal number that fits in 16 bits.
    #[error("invalid port: {port}")]
    InvalidPort { port: String },
}

/// Host part of an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Host {
    /// All interfaces when binding, the local host when connecting.
    Any,
    /// Hostname or IP literal, verbatim.
    Name(String),
}

impl Host {
    fn from_literal(literal: &str) -> Self {
        match literal {
            "" | "*" => Host::Any,
            other => Host::Name(other.to_string()),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Any => f.write_str("*"),
            Host::Name(name) => f.write_str(name),
        }
    }
}

/// A parsed `(host, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressSpec {
    host: Host,
    port: u16,
}

impl AddressSpec {
    /// Create an address from its parts.
    ///
    /// A `Host::Name` of `""` or `"*"` is stored as [`Host::Any`], the same
    /// as when parsed.
    pub fn new(host: Host, port: u16) -> Self {
        let host = match host {
            Host::Name(name) => Host::from_literal(&name),
            Host::Any => Host::Any,
        };
        Self { host, port }
    }

    /// Any-interface address on the given port.
    pub fn any(port: u16) -> Self {
        Self::new(Host::Any, port)
    }

    /// Parse `port`, `[host]:port`, `[host]` followed by port text, or `host:port`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let (host, port_text) = split_host_port(input);
        let port = parse_port(input, port_text)?;
        Ok(Self {
            host: Host::from_literal(host),
            port,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_any_host(&self) -> bool {
        self.host == Host::Any
    }

    /// Host to dial for outbound connections.
    pub fn connect_host(&self) -> &str {
        match &self.host {
            Host::Any => DEFAULT_CONNECT_HOST,
            Host::Name(name) => name,
        }
    }

    /// Bind targets to try in order when listening on this address.
    ///
    /// The any-interface sentinel tries the IPv6 wildcard first, which is
    /// dual-stack on most systems, then falls back to the IPv4 wildcard.
    pub fn bind_candidates(&self) -> Vec<(&str, u16)> {
        match &self.host {
            Host::Any => vec![("::", self.port), ("0.0.0.0", self.port)],
            Host::Name(name) => vec![(name.as_str(), self.port)],
        }
    }
}

impl FromStr for AddressSpec {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.host, self.port)
    }
}

/// Split an address into host literal and port text.
///
/// Forms are tried in order: all digits, bracketed host, a single colon,
/// and finally the whole input as port text.
fn split_host_port(input: &str) -> (&str, &str) {
    if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
        return ("", input);
    }

    if let Some(rest) = input.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let host = &rest[..close];
            let after = &rest[close + 1..];
            let port = after.strip_prefix(':').unwrap_or(after);
            return (host, port);
        }
    }

    let mut parts = input.split(':');
    if let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) {
        return (host, port);
    }

    ("", input)
}

fn parse_port(input: &str, text: &str) -> Result<u16, AddressError> {
    if text.is_empty() {
        return Err(AddressError::MissingPort {
            input: input.to_string(),
        });
    }

    let invalid = || AddressError::InvalidPort {
        port: text.to_string(),
    };

    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    // Overlong digit strings overflow u64 and are rejected with the rest.
    let value: u64 = text.parse().map_err(|_| invalid())?;
    let masked = value & 0xffff;
    if masked != value {
        return Err(invalid());
    }

    Ok(masked as u16)
}
