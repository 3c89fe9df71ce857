//! Console-toggled diagnostic level.
//!
//! The level is shared by the console reader and every active pump. Each
//! line read from the console advances it one step:
//! `Silent -> Lifecycle -> Data -> Silent`.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Diagnostic verbosity for forwarded sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum LogLevel {
    /// No per-session output.
    #[default]
    Silent = 0,
    /// Session establishment, end, close and errors.
    Lifecycle = 1,
    /// Lifecycle plus a dump of every relayed chunk.
    Data = 2,
}

impl LogLevel {
    /// The level selected by one more console line.
    pub fn next(self) -> Self {
        match self {
            LogLevel::Silent => LogLevel::Lifecycle,
            LogLevel::Lifecycle => LogLevel::Data,
            LogLevel::Data => LogLevel::Silent,
        }
    }

    /// Operator-facing description.
    pub fn description(self) -> &'static str {
        match self {
            LogLevel::Silent => "No (default)",
            LogLevel::Lifecycle => "Show connection",
            LogLevel::Data => "Dump all req/res data",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LogLevel::Lifecycle,
            2 => LogLevel::Data,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error for unrecognized level names.
#[derive(Debug, thiserror::Error)]
#[error("unknown log level {0:?} (expected 0, 1, 2, silent, lifecycle or data)")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "silent" => Ok(LogLevel::Silent),
            "1" | "lifecycle" => Ok(LogLevel::Lifecycle),
            "2" | "data" => Ok(LogLevel::Data),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

/// Shared handle to a mutable [`LogLevel`].
///
/// Clones observe the same level. Separately constructed controls are
/// independent, so forwarders in one process do not bleed into each other.
#[derive(Debug, Clone, Default)]
pub struct LogLevelControl {
    level: Arc<AtomicU8>,
}

impl LogLevelControl {
    pub fn new(initial: LogLevel) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    pub fn current(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn set(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Release);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.current() >= level
    }

    /// Emit a session message: INFO when lifecycle output is switched on,
    /// DEBUG otherwise so `RUST_LOG=debug` still shows it.
    pub fn lifecycle(&self, message: fmt::Arguments<'_>) {
        if self.enabled(LogLevel::Lifecycle) {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    /// Cycle to the next level and return it.
    pub fn advance(&self) -> LogLevel {
        let previous = self
            .level
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |value| {
                Some(LogLevel::from_u8(value).next() as u8)
            })
            .unwrap_or_else(|value| value);
        LogLevel::from_u8(previous).next()
    }
}

/// Advance the level once per line read from `reader`.
///
/// Line content is ignored. Returns when the reader is exhausted.
pub async fn run_console<R>(control: LogLevelControl, reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(_)) => {
                let level = control.advance();
                info!("Log level : {}", level.description());
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Console input failed, log level is now fixed");
                break;
            }
        }
    }
}
