//! Error types for focuser drivers.
//!
//! Using `thiserror`, this module splits failures into two layers:
//!
//! - **`TransportError`**: a single command/response exchange on the serial channel
//!   failed (incomplete write, missing bytes within the timeout, I/O fault).
//! - **`FocusError`**: an operation of the motion controller failed. Transport errors
//!   convert into it through `#[from]`, so driver code propagates them with `?`.
//!
//! ## Recovery
//!
//! Nothing here is retried automatically. Transport errors abort the current move and
//! are surfaced as-is; re-running the handshake is the host's job.

use thiserror::Error;

/// Convenience alias for results using the focuser error type.
pub type FocusResult<T> = std::result::Result<T, FocusError>;

/// Failure of one framed exchange on the serial channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The command could not be written completely.
    ///
    /// Covers I/O faults reported by the channel as well as writes that did not
    /// complete within the exchange timeout.
    #[error("Serial write error: {0}")]
    Write(#[source] std::io::Error),

    /// The expected response did not arrive within the exchange timeout.
    ///
    /// `expected` is `None` for terminator-delimited reads.
    #[error("Serial read timeout: received {received} bytes{}", .expected.map(|n| format!(" of {n}")).unwrap_or_default())]
    ReadTimeout {
        expected: Option<usize>,
        received: usize,
    },

    /// Any other I/O fault while reading, including the channel closing mid-frame.
    #[error("Serial read error: {0}")]
    Read(#[source] std::io::Error),

    /// A frame larger than the protocol's buffer bound was requested.
    #[error("Frame of {len} bytes exceeds maximum frame length {max}")]
    FrameTooLong { len: usize, max: usize },
}

impl TransportError {
    /// True when the failure was a timeout rather than a hard I/O fault.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ReadTimeout { .. } => true,
            Self::Write(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Primary error type for focuser operations.
#[derive(Error, Debug)]
pub enum FocusError {
    /// Device I/O failed. The current operation was aborted.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response frame carried no recoverable number.
    #[error("Failed to parse {what} from response '{frame}'")]
    Parse { what: &'static str, frame: String },

    /// A requested target or tick count violates the configured bounds.
    ///
    /// Always raised before any motion command is sent.
    #[error("Requested {what} {value} is outside [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The device did not answer the liveness probe with the expected sentinel.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// An operation that needs device I/O was called before a successful handshake.
    #[error("Device is not connected")]
    NotConnected,

    /// Semantically invalid limits or settings.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FocusError {
    /// Build a parse error, rendering the raw frame lossily for the message.
    pub fn parse(what: &'static str, frame: &[u8]) -> Self {
        Self::Parse {
            what,
            frame: String::from_utf8_lossy(frame).into_owned(),
        }
    }

    /// True for errors caused by device communication.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
