//! Framed command/response exchanges over the serial channel.
//!
//! One [`Transport`] owns the port. Every exchange:
//!
//! 1. drains stale input left by an earlier failed exchange,
//! 2. writes the command bytes verbatim,
//! 3. optionally reads a fixed-length or `#`-terminated response,
//! 4. drains again.
//!
//! Reads and writes are bounded by a per-exchange timeout. Nothing is retried; callers
//! decide what a failure means.

use crate::protocol::STOP_CHAR;
use focus_core::error::TransportError;
use focus_core::limits::{EXCHANGE_TIMEOUT, FLUSH_WINDOW, MAX_FRAME_LEN};
use focus_core::serial::{drain_serial_buffer, DynSerial};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// How the response to a command is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// The device does not answer.
    Nothing,
    /// The device answers with exactly this many bytes.
    Exact(usize),
    /// The device answers with bytes up to and including `#`.
    UntilTerminator,
}

/// Renders bytes as two-digit uppercase hex, space-separated (`47 45 54`).
///
/// Formatting is lazy, so wrapping a frame in a disabled `debug!` costs nothing.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Exclusive owner of a focuser's serial channel.
pub struct Transport {
    port: DynSerial,
    timeout: Duration,
    flush_window: Duration,
}

impl Transport {
    /// Wrap an open port with the default 3 s exchange timeout.
    pub fn new(port: DynSerial) -> Self {
        Self {
            port,
            timeout: EXCHANGE_TIMEOUT,
            flush_window: FLUSH_WINDOW,
        }
    }

    /// Set the per-exchange timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long to wait for stale bytes when flushing around an exchange.
    pub fn with_flush_window(mut self, flush_window: Duration) -> Self {
        self.flush_window = flush_window;
        self
    }

    /// Send one command and collect its response.
    ///
    /// Returns an empty buffer for [`Expect::Nothing`]. Terminator-delimited responses
    /// keep their trailing `#`.
    ///
    /// # Errors
    /// - `TransportError::FrameTooLong` before any I/O if the command or expected
    ///   response exceeds `MAX_FRAME_LEN`
    /// - `TransportError::Write` if the command cannot be written within the timeout
    /// - `TransportError::ReadTimeout` if the response does not complete in time
    /// - `TransportError::Read` for other read faults
    pub async fn send_command(
        &mut self,
        command: &[u8],
        expect: Expect,
    ) -> Result<Vec<u8>, TransportError> {
        if command.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLong {
                len: command.len(),
                max: MAX_FRAME_LEN,
            });
        }
        if let Expect::Exact(len) = expect {
            if len > MAX_FRAME_LEN {
                return Err(TransportError::FrameTooLong {
                    len,
                    max: MAX_FRAME_LEN,
                });
            }
        }

        self.flush().await;

        tracing::debug!(frame = %HexDump(command), "CMD");
        self.write_frame(command).await?;

        let response = match expect {
            Expect::Nothing => Vec::new(),
            Expect::Exact(len) => self.read_exact_frame(len).await?,
            Expect::UntilTerminator => self.read_terminated_frame().await?,
        };

        if expect != Expect::Nothing {
            tracing::debug!(frame = %HexDump(&response), "RES");
        }

        self.flush().await;
        Ok(response)
    }

    async fn flush(&mut self) {
        let discarded = drain_serial_buffer(&mut self.port, self.flush_window).await;
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded stale bytes from serial buffer");
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let port = &mut self.port;
        let write = async move {
            port.write_all(frame).await?;
            port.flush().await
        };

        match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(e)),
            Err(_) => Err(TransportError::Write(io::Error::new(
                io::ErrorKind::TimedOut,
                "write did not complete within timeout",
            ))),
        }
    }

    async fn read_exact_frame(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; len];
        let mut filled = 0usize;

        while filled < len {
            match tokio::time::timeout_at(deadline, self.port.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => return Err(closed_mid_frame()),
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::ReadTimeout {
                        expected: Some(len),
                        received: filled,
                    })
                }
                Ok(Err(e)) => return Err(TransportError::Read(e)),
                Err(_) => {
                    return Err(TransportError::ReadTimeout {
                        expected: Some(len),
                        received: filled,
                    })
                }
            }
        }

        Ok(buf)
    }

    async fn read_terminated_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + self.timeout;
        let mut frame = Vec::with_capacity(MAX_FRAME_LEN);
        let mut byte = [0u8; 1];

        while frame.len() < MAX_FRAME_LEN {
            match tokio::time::timeout_at(deadline, self.port.read(&mut byte)).await {
                Ok(Ok(0)) => return Err(closed_mid_frame()),
                Ok(Ok(_)) => {
                    frame.push(byte[0]);
                    if byte[0] == STOP_CHAR {
                        break;
                    }
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::ReadTimeout {
                        expected: None,
                        received: frame.len(),
                    })
                }
                Ok(Err(e)) => return Err(TransportError::Read(e)),
                Err(_) => {
                    return Err(TransportError::ReadTimeout {
                        expected: None,
                        received: frame.len(),
                    })
                }
            }
        }

        Ok(frame)
    }
}

fn closed_mid_frame() -> TransportError {
    TransportError::Read(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "serial channel closed mid-frame",
    ))
}
