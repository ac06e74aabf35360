//! Serial Port Abstractions for Driver Crates
//!
//! Shared types and utilities for async serial communication, so driver crates do not
//! each redefine them.
//!
//! # Feature Flag
//!
//! This module requires the `serial` feature to be enabled:
//!
//! ```toml
//! [dependencies]
//! focus-core = { path = "../focus-core", features = ["serial"] }
//! ```
//!
//! # Ownership
//!
//! A focuser's serial channel carries exactly one exchange at a time, so drivers own
//! their [`DynSerial`] outright instead of sharing it behind a mutex. The borrow
//! checker (`&mut self` on every exchange) is what keeps two commands from being in
//! flight at once.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

// =============================================================================
// Serial Port Trait
// =============================================================================

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a serial port. This includes:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing and simulation)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

// Blanket implementation for all types meeting the requirements
impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
///
/// # Example
///
/// ```rust,ignore
/// use focus_core::serial::DynSerial;
///
/// fn create_port(path: &str) -> anyhow::Result<DynSerial> {
///     let port = tokio_serial::new(path, 9600).open_native_async()?;
///     Ok(Box::new(port))
/// }
/// ```
pub type DynSerial = Box<dyn SerialPortIO>;

// =============================================================================
// Serial Port Utilities
// =============================================================================

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
///
/// # Parameters
///
/// - `port_path`: Path to the serial port (e.g., "/dev/ttyUSB0")
/// - `baud_rate`: Baud rate (e.g., 9600)
/// - `device_name`: Human-readable device name for error messages
///
/// # Errors
///
/// Returns an error if the port cannot be opened or spawn_blocking fails.
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Drain stale data from a serial port buffer.
///
/// Reads and discards data until nothing more arrives within `window`. This is the
/// async counterpart of a termios input flush: it keeps bytes left over from a failed
/// exchange from being read as the start of the next response.
///
/// Returns the number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, window: Duration) -> usize {
    let mut discard = [0u8; 64];
    let deadline = tokio::time::Instant::now() + window;
    let mut total_discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => break, // EOF
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Ok(Err(_)) => break, // Real I/O error, surfaced by the next exchange
            Err(_) => break,     // Timeout, no more immediate data
        }
    }

    total_discarded
}
