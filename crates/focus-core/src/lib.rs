//! `focus-core`
//!
//! Core trait definitions and types for rust-focus focuser drivers.
//!
//! Driver crates (such as `focus-driver-microstepper`) depend on this crate for the
//! shared error taxonomy, the capability traits the host holds drivers through, and
//! the async serial helpers.
//!
//! ## Modules
//!
//! - **`capabilities`**: `Connectable`, `Pollable` and `Focuser` traits plus the
//!   motion vocabulary (`FocusDirection`, `MotionState`, `TickOutcome`).
//! - **`driver`**: `DriverFactory` and runtime `Capability` flags for registration.
//! - **`error`**: `FocusError` / `TransportError`.
//! - **`limits`**: travel limits and protocol bounds.
//! - **`observable`**: watch-channel backed values the host subscribes to.
//! - **`serial`** (feature `serial`): opening and draining serial ports.

pub mod capabilities;
pub mod driver;
pub mod error;
pub mod limits;
pub mod observable;
#[cfg(feature = "serial")]
pub mod serial;

pub use capabilities::{Connectable, FocusDirection, Focuser, MotionState, Pollable, TickOutcome};
pub use error::{FocusError, FocusResult, TransportError};
pub use limits::FocuserLimits;
