//! # Rust Focus Host Library
//!
//! Host-side plumbing for serial telescope focusers. The driver logic lives in the
//! workspace crates (`focus-core`, `focus-driver-microstepper`); this crate wires them
//! up for the `rust-focus` binary and for embedding:
//!
//! - **`config`**: figment-based loading of `config/focuser.toml` plus `RUST_FOCUS_*`
//!   environment overrides.
//! - **`logging`**: `tracing-subscriber` initialization from the configured level.
//! - **`registry`**: `FactoryRegistry`, mapping driver type names to `DriverFactory`s.
//! - **`host`**: building/connecting the configured device and the poll loop that
//!   drives its timer tick.

pub mod config;
pub mod host;
pub mod logging;
pub mod registry;

pub use config::FocusConfig;
pub use host::{open_device, run_poll_loop, PollSummary};
pub use registry::FactoryRegistry;
