//! Driver Factory and Capability Flags
//!
//! Drivers implement [`DriverFactory`] and are registered with the host at startup via
//! explicit `registry.register_factory(factory)` calls. There is no process-wide driver
//! instance: `build` returns an owned [`Focuser`] that the host keeps for as long as the
//! connection lives.
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use focus_core::driver::{Capability, DriverFactory};
//! use futures::future::BoxFuture;
//!
//! pub struct MyFocuserFactory;
//!
//! impl DriverFactory for MyFocuserFactory {
//!     fn driver_type(&self) -> &'static str { "my_focuser" }
//!     fn name(&self) -> &'static str { "My Focuser" }
//!     fn capabilities(&self) -> &'static [Capability] { &[Capability::AbsoluteMove] }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let _: MyConfig = config.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<Box<dyn Focuser>>> {
//!         Box::pin(async move {
//!             let cfg: MyConfig = config.try_into()?;
//!             Ok(Box::new(MyFocuser::connect(&cfg).await?) as Box<dyn Focuser>)
//!         })
//!     }
//! }
//! ```

use crate::capabilities::Focuser;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for focuser introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Can move to an absolute tick position
    AbsoluteMove,
    /// Can move by a relative tick count
    RelativeMove,
    /// Can invert the direction of relative moves
    Reverse,
    /// Applies backlash compensation on direction reversal
    Backlash,
    /// Reports a temperature reading
    Temperature,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AbsoluteMove => "absolute_move",
            Self::RelativeMove => "relative_move",
            Self::Reverse => "reverse",
            Self::Backlash => "backlash",
            Self::Temperature => "temperature",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Driver Factory
// =============================================================================

/// Factory that validates a driver's TOML configuration and builds connected drivers.
pub trait DriverFactory: Send + Sync {
    /// Unique identifier used in configuration files (`type = "..."`).
    fn driver_type(&self) -> &'static str;

    /// Human-readable driver name.
    fn name(&self) -> &'static str;

    /// Capabilities every driver built by this factory supports.
    ///
    /// Optional capabilities probed at connect time (e.g. temperature) are reported by
    /// the built driver, not here.
    fn capabilities(&self) -> &'static [Capability];

    /// Validate a configuration table without touching hardware.
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Open the device, handshake, and return the connected driver.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<Box<dyn Focuser>>>;
}
