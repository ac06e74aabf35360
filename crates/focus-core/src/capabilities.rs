//! Focuser Capabilities
//!
//! Narrow traits the host holds a focuser driver through, instead of a driver base
//! class:
//!
//! - [`Connectable`]: liveness handshake once per connection
//! - [`Pollable`]: periodic state refresh driven by the host's timer
//! - [`Focuser`]: the movement API (absolute/relative moves, reversal, readings)
//!
//! # Design
//!
//! Each trait:
//! - Is async (uses #[async_trait])
//! - Takes `&mut self` for anything touching the device, so moves and polls on one
//!   driver are serialized by construction
//! - Uses [`FocusResult`] for errors
//!
//! # Example
//!
//! ```rust,ignore
//! async fn focus_in(device: &mut dyn Focuser) -> FocusResult<()> {
//!     device.handshake().await?;
//!     device.move_relative(FocusDirection::Inward, 250).await?;
//!     while device.state() == MotionState::Moving {
//!         tokio::time::sleep(device.poll_interval()).await;
//!         device.on_timer_tick().await?;
//!     }
//!     Ok(())
//! }
//! ```

use crate::driver::Capability;
use crate::error::{FocusError, FocusResult};
use crate::limits::FocuserLimits;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;

// =============================================================================
// Motion Vocabulary
// =============================================================================

/// Logical direction of focuser travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusDirection {
    /// Toward lower tick counts.
    Inward,
    /// Toward higher tick counts.
    Outward,
}

impl FocusDirection {
    /// Direction of travel from `current` to `target`.
    ///
    /// A zero-length move counts as `Inward`.
    pub fn between(current: i64, target: i64) -> Self {
        if current - target < 0 {
            Self::Outward
        } else {
            Self::Inward
        }
    }

    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Inward => Self::Outward,
            Self::Outward => Self::Inward,
        }
    }

    /// Sign applied to tick deltas travelling in this direction.
    pub fn signum(self) -> i64 {
        match self {
            Self::Inward => -1,
            Self::Outward => 1,
        }
    }
}

impl fmt::Display for FocusDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inward => write!(f, "inward"),
            Self::Outward => write!(f, "outward"),
        }
    }
}

impl FromStr for FocusDirection {
    type Err = FocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" | "inward" => Ok(Self::Inward),
            "out" | "outward" => Ok(Self::Outward),
            other => Err(FocusError::Configuration(format!(
                "Invalid direction '{}'. Must be one of: in, inward, out, outward",
                other
            ))),
        }
    }
}

/// Motion state of a focuser driver.
///
/// `Faulted` only describes the last operation; the next successful device exchange
/// returns the driver to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    #[default]
    Idle,
    Moving,
    Faulted,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Moving => "moving",
            Self::Faulted => "faulted",
        };
        write!(f, "{}", label)
    }
}

/// What a single poll tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickOutcome {
    /// Position read back from the device.
    pub position: i32,
    /// The published position changed on this tick.
    pub position_changed: bool,
    /// A move in progress was observed to have stopped on this tick.
    pub settled: bool,
    /// Fresh temperature reading, if one was taken and valid.
    pub temperature: Option<f64>,
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: connection liveness.
#[async_trait]
pub trait Connectable: Send {
    /// Probe the device once to confirm it speaks the expected protocol.
    ///
    /// # Errors
    /// - `FocusError::HandshakeFailed` if the device answers with the wrong sentinel
    /// - `FocusError::Transport` if the exchange itself fails
    async fn handshake(&mut self) -> FocusResult<()>;

    /// Whether the last handshake succeeded.
    fn is_connected(&self) -> bool;
}

/// Capability: periodic polling.
///
/// The host calls [`Pollable::on_timer_tick`] on its own cadence; the driver spawns no
/// background tasks.
#[async_trait]
pub trait Pollable: Send {
    /// Refresh device state once.
    ///
    /// Must not block longer than the exchanges it issues.
    async fn on_timer_tick(&mut self) -> FocusResult<TickOutcome>;

    /// Interval at which the host should call `on_timer_tick`.
    fn poll_interval(&self) -> Duration;
}

/// Capability: focuser motion.
///
/// # Contract
/// - Positions are integer ticks
/// - Bounds violations are rejected before any motion command is sent
/// - `position()` is the last position confirmed by the device, never a requested target
#[async_trait]
pub trait Focuser: Connectable + Pollable {
    /// Apply travel limits and backlash compensation.
    fn initialize(&mut self, limits: FocuserLimits, backlash: u32) -> FocusResult<()>;

    /// Move to an absolute position.
    async fn move_absolute(&mut self, target: i32) -> FocusResult<()>;

    /// Move by `ticks` in `direction` from the freshly read position.
    async fn move_relative(&mut self, direction: FocusDirection, ticks: u32) -> FocusResult<()>;

    /// Invert the meaning of Inward/Outward for relative moves.
    fn set_reversed(&mut self, enabled: bool);

    /// Whether relative moves are currently inverted.
    fn is_reversed(&self) -> bool;

    /// Turn backlash compensation on or off without changing its amount.
    fn set_backlash_enabled(&mut self, enabled: bool);

    /// Whether backlash compensation is applied on direction reversals.
    fn is_backlash_enabled(&self) -> bool;

    /// Last position confirmed by the device.
    fn position(&self) -> i32;

    /// Last valid temperature reading, if the device has a sensor.
    fn temperature(&self) -> Option<f64>;

    /// Current motion state.
    fn state(&self) -> MotionState;

    /// Active travel limits.
    fn limits(&self) -> FocuserLimits;

    /// Capabilities of this driver instance, including ones probed at connect time.
    fn capabilities(&self) -> Vec<Capability>;

    /// Subscribe to published position changes.
    fn subscribe_position(&self) -> watch::Receiver<i32>;

    /// Subscribe to published temperature readings.
    fn subscribe_temperature(&self) -> watch::Receiver<Option<f64>>;

    /// Subscribe to motion state changes.
    fn subscribe_state(&self) -> watch::Receiver<MotionState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_between() {
        assert_eq!(FocusDirection::between(100, 200), FocusDirection::Outward);
        assert_eq!(FocusDirection::between(200, 100), FocusDirection::Inward);
        assert_eq!(FocusDirection::between(100, 100), FocusDirection::Inward);
    }

    #[test]
    fn test_direction_reversed_and_sign() {
        assert_eq!(FocusDirection::Inward.reversed(), FocusDirection::Outward);
        assert_eq!(FocusDirection::Outward.reversed(), FocusDirection::Inward);
        assert_eq!(FocusDirection::Inward.signum(), -1);
        assert_eq!(FocusDirection::Outward.signum(), 1);
    }

    #[test]
    fn test_direction_from_str() {
        assert_eq!("in".parse::<FocusDirection>().unwrap(), FocusDirection::Inward);
        assert_eq!("OUT".parse::<FocusDirection>().unwrap(), FocusDirection::Outward);
        assert_eq!(
            "Outward".parse::<FocusDirection>().unwrap(),
            FocusDirection::Outward
        );
        assert!("sideways".parse::<FocusDirection>().is_err());
    }

    #[test]
    fn test_motion_state_display() {
        assert_eq!(MotionState::default(), MotionState::Idle);
        assert_eq!(MotionState::Faulted.to_string(), "faulted");
        assert_eq!(FocusDirection::Outward.to_string(), "outward");
    }
}
