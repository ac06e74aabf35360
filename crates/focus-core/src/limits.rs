//! Shared hard limits for focuser drivers.
//!
//! This module centralizes:
//! - Protocol bounds (frame length)
//! - Default timeouts and polling cadence
//! - Travel limits of the focuser (`FocuserLimits`)

use crate::error::FocusError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Default timeout for one command/response exchange (3 seconds).
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Window used to drain stale bytes before and after an exchange (20 ms).
pub const FLUSH_WINDOW: Duration = Duration::from_millis(20);

/// Recommended interval between poll ticks (500 ms).
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Temperature is refreshed once every this many poll ticks.
///
/// At the default 500 ms poll interval that is once every 5 seconds.
pub const TEMPERATURE_EVERY_TICKS: u32 = 10;

// =============================================================================
// Size Limits
// =============================================================================

/// Maximum frame length in bytes, for both commands and responses.
pub const MAX_FRAME_LEN: usize = 64;

/// Largest position change a single GOTO command may request.
pub const MAX_CHUNK: u32 = 1000;

// =============================================================================
// Travel Limits
// =============================================================================

/// Travel limits of a focuser, in ticks.
///
/// Absolute targets must lie in `[min_position, max_position]`; a relative move may
/// request at most `max_relative` ticks; a single device command moves at most
/// `max_chunk` ticks (not counting backlash compensation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocuserLimits {
    pub min_position: i32,
    pub max_position: i32,
    pub max_relative: u32,
    pub max_chunk: u32,
}

impl Default for FocuserLimits {
    fn default() -> Self {
        Self {
            min_position: 0,
            max_position: 10_000,
            max_relative: 1000,
            max_chunk: MAX_CHUNK,
        }
    }
}

impl FocuserLimits {
    /// Limits with the given maximum position and default everything else.
    pub fn with_max_position(max_position: i32) -> Self {
        Self {
            max_position,
            ..Default::default()
        }
    }

    /// Reject limits that cannot describe a real focuser.
    pub fn validate(&self) -> Result<(), FocusError> {
        if self.min_position < 0 {
            return Err(FocusError::Configuration(format!(
                "min_position must not be negative, got {}",
                self.min_position
            )));
        }
        if self.min_position > self.max_position {
            return Err(FocusError::Configuration(format!(
                "min_position {} exceeds max_position {}",
                self.min_position, self.max_position
            )));
        }
        if self.max_chunk == 0 {
            return Err(FocusError::Configuration(
                "max_chunk must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `position` is a legal absolute target.
    pub fn contains(&self, position: i64) -> bool {
        (i64::from(self.min_position)..=i64::from(self.max_position)).contains(&position)
    }

    /// Check an absolute target, returning `OutOfRange` when it is not legal.
    pub fn check_target(&self, target: i64) -> Result<i32, FocusError> {
        if !self.contains(target) {
            return Err(FocusError::OutOfRange {
                what: "target position",
                value: target,
                min: i64::from(self.min_position),
                max: i64::from(self.max_position),
            });
        }
        // contains() bounds target to the i32 limits
        Ok(target as i32)
    }

    /// Check a relative tick count, returning `OutOfRange` when it is too large.
    pub fn check_relative(&self, ticks: u32) -> Result<(), FocusError> {
        if ticks > self.max_relative {
            return Err(FocusError::OutOfRange {
                what: "relative ticks",
                value: i64::from(ticks),
                min: 0,
                max: i64::from(self.max_relative),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = FocuserLimits::default();
        assert_eq!(limits.max_position, 10_000);
        assert_eq!(limits.max_chunk, 1000);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        let limits = FocuserLimits {
            min_position: 500,
            max_position: 100,
            ..Default::default()
        };
        assert!(matches!(limits.validate(), Err(FocusError::Configuration(_))));

        let limits = FocuserLimits {
            max_chunk: 0,
            ..Default::default()
        };
        assert!(limits.validate().is_err());

        let limits = FocuserLimits {
            min_position: -1,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_check_target() {
        let limits = FocuserLimits::with_max_position(2000);
        assert_eq!(limits.check_target(0).unwrap(), 0);
        assert_eq!(limits.check_target(2000).unwrap(), 2000);
        assert!(matches!(
            limits.check_target(2001),
            Err(FocusError::OutOfRange { value: 2001, max: 2000, .. })
        ));
        assert!(limits.check_target(-1).is_err());
    }

    #[test]
    fn test_check_relative() {
        let limits = FocuserLimits::default();
        assert!(limits.check_relative(1000).is_ok());
        assert!(matches!(
            limits.check_relative(1001),
            Err(FocusError::OutOfRange { what: "relative ticks", .. })
        ));
    }
}
