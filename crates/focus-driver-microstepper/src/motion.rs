//! Move planning: chunking and backlash compensation.
//!
//! Planning is pure; [`plan_move`] turns a current position and a target into the
//! sequence of GOTO positions the driver sends. Keeping it free of I/O lets the
//! chunking rules be checked without a device.
//!
//! Rules:
//! - The move travels in the direction from `current` to `target`.
//! - Each chunk moves at most `max_chunk` ticks toward the target.
//! - On a direction reversal, `backlash` extra ticks are added to the first chunk only.
//!   They are not counted against the remaining distance, so the last GOTO overshoots
//!   the target by `backlash` in the direction of travel.
//! - The overshoot never leaves `[min_position, max_position]`. Near a limit the
//!   backlash shrinks to the headroom left between the target and that limit.
//! - A zero-length move produces an empty plan.

use focus_core::capabilities::FocusDirection;
use focus_core::limits::FocuserLimits;

/// One GOTO command in a planned move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveStep {
    /// Absolute position sent in the GOTO.
    pub position: i32,
    /// Signed distance toward the target covered by this step.
    pub delta: i64,
    /// Backlash compensation folded into this step.
    pub backlash: u32,
}

/// A planned move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub direction: FocusDirection,
    pub steps: Vec<MoveStep>,
}

impl MovePlan {
    /// Whether the plan sends no commands.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of step deltas, excluding backlash. Equals `target - current`.
    pub fn net_delta(&self) -> i64 {
        self.steps.iter().map(|step| step.delta).sum()
    }

    /// Backlash compensation applied by this plan.
    pub fn backlash(&self) -> u32 {
        self.steps.iter().map(|step| step.backlash).sum()
    }
}

/// Plan the GOTO sequence that moves from `current` to `target`.
///
/// `last_direction` is the direction of the previous move; `None` means no move has
/// been made on this connection, which never counts as a reversal. Chunk size and the
/// travel range come from `limits`; a `max_chunk` of 0 is treated as 1. Every planned
/// position lies within `[min_position, max_position]`.
pub fn plan_move(
    current: i32,
    target: i32,
    last_direction: Option<FocusDirection>,
    backlash: u32,
    limits: &FocuserLimits,
) -> MovePlan {
    let direction = FocusDirection::between(i64::from(current), i64::from(target));
    let sign = direction.signum();
    let chunk = u64::from(limits.max_chunk.max(1));
    let min = i64::from(limits.min_position);
    let max = i64::from(limits.max_position);

    let mut remaining = (i64::from(target) - i64::from(current)).unsigned_abs();
    let reversal = remaining > 0 && last_direction.is_some_and(|last| last != direction);
    let headroom = match direction {
        FocusDirection::Outward => max - i64::from(target),
        FocusDirection::Inward => i64::from(target) - min,
    };
    let mut pending_backlash = if reversal {
        // headroom is clamped to [0, backlash], so it fits in u32
        headroom.clamp(0, i64::from(backlash)) as u32
    } else {
        0
    };

    // clamp() panics on inverted bounds; validated limits are never inverted
    let (low, high) = (min.min(max), max.max(min));
    let mut working = i64::from(current);
    let mut steps = Vec::with_capacity(remaining.div_ceil(chunk) as usize);

    while remaining > 0 {
        let step = remaining.min(chunk);
        let extra = std::mem::take(&mut pending_backlash);

        // step <= |target - current| and extra <= u32::MAX, so both fit in i64
        working += sign * (step as i64 + i64::from(extra));
        remaining -= step;

        steps.push(MoveStep {
            // low and high come from i32 limits, so the clamped value fits
            position: working.clamp(low, high) as i32,
            delta: sign * step as i64,
            backlash: extra,
        });
    }

    MovePlan { direction, steps }
}
