//! MicroStepper focuser driver.
//!
//! This crate provides:
//! - [`transport`]: framed command/response exchanges over a serial channel
//! - [`protocol`]: the MicroStepper command set and response parsers
//! - [`motion`]: move planning (chunking, backlash compensation)
//! - [`MicroStepperDriver`]: the focuser controller
//! - [`sim`]: an in-process simulated device
//!
//! # Usage
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! focus-driver-microstepper = { path = "../focus-driver-microstepper" }
//! ```
//!
//! Register the factory with your driver registry:
//!
//! ```rust,ignore
//! use focus_driver_microstepper::MicroStepperFactory;
//!
//! registry.register_factory(Box::new(MicroStepperFactory));
//! ```

mod microstepper;
pub mod motion;
pub mod protocol;
pub mod sim;
pub mod transport;

pub use microstepper::{MicroStepperConfig, MicroStepperDriver, MicroStepperFactory};
pub use sim::SimulatedMicroStepper;
pub use transport::{Expect, HexDump, Transport};

/// Force the linker to include this crate.
///
/// Call this function from main() to ensure the driver factories are
/// linked into the final binary and not stripped by the linker.
#[inline(never)]
pub fn link() {
    std::hint::black_box(std::any::TypeId::of::<MicroStepperFactory>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_does_not_panic() {
        link();
    }
}
