//! Poll loop driving a focuser's timer tick.
//!
//! The driver spawns nothing of its own; the host owns the cadence. Ticks run strictly
//! one after another on the caller's task, so a tick never overlaps a move.

use crate::config::FocusConfig;
use crate::registry::FactoryRegistry;
use anyhow::{bail, Context, Result};
use focus_core::capabilities::{Focuser, Pollable, TickOutcome};
use focus_driver_microstepper::{MicroStepperConfig, MicroStepperDriver, SimulatedMicroStepper};
use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Position the simulated focuser starts at.
const SIMULATED_START_POSITION: i32 = 5000;

/// Temperature reported by the simulated focuser.
const SIMULATED_TEMPERATURE: i32 = 18;

/// Build and connect the configured focuser.
///
/// With `simulate`, the driver talks to an in-process [`SimulatedMicroStepper`]
/// instead of opening the serial port; only the `microstepper` type can be simulated.
pub async fn open_device(
    config: &FocusConfig,
    registry: &FactoryRegistry,
    simulate: bool,
) -> Result<Box<dyn Focuser>> {
    let driver_type = config.device.r#type.as_str();
    if !simulate {
        return registry.build(driver_type, config.device.config.clone()).await;
    }

    if driver_type != "microstepper" {
        bail!("Simulation is not available for driver type '{}'", driver_type);
    }
    let device_config: MicroStepperConfig = config
        .device
        .config
        .clone()
        .try_into()
        .context("Invalid MicroStepper config")?;
    device_config.validate()?;

    let sim = SimulatedMicroStepper::new(SIMULATED_START_POSITION)
        .with_temperature(SIMULATED_TEMPERATURE);
    let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), &device_config);
    driver
        .connect()
        .await
        .context("Simulated MicroStepper did not respond")?;

    tracing::info!("Using simulated MicroStepper");
    Ok(Box::new(driver))
}

/// What a finished poll loop observed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PollSummary {
    /// Ticks that completed without error.
    pub ticks: u64,
    /// Ticks that returned an error.
    pub errors: u64,
    /// Outcome of the last successful tick.
    pub last: Option<TickOutcome>,
}

/// Call `on_timer_tick` every `interval` until `shutdown` resolves or `on_tick` breaks.
///
/// Tick errors are logged and counted; the loop keeps going, since recovery (e.g.
/// re-running the handshake) is up to the caller. The first tick fires immediately.
pub async fn run_poll_loop<S, F>(
    device: &mut dyn Focuser,
    interval: Duration,
    shutdown: S,
    mut on_tick: F,
) -> PollSummary
where
    S: Future<Output = ()>,
    F: FnMut(&TickOutcome) -> ControlFlow<()>,
{
    let mut summary = PollSummary::default();
    let mut ticker = tokio::time::interval(interval);
    // Skip missed ticks if a slow exchange overruns the interval
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    tracing::debug!(interval_ms = interval.as_millis() as u64, "Poll loop started");

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match device.on_timer_tick().await {
                    Ok(outcome) => {
                        summary.ticks += 1;
                        summary.last = Some(outcome);
                        if outcome.settled {
                            tracing::info!(position = outcome.position, "Focuser settled");
                        }
                        if on_tick(&outcome).is_break() {
                            break;
                        }
                    }
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!(error = %e, "Poll tick failed");
                    }
                }
            }
        }
    }

    tracing::debug!(
        ticks = summary.ticks,
        errors = summary.errors,
        "Poll loop stopped"
    );
    summary
}
