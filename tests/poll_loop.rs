//! Host poll loop and device construction against the simulated focuser.

use focus_core::capabilities::{Focuser, MotionState};
use focus_driver_microstepper::{MicroStepperConfig, MicroStepperDriver, SimulatedMicroStepper};
use rust_focus::config::FocusConfig;
use rust_focus::registry::FactoryRegistry;
use rust_focus::{open_device, run_poll_loop};
use std::future::pending;
use std::ops::ControlFlow;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(5);

fn driver_config() -> MicroStepperConfig {
    MicroStepperConfig {
        timeout_ms: 100,
        flush_window_ms: 1,
        temperature_every: 2,
        ..Default::default()
    }
}

async fn connected(sim: &SimulatedMicroStepper) -> MicroStepperDriver {
    let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), &driver_config());
    driver.connect().await.unwrap();
    driver
}

#[tokio::test]
async fn test_loop_stops_when_callback_breaks() {
    let sim = SimulatedMicroStepper::new(100).with_temperature(9);
    let mut driver = connected(&sim).await;

    let mut seen = 0;
    let summary = run_poll_loop(&mut driver, TICK, pending(), |_| {
        seen += 1;
        if seen == 4 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .await;

    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.errors, 0);
    let last = summary.last.unwrap();
    assert_eq!(last.position, 100);
    // temperature_every = 2, so the fourth tick refreshed it
    assert_eq!(last.temperature, Some(9.0));
}

#[tokio::test]
async fn test_loop_observes_settle_after_move() {
    let sim = SimulatedMicroStepper::new(0);
    let mut driver = connected(&sim).await;

    driver.move_absolute(1500).await.unwrap();
    assert_eq!(driver.state(), MotionState::Moving);

    let summary = run_poll_loop(&mut driver, TICK, pending(), |outcome| {
        if outcome.settled {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .await;

    assert!(summary.last.unwrap().settled);
    assert_eq!(driver.state(), MotionState::Idle);
    assert_eq!(driver.position(), 1500);
}

#[tokio::test]
async fn test_loop_stops_on_shutdown_and_counts_errors() {
    let sim = SimulatedMicroStepper::new(0);
    let mut driver = connected(&sim).await;

    // Device stops answering; every tick now times out
    sim.set_silent(true);
    let summary = run_poll_loop(
        &mut driver,
        TICK,
        tokio::time::sleep(Duration::from_millis(350)),
        |_| ControlFlow::Continue(()),
    )
    .await;

    assert_eq!(summary.ticks, 0);
    assert!(summary.errors >= 1);
    assert!(summary.last.is_none());
}

#[tokio::test]
async fn test_open_device_simulated() {
    let registry = FactoryRegistry::with_builtin_drivers();
    let mut config = FocusConfig::default();
    config.device.config = toml::Value::Table(toml::toml! {
        timeout_ms = 200
        flush_window_ms = 1
        backlash = 20
    });

    let mut device = open_device(&config, &registry, true).await.unwrap();
    assert!(device.position() > 0);
    assert_eq!(device.temperature(), Some(18.0));

    let start = device.position();
    device.move_absolute(start - 300).await.unwrap();
    assert_eq!(device.position(), start - 300);
}

#[tokio::test]
async fn test_open_device_simulated_rejects_other_types() {
    let registry = FactoryRegistry::with_builtin_drivers();
    let mut config = FocusConfig::default();
    config.device.r#type = "esp300".to_string();

    let err = open_device(&config, &registry, true).await.err().unwrap();
    assert!(err.to_string().contains("esp300"));
}
