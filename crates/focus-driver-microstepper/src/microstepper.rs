//! MicroStepper Focuser Driver
//!
//! Protocol: ASCII over USB serial, 9600 baud 8N1, `#`-terminated commands.
//! See [`crate::protocol`] for the frame layout.
//!
//! # Usage
//!
//! ```rust,ignore
//! use focus_driver_microstepper::MicroStepperFactory;
//! use focus_core::driver::DriverFactory;
//!
//! let config = toml::Value::Table(toml::toml! {
//!     port = "/dev/ttyUSB0"
//!     max_position = 20000
//!     backlash = 40
//! });
//! let mut focuser = MicroStepperFactory.build(config).await?;
//! focuser.move_absolute(5000).await?;
//! ```
//!
//! # Motion model
//!
//! Moves are sent as a sequence of absolute GOTO commands, each at most `max_chunk`
//! ticks from the previous one (see [`crate::motion`]). The firmware gives no
//! completion notice; the driver reads the position back once all GOTOs are written
//! and leaves the state at `Moving` until a poll tick sees the position stop changing.

use crate::motion::{self, MovePlan};
use crate::protocol::{self, Command, POSITION_SENTINEL};
use crate::transport::{HexDump, Transport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use focus_core::capabilities::{
    Connectable, FocusDirection, Focuser, MotionState, Pollable, TickOutcome,
};
use focus_core::driver::{Capability, DriverFactory};
use focus_core::error::{FocusError, FocusResult};
use focus_core::limits::{
    FocuserLimits, EXCHANGE_TIMEOUT, FLUSH_WINDOW, MAX_CHUNK, POLL_INTERVAL,
    TEMPERATURE_EVERY_TICKS,
};
use focus_core::observable::Observable;
use focus_core::serial::{open_serial_async, DynSerial};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument;

// =============================================================================
// MicroStepperFactory - DriverFactory implementation
// =============================================================================

/// Configuration for the MicroStepper driver.
///
/// Every field has a default, so an empty table describes a focuser on
/// `/dev/ttyUSB0` with 10000 ticks of travel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MicroStepperConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,
    pub baud_rate: u32,
    /// Per-exchange timeout in milliseconds
    pub timeout_ms: u64,
    /// Stale-input drain window in milliseconds
    pub flush_window_ms: u64,
    /// Host poll interval in milliseconds
    pub poll_interval_ms: u64,
    pub min_position: i32,
    pub max_position: i32,
    /// Largest tick count a single relative move may request
    pub max_relative: u32,
    /// Largest position change per GOTO
    pub max_chunk: u32,
    /// Extra ticks travelled when the direction of motion reverses
    pub backlash: u32,
    pub backlash_enabled: bool,
    /// Swap Inward/Outward for relative moves
    pub reversed: bool,
    /// Read temperature once every this many poll ticks
    pub temperature_every: u32,
}

impl Default for MicroStepperConfig {
    fn default() -> Self {
        let limits = FocuserLimits::default();
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            timeout_ms: EXCHANGE_TIMEOUT.as_millis() as u64,
            flush_window_ms: FLUSH_WINDOW.as_millis() as u64,
            poll_interval_ms: POLL_INTERVAL.as_millis() as u64,
            min_position: limits.min_position,
            max_position: limits.max_position,
            max_relative: limits.max_relative,
            max_chunk: MAX_CHUNK,
            backlash: 0,
            backlash_enabled: true,
            reversed: false,
            temperature_every: TEMPERATURE_EVERY_TICKS,
        }
    }
}

impl MicroStepperConfig {
    /// Travel limits described by this configuration.
    pub fn limits(&self) -> FocuserLimits {
        FocuserLimits {
            min_position: self.min_position,
            max_position: self.max_position,
            max_relative: self.max_relative,
            max_chunk: self.max_chunk,
        }
    }

    /// Reject configurations no device could satisfy, without touching hardware.
    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            anyhow::bail!("MicroStepper port must not be empty");
        }
        if self.baud_rate == 0 {
            anyhow::bail!("MicroStepper baud_rate must be positive");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("MicroStepper timeout_ms must be positive");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("MicroStepper poll_interval_ms must be positive");
        }
        if self.temperature_every == 0 {
            anyhow::bail!("MicroStepper temperature_every must be at least 1");
        }
        self.limits().validate()?;
        Ok(())
    }
}

/// Factory for creating MicroStepper driver instances.
pub struct MicroStepperFactory;

/// Static capabilities for MicroStepper. Temperature is probed at connect time.
static MICROSTEPPER_CAPABILITIES: &[Capability] = &[
    Capability::AbsoluteMove,
    Capability::RelativeMove,
    Capability::Reverse,
    Capability::Backlash,
];

impl DriverFactory for MicroStepperFactory {
    fn driver_type(&self) -> &'static str {
        "microstepper"
    }

    fn name(&self) -> &'static str {
        "MicroStepper Focuser"
    }

    fn capabilities(&self) -> &'static [Capability] {
        MICROSTEPPER_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: MicroStepperConfig = config.clone().try_into()?;
        cfg.validate()
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<Box<dyn Focuser>>> {
        Box::pin(async move {
            let cfg: MicroStepperConfig =
                config.try_into().context("Invalid MicroStepper config")?;
            cfg.validate()?;
            let driver = MicroStepperDriver::open(&cfg).await?;
            Ok(Box::new(driver) as Box<dyn Focuser>)
        })
    }
}

// =============================================================================
// MicroStepperDriver
// =============================================================================

/// Driver for the MicroStepper focuser.
///
/// Owns its serial channel exclusively. Every operation touching the device takes
/// `&mut self`, so one move or poll runs at a time.
pub struct MicroStepperDriver {
    transport: Transport,
    limits: FocuserLimits,
    backlash: u32,
    backlash_enabled: bool,
    reversed: bool,
    poll_interval: Duration,
    temperature_every: u32,

    connected: bool,
    temperature_supported: bool,
    /// Direction of the last move on this connection; `None` before the first one.
    last_direction: Option<FocusDirection>,
    /// Last position confirmed by the device.
    position: i32,
    ticks_since_temperature: u32,

    published_position: Observable<i32>,
    published_temperature: Observable<Option<f64>>,
    published_state: Observable<MotionState>,
}

impl MicroStepperDriver {
    /// Wrap an already-open transport. No I/O is performed; call [`connect`] next.
    ///
    /// [`connect`]: Self::connect
    pub fn new(transport: Transport, config: &MicroStepperConfig) -> Self {
        Self {
            transport,
            limits: config.limits(),
            backlash: config.backlash,
            backlash_enabled: config.backlash_enabled,
            reversed: config.reversed,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            temperature_every: config.temperature_every.max(1),
            connected: false,
            temperature_supported: false,
            last_direction: None,
            position: 0,
            ticks_since_temperature: 0,
            published_position: Observable::new("position", 0)
                .with_description("Focuser position")
                .with_units("ticks"),
            published_temperature: Observable::new("temperature", None)
                .with_description("Focuser temperature")
                .with_units("°C"),
            published_state: Observable::new("state", MotionState::Idle)
                .with_description("Motion state"),
        }
    }

    /// Build a driver over any async byte stream, using the timing from `config`.
    pub fn with_port(port: DynSerial, config: &MicroStepperConfig) -> Self {
        let transport = Transport::new(port)
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_flush_window(Duration::from_millis(config.flush_window_ms));
        Self::new(transport, config)
    }

    /// Open the configured serial port and connect.
    pub async fn open(config: &MicroStepperConfig) -> Result<Self> {
        let port = open_serial_async(&config.port, config.baud_rate, "MicroStepper").await?;
        let mut driver = Self::with_port(Box::new(port), config);
        driver
            .connect()
            .await
            .with_context(|| format!("MicroStepper on {} did not respond", config.port))?;
        Ok(driver)
    }

    /// Handshake, read the initial position, and probe the temperature sensor.
    ///
    /// A missing or failed sensor is not an error; the temperature capability is just
    /// left off.
    #[instrument(skip(self), err)]
    pub async fn connect(&mut self) -> FocusResult<()> {
        self.handshake().await?;

        let position = self.read_position().await?;
        self.publish_position();

        self.temperature_supported = match self.read_temperature().await {
            Ok(reading) => reading.is_some(),
            Err(e) => {
                tracing::debug!(error = %e, "Temperature probe failed");
                false
            }
        };

        tracing::info!(
            position,
            temperature_supported = self.temperature_supported,
            "MicroStepper connected"
        );
        Ok(())
    }

    /// Query the device position and update the cached value.
    ///
    /// A successful read clears a `Faulted` state.
    #[instrument(skip(self), err)]
    pub async fn read_position(&mut self) -> FocusResult<i32> {
        self.ensure_connected()?;
        let frame = self.exchange(Command::GetPosition).await?;
        let position = protocol::parse_position(&frame)?;

        self.position = position;
        if self.state() == MotionState::Faulted {
            self.set_state(MotionState::Idle);
        }
        Ok(position)
    }

    /// Query the device temperature.
    ///
    /// Returns `Ok(None)` for readings the firmware flags as failed or that fall outside
    /// the plausible range; the last valid reading is kept in that case.
    #[instrument(skip(self), err)]
    pub async fn read_temperature(&mut self) -> FocusResult<Option<f64>> {
        self.ensure_connected()?;
        let frame = self.exchange(Command::GetTemperature).await?;

        match protocol::parse_temperature(&frame) {
            Some(celsius) => {
                self.published_temperature.set(Some(celsius));
                Ok(Some(celsius))
            }
            None => {
                tracing::debug!(frame = %HexDump(&frame), "Rejected temperature reading");
                Ok(None)
            }
        }
    }

    /// Backlash compensation currently applied on reversal, in ticks.
    pub fn effective_backlash(&self) -> u32 {
        if self.backlash_enabled {
            self.backlash
        } else {
            0
        }
    }

    /// Whether the connect-time probe found a working temperature sensor.
    pub fn supports_temperature(&self) -> bool {
        self.temperature_supported
    }

    /// Direction of the last move on this connection.
    pub fn last_direction(&self) -> Option<FocusDirection> {
        self.last_direction
    }

    async fn exchange(&mut self, command: Command) -> FocusResult<Vec<u8>> {
        let frame = self
            .transport
            .send_command(&command.encode(), command.expect())
            .await?;
        Ok(frame)
    }

    fn ensure_connected(&self) -> FocusResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(FocusError::NotConnected)
        }
    }

    fn set_state(&self, state: MotionState) {
        if self.published_state.set_if_changed(state) {
            tracing::debug!(%state, "Motion state changed");
        }
    }

    /// Publish the cached position; returns whether subscribers were notified.
    fn publish_position(&self) -> bool {
        self.published_position.set_if_changed(self.position)
    }

    /// Send every GOTO in `plan`, then read the position back.
    ///
    /// Stops at the first failed exchange; no further commands are sent.
    async fn execute(&mut self, plan: &MovePlan) -> FocusResult<()> {
        for (chunk, step) in plan.steps.iter().enumerate() {
            if let Err(e) = self.exchange(Command::Goto(step.position)).await {
                tracing::warn!(
                    chunk,
                    position = step.position,
                    error = %e,
                    "GOTO failed, aborting move"
                );
                return Err(e);
            }
        }

        self.read_position().await?;
        self.publish_position();
        Ok(())
    }
}

#[async_trait]
impl Connectable for MicroStepperDriver {
    #[instrument(skip(self), err)]
    async fn handshake(&mut self) -> FocusResult<()> {
        self.connected = false;
        let frame = self.exchange(Command::GetPosition).await?;

        if frame.first() != Some(&POSITION_SENTINEL) {
            tracing::warn!(frame = %HexDump(&frame), "Unexpected handshake response");
            return Err(FocusError::HandshakeFailed(format!(
                "expected position frame starting with 'P', got [{}]",
                HexDump(&frame)
            )));
        }

        self.connected = true;
        tracing::debug!("MicroStepper handshake OK");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl Pollable for MicroStepperDriver {
    #[instrument(skip(self), err)]
    async fn on_timer_tick(&mut self) -> FocusResult<TickOutcome> {
        if !self.connected {
            return Ok(TickOutcome {
                position: self.position,
                ..Default::default()
            });
        }

        let previous = self.position;
        let position = self.read_position().await?;
        let mut outcome = TickOutcome {
            position,
            ..Default::default()
        };

        if self.state() == MotionState::Moving && position == previous {
            self.set_state(MotionState::Idle);
            outcome.settled = true;
            tracing::debug!(position, "Focuser settled");
        }
        outcome.position_changed = self.publish_position();

        if self.temperature_supported {
            self.ticks_since_temperature += 1;
            if self.ticks_since_temperature >= self.temperature_every {
                self.ticks_since_temperature = 0;
                match self.read_temperature().await {
                    Ok(reading) => outcome.temperature = reading,
                    Err(e) => tracing::warn!(error = %e, "Temperature refresh failed"),
                }
            }
        }

        Ok(outcome)
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[async_trait]
impl Focuser for MicroStepperDriver {
    fn initialize(&mut self, limits: FocuserLimits, backlash: u32) -> FocusResult<()> {
        limits.validate()?;
        self.limits = limits;
        self.backlash = backlash;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn move_absolute(&mut self, target: i32) -> FocusResult<()> {
        self.ensure_connected()?;
        let target = self.limits.check_target(i64::from(target))?;

        let plan = motion::plan_move(
            self.position,
            target,
            self.last_direction,
            self.effective_backlash(),
            &self.limits,
        );

        if plan.is_empty() {
            tracing::debug!(target, "Already at target");
            self.read_position().await?;
            self.publish_position();
            return Ok(());
        }

        tracing::debug!(
            from = self.position,
            target,
            direction = %plan.direction,
            chunks = plan.steps.len(),
            backlash = plan.backlash(),
            "Starting move"
        );

        self.set_state(MotionState::Moving);
        let result = self.execute(&plan).await;
        self.last_direction = Some(plan.direction);

        if let Err(e) = result {
            self.set_state(MotionState::Faulted);
            return Err(e);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn move_relative(&mut self, direction: FocusDirection, ticks: u32) -> FocusResult<()> {
        self.ensure_connected()?;
        self.limits.check_relative(ticks)?;

        let current = self.read_position().await?;
        let direction = if self.reversed {
            direction.reversed()
        } else {
            direction
        };
        let target = i64::from(current) + direction.signum() * i64::from(ticks);
        let target = self.limits.check_target(target)?;

        self.move_absolute(target).await
    }

    fn set_reversed(&mut self, enabled: bool) {
        self.reversed = enabled;
    }

    fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn set_backlash_enabled(&mut self, enabled: bool) {
        self.backlash_enabled = enabled;
    }

    fn is_backlash_enabled(&self) -> bool {
        self.backlash_enabled
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn temperature(&self) -> Option<f64> {
        self.published_temperature.get()
    }

    fn state(&self) -> MotionState {
        self.published_state.get()
    }

    fn limits(&self) -> FocuserLimits {
        self.limits
    }

    fn capabilities(&self) -> Vec<Capability> {
        let mut caps = MICROSTEPPER_CAPABILITIES.to_vec();
        if self.temperature_supported {
            caps.push(Capability::Temperature);
        }
        caps
    }

    fn subscribe_position(&self) -> watch::Receiver<i32> {
        self.published_position.subscribe()
    }

    fn subscribe_temperature(&self) -> watch::Receiver<Option<f64>> {
        self.published_temperature.subscribe()
    }

    fn subscribe_state(&self) -> watch::Receiver<MotionState> {
        self.published_state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedMicroStepper;

    fn fast_config() -> MicroStepperConfig {
        MicroStepperConfig {
            timeout_ms: 100,
            flush_window_ms: 1,
            ..Default::default()
        }
    }

    async fn connected(sim: &SimulatedMicroStepper, config: &MicroStepperConfig) -> MicroStepperDriver {
        let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), config);
        driver.connect().await.unwrap();
        sim.clear_commands();
        driver
    }

    #[test]
    fn test_factory_driver_type() {
        let factory = MicroStepperFactory;
        assert_eq!(factory.driver_type(), "microstepper");
        assert_eq!(factory.name(), "MicroStepper Focuser");
    }

    #[test]
    fn test_factory_capabilities() {
        let caps = MicroStepperFactory.capabilities();
        assert!(caps.contains(&Capability::AbsoluteMove));
        assert!(caps.contains(&Capability::Backlash));
        assert!(!caps.contains(&Capability::Temperature));
    }

    #[test]
    fn test_factory_validate_config() {
        let factory = MicroStepperFactory;

        let valid = toml::Value::Table(toml::toml! {
            port = "/dev/ttyUSB1"
            max_position = 20000
            backlash = 40
        });
        assert!(factory.validate(&valid).is_ok());

        let empty = toml::Value::Table(toml::map::Map::new());
        assert!(factory.validate(&empty).is_ok());

        let bad_limits = toml::Value::Table(toml::toml! {
            min_position = 500
            max_position = 100
        });
        assert!(factory.validate(&bad_limits).is_err());

        let unknown = toml::Value::Table(toml::toml! {
            address = "2"
        });
        assert!(factory.validate(&unknown).is_err());
    }

    #[test]
    fn test_config_defaults() {
        let cfg = MicroStepperConfig::default();
        assert_eq!(cfg.baud_rate, 9600);
        assert_eq!(cfg.timeout_ms, 3000);
        assert_eq!(cfg.poll_interval_ms, 500);
        assert_eq!(cfg.limits(), FocuserLimits::default());
        assert!(cfg.backlash_enabled);
        assert_eq!(cfg.temperature_every, 10);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let sim = SimulatedMicroStepper::new(100);
        let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), &fast_config());

        assert!(matches!(
            driver.move_absolute(200).await,
            Err(FocusError::NotConnected)
        ));
        assert!(matches!(
            driver.read_position().await,
            Err(FocusError::NotConnected)
        ));
        assert!(sim.commands().is_empty());
    }

    #[tokio::test]
    async fn test_connect_reads_position_and_probes_temperature() {
        let sim = SimulatedMicroStepper::new(1234).with_temperature(21);
        let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), &fast_config());

        driver.connect().await.unwrap();

        assert!(driver.is_connected());
        assert_eq!(driver.position(), 1234);
        assert_eq!(driver.temperature(), Some(21.0));
        assert!(driver.capabilities().contains(&Capability::Temperature));
        assert_eq!(sim.commands(), vec!["GETPOS", "GETPOS", "GETTEMP"]);
    }

    #[tokio::test]
    async fn test_reversal_backlash_tracks_last_direction() {
        let sim = SimulatedMicroStepper::new(1000);
        let config = MicroStepperConfig {
            backlash: 25,
            ..fast_config()
        };
        let mut driver = connected(&sim, &config).await;

        driver.move_absolute(800).await.unwrap();
        assert_eq!(driver.last_direction(), Some(FocusDirection::Inward));
        driver.move_absolute(900).await.unwrap();
        assert_eq!(driver.last_direction(), Some(FocusDirection::Outward));

        // First move has no prior direction; second reverses
        assert_eq!(sim.goto_targets(), vec![800, 925]);
    }

    #[tokio::test]
    async fn test_disabled_backlash_is_not_applied() {
        let sim = SimulatedMicroStepper::new(1000);
        let config = MicroStepperConfig {
            backlash: 25,
            backlash_enabled: false,
            ..fast_config()
        };
        let mut driver = connected(&sim, &config).await;

        driver.move_absolute(800).await.unwrap();
        driver.move_absolute(900).await.unwrap();
        assert_eq!(sim.goto_targets(), vec![800, 900]);
        assert_eq!(driver.effective_backlash(), 0);
    }

    #[tokio::test]
    async fn test_initialize_replaces_limits() {
        let sim = SimulatedMicroStepper::new(0);
        let mut driver = connected(&sim, &fast_config()).await;

        driver
            .initialize(FocuserLimits::with_max_position(500), 10)
            .unwrap();
        assert_eq!(driver.limits().max_position, 500);
        assert!(matches!(
            driver.move_absolute(600).await,
            Err(FocusError::OutOfRange { .. })
        ));

        let bad = FocuserLimits {
            max_chunk: 0,
            ..Default::default()
        };
        assert!(driver.initialize(bad, 0).is_err());
        assert_eq!(driver.limits().max_position, 500);
    }
}
