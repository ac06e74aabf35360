//! In-process MicroStepper simulator.
//!
//! Speaks the device side of the protocol over a `tokio::io::duplex` pipe, so the real
//! driver and transport can be exercised without hardware:
//!
//! ```rust,ignore
//! let sim = SimulatedMicroStepper::new(5000).with_temperature(18);
//! let mut driver = MicroStepperDriver::with_port(Box::new(sim.spawn()), &config);
//! driver.connect().await?;
//! ```
//!
//! GOTO jumps straight to the target. Tests that need to observe motion move the
//! simulated position with [`SimulatedMicroStepper::set_position`].

use crate::protocol::{POSITION_SENTINEL, STOP_CHAR, TEMPERATURE_FAILURE};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const PIPE_CAPACITY: usize = 256;

/// Received commands kept for inspection; older ones are dropped.
pub const COMMAND_HISTORY: usize = 1024;

#[derive(Debug)]
struct SimState {
    position: i32,
    temperature: Option<i32>,
    sentinel: u8,
    silent: bool,
    temperature_silent: bool,
    hang_up_after_gotos: Option<usize>,
    gotos: usize,
    commands: VecDeque<String>,
}

/// Simulated MicroStepper firmware.
///
/// Clones share state, so a test can keep a handle while the device task runs.
#[derive(Debug, Clone)]
pub struct SimulatedMicroStepper {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMicroStepper {
    /// A device at `position` with no temperature sensor.
    pub fn new(position: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                position,
                temperature: None,
                sentinel: POSITION_SENTINEL,
                silent: false,
                temperature_silent: false,
                hang_up_after_gotos: None,
                gotos: 0,
                commands: VecDeque::new(),
            })),
        }
    }

    /// Report `celsius` from `GETTEMP#`.
    pub fn with_temperature(self, celsius: i32) -> Self {
        self.state.lock().temperature = Some(celsius);
        self
    }

    /// Start position frames with `sentinel` instead of `P`.
    pub fn with_sentinel(self, sentinel: u8) -> Self {
        self.state.lock().sentinel = sentinel;
        self
    }

    /// Record commands but never answer them.
    pub fn silent(self) -> Self {
        self.state.lock().silent = true;
        self
    }

    /// Close the channel right after the `count`-th GOTO.
    pub fn hang_up_after_gotos(self, count: usize) -> Self {
        self.state.lock().hang_up_after_gotos = Some(count);
        self
    }

    /// Toggle answering at runtime.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Stop answering `GETTEMP#` only, as a sensor bus that has locked up.
    pub fn set_temperature_silent(&self, silent: bool) {
        self.state.lock().temperature_silent = silent;
    }

    pub fn position(&self) -> i32 {
        self.state.lock().position
    }

    /// Move the simulated mechanism, as if it were still travelling.
    pub fn set_position(&self, position: i32) {
        self.state.lock().position = position;
    }

    /// Change the temperature reading; `None` reports a failed sensor.
    pub fn set_temperature(&self, celsius: Option<i32>) {
        self.state.lock().temperature = celsius;
    }

    /// The last [`COMMAND_HISTORY`] commands received, without the terminator.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.iter().cloned().collect()
    }

    /// Targets of every GOTO received so far.
    pub fn goto_targets(&self) -> Vec<i32> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|cmd| cmd.strip_prefix("GOTO:"))
            .filter_map(|arg| arg.parse().ok())
            .collect()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Spawn the device task and return the host end of the channel.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self) -> DuplexStream {
        let (host, device) = tokio::io::duplex(PIPE_CAPACITY);
        let sim = self.clone();
        tokio::spawn(async move { sim.serve(device).await });
        host
    }

    /// Answer commands on `stream` until the host hangs up.
    pub async fn serve(self, mut stream: DuplexStream) {
        let mut command = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match stream.read(&mut byte).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            if byte[0] != STOP_CHAR {
                command.push(byte[0]);
                continue;
            }

            let text = String::from_utf8_lossy(&command).into_owned();
            command.clear();

            match self.respond(&text) {
                Reply::Frame(frame) => {
                    if stream.write_all(&frame).await.is_err() {
                        return;
                    }
                }
                Reply::None => {}
                Reply::HangUp => return,
            }
        }
    }

    fn respond(&self, command: &str) -> Reply {
        let mut state = self.state.lock();
        if state.commands.len() == COMMAND_HISTORY {
            state.commands.pop_front();
        }
        state.commands.push_back(command.to_string());
        tracing::trace!(command, "Simulated MicroStepper received command");

        if let Some(arg) = command.strip_prefix("GOTO:") {
            if let Ok(target) = arg.parse() {
                state.position = target;
            }
            state.gotos += 1;
            if state.hang_up_after_gotos == Some(state.gotos) {
                return Reply::HangUp;
            }
            return Reply::None;
        }

        if state.silent {
            return Reply::None;
        }

        match command {
            "GETPOS" => {
                let mut frame = vec![state.sentinel];
                frame.extend_from_slice(format!("{:06}", state.position).as_bytes());
                Reply::Frame(frame)
            }
            "GETTEMP" if state.temperature_silent => Reply::None,
            "GETTEMP" => {
                let celsius = state.temperature.unwrap_or(TEMPERATURE_FAILURE);
                Reply::Frame(format!("T{:04}", celsius).into_bytes())
            }
            _ => Reply::None,
        }
    }
}

enum Reply {
    Frame(Vec<u8>),
    None,
    HangUp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_position_frame_format() {
        let sim = SimulatedMicroStepper::new(5000);
        let mut host = sim.spawn();

        host.write_all(b"GETPOS#").await.unwrap();
        let mut buf = [0u8; 7];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"P005000");
    }

    #[tokio::test]
    async fn test_goto_updates_position() {
        let sim = SimulatedMicroStepper::new(0);
        let mut host = sim.spawn();

        host.write_all(b"GOTO:-10#GETPOS#").await.unwrap();
        let mut buf = [0u8; 7];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"P-00010");
        assert_eq!(sim.goto_targets(), vec![-10]);
        assert_eq!(sim.commands(), vec!["GOTO:-10", "GETPOS"]);
    }

    #[tokio::test]
    async fn test_temperature_frames() {
        let sim = SimulatedMicroStepper::new(0).with_temperature(21);
        let mut host = sim.spawn();
        let mut buf = [0u8; 5];

        host.write_all(b"GETTEMP#").await.unwrap();
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"T0021");

        sim.set_temperature(None);
        host.write_all(b"GETTEMP#").await.unwrap();
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"T-127");
    }

    #[tokio::test]
    async fn test_hang_up_after_gotos() {
        let sim = SimulatedMicroStepper::new(0).hang_up_after_gotos(1);
        let mut host = sim.spawn();

        host.write_all(b"GOTO:5#").await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(host.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_command_history_is_bounded() {
        let sim = SimulatedMicroStepper::new(0);
        let mut host = sim.spawn();

        for target in 0..COMMAND_HISTORY + 5 {
            host.write_all(format!("GOTO:{}#", target).as_bytes()).await.unwrap();
        }
        host.write_all(b"GETPOS#").await.unwrap();
        let mut buf = [0u8; 7];
        host.read_exact(&mut buf).await.unwrap();

        let commands = sim.commands();
        assert_eq!(commands.len(), COMMAND_HISTORY);
        assert_eq!(commands.first().map(String::as_str), Some("GOTO:6"));
        assert_eq!(commands.last().map(String::as_str), Some("GETPOS"));
    }

    #[tokio::test]
    async fn test_temperature_silence_leaves_position_answering() {
        let sim = SimulatedMicroStepper::new(42).with_temperature(20);
        sim.set_temperature_silent(true);
        let mut host = sim.spawn();

        host.write_all(b"GETTEMP#GETPOS#").await.unwrap();
        let mut buf = [0u8; 7];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"P000042");
    }
}
