//! CLI Entry Point for rust-focus
//!
//! Provides command-line interface for:
//! - Reporting focuser status
//! - Absolute and relative moves, waiting for the focuser to settle
//! - Monitoring position and temperature
//! - Listing serial ports
//!
//! # Usage
//!
//! ```bash
//! rust-focus status
//! rust-focus goto 5000
//! rust-focus step in 250 --no-backlash
//! rust-focus --simulate monitor --ticks 20
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use focus_core::capabilities::{FocusDirection, Focuser, MotionState, Pollable};
use rust_focus::config::{FocusConfig, DEFAULT_CONFIG_PATH};
use rust_focus::logging;
use rust_focus::registry::FactoryRegistry;
use rust_focus::{open_device, run_poll_loop};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on how long `goto`/`step` wait for the focuser to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "rust-focus")]
#[command(about = "Control a MicroStepper telescope focuser over serial", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use an in-process simulated focuser instead of the serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: logging::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print position, temperature and capabilities
    Status,

    /// Move to an absolute position and wait until the focuser settles
    Goto {
        /// Target position in ticks
        #[arg(allow_negative_numbers = true)]
        target: i32,
        /// Skip backlash compensation for this move
        #[arg(long)]
        no_backlash: bool,
    },

    /// Move by a number of ticks and wait until the focuser settles
    Step {
        /// Direction: in or out
        direction: FocusDirection,
        /// Tick count
        ticks: u32,
        /// Skip backlash compensation for this move
        #[arg(long)]
        no_backlash: bool,
    },

    /// Poll the focuser and print changes until Ctrl+C
    Monitor {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// List serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FocusConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate().map_err(anyhow::Error::msg)?;

    let tracing_config = logging::TracingConfig::from_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_format(cli.log_format);
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    tracing::debug!(name = %config.application.name, path = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Ports => list_ports(),
        command => run(command, &config, cli.simulate).await,
    }
}

async fn run(command: Commands, config: &FocusConfig, simulate: bool) -> Result<()> {
    let registry = FactoryRegistry::with_builtin_drivers();
    let mut device = open_device(config, &registry, simulate).await?;
    let interval = config
        .polling
        .interval()
        .unwrap_or_else(|| device.poll_interval());

    match command {
        Commands::Status => print_status(device.as_ref()),
        Commands::Goto {
            target,
            no_backlash,
        } => {
            if no_backlash {
                device.set_backlash_enabled(false);
            }
            device.move_absolute(target).await?;
            wait_settled(device.as_mut(), interval).await?;
            print_status(device.as_ref());
        }
        Commands::Step {
            direction,
            ticks,
            no_backlash,
        } => {
            if no_backlash {
                device.set_backlash_enabled(false);
            }
            device.move_relative(direction, ticks).await?;
            wait_settled(device.as_mut(), interval).await?;
            print_status(device.as_ref());
        }
        Commands::Monitor { ticks } => monitor(device.as_mut(), interval, ticks).await,
        Commands::Ports => list_ports()?,
    }

    Ok(())
}

fn print_status(device: &dyn Focuser) {
    let limits = device.limits();
    println!("Position:     {}", device.position());
    match device.temperature() {
        Some(celsius) => println!("Temperature:  {:.1} °C", celsius),
        None => println!("Temperature:  n/a"),
    }
    println!("State:        {}", device.state());
    println!("Reversed:     {}", device.is_reversed());
    println!("Backlash:     {}", if device.is_backlash_enabled() { "on" } else { "off" });
    println!(
        "Travel:       {}..={} (max relative {}, chunk {})",
        limits.min_position, limits.max_position, limits.max_relative, limits.max_chunk
    );
    let caps: Vec<String> = device.capabilities().iter().map(|c| c.to_string()).collect();
    println!("Capabilities: {}", caps.join(", "));
}

async fn wait_settled(device: &mut dyn Focuser, interval: Duration) -> Result<()> {
    if device.state() != MotionState::Moving {
        return Ok(());
    }

    let summary = run_poll_loop(
        device,
        interval,
        tokio::time::sleep(SETTLE_TIMEOUT),
        |outcome| {
            if outcome.settled {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        },
    )
    .await;

    match summary.last {
        Some(outcome) if outcome.settled => Ok(()),
        _ => anyhow::bail!(
            "Focuser did not settle within {}s ({} poll errors)",
            SETTLE_TIMEOUT.as_secs(),
            summary.errors
        ),
    }
}

async fn monitor(device: &mut dyn Focuser, interval: Duration, max_ticks: Option<u64>) {
    let mut seen = 0u64;
    let shutdown = async {
        // Ctrl+C handler failure leaves the loop running until --ticks
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let summary = run_poll_loop(device, interval, shutdown, |outcome| {
        seen += 1;
        if outcome.position_changed || outcome.settled {
            println!("position {}", outcome.position);
        }
        if let Some(celsius) = outcome.temperature {
            println!("temperature {:.1} °C", celsius);
        }
        match max_ticks {
            Some(limit) if seen >= limit => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    })
    .await;

    println!(
        "{} ticks, {} errors, last position {}",
        summary.ticks,
        summary.errors,
        device.position()
    );
}

#[cfg(feature = "instrument_serial")]
fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                info.vid,
                info.pid,
                info.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports() -> Result<()> {
    anyhow::bail!("Serial port enumeration requires the 'instrument_serial' feature")
}
