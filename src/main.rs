//! CLI Entry Point for rvm-valve
//!
//! Drives a single rotary valve from the command line. Opening the valve homes
//! it, so every invocation starts with `/1ZR`.
//!
//! # Usage
//!
//! ```bash
//! rvm-valve --port /dev/ttyUSB0 move 5
//! rvm-valve --port COM7 move 4 --direction incremental
//! rvm-valve --config valve.toml demo
//! rvm-valve --port COM7 --dry-run move 3   # no hardware, frames are only logged
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rvm_valve::config::ValveSettings;
use rvm_valve::controller::{MoveOutcome, ValveBuilder, ValveController};
use rvm_valve::mock::MockTransport;
use rvm_valve::protocol::Direction;
use rvm_valve::tracing_init::{self, LogFormat, LogSetup};
use rvm_valve::transport::ValveTransport;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rvm-valve")]
#[command(about = "Control an RVM rotary selector valve over serial", long_about = None)]
struct Cli {
    /// Serial port of the valve (e.g. COM7 or /dev/ttyUSB0)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Number of ports on the valve head
    #[arg(long = "ports", global = true)]
    number_of_ports: Option<u32>,

    /// Read timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Log frames instead of talking to hardware
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Home the valve again
    Home,

    /// Move to a port
    Move {
        /// Target port (1-indexed)
        #[arg(allow_negative_numbers = true)]
        position: i64,

        /// Rotation direction
        #[arg(long, value_enum, default_value_t = Direction::Shortest)]
        direction: Direction,
    },

    /// Send the abort command
    Abort,

    /// Query the valve position
    Position,

    /// Send a raw command body, e.g. `?6`
    Send {
        /// Command body without `/1` prefix or carriage return
        body: String,
    },

    /// Home, move to 5, then move to 4 incrementally
    Demo {
        /// Pause between steps in milliseconds
        #[arg(long, default_value = "3000")]
        pause_ms: u64,
    },

    /// Print the effective settings and exit
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    if let Commands::ShowConfig = cli.command {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    settings.validate().context("Invalid valve settings")?;

    let log_setup = LogSetup::from_settings(&settings)?.with_format(cli.log_format);
    tracing_init::init(&log_setup)?;

    let builder = ValveBuilder::from_settings(&settings);
    if cli.dry_run {
        let transport = MockTransport::new().with_name(format!("dry-run:{}", settings.port));
        run(builder.connect(transport)?, cli.command)
    } else {
        let valve = builder
            .open()
            .with_context(|| format!("Could not connect to valve on {}", settings.port))?;
        run(valve, cli.command)
    }
}

/// File and environment first, then command-line flags.
fn resolve_settings(cli: &Cli) -> Result<ValveSettings> {
    let mut settings = ValveSettings::load_unchecked(cli.config.as_deref())?;
    if let Some(port) = &cli.port {
        settings.port = port.clone();
    }
    if let Some(number_of_ports) = cli.number_of_ports {
        settings.number_of_ports = number_of_ports;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.timeout_ms = timeout_ms;
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

fn run<T: ValveTransport>(valve: ValveController<T>, command: Commands) -> Result<()> {
    tracing::debug!(device = ?valve.transport_name(), "Valve ready");
    valve.scoped(|valve| -> Result<()> {
        match command {
            Commands::Home => valve.home()?,
            Commands::Move {
                position,
                direction,
            } => {
                let outcome = valve.move_to(position, direction)?;
                report_move(valve, outcome)?;
            }
            Commands::Abort => valve.abort()?,
            Commands::Position => {
                let reported = valve.get_position()?;
                println!(
                    "reported: {reported} (not decoded), estimated: {}, raw reply: {:?}",
                    valve.current_position(),
                    valve.last_reply().text()
                );
            }
            Commands::Send { body } => {
                valve.execute(&body)?;
                println!("{}", valve.last_reply());
            }
            Commands::Demo { pause_ms } => {
                let pause = Duration::from_millis(pause_ms);
                thread::sleep(pause);
                valve.home()?;
                thread::sleep(pause);
                let outcome = valve.move_to(5, Direction::Shortest)?;
                report_move(valve, outcome)?;
                thread::sleep(pause);
                let outcome = valve.move_to(4, Direction::Incremental)?;
                report_move(valve, outcome)?;
            }
            Commands::ShowConfig => {}
        }
        Ok(())
    })
}

fn report_move<T: ValveTransport>(valve: &ValveController<T>, outcome: MoveOutcome) -> Result<()> {
    match outcome {
        MoveOutcome::Moved(port) => {
            println!("moved to port {port}");
            Ok(())
        }
        MoveOutcome::Rejected { requested } => bail!(
            "Port {requested} does not exist on this valve (1-{})",
            valve.number_of_ports()
        ),
    }
}
