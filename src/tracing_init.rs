//! Log output for the `rvm-valve` tool.
//!
//! The driver emits `tracing` events through its observer and leaves
//! subscriber setup to the program using it. [`init`] is that setup for the
//! command-line tool: one `fmt` layer on stdout, filtered at the configured
//! level, with `RUST_LOG` directives layered on top.
//!
//! # Example
//! ```no_run
//! use rvm_valve::tracing_init::{self, LogFormat, LogSetup};
//! use tracing::Level;
//!
//! tracing_init::init(&LogSetup::new(Level::DEBUG).with_format(LogFormat::Json))?;
//! tracing::info!("valve tool started");
//! # Ok::<(), rvm_valve::error::ValveError>(())
//! ```

use crate::config::ValveSettings;
use crate::error::{ValveError, ValveResult};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// How each log record is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line with colors, for watching a session by eye
    Pretty,
    /// One plain line per record
    #[default]
    Compact,
    /// One JSON object per record
    Json,
}

/// Level and format for the tool's log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSetup {
    /// Most verbose level shown unless `RUST_LOG` says otherwise
    pub level: Level,
    /// Record layout
    pub format: LogFormat,
}

impl Default for LogSetup {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl LogSetup {
    /// Compact output at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::default(),
        }
    }

    /// Level taken from the `log_level` setting.
    pub fn from_settings(settings: &ValveSettings) -> ValveResult<Self> {
        Ok(Self::new(parse_log_level(&settings.log_level)?))
    }

    /// Use `format` for every record.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy()
    }
}

/// Install the global subscriber described by `setup`.
///
/// Returns `Ok` without changes if a subscriber is already installed.
pub fn init(setup: &LogSetup) -> ValveResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let layer = match setup.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_ansi(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(setup.filter()))
        .try_init()
        .map_err(|e| ValveError::Configuration(format!("Could not install log subscriber: {e}")))
}

/// Parse a level name, ignoring case.
pub fn parse_log_level(name: &str) -> ValveResult<Level> {
    name.trim().parse::<Level>().map_err(|_| {
        ValveError::Configuration(format!(
            "Unknown log level '{name}'; use trace, debug, info, warn or error"
        ))
    })
}
