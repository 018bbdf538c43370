//! Connection settings loaded with Figment.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (12 ports, 9600 baud, 1 s read timeout)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `RVM_VALVE_`
//!
//! # Example
//! ```no_run
//! use rvm_valve::config::ValveSettings;
//! use std::path::Path;
//!
//! let settings = ValveSettings::load(Some(Path::new("valve.toml")))?;
//! println!("Valve on {} with {} ports", settings.port, settings.number_of_ports);
//! # Ok::<(), rvm_valve::error::ValveError>(())
//! ```
//!
//! Example file:
//! ```toml
//! port = "/dev/ttyUSB0"
//! number_of_ports = 10
//! timeout_ms = 500
//! ```

use crate::error::{ValveError, ValveResult};
use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_NUMBER_OF_PORTS};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RVM_VALVE_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Settings for one valve connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValveSettings {
    /// Serial port identifier, e.g. `COM7` or `/dev/ttyUSB0`
    #[serde(default)]
    pub port: String,
    /// Number of ports on the valve head
    #[serde(default = "default_number_of_ports")]
    pub number_of_ports: u32,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Logging level for the command-line tool (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_number_of_ports() -> u32 {
    DEFAULT_NUMBER_OF_PORTS
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ValveSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            number_of_ports: default_number_of_ports(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ValveSettings {
    /// Settings for `port` with everything else at defaults.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    /// Set the port count.
    pub fn with_number_of_ports(mut self, number_of_ports: u32) -> Self {
        self.number_of_ports = number_of_ports;
        self
    }

    /// Set the read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Layered figment: defaults, then `path` if given, then environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load without validating.
    ///
    /// An explicitly named file must exist.
    pub fn load_unchecked(path: Option<&Path>) -> ValveResult<Self> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ValveError::Configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(Self::figment(path).extract()?)
    }

    /// Load and validate.
    pub fn load(path: Option<&Path>) -> ValveResult<Self> {
        let settings = Self::load_unchecked(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string on top of the defaults.
    pub fn from_toml_str(source: &str) -> ValveResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(source))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic checks that parsing cannot express.
    pub fn validate(&self) -> ValveResult<()> {
        if self.port.trim().is_empty() {
            return Err(ValveError::Configuration(
                "No serial port configured. Set `port` or RVM_VALVE_PORT".to_string(),
            ));
        }

        if self.number_of_ports == 0 {
            return Err(ValveError::InvalidPortCount(self.number_of_ports));
        }

        if self.baud_rate == 0 {
            return Err(ValveError::Configuration(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        let level = self.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ValveError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Read timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> ValveResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ValveError::Configuration(format!("Failed to render settings: {e}")))
    }
}
