//! Error types for the valve driver.
//!
//! `ValveError` is the single error type returned by every fallible operation in
//! this crate. It is built with `thiserror`, and `#[from]` conversions let the
//! `?` operator lift transport and configuration errors into it.
//!
//! ## Error Hierarchy
//!
//! - **Connection-level** (`Connection`, `Io`, `NotConnected`): the serial line
//!   could not be opened, a write or read failed, or the controller was already
//!   closed. These are never retried; they propagate straight to the caller.
//! - **Input errors** (`InvalidDirection`, `InvalidPortCount`, `InvalidCommand`):
//!   values that cannot be turned into a valid command frame.
//! - **Configuration** (`Config`, `Configuration`): settings failed to load or
//!   failed semantic validation.
//! - **`SerialFeatureDisabled`**: the crate was built without the `serial` feature.
//!
//! An out-of-range move target is deliberately *not* an error: it is reported via
//! [`MoveOutcome::Rejected`](crate::controller::MoveOutcome::Rejected) and the
//! controller stays usable.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type ValveResult<T> = std::result::Result<T, ValveError>;

/// Errors produced by the valve driver.
#[derive(Error, Debug)]
pub enum ValveError {
    /// The serial port could not be opened.
    #[error("Failed to open valve serial port '{port}': {source}")]
    Connection {
        /// Serial port identifier that failed to open
        port: String,
        /// Underlying transport error
        #[source]
        source: std::io::Error,
    },

    /// A write or read on an open connection failed.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The controller has been closed.
    #[error("Valve connection is closed")]
    NotConnected,

    /// A direction value outside the supported set.
    #[error("Invalid move direction '{0}'. Must be one of: shortest (0), incremental (1), decremental (2)")]
    InvalidDirection(String),

    /// A valve must have at least one port.
    #[error("Invalid number of ports {0}. Must be at least 1")]
    InvalidPortCount(u32),

    /// A command body that cannot be sent as a single-byte-per-char frame.
    #[error("Invalid command body {0:?}")]
    InvalidCommand(String),

    /// Settings could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Settings loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,
}

impl ValveError {
    /// Whether this error means the connection is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ValveError::Connection { .. } | ValveError::Io(_) | ValveError::NotConnected
        )
    }
}

impl From<figment::Error> for ValveError {
    fn from(err: figment::Error) -> Self {
        ValveError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn connection_errors_are_grouped() {
        let open = ValveError::Connection {
            port: "/dev/ttyUSB9".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
        };
        assert!(open.is_connection_error());
        assert!(ValveError::NotConnected.is_connection_error());
        assert!(ValveError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_connection_error());

        assert!(!ValveError::InvalidPortCount(0).is_connection_error());
        assert!(!ValveError::InvalidDirection("3".into()).is_connection_error());
    }

    #[test]
    fn connection_error_names_the_port() {
        let err = ValveError::Connection {
            port: "COM7".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("COM7"));
        assert!(msg.contains("access denied"));
    }

    #[test]
    fn figment_errors_convert() {
        let err: ValveError = figment::Error::from("bad value".to_string()).into();
        assert!(matches!(err, ValveError::Config(_)));
        assert!(err.to_string().contains("bad value"));
    }
}
