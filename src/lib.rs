//! # RVM Rotary Valve Driver
//!
//! Serial driver for Advanced Microfluidics RVM/AVM rotary selector valves.
//!
//! The valve speaks a small ASCII command protocol over a point-to-point serial
//! line (9600 baud). This crate frames commands, keeps a local estimate of the
//! valve position, validates requested ports against the valve's port count,
//! and hands raw replies to an observer.
//!
//! ## Crate Structure
//!
//! - **`controller`**: [`ValveController`](controller::ValveController), the
//!   driver itself: home, move, abort, position query, scoped open/close.
//! - **`protocol`**: frame layout, [`Direction`](protocol::Direction),
//!   [`Command`](protocol::Command) and raw [`Reply`](protocol::Reply).
//! - **`transport`**: the [`ValveTransport`](transport::ValveTransport) seam and
//!   its `serialport` implementation.
//! - **`mock`**: scripted in-memory transport for tests and dry runs.
//! - **`observer`**: injected event sinks; the default logs through `tracing`.
//! - **`config`**: layered settings (defaults, TOML file, `RVM_VALVE_*` env).
//! - **`tracing_init`**: subscriber setup for binaries.
//! - **`error`**: the crate-wide [`ValveError`](error::ValveError).
//!
//! ## Example
//!
//! ```no_run
//! use rvm_valve::config::ValveSettings;
//! use rvm_valve::controller::with_valve;
//! use rvm_valve::protocol::Direction;
//!
//! with_valve(&ValveSettings::new("COM7"), |valve| {
//!     valve.move_to(5, Direction::Shortest)?;
//!     valve.move_to(4, Direction::Incremental)?;
//!     Ok::<_, rvm_valve::error::ValveError>(())
//! })?;
//! # Ok::<(), rvm_valve::error::ValveError>(())
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod mock;
pub mod observer;
pub mod protocol;
pub mod tracing_init;
pub mod transport;

pub use controller::{with_valve, MoveOutcome, ValveBuilder, ValveController};
pub use error::{ValveError, ValveResult};
pub use protocol::Direction;
