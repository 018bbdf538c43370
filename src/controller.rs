//! Advanced Microfluidics RVM/AVM rotary valve controller.
//!
//! Protocol: point-to-point serial, 9600 baud, ASCII frames `/1<COMMAND>\r`.
//! See [`crate::protocol`] for the command set.
//!
//! # Usage
//!
//! ```no_run
//! use rvm_valve::controller::ValveController;
//! use rvm_valve::protocol::Direction;
//!
//! // Opening homes the valve.
//! let mut valve = ValveController::open("/dev/ttyUSB0", 12)?;
//! valve.move_to(5, Direction::Shortest)?;
//! valve.move_to(4, Direction::Incremental)?;
//! valve.close()?;
//! # Ok::<(), rvm_valve::error::ValveError>(())
//! ```
//!
//! # Position tracking
//!
//! The valve's replies are not decoded, so [`ValveController::current_position`]
//! is the port last *commanded*, not a confirmed physical position. A home or
//! move that the device fails to complete goes unnoticed.
//!
//! # Lifetime
//!
//! The controller owns the transport. [`ValveController::close`] releases it;
//! if the controller is dropped while still open it is closed then. After
//! closing, every operation returns [`ValveError::NotConnected`].

use crate::config::ValveSettings;
use crate::error::{ValveError, ValveResult};
use crate::observer::{TracingObserver, ValveEvent, ValveObserver};
use crate::protocol::{self, Command, Direction, Reply, DEFAULT_BAUD_RATE, DEFAULT_NUMBER_OF_PORTS};
use crate::transport::{open_serial, SerialTransport, ValveTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Value of [`MoveOutcome::code`] for a rejected move.
pub const REJECTED_MOVE_CODE: i64 = -1;

/// Value returned by [`ValveController::get_position`] until position replies are decoded.
pub const POSITION_PLACEHOLDER: u32 = 0;

/// Default read timeout of a freshly opened serial port.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

// =============================================================================
// MoveOutcome
// =============================================================================

/// Result of a move request that reached the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move command was sent; the valve is assumed to be at this port.
    Moved(u32),
    /// The target is not a port of this valve; nothing was sent.
    Rejected {
        /// Requested port
        requested: i64,
    },
}

impl MoveOutcome {
    /// New position, or [`REJECTED_MOVE_CODE`] (`-1`).
    pub fn code(&self) -> i64 {
        match self {
            MoveOutcome::Moved(port) => i64::from(*port),
            MoveOutcome::Rejected { .. } => REJECTED_MOVE_CODE,
        }
    }

    /// Whether the move was sent.
    pub fn is_moved(&self) -> bool {
        matches!(self, MoveOutcome::Moved(_))
    }

    /// New position, if the move was sent.
    pub fn position(&self) -> Option<u32> {
        match self {
            MoveOutcome::Moved(port) => Some(*port),
            MoveOutcome::Rejected { .. } => None,
        }
    }
}

// =============================================================================
// ValveBuilder
// =============================================================================

/// Builder for [`ValveController`].
#[derive(Clone)]
pub struct ValveBuilder {
    port_identifier: String,
    number_of_ports: u32,
    baud_rate: u32,
    timeout: Duration,
    observer: Arc<dyn ValveObserver>,
}

impl ValveBuilder {
    /// Builder for the valve on `port_identifier` with default settings.
    pub fn new(port_identifier: impl Into<String>) -> Self {
        Self {
            port_identifier: port_identifier.into(),
            number_of_ports: DEFAULT_NUMBER_OF_PORTS,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: DEFAULT_TIMEOUT,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Builder taking port, port count, baud rate and timeout from `settings`.
    pub fn from_settings(settings: &ValveSettings) -> Self {
        Self::new(settings.port.clone())
            .number_of_ports(settings.number_of_ports)
            .baud_rate(settings.baud_rate)
            .timeout(settings.timeout())
    }

    /// Number of ports on the valve head.
    pub fn number_of_ports(mut self, number_of_ports: u32) -> Self {
        self.number_of_ports = number_of_ports;
        self
    }

    /// Serial baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Serial read timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Observer receiving the controller's events.
    pub fn observer(mut self, observer: Arc<dyn ValveObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Open the serial port and home the valve.
    pub fn open(self) -> ValveResult<ValveController<SerialTransport>> {
        check_port_count(self.number_of_ports)?;
        let transport = open_serial(&self.port_identifier, self.baud_rate, self.timeout)?;
        self.connect(transport)
    }

    /// Take ownership of an already open transport and home the valve.
    ///
    /// If homing fails the transport is closed before the error is returned.
    pub fn connect<T: ValveTransport>(self, transport: T) -> ValveResult<ValveController<T>> {
        check_port_count(self.number_of_ports)?;

        let mut controller = ValveController {
            transport: Some(transport),
            port_identifier: self.port_identifier,
            number_of_ports: self.number_of_ports,
            current_position: 1,
            last_reply: Reply::default(),
            observer: self.observer,
        };
        controller.notify(&ValveEvent::Connected);
        controller.home()?;
        Ok(controller)
    }
}

fn check_port_count(number_of_ports: u32) -> ValveResult<()> {
    if number_of_ports == 0 {
        return Err(ValveError::InvalidPortCount(number_of_ports));
    }
    Ok(())
}

// =============================================================================
// ValveController
// =============================================================================

/// Driver for one rotary selector valve.
pub struct ValveController<T: ValveTransport = SerialTransport> {
    transport: Option<T>,
    port_identifier: String,
    number_of_ports: u32,
    current_position: u32,
    last_reply: Reply,
    observer: Arc<dyn ValveObserver>,
}

impl ValveController<SerialTransport> {
    /// Open the valve on `port_identifier` at 9600 baud and home it.
    pub fn open(port_identifier: &str, number_of_ports: u32) -> ValveResult<Self> {
        ValveBuilder::new(port_identifier)
            .number_of_ports(number_of_ports)
            .open()
    }

    /// Open the valve described by `settings` and home it.
    pub fn open_with_settings(settings: &ValveSettings) -> ValveResult<Self> {
        ValveBuilder::from_settings(settings).open()
    }
}

impl<T: ValveTransport> ValveController<T> {
    /// Builder for a controller on `port_identifier`.
    pub fn builder(port_identifier: impl Into<String>) -> ValveBuilder {
        ValveBuilder::new(port_identifier)
    }

    /// Wrap an open transport with the default observer and home the valve.
    pub fn with_transport(
        transport: T,
        port_identifier: impl Into<String>,
        number_of_ports: u32,
    ) -> ValveResult<Self> {
        ValveBuilder::new(port_identifier)
            .number_of_ports(number_of_ports)
            .connect(transport)
    }

    /// Serial port identifier this controller was opened on.
    pub fn port_identifier(&self) -> &str {
        &self.port_identifier
    }

    /// Number of ports on the valve head.
    pub fn number_of_ports(&self) -> u32 {
        self.number_of_ports
    }

    /// Port last commanded by `home` or `move_to`.
    ///
    /// This is a local estimate. The valve never confirms arrival.
    pub fn current_position(&self) -> u32 {
        self.current_position
    }

    /// Raw bytes drained after the most recent command.
    pub fn last_reply(&self) -> &Reply {
        &self.last_reply
    }

    /// Whether the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Device name reported by the transport.
    pub fn transport_name(&self) -> Option<String> {
        self.transport.as_ref().and_then(|t| t.name())
    }

    fn notify(&self, event: &ValveEvent) {
        self.observer.on_event(&self.port_identifier, event);
    }

    fn ensure_connected(&self) -> ValveResult<()> {
        if self.transport.is_none() {
            return Err(ValveError::NotConnected);
        }
        Ok(())
    }

    /// Send a raw command body.
    ///
    /// Reports the frame to the observer, writes `/1<body>\r`, then drains
    /// whatever the valve has already sent back. A failed write has still been
    /// reported. The drain does not wait, so the reply is often empty when the
    /// valve has not answered yet. The reply is reported to the observer and
    /// kept as [`last_reply`](Self::last_reply); it is not checked for device
    /// errors.
    #[instrument(level = "debug", skip(self), fields(port = %self.port_identifier))]
    pub fn execute(&mut self, body: &str) -> ValveResult<()> {
        let transport = self.transport.as_mut().ok_or(ValveError::NotConnected)?;
        let frame = protocol::frame(body)?;

        self.observer.on_event(
            &self.port_identifier,
            &ValveEvent::CommandSent {
                frame: frame.clone(),
            },
        );
        transport.write_frame(&frame)?;

        let reply = Reply::new(transport.read_available()?);
        self.observer.on_event(
            &self.port_identifier,
            &ValveEvent::ReplyReceived {
                reply: reply.clone(),
            },
        );
        self.last_reply = reply;
        Ok(())
    }

    /// Send a [`Command`].
    pub fn send(&mut self, command: &Command) -> ValveResult<()> {
        self.execute(&command.body())
    }

    /// Home the valve (`ZR`). The position becomes 1 once the command is sent.
    pub fn home(&mut self) -> ValveResult<()> {
        self.send(&Command::Home)?;
        self.current_position = 1;
        Ok(())
    }

    /// Abort the current movement (`T`).
    ///
    /// The vendor manual does not describe this command clearly; it is sent
    /// as-is and may have no effect.
    pub fn abort(&mut self) -> ValveResult<()> {
        self.send(&Command::Abort)
    }

    /// Move to `target` using `direction`.
    ///
    /// Targets outside `1..=number_of_ports` are rejected without touching the
    /// line: a warning is reported and [`MoveOutcome::Rejected`] is returned.
    /// Otherwise the move command is sent and the estimated position becomes
    /// `target`.
    pub fn move_to(&mut self, target: i64, direction: Direction) -> ValveResult<MoveOutcome> {
        self.ensure_connected()?;

        let port = match u32::try_from(target) {
            Ok(port) if (1..=self.number_of_ports).contains(&port) => port,
            _ => {
                self.notify(&ValveEvent::MoveRejected {
                    requested: target,
                    number_of_ports: self.number_of_ports,
                });
                return Ok(MoveOutcome::Rejected { requested: target });
            }
        };

        self.send(&Command::Move { port, direction })?;
        self.current_position = port;
        Ok(MoveOutcome::Moved(port))
    }

    /// Move to `target` along the shortest path.
    pub fn move_shortest(&mut self, target: i64) -> ValveResult<MoveOutcome> {
        self.move_to(target, Direction::Shortest)
    }

    /// Query the valve position (`?6`).
    ///
    /// The reply is not decoded yet, so this always returns
    /// [`POSITION_PLACEHOLDER`]. The raw answer, if any arrived in time, is
    /// available from [`last_reply`](Self::last_reply).
    pub fn get_position(&mut self) -> ValveResult<u32> {
        self.send(&Command::QueryPosition)?;
        Ok(POSITION_PLACEHOLDER)
    }

    /// Release the connection.
    ///
    /// The controller is disconnected afterwards even if the transport reports
    /// an error while closing. Closing twice returns [`ValveError::NotConnected`].
    pub fn close(&mut self) -> ValveResult<()> {
        let mut transport = self.transport.take().ok_or(ValveError::NotConnected)?;
        let result = transport.close();
        drop(transport);
        self.notify(&ValveEvent::Closed);
        result.map_err(ValveError::from)
    }

    /// Run `f` with this controller, then close it whatever `f` returned.
    ///
    /// A close failure is returned only when `f` succeeded.
    pub fn scoped<R, E, F>(mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<ValveError>,
    {
        let result = f(&mut self);
        if !self.is_connected() {
            return result;
        }
        match (result, self.close()) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(
                    port = %self.port_identifier,
                    error = %close_err,
                    "Failed to close valve after error"
                );
                Err(err)
            }
        }
    }
}

impl<T: ValveTransport> Drop for ValveController<T> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!(port = %self.port_identifier, error = %e, "Failed to close valve on drop");
            }
        }
    }
}

/// Open the valve described by `settings`, run `f`, and always close it.
///
/// ```no_run
/// use rvm_valve::{config::ValveSettings, controller::with_valve};
///
/// let position = with_valve(&ValveSettings::new("COM7"), |valve| {
///     valve.move_shortest(5)?;
///     Ok::<_, rvm_valve::error::ValveError>(valve.current_position())
/// })?;
/// # Ok::<(), rvm_valve::error::ValveError>(())
/// ```
pub fn with_valve<R, E, F>(settings: &ValveSettings, f: F) -> Result<R, E>
where
    F: FnOnce(&mut ValveController<SerialTransport>) -> Result<R, E>,
    E: From<ValveError>,
{
    let valve = ValveController::open_with_settings(settings)?;
    valve.scoped(f)
}
