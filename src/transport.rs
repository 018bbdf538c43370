//! Byte transport underneath the valve controller.
//!
//! [`ValveTransport`] is the seam between the command layer and the serial
//! line. The real implementation, [`SerialTransport`], wraps the `serialport`
//! crate; [`MockTransport`](crate::mock::MockTransport) stands in for it in
//! tests and dry runs.

use crate::error::{ValveError, ValveResult};
use std::io;
use std::time::Duration;

#[cfg(feature = "serial")]
use serialport::SerialPort;
#[cfg(feature = "serial")]
use std::io::{Read, Write};

/// Blocking byte transport to a single valve.
pub trait ValveTransport: Send {
    /// Name of the underlying device, if known.
    fn name(&self) -> Option<String>;

    /// Write a complete frame.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read whatever is waiting in the input buffer right now.
    ///
    /// Never waits for a terminator or a fixed length; returns an empty buffer
    /// when the device has not answered yet.
    fn read_available(&mut self) -> io::Result<Vec<u8>>;

    /// Release the underlying device.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: ValveTransport + ?Sized> ValveTransport for Box<T> {
    fn name(&self) -> Option<String> {
        (**self).name()
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write_frame(frame)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_available()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

// =============================================================================
// SerialTransport
// =============================================================================

/// Serial line to the valve.
///
/// The port is closed when the transport is dropped; `close` only flushes.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

#[cfg(feature = "serial")]
impl SerialTransport {
    /// Wrap an already opened port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

#[cfg(feature = "serial")]
impl ValveTransport for SerialTransport {
    fn name(&self) -> Option<String> {
        self.port.name()
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; pending];
        let n = self.port.read(&mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }

    fn close(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Open the valve's serial port: 8N1, no flow control.
#[cfg(feature = "serial")]
pub fn open_serial(
    port_identifier: &str,
    baud_rate: u32,
    timeout: Duration,
) -> ValveResult<SerialTransport> {
    let port = serialport::new(port_identifier, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| ValveError::Connection {
            port: port_identifier.to_string(),
            source: e.into(),
        })?;

    tracing::debug!(
        port = port_identifier,
        baud_rate,
        timeout_ms = timeout.as_millis() as u64,
        "Opened valve serial port"
    );
    Ok(SerialTransport::new(port))
}

/// Placeholder when serial support is compiled out. Cannot be constructed.
#[cfg(not(feature = "serial"))]
pub enum SerialTransport {}

#[cfg(not(feature = "serial"))]
impl ValveTransport for SerialTransport {
    fn name(&self) -> Option<String> {
        match *self {}
    }

    fn write_frame(&mut self, _frame: &[u8]) -> io::Result<()> {
        match *self {}
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        match *self {}
    }
}

/// Serial support is compiled out; always fails.
#[cfg(not(feature = "serial"))]
pub fn open_serial(
    _port_identifier: &str,
    _baud_rate: u32,
    _timeout: Duration,
) -> ValveResult<SerialTransport> {
    Err(ValveError::SerialFeatureDisabled)
}

#[cfg(all(test, feature = "serial"))]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_is_connection_error() {
        let result = open_serial(
            "/dev/rvm-valve-does-not-exist",
            crate::protocol::DEFAULT_BAUD_RATE,
            Duration::from_millis(100),
        );
        match result {
            Err(err @ ValveError::Connection { .. }) => {
                assert!(err.is_connection_error());
                let source = std::error::Error::source(&err).unwrap();
                assert!(source.downcast_ref::<io::Error>().is_some());
                assert!(err.to_string().contains("/dev/rvm-valve-does-not-exist"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("opening a nonexistent port should fail"),
        }
    }
}
