//! In-memory transport for testing the controller without a valve.
//!
//! [`MockTransport`] provides:
//! - A log of every frame written
//! - Scripted replies, either queued per read or echoed after every write
//! - One-shot failure injection for writes, reads and close
//!
//! The transport is moved into the controller, so inspection goes through a
//! [`MockHandle`] obtained beforehand.
//!
//! # Example
//!
//! ```
//! use rvm_valve::controller::ValveController;
//! use rvm_valve::mock::MockTransport;
//!
//! let transport = MockTransport::new();
//! let handle = transport.handle();
//! let valve = ValveController::with_transport(transport, "mock", 12).unwrap();
//! assert_eq!(handle.frames(), vec![b"/1ZR\r".to_vec()]);
//! assert_eq!(valve.current_position(), 1);
//! ```

use crate::transport::ValveTransport;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    frames: Vec<Vec<u8>>,
    pending: VecDeque<u8>,
    queued_replies: VecDeque<Vec<u8>>,
    auto_reply: Option<Vec<u8>>,
    fail_next_write: bool,
    fail_next_read: bool,
    fail_next_close: bool,
    read_calls: usize,
    close_calls: usize,
}

/// Scripted transport that records traffic.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    name: Option<String>,
    state: Arc<Mutex<MockState>>,
}

/// Inspection and control handle for a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    // Poisoning only means a test thread panicked; the log is still valid.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a silent transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `name` as the device name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Make `reply` available after every write.
    pub fn with_auto_reply(self, reply: impl Into<Vec<u8>>) -> Self {
        lock(&self.state).auto_reply = Some(reply.into());
        self
    }

    /// Handle for inspecting this transport after it has been moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockHandle {
    /// All frames written so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.state).frames.clone()
    }

    /// Most recent frame, if any.
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        lock(&self.state).frames.last().cloned()
    }

    /// Forget recorded frames.
    pub fn clear_frames(&self) {
        lock(&self.state).frames.clear();
    }

    /// Queue a reply that becomes readable after the next write.
    pub fn queue_reply(&self, reply: impl Into<Vec<u8>>) {
        lock(&self.state).queued_replies.push_back(reply.into());
    }

    /// Put bytes on the line immediately, as if the device had sent them unprompted.
    pub fn push_input(&self, bytes: &[u8]) {
        lock(&self.state).pending.extend(bytes.iter().copied());
    }

    /// Fail the next write with `BrokenPipe`.
    pub fn fail_next_write(&self) {
        lock(&self.state).fail_next_write = true;
    }

    /// Fail the next read with `TimedOut`.
    pub fn fail_next_read(&self) {
        lock(&self.state).fail_next_read = true;
    }

    /// Fail the next close with `Other`.
    pub fn fail_next_close(&self) {
        lock(&self.state).fail_next_close = true;
    }

    /// Number of drain reads performed.
    pub fn read_calls(&self) -> usize {
        lock(&self.state).read_calls
    }

    /// Number of times the transport was closed.
    pub fn close_calls(&self) -> usize {
        lock(&self.state).close_calls
    }
}

impl ValveTransport for MockTransport {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_write) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.frames.push(frame.to_vec());
        if let Some(reply) = state.queued_replies.pop_front() {
            state.pending.extend(reply);
        } else if let Some(reply) = state.auto_reply.clone() {
            state.pending.extend(reply);
        }
        Ok(())
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut state = lock(&self.state);
        state.read_calls += 1;
        if std::mem::take(&mut state.fail_next_read) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read failure"));
        }
        Ok(state.pending.drain(..).collect())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.close_calls += 1;
        if std::mem::take(&mut state.fail_next_close) {
            return Err(io::Error::new(io::ErrorKind::Other, "mock close failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_frames_and_drains_queued_replies() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();
        handle.queue_reply(b"/0`\r\n".to_vec());

        transport.write_frame(b"/1ZR\r").unwrap();
        assert_eq!(transport.read_available().unwrap(), b"/0`\r\n");
        assert!(transport.read_available().unwrap().is_empty());

        assert_eq!(handle.frames(), vec![b"/1ZR\r".to_vec()]);
        assert_eq!(handle.read_calls(), 2);
    }

    #[test]
    fn auto_reply_follows_every_write() {
        let mut transport = MockTransport::new().with_auto_reply(b"ok".to_vec());
        for _ in 0..3 {
            transport.write_frame(b"/1T\r").unwrap();
            assert_eq!(transport.read_available().unwrap(), b"ok");
        }
    }

    #[test]
    fn failures_are_one_shot() {
        let mut transport = MockTransport::new();
        let handle = transport.handle();

        handle.fail_next_write();
        assert!(transport.write_frame(b"/1ZR\r").is_err());
        assert!(transport.write_frame(b"/1ZR\r").is_ok());
        // Failed writes are not recorded.
        assert_eq!(handle.frames().len(), 1);

        handle.fail_next_read();
        assert_eq!(
            transport.read_available().unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert!(transport.read_available().is_ok());

        handle.fail_next_close();
        assert!(transport.close().is_err());
        assert!(transport.close().is_ok());
        assert_eq!(handle.close_calls(), 2);
    }

    #[test]
    fn unprompted_input_is_readable() {
        let mut transport = MockTransport::new().with_name("loopback");
        transport.handle().push_input(b"noise");
        assert_eq!(transport.read_available().unwrap(), b"noise");
        assert_eq!(transport.name().as_deref(), Some("loopback"));
    }
}
