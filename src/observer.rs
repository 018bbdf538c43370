//! Observation of controller traffic.
//!
//! Each controller reports what it does to an injected [`ValveObserver`]. The
//! default, [`TracingObserver`], turns events into `tracing` records; the
//! library itself never installs a subscriber, so several controllers in one
//! process do not fight over logger setup.

use crate::protocol::Reply;
use std::sync::{Arc, Mutex};

/// Something a controller did or saw on the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValveEvent {
    /// Serial connection opened. The port is passed alongside every event.
    Connected,
    /// A frame is about to be written.
    CommandSent {
        /// Complete wire frame
        frame: Vec<u8>,
    },
    /// Bytes drained after a write (possibly empty).
    ReplyReceived {
        /// Raw reply
        reply: Reply,
    },
    /// A move target was outside the valve's ports; nothing was sent.
    MoveRejected {
        /// Requested port
        requested: i64,
        /// Port count of the valve
        number_of_ports: u32,
    },
    /// Serial connection released.
    Closed,
}

/// Sink for [`ValveEvent`]s.
pub trait ValveObserver: Send + Sync {
    /// Called for every event of the controller bound to `port`.
    fn on_event(&self, port: &str, event: &ValveEvent);
}

/// Logs events through `tracing`.
///
/// Writes, replies and connection changes are logged at INFO; rejected moves
/// at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ValveObserver for TracingObserver {
    fn on_event(&self, port: &str, event: &ValveEvent) {
        match event {
            ValveEvent::Connected => {
                tracing::info!(port, "Connected to RVM valve");
            }
            ValveEvent::CommandSent { frame } => {
                tracing::info!(port, frame = %frame.escape_ascii(), "Valve write");
            }
            ValveEvent::ReplyReceived { reply } => {
                tracing::info!(port, reply = %reply, bytes = reply.as_bytes().len(), "Valve replied");
            }
            ValveEvent::MoveRejected {
                requested,
                number_of_ports,
            } => {
                tracing::warn!(
                    port,
                    requested,
                    number_of_ports,
                    "Asked valve to move to position {} which does not exist",
                    requested
                );
            }
            ValveEvent::Closed => {
                tracing::info!(port, "Valve connection closed");
            }
        }
    }
}

/// Keeps every event in memory.
///
/// Clones share the same event list, so one copy can be handed to a
/// controller while another is inspected.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ValveEvent>>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<ValveEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Frames of all `CommandSent` events, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ValveEvent::CommandSent { frame } => Some(frame),
                _ => None,
            })
            .collect()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl ValveObserver for RecordingObserver {
    fn on_event(&self, _port: &str, event: &ValveEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards every event to several observers.
#[derive(Clone, Default)]
pub struct FanoutObserver {
    observers: Vec<Arc<dyn ValveObserver>>,
}

impl FanoutObserver {
    /// Create an observer with no targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target.
    pub fn with(mut self, observer: Arc<dyn ValveObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl ValveObserver for FanoutObserver {
    fn on_event(&self, port: &str, event: &ValveEvent) {
        for observer in &self.observers {
            observer.on_event(port, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn recording_observer_shares_events_between_clones() {
        let recorder = RecordingObserver::new();
        let handle = recorder.clone();

        recorder.on_event("COM7", &ValveEvent::Connected);
        recorder.on_event(
            "COM7",
            &ValveEvent::CommandSent {
                frame: b"/1ZR\r".to_vec(),
            },
        );

        assert_eq!(handle.events().len(), 2);
        assert_eq!(handle.frames(), vec![b"/1ZR\r".to_vec()]);

        handle.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn fanout_reaches_every_target() {
        let first = RecordingObserver::new();
        let second = RecordingObserver::new();
        let fanout = FanoutObserver::new()
            .with(Arc::new(first.clone()))
            .with(Arc::new(second.clone()));

        fanout.on_event("COM7", &ValveEvent::Closed);

        assert_eq!(first.events(), vec![ValveEvent::Closed]);
        assert_eq!(second.events(), vec![ValveEvent::Closed]);
    }

    #[test]
    #[traced_test]
    fn tracing_observer_logs_writes_at_info() {
        TracingObserver.on_event(
            "COM7",
            &ValveEvent::CommandSent {
                frame: b"/1b5R\r".to_vec(),
            },
        );
        assert!(logs_contain("INFO"));
        assert!(logs_contain("Valve write"));
        assert!(logs_contain("/1b5R\\r"));
    }

    #[test]
    #[traced_test]
    fn tracing_observer_warns_on_rejected_move() {
        TracingObserver.on_event(
            "COM7",
            &ValveEvent::MoveRejected {
                requested: 13,
                number_of_ports: 12,
            },
        );
        assert!(logs_contain("WARN"));
        assert!(logs_contain("position 13 which does not exist"));
    }
}
