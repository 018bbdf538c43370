//! End-to-end controller behavior over the mock transport.
//!
//! Run with: cargo test --test controller_scenarios

use rvm_valve::controller::{MoveOutcome, ValveController, REJECTED_MOVE_CODE};
use rvm_valve::mock::{MockHandle, MockTransport};
use rvm_valve::observer::{RecordingObserver, ValveEvent};
use rvm_valve::protocol::{Command, Direction};
use rvm_valve::ValveError;
use std::sync::Arc;

fn open_mock(number_of_ports: u32) -> (ValveController<MockTransport>, MockHandle) {
    let transport = MockTransport::new();
    let handle = transport.handle();
    let valve = ValveController::with_transport(transport, "mock", number_of_ports)
        .expect("mock valve should open");
    (valve, handle)
}

/// The bundled demo session against a 12-port valve.
#[test]
fn example_session() {
    let (mut valve, handle) = open_mock(12);

    // Construction homes the valve.
    assert_eq!(handle.frames(), vec![b"/1ZR\r".to_vec()]);
    assert_eq!(valve.current_position(), 1);

    let outcome = valve.move_to(5, Direction::Shortest).unwrap();
    assert_eq!(outcome.code(), 5);
    assert_eq!(handle.last_frame().unwrap(), b"/1b5R\r");

    let outcome = valve.move_to(4, Direction::Incremental).unwrap();
    assert_eq!(outcome.code(), 4);
    assert_eq!(handle.last_frame().unwrap(), b"/1i4R\r");

    let frames_before = handle.frames().len();
    let outcome = valve.move_to(13, Direction::Shortest).unwrap();
    assert_eq!(outcome.code(), REJECTED_MOVE_CODE);
    assert_eq!(handle.frames().len(), frames_before);
    assert_eq!(valve.current_position(), 4);

    valve.close().unwrap();
    assert_eq!(handle.close_calls(), 1);
}

#[test]
fn every_valid_port_and_direction_moves() {
    for number_of_ports in [1u32, 6, 8, 10, 12, 24] {
        let (mut valve, handle) = open_mock(number_of_ports);
        for direction in Direction::ALL {
            for target in 1..=number_of_ports {
                let outcome = valve.move_to(i64::from(target), direction).unwrap();
                assert_eq!(outcome, MoveOutcome::Moved(target));
                assert_eq!(valve.current_position(), target);

                let expected = format!("/1{}{}R\r", direction.mnemonic(), target);
                assert_eq!(handle.last_frame().unwrap(), expected.as_bytes());
            }
        }
    }
}

#[test]
fn every_invalid_port_is_rejected() {
    let (mut valve, handle) = open_mock(12);
    valve.move_to(7, Direction::Decremental).unwrap();
    let frames_before = handle.frames();

    let invalid = (-20i64..1).chain(13..40);
    for target in invalid {
        for direction in Direction::ALL {
            let outcome = valve.move_to(target, direction).unwrap();
            assert_eq!(outcome, MoveOutcome::Rejected { requested: target });
            assert_eq!(outcome.code(), -1);
            assert_eq!(valve.current_position(), 7);
        }
    }
    assert_eq!(handle.frames(), frames_before);
}

#[test]
fn execute_frames_bodies_byte_for_byte() {
    let (mut valve, handle) = open_mock(12);
    for body in ["ZR", "T", "?6", "b5R", "i12R", "o1R", "?", "Q", "b10R"] {
        valve.execute(body).unwrap();
        let mut expected = b"/1".to_vec();
        expected.extend_from_slice(body.as_bytes());
        expected.push(b'\r');
        assert_eq!(handle.last_frame().unwrap(), expected);
    }
}

#[test]
fn body_with_embedded_terminator_is_refused() {
    let (mut valve, handle) = open_mock(12);
    let frames_before = handle.frames().len();

    let result = valve.execute("ZR\rT");

    assert!(matches!(result, Err(ValveError::InvalidCommand(_))));
    assert_eq!(handle.frames().len(), frames_before);
    assert!(valve.is_connected());
    valve.execute("T").unwrap();
    assert_eq!(handle.last_frame().unwrap(), b"/1T\r");
}

#[test]
fn commands_and_execute_agree() {
    let (mut valve, handle) = open_mock(12);
    let commands = [
        Command::Home,
        Command::Abort,
        Command::QueryPosition,
        Command::Move {
            port: 3,
            direction: Direction::Decremental,
        },
    ];
    for command in &commands {
        valve.send(command).unwrap();
        assert_eq!(handle.last_frame().unwrap(), command.frame().unwrap());
    }
}

#[test]
fn home_resets_the_estimate_without_confirmation() {
    let (mut valve, handle) = open_mock(12);
    valve.move_to(9, Direction::Shortest).unwrap();

    // The device stays silent; the estimate changes anyway.
    valve.home().unwrap();
    assert_eq!(valve.current_position(), 1);
    assert!(valve.last_reply().is_empty());
    assert_eq!(handle.last_frame().unwrap(), b"/1ZR\r");
}

#[test]
fn replies_are_kept_raw() {
    let transport = MockTransport::new();
    let handle = transport.handle();
    let mut valve = ValveController::with_transport(transport, "mock", 12).unwrap();

    handle.queue_reply(b"/0@\x03\r\n".to_vec());
    valve.move_to(2, Direction::Shortest).unwrap();
    assert_eq!(valve.last_reply().as_bytes(), b"/0@\x03\r\n");

    // The next drain only sees what arrived since.
    valve.abort().unwrap();
    assert!(valve.last_reply().is_empty());
}

#[test]
fn transport_failures_propagate_without_retry() {
    let (mut valve, handle) = open_mock(12);
    let frames_before = handle.frames().len();

    handle.fail_next_write();
    let err = valve.move_to(5, Direction::Shortest).unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(handle.frames().len(), frames_before);
    // A failed send does not update the estimate.
    assert_eq!(valve.current_position(), 1);

    handle.fail_next_read();
    let err = valve.get_position().unwrap_err();
    assert!(matches!(err, ValveError::Io(_)));

    // The connection stays open; the caller decides what to do.
    assert!(valve.is_connected());
    valve.move_to(5, Direction::Shortest).unwrap();
}

#[test]
fn closed_controller_refuses_everything() {
    let (mut valve, handle) = open_mock(12);
    valve.close().unwrap();
    let frames_before = handle.frames().len();

    assert!(matches!(valve.home(), Err(ValveError::NotConnected)));
    assert!(matches!(
        valve.move_to(3, Direction::Incremental),
        Err(ValveError::NotConnected)
    ));
    assert!(matches!(valve.close(), Err(ValveError::NotConnected)));
    assert_eq!(handle.frames().len(), frames_before);
}

#[test]
fn scoped_session_releases_on_error() {
    let (valve, handle) = open_mock(12);
    let result: Result<(), ValveError> = valve.scoped(|v| {
        v.move_to(3, Direction::Shortest)?;
        v.execute("b\u{263a}R")
    });
    assert!(matches!(result, Err(ValveError::InvalidCommand(_))));
    assert_eq!(handle.close_calls(), 1);
}

#[test]
fn independent_controllers_report_to_their_own_observers() {
    let first_log = RecordingObserver::new();
    let second_log = RecordingObserver::new();

    let mut first = ValveController::<MockTransport>::builder("/dev/ttyUSB0")
        .observer(Arc::new(first_log.clone()))
        .connect(MockTransport::new())
        .unwrap();
    let mut second = ValveController::<MockTransport>::builder("/dev/ttyUSB1")
        .number_of_ports(6)
        .observer(Arc::new(second_log.clone()))
        .connect(MockTransport::new())
        .unwrap();

    first.move_to(10, Direction::Shortest).unwrap();
    second.move_to(10, Direction::Shortest).unwrap();

    assert_eq!(
        first_log.frames(),
        vec![b"/1ZR\r".to_vec(), b"/1b10R\r".to_vec()]
    );
    assert_eq!(second_log.frames(), vec![b"/1ZR\r".to_vec()]);
    assert!(second_log.events().contains(&ValveEvent::MoveRejected {
        requested: 10,
        number_of_ports: 6
    }));
}
