mod common;

use common::{controller, monitor, status, transport, BUSY, IDLE};
use ruidakit_communication::ReadinessPolicy;
use ruidakit_core::{Error, ReadinessError};
use std::time::Duration;

fn policy(require_busy_transition: bool) -> ReadinessPolicy {
    ReadinessPolicy {
        require_busy_transition,
        stable_polls: 3,
        poll_delay: Duration::from_millis(100),
        ..ReadinessPolicy::default()
    }
}

#[test]
fn test_busy_then_idle_is_ready_on_fifth_poll() {
    let ctrl = controller();
    ctrl.lock().unwrap().statuses = vec![
        status(BUSY, 1.0, 1.0),
        status(BUSY, 2.0, 1.5),
        status(IDLE, 7.0, 3.0),
        status(IDLE, 7.0, 3.0),
        status(IDLE, 7.0, 3.0),
    ]
    .into();
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let state = mon.wait_until_ready(&mut udp, &policy(true)).unwrap();
    assert_eq!(state.status_bits, IDLE);
    assert_eq!(state.x, Some(7.0));
    assert_eq!(state.y, Some(3.0));
    assert_eq!(state.z, None);
    assert_eq!(ctrl.lock().unwrap().polls, 5);
    assert_eq!(mon.sleeper().sleeps, 4);
    assert_eq!(mon.last(), Some(state));
}

#[test]
fn test_idle_controller_is_ready_after_stable_polls() {
    let ctrl = controller();
    ctrl.lock().unwrap().current = status(IDLE, 4.0, 4.0);
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    mon.wait_until_ready(&mut udp, &policy(false)).unwrap();
    assert_eq!(ctrl.lock().unwrap().polls, 3);
}

#[test]
fn test_position_change_restarts_stable_run() {
    let ctrl = controller();
    ctrl.lock().unwrap().statuses = vec![
        status(IDLE, 0.0, 0.0),
        status(IDLE, 0.0, 0.0),
        status(IDLE, 5.0, 0.0),
        status(IDLE, 5.0, 0.0),
        status(IDLE, 5.0, 0.0),
    ]
    .into();
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let state = mon.wait_until_ready(&mut udp, &policy(false)).unwrap();
    assert_eq!(state.x, Some(5.0));
    assert_eq!(ctrl.lock().unwrap().polls, 5);
}

#[test]
fn test_min_stable_extends_the_wait() {
    let ctrl = controller();
    ctrl.lock().unwrap().current = status(IDLE, 0.0, 0.0);
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let policy = ReadinessPolicy {
        min_stable: Duration::from_millis(350),
        ..policy(false)
    };
    mon.wait_until_ready(&mut udp, &policy).unwrap();
    // Polls land at 0, 100, 200, 300 and 400 ms
    assert_eq!(ctrl.lock().unwrap().polls, 5);
    assert_eq!(mon.sleeper().slept, Duration::from_millis(400));
}

#[test]
fn test_never_idle_is_not_ready() {
    let ctrl = controller();
    ctrl.lock().unwrap().current = status(BUSY, 0.0, 0.0);
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let policy = ReadinessPolicy {
        max_attempts: 6,
        ..policy(true)
    };
    let err = mon.wait_until_ready(&mut udp, &policy).unwrap_err();
    assert!(err.is_readiness_error());
    match err {
        Error::Readiness(ReadinessError::NotReady { attempts, last }) => {
            assert_eq!(attempts, 6);
            assert_eq!(last.map(|s| s.status_bits), Some(BUSY));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctrl.lock().unwrap().polls, 6);
}

#[test]
fn test_failed_poll_returns_previous_snapshot() {
    let ctrl = controller();
    {
        let mut c = ctrl.lock().unwrap();
        c.current = status(IDLE, 9.0, 8.0);
        c.answer_polls = Some(1);
    }
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let state = mon.wait_until_ready(&mut udp, &policy(false)).unwrap();
    assert_eq!(state.x, Some(9.0));
    assert_eq!(state.y, Some(8.0));
    assert_eq!(ctrl.lock().unwrap().polls, 1);
}

#[test]
fn test_failed_poll_keeps_waiting_for_transition() {
    let ctrl = controller();
    {
        let mut c = ctrl.lock().unwrap();
        c.current = status(IDLE, 0.0, 0.0);
        c.answer_polls = Some(1);
    }
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let policy = ReadinessPolicy {
        max_attempts: 4,
        ..policy(true)
    };
    let err = mon.wait_until_ready(&mut udp, &policy).unwrap_err();
    assert!(err.is_readiness_error());
}

#[test]
fn test_poll_reads_z_when_requested() {
    let ctrl = controller();
    ctrl.lock().unwrap().current = common::Status {
        bits: IDLE,
        x: 1.0,
        y: 2.0,
        z: -4.5,
    };
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let policy = ReadinessPolicy {
        read_z: true,
        ..ReadinessPolicy::default()
    };
    let state = mon.poll(&mut udp, &policy).unwrap().unwrap();
    assert_eq!(state.z, Some(-4.5));

    let policy = ReadinessPolicy {
        read_positions: false,
        ..ReadinessPolicy::default()
    };
    let state = mon.poll(&mut udp, &policy).unwrap().unwrap();
    assert_eq!((state.x, state.y, state.z), (None, None, None));
}

#[test]
fn test_failed_poll_restarts_the_stable_run() {
    let ctrl = controller();
    {
        let mut c = ctrl.lock().unwrap();
        c.statuses = vec![status(BUSY, 0.0, 0.0), status(IDLE, 0.0, 0.0)].into();
        c.silent_polls = vec![2];
    }
    let mut udp = transport(&ctrl);
    let mut mon = monitor();

    let policy = ReadinessPolicy {
        min_stable: Duration::from_millis(250),
        ..policy(true)
    };
    let state = mon.wait_until_ready(&mut udp, &policy).unwrap();
    assert!(!state.is_busy());
    // Busy at 0 ms, no answer at 100 ms, idle from 200 ms until 250 ms have passed
    assert_eq!(mon.sleeper().slept, Duration::from_millis(500));
    assert_eq!(ctrl.lock().unwrap().polls, 5);
}
