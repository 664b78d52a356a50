//! Tests for error types

use prometheus_looper::core::LoopError;

#[test]
fn test_already_scheduled_error() {
    let err = LoopError::AlreadyScheduled { when: 250 };
    assert_eq!(format!("{}", err), "message is already scheduled at 250ms");
    assert!(err.is_fatal());
}

#[test]
fn test_queue_closed_error() {
    let err = LoopError::QueueClosed("io".to_string());
    assert_eq!(format!("{}", err), "queue closed: io sent a message to a quitting looper");
    assert!(!err.is_fatal());
}

#[test]
fn test_dispatch_failed_error() {
    let err = LoopError::DispatchFailed {
        target: "render".to_string(),
        reason: "panicked: boom".to_string(),
    };
    assert_eq!(format!("{}", err), "dispatch to render failed: panicked: boom");
    assert!(!err.is_fatal());
}

#[test]
fn test_lifecycle_errors() {
    assert!(LoopError::AlreadyPrepared.is_fatal());
    assert!(LoopError::MainAlreadyInitialized.is_fatal());
    assert!(LoopError::WrongThread { owner: std::thread::current().id() }.is_fatal());
    assert!(!LoopError::AlreadyRunning.is_fatal());
    assert!(!LoopError::Terminated.is_fatal());
    assert_eq!(format!("{}", LoopError::Abandoned), "work abandoned before dispatch");
}

#[test]
fn test_invalid_config_error() {
    let err = LoopError::InvalidConfig("name must not be empty".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: name must not be empty");
}
