//! Tests for configuration validation

use prometheus_looper::config::{
    HandlerThreadConfig, LoopSystemConfig, LooperConfig, CONFIG_ENV_VAR, DEFAULT_STACK_SIZE,
};

#[test]
fn test_looper_config_validation() {
    let valid = LooperConfig::new("io");
    assert!(valid.validate().is_ok());
    assert!(valid.quit_allowed);
    assert!(!valid.message_logging);
}

#[test]
fn test_looper_config_invalid_name() {
    let invalid = LooperConfig::new("   ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_handler_thread_config_invalid_stack() {
    let invalid = HandlerThreadConfig::new("tiny").with_stack_size(1024);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_handler_thread_config_must_allow_quit() {
    let invalid = HandlerThreadConfig::new("stuck")
        .with_looper(LooperConfig::new("stuck").with_quit_allowed(false));
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("quit"));
}

#[test]
fn test_system_config_validation() {
    let mut threads = std::collections::HashMap::new();
    threads.insert("io".to_string(), HandlerThreadConfig::new("io"));
    let cfg = LoopSystemConfig { threads };
    assert!(cfg.validate().is_ok());

    let empty = LoopSystemConfig::default();
    assert!(empty.validate().is_err());
}

#[test]
fn test_system_config_name_mismatch() {
    let mut threads = std::collections::HashMap::new();
    threads.insert("io".to_string(), HandlerThreadConfig::new("net"));
    let cfg = LoopSystemConfig { threads };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("io"));
}

#[test]
fn test_system_config_from_json() {
    let cfg = LoopSystemConfig::from_json_str(
        r#"{ "threads": { "bg": { "looper": {
            "name": "bg", "slow_dispatch_threshold_ms": 25
        } } } }"#,
    )
    .unwrap();
    let bg = &cfg.threads["bg"];
    assert_eq!(bg.stack_size, DEFAULT_STACK_SIZE);
    assert_eq!(bg.looper.slow_dispatch_threshold_ms, Some(25));

    assert!(LoopSystemConfig::from_json_str("{ not json").is_err());
    assert!(LoopSystemConfig::from_json_str(r#"{ "threads": {} }"#).is_err());
}

#[test]
fn test_system_config_from_env() {
    std::env::set_var(
        CONFIG_ENV_VAR,
        r#"{ "threads": { "env": { "looper": { "name": "env" } } } }"#,
    );
    let cfg = LoopSystemConfig::from_env().unwrap();
    assert!(cfg.threads.contains_key("env"));
    std::env::remove_var(CONFIG_ENV_VAR);
}
