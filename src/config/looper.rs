//! Looper and handler-thread configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Environment variable holding a JSON [`LoopSystemConfig`].
pub const CONFIG_ENV_VAR: &str = "LOOPER_CONFIG_JSON";

/// Default stack size for handler threads (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

fn default_true() -> bool {
    true
}

fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

/// Per-looper behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LooperConfig {
    /// Name used in logs and dumps.
    pub name: String,
    /// Whether a quit message may be accepted. Forced off for the main looper.
    #[serde(default = "default_true")]
    pub quit_allowed: bool,
    /// Emit dispatch begin/end lines through `tracing`.
    #[serde(default)]
    pub message_logging: bool,
    /// Dispatches slower than this are logged at `warn` and counted.
    #[serde(default)]
    pub slow_dispatch_threshold_ms: Option<u64>,
}

impl LooperConfig {
    /// Configuration with defaults for a looper called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quit_allowed: true,
            message_logging: false,
            slow_dispatch_threshold_ms: None,
        }
    }

    /// Set whether the looper may quit.
    #[must_use]
    pub fn with_quit_allowed(mut self, quit_allowed: bool) -> Self {
        self.quit_allowed = quit_allowed;
        self
    }

    /// Enable dispatch logging.
    #[must_use]
    pub fn with_message_logging(mut self, enabled: bool) -> Self {
        self.message_logging = enabled;
        self
    }

    /// Warn about dispatches slower than `threshold_ms`.
    #[must_use]
    pub fn with_slow_dispatch_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.slow_dispatch_threshold_ms = Some(threshold_ms);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.slow_dispatch_threshold_ms == Some(0) {
            return Err("slow_dispatch_threshold_ms must be greater than 0".into());
        }
        Ok(())
    }
}

impl Default for LooperConfig {
    fn default() -> Self {
        Self::new("looper")
    }
}

/// Handler-thread configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerThreadConfig {
    /// OS thread stack size in bytes.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    /// Looper run by the thread; its name doubles as the thread name.
    pub looper: LooperConfig,
}

impl HandlerThreadConfig {
    /// Configuration with defaults for a thread called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            looper: LooperConfig::new(name),
        }
    }

    /// Set the thread stack size.
    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Replace the looper configuration.
    #[must_use]
    pub fn with_looper(mut self, looper: LooperConfig) -> Self {
        self.looper = looper;
        self
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.looper.name
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.stack_size < 64 * 1024 {
            return Err("stack_size must be at least 64 KiB".into());
        }
        if !self.looper.quit_allowed {
            return Err("handler thread loopers must allow quitting".into());
        }
        self.looper.validate()
    }
}

/// Root configuration: named handler threads to start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopSystemConfig {
    /// Map of thread name to configuration.
    pub threads: HashMap<String, HandlerThreadConfig>,
}

impl LoopSystemConfig {
    /// Validate every thread and ensure at least one exists.
    ///
    /// # Errors
    ///
    /// Returns a description naming the offending thread.
    pub fn validate(&self) -> Result<(), String> {
        if self.threads.is_empty() {
            return Err("at least one thread must be defined".into());
        }
        for (name, thread) in &self.threads {
            thread
                .validate()
                .map_err(|e| format!("thread `{name}` invalid: {e}"))?;
            if thread.name() != name.as_str() {
                return Err(format!(
                    "thread `{name}` invalid: looper name `{}` does not match",
                    thread.name()
                ));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then parse [`CONFIG_ENV_VAR`].
    ///
    /// # Errors
    ///
    /// Returns a message if the variable is missing, unparsable or invalid.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let raw = std::env::var(CONFIG_ENV_VAR).map_err(|e| format!("{CONFIG_ENV_VAR}: {e}"))?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_methods() {
        let cfg = HandlerThreadConfig::new("io")
            .with_stack_size(256 * 1024)
            .with_looper(
                LooperConfig::new("io")
                    .with_message_logging(true)
                    .with_slow_dispatch_threshold_ms(50),
            );
        assert_eq!(cfg.name(), "io");
        assert_eq!(cfg.stack_size, 256 * 1024);
        assert!(cfg.looper.message_logging);
        assert_eq!(cfg.looper.slow_dispatch_threshold_ms, Some(50));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults() {
        let cfg: HandlerThreadConfig =
            serde_json::from_str(r#"{ "looper": { "name": "bg" } }"#).unwrap();
        assert_eq!(cfg.stack_size, DEFAULT_STACK_SIZE);
        assert!(cfg.looper.quit_allowed);
        assert!(!cfg.looper.message_logging);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let cfg = LooperConfig::new("x").with_slow_dispatch_threshold_ms(0);
        assert!(cfg.validate().is_err());
    }
}
