//! Engine configuration
//!
//! Settings that apply to every workflow run by the engine, loaded from the
//! environment or from a YAML document.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::error::CoreError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on state advances per workflow; exceeding it aborts the workflow.
    /// `None` leaves cyclic workflows unbounded.
    #[serde(default)]
    pub max_steps: Option<u64>,

    /// Keep an entry per completed state in the context history
    #[serde(default = "default_record_history")]
    pub record_history: bool,

    /// Include state inputs and outputs in debug logs
    #[serde(default)]
    pub log_data: bool,
}

fn default_record_history() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            record_history: default_record_history(),
            log_data: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `STEPWISE_*` environment variables, starting from defaults.
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        if config.max_steps == Some(0) {
            return Err(CoreError::ConfigurationError(
                "max_steps must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(max_steps) = lookup("STEPWISE_MAX_STEPS") {
            match max_steps.parse::<u64>() {
                Ok(0) | Err(_) => warn!("Invalid STEPWISE_MAX_STEPS value: {}", max_steps),
                Ok(value) => config.max_steps = Some(value),
            }
        }

        if let Some(record_history) = lookup("STEPWISE_RECORD_HISTORY") {
            match parse_bool(&record_history) {
                Some(value) => config.record_history = value,
                None => warn!("Invalid STEPWISE_RECORD_HISTORY value: {}", record_history),
            }
        }

        if let Some(log_data) = lookup("STEPWISE_LOG_DATA") {
            match parse_bool(&log_data) {
                Some(value) => config.log_data = value,
                None => warn!("Invalid STEPWISE_LOG_DATA value: {}", log_data),
            }
        }

        config
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
