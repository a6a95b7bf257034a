use serde::{Deserialize, Serialize};

use super::PathField;

/// One entry of a state's `Retry` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RetrierDefinition {
    #[serde(default)]
    pub error_equals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_strategy: Option<JitterStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JitterStrategy {
    #[serde(rename = "FULL")]
    Full,
    #[default]
    #[serde(rename = "NONE")]
    None,
}

/// One entry of a state's `Catch` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub struct CatcherDefinition {
    #[serde(default)]
    pub error_equals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "PathField::is_absent")]
    pub result_path: PathField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retrier_fields() {
        let retrier: RetrierDefinition = serde_json::from_value(json!({
            "ErrorEquals": ["States.Timeout"],
            "IntervalSeconds": 2,
            "MaxAttempts": 5,
            "JitterStrategy": "FULL"
        }))
        .unwrap();

        assert_eq!(retrier.error_equals, vec!["States.Timeout"]);
        assert_eq!(retrier.interval_seconds, Some(2.0));
        assert_eq!(retrier.max_attempts, Some(5));
        assert_eq!(retrier.backoff_rate, None);
        assert_eq!(retrier.jitter_strategy, Some(JitterStrategy::Full));
    }

    #[test]
    fn test_catcher_result_path() {
        let catcher: CatcherDefinition = serde_json::from_value(json!({
            "ErrorEquals": ["States.ALL"],
            "Next": "Recover",
            "ResultPath": "$.error"
        }))
        .unwrap();

        assert_eq!(catcher.next.as_deref(), Some("Recover"));
        assert_eq!(catcher.result_path.as_path(), Some("$.error"));
    }
}
