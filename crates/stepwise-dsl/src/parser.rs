use serde_json::Value;

use crate::definition::StateMachineDefinition;
use crate::error::DslError;

/// Parse JSON or YAML text into a StateMachineDefinition.
///
/// Text whose first non-blank character is `{` is read as JSON, anything else
/// as YAML. This does not validate the document beyond its shape; that's
/// handled separately by the validation module.
pub fn parse_definition(text: &str) -> Result<StateMachineDefinition, DslError> {
    let value: Value = if text.trim_start().starts_with('{') {
        serde_json::from_str(text)?
    } else {
        serde_yaml::from_str(text)?
    };

    definition_from_value(value)
}

/// Build a StateMachineDefinition from an already-parsed JSON value
pub fn definition_from_value(value: Value) -> Result<StateMachineDefinition, DslError> {
    if !value.is_object() {
        return Err(DslError::InvalidDocument(
            "StateMachine must be an object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|err| DslError::InvalidDocument(err.to_string()))
}
