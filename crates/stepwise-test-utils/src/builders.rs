//! Builders for workflows written inline as JSON.

use serde_json::{json, Value};
use stepwise_core::{CoreError, Workflow};
use stepwise_dsl::{definition_from_value, StateMachineDefinition};

/// Wrap a `States` object into a state machine starting at its first state
pub fn machine(states: Value) -> Value {
    let start_at = states
        .as_object()
        .and_then(|map| map.keys().next().cloned())
        .unwrap_or_default();
    json!({"StartAt": start_at, "States": states})
}

/// Parse a `States` object, panicking on malformed documents
pub fn make_definition(states: Value) -> StateMachineDefinition {
    definition_from_value(machine(states)).expect("test state machine should parse")
}

/// Build a workflow from a `States` object
pub fn try_make_workflow(states: Value, input: Value) -> Result<Workflow, CoreError> {
    let definition = definition_from_value(machine(states))?;
    Workflow::new(&definition, input)
}

/// Build a workflow from a `States` object, panicking on invalid documents
pub fn make_workflow(states: Value, input: Value) -> Workflow {
    try_make_workflow(states, input).expect("test state machine should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_starts_at_first_state() {
        let document = machine(json!({
            "Second": {"Type": "Succeed"},
            "First": {"Type": "Succeed"}
        }));
        assert_eq!(document["StartAt"], json!("Second"));
    }

    #[test]
    fn test_invalid_states_are_reported() {
        let err = try_make_workflow(json!({"A": {"Type": "Task", "End": true}}), json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Missing \"Resource\" field in state [A]");
    }
}
