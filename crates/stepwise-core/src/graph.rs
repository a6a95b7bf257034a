use std::collections::HashMap;

use stepwise_dsl::StateMachineDefinition;

use crate::error::CoreError;
use crate::states::State;

/// Compiled states of one graph, keyed by name. Nested graphs of Map and
/// Parallel states are separate `StateGraph`s.
#[derive(Debug, Clone)]
pub struct StateGraph {
    start_at: String,
    states: HashMap<String, State>,
    order: Vec<String>,
}

impl StateGraph {
    /// Compile a validated definition
    pub fn compile(definition: &StateMachineDefinition) -> Result<Self, CoreError> {
        let start_at = definition
            .start_at
            .clone()
            .ok_or_else(|| CoreError::WorkflowError("StateMachine does not have required field \"StartAt\"".to_string()))?;
        let definitions = definition
            .states
            .as_ref()
            .ok_or_else(|| CoreError::WorkflowError("StateMachine does not have required field \"States\"".to_string()))?;

        let mut states = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());
        for (name, state) in definitions.iter() {
            let compiled = State::compile(state).map_err(|message| CoreError::InvalidExpression {
                state: name.to_string(),
                message,
            })?;
            states.insert(name.to_string(), compiled);
            order.push(name.to_string());
        }

        if !states.contains_key(&start_at) {
            return Err(CoreError::WorkflowError(format!(
                "StateMachine field \"StartAt\" value \"{}\" is not found in \"States\"",
                start_at
            )));
        }

        Ok(StateGraph { start_at, states, order })
    }

    pub fn start_at(&self) -> &str {
        &self.start_at
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// State names in declaration order
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
