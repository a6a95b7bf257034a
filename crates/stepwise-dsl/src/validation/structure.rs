use crate::definition::{StateDefinition, StateMachineDefinition};
use crate::validation::{collect_graphs, error_codes, states_of, ValidationError, Validator};

/// Validates the shape of every graph:
/// - `StartAt` and `States` are present
/// - each state has the fields its type requires
/// - non-terminal states carry exactly one of `Next` or `End: true`
pub struct StructureValidator;

impl StructureValidator {
    /// Create a new structure validator
    pub fn new() -> Self {
        StructureValidator
    }

    fn validate_graph_fields(&self, label: &str, graph: &StateMachineDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if graph.start_at.is_none() {
            errors.push(ValidationError::new(
                error_codes::MISSING_REQUIRED_FIELD,
                format!("{} does not have required field \"StartAt\"", label),
                label,
            ));
        }
        if graph.states.is_none() {
            errors.push(ValidationError::new(
                error_codes::MISSING_REQUIRED_FIELD,
                format!("{} does not have required field \"States\"", label),
                label,
            ));
        }

        errors
    }

    /// The field a state's type cannot do without, if it is missing
    fn missing_type_field(&self, state: &StateDefinition) -> Option<&'static str> {
        match state {
            StateDefinition::Task(task) if task.resource.is_none() => Some("Resource"),
            StateDefinition::Choice(choice) if choice.choices.is_none() => Some("Choices"),
            StateDefinition::Parallel(parallel) if parallel.branches.is_none() => Some("Branches"),
            StateDefinition::Map(map) if map.item_processor.is_none() => Some("ItemProcessor"),
            _ => None,
        }
    }

    fn validate_state(&self, name: &str, state: &StateDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let path = format!("States.{}", name);

        if let Some(field) = self.missing_type_field(state) {
            errors.push(ValidationError::new(
                error_codes::MISSING_REQUIRED_FIELD,
                format!("Missing \"{}\" field in state [{}]", field, name),
                path.clone(),
            ));
        }

        match state {
            StateDefinition::Choice(choice) if choice.choices.as_ref().is_some_and(|c| c.is_empty()) => {
                errors.push(ValidationError::new(
                    error_codes::INVALID_VALUE,
                    format!("States.{} field \"Choices\" must not be empty", name),
                    path.clone(),
                ));
            }
            StateDefinition::Parallel(parallel) if parallel.branches.as_ref().is_some_and(|b| b.is_empty()) => {
                errors.push(ValidationError::new(
                    error_codes::INVALID_VALUE,
                    format!("States.{} field \"Branches\" must not be empty", name),
                    path.clone(),
                ));
            }
            _ => {}
        }

        if state.requires_transition() {
            match (state.next(), state.is_end()) {
                (None, false) => errors.push(ValidationError::new(
                    error_codes::INVALID_TRANSITION,
                    format!("States.{} does not have required field \"Next\"", name),
                    path,
                )),
                (Some(_), true) => errors.push(ValidationError::new(
                    error_codes::INVALID_TRANSITION,
                    format!("States.{} cannot have both \"Next\" and \"End\"", name),
                    path,
                )),
                _ => {}
            }
        }

        errors
    }
}

impl Default for StructureValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator for StructureValidator {
    fn validate(&self, definition: &StateMachineDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for graph in collect_graphs(definition) {
            errors.extend(self.validate_graph_fields(&graph.label, graph.graph));
            for (name, state) in states_of(graph.graph) {
                errors.extend(self.validate_state(name, state));
            }
        }

        errors
    }
}
