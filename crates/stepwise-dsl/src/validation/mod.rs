use std::fmt;
use std::error::Error;
use crate::definition::{StateDefinition, StateMachineDefinition};
use crate::error::DslError;

mod fields;
mod reference;
mod structure;

/// Represents a validation error found in a state-machine document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Error code (should be a constant identifier)
    pub code: &'static str,

    /// Human-readable error message
    pub message: String,

    /// Optional location of the error (e.g., "States.Validate-All.ItemProcessor")
    pub path: Option<String>,
}

impl ValidationError {
    pub fn new(code: &'static str, message: impl Into<String>, path: impl Into<String>) -> Self {
        ValidationError {
            code,
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Messages already name the state or graph they refer to
        write!(f, "{}", self.message)
    }
}

impl Error for ValidationError {}

/// Validation error codes
pub mod error_codes {
    /// A `Next`, `Default` or `StartAt` target that is not a state of the same graph
    pub const INVALID_REFERENCE: &str = "ERR_DSL_VALIDATION_INVALID_REFERENCE";

    /// Missing required field
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_DSL_VALIDATION_MISSING_REQUIRED_FIELD";

    /// Both `Next` and `End`, or neither where one is needed
    pub const INVALID_TRANSITION: &str = "ERR_DSL_VALIDATION_INVALID_TRANSITION";

    /// Malformed path expression
    pub const INVALID_PATH: &str = "ERR_DSL_VALIDATION_INVALID_PATH";

    /// Malformed choice rule
    pub const INVALID_CHOICE_RULE: &str = "ERR_DSL_VALIDATION_INVALID_CHOICE_RULE";

    /// Malformed Retry or Catch entry
    pub const INVALID_ERROR_HANDLER: &str = "ERR_DSL_VALIDATION_INVALID_ERROR_HANDLER";

    /// Invalid field value
    pub const INVALID_VALUE: &str = "ERR_DSL_VALIDATION_INVALID_VALUE";
}

/// A trait for validators that check specific aspects of a state-machine document
pub trait Validator {
    /// Validate the document and return a list of validation errors (if any)
    fn validate(&self, definition: &StateMachineDefinition) -> Vec<ValidationError>;
}

/// A graph together with the label used for its graph-level errors:
/// `StateMachine` for the document, `States.<S>.ItemProcessor` or
/// `States.<S>.Branches[<i>]` for nested graphs.
pub(crate) struct GraphRef<'a> {
    pub label: String,
    pub graph: &'a StateMachineDefinition,
}

/// Every graph of the document, outermost first
pub(crate) fn collect_graphs(definition: &StateMachineDefinition) -> Vec<GraphRef<'_>> {
    let mut graphs = Vec::new();
    push_graph("StateMachine".to_string(), definition, &mut graphs);
    graphs
}

fn push_graph<'a>(label: String, graph: &'a StateMachineDefinition, graphs: &mut Vec<GraphRef<'a>>) {
    graphs.push(GraphRef { label, graph });
    for (name, state) in graph.states.iter().flat_map(|states| states.iter()) {
        for (suffix, nested) in state.nested_graphs() {
            push_graph(format!("States.{}.{}", name, suffix), nested, graphs);
        }
    }
}

/// Every state of a graph, in declaration order
pub(crate) fn states_of<'a>(graph: &'a StateMachineDefinition) -> impl Iterator<Item = (&'a str, &'a StateDefinition)> {
    graph.states.iter().flat_map(|states| states.iter())
}

/// Validate a parsed state-machine document
pub fn validate_definition(definition: &StateMachineDefinition) -> Result<(), DslError> {
    let validators: Vec<Box<dyn Validator>> = vec![
        Box::new(structure::StructureValidator::new()),
        Box::new(reference::ReferenceValidator::new()),
        Box::new(fields::FieldValidator::new()),
    ];

    // Run all validators and collect errors
    let mut errors = Vec::new();

    for validator in validators {
        let validator_errors = validator.validate(definition);
        errors.extend(validator_errors);
    }

    if !errors.is_empty() {
        return Err(DslError::from_validation_errors(errors));
    }

    Ok(())
}
