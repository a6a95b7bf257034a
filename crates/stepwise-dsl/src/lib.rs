//! # Stepwise DSL
//!
//! Document model, parsing and structural validation for Stepwise state
//! machines. Documents follow the Amazon States Language: a `StartAt` state and
//! a `States` object whose entries are tagged by `Type`.
//!
//! ## Features
//!
//! * JSON and YAML documents, with state declaration order preserved
//! * Nested graphs for Map (`ItemProcessor`) and Parallel (`Branches`) states
//! * Validation of required fields, transitions and path syntax with exact,
//!   state-naming error messages
//!
//! ## Example
//!
//! ```
//! use stepwise_dsl::parse_and_validate_definition;
//!
//! let yaml = r#"
//! StartAt: Greet
//! States:
//!   Greet:
//!     Type: Pass
//!     Result: hello
//!     End: true
//! "#;
//!
//! let definition = parse_and_validate_definition(yaml).unwrap();
//! assert_eq!(definition.start_at.as_deref(), Some("Greet"));
//! ```

mod error;
mod parser;
mod utils;

pub mod definition;
pub mod validation;

pub use definition::{
    CatcherDefinition, ChoiceRuleDefinition, ChoiceStateDefinition, ComparisonOperator,
    FailStateDefinition, JitterStrategy, MapStateDefinition, ParallelStateDefinition,
    PassStateDefinition, PathField, RetrierDefinition, StateDefinition, StateMachineDefinition,
    StateMap, SucceedStateDefinition, TaskStateDefinition, WaitStateDefinition,
};
pub use error::DslError;
pub use parser::{definition_from_value, parse_definition};
pub use utils::path::{is_reference_path, is_valid_path};
pub use validation::{validate_definition, ValidationError};

/// Parse and validate a state-machine document.
///
/// # Errors
///
/// * Invalid JSON or YAML syntax
/// * A state without a `Type`, or with an unknown one
/// * Validation errors: missing required fields, dangling transitions,
///   malformed paths. When exactly one is found its message is the whole
///   error text.
///
/// ```
/// use stepwise_dsl::parse_and_validate_definition;
///
/// let json = r#"{
///   "StartAt": "First",
///   "States": {"First": {"Type": "Pass", "Next": "Missing"}}
/// }"#;
///
/// let err = parse_and_validate_definition(json).unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "States.First field \"Next\" value \"Missing\" is not found in \"States\""
/// );
/// ```
pub fn parse_and_validate_definition(text: &str) -> Result<StateMachineDefinition, DslError> {
    let definition = parser::parse_definition(text)?;
    validation::validate_definition(&definition)?;
    Ok(definition)
}

/// Returns a version string for the Stepwise DSL crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
