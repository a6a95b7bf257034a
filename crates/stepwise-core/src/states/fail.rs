use serde_json::Value;
use stepwise_dsl::FailStateDefinition;

use super::{compile_required_path, resolve_path, Advance};
use crate::context::Context;
use crate::error::ExecutionError;
use crate::path::Path;

/// A literal `Error`/`Cause` or a path to one
#[derive(Debug, Clone, PartialEq)]
pub enum FailField {
    None,
    Literal(String),
    Path(Path),
}

impl FailField {
    fn compile(name: &str, literal: &Option<String>, path: &Option<String>) -> Result<Self, String> {
        match (literal, path) {
            (Some(text), _) => Ok(FailField::Literal(text.clone())),
            (None, Some(path)) => compile_required_path(name, path).map(FailField::Path),
            (None, None) => Ok(FailField::None),
        }
    }

    fn resolve(&self, ctx: &Context) -> Result<Option<String>, ExecutionError> {
        match self {
            FailField::None => Ok(None),
            FailField::Literal(text) => Ok(Some(text.clone())),
            FailField::Path(path) => {
                let value = resolve_path(path, &ctx.data, &ctx.context_object())?;
                Ok(Some(match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                }))
            }
        }
    }
}

/// Ends the workflow with a declared error
#[derive(Debug, Clone)]
pub struct FailState {
    pub error: FailField,
    pub cause: FailField,
}

impl FailState {
    pub fn compile(definition: &FailStateDefinition) -> Result<Self, String> {
        Ok(FailState {
            error: FailField::compile("ErrorPath", &definition.error, &definition.error_path)?,
            cause: FailField::compile("CausePath", &definition.cause, &definition.cause_path)?,
        })
    }

    pub(crate) fn advance(&self, ctx: &mut Context) -> Result<Advance, ExecutionError> {
        Err(ExecutionError::Declared {
            error: self.error.resolve(ctx)?,
            cause: self.cause.resolve(ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionInfo;
    use serde_json::json;

    fn fail(definition: FailStateDefinition, input: Value) -> ExecutionError {
        let state = FailState::compile(&definition).unwrap();
        let mut ctx = Context::new(ExecutionInfo::new(input.clone()), input);
        state.advance(&mut ctx).unwrap_err()
    }

    #[test]
    fn test_literal_error_and_cause() {
        let err = fail(
            FailStateDefinition {
                error: Some("Order.Rejected".to_string()),
                cause: Some("Out of stock".to_string()),
                ..Default::default()
            },
            json!({}),
        );
        assert_eq!(err.to_payload(), json!({"Error": "Order.Rejected", "Cause": "Out of stock"}));
    }

    #[test]
    fn test_error_from_paths() {
        let err = fail(
            FailStateDefinition {
                error_path: Some("$.failure.name".to_string()),
                cause_path: Some("$.failure.detail".to_string()),
                ..Default::default()
            },
            json!({"failure": {"name": "Custom.Error", "detail": {"code": 3}}}),
        );
        assert_eq!(err.error_name(), Some("Custom.Error"));
        assert_eq!(err.cause(), Some("{\"code\":3}".to_string()));
    }

    #[test]
    fn test_unresolved_error_path_is_runtime_error() {
        let err = fail(
            FailStateDefinition {
                error_path: Some("$.missing".to_string()),
                ..Default::default()
            },
            json!({}),
        );
        assert_eq!(err.error_name(), Some("States.Runtime"));
    }

    #[test]
    fn test_bare_fail_has_empty_payload() {
        let err = fail(FailStateDefinition::default(), json!({}));
        assert_eq!(err.to_payload(), json!({}));
    }
}
