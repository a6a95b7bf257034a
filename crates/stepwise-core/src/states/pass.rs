use serde_json::Value;
use stepwise_dsl::{PassStateDefinition, PathField};

use super::{Advance, DataFlow};
use crate::context::Context;
use crate::error::ExecutionError;

/// Passes its input (or `Result`) through the data pipeline
#[derive(Debug, Clone)]
pub struct PassState {
    pub next: Option<String>,
    pub flow: DataFlow,
    pub result: Option<Value>,
}

impl PassState {
    pub fn compile(definition: &PassStateDefinition) -> Result<Self, String> {
        Ok(PassState {
            next: definition.next.clone(),
            flow: DataFlow::compile(
                &definition.input_path,
                definition.parameters.as_ref(),
                None,
                &definition.result_path,
                &definition.output_path,
            )?,
            result: definition.result.clone(),
        })
    }

    pub(crate) fn advance(&self, ctx: &mut Context) -> Result<Advance, ExecutionError> {
        let raw = match &self.result {
            Some(result) => result.clone(),
            None => self.flow.effective_input(ctx)?,
        };
        Ok(Advance::Completed {
            output: self.flow.output(ctx, raw)?,
            next: self.next.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionInfo;
    use serde_json::json;

    fn run(definition: PassStateDefinition, input: Value) -> Advance {
        let state = PassState::compile(&definition).unwrap();
        let mut ctx = Context::new(ExecutionInfo::new(input.clone()), input.clone());
        ctx.enter_state("Pass", input, 0);
        state.advance(&mut ctx).unwrap()
    }

    #[test]
    fn test_identity() {
        let advance = run(
            PassStateDefinition {
                next: Some("After".to_string()),
                ..Default::default()
            },
            json!({"a": 1}),
        );
        assert_eq!(
            advance,
            Advance::Completed {
                output: json!({"a": 1}),
                next: Some("After".to_string())
            }
        );
    }

    #[test]
    fn test_result_merged_at_result_path() {
        let advance = run(
            PassStateDefinition {
                end: true,
                result: Some(json!({"x": 0.5})),
                result_path: PathField::Path("$.coords".to_string()),
                ..Default::default()
            },
            json!({"name": "origin"}),
        );
        assert_eq!(
            advance,
            Advance::Completed {
                output: json!({"name": "origin", "coords": {"x": 0.5}}),
                next: None
            }
        );
    }

    #[test]
    fn test_parameters_and_output_path() {
        let advance = run(
            PassStateDefinition {
                end: true,
                parameters: Some(json!({"Payload.$": "$.items[0]"})),
                output_path: PathField::Path("$.Payload".to_string()),
                ..Default::default()
            },
            json!({"items": ["first", "second"]}),
        );
        assert_eq!(
            advance,
            Advance::Completed {
                output: json!("first"),
                next: None
            }
        );
    }
}
