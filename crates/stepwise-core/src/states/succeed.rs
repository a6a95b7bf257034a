use stepwise_dsl::{PathField, SucceedStateDefinition};

use super::{Advance, DataFlow};
use crate::context::Context;
use crate::error::ExecutionError;

/// Ends the workflow successfully with its (filtered) input as output
#[derive(Debug, Clone)]
pub struct SucceedState {
    pub flow: DataFlow,
}

impl SucceedState {
    pub fn compile(definition: &SucceedStateDefinition) -> Result<Self, String> {
        Ok(SucceedState {
            flow: DataFlow::compile(
                &definition.input_path,
                None,
                None,
                &PathField::Absent,
                &definition.output_path,
            )?,
        })
    }

    pub(crate) fn advance(&self, ctx: &mut Context) -> Result<Advance, ExecutionError> {
        let input = self.flow.effective_input(ctx)?;
        Ok(Advance::Completed {
            output: self.flow.output(ctx, input)?,
            next: None,
        })
    }
}
