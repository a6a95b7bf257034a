use std::sync::Arc;

use serde_json::Value;
use stepwise_dsl::ParallelStateDefinition;

use super::{in_backoff, Advance, DataFlow};
use crate::branch::{BranchOutcome, BranchRunner, FailureTolerance};
use crate::context::{Context, StateProgress};
use crate::error::ExecutionError;
use crate::graph::StateGraph;
use crate::retry::ErrorHandling;
use crate::workflow::{StepEnv, Workflow};

/// Runs every branch on the same input; the result lists their outputs in branch order
#[derive(Debug, Clone)]
pub struct ParallelState {
    pub next: Option<String>,
    pub branches: Vec<Arc<StateGraph>>,
    pub flow: DataFlow,
    pub handling: ErrorHandling,
}

impl ParallelState {
    pub fn compile(definition: &ParallelStateDefinition) -> Result<Self, String> {
        let branches = definition
            .branches
            .iter()
            .flatten()
            .enumerate()
            .map(|(index, branch)| {
                StateGraph::compile(branch)
                    .map(Arc::new)
                    .map_err(|err| format!("Branches[{}]: {}", index, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParallelState {
            next: definition.next.clone(),
            branches,
            flow: DataFlow::compile(
                &definition.input_path,
                definition.parameters.as_ref(),
                definition.result_selector.as_ref(),
                &definition.result_path,
                &definition.output_path,
            )?,
            handling: ErrorHandling::compile(&definition.retry, &definition.catch)?,
        })
    }

    pub(crate) fn advance(&self, name: &str, ctx: &mut Context, env: &StepEnv) -> Result<Advance, ExecutionError> {
        if in_backoff(ctx) {
            return Ok(Advance::Blocked);
        }

        let mut runner = match std::mem::take(&mut ctx.progress) {
            StateProgress::Branches(runner) => runner,
            _ => Box::new(self.start(name, ctx, env)?),
        };

        match runner.advance() {
            BranchOutcome::Running { progressed } => {
                ctx.progress = StateProgress::Branches(runner);
                Ok(if progressed { Advance::Progressed } else { Advance::Blocked })
            }
            BranchOutcome::Completed(results) => Ok(Advance::Completed {
                output: self.flow.output(ctx, Value::Array(results))?,
                next: self.next.clone(),
            }),
            BranchOutcome::Failed(err) => Err(err),
        }
    }

    fn start(&self, name: &str, ctx: &Context, env: &StepEnv) -> Result<BranchRunner, ExecutionError> {
        let input = self.flow.effective_input(ctx)?;
        let children = self
            .branches
            .iter()
            .map(|graph| Workflow::child(Arc::clone(graph), input.clone(), env.clone(), ctx.execution.clone()))
            .collect();

        tracing::info!(
            execution_id = %ctx.execution.id,
            state = %name,
            branches = self.branches.len(),
            "Starting parallel branches"
        );
        Ok(BranchRunner::new(children, 0, FailureTolerance::default()))
    }
}
