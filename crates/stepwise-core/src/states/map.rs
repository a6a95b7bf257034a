use std::sync::Arc;

use serde_json::Value;
use stepwise_dsl::MapStateDefinition;

use super::{compile_required_path, in_backoff, Advance, DataFlow};
use crate::branch::{BranchOutcome, BranchRunner, FailureTolerance};
use crate::context::{set_map_item, Context, StateProgress};
use crate::error::{error_names, ExecutionError};
use crate::graph::StateGraph;
use crate::path::payload::PayloadTemplate;
use crate::path::Path;
use crate::retry::ErrorHandling;
use crate::workflow::{StepEnv, Workflow};

/// Runs the item processor once per element of the `ItemsPath` array
#[derive(Debug, Clone)]
pub struct MapState {
    pub next: Option<String>,
    pub items_path: Path,
    pub item_selector: Option<PayloadTemplate>,
    pub processor: Arc<StateGraph>,
    /// 0 means no limit
    pub max_concurrency: usize,
    pub tolerance: FailureTolerance,
    pub flow: DataFlow,
    pub handling: ErrorHandling,
}

impl MapState {
    pub fn compile(definition: &MapStateDefinition) -> Result<Self, String> {
        let processor = definition
            .item_processor
            .as_deref()
            .ok_or_else(|| "Missing \"ItemProcessor\" field".to_string())?;
        let processor = StateGraph::compile(processor).map_err(|err| format!("ItemProcessor: {}", err))?;

        Ok(MapState {
            next: definition.next.clone(),
            items_path: compile_required_path("ItemsPath", definition.items_path.as_deref().unwrap_or("$"))?,
            item_selector: definition
                .item_selector
                .as_ref()
                .map(PayloadTemplate::compile)
                .transpose()?,
            processor: Arc::new(processor),
            max_concurrency: definition
                .max_concurrency
                .map_or(0, |limit| usize::try_from(limit).unwrap_or(usize::MAX)),
            tolerance: FailureTolerance {
                count: definition.tolerated_failure_count,
                percentage: definition.tolerated_failure_percentage,
            },
            flow: DataFlow::compile(
                &definition.input_path,
                None,
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
        let input = self.flow.filtered_input(ctx);
        let mut context_object = ctx.context_object();
        let items = match self.items_path.evaluate(&input, &context_object) {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                return Err(ExecutionError::PathEvaluation {
                    error: error_names::RUNTIME,
                    cause: format!(
                        "ItemsPath \"{}\" resolved to {} which is not an array",
                        self.items_path, other
                    ),
                })
            }
            Err(err) => return Err(ExecutionError::path(error_names::RUNTIME, err)),
        };

        let mut children = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let item_input = match &self.item_selector {
                Some(selector) => {
                    set_map_item(&mut context_object, index, item);
                    selector.apply(&input, &context_object)?
                }
                None => item,
            };
            children.push(Workflow::child(
                Arc::clone(&self.processor),
                item_input,
                env.clone(),
                ctx.execution.clone(),
            ));
        }

        tracing::info!(
            execution_id = %ctx.execution.id,
            state = %name,
            items = children.len(),
            max_concurrency = self.max_concurrency,
            "Starting map iterations"
        );
        Ok(BranchRunner::new(children, self.max_concurrency, self.tolerance))
    }
}
