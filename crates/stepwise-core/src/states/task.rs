use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use stepwise_dsl::TaskStateDefinition;

use super::{deadline_after, in_backoff, Advance, DataFlow};
use crate::context::{Context, StateProgress};
use crate::error::{error_names, ExecutionError};
use crate::job::JobStatus;
use crate::path::payload::PayloadTemplate;
use crate::retry::ErrorHandling;
use crate::workflow::StepEnv;

/// Runs a job through the workflow's [`JobRunner`](crate::job::JobRunner)
#[derive(Debug, Clone)]
pub struct TaskState {
    pub next: Option<String>,
    pub resource: String,
    pub credentials: Option<PayloadTemplate>,
    pub timeout_seconds: Option<u64>,
    pub flow: DataFlow,
    pub handling: ErrorHandling,
}

impl TaskState {
    pub fn compile(definition: &TaskStateDefinition) -> Result<Self, String> {
        Ok(TaskState {
            next: definition.next.clone(),
            resource: definition
                .resource
                .clone()
                .ok_or_else(|| "Missing \"Resource\" field".to_string())?,
            credentials: definition
                .credentials
                .as_ref()
                .map(PayloadTemplate::compile)
                .transpose()?,
            timeout_seconds: definition.timeout_seconds,
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

        let (handle, launched_at) = match std::mem::take(&mut ctx.progress) {
            StateProgress::Job { handle, launched_at } => (handle, launched_at),
            _ => {
                let input = self.flow.effective_input(ctx)?;
                let credentials = match &self.credentials {
                    Some(template) => template.apply(&ctx.data, &ctx.context_object())?,
                    None => Value::Null,
                };

                let handle = env
                    .runner
                    .launch(&self.resource, &input, &credentials)
                    .map_err(|err| ExecutionError::JobFailure {
                        error: error_names::TASK_FAILED.to_string(),
                        cause: Some(err.to_string()),
                    })?;

                tracing::info!(
                    execution_id = %ctx.execution.id,
                    state = %name,
                    resource = %self.resource,
                    job_id = %handle.id,
                    "Launched job"
                );
                (handle, Utc::now())
            }
        };

        match env.runner.poll(&handle) {
            JobStatus::Succeeded(result) => {
                env.runner.cleanup(&handle);
                tracing::debug!(execution_id = %ctx.execution.id, state = %name, job_id = %handle.id, "Job succeeded");
                Ok(Advance::Completed {
                    output: self.flow.output(ctx, result)?,
                    next: self.next.clone(),
                })
            }
            JobStatus::Failed(failure) => {
                env.runner.cleanup(&handle);
                Err(ExecutionError::JobFailure {
                    error: failure.error.unwrap_or_else(|| error_names::TASK_FAILED.to_string()),
                    cause: failure.cause,
                })
            }
            JobStatus::Running | JobStatus::NotStarted => {
                if let Some(timeout) = self.timeout_seconds {
                    if Utc::now() >= deadline_after(launched_at, Duration::from_secs(timeout)) {
                        env.runner.cleanup(&handle);
                        return Err(ExecutionError::Timeout(format!(
                            "State {} timed out after {} seconds",
                            name, timeout
                        )));
                    }
                }
                ctx.progress = StateProgress::Job { handle, launched_at };
                Ok(Advance::Blocked)
            }
        }
    }
}
