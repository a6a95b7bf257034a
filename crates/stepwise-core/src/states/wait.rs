use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use stepwise_dsl::{PathField, WaitStateDefinition};

use super::{compile_required_path, deadline_after, resolve_path, Advance, DataFlow};
use crate::context::{Context, StateProgress};
use crate::error::{error_names, ExecutionError};
use crate::path::Path;

/// How a Wait state computes its deadline
#[derive(Debug, Clone, PartialEq)]
pub enum WaitFor {
    Seconds(u64),
    SecondsPath(Path),
    Timestamp(DateTime<Utc>),
    TimestampPath(Path),
}

/// Blocks until a number of seconds has passed or a timestamp is reached
#[derive(Debug, Clone)]
pub struct WaitState {
    pub next: Option<String>,
    pub flow: DataFlow,
    pub wait_for: WaitFor,
}

impl WaitState {
    pub fn compile(definition: &WaitStateDefinition) -> Result<Self, String> {
        let wait_for = match (
            definition.seconds,
            &definition.seconds_path,
            &definition.timestamp,
            &definition.timestamp_path,
        ) {
            (Some(seconds), None, None, None) => WaitFor::Seconds(seconds),
            (None, Some(path), None, None) => WaitFor::SecondsPath(compile_required_path("SecondsPath", path)?),
            (None, None, Some(timestamp), None) => WaitFor::Timestamp(
                parse_timestamp(timestamp).ok_or_else(|| format!("field \"Timestamp\" value \"{}\" is not a valid timestamp", timestamp))?,
            ),
            (None, None, None, Some(path)) => {
                WaitFor::TimestampPath(compile_required_path("TimestampPath", path)?)
            }
            _ => {
                return Err(
                    "must have exactly one of \"Seconds\", \"SecondsPath\", \"Timestamp\", \"TimestampPath\"".to_string(),
                )
            }
        };

        Ok(WaitState {
            next: definition.next.clone(),
            flow: DataFlow::compile(
                &definition.input_path,
                None,
                None,
                &PathField::Absent,
                &definition.output_path,
            )?,
            wait_for,
        })
    }

    pub(crate) fn advance(&self, ctx: &mut Context) -> Result<Advance, ExecutionError> {
        let until = match ctx.progress {
            StateProgress::Waiting { until } => until,
            _ => {
                let until = self.deadline(ctx)?;
                ctx.progress = StateProgress::Waiting { until };
                until
            }
        };

        if Utc::now() < until {
            return Ok(Advance::Blocked);
        }

        let input = self.flow.effective_input(ctx)?;
        Ok(Advance::Completed {
            output: self.flow.output(ctx, input)?,
            next: self.next.clone(),
        })
    }

    fn deadline(&self, ctx: &Context) -> Result<DateTime<Utc>, ExecutionError> {
        let entered = ctx.entered_at.unwrap_or_else(Utc::now);
        match &self.wait_for {
            WaitFor::Seconds(seconds) => Ok(deadline_after(entered, Duration::from_secs(*seconds))),
            WaitFor::Timestamp(timestamp) => Ok(*timestamp),
            WaitFor::SecondsPath(path) => {
                let value = self.resolve(path, ctx)?;
                let seconds = value
                    .as_u64()
                    .ok_or_else(|| runtime_error(format!("SecondsPath \"{}\" value {} is not a non-negative integer", path, value)))?;
                Ok(deadline_after(entered, Duration::from_secs(seconds)))
            }
            WaitFor::TimestampPath(path) => {
                let value = self.resolve(path, ctx)?;
                value
                    .as_str()
                    .and_then(parse_timestamp)
                    .ok_or_else(|| runtime_error(format!("TimestampPath \"{}\" value {} is not a valid timestamp", path, value)))
            }
        }
    }

    fn resolve(&self, path: &Path, ctx: &Context) -> Result<Value, ExecutionError> {
        let input = self.flow.filtered_input(ctx);
        resolve_path(path, &input, &ctx.context_object())
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text).ok().map(|t| t.with_timezone(&Utc))
}

fn runtime_error(cause: String) -> ExecutionError {
    ExecutionError::PathEvaluation {
        error: error_names::RUNTIME,
        cause,
    }
}
