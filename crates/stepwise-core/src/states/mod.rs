//! Compiled states and their non-blocking advance.
//!
//! A [`State`] is immutable once compiled. Everything that changes while a
//! state runs (launched jobs, wait deadlines, retry counters, nested
//! workflows) lives in the [`Context`].

mod choice;
mod fail;
mod map;
mod parallel;
mod pass;
mod succeed;
mod task;
mod wait;

pub use choice::{ChoiceRule, ChoiceState, Operand};
pub use fail::{FailField, FailState};
pub use map::MapState;
pub use parallel::ParallelState;
pub use pass::PassState;
pub use succeed::SucceedState;
pub use task::TaskState;
pub use wait::WaitState;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use stepwise_dsl::{PathField, StateDefinition};

use crate::context::{Context, StateProgress};
use crate::error::{error_names, ExecutionError};
use crate::path::payload::PayloadTemplate;
use crate::path::Path;
use crate::retry::ErrorHandling;
use crate::workflow::StepEnv;

/// Result of advancing a state once
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Waiting on something outside the engine: a job, a clock, a backoff
    Blocked,
    /// Made progress but is not done; stepping again may progress further
    Progressed,
    /// Done. `next` is `None` when the state ends its workflow.
    Completed { output: Value, next: Option<String> },
}

/// `InputPath` or `OutputPath`
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPath {
    /// Absent: the document passes through
    Identity,
    /// `null`: the document becomes `{}`
    Empty,
    Path(Path),
}

impl FilterPath {
    pub fn compile(field: &PathField) -> Result<Self, String> {
        match field {
            PathField::Absent => Ok(FilterPath::Identity),
            PathField::Null => Ok(FilterPath::Empty),
            PathField::Path(path) if path == "$" => Ok(FilterPath::Identity),
            PathField::Path(path) => Path::parse(path).map(FilterPath::Path).map_err(|err| err.message),
        }
    }

    /// Narrow `data`. A path that does not resolve leaves `data` unchanged.
    pub fn apply(&self, data: &Value, context: &Value) -> Value {
        match self {
            FilterPath::Identity => data.clone(),
            FilterPath::Empty => json!({}),
            FilterPath::Path(path) => path.evaluate(data, context).unwrap_or_else(|err| {
                tracing::debug!(path = %path, "{}; passing document through", err.message);
                data.clone()
            }),
        }
    }
}

/// Where a state's result goes in its input document
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPath {
    /// `$` or absent: the result replaces the input
    Replace,
    /// `null`: the result is dropped and the input passes through
    Discard,
    Merge(Path),
}

impl ResultPath {
    pub fn compile(field: &PathField) -> Result<Self, String> {
        match field {
            PathField::Absent => Ok(ResultPath::Replace),
            PathField::Null => Ok(ResultPath::Discard),
            PathField::Path(path) if path == "$" => Ok(ResultPath::Replace),
            PathField::Path(path) => {
                let parsed = Path::parse(path).map_err(|err| err.message)?;
                if parsed.is_context() || !parsed.is_reference() {
                    return Err(format!("ResultPath \"{}\" must be a reference path", path));
                }
                Ok(ResultPath::Merge(parsed))
            }
        }
    }

    /// Copy `data` and place `result` in it
    pub fn apply(&self, data: &Value, result: Value) -> Result<Value, ExecutionError> {
        match self {
            ResultPath::Replace => Ok(result),
            ResultPath::Discard => Ok(data.clone()),
            ResultPath::Merge(path) => path
                .set(data, result)
                .map_err(|err| ExecutionError::path(error_names::RESULT_PATH_MATCH_FAILURE, err)),
        }
    }
}

/// The path pipeline around a state's own logic:
/// `InputPath` → `Parameters` → logic → `ResultSelector` → `ResultPath` → `OutputPath`
#[derive(Debug, Clone, PartialEq)]
pub struct DataFlow {
    pub input_path: FilterPath,
    pub parameters: Option<PayloadTemplate>,
    pub result_selector: Option<PayloadTemplate>,
    pub result_path: ResultPath,
    pub output_path: FilterPath,
}

impl Default for DataFlow {
    fn default() -> Self {
        DataFlow {
            input_path: FilterPath::Identity,
            parameters: None,
            result_selector: None,
            result_path: ResultPath::Replace,
            output_path: FilterPath::Identity,
        }
    }
}

impl DataFlow {
    pub fn compile(
        input_path: &PathField,
        parameters: Option<&Value>,
        result_selector: Option<&Value>,
        result_path: &PathField,
        output_path: &PathField,
    ) -> Result<Self, String> {
        Ok(DataFlow {
            input_path: FilterPath::compile(input_path)?,
            parameters: parameters.map(PayloadTemplate::compile).transpose()?,
            result_selector: result_selector.map(PayloadTemplate::compile).transpose()?,
            result_path: ResultPath::compile(result_path)?,
            output_path: FilterPath::compile(output_path)?,
        })
    }

    /// The state input after `InputPath`
    pub fn filtered_input(&self, ctx: &Context) -> Value {
        self.input_path.apply(&ctx.data, &ctx.context_object())
    }

    /// The state input after `InputPath` and `Parameters`
    pub fn effective_input(&self, ctx: &Context) -> Result<Value, ExecutionError> {
        let context = ctx.context_object();
        let input = self.input_path.apply(&ctx.data, &context);
        match &self.parameters {
            Some(template) => template.apply(&input, &context),
            None => Ok(input),
        }
    }

    /// Shape a raw result into the state output, merging it into the state input
    pub fn output(&self, ctx: &Context, raw: Value) -> Result<Value, ExecutionError> {
        let context = ctx.context_object();
        let result = match &self.result_selector {
            Some(template) => template.apply(&raw, &context)?,
            None => raw,
        };
        let merged = self.result_path.apply(&ctx.data, result)?;
        Ok(self.output_path.apply(&merged, &context))
    }
}

/// A compiled state
#[derive(Debug, Clone)]
pub enum State {
    Pass(PassState),
    Task(TaskState),
    Wait(WaitState),
    Choice(ChoiceState),
    Succeed(SucceedState),
    Fail(FailState),
    Parallel(ParallelState),
    Map(MapState),
}

impl State {
    /// Compile a validated definition. Errors name the offending field.
    pub fn compile(definition: &StateDefinition) -> Result<Self, String> {
        Ok(match definition {
            StateDefinition::Pass(def) => State::Pass(PassState::compile(def)?),
            StateDefinition::Task(def) => State::Task(TaskState::compile(def)?),
            StateDefinition::Wait(def) => State::Wait(WaitState::compile(def)?),
            StateDefinition::Choice(def) => State::Choice(ChoiceState::compile(def)?),
            StateDefinition::Succeed(def) => State::Succeed(SucceedState::compile(def)?),
            StateDefinition::Fail(def) => State::Fail(FailState::compile(def)?),
            StateDefinition::Parallel(def) => State::Parallel(ParallelState::compile(def)?),
            StateDefinition::Map(def) => State::Map(MapState::compile(def)?),
        })
    }

    pub fn state_type(&self) -> &'static str {
        match self {
            State::Pass(_) => "Pass",
            State::Task(_) => "Task",
            State::Wait(_) => "Wait",
            State::Choice(_) => "Choice",
            State::Succeed(_) => "Succeed",
            State::Fail(_) => "Fail",
            State::Parallel(_) => "Parallel",
            State::Map(_) => "Map",
        }
    }

    /// The declared `Next`. Choice states pick theirs at run time.
    pub fn next(&self) -> Option<&str> {
        match self {
            State::Pass(state) => state.next.as_deref(),
            State::Task(state) => state.next.as_deref(),
            State::Wait(state) => state.next.as_deref(),
            State::Parallel(state) => state.next.as_deref(),
            State::Map(state) => state.next.as_deref(),
            State::Choice(_) | State::Succeed(_) | State::Fail(_) => None,
        }
    }

    /// Whether the state ends its workflow when it completes
    pub fn is_end(&self) -> bool {
        match self {
            State::Succeed(_) | State::Fail(_) => true,
            State::Choice(_) => false,
            _ => self.next().is_none(),
        }
    }

    pub fn error_handling(&self) -> Option<&ErrorHandling> {
        match self {
            State::Task(state) => Some(&state.handling),
            State::Parallel(state) => Some(&state.handling),
            State::Map(state) => Some(&state.handling),
            _ => None,
        }
    }

    pub(crate) fn retrier_count(&self) -> usize {
        self.error_handling().map_or(0, |handling| handling.retriers.len())
    }

    /// Advance once. Errors from Task, Parallel and Map go through their
    /// Retry and Catch lists before reaching the caller.
    pub(crate) fn advance(&self, name: &str, ctx: &mut Context, env: &StepEnv) -> Result<Advance, ExecutionError> {
        let result = match self {
            State::Pass(state) => state.advance(ctx),
            State::Task(state) => state.advance(name, ctx, env),
            State::Wait(state) => state.advance(ctx),
            State::Choice(state) => state.advance(name, ctx),
            State::Succeed(state) => state.advance(ctx),
            State::Fail(state) => state.advance(ctx),
            State::Parallel(state) => state.advance(name, ctx, env),
            State::Map(state) => state.advance(name, ctx, env),
        };

        match (result, self.error_handling()) {
            (Err(err), Some(handling)) => handle_error(handling, name, ctx, err),
            (result, _) => result,
        }
    }
}

/// Retry the state if a retrier with attempts left matches, else catch, else fail
fn handle_error(
    handling: &ErrorHandling,
    name: &str,
    ctx: &mut Context,
    err: ExecutionError,
) -> Result<Advance, ExecutionError> {
    let error_name = err.error_name();

    if let Some((index, retrier)) = handling.retrier_for(error_name) {
        let used = ctx.retry_attempts.get(index).copied().unwrap_or(0);
        if used < retrier.max_attempts {
            let attempt = used + 1;
            if let Some(slot) = ctx.retry_attempts.get_mut(index) {
                *slot = attempt;
            }
            ctx.retry_count += 1;

            let delay = retrier.delay(attempt);
            ctx.retry_not_before = Some(deadline_after(Utc::now(), delay));
            ctx.progress = StateProgress::Idle;

            tracing::warn!(
                execution_id = %ctx.execution.id,
                state = %name,
                error = error_name.unwrap_or_default(),
                attempt,
                max_attempts = retrier.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying state after error: {}",
                err
            );
            return Ok(Advance::Progressed);
        }
    }

    if let Some(catcher) = handling.catcher_for(error_name) {
        let output = catcher.result_path.apply(&ctx.data, err.to_payload())?;
        tracing::warn!(
            execution_id = %ctx.execution.id,
            state = %name,
            error = error_name.unwrap_or_default(),
            next = %catcher.next,
            "Caught error: {}",
            err
        );
        return Ok(Advance::Completed {
            output,
            next: Some(catcher.next.clone()),
        });
    }

    Err(err)
}

/// Whether a retry backoff is still running. Clears it once it has passed.
/// `from + after`, saturating at the latest representable instant
pub(crate) fn deadline_after(from: DateTime<Utc>, after: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|after| from.checked_add_signed(after))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn in_backoff(ctx: &mut Context) -> bool {
    match ctx.retry_not_before {
        Some(not_before) if Utc::now() < not_before => true,
        Some(_) => {
            ctx.retry_not_before = None;
            false
        }
        None => false,
    }
}

/// Evaluate a required path such as `SecondsPath` or `ErrorPath`
pub(crate) fn resolve_path(path: &Path, input: &Value, context: &Value) -> Result<Value, ExecutionError> {
    path.evaluate(input, context)
        .map_err(|err| ExecutionError::path(error_names::RUNTIME, err))
}

pub(crate) fn compile_required_path(field: &str, path: &str) -> Result<Path, String> {
    Path::parse(path).map_err(|err| format!("field \"{}\": {}", field, err.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionInfo;
    use pretty_assertions::assert_eq;

    fn context(data: Value) -> Context {
        Context::new(ExecutionInfo::new(data.clone()), data)
    }

    fn field(path: &str) -> PathField {
        PathField::Path(path.to_string())
    }

    #[test]
    fn test_filter_path() {
        let data = json!({"Payload": {"a": 1}, "other": true});
        let context = json!({});

        assert_eq!(FilterPath::compile(&PathField::Absent).unwrap().apply(&data, &context), data);
        assert_eq!(FilterPath::compile(&PathField::Null).unwrap().apply(&data, &context), json!({}));
        assert_eq!(
            FilterPath::compile(&field("$.Payload")).unwrap().apply(&data, &context),
            json!({"a": 1})
        );
        // Unresolved paths pass the document through
        assert_eq!(FilterPath::compile(&field("$.missing")).unwrap().apply(&data, &context), data);
    }

    #[test]
    fn test_result_path() {
        let data = json!({"detail": {"shipped": [1, 2]}});

        assert_eq!(ResultPath::Replace.apply(&data, json!(5)).unwrap(), json!(5));
        assert_eq!(ResultPath::Discard.apply(&data, json!(5)).unwrap(), data);

        let merge = ResultPath::compile(&field("$.detail.result")).unwrap();
        assert_eq!(
            merge.apply(&data, json!([1, 2])).unwrap(),
            json!({"detail": {"shipped": [1, 2], "result": [1, 2]}})
        );

        let err = ResultPath::compile(&field("$.detail.shipped.deeper"))
            .unwrap()
            .apply(&data, json!(0))
            .unwrap_err();
        assert_eq!(err.error_name(), Some(error_names::RESULT_PATH_MATCH_FAILURE));

        assert!(ResultPath::compile(&field("$.items[*]")).is_err());
    }

    #[test]
    fn test_data_flow_order() {
        let flow = DataFlow::compile(
            &field("$.order"),
            Some(&json!({"id.$": "$.id", "state.$": "$$.State.Name"})),
            Some(&json!({"total.$": "$.sum"})),
            &field("$.receipt"),
            &field("$.receipt"),
        )
        .unwrap();

        let mut ctx = context(json!({"order": {"id": 7}, "user": "ada"}));
        ctx.enter_state("Charge", json!({"order": {"id": 7}, "user": "ada"}), 0);

        assert_eq!(flow.effective_input(&ctx).unwrap(), json!({"id": 7, "state": "Charge"}));
        assert_eq!(
            flow.output(&ctx, json!({"sum": 12, "ignored": true})).unwrap(),
            json!({"total": 12})
        );
    }

    #[test]
    fn test_pass_output_path_discards_siblings() {
        let flow = DataFlow::compile(
            &PathField::Absent,
            None,
            None,
            &PathField::Absent,
            &field("$.Payload"),
        )
        .unwrap();
        let ctx = context(json!({"Payload": {"x": [1]}, "other": 2}));
        let input = flow.effective_input(&ctx).unwrap();
        assert_eq!(flow.output(&ctx, input).unwrap(), json!({"x": [1]}));
    }
}
