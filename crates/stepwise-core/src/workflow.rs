//! The caller-driven workflow stepping API.
//!
//! A [`Workflow`] never blocks. Each [`Workflow::step`] advances the current
//! state once and returns; states waiting on a job, a clock or a retry
//! backoff simply report that they are still running. Callers decide how
//! often to step, optionally using [`Workflow::wait_until`] as a hint.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use stepwise_dsl::{parse_definition, validate_definition, StateMachineDefinition};

use crate::branch::BranchProgress;
use crate::config::EngineConfig;
use crate::context::{Context, ExecutionInfo, ExecutionStatus, StateProgress};
use crate::error::{CoreError, ExecutionError};
use crate::graph::StateGraph;
use crate::job::{JobRunner, JobRunnerRegistry};
use crate::states::{Advance, State};

/// What a state advance needs besides the context
#[derive(Clone)]
pub(crate) struct StepEnv {
    pub(crate) runner: Arc<dyn JobRunner>,
    pub(crate) config: Arc<EngineConfig>,
}

impl Default for StepEnv {
    fn default() -> Self {
        StepEnv {
            runner: Arc::new(JobRunnerRegistry::new()),
            config: Arc::new(EngineConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Progressed,
    Blocked,
    Terminal,
}

/// A running instance of a state machine
pub struct Workflow {
    graph: Arc<StateGraph>,
    context: Context,
    env: StepEnv,
}

impl Workflow {
    /// Validate and compile `definition`, ready to run on `input`
    pub fn new(definition: &StateMachineDefinition, input: Value) -> Result<Self, CoreError> {
        validate_definition(definition)?;
        let graph = StateGraph::compile(definition)?;
        let execution = ExecutionInfo::new(input.clone());
        Ok(Self::child(Arc::new(graph), input, StepEnv::default(), execution))
    }

    /// Parse a JSON or YAML document and build a workflow from it
    pub fn from_document(text: &str, input: Value) -> Result<Self, CoreError> {
        let definition = parse_definition(text)?;
        Self::new(&definition, input)
    }

    pub(crate) fn child(graph: Arc<StateGraph>, input: Value, env: StepEnv, execution: ExecutionInfo) -> Self {
        Workflow {
            graph,
            context: Context::new(execution, input),
            env,
        }
    }

    /// Use `runner` for Task states, here and in every nested workflow
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.env.runner = runner;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.env.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.env.config
    }

    /// Enter the start state without advancing it. Stepping a pending
    /// workflow does this implicitly.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.context.status != ExecutionStatus::Pending {
            return Err(CoreError::WorkflowError(format!(
                "Workflow {} has already started",
                self.context.execution.id
            )));
        }

        self.context.start();
        let start_at = self.graph.start_at().to_string();
        let input = self.context.data.clone();
        self.enter(&start_at, input);
        tracing::info!(
            execution_id = %self.context.execution.id,
            state = %start_at,
            "Workflow started"
        );
        Ok(())
    }

    /// Advance the current state once and report the resulting status.
    /// Stepping a terminal workflow does nothing.
    pub fn step(&mut self) -> ExecutionStatus {
        self.step_once();
        self.context.status
    }

    /// Step until the workflow is terminal or every state is waiting on
    /// something outside the engine
    pub fn run_nonblock(&mut self) -> ExecutionStatus {
        while self.step_once() == StepOutcome::Progressed {}
        self.context.status
    }

    pub(crate) fn step_once(&mut self) -> StepOutcome {
        match self.context.status {
            ExecutionStatus::Pending => {
                if self.start().is_err() {
                    return StepOutcome::Terminal;
                }
            }
            ExecutionStatus::Running => {}
            _ => return StepOutcome::Terminal,
        }

        if let Some(max_steps) = self.env.config.max_steps {
            if self.context.steps >= max_steps {
                self.abort(format!("Exceeded the limit of {} steps", max_steps));
                return StepOutcome::Terminal;
            }
        }
        self.context.steps += 1;

        let graph = Arc::clone(&self.graph);
        let Some(name) = self.context.current_state.clone() else {
            self.abort("Workflow has no current state");
            return StepOutcome::Terminal;
        };
        let Some(state) = graph.state(&name) else {
            self.abort(format!("State {} is not defined", name));
            return StepOutcome::Terminal;
        };

        match state.advance(&name, &mut self.context, &self.env) {
            Ok(Advance::Blocked) => StepOutcome::Blocked,
            Ok(Advance::Progressed) => StepOutcome::Progressed,
            Ok(Advance::Completed { output, next }) => {
                self.transition(&name, output, next);
                if self.context.status.is_terminal() {
                    StepOutcome::Terminal
                } else {
                    StepOutcome::Progressed
                }
            }
            Err(err) => {
                self.fail(&name, err);
                StepOutcome::Terminal
            }
        }
    }

    fn enter(&mut self, name: &str, input: Value) {
        let retriers = self.graph.state(name).map_or(0, State::retrier_count);
        self.context.enter_state(name, input, retriers);
        tracing::info!(
            execution_id = %self.context.execution.id,
            state = %name,
            "Entered state"
        );
        if self.env.config.log_data {
            tracing::debug!(execution_id = %self.context.execution.id, state = %name, input = %self.context.data, "State input");
        }
    }

    fn transition(&mut self, name: &str, output: Value, next: Option<String>) {
        let execution_id = self.context.execution.id.clone();
        tracing::info!(
            execution_id = %execution_id,
            state = %name,
            next = next.as_deref().unwrap_or_default(),
            "State completed"
        );
        if self.env.config.log_data {
            tracing::debug!(execution_id = %execution_id, state = %name, output = %output, "State output");
        }

        self.context
            .complete_state(&output, next.as_deref(), self.env.config.record_history);

        match next {
            Some(next) => self.enter(&next, output),
            None => {
                self.context.succeed(output);
                tracing::info!(execution_id = %execution_id, steps = self.context.steps, "Workflow succeeded");
            }
        }
    }

    fn fail(&mut self, name: &str, err: ExecutionError) {
        tracing::error!(
            execution_id = %self.context.execution.id,
            state = %name,
            error = err.error_name().unwrap_or_default(),
            "Workflow failed: {}",
            err
        );
        self.context.fail(err, self.env.config.record_history);
    }

    /// Stop the workflow. Nested workflows are abandoned and a running job
    /// is handed back to its runner for cleanup.
    pub fn abort(&mut self, cause: impl Into<String>) {
        if self.context.status.is_terminal() {
            return;
        }
        let cause = cause.into();
        match &mut self.context.progress {
            StateProgress::Job { handle, .. } => self.env.runner.cleanup(handle),
            StateProgress::Branches(runner) => runner.abandon(&cause),
            _ => {}
        }

        tracing::warn!(
            execution_id = %self.context.execution.id,
            state = self.context.current_state.as_deref().unwrap_or_default(),
            "Workflow aborted: {}",
            cause
        );
        self.context.abort(cause);
    }

    pub fn status(&self) -> ExecutionStatus {
        self.context.status
    }

    pub fn is_terminal(&self) -> bool {
        self.context.status.is_terminal()
    }

    pub fn current_state_name(&self) -> Option<&str> {
        self.context.current_state()
    }

    /// Target of the last transition; `None` once the workflow has ended
    pub fn next_state_name(&self) -> Option<&str> {
        self.context.next_state()
    }

    pub fn current_state(&self) -> Option<&State> {
        self.current_state_name().and_then(|name| self.graph.state(name))
    }

    /// Final output on success, or the `{"Error", "Cause"}` payload on failure
    pub fn output(&self) -> Option<&Value> {
        self.context.output()
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        self.context.error()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Earliest instant at which stepping can make progress, when the
    /// workflow is waiting on a Wait state or a retry backoff. `None` when
    /// it is waiting on a job or is not waiting at all.
    pub fn wait_until(&self) -> Option<DateTime<Utc>> {
        if self.is_terminal() {
            return None;
        }
        let progress = match &self.context.progress {
            StateProgress::Waiting { until } => Some(*until),
            StateProgress::Branches(runner) => runner.wait_until(),
            _ => None,
        };
        [self.context.retry_not_before, progress].into_iter().flatten().min()
    }

    /// Counts for the Map or Parallel state being executed
    pub fn branch_progress(&self) -> Option<BranchProgress> {
        match &self.context.progress {
            StateProgress::Branches(runner) => Some(runner.progress()),
            _ => None,
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("execution_id", &self.context.execution.id)
            .field("status", &self.context.status)
            .field("current_state", &self.context.current_state)
            .field("steps", &self.context.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn workflow(document: &str, input: Value) -> Workflow {
        Workflow::from_document(document, input).unwrap()
    }

    const TWO_PASSES: &str = r#"{
        "StartAt": "First",
        "States": {
            "First": {"Type": "Pass", "Result": {"n": 1}, "ResultPath": "$.first", "Next": "Second"},
            "Second": {"Type": "Pass", "OutputPath": "$.first", "End": true}
        }
    }"#;

    #[test]
    fn test_first_step_enters_and_advances_start_state() {
        let mut wf = workflow(TWO_PASSES, json!({"x": 0}));
        assert_eq!(wf.status(), ExecutionStatus::Pending);
        assert_eq!(wf.current_state_name(), None);

        assert_eq!(wf.step(), ExecutionStatus::Running);
        assert_eq!(wf.current_state_name(), Some("Second"));
        assert_eq!(wf.next_state_name(), Some("Second"));
        assert_eq!(wf.context().data(), &json!({"x": 0, "first": {"n": 1}}));

        assert_eq!(wf.step(), ExecutionStatus::Succeeded);
        assert!(wf.is_terminal());
        assert_eq!(wf.next_state_name(), None);
        assert_eq!(wf.output(), Some(&json!({"n": 1})));
        assert_eq!(wf.context().history().len(), 2);
    }

    #[test]
    fn test_step_after_terminal_is_a_no_op() {
        let mut wf = workflow(TWO_PASSES, json!({}));
        assert_eq!(wf.run_nonblock(), ExecutionStatus::Succeeded);
        let steps = wf.context().steps();
        assert_eq!(wf.step(), ExecutionStatus::Succeeded);
        assert_eq!(wf.context().steps(), steps);
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let mut wf = workflow(TWO_PASSES, json!({}));
        wf.start().unwrap();
        assert_eq!(wf.current_state_name(), Some("First"));
        assert!(matches!(wf.start(), Err(CoreError::WorkflowError(_))));
    }

    #[test]
    fn test_invalid_definition_fails_construction() {
        let err = Workflow::from_document(
            r#"{"StartAt": "A", "States": {"A": {"Type": "Pass", "Next": "B"}}}"#,
            json!({}),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "States.A field \"Next\" value \"B\" is not found in \"States\""
        );
    }

    #[test]
    fn test_step_ceiling_aborts_cycles() {
        let mut wf = workflow(
            r#"{
                "StartAt": "Ping",
                "States": {
                    "Ping": {"Type": "Pass", "Next": "Pong"},
                    "Pong": {"Type": "Pass", "Next": "Ping"}
                }
            }"#,
            json!({}),
        )
        .with_config(EngineConfig {
            max_steps: Some(10),
            ..EngineConfig::default()
        });

        assert_eq!(wf.run_nonblock(), ExecutionStatus::Aborted);
        assert_eq!(wf.context().steps(), 10);
        assert_eq!(wf.context().abort_cause(), Some("Exceeded the limit of 10 steps"));
    }

    #[test]
    fn test_abort_is_terminal_and_final() {
        let mut wf = workflow(TWO_PASSES, json!({}));
        wf.step();
        wf.abort("operator request");
        assert_eq!(wf.status(), ExecutionStatus::Aborted);

        wf.abort("again");
        assert_eq!(wf.context().abort_cause(), Some("operator request"));
        assert_eq!(wf.step(), ExecutionStatus::Aborted);
    }

    #[test]
    fn test_history_can_be_disabled() {
        let mut wf = workflow(TWO_PASSES, json!({})).with_config(EngineConfig {
            record_history: false,
            ..EngineConfig::default()
        });
        wf.run_nonblock();
        assert!(wf.context().history().is_empty());
    }

    #[test]
    fn test_fail_state_fails_workflow() {
        let mut wf = workflow(
            r#"{
                "StartAt": "Stop",
                "States": {"Stop": {"Type": "Fail", "Error": "Custom.Stop", "Cause": "no"}}
            }"#,
            json!({}),
        );
        assert_eq!(wf.step(), ExecutionStatus::Failed);
        assert_eq!(wf.output(), Some(&json!({"Error": "Custom.Stop", "Cause": "no"})));
        assert_eq!(wf.error().and_then(ExecutionError::error_name), Some("Custom.Stop"));
    }

    #[test]
    fn test_workflow_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Workflow>();
    }
}
