//! Mutable execution record of one workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

use crate::branch::BranchRunner;
use crate::error::ExecutionError;
use crate::job::JobHandle;

/// Execution status. Only ever advances:
/// `Pending` → `Running` → one of `Succeeded`, `Failed`, `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Aborted
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Aborted => "aborted",
        };
        f.write_str(text)
    }
}

/// Facts about the whole execution, shared by nested workflows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub id: String,
    pub input: Value,
    pub started_at: Option<DateTime<Utc>>,
}

impl ExecutionInfo {
    pub fn new(input: Value) -> Self {
        ExecutionInfo {
            id: Uuid::new_v4().to_string(),
            input,
            started_at: None,
        }
    }
}

/// One completed (or failed) state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    pub output: Option<Value>,
    pub error: Option<Value>,
}

/// What the current state is doing between advances
#[derive(Debug, Default)]
pub enum StateProgress {
    #[default]
    Idle,
    Job {
        handle: JobHandle,
        launched_at: DateTime<Utc>,
    },
    Waiting {
        until: DateTime<Utc>,
    },
    Branches(Box<BranchRunner>),
}

/// Execution record: status, current state, data document and history,
/// plus the progress of the state being executed.
#[derive(Debug)]
pub struct Context {
    pub(crate) execution: ExecutionInfo,
    pub(crate) status: ExecutionStatus,
    pub(crate) current_state: Option<String>,
    pub(crate) next_state: Option<String>,
    pub(crate) entered_at: Option<DateTime<Utc>>,
    /// Input of the current state; the output of the previous one
    pub(crate) data: Value,
    pub(crate) output: Option<Value>,
    pub(crate) error: Option<ExecutionError>,
    pub(crate) abort_cause: Option<String>,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) progress: StateProgress,
    /// Attempts used per retrier of the current state
    pub(crate) retry_attempts: Vec<u32>,
    pub(crate) retry_count: u32,
    pub(crate) retry_not_before: Option<DateTime<Utc>>,
    pub(crate) steps: u64,
}

impl Context {
    pub fn new(execution: ExecutionInfo, input: Value) -> Self {
        Context {
            execution,
            status: ExecutionStatus::Pending,
            current_state: None,
            next_state: None,
            entered_at: None,
            data: input,
            output: None,
            error: None,
            abort_cause: None,
            history: Vec::new(),
            progress: StateProgress::Idle,
            retry_attempts: Vec::new(),
            retry_count: 0,
            retry_not_before: None,
            steps: 0,
        }
    }

    pub fn execution(&self) -> &ExecutionInfo {
        &self.execution
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    /// Target of the last transition; `None` once a state ended the workflow
    pub fn next_state(&self) -> Option<&str> {
        self.next_state.as_deref()
    }

    /// Input document of the current state
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        self.error.as_ref()
    }

    pub fn abort_cause(&self) -> Option<&str> {
        self.abort_cause.as_deref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Retries taken by the current state so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn progress(&self) -> &StateProgress {
        &self.progress
    }

    /// The `$$` context object
    pub fn context_object(&self) -> Value {
        json!({
            "Execution": {
                "Id": self.execution.id,
                "Input": self.execution.input,
                "StartTime": self.execution.started_at.map(|t| t.to_rfc3339()),
            },
            "State": {
                "Name": self.current_state,
                "EnteredTime": self.entered_at.map(|t| t.to_rfc3339()),
                "RetryCount": self.retry_count,
            },
        })
    }


    pub(crate) fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        if self.execution.started_at.is_none() {
            self.execution.started_at = Some(Utc::now());
        }
    }

    /// Make `name` the current state, with `data` as its input
    pub(crate) fn enter_state(&mut self, name: &str, data: Value, retriers: usize) {
        self.current_state = Some(name.to_string());
        self.entered_at = Some(Utc::now());
        self.data = data;
        self.progress = StateProgress::Idle;
        self.retry_attempts = vec![0; retriers];
        self.retry_count = 0;
        self.retry_not_before = None;
    }

    /// Record the current state's output and the transition it chose
    pub(crate) fn complete_state(&mut self, output: &Value, next: Option<&str>, record_history: bool) {
        self.progress = StateProgress::Idle;
        self.next_state = next.map(str::to_string);
        if record_history {
            self.push_history(Some(output.clone()), None);
        }
    }

    pub(crate) fn succeed(&mut self, output: Value) {
        self.status = ExecutionStatus::Succeeded;
        self.output = Some(output);
    }

    pub(crate) fn fail(&mut self, error: ExecutionError, record_history: bool) {
        let payload = error.to_payload();
        self.progress = StateProgress::Idle;
        self.next_state = None;
        if record_history {
            self.push_history(None, Some(payload.clone()));
        }
        self.status = ExecutionStatus::Failed;
        self.output = Some(payload);
        self.error = Some(error);
    }

    pub(crate) fn abort(&mut self, cause: String) {
        self.progress = StateProgress::Idle;
        self.next_state = None;
        self.status = ExecutionStatus::Aborted;
        self.abort_cause = Some(cause);
    }

    fn push_history(&mut self, output: Option<Value>, error: Option<Value>) {
        let Some(state) = self.current_state.clone() else { return };
        let now = Utc::now();
        self.history.push(HistoryEntry {
            state,
            entered_at: self.entered_at.unwrap_or(now),
            exited_at: now,
            output,
            error,
        });
    }
}

/// Set `Map.Item` on a context object built by [`Context::context_object`].
/// A Map state builds the object once and moves each item through it.
pub fn set_map_item(context_object: &mut Value, index: usize, value: Value) {
    context_object["Map"] = json!({"Item": {"Index": index, "Value": value}});
}
