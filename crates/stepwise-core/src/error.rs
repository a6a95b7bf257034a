use serde_json::{json, Map, Value};
use stepwise_dsl::DslError;
use thiserror::Error;

/// Error names raised by the runtime itself
pub mod error_names {
    /// Matches every error in a retrier or catcher
    pub const ALL: &str = "States.ALL";
    /// A path or data-shape error outside a specific pipeline stage
    pub const RUNTIME: &str = "States.Runtime";
    /// A `.$` entry of `Parameters`, `ItemSelector` or `ResultSelector` did not resolve
    pub const PARAMETER_PATH_FAILURE: &str = "States.ParameterPathFailure";
    /// `ResultPath` could not be applied to the state's input
    pub const RESULT_PATH_MATCH_FAILURE: &str = "States.ResultPathMatchFailure";
    /// A job failed without naming its error
    pub const TASK_FAILED: &str = "States.TaskFailed";
    /// A job outlived the state's `TimeoutSeconds`
    pub const TIMEOUT: &str = "States.Timeout";
    /// No choice rule matched and the state has no `Default`
    pub const NO_CHOICE_MATCHED: &str = "States.NoChoiceMatched";
    /// More Map items failed than the state tolerates
    pub const EXCEED_TOLERATED_FAILURE_THRESHOLD: &str = "States.ExceedToleratedFailureThreshold";
    /// An intrinsic function failed
    pub const INTRINSIC_FAILURE: &str = "States.IntrinsicFailure";
    /// A nested workflow was aborted
    pub const BRANCH_ABORTED: &str = "States.BranchAborted";
    /// A nested workflow failed with an error that has no name
    pub const BRANCH_FAILED: &str = "States.BranchFailed";
}

/// Errors raised while building a workflow or its configuration
#[derive(Error, Debug)]
pub enum CoreError {
    /// The document failed to parse or validate
    #[error("{0}")]
    InvalidSpecification(#[from] DslError),

    /// A path or intrinsic expression passed validation but cannot be compiled
    #[error("States.{state}: {message}")]
    InvalidExpression { state: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An operation that is not allowed in the workflow's current status
    #[error("Workflow error: {0}")]
    WorkflowError(String),
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ConfigurationError(err.to_string())
    }
}

/// A path that could not be evaluated or applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

impl PathError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        PathError {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A failure raised while a workflow runs.
///
/// Every variant carries an error name (what `ErrorEquals` matches against)
/// and an optional cause, rendered together as the `{"Error", "Cause"}` payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// A path did not resolve, named after the pipeline stage that failed
    #[error("{cause}")]
    PathEvaluation { error: &'static str, cause: String },

    /// The job of a Task state failed
    #[error("{}", .cause.as_deref().unwrap_or(.error.as_str()))]
    JobFailure { error: String, cause: Option<String> },

    /// The job of a Task state ran past `TimeoutSeconds`
    #[error("{0}")]
    Timeout(String),

    /// A Choice state found no matching rule and has no `Default`
    #[error("No Choice matched in state {0}")]
    NoChoiceMatched(String),

    /// A nested workflow of a Map or Parallel state failed
    #[error("{cause}")]
    CompositeFailure { error: String, cause: String },

    /// A Fail state
    #[error("{}", .cause.as_deref().or(.error.as_deref()).unwrap_or("Fail state reached"))]
    Declared { error: Option<String>, cause: Option<String> },

    /// An intrinsic function failed
    #[error("{0}")]
    Intrinsic(String),
}

impl ExecutionError {
    /// A path failure in the given pipeline stage
    pub fn path(stage: &'static str, err: PathError) -> Self {
        ExecutionError::PathEvaluation {
            error: stage,
            cause: err.message,
        }
    }

    /// The name retriers and catchers match against
    pub fn error_name(&self) -> Option<&str> {
        match self {
            ExecutionError::PathEvaluation { error, .. } => Some(error),
            ExecutionError::JobFailure { error, .. } => Some(error),
            ExecutionError::Timeout(_) => Some(error_names::TIMEOUT),
            ExecutionError::NoChoiceMatched(_) => Some(error_names::NO_CHOICE_MATCHED),
            ExecutionError::CompositeFailure { error, .. } => Some(error),
            ExecutionError::Declared { error, .. } => error.as_deref(),
            ExecutionError::Intrinsic(_) => Some(error_names::INTRINSIC_FAILURE),
        }
    }

    pub fn cause(&self) -> Option<String> {
        match self {
            ExecutionError::JobFailure { cause, .. } => cause.clone(),
            ExecutionError::Declared { cause, .. } => cause.clone(),
            other => Some(other.to_string()),
        }
    }

    /// Render the `{"Error", "Cause"}` payload catchers merge into the state input
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        if let Some(name) = self.error_name() {
            payload.insert("Error".to_string(), json!(name));
        }
        if let Some(cause) = self.cause() {
            payload.insert("Cause".to_string(), json!(cause));
        }
        Value::Object(payload)
    }
}
