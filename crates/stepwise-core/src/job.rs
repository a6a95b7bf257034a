//! The boundary between Task states and whatever actually runs their work.
//!
//! A [`JobRunner`] launches a job for a resource URI and is polled until the
//! job finishes. Runners never block; a Task state keeps its [`JobHandle`] in
//! the workflow context and polls it on every advance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque handle to a launched job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Runner-assigned identifier
    pub id: String,
    /// The resource URI the job was launched for
    pub resource: String,
    /// Anything else the runner needs to find the job again
    #[serde(default)]
    pub runner_data: Value,
}

impl JobHandle {
    pub fn new(id: impl Into<String>, resource: impl Into<String>) -> Self {
        JobHandle {
            id: id.into(),
            resource: resource.into(),
            runner_data: Value::Null,
        }
    }
}

/// Error reported by a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobFailure {
    /// Error name; `States.TaskFailed` when absent
    pub error: Option<String>,
    pub cause: Option<String>,
}

impl JobFailure {
    pub fn new(error: impl Into<String>, cause: impl Into<String>) -> Self {
        JobFailure {
            error: Some(error.into()),
            cause: Some(cause.into()),
        }
    }
}

/// Status of a job as reported by its runner
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    NotStarted,
    Running,
    Succeeded(Value),
    Failed(JobFailure),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_) | JobStatus::Failed(_))
    }
}

/// Errors raised while launching a job
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// No runner handles the resource's scheme
    #[error("No job runner registered for resource \"{0}\"")]
    UnsupportedResource(String),

    /// The runner could not start the job
    #[error("Failed to launch job for \"{resource}\": {message}")]
    LaunchFailed { resource: String, message: String },
}

/// Something that can run the unit of work behind a Task state
pub trait JobRunner: Send + Sync {
    /// Start a job. `credentials` is `Value::Null` when the state has none.
    fn launch(&self, resource: &str, input: &Value, credentials: &Value) -> Result<JobHandle, JobError>;

    /// Report the job's status without blocking
    fn poll(&self, handle: &JobHandle) -> JobStatus;

    /// Release whatever the job holds once it is finished or abandoned
    fn cleanup(&self, _handle: &JobHandle) {}
}

/// Dispatches jobs to runners by resource scheme (`docker://…`, `awx://…`)
#[derive(Default, Clone)]
pub struct JobRunnerRegistry {
    runners: HashMap<String, Arc<dyn JobRunner>>,
}

impl JobRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner for a scheme, without the `://` suffix
    pub fn register(&mut self, scheme: impl Into<String>, runner: Arc<dyn JobRunner>) -> &mut Self {
        self.runners.insert(scheme.into(), runner);
        self
    }

    pub fn with_runner(mut self, scheme: impl Into<String>, runner: Arc<dyn JobRunner>) -> Self {
        self.register(scheme, runner);
        self
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.runners.keys().map(String::as_str)
    }

    fn runner_for(&self, resource: &str) -> Option<&Arc<dyn JobRunner>> {
        scheme_of(resource).and_then(|scheme| self.runners.get(scheme))
    }
}

/// The scheme of a resource URI, e.g. `docker` for `docker://image:tag`
pub fn scheme_of(resource: &str) -> Option<&str> {
    resource.split_once("://").map(|(scheme, _)| scheme)
}

impl fmt::Debug for JobRunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&str> = self.schemes().collect();
        schemes.sort_unstable();
        f.debug_struct("JobRunnerRegistry").field("schemes", &schemes).finish()
    }
}

impl JobRunner for JobRunnerRegistry {
    fn launch(&self, resource: &str, input: &Value, credentials: &Value) -> Result<JobHandle, JobError> {
        let runner = self
            .runner_for(resource)
            .ok_or_else(|| JobError::UnsupportedResource(resource.to_string()))?;
        runner.launch(resource, input, credentials)
    }

    fn poll(&self, handle: &JobHandle) -> JobStatus {
        match self.runner_for(&handle.resource) {
            Some(runner) => runner.poll(handle),
            None => JobStatus::Failed(JobFailure::new(
                "States.TaskFailed",
                format!("No job runner registered for resource \"{}\"", handle.resource),
            )),
        }
    }

    fn cleanup(&self, handle: &JobHandle) {
        if let Some(runner) = self.runner_for(&handle.resource) {
            runner.cleanup(handle);
        }
    }
}
