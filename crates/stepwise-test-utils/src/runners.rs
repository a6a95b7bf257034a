//! In-memory job runner driven by per-resource scripts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use stepwise_core::{error_names, JobError, JobFailure, JobHandle, JobRunner, JobStatus};
use uuid::Uuid;

/// What a scripted job does once launched
#[derive(Debug, Clone, PartialEq)]
pub enum JobScript {
    /// Report running `polls` times, then succeed with `output`, or with the
    /// job input when `output` is `None`
    Succeed { polls: u32, output: Option<Value> },
    /// Report running `polls` times, then fail
    Fail {
        polls: u32,
        error: Option<String>,
        cause: Option<String>,
    },
    /// Never finish
    Hang,
    /// Refuse to launch
    RejectLaunch(String),
}

impl JobScript {
    /// Succeed at once, returning the job input
    pub fn echo() -> Self {
        JobScript::Succeed { polls: 0, output: None }
    }

    pub fn succeed(output: Value) -> Self {
        JobScript::Succeed {
            polls: 0,
            output: Some(output),
        }
    }

    pub fn fail(error: &str, cause: &str) -> Self {
        JobScript::Fail {
            polls: 0,
            error: Some(error.to_string()),
            cause: Some(cause.to_string()),
        }
    }

    /// Report running for `count` polls before finishing
    pub fn after_polls(self, count: u32) -> Self {
        match self {
            JobScript::Succeed { output, .. } => JobScript::Succeed { polls: count, output },
            JobScript::Fail { error, cause, .. } => JobScript::Fail {
                polls: count,
                error,
                cause,
            },
            other => other,
        }
    }
}

/// One call to [`JobRunner::launch`]
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub job_id: String,
    pub resource: String,
    pub input: Value,
    pub credentials: Value,
}

#[derive(Debug)]
struct ScriptedJob {
    script: JobScript,
    polls_left: u32,
    input: Value,
}

/// A [`JobRunner`] whose jobs follow scripts queued per resource.
///
/// Each launch takes the next script queued for its resource; when the queue
/// is empty the job echoes its input.
#[derive(Debug, Default)]
pub struct ScriptedJobRunner {
    scripts: Mutex<HashMap<String, VecDeque<JobScript>>>,
    jobs: DashMap<String, ScriptedJob>,
    launches: Mutex<Vec<LaunchRecord>>,
    cleaned: Mutex<Vec<String>>,
    peak_running: AtomicUsize,
}

impl ScriptedJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next launch of `resource`
    pub fn script(&self, resource: &str, script: JobScript) -> &Self {
        self.scripts
            .lock()
            .entry(resource.to_string())
            .or_default()
            .push_back(script);
        self
    }

    pub fn with_script(self, resource: &str, script: JobScript) -> Self {
        self.script(resource, script);
        self
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }

    pub fn launch_count(&self, resource: &str) -> usize {
        self.launches
            .lock()
            .iter()
            .filter(|launch| launch.resource == resource)
            .count()
    }

    /// Ids of jobs that were cleaned up, in order
    pub fn cleaned_up(&self) -> Vec<String> {
        self.cleaned.lock().clone()
    }

    /// Jobs launched and not yet cleaned up
    pub fn running_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Most jobs that were ever running at the same time
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    fn next_script(&self, resource: &str) -> JobScript {
        self.scripts
            .lock()
            .get_mut(resource)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(JobScript::echo)
    }
}

impl JobRunner for ScriptedJobRunner {
    fn launch(&self, resource: &str, input: &Value, credentials: &Value) -> Result<JobHandle, JobError> {
        let script = self.next_script(resource);
        if let JobScript::RejectLaunch(message) = &script {
            return Err(JobError::LaunchFailed {
                resource: resource.to_string(),
                message: message.clone(),
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let polls_left = match &script {
            JobScript::Succeed { polls, .. } | JobScript::Fail { polls, .. } => *polls,
            _ => 0,
        };
        self.jobs.insert(
            job_id.clone(),
            ScriptedJob {
                script,
                polls_left,
                input: input.clone(),
            },
        );
        self.peak_running.fetch_max(self.jobs.len(), Ordering::SeqCst);

        self.launches.lock().push(LaunchRecord {
            job_id: job_id.clone(),
            resource: resource.to_string(),
            input: input.clone(),
            credentials: credentials.clone(),
        });
        tracing::debug!(job_id = %job_id, resource = %resource, "Scripted job launched");

        Ok(JobHandle::new(job_id, resource))
    }

    fn poll(&self, handle: &JobHandle) -> JobStatus {
        let Some(mut job) = self.jobs.get_mut(&handle.id) else {
            return JobStatus::Failed(JobFailure::new(
                error_names::TASK_FAILED,
                format!("Unknown job {}", handle.id),
            ));
        };

        if matches!(job.script, JobScript::Hang) {
            return JobStatus::Running;
        }
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return JobStatus::Running;
        }

        match &job.script {
            JobScript::Succeed { output, .. } => {
                JobStatus::Succeeded(output.clone().unwrap_or_else(|| job.input.clone()))
            }
            JobScript::Fail { error, cause, .. } => JobStatus::Failed(JobFailure {
                error: error.clone(),
                cause: cause.clone(),
            }),
            JobScript::Hang | JobScript::RejectLaunch(_) => JobStatus::Running,
        }
    }

    fn cleanup(&self, handle: &JobHandle) {
        if self.jobs.remove(&handle.id).is_some() {
            self.cleaned.lock().push(handle.id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_echo_by_default() {
        let runner = ScriptedJobRunner::new();
        let handle = runner.launch("docker://echo", &json!({"a": 1}), &Value::Null).unwrap();
        assert_eq!(runner.poll(&handle), JobStatus::Succeeded(json!({"a": 1})));
        runner.cleanup(&handle);
        assert_eq!(runner.cleaned_up(), vec![handle.id]);
        assert_eq!(runner.running_jobs(), 0);
    }

    #[test]
    fn test_scripts_are_consumed_in_launch_order() {
        let runner = ScriptedJobRunner::new()
            .with_script("docker://work", JobScript::succeed(json!("first")).after_polls(1))
            .with_script("docker://work", JobScript::fail("Custom.Error", "broken"));

        let first = runner.launch("docker://work", &json!({}), &Value::Null).unwrap();
        let second = runner.launch("docker://work", &json!({}), &Value::Null).unwrap();
        assert_eq!(runner.peak_running(), 2);

        assert_eq!(runner.poll(&first), JobStatus::Running);
        assert_eq!(runner.poll(&first), JobStatus::Succeeded(json!("first")));
        assert_eq!(
            runner.poll(&second),
            JobStatus::Failed(JobFailure::new("Custom.Error", "broken"))
        );
        assert_eq!(runner.launch_count("docker://work"), 2);
    }

    #[test]
    fn test_rejected_launch() {
        let runner = ScriptedJobRunner::new()
            .with_script("docker://bad", JobScript::RejectLaunch("no such image".to_string()));
        let err = runner.launch("docker://bad", &json!({}), &Value::Null).unwrap_err();
        assert!(matches!(err, JobError::LaunchFailed { .. }));
        assert!(runner.launches().is_empty());
    }
}
