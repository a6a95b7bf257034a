//! Mock implementation of the JobRunner trait.

use mockall::mock;
use serde_json::Value;
use stepwise_core::{JobError, JobHandle, JobRunner, JobStatus};

// Generate the mock implementation for JobRunner
mock! {
    pub JobRunner {}

    impl JobRunner for JobRunner {
        fn launch(&self, resource: &str, input: &Value, credentials: &Value) -> Result<JobHandle, JobError>;
        fn poll(&self, handle: &JobHandle) -> JobStatus;
        fn cleanup(&self, handle: &JobHandle);
    }
}

/// Creates a mock runner whose jobs succeed on the first poll with `output`.
pub fn create_mock_job_runner(output: Value) -> MockJobRunner {
    let mut mock = MockJobRunner::new();

    mock.expect_launch()
        .returning(|resource, _, _| Ok(JobHandle::new("mock-job", resource)));
    mock.expect_poll()
        .returning(move |_| JobStatus::Succeeded(output.clone()));
    mock.expect_cleanup().return_const(());

    mock
}
