// Stepwise E2E Tests
//
// End-to-end runs of complete state machine documents

/// Shared infrastructure for the end-to-end tests
pub mod utils {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{bail, Context as _};
    use serde_json::Value;
    use stepwise_core::{ExecutionStatus, JobRunner, Workflow};
    use stepwise_test_utils::drive;

    /// Maximum time to wait for a workflow to finish
    pub const WORKFLOW_TIMEOUT_MS: u64 = 5000;

    /// Delay between rounds while a workflow waits on jobs
    pub const POLL_INTERVAL_MS: u64 = 5;

    /// Build a workflow from a JSON or YAML document and drive it until it stops
    pub async fn run_document(text: &str, input: Value, runner: Arc<dyn JobRunner>) -> anyhow::Result<Workflow> {
        let mut workflow = Workflow::from_document(text, input)
            .context("state machine document should be valid")?
            .with_runner(runner);

        let status = drive(
            &mut workflow,
            Duration::from_millis(POLL_INTERVAL_MS),
            Duration::from_millis(WORKFLOW_TIMEOUT_MS),
        )
        .await;

        if !status.is_terminal() {
            bail!(
                "workflow still {} in state {:?} after {}ms",
                status,
                workflow.current_state_name(),
                WORKFLOW_TIMEOUT_MS
            );
        }
        Ok(workflow)
    }

    /// Output of a workflow that must have succeeded
    pub fn succeeded_output(workflow: &Workflow) -> anyhow::Result<Value> {
        if workflow.status() != ExecutionStatus::Succeeded {
            bail!("workflow {}: {:?}", workflow.status(), workflow.output());
        }
        workflow.output().cloned().context("succeeded workflow has no output")
    }
}
