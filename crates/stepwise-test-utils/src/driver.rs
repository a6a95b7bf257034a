//! Loops that drive a workflow to completion.

use std::time::Duration;

use chrono::Utc;
use stepwise_core::{ExecutionStatus, Workflow};

/// Step until the workflow is terminal or `max_steps` steps were taken
pub fn run_until_terminal(workflow: &mut Workflow, max_steps: usize) -> ExecutionStatus {
    for _ in 0..max_steps {
        if workflow.is_terminal() {
            break;
        }
        workflow.step();
    }
    workflow.status()
}

/// Drive a workflow from an async task, sleeping between rounds.
///
/// Each round runs the workflow until it blocks, then sleeps until its
/// [`wait_until`](Workflow::wait_until) hint, or for `poll_interval` when it
/// is waiting on a job. Gives up after `timeout`.
pub async fn drive(workflow: &mut Workflow, poll_interval: Duration, timeout: Duration) -> ExecutionStatus {
    let started = tokio::time::Instant::now();
    loop {
        let status = workflow.run_nonblock();
        let elapsed = started.elapsed();
        if status.is_terminal() || elapsed >= timeout {
            return status;
        }

        let pause = workflow
            .wait_until()
            .map(|until| (until - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(poll_interval);
        tracing::trace!(pause_ms = pause.as_millis() as u64, "Workflow blocked");
        tokio::time::sleep(pause.min(timeout - elapsed)).await;
    }
}
