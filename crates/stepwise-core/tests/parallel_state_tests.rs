use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use stepwise_core::ExecutionStatus;
use stepwise_test_utils::{make_workflow, run_until_terminal, JobScript, ScriptedJobRunner};

fn branch(start_at: &str, states: Value) -> Value {
    json!({"StartAt": start_at, "States": states})
}

fn fan_out(branches: Vec<Value>, extra: Value) -> Value {
    let mut fan = json!({"Type": "Parallel", "Branches": branches});
    if let (Some(fan), Some(extra)) = (fan.as_object_mut(), extra.as_object()) {
        fan.extend(extra.clone());
    }
    fan
}

#[test]
fn test_results_follow_branch_order() {
    let runner = Arc::new(
        ScriptedJobRunner::new().with_script("docker://slow", JobScript::succeed(json!("slow")).after_polls(3)),
    );
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![
                    branch("Slow", json!({"Slow": {"Type": "Task", "Resource": "docker://slow", "End": true}})),
                    branch("Fast", json!({"Fast": {"Type": "Pass", "Result": "fast", "End": true}})),
                ],
                json!({"ResultPath": "$.results", "End": true}),
            )
        }),
        json!({"id": 1}),
    )
    .with_runner(runner);

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Running);
    let progress = workflow.branch_progress().unwrap();
    assert_eq!((progress.completed, progress.in_flight), (1, 1));

    assert_eq!(run_until_terminal(&mut workflow, 10), ExecutionStatus::Succeeded);
    assert_eq!(workflow.output(), Some(&json!({"id": 1, "results": ["slow", "fast"]})));
}

#[test]
fn test_branches_share_effective_input() {
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![
                    branch("Name", json!({"Name": {"Type": "Pass", "OutputPath": "$.name", "End": true}})),
                    branch("Check", json!({
                        "Check": {
                            "Type": "Choice",
                            "Choices": [{"Variable": "$.age", "NumericGreaterThanEquals": 18, "Next": "Adult"}],
                            "Default": "Minor"
                        },
                        "Adult": {"Type": "Pass", "Result": "adult", "End": true},
                        "Minor": {"Type": "Pass", "Result": "minor", "End": true}
                    })),
                ],
                json!({
                    "InputPath": "$.person",
                    "Parameters": {"name.$": "$.first", "age.$": "$.age"},
                    "End": true
                }),
            )
        }),
        json!({"person": {"first": "Ada", "age": 36}}),
    );

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Succeeded);
    assert_eq!(workflow.output(), Some(&json!(["Ada", "adult"])));
}

#[test]
fn test_failed_branch_fails_state_and_aborts_siblings() {
    let runner = Arc::new(ScriptedJobRunner::new().with_script("docker://hang", JobScript::Hang));
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![
                    branch("Hang", json!({"Hang": {"Type": "Task", "Resource": "docker://hang", "End": true}})),
                    branch("Broken", json!({"Broken": {"Type": "Fail", "Error": "Branch.Bad", "Cause": "no good"}})),
                ],
                json!({"End": true}),
            )
        }),
        json!({}),
    )
    .with_runner(runner.clone());

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Failed);
    assert_eq!(workflow.output(), Some(&json!({"Error": "Branch.Bad", "Cause": "no good"})));
    assert_eq!(runner.launch_count("docker://hang"), 1);
    assert_eq!(runner.running_jobs(), 0);
}

#[test]
fn test_unnamed_branch_failure() {
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![branch("Broken", json!({"Broken": {"Type": "Fail"}}))],
                json!({"End": true}),
            )
        }),
        json!({}),
    );

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Failed);
    assert_eq!(
        workflow.error().and_then(|err| err.error_name()),
        Some("States.BranchFailed")
    );
}

#[test]
fn test_branch_failure_caught() {
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![branch("Broken", json!({"Broken": {"Type": "Fail", "Error": "Branch.Bad", "Cause": "no good"}}))],
                json!({
                    "Catch": [{"ErrorEquals": ["Branch.Bad"], "ResultPath": "$.failure", "Next": "Handle"}],
                    "Next": "Done"
                }),
            ),
            "Handle": {"Type": "Pass", "End": true},
            "Done": {"Type": "Succeed"}
        }),
        json!({"order": 9}),
    );

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Succeeded);
    assert_eq!(workflow.current_state_name(), Some("Handle"));
    assert_eq!(
        workflow.output(),
        Some(&json!({"order": 9, "failure": {"Error": "Branch.Bad", "Cause": "no good"}}))
    );
}

#[test]
fn test_parallel_retry_restarts_every_branch() {
    let runner = Arc::new(
        ScriptedJobRunner::new()
            .with_script("docker://flaky", JobScript::fail("Job.Flaky", "try again"))
            .with_script("docker://flaky", JobScript::succeed(json!("ok"))),
    );
    let mut workflow = make_workflow(
        json!({
            "Fan": fan_out(
                vec![
                    branch("Flaky", json!({"Flaky": {"Type": "Task", "Resource": "docker://flaky", "End": true}})),
                    branch("Steady", json!({"Steady": {"Type": "Task", "Resource": "docker://steady", "End": true}})),
                ],
                json!({
                    "Retry": [{"ErrorEquals": ["States.ALL"], "IntervalSeconds": 0, "MaxAttempts": 1}],
                    "End": true
                }),
            )
        }),
        json!("payload"),
    )
    .with_runner(runner.clone());

    assert_eq!(run_until_terminal(&mut workflow, 10), ExecutionStatus::Succeeded);
    assert_eq!(workflow.output(), Some(&json!(["ok", "payload"])));
    assert_eq!(runner.launch_count("docker://flaky"), 2);
    // the first attempt failed before the second branch was stepped
    assert_eq!(runner.launch_count("docker://steady"), 1);
}

#[test]
fn test_abort_reaches_nested_jobs() {
    let runner = Arc::new(
        ScriptedJobRunner::new()
            .with_script("docker://hang", JobScript::Hang)
            .with_script("docker://hang", JobScript::Hang),
    );
    let hanging = branch("Hang", json!({"Hang": {"Type": "Task", "Resource": "docker://hang", "End": true}}));
    let mut workflow = make_workflow(
        json!({"Fan": fan_out(vec![hanging.clone(), hanging], json!({"End": true}))}),
        json!({}),
    )
    .with_runner(runner.clone());

    assert_eq!(workflow.run_nonblock(), ExecutionStatus::Running);
    assert_eq!(runner.running_jobs(), 2);

    workflow.abort("shutting down");
    assert_eq!(workflow.status(), ExecutionStatus::Aborted);
    assert_eq!(runner.running_jobs(), 0);
    assert_eq!(workflow.branch_progress(), None);
}
