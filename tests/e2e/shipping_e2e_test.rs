//! End-to-end run of a shipping manifest check: a Map state validates every
//! shipped line, first with a pass-through processor, then with jobs.

use std::sync::Arc;

use serde_json::{json, Value};
use stepwise_core::{ExecutionStatus, JobRunnerRegistry};
use stepwise_e2e_tests::utils::{run_document, succeeded_output};
use stepwise_test_utils::{JobScript, ScriptedJobRunner};

const SHIPPING_DOCUMENT: &str = r#"{
  "Comment": "Validate every shipped line",
  "StartAt": "Validate-All",
  "States": {
    "Validate-All": {
      "Type": "Map",
      "InputPath": "$.detail",
      "ItemsPath": "$.shipped",
      "MaxConcurrency": 0,
      "ItemProcessor": {
        "StartAt": "Validate",
        "States": {
          "Validate": {
            "Type": "Pass",
            "OutputPath": "$.Payload",
            "End": true
          }
        }
      },
      "ResultPath": "$.detail.result",
      "End": true
    }
  }
}"#;

const CHECKED_SHIPPING_DOCUMENT: &str = r#"
StartAt: Check-All
States:
  Check-All:
    Type: Map
    ItemsPath: $.detail.shipped
    MaxConcurrency: 2
    ItemSelector:
      line.$: $$.Map.Item.Index
      prod.$: $$.Map.Item.Value.prod
      quantity.$: $$.Map.Item.Value.quantity
    ItemProcessor:
      StartAt: Check
      States:
        Check:
          Type: Task
          Resource: docker://stock-check:1.2
          ResultSelector:
            line.$: $.line
            prod.$: $.prod
          Retry:
            - ErrorEquals: [Stock.Unavailable]
              IntervalSeconds: 0
              MaxAttempts: 2
          End: true
    ResultPath: $.checks
    Next: Summarize
  Summarize:
    Type: Pass
    Parameters:
      partner.$: $.detail.delivery-partner
      lines.$: States.ArrayLength($.checks)
      checks.$: $.checks
    End: true
"#;

fn shipment() -> Value {
    json!({
        "ship-date": "2016-03-14T01:59:00Z",
        "detail": {
            "delivery-partner": "UQS",
            "shipped": [
                {"prod": "R31", "dest-code": 9511, "quantity": 1344},
                {"prod": "S39", "dest-code": 9511, "quantity": 40},
                {"prod": "R31", "dest-code": 9833, "quantity": 12},
                {"prod": "R40", "dest-code": 9860, "quantity": 887},
                {"prod": "R40", "dest-code": 9511, "quantity": 1220}
            ]
        }
    })
}

#[tokio::test]
async fn test_shipping_manifest_pass_through() -> anyhow::Result<()> {
    let input = shipment();
    let workflow = run_document(SHIPPING_DOCUMENT, input.clone(), Arc::new(JobRunnerRegistry::new())).await?;

    let output = succeeded_output(&workflow)?;
    assert_eq!(output["detail"]["result"], input["detail"]["shipped"]);
    assert_eq!(workflow.next_state_name(), None);
    assert_eq!(workflow.context().history().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_shipping_manifest_checked_by_jobs() -> anyhow::Result<()> {
    let stock = Arc::new(
        ScriptedJobRunner::new()
            .with_script("docker://stock-check:1.2", JobScript::echo().after_polls(2))
            .with_script("docker://stock-check:1.2", JobScript::fail("Stock.Unavailable", "recount in progress")),
    );
    for polls in [1, 3, 0, 0] {
        stock.script("docker://stock-check:1.2", JobScript::echo().after_polls(polls));
    }
    let registry = JobRunnerRegistry::new().with_runner("docker", stock.clone());

    let workflow = run_document(CHECKED_SHIPPING_DOCUMENT, shipment(), Arc::new(registry)).await?;
    let output = succeeded_output(&workflow)?;

    assert_eq!(output["partner"], json!("UQS"));
    assert_eq!(output["lines"], json!(5));
    let lines: Vec<&Value> = output["checks"]
        .as_array()
        .map(|checks| checks.iter().map(|check| &check["line"]).collect())
        .unwrap_or_default();
    assert_eq!(lines, vec![&json!(0), &json!(1), &json!(2), &json!(3), &json!(4)]);

    assert_eq!(output["checks"][3], json!({"line": 3, "prod": "R40"}));

    // the second line was refused once and retried
    let launches = stock.launches();
    assert_eq!(launches.len(), 6);
    assert_eq!(launches[1].input, json!({"line": 1, "prod": "S39", "quantity": 40}));
    assert!(stock.peak_running() <= 2);
    assert_eq!(stock.running_jobs(), 0);
    Ok(())
}

#[tokio::test]
async fn test_shipping_manifest_without_lines_fails() -> anyhow::Result<()> {
    let workflow = run_document(
        SHIPPING_DOCUMENT,
        json!({"detail": {"shipped": {"prod": "R31"}}}),
        Arc::new(JobRunnerRegistry::new()),
    )
    .await?;

    assert_eq!(workflow.status(), ExecutionStatus::Failed);
    assert_eq!(workflow.output().map(|payload| &payload["Error"]), Some(&json!("States.Runtime")));
    Ok(())
}
