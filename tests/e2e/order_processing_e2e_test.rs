//! End-to-end test for an order processing workflow that:
//! 1. Validates the order
//! 2. Charges the customer and packs every item in parallel
//! 3. Waits for the courier and confirms the order
//!
//! A declined payment is caught, the customer is notified and the workflow fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use stepwise_core::{ExecutionStatus, JobError, JobFailure, JobHandle, JobRunner, JobRunnerRegistry, JobStatus};
use stepwise_e2e_tests::utils::{run_document, succeeded_output};

const ORDER_DOCUMENT: &str = r#"{
  "Comment": "Order processing",
  "StartAt": "ValidateOrder",
  "States": {
    "ValidateOrder": {
      "Type": "Choice",
      "Choices": [
        {
          "And": [
            {"Variable": "$.items[0]", "IsPresent": true},
            {"Variable": "$.customer.id", "IsString": true}
          ],
          "Next": "FulfilOrder"
        }
      ],
      "Default": "RejectOrder"
    },
    "FulfilOrder": {
      "Type": "Parallel",
      "Branches": [
        {
          "StartAt": "Charge",
          "States": {
            "Charge": {
              "Type": "Task",
              "Resource": "svc://payments/charge",
              "Parameters": {"customer.$": "$.customer.id", "items.$": "$.items"},
              "Retry": [{"ErrorEquals": ["Payments.Busy"], "IntervalSeconds": 0, "MaxAttempts": 2}],
              "End": true
            }
          }
        },
        {
          "StartAt": "PackItems",
          "States": {
            "PackItems": {
              "Type": "Map",
              "ItemsPath": "$.items",
              "MaxConcurrency": 2,
              "ItemProcessor": {
                "StartAt": "Pack",
                "States": {
                  "Pack": {"Type": "Task", "Resource": "svc://warehouse/pack", "End": true}
                }
              },
              "End": true
            }
          }
        }
      ],
      "ResultSelector": {"payment.$": "$[0]", "parcels.$": "$[1]"},
      "ResultPath": "$.fulfilment",
      "Catch": [{"ErrorEquals": ["Payments.Declined"], "ResultPath": "$.failure", "Next": "NotifyCustomer"}],
      "Next": "WaitForCourier"
    },
    "WaitForCourier": {"Type": "Wait", "Seconds": 0, "Next": "Confirm"},
    "Confirm": {
      "Type": "Pass",
      "Parameters": {
        "order.$": "$.id",
        "charged_cents.$": "$.fulfilment.payment.amount_cents",
        "parcels.$": "States.ArrayLength($.fulfilment.parcels)",
        "message.$": "States.Format('Order {} confirmed', $.id)"
      },
      "End": true
    },
    "RejectOrder": {"Type": "Fail", "Error": "Order.Invalid", "Cause": "Order has no items"},
    "NotifyCustomer": {
      "Type": "Task",
      "Resource": "svc://notify/email",
      "Parameters": {"to.$": "$.customer.email", "reason.$": "$.failure.Cause"},
      "ResultPath": null,
      "Next": "OrderFailed"
    },
    "OrderFailed": {"Type": "Fail", "ErrorPath": "$.failure.Error", "CausePath": "$.failure.Cause"}
  }
}"#;

/// A finished job waiting to be polled
struct PendingJob {
    polls_left: u32,
    status: JobStatus,
}

/// In-memory stand-ins for the payment, warehouse and notification services
#[derive(Default)]
struct OrderServices {
    next_id: AtomicU64,
    jobs: DashMap<String, PendingJob>,
    charge_attempts: DashMap<String, u32>,
    emails: DashMap<String, Value>,
}

impl OrderServices {
    fn charge(&self, input: &Value) -> JobStatus {
        let customer = input["customer"].as_str().unwrap_or_default().to_string();
        let attempt = {
            let mut attempts = self.charge_attempts.entry(customer.clone()).or_insert(0);
            *attempts += 1;
            *attempts
        };

        match customer.as_str() {
            "cust-declined" => JobStatus::Failed(JobFailure::new("Payments.Declined", "Card declined")),
            "cust-busy" if attempt == 1 => JobStatus::Failed(JobFailure::new("Payments.Busy", "Try again")),
            _ => {
                let amount_cents: i64 = input["items"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| {
                                item["price_cents"].as_i64().unwrap_or(0) * item["quantity"].as_i64().unwrap_or(0)
                            })
                            .sum()
                    })
                    .unwrap_or(0);
                JobStatus::Succeeded(json!({"payment_id": format!("pay-{}", customer), "amount_cents": amount_cents}))
            }
        }
    }
}

impl JobRunner for OrderServices {
    fn launch(&self, resource: &str, input: &Value, _credentials: &Value) -> Result<JobHandle, JobError> {
        let (polls_left, status) = match resource {
            "svc://payments/charge" => (0, self.charge(input)),
            "svc://warehouse/pack" => {
                let sku = input["sku"].as_str().unwrap_or_default();
                (1, JobStatus::Succeeded(json!({"sku": sku, "parcel": format!("PCL-{}", sku)})))
            }
            "svc://notify/email" => {
                let to = input["to"].as_str().unwrap_or_default().to_string();
                self.emails.insert(to, input.clone());
                (0, JobStatus::Succeeded(json!({"sent": true})))
            }
            other => {
                return Err(JobError::LaunchFailed {
                    resource: other.to_string(),
                    message: "unknown service".to_string(),
                })
            }
        };

        let id = format!("job-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.jobs.insert(id.clone(), PendingJob { polls_left, status });
        Ok(JobHandle::new(id, resource))
    }

    fn poll(&self, handle: &JobHandle) -> JobStatus {
        let Some(mut job) = self.jobs.get_mut(&handle.id) else {
            return JobStatus::Failed(JobFailure::new("Services.UnknownJob", handle.id.clone()));
        };
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return JobStatus::Running;
        }
        job.status.clone()
    }

    fn cleanup(&self, handle: &JobHandle) {
        self.jobs.remove(&handle.id);
    }
}

fn order(customer: &str) -> Value {
    json!({
        "id": "ord-123456",
        "customer": {"id": customer, "email": format!("{}@example.com", customer)},
        "items": [
            {"sku": "prod-456", "name": "Wireless Headphones", "quantity": 1, "price_cents": 7999},
            {"sku": "prod-789", "name": "USB-C Cable", "quantity": 2, "price_cents": 2499},
            {"sku": "prod-901", "name": "Carry Case", "quantity": 1, "price_cents": 1500}
        ]
    })
}

fn registry(services: &Arc<OrderServices>) -> Arc<JobRunnerRegistry> {
    Arc::new(JobRunnerRegistry::new().with_runner("svc", services.clone()))
}

fn visited(workflow: &stepwise_core::Workflow) -> Vec<String> {
    workflow
        .context()
        .history()
        .iter()
        .map(|entry| entry.state.clone())
        .collect()
}

#[tokio::test]
async fn test_order_processing_e2e() -> anyhow::Result<()> {
    let services = Arc::new(OrderServices::default());
    let workflow = run_document(ORDER_DOCUMENT, order("cust-123"), registry(&services)).await?;

    let output = succeeded_output(&workflow)?;
    assert_eq!(
        output,
        json!({
            "order": "ord-123456",
            "charged_cents": 14497,
            "parcels": 3,
            "message": "Order ord-123456 confirmed"
        })
    );
    assert_eq!(visited(&workflow), vec!["ValidateOrder", "FulfilOrder", "WaitForCourier", "Confirm"]);
    assert!(services.jobs.is_empty());
    assert!(services.emails.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_busy_payment_is_retried() -> anyhow::Result<()> {
    let services = Arc::new(OrderServices::default());
    let workflow = run_document(ORDER_DOCUMENT, order("cust-busy"), registry(&services)).await?;

    let output = succeeded_output(&workflow)?;
    assert_eq!(output["charged_cents"], json!(14497));
    assert_eq!(services.charge_attempts.get("cust-busy").map(|n| *n), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_declined_payment_notifies_customer() -> anyhow::Result<()> {
    let services = Arc::new(OrderServices::default());
    let workflow = run_document(ORDER_DOCUMENT, order("cust-declined"), registry(&services)).await?;

    assert_eq!(workflow.status(), ExecutionStatus::Failed);
    assert_eq!(
        workflow.output(),
        Some(&json!({"Error": "Payments.Declined", "Cause": "Card declined"}))
    );
    assert_eq!(
        visited(&workflow),
        vec!["ValidateOrder", "FulfilOrder", "NotifyCustomer", "OrderFailed"]
    );

    let email = services.emails.get("cust-declined@example.com").map(|email| email.clone());
    assert_eq!(
        email,
        Some(json!({"to": "cust-declined@example.com", "reason": "Card declined"}))
    );
    // the packing branch was abandoned and its jobs released
    assert!(services.jobs.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_order_without_items_is_rejected() -> anyhow::Result<()> {
    let services = Arc::new(OrderServices::default());
    let mut input = order("cust-123");
    input["items"] = json!([]);

    let workflow = run_document(ORDER_DOCUMENT, input, registry(&services)).await?;
    assert_eq!(workflow.status(), ExecutionStatus::Failed);
    assert_eq!(
        workflow.output(),
        Some(&json!({"Error": "Order.Invalid", "Cause": "Order has no items"}))
    );
    assert!(services.charge_attempts.is_empty());
    Ok(())
}
