//!
//! Stepwise Core - non-blocking runtime for Stepwise state machines
//!
//! A [`Workflow`] is built from a validated definition and driven by its
//! caller, one [`Workflow::step`] at a time. Task states hand their work to a
//! [`JobRunner`]; Map and Parallel states interleave nested workflows under a
//! concurrency limit.
//!
//! ```
//! use serde_json::json;
//! use stepwise_core::{ExecutionStatus, Workflow};
//!
//! let document = r#"{
//!   "StartAt": "Greet",
//!   "States": {
//!     "Greet": {
//!       "Type": "Pass",
//!       "Parameters": {"greeting.$": "States.Format('Hello {}', $.name)"},
//!       "End": true
//!     }
//!   }
//! }"#;
//!
//! let mut workflow = Workflow::from_document(document, json!({"name": "Ada"})).unwrap();
//! assert_eq!(workflow.run_nonblock(), ExecutionStatus::Succeeded);
//! assert_eq!(workflow.output(), Some(&json!({"greeting": "Hello Ada"})));
//! ```

#![forbid(unsafe_code)]

pub mod branch;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod job;
pub mod path;
pub mod retry;
pub mod states;
pub mod workflow;

pub use branch::{BranchProgress, FailureTolerance};
pub use config::EngineConfig;
pub use context::{Context, ExecutionInfo, ExecutionStatus, HistoryEntry, StateProgress};
pub use error::{error_names, CoreError, ExecutionError, PathError};
pub use graph::StateGraph;
pub use job::{JobError, JobFailure, JobHandle, JobRunner, JobRunnerRegistry, JobStatus};
pub use path::Path;
pub use states::State;
pub use workflow::Workflow;

/// Returns a version string for the Stepwise core crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
