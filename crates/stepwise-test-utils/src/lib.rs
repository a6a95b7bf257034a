//! Testing utilities for Stepwise workflows.
//!
//! Provides an in-memory scripted job runner, a `mockall` mock of the
//! [`JobRunner`](stepwise_core::JobRunner) trait, builders for workflows from
//! inline JSON, and synchronous and async driver loops.

pub mod builders;
pub mod driver;
pub mod mocks;
pub mod runners;

/// Re-export commonly used types for convenience
pub use mockall;

pub use builders::{machine, make_definition, make_workflow, try_make_workflow};
pub use driver::{drive, run_until_terminal};
pub use mocks::{create_mock_job_runner, MockJobRunner};
pub use runners::{JobScript, LaunchRecord, ScriptedJobRunner};

/// Initializes tracing output for tests. Honours `RUST_LOG`, defaulting to `warn`.
/// Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
