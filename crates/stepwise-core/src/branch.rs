//! Interleaved execution of the nested workflows of a Map or Parallel state.
//!
//! Children wait in a pending queue and are admitted in order into at most
//! `max_concurrency` in-flight slots. Every advance steps each in-flight child
//! once. Results land at the child's original index, so the aggregate output
//! does not depend on which child finishes first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionStatus;
use crate::error::{error_names, ExecutionError};
use crate::workflow::{StepOutcome, Workflow};

/// How many failed children a Map state absorbs before failing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FailureTolerance {
    pub count: Option<u64>,
    pub percentage: Option<f64>,
}

impl FailureTolerance {
    pub fn is_configured(&self) -> bool {
        self.count.is_some() || self.percentage.is_some()
    }

    /// Whether `failed` of `total` children stays within every configured threshold
    pub fn allows(&self, failed: usize, total: usize) -> bool {
        if !self.is_configured() {
            return false;
        }
        let within_count = self.count.map_or(true, |count| failed as u64 <= count);
        let within_percentage = self.percentage.map_or(true, |percentage| {
            total > 0 && (failed as f64 * 100.0 / total as f64) <= percentage
        });
        within_count && within_percentage
    }
}

/// Counts reported by [`Workflow::branch_progress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchProgress {
    pub pending: usize,
    pub in_flight: usize,
    /// Children whose result is recorded, tolerated failures included
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Result of one advance of a [`BranchRunner`]
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome {
    Running { progressed: bool },
    Completed(Vec<Value>),
    Failed(ExecutionError),
}

#[derive(Debug)]
pub struct BranchRunner {
    pending: VecDeque<(usize, Workflow)>,
    in_flight: Vec<(usize, Workflow)>,
    results: Vec<Option<Value>>,
    max_concurrency: usize,
    tolerance: FailureTolerance,
    recorded: usize,
    failed: usize,
}

impl BranchRunner {
    /// `max_concurrency` of 0 admits every child at once
    pub fn new(children: Vec<Workflow>, max_concurrency: usize, tolerance: FailureTolerance) -> Self {
        let total = children.len();
        BranchRunner {
            pending: children.into_iter().enumerate().collect(),
            in_flight: Vec::new(),
            results: vec![None; total],
            max_concurrency,
            tolerance,
            recorded: 0,
            failed: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn progress(&self) -> BranchProgress {
        BranchProgress {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            completed: self.recorded,
            failed: self.failed,
            total: self.total(),
        }
    }

    /// Earliest instant an in-flight child is waiting for
    pub fn wait_until(&self) -> Option<DateTime<Utc>> {
        self.in_flight.iter().filter_map(|(_, child)| child.wait_until()).min()
    }

    pub fn advance(&mut self) -> BranchOutcome {
        let mut progressed = self.admit();

        let mut at = 0;
        while at < self.in_flight.len() {
            let outcome = self.in_flight[at].1.step_once();
            if outcome != StepOutcome::Blocked {
                progressed = true;
            }

            if !self.in_flight[at].1.is_terminal() {
                at += 1;
                continue;
            }

            let (index, child) = self.in_flight.remove(at);
            if let Err(err) = self.record(index, &child) {
                self.abandon("A sibling nested workflow failed");
                return BranchOutcome::Failed(err);
            }
        }

        if self.pending.is_empty() && self.in_flight.is_empty() {
            let results = std::mem::take(&mut self.results);
            return BranchOutcome::Completed(results.into_iter().map(Option::unwrap_or_default).collect());
        }

        // Freed slots are filled now and stepped on the next advance
        progressed |= self.admit();
        BranchOutcome::Running { progressed }
    }

    fn admit(&mut self) -> bool {
        let mut admitted = false;
        while self.has_free_slot() {
            let Some((index, mut child)) = self.pending.pop_front() else { break };
            if let Err(err) = child.start() {
                tracing::debug!(index, "Nested workflow could not start: {}", err);
            }
            tracing::debug!(
                execution_id = %child.context().execution().id,
                index,
                in_flight = self.in_flight.len() + 1,
                "Admitted nested workflow"
            );
            self.in_flight.push((index, child));
            admitted = true;
        }
        admitted
    }

    fn has_free_slot(&self) -> bool {
        self.max_concurrency == 0 || self.in_flight.len() < self.max_concurrency
    }

    fn record(&mut self, index: usize, child: &Workflow) -> Result<(), ExecutionError> {
        match child.status() {
            ExecutionStatus::Succeeded => {
                self.results[index] = Some(child.output().cloned().unwrap_or_default());
                self.recorded += 1;
                Ok(())
            }
            status => {
                self.failed += 1;
                let error = match (status, child.error()) {
                    (ExecutionStatus::Failed, Some(error)) => error.clone(),
                    _ => ExecutionError::CompositeFailure {
                        error: error_names::BRANCH_ABORTED.to_string(),
                        cause: child
                            .context()
                            .abort_cause()
                            .unwrap_or("Nested workflow was aborted")
                            .to_string(),
                    },
                };

                if self.tolerance.allows(self.failed, self.total()) {
                    tracing::debug!(index, failed = self.failed, "Tolerated nested workflow failure: {}", error);
                    self.results[index] = Some(error.to_payload());
                    self.recorded += 1;
                    return Ok(());
                }

                if self.tolerance.is_configured() {
                    return Err(ExecutionError::CompositeFailure {
                        error: error_names::EXCEED_TOLERATED_FAILURE_THRESHOLD.to_string(),
                        cause: format!("{} of {} items failed", self.failed, self.total()),
                    });
                }

                Err(ExecutionError::CompositeFailure {
                    error: error.error_name().unwrap_or(error_names::BRANCH_FAILED).to_string(),
                    cause: error.cause().unwrap_or_else(|| error.to_string()),
                })
            }
        }
    }

    /// Abort every in-flight child and drop the ones not yet admitted
    pub fn abandon(&mut self, cause: &str) {
        if !self.in_flight.is_empty() || !self.pending.is_empty() {
            tracing::debug!(
                in_flight = self.in_flight.len(),
                pending = self.pending.len(),
                "Abandoning nested workflows"
            );
        }
        for (_, child) in &mut self.in_flight {
            child.abort(cause);
        }
        self.in_flight.clear();
        self.pending.clear();
    }
}
