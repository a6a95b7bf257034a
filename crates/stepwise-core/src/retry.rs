//! Retry and Catch handling for Task, Parallel and Map states

use std::time::Duration;

use rand::Rng;
use stepwise_dsl::{CatcherDefinition, JitterStrategy, RetrierDefinition};

use crate::error::error_names;
use crate::states::ResultPath;

const DEFAULT_INTERVAL_SECONDS: f64 = 1.0;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_RATE: f64 = 2.0;

/// Whether an error name is matched by an `ErrorEquals` list.
///
/// `States.ALL` matches everything; a trailing `*` matches by prefix, so
/// `States.*` matches every runtime error.
pub fn error_matches(patterns: &[String], name: Option<&str>) -> bool {
    patterns.iter().any(|pattern| {
        if pattern == error_names::ALL {
            return true;
        }
        let Some(name) = name else { return false };
        match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => pattern == name,
        }
    })
}

/// A compiled `Retry` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Retrier {
    pub error_equals: Vec<String>,
    pub interval_seconds: f64,
    pub max_attempts: u32,
    pub backoff_rate: f64,
    pub max_delay_seconds: Option<f64>,
    pub jitter: JitterStrategy,
}

impl Retrier {
    pub fn from_definition(definition: &RetrierDefinition) -> Self {
        Retrier {
            error_equals: definition.error_equals.clone(),
            interval_seconds: definition.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS),
            max_attempts: definition.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            backoff_rate: definition.backoff_rate.unwrap_or(DEFAULT_BACKOFF_RATE),
            max_delay_seconds: definition.max_delay_seconds,
            jitter: definition.jitter_strategy.unwrap_or_default(),
        }
    }

    pub fn matches(&self, name: Option<&str>) -> bool {
        error_matches(&self.error_equals, name)
    }

    /// Delay before retry number `attempt` (starting at 1):
    /// `IntervalSeconds * BackoffRate^(attempt - 1)`, capped by `MaxDelaySeconds`.
    /// Full jitter picks uniformly between zero and that value. Delays too
    /// large to represent saturate at `Duration::MAX`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut seconds = self.interval_seconds * self.backoff_rate.powi(exponent);
        if let Some(max) = self.max_delay_seconds {
            seconds = seconds.min(max);
        }
        if seconds.is_nan() || seconds <= 0.0 {
            return Duration::ZERO;
        }
        if seconds.is_infinite() {
            return Duration::MAX;
        }

        if self.jitter == JitterStrategy::Full {
            seconds = rand::thread_rng().gen_range(0.0..=seconds);
        }
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}

/// A compiled `Catch` entry
#[derive(Debug, Clone, PartialEq)]
pub struct Catcher {
    pub error_equals: Vec<String>,
    pub next: String,
    pub result_path: ResultPath,
}

impl Catcher {
    pub fn from_definition(definition: &CatcherDefinition) -> Result<Self, String> {
        Ok(Catcher {
            error_equals: definition.error_equals.clone(),
            next: definition.next.clone().unwrap_or_default(),
            result_path: ResultPath::compile(&definition.result_path)?,
        })
    }

    pub fn matches(&self, name: Option<&str>) -> bool {
        error_matches(&self.error_equals, name)
    }
}

/// The Retry and Catch lists of one state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorHandling {
    pub retriers: Vec<Retrier>,
    pub catchers: Vec<Catcher>,
}

impl ErrorHandling {
    pub fn compile(retry: &[RetrierDefinition], catch: &[CatcherDefinition]) -> Result<Self, String> {
        Ok(ErrorHandling {
            retriers: retry.iter().map(Retrier::from_definition).collect(),
            catchers: catch
                .iter()
                .map(Catcher::from_definition)
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    /// The first retrier matching the error, with its index.
    /// Later retriers are not consulted once one matches, even when it is exhausted.
    pub fn retrier_for(&self, name: Option<&str>) -> Option<(usize, &Retrier)> {
        self.retriers.iter().enumerate().find(|(_, retrier)| retrier.matches(name))
    }

    pub fn catcher_for(&self, name: Option<&str>) -> Option<&Catcher> {
        self.catchers.iter().find(|catcher| catcher.matches(name))
    }
}
