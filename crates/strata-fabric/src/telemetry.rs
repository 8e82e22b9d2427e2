//! Per-operation observations for an exporter chosen by the embedder.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

/// How a public operation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Failed with the given error kind name.
    Failure(&'static str),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(kind) => kind,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Receives one observation per public engine operation.
pub trait Telemetry: Send + Sync {
    fn observe(&self, operation: &'static str, elapsed: Duration, outcome: Outcome);
}

/// Ignores all observations.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn observe(&self, _operation: &'static str, _elapsed: Duration, _outcome: Outcome) {}
}

/// Emits each observation as a `debug!` event on the `strata::telemetry` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn observe(&self, operation: &'static str, elapsed: Duration, outcome: Outcome) {
        debug!(
            target: "strata::telemetry",
            operation,
            elapsed_us = elapsed.as_micros() as u64,
            outcome = outcome.as_str(),
            "operation observed"
        );
    }
}

/// Counters and accumulated time for one operation name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub calls: u64,
    pub failures: u64,
    pub total: Duration,
}

/// In-memory counters keyed by operation name.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    stats: Mutex<BTreeMap<&'static str, OperationStats>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        self.snapshot().get(operation).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, OperationStats> {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Telemetry for MetricsRecorder {
    fn observe(&self, operation: &'static str, elapsed: Duration, outcome: Outcome) {
        let mut stats = match self.stats.lock() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = stats.entry(operation).or_default();
        entry.calls += 1;
        entry.total += elapsed;
        if !outcome.is_success() {
            entry.failures += 1;
        }
    }
}
