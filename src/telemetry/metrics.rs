//! Metric instrument factories for keyseq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"keyseq"` meter. Without a provider the
//! global meter is a no-op, so instruments are always safe to record on.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for keyseq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("keyseq")
}

/// Counter: tasks accepted into a key's queue.
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.tasks.submitted")
        .with_description("Number of tasks queued for a key")
        .build()
}

/// Counter: tasks run to completion or failure.
/// Labels: `outcome` ("ok" | "panicked").
pub fn tasks_executed() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.tasks.executed")
        .with_description("Number of tasks executed")
        .build()
}

/// Counter: tasks discarded because their key was draining inline.
pub fn tasks_dropped() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.tasks.dropped")
        .with_description("Number of tasks dropped for a closed key")
        .build()
}

/// Counter: dispatches refused by the underlying executor.
/// Labels: `phase` ("initial" | "continuation"), `reason`.
pub fn dispatch_rejected() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.dispatch.rejected")
        .with_description("Number of dispatch steps refused by the executor")
        .build()
}

/// Counter: keys drained inline after a continuation rejection.
pub fn keys_drained_inline() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.keys.drained_inline")
        .with_description("Number of keys drained on the rejecting thread")
        .build()
}

/// Histogram: task body duration in milliseconds.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("keyseq.task.duration_ms")
        .with_description("Task execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: admission decisions of a bounded executor.
/// Labels: `result` ("admitted" | "saturated" | "draining").
pub fn admissions() -> Counter<u64> {
    meter()
        .u64_counter("keyseq.admission.decisions")
        .with_description("Number of admission control decisions")
        .build()
}

/// Instruments recorded on the dispatch hot path, built once per runner.
#[derive(Clone)]
pub(crate) struct DispatchInstruments {
    pub submitted: Counter<u64>,
    pub executed: Counter<u64>,
    pub dropped: Counter<u64>,
    pub rejected: Counter<u64>,
    pub drained_inline: Counter<u64>,
    pub duration_ms: Histogram<f64>,
}

impl DispatchInstruments {
    pub(crate) fn new() -> Self {
        Self {
            submitted: tasks_submitted(),
            executed: tasks_executed(),
            dropped: tasks_dropped(),
            rejected: dispatch_rejected(),
            drained_inline: keys_drained_inline(),
            duration_ms: task_duration_ms(),
        }
    }

    pub(crate) fn record_outcome(&self, panicked: bool, elapsed_ms: f64) {
        let outcome = if panicked { "panicked" } else { "ok" };
        self.executed.add(1, &[KeyValue::new("outcome", outcome)]);
        self.duration_ms.record(elapsed_ms, &[]);
    }

    pub(crate) fn record_rejection(&self, phase: &'static str, reason: &'static str) {
        self.rejected.add(
            1,
            &[
                KeyValue::new("phase", phase),
                KeyValue::new("reason", reason),
            ],
        );
    }
}
