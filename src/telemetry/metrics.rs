//! Metric instrument factories for solidq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"solidq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for solidq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("solidq")
}

/// Counter: queue requests served by the transport.
/// Labels: `tenant`, `operation`, `result` ("ok" | "error").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("solidq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: work items moved through a channel.
/// Labels: `tenant`, `channel`, `direction` ("in" | "out").
pub fn queue_items() -> Counter<u64> {
    meter()
        .u64_counter("solidq.queue.items")
        .with_description("Number of work items pushed or popped")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("solidq.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: items handled by worker loops.
/// Labels: `channel`, `outcome` ("done" | "routed" | "route_failed").
pub fn worker_items() -> Counter<u64> {
    meter()
        .u64_counter("solidq.worker.items")
        .with_description("Number of work items processed by worker loops")
        .build()
}
