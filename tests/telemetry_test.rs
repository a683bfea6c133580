//! Integration tests for telemetry initialization and span helpers.

use opentelemetry::KeyValue;
use solidq::telemetry::{TelemetryConfig, init_telemetry, metrics, queue};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // initialization returns Err, which is acceptable here.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "solidq-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = init_telemetry(config);
}

#[test]
fn queue_span_creates_and_records_items() {
    let span = queue::start_queue_span("pop", "core", "jobs");
    let _enter = span.enter();
    queue::record_items(&span, 3);
}

#[test]
fn worker_span_creates() {
    let span = queue::start_worker_span("core:jobs", "job-42");
    let _enter = span.enter();
    tracing::info!("inside worker span");
}

#[test]
fn instruments_accept_measurements_without_a_provider() {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("tenant", "core"),
            KeyValue::new("operation", "push"),
            KeyValue::new("result", "ok"),
        ],
    );
    metrics::queue_items().add(2, &[KeyValue::new("direction", "in")]);
    metrics::operation_duration_ms().record(1.5, &[KeyValue::new("operation", "push")]);
    metrics::worker_items().add(1, &[KeyValue::new("outcome", "done")]);
}
