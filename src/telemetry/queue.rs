//! Queue request span helpers.
//!
//! Every transport request and every worker cycle runs inside a span carrying
//! the tenant and channel it touches.

use tracing::Span;

/// Start a span for one queue operation.
///
/// The `queue.items` field is declared empty and can be filled via
/// [`record_items`].
pub fn start_queue_span(operation: &str, tenant: &str, channel: &str) -> Span {
    tracing::info_span!(
        "queue.op",
        "queue.operation" = operation,
        "queue.tenant" = tenant,
        "queue.channel" = channel,
        "queue.items" = tracing::field::Empty,
    )
}

/// Record how many items an operation moved.
pub fn record_items(span: &Span, items: usize) {
    span.record("queue.items", items as u64);
}

/// Start a span for one worker-loop item.
pub fn start_worker_span(channel: &str, id: &str) -> Span {
    tracing::info_span!("queue.work", "queue.channel" = channel, "work.id" = id)
}
