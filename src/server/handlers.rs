//! Queue endpoint handlers.
//!
//! Each handler resolves its address, runs the engine call on the blocking
//! pool and wraps the outcome in an [`Envelope`].

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, warn};

use super::types::{AppState, Envelope};
use crate::address::{Address, ChannelAddress};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::Payload;
use crate::telemetry::{metrics, queue};

pub type Reply = (StatusCode, Json<Envelope>);

pub async fn pause(State(state): State<AppState>) -> Reply {
    let started = Instant::now();
    state.set_paused(true);
    respond("pause", "", started, Ok(Envelope::ok()))
}

pub async fn unpause(State(state): State<AppState>) -> Reply {
    let started = Instant::now();
    state.set_paused(false);
    respond("unpause", "", started, Ok(Envelope::ok()))
}

/// `POST /solidq/push/{address}`; the optional JSON body is the payload.
pub async fn push(
    State(state): State<AppState>,
    Path(address): Path<String>,
    body: Bytes,
) -> Reply {
    let started = Instant::now();
    let Address {
        tenant,
        channel,
        id,
    } = Address::parse(&address);
    let span = queue::start_queue_span("push", &tenant, &channel);

    let result = async {
        let payload = parse_payload(&body)?;
        let ch = channel.clone();
        on_engine(&state, &tenant, move |engine| {
            engine.push(&ch, &id, payload.as_ref())
        })
        .await?;
        metrics::queue_items().add(1, &item_labels(&tenant, &channel, "in"));
        Ok::<_, Error>(Envelope::ok())
    }
    .instrument(span)
    .await;

    respond("push", &tenant, started, result)
}

/// `GET /solidq/pop/{channel}/{count}`; a count below 1 or not a number
/// pops one item.
pub async fn pop(
    State(state): State<AppState>,
    Path((channel, count)): Path<(String, String)>,
) -> Reply {
    let started = Instant::now();
    let ChannelAddress { tenant, channel } = ChannelAddress::parse(&channel);
    let count = count.parse::<usize>().unwrap_or(1).max(1);
    debug!(%tenant, %channel, count, "pop request");
    let span = queue::start_queue_span("pop", &tenant, &channel);

    let result = async {
        let ch = channel.clone();
        let items = on_engine(&state, &tenant, move |engine| engine.pop_many(&ch, count)).await?;
        queue::record_items(&tracing::Span::current(), items.len());
        if !items.is_empty() {
            metrics::queue_items().add(
                items.len() as u64,
                &item_labels(&tenant, &channel, "out"),
            );
        }
        Ok::<_, Error>(Envelope::popped(items))
    }
    .instrument(span)
    .await;

    respond("pop", &tenant, started, result)
}

pub async fn count(State(state): State<AppState>, Path(channel): Path<String>) -> Reply {
    let started = Instant::now();
    let ChannelAddress { tenant, channel } = ChannelAddress::parse(&channel);
    let span = queue::start_queue_span("count", &tenant, &channel);

    let result = on_engine(&state, &tenant, move |engine| engine.count(&channel))
        .instrument(span)
        .await
        .map(|count| Envelope {
            count: Some(count),
            ..Envelope::ok()
        });

    respond("count", &tenant, started, result)
}

pub async fn reset(State(state): State<AppState>, Path(channel): Path<String>) -> Reply {
    let started = Instant::now();
    let ChannelAddress { tenant, channel } = ChannelAddress::parse(&channel);
    let span = queue::start_queue_span("reset", &tenant, &channel);

    let result = on_engine(&state, &tenant, move |engine| engine.reset_channel(&channel))
        .instrument(span)
        .await
        .map(|()| Envelope::ok());

    respond("reset", &tenant, started, result)
}

pub async fn channels(State(state): State<AppState>, Path(tenant): Path<String>) -> Reply {
    let started = Instant::now();
    let span = queue::start_queue_span("channels", &tenant, "");
    let result = on_engine(&state, &tenant, |engine| engine.list_channels_with_count())
        .instrument(span)
        .await
        .map(|channels| Envelope {
            channels: Some(channels),
            ..Envelope::ok()
        });

    respond("channels", &tenant, started, result)
}

pub async fn stats(State(state): State<AppState>, Path(tenant): Path<String>) -> Reply {
    let started = Instant::now();
    let span = queue::start_queue_span("stats", &tenant, "");
    let result = on_engine(&state, &tenant, |engine| engine.stats())
        .instrument(span)
        .await
        .map(|stats| Envelope {
            stats: Some(stats),
            ..Envelope::ok()
        });

    respond("stats", &tenant, started, result)
}

/// `GET /solidq/listapps/{physical}`; only the literal `true` scans disk.
pub async fn list_apps(State(state): State<AppState>, Path(physical): Path<String>) -> Reply {
    let started = Instant::now();
    let physical = physical == "true";
    let registry = Arc::clone(&state.registry);

    let result = blocking(move || registry.list_tenants(physical))
        .await
        .map(|apps| Envelope {
            apps: Some(apps),
            ..Envelope::ok()
        });

    respond("listapps", "", started, result)
}

/// Empty body means no payload; anything else must be JSON.
fn parse_payload(body: &[u8]) -> Result<Option<Payload>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| Error::Validation(format!("payload is not valid JSON: {e}")))
}

/// Run `f` against the tenant's engine on the blocking pool.
async fn on_engine<T, F>(state: &AppState, tenant: &str, f: F) -> Result<T>
where
    F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    let tenant = tenant.to_string();
    blocking(move || {
        let engine = registry.ensure_engine(&tenant)?;
        f(&engine)
    })
    .await
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("engine task failed: {e}")))?
}

fn item_labels(tenant: &str, channel: &str, direction: &'static str) -> [KeyValue; 3] {
    [
        KeyValue::new("tenant", tenant.to_string()),
        KeyValue::new("channel", channel.to_string()),
        KeyValue::new("direction", direction),
    ]
}

/// Stamp timing, record metrics and map errors to a status code.
pub(crate) fn respond(
    operation: &'static str,
    tenant: &str,
    started: Instant,
    result: Result<Envelope>,
) -> Reply {
    let elapsed = started.elapsed();
    let (status, outcome, mut envelope) = match result {
        Ok(envelope) => (StatusCode::OK, "ok", envelope),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(operation, tenant, error = %e, "queue operation failed");
            } else {
                debug!(operation, tenant, error = %e, "queue operation rejected");
            }
            (status, "error", Envelope::error(e.to_string()))
        }
    };
    envelope.took = Some(format!("{elapsed:?}"));

    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("tenant", tenant.to_string()),
            KeyValue::new("operation", operation),
            KeyValue::new("result", outcome),
        ],
    );
    metrics::operation_duration_ms().record(
        elapsed.as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );

    (status, Json(envelope))
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::Locked(_) | Error::NotOpen => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_body_is_no_payload() {
        assert_eq!(parse_payload(b"").unwrap(), None);
        assert_eq!(parse_payload(b"  \n").unwrap(), None);
        assert_eq!(parse_payload(br#"{"x":1}"#).unwrap(), Some(json!({"x": 1})));
    }

    #[test]
    fn malformed_body_is_a_validation_error() {
        assert!(parse_payload(b"{nope").unwrap_err().is_permanent());
    }

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            status_for(&Error::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::Locked("core.db".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Other("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
