//! Polling worker loop over [`Client`].
//!
//! Pops from one channel, hands each item to a handler and pushes the item
//! on to whatever channel the handler names next. Popping removes an item
//! for good, so a popped batch is always finished even after cancellation.

use std::future::Future;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use super::Client;
use crate::address::{Address, ChannelAddress};
use crate::error::{Error, Result};
use crate::model::{Payload, WorkItem};
use crate::telemetry::{metrics, queue};

/// Route name a handler returns to end an item's journey.
pub const NOOP_ROUTE: &str = "noop";

/// One popped item as seen by a handler.
pub struct WorkContext {
    pub item: WorkItem,
    /// Channel address the item was popped from.
    pub channel: String,
    /// Client the loop runs on, for handlers that push follow-up work.
    pub client: Client,
}

impl WorkContext {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.item.payload.as_ref()
    }
}

impl Client {
    /// Process `channel` until `cancel` fires.
    ///
    /// The handler's return value is the channel address the item moves to
    /// next (`"tenant:channel"` or `"channel"`); `None` or [`NOOP_ROUTE`]
    /// finishes it. Empty polls and transient failures wait
    /// [`Client::poll_wait`] before trying again. A validation error is
    /// permanent and stops the loop with that error.
    ///
    /// Returns the number of items handled.
    pub async fn work_loop<F, Fut>(
        &self,
        channel: &str,
        mut handler: F,
        cancel: CancellationToken,
    ) -> Result<u64>
    where
        F: FnMut(WorkContext) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        if ChannelAddress::parse(channel).channel.is_empty() {
            return Err(Error::Validation("channel cannot be empty".into()));
        }

        info!(channel, poll_wait = ?self.poll_wait, batch = self.batch, "work loop started");
        let mut handled = 0u64;

        while !cancel.is_cancelled() {
            let items = match self.pop(channel, self.batch).await {
                Ok(items) => items,
                Err(e) if e.is_permanent() => {
                    error!(channel, error = %e, "work loop stopped by rejected request");
                    return Err(e);
                }
                Err(Error::Paused) => {
                    debug!(channel, "server paused");
                    if !wait_or_cancel(self.poll_wait, &cancel).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(channel, error = %e, retry_in = ?self.poll_wait, "pop failed");
                    if !wait_or_cancel(self.poll_wait, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            if items.is_empty() {
                if !wait_or_cancel(self.poll_wait, &cancel).await {
                    break;
                }
                continue;
            }

            for item in items {
                let span = queue::start_worker_span(channel, &item.id);
                self.handle_one(channel, item, &mut handler)
                    .instrument(span)
                    .await;
                handled += 1;
            }
        }

        info!(channel, handled, "work loop stopped");
        Ok(handled)
    }

    async fn handle_one<F, Fut>(&self, channel: &str, item: WorkItem, handler: &mut F)
    where
        F: FnMut(WorkContext) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let id = item.id.clone();
        let payload = item.payload.clone();
        let next = handler(WorkContext {
            item,
            channel: channel.to_string(),
            client: self.clone(),
        })
        .await;

        let outcome = match next.as_deref() {
            None | Some(NOOP_ROUTE) | Some("") => {
                debug!(%id, "work done");
                "done"
            }
            Some(next) => {
                let target = ChannelAddress::parse(next);
                let address = Address::new(target.tenant, target.channel, id.clone());
                match self.push_item(&address, payload.as_ref()).await {
                    Ok(()) => {
                        debug!(%id, next, "work routed");
                        "routed"
                    }
                    Err(e) => {
                        warn!(%id, next, error = %e, "failed to route work");
                        "route_failed"
                    }
                }
            }
        };

        metrics::worker_items().add(
            1,
            &[
                KeyValue::new("channel", channel.to_string()),
                KeyValue::new("outcome", outcome),
            ],
        );
    }
}

/// Sleep for `wait`; false if cancelled first.
async fn wait_or_cancel(wait: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}
