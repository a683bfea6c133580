//! HTTP client for a solidq server.
//!
//! Mirrors the server routes one method each and turns envelopes back into
//! typed results. [`Client::work_loop`] builds a polling worker on top.

mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};

use crate::address::{Address, ChannelAddress};
use crate::error::{Error, Result};
use crate::model::{Payload, WorkItem};
use crate::server::Envelope;

pub use worker::{NOOP_ROUTE, WorkContext};

/// Wait between polls of an empty channel unless configured otherwise.
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(1);

/// Client for one server. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    base_url: Url,
    http: reqwest::Client,
    secret: Option<Arc<SecretString>>,
    poll_wait: Duration,
    batch: usize,
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    base_url: String,
    timeout: Option<Duration>,
    secret: Option<SecretString>,
    poll_wait: Duration,
    batch: usize,
}

impl ClientBuilder {
    /// Per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shared secret, sent as a bearer token.
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Wait between polls of an empty channel in [`Client::work_loop`].
    /// Zero keeps the default.
    pub fn poll_wait(mut self, wait: Duration) -> Self {
        if !wait.is_zero() {
            self.poll_wait = wait;
        }
        self
    }

    /// Items requested per pop in [`Client::work_loop`].
    pub fn batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    pub fn build(self) -> Result<Client> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {}: {e}", self.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base URL {} cannot carry a path",
                self.base_url
            )));
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }

        Ok(Client {
            base_url,
            http: http.build()?,
            secret: self.secret.map(Arc::new),
            poll_wait: self.poll_wait,
            batch: self.batch,
        })
    }
}

impl Client {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            base_url: base_url.into(),
            timeout: None,
            secret: None,
            poll_wait: DEFAULT_POLL_WAIT,
            batch: 1,
        }
    }

    /// Client with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn poll_wait(&self) -> Duration {
        self.poll_wait
    }

    /// Push to an item address (`tenant:channel:id`, see [`Address::parse`]).
    /// The string is sent as given, so the server resolves it the same way.
    pub async fn push(&self, address: &str, payload: Option<&Payload>) -> Result<()> {
        check_item(&Address::parse(address))?;
        self.send_push(address, payload).await
    }

    /// Push to a resolved address. Fails with [`Error::Validation`] when the
    /// address has no wire form that resolves back to it.
    pub async fn push_item(&self, address: &Address, payload: Option<&Payload>) -> Result<()> {
        check_item(address)?;
        self.send_push(&address.encode()?, payload).await
    }

    async fn send_push(&self, wire: &str, payload: Option<&Payload>) -> Result<()> {
        let mut req = self.http.post(self.url(&["push", wire])?);
        if let Some(payload) = payload {
            req = req.json(payload);
        }
        self.send(req).await.map(|_| ())
    }

    /// Pop up to `count` items from a channel address (`tenant:channel`).
    /// An empty channel yields an empty `Vec`.
    pub async fn pop(&self, channel: &str, count: usize) -> Result<Vec<WorkItem>> {
        check_channel(channel)?;
        let count = count.max(1).to_string();
        let env = self
            .send(self.http.get(self.url(&["pop", channel, &count])?))
            .await?;
        Ok(env.items.unwrap_or_default())
    }

    pub async fn count(&self, channel: &str) -> Result<u64> {
        check_channel(channel)?;
        let env = self
            .send(self.http.get(self.url(&["count", channel])?))
            .await?;
        Ok(env.count.unwrap_or(0))
    }

    pub async fn reset(&self, channel: &str) -> Result<()> {
        check_channel(channel)?;
        self.send(self.http.get(self.url(&["reset", channel])?))
            .await
            .map(|_| ())
    }

    /// Channel counts of `tenant`, including the stats namespace.
    pub async fn channels(&self, tenant: &str) -> Result<BTreeMap<String, u64>> {
        let env = self
            .send(self.http.get(self.url(&["channels", tenant])?))
            .await?;
        Ok(env.channels.unwrap_or_default())
    }

    pub async fn tenants(&self, physical: bool) -> Result<Vec<String>> {
        let physical = if physical { "true" } else { "false" };
        let env = self
            .send(self.http.get(self.url(&["listapps", physical])?))
            .await?;
        Ok(env.apps.unwrap_or_default())
    }

    pub async fn stats(&self, tenant: &str) -> Result<BTreeMap<String, u64>> {
        let env = self
            .send(self.http.get(self.url(&["stats", tenant])?))
            .await?;
        Ok(env.stats.unwrap_or_default())
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(self.http.get(self.url(&["pause"])?))
            .await
            .map(|_| ())
    }

    pub async fn unpause(&self) -> Result<()> {
        self.send(self.http.get(self.url(&["unpause"])?))
            .await
            .map(|_| ())
    }

    /// `<base>/solidq/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("base URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push("solidq")
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Envelope> {
        let req = match &self.secret {
            Some(secret) => req.bearer_auth(secret.expose_secret()),
            None => req,
        };

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        let envelope: Envelope = serde_json::from_slice(&body).map_err(|e| {
            Error::Other(format!(
                "unexpected response ({status}): {e}: {}",
                String::from_utf8_lossy(&body)
            ))
        })?;

        if envelope.is_paused {
            return Err(Error::Paused);
        }

        let message = || {
            envelope
                .error
                .clone()
                .unwrap_or_else(|| "operation failed without an error message".to_string())
        };
        match status {
            StatusCode::BAD_REQUEST => Err(Error::Validation(message())),
            StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
            s if !s.is_success() => Err(Error::Other(format!("server returned {s}: {}", message()))),
            _ if !envelope.success => Err(Error::Other(message())),
            _ => Ok(envelope),
        }
    }
}

fn check_item(address: &Address) -> Result<()> {
    if address.channel.is_empty() {
        return Err(Error::Validation("channel cannot be empty".into()));
    }
    if address.id.is_empty() {
        return Err(Error::Validation("work id cannot be empty".into()));
    }
    Ok(())
}

/// Sent as given; the server resolves it the same way.
fn check_channel(channel: &str) -> Result<()> {
    if ChannelAddress::parse(channel).channel.is_empty() {
        return Err(Error::Validation("channel cannot be empty".into()));
    }
    Ok(())
}
