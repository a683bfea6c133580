//! Core data model.
//!
//! A work item is an identifier pending processing, optionally carrying a
//! payload. Channels order their items by identifier bytes, not arrival time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant used when an address does not name one.
pub const DEFAULT_TENANT: &str = "core";

/// Channel used when an address does not name one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Reserved namespace holding the per-tenant usage counters.
pub const STATS_NAMESPACE: &str = "app_stats";

/// Payload type used by the HTTP deployment.
pub type Payload = serde_json::Value;

/// A unit of pending work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem<P = Payload> {
    /// Caller-supplied identifier, unique within its channel.
    pub id: String,

    /// Opaque to the engine; serialized as JSON on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<P>,
}

impl<P> WorkItem<P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
        }
    }

    pub fn with_payload(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload: Some(payload),
        }
    }
}

/// Which counter a stat key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOp {
    Push,
    Pop,
}

impl StatOp {
    /// Counter key for `channel`, e.g. `jobs:push`.
    pub fn key(self, channel: &str) -> String {
        format!("{channel}:{self}")
    }
}

impl std::fmt::Display for StatOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatOp::Push => "push",
            StatOp::Pop => "pop",
        };
        write!(f, "{s}")
    }
}

/// A time-ordered identifier (UUIDv7).
///
/// Pop order is key order, so producers that want arrival order should use
/// ids that sort by creation time. UUIDv7 strings do.
pub fn sortable_id() -> String {
    Uuid::now_v7().to_string()
}
