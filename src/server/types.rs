//! HTTP envelope and shared state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::auth::AuthChain;
use crate::model::WorkItem;
use crate::registry::Registry;

/// Shared application state.
pub type AppState = Arc<ServerState>;

pub struct ServerState {
    pub registry: Arc<Registry>,
    pub gate: AuthChain,
    paused: AtomicBool,
}

impl ServerState {
    pub fn new(registry: Arc<Registry>, gate: AuthChain) -> AppState {
        Arc::new(Self {
            registry,
            gate,
            paused: AtomicBool::new(false),
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }
}

/// Response body of every endpoint. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<WorkItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<String>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn paused() -> Self {
        Self {
            is_paused: true,
            ..Self::default()
        }
    }

    /// Successful pop; an empty batch carries no ids at all.
    pub fn popped(items: Vec<WorkItem>) -> Self {
        if items.is_empty() {
            return Self::ok();
        }
        Self {
            success: true,
            ids: Some(items.iter().map(|item| item.id.clone()).collect()),
            items: Some(items),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_omits_absent_fields() {
        let value = serde_json::to_value(Envelope::ok()).unwrap();
        assert_eq!(value, json!({"success": true, "isPaused": false}));
    }

    #[test]
    fn empty_pop_is_plain_success() {
        assert_eq!(Envelope::popped(Vec::new()), Envelope::ok());
    }

    #[test]
    fn pop_lists_ids_and_items() {
        let env = Envelope::popped(vec![WorkItem::with_payload("a", json!(1))]);
        assert_eq!(env.ids, Some(vec!["a".to_string()]));
        assert_eq!(env.items.unwrap()[0].payload, Some(json!(1)));
    }
}
