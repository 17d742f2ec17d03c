//! User events and paged event listings.

use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// A single tracked user event.
///
/// The service stores metadata as free-form text; some deployments return it
/// as a JSON object instead, so it is kept as a raw JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    #[serde(alias = "timestamp")]
    pub event_timestamp: Timestamp,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl Event {
    /// Metadata rendered as text for substring matching and CSV output.
    pub fn metadata_text(&self) -> Option<String> {
        match &self.metadata {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// One page of the events listing as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<Event>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl EventsPage {
    pub fn empty(page: u32, limit: u32) -> Self {
        Self {
            events: Vec::new(),
            total: 0,
            page,
            limit,
        }
    }
}
