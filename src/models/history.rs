use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One atomicized set of field mutations the server recorded against a bug.
#[derive(Debug, Deserialize, Clone)]
pub struct HistoryEvent {
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub who: Option<String>,
    pub changes: Vec<Change>,
}

impl HistoryEvent {
    /// Whether any change in this event touched the bug's `status` field.
    pub fn touches_status(&self) -> bool {
        self.changes.iter().any(Change::is_status)
    }
}

/// A single field mutation within a [`HistoryEvent`].
#[derive(Debug, Deserialize, Clone)]
pub struct Change {
    pub field_name: String,
    pub removed: String,
    pub added: String,
    #[serde(default)]
    pub attachment_id: Option<u64>,
}

impl Change {
    pub fn is_status(&self) -> bool {
        self.field_name == "status"
    }
}
