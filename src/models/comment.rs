use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A comment on a bug. Immutable once decoded; the server schema is open, so
/// anything beyond the known fields lands in `extra`.
#[derive(Debug, Deserialize, Clone)]
pub struct Comment {
    #[serde(default)]
    pub id: Option<u64>,
    pub creation_time: DateTime<Utc>,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
