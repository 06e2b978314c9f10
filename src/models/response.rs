//! Wire envelopes for Bugzilla list responses. The server wraps everything in a
//! `bugs` key: search results as an array of bug objects, history as
//! `bugs[0].history`, comments as a map from the bug id (rendered as a decimal
//! string) to its thread.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{BugzillaError, Result};

use super::{Comment, HistoryEvent};

#[derive(Debug, Deserialize)]
pub(crate) struct BugListBody {
    pub bugs: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryBody {
    bugs: Vec<HistoryThread>,
}

#[derive(Debug, Deserialize)]
struct HistoryThread {
    history: Vec<HistoryEvent>,
}

impl HistoryBody {
    /// Extracts the (single) requested bug's history, in server order.
    pub(crate) fn into_history(self, id: u64) -> Result<Vec<HistoryEvent>> {
        self.bugs
            .into_iter()
            .next()
            .map(|thread| thread.history)
            .ok_or_else(|| {
                BugzillaError::Decode(format!("history response for bug {} contained no bugs", id))
            })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentsBody {
    bugs: HashMap<String, CommentThread>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    comments: Vec<Comment>,
}

impl CommentsBody {
    /// Extracts the thread for the requested id. A response without that key is
    /// a server contract violation, not an empty thread.
    pub(crate) fn into_thread(mut self, id: u64) -> Result<Vec<Comment>> {
        self.bugs
            .remove(&id.to_string())
            .map(|thread| thread.comments)
            .ok_or_else(|| {
                BugzillaError::Decode(format!("comment response is missing the key for bug {}", id))
            })
    }
}
