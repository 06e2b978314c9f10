use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::BugzillaClient;
use crate::error::{BugzillaError, Result};
use crate::models::response::{CommentsBody, HistoryBody};
use crate::models::{Comment, HistoryEvent};

/// Cache slot for a derived view: unresolved until first use, then either the
/// value or a stable precondition failure. Transient transport errors leave the
/// slot unresolved so the next access retries.
#[derive(Debug, Clone)]
enum Slot<T> {
    Unresolved,
    Resolved(T),
    Failed,
}

/// A bug record bound to the client it was fetched through.
///
/// Fields are the server's open schema, kept verbatim; typed accessors cover
/// the well-known ones. Derived views (history, comments, status-change time)
/// resolve on first access and stay cached for the lifetime of this instance.
/// Writes never update the instance; re-fetch to observe them.
#[derive(Clone)]
pub struct Bug {
    client: BugzillaClient,
    id: u64,
    fields: Map<String, Value>,
    history: Option<Vec<HistoryEvent>>,
    comments: Option<Vec<Comment>>,
    changed_status_at: Option<Option<DateTime<Utc>>>,
    comments_since_status_change: Slot<Vec<Comment>>,
}

impl Bug {
    pub(crate) fn from_fields(fields: Map<String, Value>, client: BugzillaClient) -> Result<Self> {
        let id = fields
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                BugzillaError::Decode("bug object is missing a numeric `id` field".to_string())
            })?;
        Ok(Self {
            client,
            id,
            fields,
            history: None,
            comments: None,
            changed_status_at: None,
            comments_since_status_change: Slot::Unresolved,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn summary(&self) -> Option<&str> {
        self.str_field("summary")
    }

    pub fn status(&self) -> Option<&str> {
        self.str_field("status")
    }

    pub fn resolution(&self) -> Option<&str> {
        self.str_field("resolution")
    }

    pub fn product(&self) -> Option<&str> {
        self.str_field("product")
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        self.time_field("creation_time")
    }

    pub fn last_change_time(&self) -> Option<DateTime<Utc>> {
        self.time_field("last_change_time")
    }

    /// Pass-through access to any field the server sent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Complete change history of this bug, oldest first. Fetched once, then
    /// served from the instance cache.
    pub async fn history(&mut self) -> Result<&[HistoryEvent]> {
        if self.history.is_none() {
            let path = format!("bug/{}/history", self.id);
            let body: HistoryBody = self.client.get(&path).await?;
            self.history = Some(body.into_history(self.id)?);
        }
        Ok(self.history.as_deref().unwrap_or_default())
    }

    /// Full comment thread of this bug, oldest first. Fetched once, then served
    /// from the instance cache.
    pub async fn comments(&mut self) -> Result<&[Comment]> {
        if self.comments.is_none() {
            self.comments = Some(self.fetch_comments(None).await?);
        }
        Ok(self.comments.as_deref().unwrap_or_default())
    }

    /// Comments created at or after `new_since`. Always a fresh request; the
    /// cutoff varies per call, so the result is never cached and the full-thread
    /// cache is left untouched.
    pub async fn comments_since(&self, new_since: DateTime<Utc>) -> Result<Vec<Comment>> {
        let cutoff = new_since.to_rfc3339_opts(SecondsFormat::Secs, true);
        self.fetch_comments(Some(&[("new_since", cutoff.as_str())])).await
    }

    /// When the bug's `status` field last changed, or `None` if no recorded
    /// event touches status. Memoized, including the `None` outcome.
    pub async fn changed_status_at(&mut self) -> Result<Option<DateTime<Utc>>> {
        if let Some(memo) = self.changed_status_at {
            return Ok(memo);
        }
        let at = self
            .history()
            .await?
            .iter()
            .rev()
            .find(|event| event.touches_status())
            .map(|event| event.when);
        self.changed_status_at = Some(at);
        Ok(at)
    }

    /// Comments posted since the last status change. Fails with a precondition
    /// error when the bug has no status change on record; that failure is as
    /// stable as the success and is served from the cache slot on re-access.
    pub async fn comments_since_status_change(&mut self) -> Result<&[Comment]> {
        if matches!(self.comments_since_status_change, Slot::Unresolved) {
            match self.changed_status_at().await? {
                Some(cutoff) => {
                    let thread = self.comments_since(cutoff).await?;
                    self.comments_since_status_change = Slot::Resolved(thread);
                }
                None => self.comments_since_status_change = Slot::Failed,
            }
        }
        match &self.comments_since_status_change {
            Slot::Resolved(thread) => Ok(thread.as_slice()),
            _ => Err(BugzillaError::Precondition(format!(
                "bug {} has no status change in its history",
                self.id
            ))),
        }
    }

    /// Creation time of the newest comment, `None` for an empty thread.
    pub async fn last_comment_at(&mut self) -> Result<Option<DateTime<Utc>>> {
        let comments = self.comments().await?;
        Ok(comments.last().map(|comment| comment.creation_time))
    }

    /// Forces the derived views to resolve now instead of on first access.
    /// A bug without a status change is left with its post-status-change view
    /// in the failed state rather than aborting the caller's batch.
    pub async fn resolve(&mut self) -> Result<()> {
        self.history().await?;
        let outcome = self.comments_since_status_change().await.map(|_| ());
        match outcome {
            Err(BugzillaError::Precondition(reason)) => {
                debug!(bug = self.id, "skipping comment resolution: {}", reason);
                Ok(())
            }
            other => other,
        }
    }

    /// Sends a partial update with the given field map as the request body.
    /// The local instance is deliberately left untouched; fetch a fresh one to
    /// observe the write.
    pub async fn update(&self, fields: &Map<String, Value>) -> Result<()> {
        let path = format!("bug/{}", self.id);
        self.client
            .send_expect_success(Method::PUT, &path, Some(fields))
            .await
    }

    /// Posts a new comment. Extra fields are passed through to the endpoint;
    /// the `comment` key always carries `text`, even against a colliding extra.
    /// Neither the instance nor its comment cache is updated.
    pub async fn comment(&self, text: &str, extra: Map<String, Value>) -> Result<()> {
        let path = format!("bug/{}/comment", self.id);
        let mut payload = extra;
        payload.insert("comment".to_string(), Value::String(text.to_string()));
        self.client
            .send_expect_success(Method::POST, &path, Some(&payload))
            .await
    }

    async fn fetch_comments(&self, query: Option<&[(&str, &str)]>) -> Result<Vec<Comment>> {
        let path = format!("bug/{}/comment", self.id);
        let body: CommentsBody = self.client.get_with_query(&path, query).await?;
        body.into_thread(self.id)
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    fn time_field(&self, name: &str) -> Option<DateTime<Utc>> {
        self.str_field(name)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
    }
}

impl fmt::Debug for Bug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bug")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("history", &self.history)
            .field("comments", &self.comments)
            .field("changed_status_at", &self.changed_status_at)
            .finish_non_exhaustive()
    }
}
