//! Typed async client for the Bugzilla REST API.

pub mod bug;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod search;

pub use bug::Bug;
pub use client::BugzillaClient;
pub use config::{AuthStyle, BugzillaConfig, ConfigFile, ConfigProfile, Environment};
pub use error::{BugzillaError, Result};
pub use models::{Change, Comment, HistoryEvent};
pub use search::{SearchQuery, DEFAULT_PAGE_SIZE};
