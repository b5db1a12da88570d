//! Session records and their message logs
//!
//! Sessions are the unit the orchestrator coordinates: a benchmark attaches
//! a parent record to one session and child records to N others. This crate
//! consumes the store as a CRUD collaborator; the shipped implementation
//! keeps one JSON document per session (see [`JsonSessionStore`]).

pub mod store;

pub use store::{JsonSessionStore, SessionError, SessionResult, SessionStore};

use crate::benchmark::SessionBenchmarkState;
use crate::models::ModelRef;
use crate::store::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Owning session, for sessions spawned by another (benchmark children)
    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    /// Most recently used model, consulted when `start` gets no explicit list
    #[serde(default)]
    pub model: Option<ModelRef>,

    /// Benchmark role, when this session takes part in one
    #[serde(default)]
    pub benchmark: Option<SessionBenchmarkState>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            title: None,
            model: None,
            benchmark: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry in a session's message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,

    /// Snapshot taken when the step producing this message finished; the
    /// orchestrator scans for the newest one when a child has no recorded
    /// `last_snapshot`
    #[serde(default)]
    pub snapshot: Option<Snapshot>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            snapshot: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a step-finished snapshot marker
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}
