//! JSON-file session store
//!
//! One document per session under `<root>/sessions/`, one message log per
//! session under `<root>/messages/`. Writes go through a temp file in the
//! same directory and an atomic rename, so a crash can never leave a
//! half-written record. A store-wide mutex makes `update` the
//! single-writer-per-id primitive the orchestrator relies on.

use super::{Message, Session};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Errors from the session store
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to access session records: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode session record: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// CRUD collaborator the orchestrator mutates session records through
pub trait SessionStore: Send + Sync {
    fn create(&self, session: Session) -> SessionResult<Session>;

    fn get(&self, id: &str) -> SessionResult<Session>;

    /// Read-modify-write under the store's writer lock. The mutator sees the
    /// current record; the mutated record is persisted and returned.
    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut Session),
    ) -> SessionResult<Session>;

    fn list(&self) -> SessionResult<Vec<Session>>;

    fn append_message(&self, session_id: &str, message: Message) -> SessionResult<()>;

    fn list_messages(&self, session_id: &str) -> SessionResult<Vec<Message>>;
}

/// File-backed [`SessionStore`]
pub struct JsonSessionStore {
    root: PathBuf,
    writer: Mutex<()>,
}

impl JsonSessionStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: Mutex::new(()),
        }
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.root.join("sessions").join(format!("{}.json", id))
    }

    fn messages_path(&self, id: &str) -> PathBuf {
        self.root.join("messages").join(format!("{}.json", id))
    }

    fn write_atomic(path: &Path, content: &str) -> SessionResult<()> {
        use std::io::Write;

        let parent = path.parent().ok_or_else(|| {
            SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "record path has no parent directory",
            ))
        })?;
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(content.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| SessionError::Io(err.error))?;
        Ok(())
    }

    fn read_session(&self, id: &str) -> SessionResult<Session> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl SessionStore for JsonSessionStore {
    fn create(&self, session: Session) -> SessionResult<Session> {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let path = self.session_path(&session.id);
        if path.exists() {
            return Err(SessionError::AlreadyExists(session.id.clone()));
        }
        Self::write_atomic(&path, &serde_json::to_string_pretty(&session)?)?;
        Ok(session)
    }

    fn get(&self, id: &str) -> SessionResult<Session> {
        self.read_session(id)
    }

    fn update(
        &self,
        id: &str,
        mutator: &mut dyn FnMut(&mut Session),
    ) -> SessionResult<Session> {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let mut session = self.read_session(id)?;
        mutator(&mut session);
        session.updated_at = Utc::now();
        Self::write_atomic(
            &self.session_path(id),
            &serde_json::to_string_pretty(&session)?,
        )?;
        Ok(session)
    }

    fn list(&self) -> SessionResult<Vec<Session>> {
        let dir = self.root.join("sessions");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                sessions.push(serde_json::from_str(&content)?);
            }
        }
        sessions.sort_by(|a: &Session, b: &Session| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    fn append_message(&self, session_id: &str, message: Message) -> SessionResult<()> {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let path = self.messages_path(session_id);
        let mut messages: Vec<Message> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        messages.push(message);
        Self::write_atomic(&path, &serde_json::to_string_pretty(&messages)?)
    }

    fn list_messages(&self, session_id: &str) -> SessionResult<Vec<Message>> {
        let path = self.messages_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }
}
