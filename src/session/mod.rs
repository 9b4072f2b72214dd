//! Session module - Conversation state and persistence
//!
//! This module provides:
//! - [`ConversationStore`]: the live, ordered message history of one agent
//! - [`SessionManager`]: file-based persistence of finished conversations
//!
//! # Example
//!
//! ```
//! use conductor::session::{ConversationStore, SessionManager, SessionRecord};
//!
//! # tokio_test::block_on(async {
//! let dir = tempfile::tempdir().unwrap();
//! let manager = SessionManager::with_dir(dir.path().to_path_buf());
//!
//! let mut store = ConversationStore::new();
//! store.add_user("Hello!");
//! store.add_assistant("Hi there!");
//!
//! let id = SessionManager::generate_id();
//! manager
//!     .save(&SessionRecord::new(&id, "model", store.snapshot()))
//!     .await
//!     .unwrap();
//! assert!(manager.exists(&id).await);
//! # });
//! ```

mod conversation;
pub mod types;

pub use conversation::ConversationStore;
pub use types::{
    ContentBlock, Message, MessageContent, Role, SessionMetadata, SessionRecord, SessionSummary,
};

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConductorError, Result};

/// Persists session records as one JSON file per session id.
#[derive(Debug, Clone)]
pub struct SessionManager {
    storage_path: PathBuf,
}

impl SessionManager {
    /// Use the sessions directory from config (default `~/.conductor/sessions`).
    pub fn new(config: &Config) -> Self {
        Self::with_dir(config.sessions_dir())
    }

    /// Store sessions under `path`. The directory is created on first save.
    pub fn with_dir(path: PathBuf) -> Self {
        Self { storage_path: path }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Fresh random session id.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Write a record, keeping the original `created_at` if the session was
    /// saved before.
    pub async fn save(&self, record: &SessionRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.storage_path).await?;

        let mut record = record.clone();
        if let Ok(previous) = self.load(&record.session_id).await {
            record.created_at = previous.created_at;
        }
        record.last_updated = Utc::now();

        let path = self.file_path(&record.session_id);
        let content = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&path, content).await?;
        debug!(session = %record.session_id, path = %path.display(), "Saved session");
        Ok(())
    }

    pub async fn load(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.file_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConductorError::NotFound(format!("session '{}'", session_id)));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| {
            ConductorError::Session(format!("Corrupt session file {}: {}", path.display(), e))
        })
    }

    /// Summaries of all stored sessions, newest first. Unreadable files are
    /// skipped with a warning.
    pub async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.storage_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .ok()
                .and_then(|content| serde_json::from_str::<SessionRecord>(&content).ok());
            match parsed {
                Some(record) => summaries.push(SessionSummary {
                    session_id: record.session_id,
                    model: record.model,
                    last_updated: record.last_updated,
                    message_count: record.messages.len(),
                }),
                None => warn!(path = %path.display(), "Skipping unreadable session file"),
            }
        }

        summaries.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(summaries)
    }

    /// Remove a stored session. Returns whether a file was deleted.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.file_path(session_id)).await {
            Ok(()) => {
                info!(session = %session_id, "Deleted session");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        tokio::fs::try_exists(self.file_path(session_id))
            .await
            .unwrap_or(false)
    }

    fn file_path(&self, session_id: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", sanitize_id(session_id)))
    }
}

/// Percent-encode characters that are unsafe in file names.
fn sanitize_id(id: &str) -> String {
    let mut result = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '%' => result.push_str("%25"),
            '.' if result.is_empty() => result.push_str("%2E"),
            c => result.push(c),
        }
    }
    result
}
