//! Pluggable conversation persistence.
//!
//! The store is volatile by default; a backend, when configured, is invoked
//! at the store's boundaries: load on first access, save after each
//! successful exchange, delete on eviction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;

use super::ConversationState;
use super::error::{Result, SessionError};

/// Durable storage for conversation state, keyed by thread id.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Load a thread's state, or `None` if it was never saved.
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;

    /// Save a thread's state, replacing any previous version.
    async fn save(&self, state: &ConversationState) -> Result<()>;

    /// Delete a thread's state. Deleting an absent thread is not an error.
    async fn delete(&self, thread_id: &str) -> Result<()>;
}

/// File-backed implementation: one JSON document per thread.
///
/// Thread ids are caller-supplied opaque strings, so file names are derived
/// by hashing rather than trusting the id to be filesystem-safe.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        let digest = Sha256::digest(thread_id.as_bytes());
        let mut name = String::with_capacity(64 + 5);
        for byte in digest {
            name.push_str(&format!("{byte:02x}"));
        }
        name.push_str(".json");
        self.dir.join(name)
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::io(&self.dir, e))
    }
}

#[async_trait]
impl SessionBackend for FileBackend {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let path = self.path_for(thread_id);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::io(path, e)),
        };

        let state: ConversationState = serde_json::from_str(&contents)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &ConversationState) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.path_for(&state.thread_id);
        let contents = serde_json::to_string(state)?;

        // Write-then-rename so a crash never leaves a torn file behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|e| SessionError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| SessionError::io(&path, e))
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        let path = self.path_for(thread_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::io(path, e)),
        }
    }
}

/// List the hashed file stems present in a backend directory.
///
/// Used by operators inspecting the on-disk layout; the original thread ids
/// are not recoverable from the hashes.
pub async fn list_saved(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SessionError::io(dir, e)),
    };

    let mut stems = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SessionError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}
