//! Session token persistence.
//!
//! `SessionStore` is a capability: the rest of the crate never asks whether
//! persistent storage exists, it gets a store that either persists or quietly
//! does nothing.
//!
//! Backends:
//! - `FileSessionStore`: a JSON object of string entries on disk, the same
//!   shape as browser local storage
//! - `MemorySessionStore`: process-local
//! - `NullSessionStore`: no storage available; reads are empty, writes vanish
//!
//! None of the operations fail. I/O problems are logged and degrade to
//! "no token".

use super::token::Token;
use crate::config::StorageConfig;
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Where the current bearer token lives.
///
/// Invariant: after `clear()`, `get()` returns `None` until the next `set()`.
pub trait SessionStore: Send + Sync {
    /// Backend name, for logs and `status` output.
    fn name(&self) -> &str;

    fn get(&self) -> Option<Token>;

    fn set(&self, token: &Token);

    fn clear(&self);

    /// Whether the token survives the process.
    fn is_persistent(&self) -> bool {
        false
    }
}

/// Factory: create the right store from config.
pub fn create_session_store(config: &StorageConfig) -> Result<Arc<dyn SessionStore>> {
    match config.kind.trim() {
        "file" => {
            let path = config.resolved_path().ok_or_else(|| {
                anyhow!("storage.kind='file' needs storage.path: no platform data directory")
            })?;
            Ok(Arc::new(FileSessionStore::new(
                path,
                config.token_key.clone(),
                config.clear_keys.clone(),
            )))
        }
        "memory" => Ok(Arc::new(MemorySessionStore::new())),
        "none" => Ok(Arc::new(NullSessionStore)),
        "" => bail!("storage.kind cannot be empty. Supported values: file, memory, none"),
        other => bail!("Unknown storage kind '{other}'. Supported values: file, memory, none"),
    }
}

// ── File ────────────────────────────────────────────────────────

/// File-backed store: `{"<token_key>": "<token>", ...}`.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    token_key: String,
    clear_keys: Vec<String>,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>, token_key: impl Into<String>, clear_keys: Vec<String>) -> Self {
        Self {
            path: path.into(),
            token_key: token_key.into(),
            clear_keys,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("Session file {} is not a JSON object", self.path.display()))
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<()> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        // Created owner-only (0600 on unix) before any byte is written.
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(&serde_json::to_vec_pretty(entries)?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self) -> Option<Token> {
        let _guard = self.lock.lock();
        match self.read_entries() {
            Ok(entries) => entries
                .get(&self.token_key)
                .and_then(Value::as_str)
                .and_then(Token::new),
            Err(e) => {
                tracing::warn!("Session store unreadable, treating as empty: {e:#}");
                None
            }
        }
    }

    fn set(&self, token: &Token) {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries().unwrap_or_else(|e| {
            tracing::warn!("Replacing unreadable session store: {e:#}");
            Map::new()
        });
        entries.insert(self.token_key.clone(), Value::String(token.as_str().to_string()));
        if let Err(e) = self.write_entries(&entries) {
            tracing::warn!(path = %self.path.display(), "Failed to persist session token: {e:#}");
        }
    }

    fn clear(&self) {
        let _guard = self.lock.lock();
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Discarding unreadable session store: {e:#}");
                Map::new()
            }
        };
        entries.remove(&self.token_key);
        for key in &self.clear_keys {
            entries.remove(key);
        }
        if let Err(e) = self.write_entries(&entries) {
            tracing::warn!(path = %self.path.display(), "Failed to clear session store: {e:#}");
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

// ── Memory ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<Token>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self) -> Option<Token> {
        self.token.lock().clone()
    }

    fn set(&self, token: &Token) {
        *self.token.lock() = Some(token.clone());
    }

    fn clear(&self) {
        self.token.lock().take();
    }
}

// ── Null ────────────────────────────────────────────────────────

/// Store for contexts without persistent storage (pre-render, headless checks).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSessionStore;

impl SessionStore for NullSessionStore {
    fn name(&self) -> &str {
        "none"
    }

    fn get(&self) -> Option<Token> {
        None
    }

    fn set(&self, _token: &Token) {}

    fn clear(&self) {}
}
