//! Key-value persistence for enrolled embeddings.
//!
//! Each identity maps to one human-readable text entry: the embedding's
//! values as comma-separated decimals.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// File extension for on-disk enrollment entries.
pub const ENTRY_EXTENSION: &str = "embedding";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("identity {0:?} cannot be used as a storage key")]
    InvalidKey(String),
    #[error("no entry for identity {0:?}")]
    NotFound(String),
}

/// A persisted entry that could not be turned into a valid embedding.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("corrupt record for {identity:?}: {reason}")]
pub struct CorruptRecord {
    pub identity: String,
    pub reason: String,
}

/// Storage backend mapping identity -> encoded embedding text.
pub trait EmbeddingPersistence: Send + Sync {
    /// List every stored identity.
    fn keys(&self) -> Result<Vec<String>, PersistenceError>;
    /// Read the raw text stored for `identity`.
    fn read(&self, identity: &str) -> Result<String, PersistenceError>;
    /// Insert or replace the text stored for `identity`.
    fn write(&self, identity: &str, contents: &str) -> Result<(), PersistenceError>;
}

/// Encode embedding values as comma-separated decimals.
pub fn encode_embedding(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode comma-separated decimals, requiring exactly `dim` finite values.
pub fn decode_embedding(identity: &str, text: &str, dim: usize) -> Result<Vec<f32>, CorruptRecord> {
    let corrupt = |reason: String| CorruptRecord {
        identity: identity.to_string(),
        reason,
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(corrupt("empty entry".into()));
    }

    let mut values = Vec::with_capacity(dim);
    for (i, field) in text.split(',').enumerate() {
        let field = field.trim();
        let v: f32 = field
            .parse()
            .map_err(|_| corrupt(format!("field {i} is not a number: {field:?}")))?;
        if !v.is_finite() {
            return Err(corrupt(format!("field {i} is not finite: {field:?}")));
        }
        values.push(v);
    }

    if values.len() != dim {
        return Err(corrupt(format!(
            "expected {dim} values, got {}",
            values.len()
        )));
    }

    Ok(values)
}

/// One `<identity>.embedding` file per record in a directory.
pub struct DirectoryPersistence {
    dir: PathBuf,
}

impl DirectoryPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, identity: &str) -> Result<PathBuf, PersistenceError> {
        if !is_safe_key(identity) {
            return Err(PersistenceError::InvalidKey(identity.to_string()));
        }
        Ok(self.dir.join(format!("{identity}.{ENTRY_EXTENSION}")))
    }
}

/// Keys become file stems: reject anything that could escape the directory
/// or produce a hidden file.
fn is_safe_key(identity: &str) -> bool {
    !identity.is_empty()
        && !identity.starts_with('.')
        && !identity.contains(['/', '\\', '\0'])
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Storage keys from directory entries. An entry that cannot be read is
/// logged and skipped rather than failing the whole listing.
fn collect_keys(dir: &Path, entries: impl Iterator<Item = io::Result<PathBuf>>) -> Vec<String> {
    let mut keys = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "unreadable directory entry; skipping");
                continue;
            }
        };
        if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if is_safe_key(stem) => keys.push(stem.to_string()),
            _ => tracing::warn!(path = %path.display(), "skipping entry with unusable name"),
        }
    }
    keys.sort();
    keys
}

impl EmbeddingPersistence for DirectoryPersistence {
    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "enrollment directory absent");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_err(&self.dir)(e)),
        };

        Ok(collect_keys(&self.dir, entries.map(|e| e.map(|e| e.path()))))
    }

    fn read(&self, identity: &str) -> Result<String, PersistenceError> {
        let path = self.entry_path(identity)?;
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PersistenceError::NotFound(identity.to_string())
            } else {
                io_err(&path)(e)
            }
        })
    }

    fn write(&self, identity: &str, contents: &str) -> Result<(), PersistenceError> {
        let path = self.entry_path(identity)?;
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        // Write-then-rename so a reader never sees a partial entry. Each
        // write gets its own temp file; concurrent writers never share one.
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(io_err(&self.dir))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| io_err(tmp.path())(e))?;
        tmp.persist(&path).map_err(|e| io_err(&path)(e.error))?;
        Ok(())
    }
}

/// In-memory backend for ephemeral sessions and tests.
#[derive(Default)]
pub struct MemoryPersistence {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with raw entries, bypassing the codec.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EmbeddingPersistence for MemoryPersistence {
    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn read(&self, identity: &str) -> Result<String, PersistenceError> {
        self.lock()
            .get(identity)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(identity.to_string()))
    }

    fn write(&self, identity: &str, contents: &str) -> Result<(), PersistenceError> {
        self.lock().insert(identity.to_string(), contents.to_string());
        Ok(())
    }
}
