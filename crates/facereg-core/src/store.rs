//! Durable collection of enrolled identities.
//!
//! Records are held behind an `RwLock<Arc<[..]>>`: readers clone the `Arc`
//! and get a frozen snapshot, writers build a new slice and swap it in.
//! An in-flight match therefore never observes a concurrent `add`.
//! Mutations are serialized by a separate writer lock held across the
//! persistence write and the swap, so memory and disk agree on the last
//! writer without blocking snapshot readers on I/O.

use crate::persistence::{decode_embedding, encode_embedding, EmbeddingPersistence, PersistenceError};
use crate::types::{Embedding, EnrollmentRecord};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid enrollment: {0}")]
    InvalidInput(String),
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
}

pub struct EmbeddingStore {
    persistence: Box<dyn EmbeddingPersistence>,
    dim: usize,
    records: RwLock<Arc<[EnrollmentRecord]>>,
    writer: Mutex<()>,
}

impl EmbeddingStore {
    /// Create an empty store. Call [`load_all`](Self::load_all) to pull in
    /// previously persisted records.
    pub fn new(persistence: impl EmbeddingPersistence + 'static, dim: usize) -> Self {
        Self {
            persistence: Box::new(persistence),
            dim,
            records: RwLock::new(Arc::from(Vec::new())),
            writer: Mutex::new(()),
        }
    }

    /// Create a store and load every persisted record.
    pub fn open(
        persistence: impl EmbeddingPersistence + 'static,
        dim: usize,
    ) -> Result<Self, StoreError> {
        let store = Self::new(persistence, dim);
        store.load_all()?;
        Ok(store)
    }

    /// Embedding length every record must have.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Rebuild the record set from persistence.
    ///
    /// Entries that cannot be read or parsed are logged and skipped; one
    /// corrupt enrollment never blocks the rest. Only a failure to list the
    /// stored identities is fatal.
    pub fn load_all(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let _writer = self.writer_guard();
        let keys = self.persistence.keys()?;
        let mut loaded = Vec::with_capacity(keys.len());
        let mut skipped = 0usize;

        for identity in keys {
            let text = match self.persistence.read(&identity) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(identity = %identity, error = %e, "unreadable enrollment; skipping");
                    skipped += 1;
                    continue;
                }
            };

            match decode_embedding(&identity, &text, self.dim) {
                Ok(values) => loaded.push(EnrollmentRecord::new(identity, values)),
                Err(corrupt) => {
                    tracing::warn!(error = %corrupt, "corrupt enrollment; skipping");
                    skipped += 1;
                }
            }
        }

        tracing::info!(loaded = loaded.len(), skipped, dim = self.dim, "enrollments loaded");

        *self.write_guard() = Arc::from(loaded.clone());
        Ok(loaded)
    }

    /// Insert or replace the record for `identity`.
    ///
    /// The entry is persisted first; memory is only updated once the write
    /// succeeded. Re-enrolling an identity silently replaces its embedding.
    /// Identities must not carry leading or trailing whitespace.
    pub fn add(&self, identity: &str, embedding: Embedding) -> Result<(), StoreError> {
        if identity.trim().is_empty() {
            return Err(StoreError::InvalidInput("identity must not be empty".into()));
        }
        if identity.trim() != identity {
            return Err(StoreError::InvalidInput(format!(
                "identity {identity:?} has surrounding whitespace"
            )));
        }
        if embedding.len() != self.dim {
            return Err(StoreError::InvalidInput(format!(
                "expected {}-dim embedding, got {}",
                self.dim,
                embedding.len()
            )));
        }
        if !embedding.is_finite() {
            return Err(StoreError::InvalidInput(
                "embedding contains non-finite values".into(),
            ));
        }

        let _writer = self.writer_guard();
        self.persistence
            .write(identity, &encode_embedding(&embedding.values))?;

        let mut guard = self.write_guard();
        let mut next: Vec<EnrollmentRecord> = guard.to_vec();
        let replaced = match next.iter_mut().find(|r| r.identity == identity) {
            Some(existing) => {
                existing.embedding = embedding;
                true
            }
            None => {
                next.push(EnrollmentRecord::new(identity, embedding));
                false
            }
        };
        *guard = Arc::from(next);

        tracing::info!(identity, replaced, "enrollment saved");
        Ok(())
    }

    /// Immutable view of the current records, in insertion/load order.
    pub fn snapshot(&self) -> Arc<[EnrollmentRecord]> {
        Arc::clone(&self.read_guard())
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.read_guard().iter().any(|r| r.identity == identity)
    }

    fn writer_guard(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Arc<[EnrollmentRecord]>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Arc<[EnrollmentRecord]>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}
