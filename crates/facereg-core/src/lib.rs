//! facereg-core — Face enrollment registry and match decision engine.
//!
//! Stores enrolled (identity, embedding) pairs and decides whether a probe
//! embedding belongs to one of them, using cosine similarity for ranking
//! and Euclidean distance as a second acceptance gate. FaceNet embedding
//! and anti-spoof models run via ONNX Runtime.

pub mod embedder;
pub mod liveness;
pub mod locator;
pub mod matcher;
pub mod persistence;
pub mod pipeline;
pub mod store;
pub mod types;

use std::path::PathBuf;

pub use embedder::{EmbedderError, EmbeddingModel, FaceNetEmbedder};
pub use liveness::{OnnxSpoofCheck, SpoofCheck};
pub use locator::{BoundingBox, CenterCropLocator, DetectorLocator, FaceDetector, FaceLocator};
pub use matcher::{DualThresholdMatcher, MatchError, Matcher, Thresholds};
pub use persistence::{
    CorruptRecord, DirectoryPersistence, EmbeddingPersistence, MemoryPersistence, PersistenceError,
};
pub use pipeline::{
    EnrollOutcome, FacePipeline, PipelineError, RecognitionOutcome, RegistrationSession,
};
pub use store::{EmbeddingStore, StoreError};
pub use types::{Embedding, EnrollmentRecord, MatchDecision, DEFAULT_EMBEDDING_DIM};

/// System-wide location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/facereg/models")
}
