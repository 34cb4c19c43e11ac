use anyhow::{Context, Result};
use facereg_core::liveness::DEFAULT_SPOOF_THRESHOLD;
use facereg_core::matcher::{DEFAULT_COSINE_THRESHOLD, DEFAULT_EUCLIDEAN_THRESHOLD};
use facereg_core::{Thresholds, DEFAULT_EMBEDDING_DIM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration: defaults, then an optional TOML file, then
/// `FACEREG_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root data directory; enrollments live in `<data_dir>/embeddings`.
    pub data_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// FaceNet model file name, relative to `model_dir`.
    pub embedding_model: String,
    /// Optional anti-spoof model file name; enrollment is ungated without it.
    pub spoof_model: Option<String>,
    /// Embedding length shared by every record and probe.
    pub embedding_dim: usize,
    /// Cosine similarity must exceed this for a match.
    pub cosine_threshold: f32,
    /// Euclidean distance must stay below this for a match.
    pub euclidean_threshold: f32,
    /// Spoof probability at or above which enrollment is refused.
    pub spoof_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facereg");

        Self {
            data_dir,
            model_dir: facereg_core::default_model_dir(),
            embedding_model: "facenet.onnx".to_string(),
            spoof_model: None,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            cosine_threshold: DEFAULT_COSINE_THRESHOLD,
            euclidean_threshold: DEFAULT_EUCLIDEAN_THRESHOLD,
            spoof_threshold: DEFAULT_SPOOF_THRESHOLD,
        }
    }
}

impl Config {
    /// Resolve the effective configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FACEREG_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FACEREG_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FACEREG_EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Some(v) = var("FACEREG_SPOOF_MODEL") {
            self.spoof_model = (!v.is_empty()).then_some(v);
        }
        override_parsed(&var, "FACEREG_EMBEDDING_DIM", &mut self.embedding_dim);
        override_parsed(&var, "FACEREG_COSINE_THRESHOLD", &mut self.cosine_threshold);
        override_parsed(&var, "FACEREG_EUCLIDEAN_THRESHOLD", &mut self.euclidean_threshold);
        override_parsed(&var, "FACEREG_SPOOF_THRESHOLD", &mut self.spoof_threshold);
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            cosine: self.cosine_threshold,
            euclidean: self.euclidean_threshold,
        }
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.data_dir.join("embeddings")
    }

    pub fn embedding_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.embedding_model)
    }

    pub fn spoof_model_path(&self) -> Option<PathBuf> {
        self.spoof_model.as_ref().map(|m| self.model_dir.join(m))
    }
}

/// Replace `slot` with the parsed variable; unparseable values are ignored
/// with a warning.
fn override_parsed<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = var(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}
