use serde::{Deserialize, Serialize, Serializer};

/// Embedding length produced by the FaceNet model.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;

/// Face embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Mismatched lengths and undefined results (zero-magnitude input,
    /// non-finite values) yield 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
        if sim.is_nan() {
            0.0
        } else {
            sim.clamp(-1.0, 1.0)
        }
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Mismatched lengths yield `+inf`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }

        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// True if every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// An enrolled identity and its reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity: String,
    pub embedding: Embedding,
}

impl EnrollmentRecord {
    pub fn new(identity: impl Into<String>, embedding: impl Into<Embedding>) -> Self {
        Self {
            identity: identity.into(),
            embedding: embedding.into(),
        }
    }
}

/// Result of matching a probe embedding against the enrolled records.
#[derive(Debug, Clone, Serialize)]
pub struct MatchDecision {
    /// The leading record, present only when it passed both thresholds.
    pub best_record: Option<EnrollmentRecord>,
    /// Cosine similarity of the leading candidate; -1 when there were no candidates.
    #[serde(serialize_with = "serialize_score")]
    pub best_cosine_similarity: f32,
    /// Euclidean distance of that same leading candidate (not the minimum over
    /// all records); `+inf` when there were no candidates.
    #[serde(serialize_with = "serialize_score")]
    pub corresponding_euclidean_distance: f32,
    pub accepted: bool,
}

/// Finite scores serialize as numbers; infinities as `"inf"` / `"-inf"`,
/// which JSON cannot represent as numbers.
fn serialize_score<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_infinite() {
        serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
    } else {
        serializer.serialize_f32(*value)
    }
}

impl MatchDecision {
    /// Decision for an empty candidate set: nothing could be compared.
    pub fn no_candidates() -> Self {
        Self {
            best_record: None,
            best_cosine_similarity: -1.0,
            corresponding_euclidean_distance: f32::INFINITY,
            accepted: false,
        }
    }

    /// Identity of the accepted record, if any.
    pub fn identity(&self) -> Option<&str> {
        self.best_record.as_ref().map(|r| r.identity.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[0.3, -1.2, 4.5, 0.01]);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
        assert_eq!(a.similarity(&a), 0.0);
    }

    #[test]
    fn test_cosine_similarity_nan_input() {
        let a = emb(&[f32::NAN, 1.0]);
        let b = emb(&[1.0, 1.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = emb(&[0.5, -0.25, 2.0]);
        let b = emb(&[1.5, 0.75, -0.5]);
        assert_eq!(a.similarity(&b), b.similarity(&a));
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
    }

    #[test]
    fn test_euclidean_self_is_zero() {
        let a = emb(&[0.3, -1.2, 4.5]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_known_value() {
        let a = emb(&[0.0, 0.0]);
        let b = emb(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_length_mismatch() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_decision_json_keeps_infinite_distance() {
        let json = serde_json::to_value(MatchDecision::no_candidates()).unwrap();
        assert_eq!(json["corresponding_euclidean_distance"], "inf");
        assert_eq!(json["best_cosine_similarity"], -1.0);
        assert_eq!(json["accepted"], false);
        assert!(json["best_record"].is_null());
    }

    #[test]
    fn test_decision_json_finite_scores_are_numbers() {
        let decision = MatchDecision {
            best_record: Some(EnrollmentRecord::new("A", vec![1.0, 0.0])),
            best_cosine_similarity: 0.5,
            corresponding_euclidean_distance: 0.25,
            accepted: true,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["best_cosine_similarity"], 0.5);
        assert_eq!(json["corresponding_euclidean_distance"], 0.25);
        assert_eq!(json["best_record"]["identity"], "A");
    }

    #[test]
    fn test_no_candidates_decision() {
        let d = MatchDecision::no_candidates();
        assert!(!d.accepted);
        assert!(d.best_record.is_none());
        assert_eq!(d.best_cosine_similarity, -1.0);
        assert_eq!(d.corresponding_euclidean_distance, f32::INFINITY);
        assert_eq!(d.identity(), None);
    }
}
