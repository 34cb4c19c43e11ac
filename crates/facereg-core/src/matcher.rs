//! Dual-metric nearest-match decision.
//!
//! Cosine similarity ranks candidates; the Euclidean distance of the
//! leading candidate is carried alongside it as corroborating evidence.
//! Acceptance requires both metrics to clear their thresholds.

use crate::types::{Embedding, EnrollmentRecord, MatchDecision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_COSINE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_EUCLIDEAN_THRESHOLD: f32 = 3.0;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("invalid probe: {0}")]
    InvalidInput(String),
}

/// Acceptance thresholds. Both must be satisfied strictly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Cosine similarity must be strictly greater than this.
    pub cosine: f32,
    /// Euclidean distance must be strictly less than this.
    pub euclidean: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cosine: DEFAULT_COSINE_THRESHOLD,
            euclidean: DEFAULT_EUCLIDEAN_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn accepts(&self, cosine: f32, euclidean: f32) -> bool {
        cosine > self.cosine && euclidean < self.euclidean
    }
}

/// Strategy for comparing a probe embedding against enrolled records.
pub trait Matcher {
    fn match_probe(
        &self,
        probe: &Embedding,
        candidates: &[EnrollmentRecord],
    ) -> Result<MatchDecision, MatchError>;
}

/// Cosine-ranked matcher with a Euclidean corroboration gate.
///
/// Always iterates every candidate. Exact cosine ties resolve to the
/// first-seen candidate, so enumeration order only matters for ties.
#[derive(Debug, Clone)]
pub struct DualThresholdMatcher {
    dim: usize,
    thresholds: Thresholds,
}

impl DualThresholdMatcher {
    pub fn new(dim: usize, thresholds: Thresholds) -> Self {
        Self { dim, thresholds }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    fn validate(&self, probe: &Embedding) -> Result<(), MatchError> {
        if probe.len() != self.dim {
            return Err(MatchError::InvalidInput(format!(
                "expected {}-dim probe, got {}",
                self.dim,
                probe.len()
            )));
        }
        if !probe.is_finite() {
            return Err(MatchError::InvalidInput(
                "probe contains non-finite values".into(),
            ));
        }
        Ok(())
    }
}

impl Matcher for DualThresholdMatcher {
    fn match_probe(
        &self,
        probe: &Embedding,
        candidates: &[EnrollmentRecord],
    ) -> Result<MatchDecision, MatchError> {
        self.validate(probe)?;

        if candidates.is_empty() {
            tracing::debug!("no enrolled records to compare against");
            return Ok(MatchDecision::no_candidates());
        }

        // (index, cosine, euclidean) of the leading candidate.
        let mut leader: Option<(usize, f32, f32)> = None;

        for (i, record) in candidates.iter().enumerate() {
            if record.embedding.len() != probe.len() {
                tracing::warn!(
                    identity = %record.identity,
                    expected = probe.len(),
                    got = record.embedding.len(),
                    "embedding length mismatch; candidate cannot match"
                );
            }

            let cosine = probe.similarity(&record.embedding);
            let euclidean = probe.euclidean_distance(&record.embedding);

            tracing::debug!(
                identity = %record.identity,
                cosine,
                euclidean,
                "compared candidate"
            );

            let leads = match leader {
                None => true,
                Some((_, best, _)) => cosine > best,
            };
            if leads {
                leader = Some((i, cosine, euclidean));
            }
        }

        let (idx, cosine, euclidean) = match leader {
            Some(l) => l,
            None => return Ok(MatchDecision::no_candidates()),
        };

        let accepted = self.thresholds.accepts(cosine, euclidean);

        tracing::info!(
            candidates = candidates.len(),
            leader = %candidates[idx].identity,
            cosine,
            euclidean,
            accepted,
            "match decision"
        );

        Ok(MatchDecision {
            best_record: accepted.then(|| candidates[idx].clone()),
            best_cosine_similarity: cosine,
            corresponding_euclidean_distance: euclidean,
            accepted,
        })
    }
}
