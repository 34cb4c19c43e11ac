//! Enrollment and recognition flows.
//!
//! Composes face localization, the embedding model, the optional anti-spoof
//! gate, the store and the matcher into the two user-facing operations.

use crate::embedder::{EmbedderError, EmbeddingModel};
use crate::liveness::SpoofCheck;
use crate::locator::FaceLocator;
use crate::matcher::{DualThresholdMatcher, MatchError, Matcher, Thresholds};
use crate::store::{EmbeddingStore, StoreError};
use crate::types::MatchDecision;
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid registration session: {0}")]
    InvalidSession(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailure(#[from] EmbedderError),
    #[error("match: {0}")]
    Match(#[from] MatchError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Who is being enrolled. Built once per registration flow and passed in
/// explicitly.
#[derive(Debug, Clone)]
pub struct RegistrationSession {
    identity: String,
    display_name: String,
}

impl RegistrationSession {
    /// `identity` is the storage key; `display_name` is only shown to the
    /// user and defaults to the identity when empty.
    pub fn new(identity: &str, display_name: &str) -> Result<Self, PipelineError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(PipelineError::InvalidSession("identity must not be empty".into()));
        }
        let display_name = match display_name.trim() {
            "" => identity,
            name => name,
        };
        Ok(Self {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled { identity: String },
    NoFace,
    SpoofDetected,
}

#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    Decision(MatchDecision),
    /// No face crop could be produced; nothing was compared.
    NoFace,
}

pub struct FacePipeline<L, M> {
    locator: L,
    model: M,
    spoof_check: Option<Box<dyn SpoofCheck + Send>>,
    store: Arc<EmbeddingStore>,
    matcher: DualThresholdMatcher,
}

impl<L: FaceLocator, M: EmbeddingModel> FacePipeline<L, M> {
    pub fn new(locator: L, model: M, store: Arc<EmbeddingStore>, thresholds: Thresholds) -> Self {
        if model.dim() != store.dim() {
            tracing::warn!(
                model_dim = model.dim(),
                store_dim = store.dim(),
                "embedding model and store disagree on dimension"
            );
        }
        let matcher = DualThresholdMatcher::new(store.dim(), thresholds);
        Self {
            locator,
            model,
            spoof_check: None,
            store,
            matcher,
        }
    }

    /// Gate enrollment on an anti-spoof check.
    pub fn with_spoof_check(mut self, check: impl SpoofCheck + Send + 'static) -> Self {
        self.spoof_check = Some(Box::new(check));
        self
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    pub fn thresholds(&self) -> Thresholds {
        self.matcher.thresholds()
    }

    /// Capture → crop → (anti-spoof) → embed → store.
    pub fn enroll(
        &mut self,
        session: &RegistrationSession,
        image: &DynamicImage,
    ) -> Result<EnrollOutcome, PipelineError> {
        let Some(face) = self.locator.locate(image) else {
            tracing::info!(identity = session.identity(), "enroll: no face found");
            return Ok(EnrollOutcome::NoFace);
        };

        if let Some(check) = self.spoof_check.as_mut() {
            if !check.is_live(&face)? {
                tracing::warn!(identity = session.identity(), "enroll: spoof detected");
                return Ok(EnrollOutcome::SpoofDetected);
            }
        }

        let embedding = self.model.embed(&face)?;
        self.store.add(session.identity(), embedding)?;

        tracing::info!(
            identity = session.identity(),
            name = session.display_name(),
            "enroll: face saved"
        );
        Ok(EnrollOutcome::Enrolled {
            identity: session.identity().to_string(),
        })
    }

    /// Capture → crop → embed → match against a snapshot of the store.
    pub fn recognize(&mut self, image: &DynamicImage) -> Result<RecognitionOutcome, PipelineError> {
        let Some(face) = self.locator.locate(image) else {
            tracing::info!("recognize: no face found");
            return Ok(RecognitionOutcome::NoFace);
        };

        let probe = self.model.embed(&face)?;
        let snapshot = self.store.snapshot();
        let decision = self.matcher.match_probe(&probe, &snapshot)?;
        Ok(RecognitionOutcome::Decision(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::CenterCropLocator;
    use crate::persistence::MemoryPersistence;
    use crate::types::Embedding;
    use image::{Rgb, RgbImage};

    /// Embeds a face as the mean of each RGB channel.
    struct MeanColorModel;

    impl EmbeddingModel for MeanColorModel {
        fn dim(&self) -> usize {
            3
        }

        fn embed(&mut self, face: &RgbImage) -> Result<Embedding, EmbedderError> {
            let n = (face.width() * face.height()) as f32;
            let mut sums = [0.0f32; 3];
            for p in face.pixels() {
                for c in 0..3 {
                    sums[c] += p[c] as f32 / 255.0;
                }
            }
            Ok(Embedding::new(sums.iter().map(|s| s / n).collect()))
        }
    }

    struct FailingModel;

    impl EmbeddingModel for FailingModel {
        fn dim(&self) -> usize {
            3
        }

        fn embed(&mut self, _face: &RgbImage) -> Result<Embedding, EmbedderError> {
            Err(EmbedderError::InferenceFailed("boom".into()))
        }
    }

    struct NoFaceLocator;

    impl FaceLocator for NoFaceLocator {
        fn locate(&mut self, _image: &DynamicImage) -> Option<RgbImage> {
            None
        }
    }

    struct AlwaysSpoof;

    impl SpoofCheck for AlwaysSpoof {
        fn is_live(&mut self, _face: &RgbImage) -> Result<bool, EmbedderError> {
            Ok(false)
        }
    }

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([r, g, b])))
    }

    fn pipeline<L: FaceLocator, M: EmbeddingModel>(locator: L, model: M) -> FacePipeline<L, M> {
        let store = Arc::new(EmbeddingStore::new(MemoryPersistence::new(), 3));
        FacePipeline::new(locator, model, store, Thresholds::default())
    }

    #[test]
    fn test_session_validation() {
        assert!(RegistrationSession::new("  ", "Ann").is_err());
        let s = RegistrationSession::new(" 42 ", "").unwrap();
        assert_eq!(s.identity(), "42");
        assert_eq!(s.display_name(), "42");
    }

    #[test]
    fn test_enroll_then_recognize() {
        let mut p = pipeline(CenterCropLocator, MeanColorModel);
        let red = RegistrationSession::new("red", "Red").unwrap();
        let green = RegistrationSession::new("green", "Green").unwrap();

        assert_eq!(
            p.enroll(&red, &solid(255, 0, 0)).unwrap(),
            EnrollOutcome::Enrolled { identity: "red".into() }
        );
        p.enroll(&green, &solid(0, 255, 0)).unwrap();
        assert_eq!(p.store().len(), 2);

        let RecognitionOutcome::Decision(d) = p.recognize(&solid(240, 20, 10)).unwrap() else {
            panic!("expected a decision");
        };
        assert!(d.accepted);
        assert_eq!(d.identity(), Some("red"));
    }

    #[test]
    fn test_recognize_unknown_face_rejected() {
        let mut p = pipeline(CenterCropLocator, MeanColorModel);
        let red = RegistrationSession::new("red", "").unwrap();
        p.enroll(&red, &solid(255, 0, 0)).unwrap();

        let RecognitionOutcome::Decision(d) = p.recognize(&solid(0, 0, 255)).unwrap() else {
            panic!("expected a decision");
        };
        assert!(!d.accepted);
        assert!(d.best_record.is_none());
        assert!(d.best_cosine_similarity.abs() < 1e-6);
    }

    #[test]
    fn test_recognize_empty_store() {
        let mut p = pipeline(CenterCropLocator, MeanColorModel);
        let RecognitionOutcome::Decision(d) = p.recognize(&solid(1, 2, 3)).unwrap() else {
            panic!("expected a decision");
        };
        assert!(!d.accepted);
        assert_eq!(d.best_cosine_similarity, -1.0);
    }

    #[test]
    fn test_no_face_is_not_an_error() {
        let mut p = pipeline(NoFaceLocator, MeanColorModel);
        let s = RegistrationSession::new("x", "").unwrap();
        assert_eq!(p.enroll(&s, &solid(1, 2, 3)).unwrap(), EnrollOutcome::NoFace);
        assert!(matches!(p.recognize(&solid(1, 2, 3)).unwrap(), RecognitionOutcome::NoFace));
    }

    #[test]
    fn test_spoof_blocks_enrollment() {
        let mut p = pipeline(CenterCropLocator, MeanColorModel).with_spoof_check(AlwaysSpoof);
        let s = RegistrationSession::new("x", "").unwrap();
        assert_eq!(p.enroll(&s, &solid(9, 9, 9)).unwrap(), EnrollOutcome::SpoofDetected);
        assert!(p.store().is_empty());
    }

    #[test]
    fn test_model_failure_surfaces_as_embedding_failure() {
        let mut p = pipeline(CenterCropLocator, FailingModel);
        let err = p.recognize(&solid(1, 2, 3)).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingFailure(_)));
    }
}
