//! Anti-spoof gate applied before a face is enrolled.

use crate::embedder::{load_session, run_single, to_nhwc_tensor, EmbedderError};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use std::path::Path;

const SPOOF_INPUT_SIZE: u32 = 80;
const SPOOF_CLASS_COUNT: usize = 3;
/// Output index holding the spoof-class probability.
const SPOOF_CLASS_INDEX: usize = 1;

pub const DEFAULT_SPOOF_THRESHOLD: f32 = 0.5;

/// Decides whether a cropped face comes from a live subject.
pub trait SpoofCheck {
    fn is_live(&mut self, face: &RgbImage) -> Result<bool, EmbedderError>;
}

/// Three-class anti-spoof classifier via ONNX Runtime.
pub struct OnnxSpoofCheck {
    session: Session,
    threshold: f32,
}

impl OnnxSpoofCheck {
    /// Load the classifier. A face is live when its spoof probability is
    /// below `threshold`.
    pub fn load(model_path: impl AsRef<Path>, threshold: f32) -> Result<Self, EmbedderError> {
        let session = load_session(model_path.as_ref(), "anti-spoof")?;
        Ok(Self { session, threshold })
    }

    fn preprocess(face: &RgbImage) -> Array4<f32> {
        to_nhwc_tensor(face, SPOOF_INPUT_SIZE, |p| p / 127.5 - 1.0)
    }
}

/// Spoof probability from the raw classifier output.
fn spoof_probability(scores: &[f32]) -> Result<f32, EmbedderError> {
    if scores.len() != SPOOF_CLASS_COUNT {
        return Err(EmbedderError::InferenceFailed(format!(
            "expected {SPOOF_CLASS_COUNT} spoof scores, got {}",
            scores.len()
        )));
    }
    Ok(scores[SPOOF_CLASS_INDEX])
}

impl SpoofCheck for OnnxSpoofCheck {
    fn is_live(&mut self, face: &RgbImage) -> Result<bool, EmbedderError> {
        let input = Self::preprocess(face);
        let scores = run_single(&mut self.session, &input)?;
        let spoof = spoof_probability(&scores)?;
        let live = spoof < self.threshold;
        tracing::debug!(spoof, threshold = self.threshold, live, "anti-spoof check");
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_range() {
        let face = RgbImage::from_pixel(40, 40, Rgb([0, 255, 0]));
        let tensor = OnnxSpoofCheck::preprocess(&face);
        assert_eq!(tensor.shape(), &[1, 80, 80, 3]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_spoof_probability_index() {
        assert_eq!(spoof_probability(&[0.1, 0.7, 0.2]).unwrap(), 0.7);
    }

    #[test]
    fn test_spoof_probability_wrong_shape() {
        assert!(matches!(
            spoof_probability(&[0.5, 0.5]),
            Err(EmbedderError::InferenceFailed(_))
        ));
    }
}
