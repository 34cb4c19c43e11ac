//! FaceNet face embedder via ONNX Runtime.
//!
//! Maps a cropped RGB face to a 128-dimensional embedding. The model is
//! treated as opaque: fixed-size input in, fixed-length vector out.

use crate::types::{Embedding, DEFAULT_EMBEDDING_DIM};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACENET_INPUT_SIZE: u32 = 160;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Image → fixed-length embedding.
pub trait EmbeddingModel {
    /// Length of every embedding this model produces.
    fn dim(&self) -> usize;

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, EmbedderError>;
}

pub(crate) fn load_session(model_path: &Path, kind: &str) -> Result<Session, EmbedderError> {
    if !model_path.exists() {
        return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;

    tracing::info!(
        path = %model_path.display(),
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded {kind} model"
    );

    Ok(session)
}

/// Resize to `size`×`size` and pack into an NHWC float tensor, mapping each
/// channel value through `normalize`.
pub(crate) fn to_nhwc_tensor(face: &RgbImage, size: u32, normalize: impl Fn(f32) -> f32) -> Array4<f32> {
    let resized = image::imageops::resize(face, size, size, FilterType::Triangle);
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, side, side, 3));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = normalize(pixel[c] as f32);
        }
    }

    tensor
}

/// Run a single-input session and return the first output flattened.
pub(crate) fn run_single(session: &mut Session, input: &Array4<f32>) -> Result<Vec<f32>, EmbedderError> {
    let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
    let (_, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbedderError::InferenceFailed(format!("output extraction: {e}")))?;
    Ok(data.to_vec())
}

/// FaceNet-based embedder.
pub struct FaceNetEmbedder {
    session: Session,
    dim: usize,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model, expecting the default 128-dim output.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, EmbedderError> {
        Self::load_with_dim(model_path, DEFAULT_EMBEDDING_DIM)
    }

    pub fn load_with_dim(model_path: impl AsRef<Path>, dim: usize) -> Result<Self, EmbedderError> {
        let session = load_session(model_path.as_ref(), "FaceNet")?;
        Ok(Self { session, dim })
    }

    fn preprocess(face: &RgbImage) -> Array4<f32> {
        to_nhwc_tensor(face, FACENET_INPUT_SIZE, |p| (p - FACENET_MEAN) / FACENET_STD)
    }
}

impl EmbeddingModel for FaceNetEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, EmbedderError> {
        let input = Self::preprocess(face);
        let values = run_single(&mut self.session, &input)?;

        if values.len() != self.dim {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {}-dim embedding, got {}",
                self.dim,
                values.len()
            )));
        }

        tracing::debug!(dim = values.len(), "embedding generated");
        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_output_shape() {
        let face = RgbImage::from_pixel(112, 112, Rgb([10, 20, 30]));
        let tensor = FaceNetEmbedder::preprocess(&face);
        let side = FACENET_INPUT_SIZE as usize;
        assert_eq!(tensor.shape(), &[1, side, side, 3]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let face = RgbImage::from_pixel(160, 160, Rgb([255, 0, 128]));
        let tensor = FaceNetEmbedder::preprocess(&face);
        let expect = |p: f32| (p - FACENET_MEAN) / FACENET_STD;
        assert!((tensor[[0, 5, 7, 0]] - expect(255.0)).abs() < 1e-6);
        assert!((tensor[[0, 5, 7, 1]] - expect(0.0)).abs() < 1e-6);
        assert!((tensor[[0, 5, 7, 2]] - expect(128.0)).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        // Left half red, right half blue: channels stay in RGB order per pixel.
        let face = RgbImage::from_fn(160, 160, |x, _| if x < 80 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) });
        let tensor = FaceNetEmbedder::preprocess(&face);
        assert!(tensor[[0, 80, 10, 0]] > 0.9);
        assert!(tensor[[0, 80, 10, 2]] < -0.9);
        assert!(tensor[[0, 80, 150, 0]] < -0.9);
        assert!(tensor[[0, 80, 150, 2]] > 0.9);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceNetEmbedder::load("/nonexistent/facenet.onnx").err().unwrap();
        assert!(matches!(err, EmbedderError::ModelNotFound(_)));
    }
}
