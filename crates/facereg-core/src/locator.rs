//! Face localization: turn a captured image into a square face crop.
//!
//! Detection itself is pluggable via [`FaceDetector`]. [`DetectorLocator`]
//! crops the largest detection with padding and falls back to a centered
//! square crop when nothing usable was found.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

/// Side length of every face crop handed to the embedding model.
pub const FACE_CROP_SIZE: u32 = 112;
/// Padding added on each side of a detection, as a fraction of its width.
const FACE_PADDING_RATIO: f32 = 0.1;

/// Axis-aligned face detection in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Produces face detections for an image.
pub trait FaceDetector {
    fn detect(&mut self, image: &DynamicImage) -> Vec<BoundingBox>;
}

/// Produces a face crop, or `None` when no probe can be taken from the image.
pub trait FaceLocator {
    fn locate(&mut self, image: &DynamicImage) -> Option<RgbImage>;
}

/// Centered square crop, assuming the face fills the middle of the frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct CenterCropLocator;

impl FaceLocator for CenterCropLocator {
    fn locate(&mut self, image: &DynamicImage) -> Option<RgbImage> {
        center_crop(image)
    }
}

fn center_crop(image: &DynamicImage) -> Option<RgbImage> {
    let size = image.width().min(image.height());
    if size == 0 {
        return None;
    }
    let x = (image.width() - size) / 2;
    let y = (image.height() - size) / 2;
    Some(crop_and_resize(image, x, y, size, size))
}

fn crop_and_resize(image: &DynamicImage, x: u32, y: u32, w: u32, h: u32) -> RgbImage {
    image
        .crop_imm(x, y, w, h)
        .resize_exact(FACE_CROP_SIZE, FACE_CROP_SIZE, FilterType::Triangle)
        .to_rgb8()
}

/// Pad `face` by 10% of its width and clamp to the image bounds.
/// Returns `(x, y, width, height)`, or `None` for an empty region.
fn padded_region(face: &BoundingBox, img_w: u32, img_h: u32) -> Option<(u32, u32, u32, u32)> {
    let pad = face.width * FACE_PADDING_RATIO;
    let left = (face.x - pad).max(0.0).floor();
    let top = (face.y - pad).max(0.0).floor();
    let right = (face.x + face.width + pad).min(img_w as f32).ceil();
    let bottom = (face.y + face.height + pad).min(img_h as f32).ceil();

    if !(right > left && bottom > top) {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

/// Crops the largest detected face; falls back to a center crop.
pub struct DetectorLocator<D> {
    detector: D,
}

impl<D: FaceDetector> DetectorLocator<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }
}

impl<D: FaceDetector> FaceLocator for DetectorLocator<D> {
    fn locate(&mut self, image: &DynamicImage) -> Option<RgbImage> {
        let faces = self.detector.detect(image);
        tracing::debug!(count = faces.len(), "faces detected");

        let largest = faces
            .iter()
            .filter(|f| f.width > 0.0 && f.height > 0.0)
            .fold(None::<&BoundingBox>, |best, f| match best {
                Some(b) if b.area() >= f.area() => Some(b),
                _ => Some(f),
            });

        if let Some(face) = largest {
            if let Some((x, y, w, h)) = padded_region(face, image.width(), image.height()) {
                tracing::debug!(x, y, w, h, "cropping detected face");
                return Some(crop_and_resize(image, x, y, w, h));
            }
            tracing::debug!(?face, "detected face region is empty after clamping");
        }

        tracing::debug!("no usable detection; falling back to center crop");
        center_crop(image)
    }
}
