//! Fail-fast image preparation before the vision call.
//!
//! Pure image-to-image transform: validate byte bounds, fix EXIF
//! orientation, downscale to a vision-friendly edge, re-encode as PNG.
//! No I/O and no model calls, so everything here is directly testable.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat};
use thiserror::Error;

/// Smallest byte count that can hold a real image header.
const MIN_IMAGE_BYTES: usize = 67;

/// Upper bound on raw upload size.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Longest output edge. Keeps handwriting legible without shipping
/// megapixels to the vision model.
const MAX_EDGE: u32 = 1536;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Image data too small to be valid")]
    TooSmall,

    #[error("Image data exceeds {0} MB limit")]
    TooLarge(usize),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image preparation failed: {0}")]
    Prepare(String),
}

/// Prepares a decoded image for vision model input.
///
/// Invoked by the extraction stage between decoding and the vision call.
/// Failures abort the whole extraction; there is no degraded path past a
/// broken image.
pub trait ImagePreprocessor: Send + Sync {
    /// Transform a decoded image into vision-ready PNG bytes. `raw` carries
    /// the original upload so the EXIF orientation tag can be read.
    fn prepare(&self, raw: &[u8], decoded: DynamicImage)
        -> Result<PreparedImage, PreprocessError>;
}

/// Result of preprocessing: the working copy shown to the user and sent
/// to the vision model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Re-encoded PNG bytes.
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Default preprocessor: EXIF orientation fix plus fit-within downscale.
pub struct StandardPreprocessor {
    max_edge: u32,
}

impl StandardPreprocessor {
    pub fn new() -> Self {
        Self { max_edge: MAX_EDGE }
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge;
        self
    }
}

impl Default for StandardPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreprocessor for StandardPreprocessor {
    fn prepare(
        &self,
        raw: &[u8],
        decoded: DynamicImage,
    ) -> Result<PreparedImage, PreprocessError> {
        let oriented = apply_orientation(decoded, read_exif_orientation(raw));

        let (width, height) = (oriented.width(), oriented.height());
        let (target_w, target_h) = compute_fit_dimensions(width, height, self.max_edge);

        let resized = if (target_w, target_h) == (width, height) {
            oriented
        } else {
            tracing::debug!(
                from = format!("{width}x{height}"),
                to = format!("{target_w}x{target_h}"),
                "downscaling image"
            );
            oriented.resize_exact(target_w, target_h, FilterType::CatmullRom)
        };

        Ok(PreparedImage {
            png_bytes: encode_png(&resized)?,
            width: target_w,
            height: target_h,
        })
    }
}

/// Validate upload bytes before decoding. Cheap early reject for clearly
/// invalid input.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), PreprocessError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(PreprocessError::TooSmall);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(PreprocessError::TooLarge(MAX_IMAGE_BYTES / (1024 * 1024)));
    }
    Ok(())
}

/// Validate and decode an upload into a `DynamicImage`.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    validate_image_bytes(bytes)?;
    image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

/// Read the EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) when no EXIF data or tag is present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform (values 1 to 8).
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Compute dimensions that fit within `max_edge` while preserving aspect
/// ratio. Small images are not upscaled.
pub fn compute_fit_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }

    let scale = (max_edge as f32 / width as f32).min(max_edge as f32 / height as f32);
    let scale = scale.min(1.0);

    let new_w = ((width as f32 * scale).round() as u32).max(1).min(max_edge);
    let new_h = ((height as f32 * scale).round() as u32).max(1).min(max_edge);

    (new_w, new_h)
}

/// Encode an image as PNG bytes. Default compression; these images are
/// transient, not archived.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, PreprocessError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| PreprocessError::Prepare(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Mock implementation (testing)
// ═══════════════════════════════════════════════════════════

/// Mock preprocessor: returns a small valid PNG without touching the input,
/// or a configured failure.
pub struct MockImagePreprocessor {
    fail: bool,
}

impl MockImagePreprocessor {
    pub fn new() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl ImagePreprocessor for MockImagePreprocessor {
    fn prepare(
        &self,
        _raw: &[u8],
        _decoded: DynamicImage,
    ) -> Result<PreparedImage, PreprocessError> {
        if self.fail {
            return Err(PreprocessError::Prepare("Mock preprocessing failure".into()));
        }

        let canvas = DynamicImage::new_rgb8(64, 64);
        Ok(PreparedImage {
            png_bytes: encode_png(&canvas)?,
            width: 64,
            height: 64,
        })
    }
}
