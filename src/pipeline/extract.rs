//! Extraction stage: one image in, one `ExtractionResult` out.
//!
//! The fail-fast half of the pipeline. Decode and preprocessing problems
//! stop the stage before any service call; the vision service is invoked
//! exactly once; every failure is folded into a status marker. The stage
//! itself never returns an error.

use std::sync::Arc;

use regex::Regex;
use uuid::Uuid;

use crate::services::{ServiceError, VisionService};
use crate::status::{StageText, StatusMarker};

use super::preprocess::{decode_image, ImagePreprocessor, PreparedImage};
use super::FailurePolicy;

/// An uploaded or captured image entering the pipeline.
///
/// The id is the reference the controller compares against when deciding
/// whether a stage outcome is stale.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: Uuid,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes,
        }
    }
}

/// Output of the extraction stage, one per source image.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Recognized problem text, or the marker that terminated the stage.
    pub full_text: StageText,
    /// Isolated expression, when the vision model singled one out.
    pub expression: Option<String>,
    /// Id of the source image this result belongs to.
    pub image_id: Uuid,
    /// Preprocessed working copy for display. Present on every run that
    /// got past preprocessing, including runs that ended in a marker.
    pub working_image: Option<PreparedImage>,
}

impl ExtractionResult {
    fn terminal(image_id: Uuid, marker: StatusMarker) -> Self {
        Self {
            full_text: StageText::Marker(marker),
            expression: None,
            image_id,
            working_image: None,
        }
    }
}

/// Runs the extraction stage. Collaborators sit behind trait objects so
/// tests can swap in mocks.
pub struct Extractor {
    preprocessor: Arc<dyn ImagePreprocessor>,
    vision: Arc<dyn VisionService>,
}

impl Extractor {
    /// Preprocessing discipline: any failure aborts the stage.
    pub const PREPROCESS_POLICY: FailurePolicy = FailurePolicy::FailFast;

    pub fn new(preprocessor: Arc<dyn ImagePreprocessor>, vision: Arc<dyn VisionService>) -> Self {
        Self {
            preprocessor,
            vision,
        }
    }

    /// Run the stage once for `image`.
    pub async fn extract(&self, image: &SourceImage) -> ExtractionResult {
        tracing::info!(
            image_id = %image.id,
            image_bytes = image.bytes.len(),
            "extraction started"
        );

        // Step 1: validate and decode. Input errors never reach a service.
        let decoded = match decode_image(&image.bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(image_id = %image.id, error = %e, "image decode failed");
                return ExtractionResult::terminal(image.id, StatusMarker::ProcessingError);
            }
        };

        // Step 2: preprocess under the fail-fast policy.
        let prepared = match self.preprocessor.prepare(&image.bytes, decoded) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(
                    image_id = %image.id,
                    error = %e,
                    policy = %Self::PREPROCESS_POLICY,
                    "preprocessing failed"
                );
                return ExtractionResult::terminal(image.id, StatusMarker::PreprocessingError);
            }
        };

        // Step 3: exactly one vision call. Retries are the caller's business.
        let outcome = match self.vision.extract_text(&prepared.png_bytes).await {
            Ok(outcome) => outcome,
            Err(ServiceError::ResponseParsing(detail)) => {
                tracing::warn!(image_id = %image.id, error = %detail, "malformed vision response");
                return ExtractionResult {
                    full_text: StageText::Marker(StatusMarker::ProcessingError),
                    expression: None,
                    image_id: image.id,
                    working_image: Some(prepared),
                };
            }
            Err(e) => {
                let marker = classify_transport_error(&e);
                tracing::warn!(image_id = %image.id, error = %e, marker = %marker, "vision call failed");
                return ExtractionResult {
                    full_text: StageText::Marker(marker),
                    expression: None,
                    image_id: image.id,
                    working_image: Some(prepared),
                };
            }
        };

        // Step 4: normalize the free-text reply.
        let full_text = normalize_response(&outcome.full_text);
        let expression = normalize_expression(outcome.expression);

        tracing::info!(
            image_id = %image.id,
            is_marker = full_text.is_marker(),
            has_expression = expression.is_some(),
            "extraction finished"
        );

        ExtractionResult {
            full_text,
            expression,
            image_id: image.id,
            working_image: Some(prepared),
        }
    }
}

/// Normalize a vision reply: trim, then map empty replies and "no text"
/// phrasings onto the `NoTextFound` marker.
pub fn normalize_response(raw: &str) -> StageText {
    let trimmed = raw.trim();
    let no_text = Regex::new(r"(?i)\bno text\b").unwrap();
    if trimmed.is_empty() || no_text.is_match(trimmed) {
        return StageText::Marker(StatusMarker::NoTextFound);
    }
    StageText::from_raw(trimmed)
}

/// Canonical form for an absent expression is `None`; empty or
/// whitespace-only strings from a service normalize to it.
pub fn normalize_expression(raw: Option<String>) -> Option<String> {
    raw.map(|expression| expression.trim().to_string())
        .filter(|expression| !expression.is_empty())
}

/// Map a transport failure onto a status marker.
///
/// Credential and quota failures have dedicated HTTP statuses; everything
/// else is recognized by substrings of the rendered error message, the way
/// gateway bodies actually phrase these conditions.
pub fn classify_transport_error(error: &ServiceError) -> StatusMarker {
    if let ServiceError::ApiError { status, .. } = error {
        match status {
            401 | 403 => return StatusMarker::InvalidCredential,
            429 => return StatusMarker::QuotaExceeded,
            _ => {}
        }
    }

    let message = error.to_string().to_lowercase();
    if message.contains("safety") || message.contains("blocked") {
        StatusMarker::BlockedBySafetyFilter
    } else if message.contains("api key")
        || message.contains("invalid key")
        || message.contains("unauthorized")
        || message.contains("permission denied")
    {
        StatusMarker::InvalidCredential
    } else if message.contains("quota")
        || message.contains("rate limit")
        || message.contains("resource exhausted")
        || message.contains("too many requests")
    {
        StatusMarker::QuotaExceeded
    } else {
        StatusMarker::GeneralServiceError
    }
}
