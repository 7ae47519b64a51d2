//! Status taxonomy shared by every pipeline stage.
//!
//! A stage's primary text field is either real content or exactly one
//! `StatusMarker`, never both, and never empty unless it is a marker.
//! `StageText` encodes that rule as a tagged union so downstream code
//! matches on a variant instead of comparing strings against a sentinel
//! list. On the wire (and toward the UI) markers still travel as their
//! fixed legacy strings.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Status Markers
// ═══════════════════════════════════════════

/// Terminal conditions that can stand in for stage output.
///
/// Markers are terminal: once a stage's text field carries one, every
/// downstream stage either bypasses its service call or surfaces a
/// derived user-facing error. A marker is never corrected or solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusMarker {
    /// The image decoded fine but contains no recognizable text.
    #[serde(rename = "NO_TEXT_FOUND")]
    NoTextFound,
    /// The image could not be decoded, or the vision response was malformed.
    #[serde(rename = "OCR_PROCESSING_ERROR")]
    ProcessingError,
    /// Image preparation failed before the vision call.
    #[serde(rename = "PREPROCESSING_ERROR")]
    PreprocessingError,
    /// The model service rejected the configured API key.
    #[serde(rename = "API_ERROR_INVALID_KEY")]
    InvalidCredential,
    /// The model service reported an exhausted quota or rate limit.
    #[serde(rename = "API_ERROR_QUOTA")]
    QuotaExceeded,
    /// Any unclassified service failure.
    #[serde(rename = "API_GENERAL_ERROR")]
    GeneralServiceError,
    /// The model service declined the image on content-safety grounds.
    #[serde(rename = "OCR_BLOCKED_BY_SAFETY")]
    BlockedBySafetyFilter,
}

impl StatusMarker {
    /// Fixed wire string, exposed unchanged to the UI layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoTextFound => "NO_TEXT_FOUND",
            Self::ProcessingError => "OCR_PROCESSING_ERROR",
            Self::PreprocessingError => "PREPROCESSING_ERROR",
            Self::InvalidCredential => "API_ERROR_INVALID_KEY",
            Self::QuotaExceeded => "API_ERROR_QUOTA",
            Self::GeneralServiceError => "API_GENERAL_ERROR",
            Self::BlockedBySafetyFilter => "OCR_BLOCKED_BY_SAFETY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NO_TEXT_FOUND" => Some(Self::NoTextFound),
            "OCR_PROCESSING_ERROR" => Some(Self::ProcessingError),
            "PREPROCESSING_ERROR" => Some(Self::PreprocessingError),
            "API_ERROR_INVALID_KEY" => Some(Self::InvalidCredential),
            "API_ERROR_QUOTA" => Some(Self::QuotaExceeded),
            "API_GENERAL_ERROR" => Some(Self::GeneralServiceError),
            "OCR_BLOCKED_BY_SAFETY" => Some(Self::BlockedBySafetyFilter),
            _ => None,
        }
    }

    pub fn all() -> &'static [StatusMarker] {
        &[
            Self::NoTextFound,
            Self::ProcessingError,
            Self::PreprocessingError,
            Self::InvalidCredential,
            Self::QuotaExceeded,
            Self::GeneralServiceError,
            Self::BlockedBySafetyFilter,
        ]
    }

    /// Translation table for the UI: a complete sentence per marker, so the
    /// display layer never has to interpret wire strings itself.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoTextFound => {
                "No readable text was found in the image. Try a sharper, better-lit photo."
            }
            Self::ProcessingError => {
                "The image could not be processed for text recognition."
            }
            Self::PreprocessingError => {
                "The image could not be prepared for recognition. The file may be truncated or damaged."
            }
            Self::InvalidCredential => {
                "The model service rejected the API key. Check the configured credential."
            }
            Self::QuotaExceeded => {
                "The model service quota is exhausted. Try again later."
            }
            Self::GeneralServiceError => {
                "The model service request failed. Check the connection and try again."
            }
            Self::BlockedBySafetyFilter => {
                "The image was declined by the model service's content safety filter."
            }
        }
    }
}

impl std::fmt::Display for StatusMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// StageText: content or marker, never both
// ═══════════════════════════════════════════

/// A stage's primary text field.
///
/// Serializes to the legacy wire format: content verbatim, markers as
/// their wire string. Deserialization re-parses marker strings, so a
/// round trip through JSON preserves the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageText {
    Content(String),
    Marker(StatusMarker),
}

impl StageText {
    /// Ingest raw service output.
    ///
    /// Trims whitespace; an empty result maps to `NoTextFound` and a string
    /// equal to a marker wire string maps to that marker, so `Content` can
    /// never be empty and never collide with the marker set.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Marker(StatusMarker::NoTextFound);
        }
        match StatusMarker::from_str(trimmed) {
            Some(marker) => Self::Marker(marker),
            None => Self::Content(trimmed.to_string()),
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            Self::Marker(_) => None,
        }
    }

    pub fn marker(&self) -> Option<StatusMarker> {
        match self {
            Self::Content(_) => None,
            Self::Marker(marker) => Some(*marker),
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Marker(_))
    }

    /// Wire representation: content verbatim, markers as their fixed string.
    pub fn wire_str(&self) -> &str {
        match self {
            Self::Content(text) => text,
            Self::Marker(marker) => marker.as_str(),
        }
    }
}

impl From<String> for StageText {
    fn from(raw: String) -> Self {
        Self::from_raw(raw)
    }
}

impl From<StageText> for String {
    fn from(text: StageText) -> Self {
        match text {
            StageText::Content(content) => content,
            StageText::Marker(marker) => marker.as_str().to_string(),
        }
    }
}

impl From<StatusMarker> for StageText {
    fn from(marker: StatusMarker) -> Self {
        Self::Marker(marker)
    }
}

impl std::fmt::Display for StageText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_str())
    }
}
