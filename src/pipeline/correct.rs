//! Correction stage: best-effort repair of recognition mistakes.
//!
//! Markers bypass the service entirely. When the service fails, or replies
//! with something that is not usable corrected text, the stage returns the
//! original pair unchanged; corrected output can only ever replace content,
//! never erase it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::CorrectionService;
use crate::status::StageText;

use super::extract::normalize_expression;
use super::FailurePolicy;

/// Output of the correction stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionResult {
    /// Corrected text, or the upstream marker when the stage bypassed.
    pub corrected_text: StageText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_expression: Option<String>,
}

/// Runs the correction stage.
pub struct Corrector {
    service: Arc<dyn CorrectionService>,
}

impl Corrector {
    /// Correction discipline: failures keep the input.
    pub const FAILURE_POLICY: FailurePolicy = FailurePolicy::FallbackToInput;

    pub fn new(service: Arc<dyn CorrectionService>) -> Self {
        Self { service }
    }

    /// Run the stage once over extraction output.
    pub async fn correct(
        &self,
        text: &StageText,
        expression: Option<&str>,
    ) -> CorrectionResult {
        // Bypass: a marker carries no content to correct.
        let original = match text {
            StageText::Marker(marker) => {
                tracing::debug!(marker = %marker, "correction bypassed");
                return CorrectionResult {
                    corrected_text: text.clone(),
                    corrected_expression: None,
                };
            }
            StageText::Content(content) => content,
        };

        match self.service.correct_text(original, expression).await {
            Ok(outcome) => match StageText::from_raw(outcome.corrected_text) {
                StageText::Content(corrected) => {
                    tracing::info!(changed = corrected != *original, "correction applied");
                    CorrectionResult {
                        corrected_text: StageText::Content(corrected),
                        corrected_expression: normalize_expression(
                            outcome.corrected_expression,
                        ),
                    }
                }
                // Empty or marker-shaped replies are not corrections.
                StageText::Marker(marker) => {
                    tracing::warn!(
                        reply = %marker,
                        policy = %Self::FAILURE_POLICY,
                        "unusable correction reply, keeping original"
                    );
                    Self::fallback(original, expression)
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    policy = %Self::FAILURE_POLICY,
                    "correction failed, keeping original"
                );
                Self::fallback(original, expression)
            }
        }
    }

    fn fallback(original: &str, expression: Option<&str>) -> CorrectionResult {
        CorrectionResult {
            corrected_text: StageText::Content(original.to_string()),
            corrected_expression: expression.map(str::to_string),
        }
    }
}
