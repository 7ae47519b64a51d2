//! Service trait seams and the wire types of the model gateway API.
//!
//! These formalize the three fixed contracts the pipeline depends on.
//! Every trait method performs exactly one request; retry policy belongs
//! to callers, never to implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ServiceError;

// ──────────────────────────────────────────────
// Service traits
// ──────────────────────────────────────────────

/// Vision model: reads a prepared PNG and returns the problem text it sees.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// One extraction attempt over a prepared PNG payload.
    async fn extract_text(&self, image_png: &[u8]) -> Result<VisionOutcome, ServiceError>;
}

/// Correction model: repairs recognition mistakes in extracted math text.
#[async_trait]
pub trait CorrectionService: Send + Sync {
    /// One correction attempt over extracted text and its optional
    /// isolated expression.
    async fn correct_text(
        &self,
        text: &str,
        expression: Option<&str>,
    ) -> Result<CorrectionOutcome, ServiceError>;
}

/// Solver model: produces a step-by-step solution for a problem context.
#[async_trait]
pub trait SolverService: Send + Sync {
    /// One solve attempt. `context` carries the full problem statement;
    /// `expression`, when present, isolates the equation to solve.
    async fn solve(
        &self,
        context: &str,
        expression: Option<&str>,
    ) -> Result<SolverOutcome, ServiceError>;
}

// ──────────────────────────────────────────────
// Response payloads
// ──────────────────────────────────────────────

/// Vision response: the recognized problem text plus an optional
/// isolated expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionOutcome {
    pub full_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Correction response. `corrected_expression` may be explicitly absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionOutcome {
    pub corrected_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_expression: Option<String>,
}

/// Solver response: free text, possibly carrying a reserved prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOutcome {
    pub solution: String,
}

// ──────────────────────────────────────────────
// Request payloads (gateway REST API)
// ──────────────────────────────────────────────

/// Request body for `POST /v1/vision/extract`.
#[derive(Debug, Clone, Serialize)]
pub struct VisionExtractRequest {
    /// Base64-encoded PNG.
    pub image: String,
    pub media_type: String,
}

/// Request body for `POST /v1/text/correct`.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectTextRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Request body for `POST /v1/math/solve`.
#[derive(Debug, Clone, Serialize)]
pub struct SolveRequest {
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}
