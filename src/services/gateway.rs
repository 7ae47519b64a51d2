//! HTTP client for the model gateway, plus the mock services used in tests.
//!
//! One `ModelGateway` serves all three trait seams; the endpoints differ,
//! the transport handling does not. Errors are classified here once
//! (unreachable, timeout, HTTP status, malformed body) so stages can rely
//! on `ServiceError` variants and message text.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{ConfigError, GatewayConfig};

use super::types::{
    CorrectTextRequest, CorrectionOutcome, CorrectionService, SolveRequest, SolverOutcome,
    SolverService, VisionExtractRequest, VisionOutcome, VisionService,
};
use super::ServiceError;

/// Upper bound on a PNG payload before base64 expansion.
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// HTTP client for the remote model gateway.
pub struct ModelGateway {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ModelGateway {
    /// Create a gateway client from validated configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            client,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Gateway client configured from `MATHSNAP_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(GatewayConfig::from_env()?))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ServiceError::NotReachable(self.base_url.clone())
            } else if e.is_timeout() {
                ServiceError::Timeout(self.timeout_secs)
            } else {
                ServiceError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))
    }
}

#[async_trait]
impl VisionService for ModelGateway {
    async fn extract_text(&self, image_png: &[u8]) -> Result<VisionOutcome, ServiceError> {
        if image_png.len() > MAX_IMAGE_BYTES {
            return Err(ServiceError::ImageTooLarge(image_png.len()));
        }

        let body = VisionExtractRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image_png),
            media_type: "image/png".to_string(),
        };

        tracing::debug!(image_bytes = image_png.len(), "vision extract request");
        self.post_json("/v1/vision/extract", &body).await
    }
}

#[async_trait]
impl CorrectionService for ModelGateway {
    async fn correct_text(
        &self,
        text: &str,
        expression: Option<&str>,
    ) -> Result<CorrectionOutcome, ServiceError> {
        let body = CorrectTextRequest {
            text: text.to_string(),
            expression: expression.map(str::to_string),
        };

        tracing::debug!(text_len = text.len(), "correction request");
        self.post_json("/v1/text/correct", &body).await
    }
}

#[async_trait]
impl SolverService for ModelGateway {
    async fn solve(
        &self,
        context: &str,
        expression: Option<&str>,
    ) -> Result<SolverOutcome, ServiceError> {
        let body = SolveRequest {
            context: context.to_string(),
            expression: expression.map(str::to_string),
        };

        tracing::debug!(
            context_len = context.len(),
            has_expression = expression.is_some(),
            "solve request"
        );
        self.post_json("/v1/math/solve", &body).await
    }
}

// ──────────────────────────────────────────────
// Mock services (tests)
// ──────────────────────────────────────────────

/// Mock vision service: configurable outcome and a call counter, so tests
/// can assert that bypass paths make zero requests.
pub struct MockVisionService {
    full_text: String,
    expression: Option<String>,
    calls: AtomicUsize,
}

impl MockVisionService {
    pub fn new(full_text: &str) -> Self {
        Self {
            full_text: full_text.to_string(),
            expression: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(expression.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionService for MockVisionService {
    async fn extract_text(&self, _image_png: &[u8]) -> Result<VisionOutcome, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(VisionOutcome {
            full_text: self.full_text.clone(),
            expression: self.expression.clone(),
        })
    }
}

/// Mock correction service. `new` returns a fixed correction; `echo`
/// returns its input unchanged, modeling a converged fixed point.
pub struct MockCorrectionService {
    corrected_text: Option<String>,
    corrected_expression: Option<String>,
    calls: AtomicUsize,
}

impl MockCorrectionService {
    pub fn new(corrected_text: &str) -> Self {
        Self {
            corrected_text: Some(corrected_text.to_string()),
            corrected_expression: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Service that reports no further changes.
    pub fn echo() -> Self {
        Self {
            corrected_text: None,
            corrected_expression: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.corrected_expression = Some(expression.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CorrectionService for MockCorrectionService {
    async fn correct_text(
        &self,
        text: &str,
        expression: Option<&str>,
    ) -> Result<CorrectionOutcome, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.corrected_text {
            Some(fixed) => Ok(CorrectionOutcome {
                corrected_text: fixed.clone(),
                corrected_expression: self.corrected_expression.clone(),
            }),
            None => Ok(CorrectionOutcome {
                corrected_text: text.to_string(),
                corrected_expression: expression.map(str::to_string),
            }),
        }
    }
}

/// Mock solver service: fixed solution text plus a call counter.
pub struct MockSolverService {
    solution: String,
    calls: AtomicUsize,
}

impl MockSolverService {
    pub fn new(solution: &str) -> Self {
        Self {
            solution: solution.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolverService for MockSolverService {
    async fn solve(
        &self,
        _context: &str,
        _expression: Option<&str>,
    ) -> Result<SolverOutcome, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SolverOutcome {
            solution: self.solution.clone(),
        })
    }
}
