//! Model-backed collaborators behind fixed request/response contracts.
//!
//! The pipeline treats the vision, correction and solver models as black
//! boxes: each trait exposes exactly one operation, and every failure is
//! a `ServiceError` that the calling stage absorbs and reclassifies. The
//! production implementation is `ModelGateway`, a single HTTP client that
//! serves all three traits.

pub mod gateway;
pub mod types;

pub use gateway::*;
pub use types::*;

use thiserror::Error;

/// Transport-level failures shared by all three services.
///
/// Stages never re-throw these: extraction maps them onto status markers,
/// correction falls back to its input, and solve folds them into an
/// error-prefixed solution string.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Model gateway is not reachable at {0}")]
    NotReachable(String),

    #[error("Model gateway returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed service response: {0}")]
    ResponseParsing(String),

    #[error("Image too large ({0} bytes); maximum is 20 MB")]
    ImageTooLarge(usize),
}
