//! The three-stage math pipeline and its controller.
//!
//! Extraction chains into correction automatically; solving waits for an
//! explicit user action. Stage outputs carry `StageText`, so a marker can
//! never be mistaken for content downstream. Stages absorb every failure
//! from their single external call: extraction returns markers, correction
//! falls back to its input, solve synthesizes an error-prefixed solution.

pub mod controller;
pub mod correct;
pub mod extract;
pub mod preprocess;
pub mod solve;

pub use controller::*;
pub use correct::*;
pub use extract::*;
pub use preprocess::*;
pub use solve::*;

use serde::{Deserialize, Serialize};

/// Failure discipline a stage applies to its one external collaborator.
///
/// Preprocessing aborts the whole extraction on failure, while correction
/// absorbs failures and keeps its input. Each stage names its policy as an
/// associated const and logs it when the policy fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    FailFast,
    FallbackToInput,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::FallbackToInput => "fallback_to_input",
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
