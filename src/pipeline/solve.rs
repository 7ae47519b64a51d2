//! Solving stage: turns a confirmed problem statement into a worked answer.
//!
//! The stage never fails at the type level. Preconditions that make a solver
//! call pointless (empty text, a status marker standing in for text) are
//! answered locally with a prefixed error string, and transport failures are
//! folded into the same shape.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::SolverService;
use crate::status::StatusMarker;

/// Prefix for answers that report a failure instead of a solution.
pub const ERROR_PREFIX: &str = "**Error:**";

/// Prefix for answers that conclude without a numeric result, such as an
/// unsolvable or contradictory problem.
pub const CONCLUSION_PREFIX: &str = "**Conclusion:**";

/// Classification of a solution string, derived from its leading prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionKind {
    Success,
    Error,
    Conclusion,
}

/// Output of the solving stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionResult {
    pub solution: String,
}

impl SolutionResult {
    pub fn new(solution: impl Into<String>) -> Self {
        Self {
            solution: solution.into(),
        }
    }

    /// Kind of answer this is. Recomputed on every call rather than cached,
    /// since callers may replace the solution text and ask again.
    pub fn kind(&self) -> SolutionKind {
        let text = self.solution.trim_start();
        if text.starts_with(ERROR_PREFIX) {
            SolutionKind::Error
        } else if text.starts_with(CONCLUSION_PREFIX) {
            SolutionKind::Conclusion
        } else {
            SolutionKind::Success
        }
    }
}

/// Runs the solving stage.
pub struct Solver {
    service: Arc<dyn SolverService>,
}

impl Solver {
    pub fn new(service: Arc<dyn SolverService>) -> Self {
        Self { service }
    }

    /// Solve the given problem context, with an optional isolated expression
    /// as a hint. Preconditions are checked here so that no request is made
    /// for input the solver cannot act on.
    pub async fn solve(&self, context: &str, expression: Option<&str>) -> SolutionResult {
        let trimmed = context.trim();

        if trimmed.is_empty() {
            tracing::debug!("solve skipped, problem text is empty");
            return SolutionResult::new(format!(
                "{ERROR_PREFIX} The problem text is empty; there is nothing to solve."
            ));
        }

        if let Some(marker) = StatusMarker::from_str(trimmed) {
            tracing::debug!(marker = %marker, "solve skipped, input is a status marker");
            return SolutionResult::new(format!(
                "{ERROR_PREFIX} Cannot solve: {}",
                marker.user_message()
            ));
        }

        match self.service.solve(trimmed, expression).await {
            Ok(outcome) => {
                let result = SolutionResult::new(outcome.solution.trim());
                tracing::info!(kind = ?result.kind(), "solution received");
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "solver request failed");
                SolutionResult::new(format!("{ERROR_PREFIX} Solver request failed: {e}"))
            }
        }
    }
}
