//! Pipeline controller: owns the extract -> correct -> solve lifecycle for
//! one image at a time.
//!
//! Extraction and correction run back to back; solving waits for an explicit
//! request so the user can confirm or edit the recognized text first. Stage
//! outcomes are applied through guarded methods that drop anything stale or
//! out of order, which keeps rapid image switching from interleaving results.

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::correct::{CorrectionResult, Corrector};
use crate::pipeline::extract::{normalize_expression, ExtractionResult, Extractor, SourceImage};
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::solve::{SolutionResult, Solver};
use crate::status::StatusMarker;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════
// States and errors
// ═══════════════════════════════════════════════════════════

/// Where the pipeline currently stands for the active image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No run in progress. Also the terminal state of a run that ended in
    /// a status marker.
    Idle,
    Extracting,
    Correcting,
    /// Text is on screen and editable; solving waits for the user.
    ReadyToSolve,
    Solving,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Correcting => "correcting",
            Self::ReadyToSolve => "ready_to_solve",
            Self::Solving => "solving",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ControllerError {
    #[error("Nothing to solve: pipeline is {0}, not ready_to_solve")]
    NotReadyToSolve(PipelineState),

    #[error("Text can only be edited once correction has produced it (state: {0})")]
    EditNotAllowed(PipelineState),
}

// ═══════════════════════════════════════════════════════════
// Controller
// ═══════════════════════════════════════════════════════════

/// Drives the three stages for one image at a time and holds everything the
/// caller can observe: state, editable text, the latest solution, and the
/// marker that halted the last run, if any.
pub struct PipelineController {
    extractor: Extractor,
    corrector: Corrector,
    solver: Solver,

    state: PipelineState,
    current_image: Option<Uuid>,
    extraction: Option<ExtractionResult>,
    correction: Option<CorrectionResult>,
    /// Confirmed problem text, as last corrected or edited.
    text_buffer: String,
    expression: Option<String>,
    solution: Option<SolutionResult>,
    last_marker: Option<StatusMarker>,
}

impl PipelineController {
    pub fn new(extractor: Extractor, corrector: Corrector, solver: Solver) -> Self {
        Self {
            extractor,
            corrector,
            solver,
            state: PipelineState::Idle,
            current_image: None,
            extraction: None,
            correction: None,
            text_buffer: String::new(),
            expression: None,
            solution: None,
            last_marker: None,
        }
    }

    // ── observers ───────────────────────────────────────────

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn current_image(&self) -> Option<Uuid> {
        self.current_image
    }

    /// Problem text as the user would see it in the edit box.
    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn extraction(&self) -> Option<&ExtractionResult> {
        self.extraction.as_ref()
    }

    pub fn correction(&self) -> Option<&CorrectionResult> {
        self.correction.as_ref()
    }

    pub fn solution(&self) -> Option<&SolutionResult> {
        self.solution.as_ref()
    }

    /// Marker that halted the last run, until a new run begins.
    pub fn last_marker(&self) -> Option<StatusMarker> {
        self.last_marker
    }

    /// Sentence to show for the halting marker.
    pub fn user_message(&self) -> Option<&'static str> {
        self.last_marker.map(|marker| marker.user_message())
    }

    /// Preprocessed copy of the current image, for display.
    pub fn working_image(&self) -> Option<&PreparedImage> {
        self.extraction
            .as_ref()
            .and_then(|extraction| extraction.working_image.as_ref())
    }

    // ── run lifecycle ───────────────────────────────────────

    /// Start a run for `image`, discarding everything from the previous one.
    pub fn begin(&mut self, image: &SourceImage) {
        tracing::info!(image_id = %image.id, "pipeline run started");
        self.state = PipelineState::Extracting;
        self.current_image = Some(image.id);
        self.extraction = None;
        self.correction = None;
        self.text_buffer.clear();
        self.expression = None;
        self.solution = None;
        self.last_marker = None;
    }

    /// Apply an extraction outcome. Returns false, leaving the controller
    /// untouched, when the result belongs to a different image or arrives
    /// out of state order.
    pub fn apply_extraction(&mut self, result: ExtractionResult) -> bool {
        if self.state != PipelineState::Extracting || self.current_image != Some(result.image_id)
        {
            tracing::debug!(
                image_id = %result.image_id,
                state = %self.state,
                "stale extraction result dropped"
            );
            return false;
        }

        match result.full_text.marker() {
            Some(marker) => {
                tracing::info!(marker = %marker, "pipeline halted by extraction");
                self.last_marker = Some(marker);
                self.state = PipelineState::Idle;
            }
            None => {
                self.state = PipelineState::Correcting;
            }
        }
        self.extraction = Some(result);
        true
    }

    /// Apply a correction outcome for `image_id`. Seeds the editable text
    /// buffer and opens the manual solve gate. Same staleness contract as
    /// [`Self::apply_extraction`].
    pub fn apply_correction(&mut self, image_id: Uuid, result: CorrectionResult) -> bool {
        if self.state != PipelineState::Correcting || self.current_image != Some(image_id) {
            tracing::debug!(
                image_id = %image_id,
                state = %self.state,
                "stale correction result dropped"
            );
            return false;
        }

        self.text_buffer = result.corrected_text.wire_str().to_string();
        self.expression = result.corrected_expression.clone();
        self.correction = Some(result);
        self.state = PipelineState::ReadyToSolve;
        tracing::info!(text_len = self.text_buffer.len(), "text ready for review");
        true
    }

    /// Run extraction and correction for `image` and stop at the solve gate.
    /// Returns the state the run ended in: `ReadyToSolve` when text is up
    /// for review, `Idle` when a marker halted the run.
    pub async fn process_image(&mut self, image: &SourceImage) -> PipelineState {
        self.begin(image);

        let extraction = self.extractor.extract(image).await;
        let text = extraction.full_text.clone();
        let expression = extraction.expression.clone();
        self.apply_extraction(extraction);

        if self.state != PipelineState::Correcting {
            return self.state;
        }

        let correction = self.corrector.correct(&text, expression.as_deref()).await;
        self.apply_correction(image.id, correction);
        self.state
    }

    /// Solve the confirmed text. Only valid at the solve gate; the returned
    /// result may still describe a failure through its answer prefix.
    pub async fn solve(&mut self) -> Result<&SolutionResult, ControllerError> {
        if self.state != PipelineState::ReadyToSolve {
            return Err(ControllerError::NotReadyToSolve(self.state));
        }

        self.state = PipelineState::Solving;
        let result = self
            .solver
            .solve(&self.text_buffer, self.expression.as_deref())
            .await;
        self.state = PipelineState::Done;
        tracing::info!(kind = ?result.kind(), "solve finished");

        Ok(self.solution.insert(result))
    }

    // ── user edits ──────────────────────────────────────────

    /// Replace the problem text. Any existing solution no longer answers
    /// the text on screen, so it is discarded.
    pub fn edit_text(&mut self, text: impl Into<String>) -> Result<(), ControllerError> {
        if !matches!(
            self.state,
            PipelineState::ReadyToSolve | PipelineState::Done
        ) {
            return Err(ControllerError::EditNotAllowed(self.state));
        }

        self.text_buffer = text.into();
        self.invalidate_solution();
        self.state = PipelineState::ReadyToSolve;
        Ok(())
    }

    /// Replace the isolated expression. Follows the same rules as
    /// [`Self::edit_text`].
    pub fn edit_expression(
        &mut self,
        expression: Option<String>,
    ) -> Result<(), ControllerError> {
        if !matches!(
            self.state,
            PipelineState::ReadyToSolve | PipelineState::Done
        ) {
            return Err(ControllerError::EditNotAllowed(self.state));
        }

        self.expression = normalize_expression(expression);
        self.invalidate_solution();
        self.state = PipelineState::ReadyToSolve;
        Ok(())
    }

    fn invalidate_solution(&mut self) {
        if self.solution.take().is_some() {
            tracing::debug!("solution invalidated by edit");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use image::DynamicImage;

    use crate::pipeline::preprocess::{encode_png, MockImagePreprocessor};
    use crate::pipeline::solve::SolutionKind;
    use crate::services::{
        CorrectionOutcome, CorrectionService, MockCorrectionService, MockSolverService,
        MockVisionService, ServiceError,
    };
    use crate::status::StageText;

    use super::*;

    fn make_test_png() -> Vec<u8> {
        encode_png(&DynamicImage::new_rgb8(128, 96)).unwrap()
    }

    fn make_controller(
        vision: Arc<MockVisionService>,
        correction: Arc<MockCorrectionService>,
        solver: Arc<MockSolverService>,
    ) -> PipelineController {
        PipelineController::new(
            Extractor::new(Arc::new(MockImagePreprocessor::new()), vision),
            Corrector::new(correction),
            Solver::new(solver),
        )
    }

    struct FailingCorrection;

    #[async_trait]
    impl CorrectionService for FailingCorrection {
        async fn correct_text(
            &self,
            _text: &str,
            _expression: Option<&str>,
        ) -> Result<CorrectionOutcome, ServiceError> {
            Err(ServiceError::Timeout(60))
        }
    }

    // ── initial state ───────────────────────────────────────

    #[test]
    fn new_controller_is_idle_and_empty() {
        let controller = make_controller(
            Arc::new(MockVisionService::new("x")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 1")),
        );

        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(controller.current_image(), None);
        assert_eq!(controller.text(), "");
        assert_eq!(controller.last_marker(), None);
        assert!(controller.solution().is_none());
        assert!(controller.working_image().is_none());
    }

    // ── happy flow ──────────────────────────────────────────

    #[tokio::test]
    async fn processing_stops_at_the_solve_gate() {
        let vision = Arc::new(MockVisionService::new("2x + 3 = 1l"));
        let correction = Arc::new(MockCorrectionService::new("2x + 3 = 11"));
        let solver = Arc::new(MockSolverService::new("x = 4"));
        let mut controller = make_controller(vision.clone(), correction.clone(), solver.clone());

        let image = SourceImage::new(make_test_png());
        let state = controller.process_image(&image).await;

        assert_eq!(state, PipelineState::ReadyToSolve);
        assert_eq!(controller.text(), "2x + 3 = 11");
        assert_eq!(controller.current_image(), Some(image.id));
        assert!(controller.working_image().is_some());
        assert_eq!(vision.calls(), 1);
        assert_eq!(correction.calls(), 1);
        // Solving waits for an explicit request.
        assert_eq!(solver.calls(), 0);
    }

    #[tokio::test]
    async fn solve_transitions_to_done() {
        let solver = Arc::new(MockSolverService::new("Step 1: subtract 3.\nx = 4"));
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x + 3 = 11")),
            Arc::new(MockCorrectionService::echo()),
            solver.clone(),
        );

        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        let result = controller.solve().await.unwrap();

        assert_eq!(result.kind(), SolutionKind::Success);
        assert_eq!(solver.calls(), 1);
        assert_eq!(controller.state(), PipelineState::Done);
        assert!(controller.solution().is_some());
    }

    #[tokio::test]
    async fn expression_is_carried_through_to_the_gate() {
        let vision =
            Arc::new(MockVisionService::new("Solve 2x + 3 = 11").with_expression("2x + 3 = 11"));
        let mut controller = make_controller(
            vision,
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 4")),
        );

        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        assert_eq!(controller.expression(), Some("2x + 3 = 11"));
    }

    // ── marker flows ────────────────────────────────────────

    #[tokio::test]
    async fn blank_image_halts_idle_with_marker() {
        let correction = Arc::new(MockCorrectionService::echo());
        let solver = Arc::new(MockSolverService::new("unused"));
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("   ")),
            correction.clone(),
            solver.clone(),
        );

        let state = controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;

        assert_eq!(state, PipelineState::Idle);
        assert_eq!(controller.last_marker(), Some(StatusMarker::NoTextFound));
        assert!(controller.user_message().unwrap().contains("No readable text"));
        // The preprocessed copy survives for display even on a halted run.
        assert!(controller.working_image().is_some());
        assert_eq!(correction.calls(), 0);
        assert_eq!(solver.calls(), 0);
    }

    #[tokio::test]
    async fn marker_echo_from_vision_halts_idle() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("NO_TEXT_FOUND")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );

        let state = controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        assert_eq!(state, PipelineState::Idle);
        assert_eq!(controller.last_marker(), Some(StatusMarker::NoTextFound));
    }

    #[tokio::test]
    async fn preprocessing_failure_halts_idle_without_vision() {
        let vision = Arc::new(MockVisionService::new("unreachable"));
        let mut controller = PipelineController::new(
            Extractor::new(Arc::new(MockImagePreprocessor::failing()), vision.clone()),
            Corrector::new(Arc::new(MockCorrectionService::echo())),
            Solver::new(Arc::new(MockSolverService::new("unused"))),
        );

        let state = controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;

        assert_eq!(state, PipelineState::Idle);
        assert_eq!(
            controller.last_marker(),
            Some(StatusMarker::PreprocessingError)
        );
        assert_eq!(vision.calls(), 0);
    }

    #[tokio::test]
    async fn correction_failure_leaves_extracted_text_in_place() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x + 3 = 11")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 4")),
        );
        controller.corrector = Corrector::new(Arc::new(FailingCorrection));

        let state = controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;

        assert_eq!(state, PipelineState::ReadyToSolve);
        assert_eq!(controller.text(), "2x + 3 = 11");
        assert_eq!(controller.last_marker(), None);
    }

    // ── solve gating ────────────────────────────────────────

    #[tokio::test]
    async fn solve_is_rejected_outside_the_gate() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("x")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );

        let err = controller.solve().await.unwrap_err();
        assert_eq!(err, ControllerError::NotReadyToSolve(PipelineState::Idle));
        assert_eq!(
            err.to_string(),
            "Nothing to solve: pipeline is idle, not ready_to_solve"
        );
    }

    #[tokio::test]
    async fn solving_twice_requires_an_edit_in_between() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x = 8")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 4")),
        );
        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        controller.solve().await.unwrap();

        let err = controller.solve().await.unwrap_err();
        assert_eq!(err, ControllerError::NotReadyToSolve(PipelineState::Done));
    }

    #[tokio::test]
    async fn emptied_text_solves_to_an_error_answer_without_a_request() {
        let solver = Arc::new(MockSolverService::new("unused"));
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x + 3 = 11")),
            Arc::new(MockCorrectionService::echo()),
            solver.clone(),
        );
        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;

        controller.edit_text("").unwrap();
        let result = controller.solve().await.unwrap();

        assert_eq!(result.kind(), SolutionKind::Error);
        assert!(result.solution.contains("is empty"));
        assert_eq!(solver.calls(), 0);
        assert_eq!(controller.state(), PipelineState::Done);
    }

    // ── edits ───────────────────────────────────────────────

    #[tokio::test]
    async fn text_edit_after_done_discards_the_solution() {
        let solver = Arc::new(MockSolverService::new("x = 4"));
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x = 8")),
            Arc::new(MockCorrectionService::echo()),
            solver.clone(),
        );
        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        controller.solve().await.unwrap();

        controller.edit_text("3x = 9").unwrap();
        assert_eq!(controller.state(), PipelineState::ReadyToSolve);
        assert!(controller.solution().is_none());
        assert_eq!(controller.text(), "3x = 9");

        controller.solve().await.unwrap();
        assert_eq!(solver.calls(), 2);
    }

    #[tokio::test]
    async fn expression_edit_discards_the_solution_and_normalizes() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x = 8").with_expression("2x = 8")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 4")),
        );
        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        controller.solve().await.unwrap();

        controller.edit_expression(Some("  ".to_string())).unwrap();
        assert_eq!(controller.state(), PipelineState::ReadyToSolve);
        assert_eq!(controller.expression(), None);
        assert!(controller.solution().is_none());
    }

    #[test]
    fn edits_are_rejected_before_the_gate() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("x")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );

        let err = controller.edit_text("anything").unwrap_err();
        assert_eq!(err, ControllerError::EditNotAllowed(PipelineState::Idle));
    }

    // ── staleness guards ────────────────────────────────────

    #[test]
    fn extraction_for_another_image_is_dropped() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("x")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );
        let image = SourceImage::new(make_test_png());
        controller.begin(&image);

        let stale = ExtractionResult {
            full_text: StageText::from_raw("1 + 1"),
            expression: None,
            image_id: Uuid::new_v4(),
            working_image: None,
        };

        assert!(!controller.apply_extraction(stale));
        assert_eq!(controller.state(), PipelineState::Extracting);
        assert!(controller.extraction().is_none());
    }

    #[test]
    fn correction_for_another_image_is_dropped() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("x")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );
        let image = SourceImage::new(make_test_png());
        controller.begin(&image);
        controller.apply_extraction(ExtractionResult {
            full_text: StageText::from_raw("1 + 1"),
            expression: None,
            image_id: image.id,
            working_image: None,
        });
        assert_eq!(controller.state(), PipelineState::Correcting);

        let stale = CorrectionResult {
            corrected_text: StageText::from_raw("1 + 1"),
            corrected_expression: None,
        };

        assert!(!controller.apply_correction(Uuid::new_v4(), stale));
        assert_eq!(controller.state(), PipelineState::Correcting);
        assert_eq!(controller.text(), "");
    }

    #[tokio::test]
    async fn correction_after_the_gate_is_dropped() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x = 8")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("unused")),
        );
        let image = SourceImage::new(make_test_png());
        controller.process_image(&image).await;
        assert_eq!(controller.state(), PipelineState::ReadyToSolve);

        let late = CorrectionResult {
            corrected_text: StageText::from_raw("9 + 9"),
            corrected_expression: None,
        };
        assert!(!controller.apply_correction(image.id, late));
        assert_eq!(controller.text(), "2x = 8");
    }

    // ── run isolation ───────────────────────────────────────

    #[tokio::test]
    async fn beginning_a_new_run_clears_the_previous_one() {
        let mut controller = make_controller(
            Arc::new(MockVisionService::new("2x = 8")),
            Arc::new(MockCorrectionService::echo()),
            Arc::new(MockSolverService::new("x = 4")),
        );
        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        controller.solve().await.unwrap();
        assert_eq!(controller.state(), PipelineState::Done);

        let next = SourceImage::new(make_test_png());
        controller.begin(&next);

        assert_eq!(controller.state(), PipelineState::Extracting);
        assert_eq!(controller.current_image(), Some(next.id));
        assert_eq!(controller.text(), "");
        assert!(controller.solution().is_none());
        assert!(controller.extraction().is_none());
        assert_eq!(controller.last_marker(), None);
    }

    #[tokio::test]
    async fn a_full_second_run_works_after_the_first() {
        let vision = Arc::new(MockVisionService::new("5x = 10"));
        let solver = Arc::new(MockSolverService::new("x = 2"));
        let mut controller = make_controller(
            vision.clone(),
            Arc::new(MockCorrectionService::echo()),
            solver.clone(),
        );

        controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        controller.solve().await.unwrap();

        let state = controller
            .process_image(&SourceImage::new(make_test_png()))
            .await;
        assert_eq!(state, PipelineState::ReadyToSolve);
        controller.solve().await.unwrap();

        assert_eq!(vision.calls(), 2);
        assert_eq!(solver.calls(), 2);
    }

    // ── state naming ────────────────────────────────────────

    #[test]
    fn state_names_are_stable() {
        let cases = [
            (PipelineState::Idle, "idle"),
            (PipelineState::Extracting, "extracting"),
            (PipelineState::Correcting, "correcting"),
            (PipelineState::ReadyToSolve, "ready_to_solve"),
            (PipelineState::Solving, "solving"),
            (PipelineState::Done, "done"),
        ];
        for (state, name) in cases {
            assert_eq!(state.as_str(), name);
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{name}\"")
            );
        }
    }
}
