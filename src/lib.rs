//! Mathsnap: photo-to-solution pipeline for math problems.
//!
//! An image goes through three stages: extraction (vision model reads the
//! problem), correction (recognition mistakes repaired), and solving. The
//! [`pipeline::PipelineController`] drives them and holds the state between
//! user interactions.

pub mod config;
pub mod pipeline; // extract -> correct -> solve stages and the controller
pub mod services; // model gateway client and the service trait seams
pub mod status; // status markers and the content/marker text union

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `RUST_LOG`, falling back to the crate default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{} tracing initialized", config::APP_NAME, config::APP_VERSION);
}
