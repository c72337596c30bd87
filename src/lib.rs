pub mod config;
pub mod models;
pub mod pipeline;

pub use config::PipelineConfig;
pub use models::{BiomarkerStatus, BiomarkerValue, ClassifiedBiomarker};
pub use pipeline::orchestrator::Pipeline;
pub use pipeline::reference::ReferenceTable;
pub use pipeline::types::{ExtractionResult, ExtractionWarning, OcrEngine};
pub use pipeline::{AcquisitionError, PipelineError};

use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "Labscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for embedding services.
/// Respects RUST_LOG when set, defaults to info for this crate.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("labscribe=info")),
        )
        .init();
}
