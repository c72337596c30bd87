pub mod acquire;
pub mod classify;
pub mod confidence;
pub mod extract;
pub mod format;
pub mod metadata;
pub mod orchestrator;
pub mod reference;
pub mod sanitize;
pub mod types;

pub use orchestrator::{Pipeline, PipelineStage};
pub use types::{ExtractionResult, ExtractionWarning};

use thiserror::Error;

/// Failures while turning document bytes into normalized text.
/// All of these are fatal for the request; the caller may retry with a
/// corrected upload.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("OCR backend failure: {0}")]
    OcrBackend(String),

    #[error("document is empty")]
    EmptyDocument,
}

/// Failures of a whole pipeline run. Partial work is discarded; nothing is
/// handed to the record store on any of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// The run exceeded the configured deadline. Transient: the caller
    /// should treat the document as not yet processed and retry.
    #[error("pipeline timed out")]
    Timeout,

    #[error("worker task failed: {0}")]
    Worker(String),
}
