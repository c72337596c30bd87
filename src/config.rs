//! Pipeline configuration.
//!
//! All thresholds that materially affect classification output live here so
//! they are stable and documented in one place. Values are loaded once at
//! startup (e.g. from a JSON settings file via serde) and never mutated at
//! runtime.

use serde::Deserialize;

/// Tunable thresholds and limits for one pipeline instance.
///
/// Defaults:
/// - `min_ocr_confidence` 0.30: below this mean OCR confidence the run is
///   flagged `low_ocr_confidence` but continues degraded.
/// - `low_confidence_flag` 0.50: biomarkers matched below this are marked
///   `needs_review` for the downstream UI.
/// - `borderline_band` 0.10: values within ±10% of a range bound classify
///   as borderline rather than abnormal.
/// - `timeout_ms` 540_000: overall per-document deadline, matching the
///   deployment's function timeout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub min_ocr_confidence: f32,
    pub low_confidence_flag: f32,
    pub borderline_band: f64,
    pub timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_ocr_confidence: 0.30,
            low_confidence_flag: 0.50,
            borderline_band: 0.10,
            timeout_ms: 540_000,
        }
    }
}
