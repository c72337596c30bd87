//! Pipeline orchestration.
//!
//! One `Pipeline` instance serves many concurrent, independent requests.
//! The only shared state is the reference table (immutable after startup)
//! and the OCR engine handle; everything per-request is owned by the run
//! and dropped on every exit path, so retries after failure are idempotent.
//!
//! The OCR backend blocks, so acquisition runs on `spawn_blocking` — the
//! calling task stays free while the worker waits. The whole run sits under
//! one deadline; exceeding it yields `PipelineError::Timeout` and discards
//! any partial matches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::acquire::TextAcquirer;
use super::classify::classify;
use super::confidence::aggregate;
use super::extract::BiomarkerExtractor;
use super::metadata::extract_metadata;
use super::reference::ReferenceTable;
use super::types::{ExtractionResult, OcrEngine};
use super::PipelineError;
use crate::config::PipelineConfig;
use crate::models::ClassifiedBiomarker;

/// Stages of one document run, in order. `Failed` is terminal from any
/// stage; `Done` only after aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Acquiring,
    Extracting,
    Classifying,
    Aggregating,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Acquiring => "acquiring",
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

pub struct Pipeline {
    engine: Arc<dyn OcrEngine + Send + Sync>,
    table: Arc<ReferenceTable>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        engine: Arc<dyn OcrEngine + Send + Sync>,
        table: Arc<ReferenceTable>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            table,
            config,
        }
    }

    /// Process one document end to end.
    ///
    /// Returns the full `ExtractionResult` or a typed failure, never a
    /// partially populated result presented as success.
    ///
    /// A timed-out run abandons the in-flight OCR call rather than
    /// interrupting it: the blocking worker finishes in the background,
    /// its output is dropped, and the worker slot stays occupied until
    /// the backend returns.
    pub async fn process(
        &self,
        document_bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let document_id = Uuid::new_v4();
        let deadline = Duration::from_millis(self.config.timeout_ms);
        transition(document_id, PipelineStage::Received);

        match tokio::time::timeout(deadline, self.run(document_id, document_bytes, mime_type))
            .await
        {
            Ok(Ok(result)) => {
                transition(document_id, PipelineStage::Done);
                Ok(result)
            }
            Ok(Err(e)) => {
                transition(document_id, PipelineStage::Failed);
                Err(e)
            }
            Err(_) => {
                transition(document_id, PipelineStage::Failed);
                tracing::warn!(
                    document_id = %document_id,
                    timeout_ms = self.config.timeout_ms,
                    "pipeline run exceeded deadline"
                );
                Err(PipelineError::Timeout)
            }
        }
    }

    async fn run(
        &self,
        document_id: Uuid,
        document_bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        transition(document_id, PipelineStage::Acquiring);
        let engine = Arc::clone(&self.engine);
        let min_confidence = self.config.min_ocr_confidence;
        let mime = mime_type.to_string();

        let doc = tokio::task::spawn_blocking(move || {
            let acquirer = TextAcquirer::new(engine.as_ref(), min_confidence);
            acquirer.acquire(&document_bytes, &mime)
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))??;

        transition(document_id, PipelineStage::Extracting);
        let extractor = BiomarkerExtractor::new(&self.table);
        let (matches, extraction_warnings) = extractor.extract(&doc);

        let mut warnings = doc.warnings.clone();
        warnings.extend(extraction_warnings);

        transition(document_id, PipelineStage::Classifying);
        let mut biomarkers: BTreeMap<String, ClassifiedBiomarker> = BTreeMap::new();
        for m in &matches {
            // Matches only exist for names the table resolved.
            if let Some(def) = self.table.get(&m.name) {
                let classified = classify(
                    m,
                    def,
                    self.config.borderline_band,
                    self.config.low_confidence_flag,
                );
                biomarkers.insert(classified.name.clone(), classified);
            }
        }

        transition(document_id, PipelineStage::Aggregating);
        let overall_confidence = aggregate(&matches, &mut warnings);
        let meta = extract_metadata(&doc);

        tracing::info!(
            document_id = %document_id,
            biomarkers = biomarkers.len(),
            warnings = warnings.len(),
            overall_confidence,
            test_type = %meta.test_type,
            "extraction complete"
        );

        Ok(ExtractionResult {
            document_id,
            biomarkers,
            overall_confidence,
            text_length: doc.text_length(),
            block_count: doc.block_count(),
            warnings,
            test_type: meta.test_type,
            facility: meta.facility,
            report_date: meta.report_date,
            processed_at: Utc::now(),
        })
    }
}

fn transition(document_id: Uuid, stage: PipelineStage) {
    tracing::debug!(document_id = %document_id, stage = stage.as_str(), "pipeline stage");
}
