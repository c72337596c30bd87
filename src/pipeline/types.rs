use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::format::DocumentFormat;
use super::AcquisitionError;
use crate::models::{BiomarkerValue, ClassifiedBiomarker};

/// Bounding box of an OCR block on its page, in pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn v_center(&self) -> u32 {
        self.y + self.height / 2
    }
}

/// Raw OCR output for one recognized text region, before normalization.
#[derive(Debug, Clone)]
pub struct RawOcrBlock {
    pub text: String,
    pub confidence: f32,
    pub page: usize,
    pub bbox: BoundingBox,
}

/// OCR backend abstraction (allows mocking for tests).
/// Implementations may block; the orchestrator isolates calls on a worker
/// thread.
pub trait OcrEngine {
    fn recognize(
        &self,
        document_bytes: &[u8],
        format: &DocumentFormat,
    ) -> Result<Vec<RawOcrBlock>, AcquisitionError>;
}

/// One normalized text block in reading order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub order: usize,
    pub source_confidence: f32,
}

/// Ordered, cleaned text of one document. Owned by a single extraction run.
#[derive(Debug, Clone, Default)]
pub struct NormalizedDocument {
    pub blocks: Vec<TextBlock>,
    pub warnings: Vec<ExtractionWarning>,
}

impl NormalizedDocument {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn text_length(&self) -> usize {
        self.blocks.iter().map(|b| b.text.chars().count()).sum()
    }

    pub fn full_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A biomarker mention with a successfully parsed value, pre-classification.
/// Value and unit are already converted to the definition's canonical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomarkerMatch {
    pub name: String,
    pub value: BiomarkerValue,
    pub unit: String,
    pub match_confidence: f32,
    pub source_block: usize,
}

/// Non-fatal conditions accumulated during a run. These lower the overall
/// confidence but never abort processing: a degraded record is more useful
/// than none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    LowOcrConfidence,
    ValueNotFound { name: String },
    UnitMismatch { name: String },
    NoBiomarkersExtracted,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowOcrConfidence => write!(f, "low_ocr_confidence"),
            Self::ValueNotFound { name } => write!(f, "value_not_found:{name}"),
            Self::UnitMismatch { name } => write!(f, "unit_mismatch:{name}"),
            Self::NoBiomarkersExtracted => write!(f, "no_biomarkers_extracted"),
        }
    }
}

impl Serialize for ExtractionWarning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The pipeline's sole output artifact. Ownership passes to the record
/// store on return; nothing is persisted before this exists in full.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub document_id: Uuid,
    /// Keyed by canonical biomarker name; unique by construction,
    /// deterministic iteration order.
    pub biomarkers: BTreeMap<String, ClassifiedBiomarker>,
    pub overall_confidence: f32,
    pub text_length: usize,
    pub block_count: usize,
    pub warnings: Vec<ExtractionWarning>,
    pub test_type: String,
    pub facility: Option<String>,
    pub report_date: Option<NaiveDate>,
    pub processed_at: DateTime<Utc>,
}

/// Mock OCR engine for tests and embedding without a real backend.
pub struct MockOcrEngine {
    blocks: Vec<RawOcrBlock>,
    failure: Option<String>,
    delay: Option<std::time::Duration>,
}

impl MockOcrEngine {
    /// One block per line, stacked vertically on page 0.
    pub fn from_lines(lines: &[(&str, f32)]) -> Self {
        let blocks = lines
            .iter()
            .enumerate()
            .map(|(i, (text, conf))| RawOcrBlock {
                text: (*text).to_string(),
                confidence: *conf,
                page: 0,
                bbox: BoundingBox {
                    x: 0,
                    y: (i as u32) * 40,
                    width: 600,
                    height: 24,
                },
            })
            .collect();
        Self {
            blocks,
            failure: None,
            delay: None,
        }
    }

    pub fn from_blocks(blocks: Vec<RawOcrBlock>) -> Self {
        Self {
            blocks,
            failure: None,
            delay: None,
        }
    }

    pub fn empty() -> Self {
        Self::from_blocks(Vec::new())
    }

    pub fn failing(message: &str) -> Self {
        Self {
            blocks: Vec::new(),
            failure: Some(message.to_string()),
            delay: None,
        }
    }

    /// Sleep before answering, to exercise timeout handling.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(
        &self,
        _document_bytes: &[u8],
        _format: &DocumentFormat,
    ) -> Result<Vec<RawOcrBlock>, AcquisitionError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.failure {
            return Err(AcquisitionError::OcrBackend(message.clone()));
        }
        Ok(self.blocks.clone())
    }
}
