//! Text acquisition: drive the OCR backend and normalize its raw blocks
//! into an ordered, cleaned document.
//!
//! Ordering is deterministic: blocks sort by (page, row band, x), where the
//! row band buckets y coordinates so small baseline jitter between blocks
//! on one visual line cannot flip their order. Adjacent blocks on the same
//! line merge when the horizontal gap is small enough to read as one
//! continued line.

use super::format::detect_format;
use super::sanitize::{correct_lab_terms, sanitize_text};
use super::types::{ExtractionWarning, NormalizedDocument, OcrEngine, RawOcrBlock, TextBlock};
use super::AcquisitionError;

/// Y coordinates within one band sort by x instead. 16 px covers typical
/// baseline jitter at 300 DPI without collapsing distinct lines.
const ROW_BAND_PX: u32 = 16;

/// Maximum horizontal gap, in pixels, for two same-line blocks to merge
/// into one continued line.
const MERGE_GAP_PX: u32 = 32;

pub struct TextAcquirer<'a> {
    engine: &'a dyn OcrEngine,
    min_confidence: f32,
}

impl<'a> TextAcquirer<'a> {
    pub fn new(engine: &'a dyn OcrEngine, min_confidence: f32) -> Self {
        Self {
            engine,
            min_confidence,
        }
    }

    /// Produce a `NormalizedDocument` from raw document bytes.
    ///
    /// Zero OCR output or mean confidence below the configured minimum is
    /// degraded, not fatal: the document comes back (possibly empty) with a
    /// `low_ocr_confidence` warning and extraction continues — partial data
    /// is more useful than none for a medical record.
    pub fn acquire(
        &self,
        document_bytes: &[u8],
        mime_type: &str,
    ) -> Result<NormalizedDocument, AcquisitionError> {
        let format = detect_format(document_bytes, mime_type)?;
        let raw = self.engine.recognize(document_bytes, &format)?;
        tracing::debug!(
            format = format.mime_type(),
            raw_blocks = raw.len(),
            "OCR backend returned"
        );

        let merged = merge_blocks(order_blocks(raw));

        let blocks: Vec<TextBlock> = merged
            .into_iter()
            .map(|b| (correct_lab_terms(&sanitize_text(&b.text)), b.confidence))
            .filter(|(text, _)| !text.is_empty())
            .enumerate()
            .map(|(order, (text, confidence))| TextBlock {
                text,
                order,
                source_confidence: confidence.clamp(0.0, 1.0),
            })
            .collect();

        let mut warnings = Vec::new();
        let mean = mean_confidence(&blocks);
        if blocks.is_empty() || mean < self.min_confidence {
            tracing::warn!(
                blocks = blocks.len(),
                mean_confidence = mean,
                "low OCR confidence, continuing degraded"
            );
            warnings.push(ExtractionWarning::LowOcrConfidence);
        }

        Ok(NormalizedDocument { blocks, warnings })
    }
}

fn mean_confidence(blocks: &[TextBlock]) -> f32 {
    if blocks.is_empty() {
        return 0.0;
    }
    blocks.iter().map(|b| b.source_confidence).sum::<f32>() / blocks.len() as f32
}

/// Reading order: page, then row band top-to-bottom, then x left-to-right.
fn order_blocks(mut blocks: Vec<RawOcrBlock>) -> Vec<RawOcrBlock> {
    blocks.sort_by(|a, b| {
        (a.page, a.bbox.y / ROW_BAND_PX, a.bbox.x).cmp(&(b.page, b.bbox.y / ROW_BAND_PX, b.bbox.x))
    });
    blocks
}

/// Merge runs of same-line neighbors. Confidence of a merged block is the
/// text-length-weighted mean of its parts.
fn merge_blocks(blocks: Vec<RawOcrBlock>) -> Vec<RawOcrBlock> {
    let mut merged: Vec<RawOcrBlock> = Vec::with_capacity(blocks.len());

    for block in blocks {
        match merged.last_mut() {
            Some(prev) if continues_line(prev, &block) => {
                let prev_len = prev.text.chars().count() as f32;
                let new_len = block.text.chars().count() as f32;
                let total = (prev_len + new_len).max(1.0);
                prev.confidence =
                    (prev.confidence * prev_len + block.confidence * new_len) / total;

                prev.text.push(' ');
                prev.text.push_str(&block.text);

                let right = prev.bbox.right().max(block.bbox.right());
                let bottom =
                    (prev.bbox.y + prev.bbox.height).max(block.bbox.y + block.bbox.height);
                prev.bbox.y = prev.bbox.y.min(block.bbox.y);
                prev.bbox.width = right - prev.bbox.x;
                prev.bbox.height = bottom - prev.bbox.y;
            }
            _ => merged.push(block),
        }
    }

    merged
}

/// Whether `b` continues the visual line of `a`: same page, vertical
/// centers within half the shorter block's height, horizontal gap at most
/// `MERGE_GAP_PX` with no overlap running backwards.
fn continues_line(a: &RawOcrBlock, b: &RawOcrBlock) -> bool {
    if a.page != b.page {
        return false;
    }

    let tolerance = a.bbox.height.min(b.bbox.height) / 2;
    if a.bbox.v_center().abs_diff(b.bbox.v_center()) > tolerance {
        return false;
    }

    b.bbox.x >= a.bbox.right() && b.bbox.x - a.bbox.right() <= MERGE_GAP_PX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BoundingBox, MockOcrEngine};

    fn block(text: &str, page: usize, x: u32, y: u32, w: u32, conf: f32) -> RawOcrBlock {
        RawOcrBlock {
            text: text.into(),
            confidence: conf,
            page,
            bbox: BoundingBox {
                x,
                y,
                width: w,
                height: 20,
            },
        }
    }

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];

    #[test]
    fn blocks_ordered_by_page_then_position() {
        let engine = MockOcrEngine::from_blocks(vec![
            block("second page", 1, 0, 0, 100, 0.9),
            block("lower", 0, 0, 200, 100, 0.9),
            block("upper", 0, 0, 0, 100, 0.9),
        ]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        let texts: Vec<&str> = doc.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["upper", "lower", "second page"]);
        assert_eq!(doc.blocks[0].order, 0);
        assert_eq!(doc.blocks[2].order, 2);
    }

    #[test]
    fn same_row_orders_left_to_right_despite_jitter() {
        let engine = MockOcrEngine::from_blocks(vec![
            block("14.2", 0, 300, 102, 60, 0.9),
            block("Hemoglobin", 0, 0, 100, 120, 0.9),
        ]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.blocks[0].text, "Hemoglobin");
        assert_eq!(doc.blocks[1].text, "14.2");
    }

    #[test]
    fn adjacent_same_line_blocks_merge() {
        let engine = MockOcrEngine::from_blocks(vec![
            block("Hemoglobin", 0, 0, 100, 120, 0.9),
            block("14.2 g/dL", 0, 130, 100, 80, 0.9),
        ]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.block_count(), 1);
        assert_eq!(doc.blocks[0].text, "Hemoglobin 14.2 g/dL");
    }

    #[test]
    fn wide_gap_blocks_stay_separate() {
        let engine = MockOcrEngine::from_blocks(vec![
            block("Hemoglobin", 0, 0, 100, 120, 0.9),
            block("14.2", 0, 400, 100, 60, 0.9),
        ]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.block_count(), 2);
    }

    #[test]
    fn merged_confidence_is_length_weighted() {
        let engine = MockOcrEngine::from_blocks(vec![
            block("aaaaaaaa", 0, 0, 100, 100, 1.0), // 8 chars
            block("bb", 0, 110, 100, 20, 0.5),      // 2 chars
        ]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.block_count(), 1);
        // (1.0 * 8 + 0.5 * 2) / 10 = 0.9
        assert!((doc.blocks[0].source_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn zero_ocr_blocks_degrades_with_warning() {
        let engine = MockOcrEngine::empty();
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.block_count(), 0);
        assert_eq!(doc.warnings, vec![ExtractionWarning::LowOcrConfidence]);
    }

    #[test]
    fn low_mean_confidence_adds_warning() {
        let engine = MockOcrEngine::from_lines(&[("barely legible scan", 0.2)]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.block_count(), 1);
        assert_eq!(doc.warnings, vec![ExtractionWarning::LowOcrConfidence]);
    }

    #[test]
    fn good_confidence_has_no_warning() {
        let engine = MockOcrEngine::from_lines(&[("Hemoglobin 14.2 g/dL", 0.9)]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn text_is_sanitized_and_corrected() {
        let engine = MockOcrEngine::from_lines(&[("Hernoglobin\x00:  14.2  g/dL", 0.9)]);
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let doc = acquirer.acquire(PNG, "image/png").unwrap();

        assert_eq!(doc.blocks[0].text, "Hemoglobin: 14.2 g/dL");
    }

    #[test]
    fn backend_failure_propagates() {
        let engine = MockOcrEngine::failing("quota exceeded");
        let acquirer = TextAcquirer::new(&engine, 0.3);
        let err = acquirer.acquire(PNG, "image/png").unwrap_err();
        assert!(matches!(err, AcquisitionError::OcrBackend(_)));
    }

    #[test]
    fn unsupported_input_propagates() {
        let engine = MockOcrEngine::empty();
        let acquirer = TextAcquirer::new(&engine, 0.3);

        let err = acquirer.acquire(&[], "image/png").unwrap_err();
        assert!(matches!(err, AcquisitionError::EmptyDocument));

        let err = acquirer.acquire(b"not a real format", "text/plain").unwrap_err();
        assert!(matches!(err, AcquisitionError::UnsupportedFormat(_)));
    }
}
