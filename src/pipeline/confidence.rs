//! Overall confidence aggregation.
//!
//! The record-level score is the unweighted mean of the kept matches'
//! confidence, lowered by a fixed penalty per accumulated warning and
//! floored at zero — more warnings can never raise the score.

use super::types::{BiomarkerMatch, ExtractionWarning};

/// Penalty subtracted from the overall score for one warning.
pub fn penalty(warning: &ExtractionWarning) -> f32 {
    match warning {
        ExtractionWarning::LowOcrConfidence => 0.15,
        ExtractionWarning::ValueNotFound { .. } => 0.05,
        ExtractionWarning::UnitMismatch { .. } => 0.05,
        // The score is already zero when nothing was extracted.
        ExtractionWarning::NoBiomarkersExtracted => 0.0,
    }
}

/// Compute the overall confidence for a run. Appends
/// `no_biomarkers_extracted` when the match set is empty.
pub fn aggregate(matches: &[BiomarkerMatch], warnings: &mut Vec<ExtractionWarning>) -> f32 {
    if matches.is_empty() {
        warnings.push(ExtractionWarning::NoBiomarkersExtracted);
        return 0.0;
    }

    let mean: f32 =
        matches.iter().map(|m| m.match_confidence).sum::<f32>() / matches.len() as f32;
    let total_penalty: f32 = warnings.iter().map(penalty).sum();

    (mean - total_penalty).clamp(0.0, 1.0)
}
