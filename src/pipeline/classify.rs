//! Classification of extracted values against reference ranges.
//!
//! Range bounds are inclusive: a value exactly at the lower or upper bound
//! is normal. The borderline band extends each bound by the configured
//! fraction (default ±10%); values inside the band but outside the strict
//! range classify as borderline, everything further out as abnormal.

use super::reference::{BiomarkerDefinition, NormalRange};
use super::types::BiomarkerMatch;
use crate::models::{BiomarkerStatus, BiomarkerValue, ClassifiedBiomarker};

/// Classify one match. `band` is the borderline fraction,
/// `review_threshold` the confidence below which the reading is flagged
/// for manual review.
pub fn classify(
    m: &BiomarkerMatch,
    def: &BiomarkerDefinition,
    band: f64,
    review_threshold: f32,
) -> ClassifiedBiomarker {
    let status = status_for(&m.value, &def.range, band);

    ClassifiedBiomarker {
        name: m.name.clone(),
        value: m.value.clone(),
        unit: def.unit.clone(),
        range: def.display_range.clone(),
        status,
        confidence: m.match_confidence,
        needs_review: m.match_confidence < review_threshold,
    }
}

fn status_for(value: &BiomarkerValue, range: &NormalRange, band: f64) -> BiomarkerStatus {
    match (value, range) {
        (BiomarkerValue::Single(v), NormalRange::Numeric { low, high }) => {
            if *low <= *v && *v <= *high {
                BiomarkerStatus::Normal
            } else if low * (1.0 - band) <= *v && *v <= high * (1.0 + band) {
                BiomarkerStatus::Borderline
            } else {
                BiomarkerStatus::Abnormal
            }
        }
        (
            BiomarkerValue::Compound {
                systolic,
                diastolic,
            },
            NormalRange::Compound {
                systolic_max,
                diastolic_max,
            },
        ) => {
            if systolic <= systolic_max && diastolic <= diastolic_max {
                BiomarkerStatus::Normal
            } else if *systolic <= systolic_max * (1.0 + band)
                && *diastolic <= diastolic_max * (1.0 + band)
            {
                BiomarkerStatus::Borderline
            } else {
                BiomarkerStatus::Abnormal
            }
        }
        (BiomarkerValue::Text(word), NormalRange::Categorical { accepted }) => {
            if accepted.iter().any(|a| a == word) {
                BiomarkerStatus::Normal
            } else {
                BiomarkerStatus::Abnormal
            }
        }
        // Value shape not matching the range kind means the extractor and
        // table disagree; treat as abnormal so it is surfaced, not hidden.
        _ => BiomarkerStatus::Abnormal,
    }
}
