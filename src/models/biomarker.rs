use serde::{Deserialize, Serialize};

/// Classification of a measured value against its reference range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiomarkerStatus {
    Normal,
    Borderline,
    Abnormal,
}

impl BiomarkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Borderline => "borderline",
            Self::Abnormal => "abnormal",
        }
    }
}

/// A measured biomarker value.
///
/// Most lab values are a single number; blood pressure is the compound
/// systolic/diastolic pair; a few (urine protein) report a categorical
/// result word instead of a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BiomarkerValue {
    Single(f64),
    Compound { systolic: f64, diastolic: f64 },
    Text(String),
}

impl BiomarkerValue {
    pub fn as_single(&self) -> Option<f64> {
        match self {
            Self::Single(v) => Some(*v),
            _ => None,
        }
    }
}

/// One validated biomarker reading, ready for the record store.
/// Unit is always the definition's canonical unit (converted upstream when
/// the document used a different one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedBiomarker {
    pub name: String,
    pub value: BiomarkerValue,
    pub unit: String,
    /// Human-readable reference range, e.g. "12.0-16.0" or "<200".
    pub range: String,
    pub status: BiomarkerStatus,
    /// Confidence of the extraction match this reading came from.
    pub confidence: f32,
    /// Set when confidence fell below the review threshold; the UI
    /// highlights these for manual confirmation.
    pub needs_review: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&BiomarkerStatus::Borderline).unwrap();
        assert_eq!(json, r#""borderline""#);
    }

    #[test]
    fn single_value_serializes_as_number() {
        let json = serde_json::to_string(&BiomarkerValue::Single(14.2)).unwrap();
        assert_eq!(json, "14.2");
    }

    #[test]
    fn compound_value_serializes_with_parts() {
        let json = serde_json::to_string(&BiomarkerValue::Compound {
            systolic: 120.0,
            diastolic: 80.0,
        })
        .unwrap();
        assert!(json.contains("\"systolic\":120.0"));
        assert!(json.contains("\"diastolic\":80.0"));
    }
}
