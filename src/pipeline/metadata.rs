//! Report-level metadata: test type, issuing facility, and report date.
//!
//! Best-effort extraction on top of the normalized text. Absent fields stay
//! `None` rather than guessing — a record with no date is better than a
//! record with a fabricated one.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;

use super::types::NormalizedDocument;

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub test_type: String,
    pub facility: Option<String>,
    pub report_date: Option<NaiveDate>,
}

/// Test types with the keywords that identify them, checked in order.
const TEST_TYPES: &[(&str, &[&str])] = &[
    (
        "Complete Blood Count",
        &["complete blood count", "cbc", "hemogram", "hematology"],
    ),
    (
        "Lipid Panel",
        &["lipid profile", "lipid panel", "lipogram", "cholesterol test"],
    ),
    (
        "Liver Function Test",
        &["liver function", "lft", "hepatic panel", "liver profile"],
    ),
    (
        "Kidney Function Test",
        &["kidney function", "kft", "renal function", "creatinine", "urea"],
    ),
    (
        "Thyroid Function Test",
        &["thyroid", "tsh", "tft", "t3", "t4"],
    ),
    ("Diabetes Test", &["hba1c", "glucose tolerance"]),
];

const FACILITY_KEYWORDS: &[&str] = &[
    "hospital",
    "clinic",
    "medical center",
    "diagnostics",
    "laboratory",
    "pathology",
];

static FACILITY_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^(?:report from|issued by)\s*:?\s*(.{3,100})$").unwrap()
});

static DATE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:test date|collected on|date)\s*:?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})")
        .unwrap()
});

static DATE_ANY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}").unwrap());

pub fn extract_metadata(doc: &NormalizedDocument) -> ReportMetadata {
    let text = doc.full_text();
    let lower = text.to_lowercase();

    ReportMetadata {
        test_type: detect_test_type(&lower),
        facility: detect_facility(&text, &lower),
        report_date: detect_date(&text),
    }
}

fn detect_test_type(lower: &str) -> String {
    for (name, keywords) in TEST_TYPES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return (*name).to_string();
        }
    }

    // Infer from the markers mentioned when no panel name appears.
    if ["cholesterol", "ldl", "hdl", "triglycerides"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "Lipid Panel".to_string()
    } else if ["alt", "ast", "bilirubin", "albumin", "sgpt", "sgot"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "Liver Function Test".to_string()
    } else if ["hemoglobin", "wbc", "platelets", "hematocrit"]
        .iter()
        .any(|t| lower.contains(t))
    {
        "Complete Blood Count".to_string()
    } else {
        "Medical Test".to_string()
    }
}

fn detect_facility(text: &str, lower: &str) -> Option<String> {
    if let Some(caps) = FACILITY_LABEL_RE.captures(text) {
        let facility = caps[1].trim().to_string();
        if facility.len() > 3 {
            return Some(facility);
        }
    }

    for (line, line_lower) in text.lines().zip(lower.lines()) {
        let trimmed = line.trim();
        if trimmed.len() > 5
            && trimmed.len() < 100
            && FACILITY_KEYWORDS.iter().any(|k| line_lower.contains(k))
        {
            return Some(trimmed.to_string());
        }
    }

    None
}

fn detect_date(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = DATE_LABEL_RE.captures(text) {
        if let Some(date) = parse_date(&caps[1]) {
            return Some(date);
        }
    }

    DATE_ANY_RE
        .find_iter(text)
        .find_map(|m| parse_date(m.as_str()))
}

/// Day-first formats tried before month-first, matching the source
/// material's reports.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.replace('-', "/");
    const FORMATS: &[&str] = &["%d/%m/%Y", "%m/%d/%Y", "%d/%m/%y", "%m/%d/%y", "%Y/%m/%d"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::TextBlock;

    fn doc(lines: &[&str]) -> NormalizedDocument {
        NormalizedDocument {
            blocks: lines
                .iter()
                .enumerate()
                .map(|(i, text)| TextBlock {
                    text: (*text).to_string(),
                    order: i,
                    source_confidence: 0.9,
                })
                .collect(),
            warnings: vec![],
        }
    }

    #[test]
    fn test_type_from_panel_keyword() {
        let meta = extract_metadata(&doc(&["Lipid Profile Report", "Cholesterol 180 mg/dL"]));
        assert_eq!(meta.test_type, "Lipid Panel");
    }

    #[test]
    fn test_type_inferred_from_markers() {
        let meta = extract_metadata(&doc(&["Hemoglobin 14.2 g/dL", "WBC 7000 /µL"]));
        assert_eq!(meta.test_type, "Complete Blood Count");
    }

    #[test]
    fn creatinine_report_types_as_kidney_function() {
        let meta = extract_metadata(&doc(&["Creatinine 1.1 mg/dL", "Urea 28 mg/dL"]));
        assert_eq!(meta.test_type, "Kidney Function Test");
    }

    #[test]
    fn thyroid_hormones_type_as_thyroid_function() {
        let meta = extract_metadata(&doc(&["T3 1.2 ng/mL", "T4 8.0 µg/dL"]));
        assert_eq!(meta.test_type, "Thyroid Function Test");
    }

    #[test]
    fn unknown_content_is_generic_medical_test() {
        let meta = extract_metadata(&doc(&["some unrelated scanned page"]));
        assert_eq!(meta.test_type, "Medical Test");
    }

    #[test]
    fn facility_from_label() {
        let meta = extract_metadata(&doc(&["Report from: Apollo Diagnostics", "Glucose 95 mg/dL"]));
        assert_eq!(meta.facility.as_deref(), Some("Apollo Diagnostics"));
    }

    #[test]
    fn facility_from_keyword_line() {
        let meta = extract_metadata(&doc(&["City General Hospital", "Hemoglobin 13.1 g/dL"]));
        assert_eq!(meta.facility.as_deref(), Some("City General Hospital"));
    }

    #[test]
    fn no_facility_stays_none() {
        let meta = extract_metadata(&doc(&["Glucose 95 mg/dL"]));
        assert!(meta.facility.is_none());
    }

    #[test]
    fn labeled_date_parses_day_first() {
        let meta = extract_metadata(&doc(&["Collected on: 15/03/2024"]));
        assert_eq!(
            meta.report_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
    }

    #[test]
    fn unlabeled_date_found_anywhere() {
        let meta = extract_metadata(&doc(&["Lab Report 02-01-2023", "Glucose 95"]));
        assert_eq!(
            meta.report_date,
            Some(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap())
        );
    }

    #[test]
    fn missing_date_stays_none() {
        let meta = extract_metadata(&doc(&["Hemoglobin 14.2 g/dL (12.0-16.0)"]));
        assert!(meta.report_date.is_none());
    }

    #[test]
    fn value_ranges_do_not_parse_as_dates() {
        let meta = extract_metadata(&doc(&["BP: 120/80 mmHg", "Hematocrit 36-46 %"]));
        assert!(meta.report_date.is_none());
    }
}
