//! Reference range table: canonical biomarker definitions, alias
//! resolution, and unit handling.
//!
//! Loaded once at startup into an immutable table shared by `Arc` across
//! all pipeline runs. The built-in table covers the common blood panel,
//! lipid profile, and liver function markers; a custom table can be loaded
//! from JSON.

use serde::{Deserialize, Serialize};

use super::sanitize::edit_distance;

/// Expected normal range for one biomarker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalRange {
    Numeric { low: f64, high: f64 },
    Compound { systolic_max: f64, diastolic_max: f64 },
    Categorical { accepted: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiomarkerDefinition {
    pub canonical_name: String,
    /// Lowercase names this marker appears under in reports.
    pub aliases: Vec<String>,
    /// Canonical unit, as stored on the final record.
    pub unit: String,
    /// Spellings of the canonical unit accepted without conversion.
    #[serde(default)]
    pub unit_synonyms: Vec<String>,
    pub range: NormalRange,
    /// Human-readable range string, e.g. "12.0-16.0" or "<200".
    pub display_range: String,
}

impl BiomarkerDefinition {
    /// Whether a unit token from the document matches the canonical unit
    /// or one of its accepted spellings.
    pub fn accepts_unit(&self, unit: &str) -> bool {
        let normalized = normalize_unit(unit);
        normalize_unit(&self.unit) == normalized
            || self.unit_synonyms.iter().any(|s| normalize_unit(s) == normalized)
    }
}

/// Linear conversion into a definition's canonical unit:
/// `canonical_value = document_value * factor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConversion {
    pub canonical_name: String,
    pub from_unit: String,
    pub factor: f64,
}

/// A resolved alias lookup. `exact` distinguishes literal alias hits from
/// fuzzy (edit distance 1) ones; the extractor scales match confidence
/// accordingly.
#[derive(Debug, Clone, Copy)]
pub struct AliasMatch<'a> {
    pub definition: &'a BiomarkerDefinition,
    pub exact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceTable {
    definitions: Vec<BiomarkerDefinition>,
    #[serde(default)]
    conversions: Vec<UnitConversion>,
}

/// Fuzzy matching only applies to candidates of at least this many
/// characters (whitespace stripped); short tokens like "hb" or "tg" would
/// otherwise collide.
const FUZZY_MIN_CHARS: usize = 4;

impl ReferenceTable {
    pub fn new(definitions: Vec<BiomarkerDefinition>, conversions: Vec<UnitConversion>) -> Self {
        Self {
            definitions,
            conversions,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn definitions(&self) -> &[BiomarkerDefinition] {
        &self.definitions
    }

    pub fn get(&self, canonical_name: &str) -> Option<&BiomarkerDefinition> {
        self.definitions
            .iter()
            .find(|d| d.canonical_name == canonical_name)
    }

    /// Longest alias in the table, in words. Bounds the extractor's
    /// candidate window.
    pub fn max_alias_words(&self) -> usize {
        self.definitions
            .iter()
            .flat_map(|d| d.aliases.iter())
            .map(|a| a.split_whitespace().count())
            .max()
            .unwrap_or(1)
    }

    /// Resolve a candidate name to a definition.
    ///
    /// Exact alias match first (case-insensitive, whitespace-normalized).
    /// Fuzzy fallback: edit distance <= 1 on the whitespace-stripped token,
    /// accepted only when a single definition holds the best match — a tie
    /// across definitions resolves to no match rather than risk
    /// misclassification.
    pub fn resolve(&self, candidate: &str) -> Option<AliasMatch<'_>> {
        let normalized = normalize_phrase(candidate);
        if normalized.is_empty() {
            return None;
        }

        for def in &self.definitions {
            if def.aliases.iter().any(|a| normalize_phrase(a) == normalized) {
                return Some(AliasMatch {
                    definition: def,
                    exact: true,
                });
            }
        }

        let stripped: String = normalized.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.chars().count() < FUZZY_MIN_CHARS {
            return None;
        }

        let mut best: Option<&BiomarkerDefinition> = None;
        let mut best_distance = 2u32; // accept distance <= 1 only
        let mut ambiguous = false;

        for def in &self.definitions {
            for alias in &def.aliases {
                let alias_stripped: String = normalize_phrase(alias)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();

                let len_diff =
                    (stripped.len() as i32 - alias_stripped.len() as i32).unsigned_abs();
                if len_diff > 1 {
                    continue;
                }

                let dist = edit_distance(&stripped, &alias_stripped);
                if dist < best_distance {
                    best_distance = dist;
                    best = Some(def);
                    ambiguous = false;
                } else if dist == best_distance {
                    if let Some(prev) = best {
                        if prev.canonical_name != def.canonical_name {
                            ambiguous = true;
                        }
                    }
                }
            }
        }

        match best {
            Some(def) if !ambiguous => Some(AliasMatch {
                definition: def,
                exact: false,
            }),
            _ => None,
        }
    }

    /// Factor converting a document unit into the definition's canonical
    /// unit, when a known linear conversion exists.
    pub fn conversion(&self, canonical_name: &str, from_unit: &str) -> Option<f64> {
        let normalized = normalize_unit(from_unit);
        self.conversions
            .iter()
            .find(|c| c.canonical_name == canonical_name && normalize_unit(&c.from_unit) == normalized)
            .map(|c| c.factor)
    }

    /// Built-in table covering the common blood panel, lipid profile, liver
    /// function markers, blood pressure and urine protein. Ranges follow
    /// standard adult reference values.
    pub fn builtin() -> Self {
        let definitions = vec![
            numeric(
                "hemoglobin",
                &["hemoglobin", "haemoglobin", "hb", "hgb"],
                "g/dL",
                &["g/dl", "gm/dl", "g%"],
                12.0,
                16.0,
                "12.0-16.0",
            ),
            numeric(
                "glucose",
                &[
                    "glucose",
                    "blood glucose",
                    "blood sugar",
                    "fasting glucose",
                    "random glucose",
                ],
                "mg/dL",
                &["mg/dl", "mg%"],
                70.0,
                100.0,
                "70-100",
            ),
            numeric(
                "cholesterol",
                &["cholesterol", "total cholesterol", "chol"],
                "mg/dL",
                &["mg/dl"],
                0.0,
                200.0,
                "<200",
            ),
            numeric(
                "ldl_cholesterol",
                &["ldl", "ldl cholesterol", "low density lipoprotein"],
                "mg/dL",
                &["mg/dl"],
                0.0,
                100.0,
                "<100",
            ),
            numeric(
                "hdl_cholesterol",
                &["hdl", "hdl cholesterol", "high density lipoprotein"],
                "mg/dL",
                &["mg/dl"],
                40.0,
                999.0,
                ">40",
            ),
            numeric(
                "triglycerides",
                &["triglycerides", "trigs", "tg"],
                "mg/dL",
                &["mg/dl"],
                0.0,
                150.0,
                "<150",
            ),
            numeric(
                "wbc",
                &["wbc", "white blood cells", "white blood cell count", "leukocytes"],
                "/µL",
                &["/ul", "/μl", "cells/µl", "cells/ul"],
                4000.0,
                11000.0,
                "4000-11000",
            ),
            numeric(
                "platelets",
                &["platelets", "platelet count", "plt", "thrombocytes"],
                "/µL",
                &["/ul", "/μl", "cells/µl", "cells/ul"],
                150_000.0,
                450_000.0,
                "150000-450000",
            ),
            numeric(
                "hematocrit",
                &["hematocrit", "hct", "packed cell volume", "pcv"],
                "%",
                &[],
                36.0,
                46.0,
                "36-46",
            ),
            numeric(
                "alt",
                &["alt", "sgpt", "alanine aminotransferase"],
                "U/L",
                &["u/l", "iu/l"],
                7.0,
                45.0,
                "7-45",
            ),
            numeric(
                "ast",
                &["ast", "sgot", "aspartate aminotransferase"],
                "U/L",
                &["u/l", "iu/l"],
                8.0,
                40.0,
                "8-40",
            ),
            numeric(
                "bilirubin_total",
                &["total bilirubin", "bilirubin total", "bilirubin", "bil total"],
                "mg/dL",
                &["mg/dl"],
                0.3,
                1.2,
                "0.3-1.2",
            ),
            numeric(
                "albumin",
                &["albumin", "alb"],
                "g/dL",
                &["g/dl", "gm/dl"],
                3.5,
                5.0,
                "3.5-5.0",
            ),
            numeric(
                "creatinine",
                &["creatinine", "creat"],
                "mg/dL",
                &["mg/dl"],
                0.6,
                1.3,
                "0.6-1.3",
            ),
            BiomarkerDefinition {
                canonical_name: "blood_pressure".into(),
                aliases: vec!["blood pressure".into(), "bp".into()],
                unit: "mmHg".into(),
                unit_synonyms: vec!["mmhg".into(), "mm hg".into()],
                range: NormalRange::Compound {
                    systolic_max: 120.0,
                    diastolic_max: 80.0,
                },
                display_range: "120/80".into(),
            },
            BiomarkerDefinition {
                canonical_name: "urine_protein".into(),
                aliases: vec![
                    "urine protein".into(),
                    "protein urine".into(),
                    "proteinuria".into(),
                ],
                unit: String::new(),
                unit_synonyms: vec![],
                range: NormalRange::Categorical {
                    accepted: vec![
                        "negative".into(),
                        "nil".into(),
                        "absent".into(),
                        "trace".into(),
                    ],
                },
                display_range: "negative".into(),
            },
        ];

        let conversions = vec![
            conv("glucose", "mmol/l", 18.0182),
            conv("cholesterol", "mmol/l", 38.67),
            conv("ldl_cholesterol", "mmol/l", 38.67),
            conv("hdl_cholesterol", "mmol/l", 38.67),
            conv("triglycerides", "mmol/l", 88.57),
            conv("creatinine", "µmol/l", 1.0 / 88.4),
        ];

        Self {
            definitions,
            conversions,
        }
    }
}

fn numeric(
    name: &str,
    aliases: &[&str],
    unit: &str,
    unit_synonyms: &[&str],
    low: f64,
    high: f64,
    display: &str,
) -> BiomarkerDefinition {
    BiomarkerDefinition {
        canonical_name: name.into(),
        aliases: aliases.iter().map(|s| (*s).into()).collect(),
        unit: unit.into(),
        unit_synonyms: unit_synonyms.iter().map(|s| (*s).into()).collect(),
        range: NormalRange::Numeric { low, high },
        display_range: display.into(),
    }
}

fn conv(name: &str, from: &str, factor: f64) -> UnitConversion {
    UnitConversion {
        canonical_name: name.into(),
        from_unit: from.into(),
        factor,
    }
}

fn normalize_phrase(s: &str) -> String {
    s.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase and fold the Greek mu into the micro sign so "μmol/L" and
/// "µmol/l" compare equal.
pub(crate) fn normalize_unit(s: &str) -> String {
    s.trim().to_lowercase().replace('μ', "µ")
}
