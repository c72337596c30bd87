//! Biomarker extraction: scan normalized text for marker mentions, parse
//! their values and units, and resolve duplicates.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::reference::{AliasMatch, BiomarkerDefinition, NormalRange, ReferenceTable};
use super::types::{BiomarkerMatch, ExtractionWarning, NormalizedDocument, TextBlock};
use crate::models::BiomarkerValue;

/// Pattern-specificity factors applied to the source block's OCR
/// confidence. Fixed so classification output is reproducible.
pub mod factors {
    /// Exact alias with an adjacent recognized unit.
    pub const EXACT_WITH_UNIT: f32 = 1.0;
    /// Fuzzy alias hit, or no unit token next to the value.
    pub const REDUCED: f32 = 0.85;
    /// Value only found at the head of the following block.
    pub const DISTANT: f32 = 0.70;
}

/// How far past a marker name the value search looks, in characters.
const VALUE_WINDOW_CHARS: usize = 60;

/// Result words accepted as categorical values even when not in the
/// definition's accepted set (they still classify, just as abnormal).
const CATEGORICAL_RESULTS: &[&str] = &[
    "negative", "positive", "trace", "nil", "absent", "present",
];

static COMPOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})\s*/\s*(\d{1,3})").unwrap());
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());
static UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-zµμ%/][A-Za-z0-9µμ%/]*)").unwrap());
static UNIT_BEFORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-zµμ%/][A-Za-z0-9µμ%/]*)\s*$").unwrap());

pub struct BiomarkerExtractor<'a> {
    table: &'a ReferenceTable,
}

impl<'a> BiomarkerExtractor<'a> {
    pub fn new(table: &'a ReferenceTable) -> Self {
        Self { table }
    }

    /// Scan every block in reading order. Returns the surviving matches
    /// (one per canonical name, highest confidence wins, earliest mention
    /// on ties) plus per-occurrence warnings.
    pub fn extract(
        &self,
        doc: &NormalizedDocument,
    ) -> (Vec<BiomarkerMatch>, Vec<ExtractionWarning>) {
        let mut winners: Vec<BiomarkerMatch> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut warnings = Vec::new();
        let max_words = self.table.max_alias_words();

        for (block_idx, block) in doc.blocks.iter().enumerate() {
            let tokens = tokenize(&block.text);
            let next_block = doc.blocks.get(block_idx + 1);
            let mut i = 0;

            while i < tokens.len() {
                let mut advance = 1;

                if let Some((alias, span_words, name_end)) =
                    self.resolve_at(&block.text, &tokens, i, max_words)
                {
                    let name = alias.definition.canonical_name.clone();
                    match self.find_value(&alias, block, name_end, next_block) {
                        Ok(Some(m)) => {
                            match by_name.get(&name) {
                                Some(&idx) => {
                                    // Strictly greater replaces; ties keep the
                                    // earlier mention.
                                    if m.match_confidence > winners[idx].match_confidence {
                                        winners[idx] = m;
                                    }
                                }
                                None => {
                                    by_name.insert(name, winners.len());
                                    winners.push(m);
                                }
                            }
                        }
                        Ok(None) => {
                            tracing::debug!(name = %name, block = block_idx, "no parseable value near mention");
                            warnings.push(ExtractionWarning::ValueNotFound { name });
                        }
                        Err(()) => {
                            tracing::debug!(name = %name, block = block_idx, "unit mismatch, match discarded");
                            warnings.push(ExtractionWarning::UnitMismatch { name });
                        }
                    }
                    advance = span_words;
                }

                i += advance;
            }
        }

        (winners, warnings)
    }

    /// Try alias windows at token position `i`, longest first. An exact
    /// alias at any span beats a fuzzy hit at a longer span: "Hemoglobin g"
    /// is edit distance 1 from the alias once whitespace is stripped, and
    /// must not shadow the exact single-word match.
    fn resolve_at(
        &self,
        text: &str,
        tokens: &[Token],
        i: usize,
        max_words: usize,
    ) -> Option<(AliasMatch<'a>, usize, usize)> {
        let available = tokens.len() - i;
        let mut fuzzy: Option<(AliasMatch<'a>, usize, usize)> = None;

        for span in (1..=max_words.min(available)).rev() {
            let start = tokens[i].start;
            let end = tokens[i + span - 1].end;
            if let Some(alias) = self.table.resolve(&text[start..end]) {
                if alias.exact {
                    return Some((alias, span, end));
                }
                if fuzzy.is_none() {
                    fuzzy = Some((alias, span, end));
                }
            }
        }
        fuzzy
    }

    /// Search the bounded window after the name for a value and unit.
    /// `Ok(None)` means no parseable value; `Err(())` means a unit-like
    /// token was present but neither accepted nor convertible.
    fn find_value(
        &self,
        alias: &AliasMatch<'a>,
        block: &TextBlock,
        name_end: usize,
        next_block: Option<&TextBlock>,
    ) -> Result<Option<BiomarkerMatch>, ()> {
        let def = alias.definition;
        let same = head(&block.text[name_end..], VALUE_WINDOW_CHARS);

        if let Some(parsed) = parse_value(def, same) {
            return self.finish(alias, block, parsed, false);
        }

        // Value may have been split into the next block by OCR layout.
        if let Some(next) = next_block {
            let window = head(&next.text, VALUE_WINDOW_CHARS);
            if let Some(parsed) = parse_value(def, window) {
                return self.finish(alias, block, parsed, true);
            }
        }

        Ok(None)
    }

    fn finish(
        &self,
        alias: &AliasMatch<'a>,
        block: &TextBlock,
        parsed: ParsedValue,
        distant: bool,
    ) -> Result<Option<BiomarkerMatch>, ()> {
        let def = alias.definition;
        let mut value = parsed.value;
        let mut unit_adjacent = false;

        if let Some(token) = &parsed.unit_token {
            if def.accepts_unit(token) {
                unit_adjacent = true;
            } else if let Some(factor) = self.table.conversion(&def.canonical_name, token) {
                match value {
                    BiomarkerValue::Single(v) => {
                        value = BiomarkerValue::Single(v * factor);
                        unit_adjacent = true;
                    }
                    // No linear conversions exist for compound or
                    // categorical values.
                    _ => return Err(()),
                }
            } else if looks_like_unit(token) {
                return Err(());
            }
            // Anything else is trailing prose ("elevated", "high"), not a
            // unit: keep the match, just without the adjacency bonus.
        }

        // Categorical markers carry no unit; don't penalize its absence.
        let no_unit_expected = def.unit.is_empty();

        let mut factor = factors::EXACT_WITH_UNIT;
        if !alias.exact || !(unit_adjacent || no_unit_expected) {
            factor = factor.min(factors::REDUCED);
        }
        if distant {
            factor = factor.min(factors::DISTANT);
        }

        let match_confidence = (block.source_confidence * factor).clamp(0.0, 1.0);

        Ok(Some(BiomarkerMatch {
            name: def.canonical_name.clone(),
            value,
            unit: def.unit.clone(),
            match_confidence,
            source_block: block.order,
        }))
    }
}

struct ParsedValue {
    value: BiomarkerValue,
    unit_token: Option<String>,
}

/// Parse the kind of value the definition expects out of a window.
fn parse_value(def: &BiomarkerDefinition, window: &str) -> Option<ParsedValue> {
    match &def.range {
        NormalRange::Compound { .. } => {
            let caps = COMPOUND_RE.captures(window)?;
            let whole = caps.get(0)?;
            let systolic: f64 = caps[1].parse().ok()?;
            let diastolic: f64 = caps[2].parse().ok()?;
            Some(ParsedValue {
                value: BiomarkerValue::Compound {
                    systolic,
                    diastolic,
                },
                unit_token: pick_unit(
                    def,
                    unit_after(&window[whole.end()..]),
                    unit_before(&window[..whole.start()]),
                ),
            })
        }
        NormalRange::Numeric { .. } => {
            let m = NUMBER_RE.find(window)?;
            let v: f64 = m.as_str().replace(',', ".").parse().ok()?;
            Some(ParsedValue {
                value: BiomarkerValue::Single(v),
                unit_token: pick_unit(
                    def,
                    unit_after(&window[m.end()..]),
                    unit_before(&window[..m.start()]),
                ),
            })
        }
        NormalRange::Categorical { accepted } => {
            let word = window
                .split(|c: char| !c.is_alphabetic())
                .map(|w| w.to_lowercase())
                .find(|w| {
                    accepted.contains(w) || CATEGORICAL_RESULTS.contains(&w.as_str())
                })?;
            Some(ParsedValue {
                value: BiomarkerValue::Text(word),
                unit_token: None,
            })
        }
    }
}

/// The token directly after a value, candidate unit. Whether it actually
/// is one is decided against the definition's synonyms and the conversion
/// table; see `looks_like_unit` for the mismatch/prose distinction.
fn unit_after(rest: &str) -> Option<String> {
    let caps = UNIT_RE.captures(rest)?;
    Some(caps[1].to_string())
}

/// The token directly before a value. Some reports print a Test/Unit/Result
/// column layout where the unit precedes the number.
fn unit_before(prefix: &str) -> Option<String> {
    let caps = UNIT_BEFORE_RE.captures(prefix)?;
    Some(caps[1].to_string())
}

/// Choose between the trailing and leading unit candidates. The trailing
/// token wins when it is plausibly a unit; otherwise a plausible leading
/// token takes over, and trailing prose is kept as-is for `finish` to
/// dismiss.
fn pick_unit(
    def: &BiomarkerDefinition,
    after: Option<String>,
    before: Option<String>,
) -> Option<String> {
    let plausible = |t: &String| def.accepts_unit(t) || looks_like_unit(t);
    match &after {
        Some(t) if plausible(t) => after,
        _ => before.filter(plausible).or(after),
    }
}

/// A token that was neither accepted nor convertible is a genuine unit
/// mismatch only when it has the shape of a unit. Plain words after the
/// value ("elevated", "borderline") are report prose, not units.
fn looks_like_unit(token: &str) -> bool {
    token.contains('/') || token.contains('%') || token.contains('µ') || token.contains('μ')
}

fn head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

/// Alphabetic runs with their byte offsets. Aliases are purely alphabetic,
/// so digits and punctuation act as separators.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_alphabetic() {
            if current.is_none() {
                current = Some(idx);
            }
        } else if let Some(start) = current.take() {
            tokens.push(Token { start, end: idx });
        }
    }
    if let Some(start) = current {
        tokens.push(Token {
            start,
            end: text.len(),
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(lines: &[(&str, f32)]) -> NormalizedDocument {
        NormalizedDocument {
            blocks: lines
                .iter()
                .enumerate()
                .map(|(i, (text, conf))| TextBlock {
                    text: (*text).to_string(),
                    order: i,
                    source_confidence: *conf,
                })
                .collect(),
            warnings: vec![],
        }
    }

    fn extract(lines: &[(&str, f32)]) -> (Vec<BiomarkerMatch>, Vec<ExtractionWarning>) {
        let table = ReferenceTable::builtin();
        BiomarkerExtractor::new(&table).extract(&doc(lines))
    }

    #[test]
    fn extracts_simple_numeric_with_unit() {
        let (matches, warnings) = extract(&[("Hemoglobin 14.2 g/dL (12.0-16.0)", 0.9)]);
        assert!(warnings.is_empty());
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.name, "hemoglobin");
        assert_eq!(m.value, BiomarkerValue::Single(14.2));
        assert_eq!(m.unit, "g/dL");
        // exact alias + adjacent unit: full specificity
        assert!((m.match_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn extracts_compound_blood_pressure() {
        let (matches, _) = extract(&[("BP: 120/80 mmHg", 0.8)]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "blood_pressure");
        assert_eq!(
            matches[0].value,
            BiomarkerValue::Compound {
                systolic: 120.0,
                diastolic: 80.0
            }
        );
        assert_eq!(matches[0].unit, "mmHg");
    }

    #[test]
    fn missing_value_logs_warning() {
        let (matches, warnings) = extract(&[("Hemoglobin test was performed", 0.9)]);
        assert!(matches.is_empty());
        assert_eq!(
            warnings,
            vec![ExtractionWarning::ValueNotFound {
                name: "hemoglobin".into()
            }]
        );
    }

    #[test]
    fn duplicate_mentions_keep_highest_confidence() {
        let (matches, _) = extract(&[
            ("Glucose 95 mg/dL", 0.9),
            ("Glucose 98 mg/dL", 0.6),
        ]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, BiomarkerValue::Single(95.0));
        assert!((matches[0].match_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn duplicate_tie_keeps_earliest_mention() {
        let (matches, _) = extract(&[
            ("Glucose 95 mg/dL", 0.8),
            ("Glucose 98 mg/dL", 0.8),
        ]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, BiomarkerValue::Single(95.0));
        assert_eq!(matches[0].source_block, 0);
    }

    #[test]
    fn glucose_mmol_converts_to_canonical_unit() {
        let (matches, warnings) = extract(&[("Glucose: 5.0 mmol/L", 0.9)]);
        assert!(warnings.is_empty());
        assert_eq!(matches.len(), 1);
        let v = matches[0].value.as_single().unwrap();
        assert!((v - 90.09).abs() < 0.01);
        assert_eq!(matches[0].unit, "mg/dL");
    }

    #[test]
    fn inconvertible_unit_discards_with_warning() {
        // No conversion from mmol/L exists for hemoglobin
        let (matches, warnings) = extract(&[("Hemoglobin 9.1 mmol/L", 0.9)]);
        assert!(matches.is_empty());
        assert_eq!(
            warnings,
            vec![ExtractionWarning::UnitMismatch {
                name: "hemoglobin".into()
            }]
        );
    }

    #[test]
    fn unit_before_value_converts() {
        // Test/Unit/Result column layout: unit printed ahead of the number
        let (matches, warnings) = extract(&[("Glucose mmol/L 5.0", 0.9)]);
        assert!(warnings.is_empty());
        assert_eq!(matches.len(), 1);
        let v = matches[0].value.as_single().unwrap();
        assert!((v - 90.09).abs() < 0.01);
        assert_eq!(matches[0].unit, "mg/dL");
        assert!((matches[0].match_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn unit_before_value_accepted_without_conversion() {
        let (matches, warnings) = extract(&[("Hemoglobin g/dL 14.2", 0.9)]);
        assert!(warnings.is_empty());
        assert_eq!(matches[0].value, BiomarkerValue::Single(14.2));
        assert!((matches[0].match_confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn inconvertible_unit_before_value_discards_with_warning() {
        let (matches, warnings) = extract(&[("Hemoglobin mmol/L 9.1", 0.9)]);
        assert!(matches.is_empty());
        assert_eq!(
            warnings,
            vec![ExtractionWarning::UnitMismatch {
                name: "hemoglobin".into()
            }]
        );
    }

    #[test]
    fn compound_unit_before_value_accepted() {
        let (matches, _) = extract(&[("BP mmHg 120/80", 0.8)]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].unit, "mmHg");
        assert!((matches[0].match_confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn value_in_next_block_gets_distant_factor() {
        let (matches, _) = extract(&[("Hemoglobin", 0.9), ("14.2 g/dL", 0.9)]);
        assert_eq!(matches.len(), 1);
        assert!((matches[0].match_confidence - 0.9 * factors::DISTANT).abs() < 1e-6);
        assert_eq!(matches[0].source_block, 0);
    }

    #[test]
    fn missing_unit_reduces_specificity() {
        let (matches, _) = extract(&[("Hematocrit: 42", 0.8)]);
        assert_eq!(matches.len(), 1);
        assert!((matches[0].match_confidence - 0.8 * factors::REDUCED).abs() < 1e-6);
    }

    #[test]
    fn fuzzy_alias_reduces_specificity() {
        // OCR dropped the final "n"
        let (matches, _) = extract(&[("Hemoglobi 14.2 g/dL", 1.0)]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "hemoglobin");
        assert!((matches[0].match_confidence - factors::REDUCED).abs() < 1e-6);
    }

    #[test]
    fn multiword_alias_matched_longest_first() {
        let (matches, _) = extract(&[("LDL Cholesterol 95 mg/dL, Total Cholesterol 180 mg/dL", 0.9)]);
        let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"ldl_cholesterol"));
        assert!(names.contains(&"cholesterol"));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn categorical_value_extracted_as_text() {
        let (matches, _) = extract(&[("Urine protein: negative", 0.9)]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "urine_protein");
        assert_eq!(matches[0].value, BiomarkerValue::Text("negative".into()));
    }

    #[test]
    fn prose_after_value_is_not_a_unit() {
        // "elevated" must not be treated as a mismatched unit
        let (matches, warnings) = extract(&[("Hematocrit: 48 elevated", 0.9)]);
        assert_eq!(matches.len(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn empty_document_yields_nothing() {
        let (matches, warnings) = extract(&[]);
        assert!(matches.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn decimal_comma_parses() {
        let (matches, _) = extract(&[("Hemoglobin 14,2 g/dL", 0.9)]);
        assert_eq!(matches[0].value, BiomarkerValue::Single(14.2));
    }
}
