//! Text cleanup between OCR output and biomarker extraction.
//!
//! Two passes: strip characters that cannot appear in a lab report, then fix
//! common OCR misreads of lab vocabulary via dictionary lookup. Correction is
//! conservative: edit distance <= 2, word length >= 5, unique best match only.

/// Lab vocabulary for post-OCR correction.
/// Sorted for binary search. Must be lowercase.
const LAB_TERMS: &[&str] = &[
    "albumin",
    "bilirubin",
    "cholesterol",
    "creatinine",
    "diastolic",
    "erythrocytes",
    "glucose",
    "hematocrit",
    "hemoglobin",
    "leukocytes",
    "lipoprotein",
    "negative",
    "platelets",
    "positive",
    "pressure",
    "protein",
    "systolic",
    "thrombocytes",
    "triglycerides",
];

/// Strip control characters and noise, normalize whitespace, keep the
/// punctuation lab values depend on (decimal points, slashes, ranges,
/// percent and micro signs).
pub fn sanitize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '+'
                        | '<'
                        | '>'
                        | '%'
                        | '='
                        | '\''
                        | 'µ'
                        | 'μ'
                        | '°'
                )
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Apply dictionary correction to every word of a block.
pub fn correct_lab_terms(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut word = String::new();

    for ch in text.chars() {
        if ch.is_alphabetic() {
            word.push(ch);
        } else {
            flush_word(&mut result, &mut word);
            result.push(ch);
        }
    }
    flush_word(&mut result, &mut word);
    result
}

fn flush_word(result: &mut String, word: &mut String) {
    if word.is_empty() {
        return;
    }
    match correct_word(word) {
        Some(corrected) => result.push_str(&corrected),
        None => result.push_str(word),
    }
    word.clear();
}

/// Words shorter than this are never corrected; abbreviations like "alt"
/// and "hb" are too close to everything.
const MIN_CORRECTION_LEN: usize = 5;
const MAX_CORRECTION_DISTANCE: u32 = 2;

/// `None` means leave the word as written: already a known term, too
/// short, no dictionary entry close enough, or two entries equally close.
fn correct_word(word: &str) -> Option<String> {
    if word.chars().count() < MIN_CORRECTION_LEN {
        return None;
    }

    let lower = word.to_lowercase();
    if LAB_TERMS.binary_search(&lower.as_str()).is_ok() {
        return None;
    }

    let mut best: Option<(u32, &str)> = None;
    let mut tied = false;

    for &term in LAB_TERMS {
        if lower.len().abs_diff(term.len()) as u32 > MAX_CORRECTION_DISTANCE {
            continue;
        }
        let dist = edit_distance(&lower, term);
        if dist > MAX_CORRECTION_DISTANCE {
            continue;
        }
        match best {
            Some((d, _)) if dist > d => {}
            Some((d, _)) if dist == d => tied = true,
            _ => {
                best = Some((dist, term));
                tied = false;
            }
        }
    }

    match best {
        Some((_, term)) if !tied => Some(recase(term, word)),
        _ => None,
    }
}

/// Carry the source word's capitalization onto the corrected term.
fn recase(term: &str, like: &str) -> String {
    if like.chars().all(|c| !c.is_lowercase()) {
        return term.to_uppercase();
    }

    match (like.chars().next(), term.chars().next()) {
        (Some(first), Some(t)) if first.is_uppercase() => {
            t.to_uppercase().chain(term.chars().skip(1)).collect()
        }
        _ => term.to_string(),
    }
}

/// Levenshtein edit distance over chars, single rolling row.
pub(crate) fn edit_distance(a: &str, b: &str) -> u32 {
    let b_chars: Vec<char> = b.chars().collect();
    let mut row: Vec<u32> = (0..=b_chars.len() as u32).collect();

    for (i, a_ch) in a.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i as u32 + 1;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let substitution = diag + u32::from(a_ch != b_ch);
            diag = row[j + 1];
            row[j + 1] = substitution.min(diag + 1).min(row[j] + 1);
        }
    }

    row[b_chars.len()]
}
