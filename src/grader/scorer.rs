//! Answer scoring rules.
//!
//! Mirrors the common exact-match grading scheme for short-answer QA
//! benchmarks:
//!
//! - numeric ground truth: parse the prediction after stripping `$`, `%`
//!   and `,`, then compare exactly
//! - list ground truth (contains `,` or `;`): split both sides, compare
//!   element-wise with the numeric rule per element where it applies
//! - anything else: compare normalized strings (lowercase, no articles,
//!   no punctuation, no whitespace)

use regex::Regex;

/// Decide whether a prediction matches the ground truth.
pub fn question_scorer(prediction: &str, ground_truth: &str) -> bool {
    if let Some(truth_number) = parse_float(ground_truth) {
        return numbers_match(prediction, truth_number);
    }

    if ground_truth.contains(',') || ground_truth.contains(';') {
        return lists_match(prediction, ground_truth);
    }

    normalize_str(prediction, true) == normalize_str(ground_truth, true)
}

/// Compare list answers element-wise. Element counts must agree.
fn lists_match(prediction: &str, ground_truth: &str) -> bool {
    let truth_elems = split_string(ground_truth);
    let pred_elems = split_string(prediction);

    if truth_elems.len() != pred_elems.len() {
        return false;
    }

    truth_elems
        .iter()
        .zip(&pred_elems)
        .all(|(truth, pred)| match parse_float(truth) {
            Some(truth_number) => numbers_match(pred, truth_number),
            // List elements keep their punctuation; only case and
            // whitespace are ignored.
            None => normalize_str(pred, false) == normalize_str(truth, false),
        })
}

/// Exact float comparison, matching the reference grading behavior.
#[allow(clippy::float_cmp)]
fn numbers_match(prediction: &str, truth: f64) -> bool {
    normalize_number_str(prediction) == truth
}

/// Parse a float the permissive way: whitespace-trimmed, `.5`, `1e3` and
/// friends all count.
fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Numeric value of a prediction: strip `$`, `%` and `,`, then parse.
/// Unparseable predictions become infinity so they compare unequal to any
/// real ground truth.
fn normalize_number_str(number_str: &str) -> f64 {
    let cleaned: String = number_str
        .chars()
        .filter(|c| !matches!(c, '$' | '%' | ','))
        .collect();
    cleaned.trim().parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Split a list answer on `,` and `;`.
fn split_string(s: &str) -> Vec<String> {
    s.split([',', ';']).map(|part| part.to_string()).collect()
}

/// Normalize a string answer for comparison.
///
/// Lowercases and removes all whitespace. With `remove_punct`, English
/// articles and ASCII punctuation go too.
fn normalize_str(input: &str, remove_punct: bool) -> String {
    let lowered = input.to_lowercase();

    let without_articles = if remove_punct {
        match Regex::new(r"\b(a|an|the)\b") {
            Ok(re) => re.replace_all(&lowered, " ").into_owned(),
            Err(_) => lowered,
        }
    } else {
        lowered
    };

    without_articles
        .chars()
        .filter(|c| !c.is_whitespace() && !(remove_punct && c.is_ascii_punctuation()))
        .collect()
}
