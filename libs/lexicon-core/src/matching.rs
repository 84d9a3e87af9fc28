//! Answer matching for typed spelling quizzes.

use crate::types::MatchingMode;
use serde::{Deserialize, Serialize};

/// Result of comparing a typed answer to the target word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Whether the answer is accepted.
    pub is_correct: bool,
    /// Similarity between 0.0 and 1.0.
    pub similarity: f64,
    pub matching_mode: MatchingMode,
    /// Typed answer with whitespace collapsed (for display).
    pub typed_normalized: String,
    /// Target with whitespace collapsed (for display).
    pub target_normalized: String,
}

/// Compare a typed answer to the target word.
pub fn check_answer(typed: &str, target: &str, mode: MatchingMode, fuzzy_threshold: f64) -> MatchResult {
    let typed_normalized = normalize_whitespace(typed);
    let target_normalized = normalize_whitespace(target);

    let similarity = match mode {
        MatchingMode::Exact => exact(typed_normalized == target_normalized),
        MatchingMode::CaseInsensitive => {
            exact(typed_normalized.to_lowercase() == target_normalized.to_lowercase())
        }
        MatchingMode::Fuzzy => normalized_similarity(
            &typed_normalized.to_lowercase(),
            &target_normalized.to_lowercase(),
        ),
    };

    let is_correct = match mode {
        MatchingMode::Fuzzy => similarity >= fuzzy_threshold,
        _ => similarity == 1.0,
    };

    MatchResult {
        is_correct,
        similarity,
        matching_mode: mode,
        typed_normalized,
        target_normalized,
    }
}

fn exact(equal: bool) -> f64 {
    if equal {
        1.0
    } else {
        0.0
    }
}

/// Trim and collapse runs of whitespace.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein distance counted in chars, so accented letters weigh one edit.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Similarity in [0.0, 1.0] derived from Levenshtein distance.
pub fn normalized_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(a, b) as f64 / max_len as f64)
}
