//! Broad candidate retrieval (§4.6.2): union the lexical and semantic
//! streams, score each candidate provisionally, and cap the pool that
//! survives into re-ranking.

use crate::model::SymbolKind;
use std::collections::HashMap;

/// Below this cosine score a semantic-only candidate (no keyword hit) is
/// dropped from the provisional pool; matches the semantic stream's own
/// `min_score`.
pub const VECTOR_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub file_path: String,
    pub kind: Option<SymbolKind>,
    pub start_line: u32,
    pub vector_score: f32,
    pub keyword_score: f32,
    pub metadata: HashMap<String, String>,
    pub provisional: f32,
}

/// §4.6.2's provisional hybrid scoring pseudocode.
pub fn provisional_score(has_keyword_match: bool, vector_score: f32, keyword_score: f32) -> f32 {
    if has_keyword_match {
        vector_score.max(0.8) + 0.3 * keyword_score
    } else if vector_score >= VECTOR_THRESHOLD {
        vector_score
    } else {
        0.0
    }
}

/// `5*top_k`, capped at 100.
pub fn candidate_cap(top_k: usize) -> usize {
    (5 * top_k.max(1)).min(100)
}

/// Tantivy's unbounded BM25-style score squashed into (0, 1) so it can feed
/// the same additive formulas as a cosine score.
pub fn normalize_lexical_score(raw: f32) -> f32 {
    if raw <= 0.0 {
        0.0
    } else {
        raw / (raw + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_floors_vector_score_at_point_eight() {
        let p = provisional_score(true, 0.1, 1.0);
        assert_eq!(p, 0.8 + 0.3);
    }

    #[test]
    fn no_keyword_match_below_threshold_is_zero() {
        assert_eq!(provisional_score(false, 0.1, 0.0), 0.0);
    }

    #[test]
    fn no_keyword_match_above_threshold_passes_through() {
        assert_eq!(provisional_score(false, 0.5, 0.0), 0.5);
    }

    #[test]
    fn cap_is_bounded_at_100() {
        assert_eq!(candidate_cap(1000), 100);
        assert_eq!(candidate_cap(4), 20);
    }
}
