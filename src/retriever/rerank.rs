//! Multi-signal re-ranking (§4.6.3) — the heart of the retriever. Eight
//! sub-scores feed a hierarchical tier assignment so an earlier rule can
//! never be overtaken by a later one through bonus accumulation alone.

use super::candidates::Candidate;
use super::dedup::jaccard;
use super::query_analysis::QueryAnalysis;
use crate::enrich::tokenizer::tokenize_identifier;
use crate::model::Tier;
use std::collections::{HashMap, HashSet};

const CODE_MARKERS: &[&str] =
    &["fn", "function", "class", "def", "pub", "public", "private", "static", "return", "struct", "impl"];

#[derive(Debug, Clone, Default)]
pub struct SubScores {
    pub exact: f32,
    pub phrase: f32,
    pub lexical: f32,
    pub semantic: f32,
    pub context: f32,
    pub metadata: f32,
    pub length: f32,
    pub position: f32,
}

impl SubScores {
    pub fn as_map(&self) -> HashMap<String, f32> {
        [
            ("exact".to_string(), self.exact),
            ("phrase".to_string(), self.phrase),
            ("lexical".to_string(), self.lexical),
            ("semantic".to_string(), self.semantic),
            ("context".to_string(), self.context),
            ("metadata".to_string(), self.metadata),
            ("length".to_string(), self.length),
            ("position".to_string(), self.position),
        ]
        .into_iter()
        .collect()
    }
}

pub fn compute_sub_scores(analysis: &QueryAnalysis, candidate: &Candidate) -> SubScores {
    let query_tokens: HashSet<String> = tokenize_identifier(&analysis.original).into_iter().collect();
    SubScores {
        exact: exact_score(&analysis.key_terms, &candidate.text, &candidate.metadata),
        phrase: phrase_score(&analysis.original, &candidate.text),
        lexical: lexical_score(&query_tokens, &candidate.text),
        semantic: candidate.vector_score.clamp(0.0, 1.0),
        context: context_score(analysis, candidate),
        metadata: metadata_score(analysis, candidate),
        length: length_score(&candidate.text),
        position: position_score(candidate.start_line),
    }
}

fn whole_word_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn exact_score(key_terms: &[String], text: &str, metadata: &HashMap<String, String>) -> f32 {
    if key_terms.is_empty() {
        return 0.0;
    }
    let text_tokens = whole_word_tokens(text);
    let meta_tokens: HashSet<String> = metadata.values().flat_map(|v| whole_word_tokens(v)).collect();
    let matched = key_terms.iter().filter(|t| text_tokens.contains(*t) || meta_tokens.contains(*t)).count();
    matched as f32 / key_terms.len() as f32
}

fn phrase_score(query: &str, text: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let trimmed = query_lower.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    if text_lower.contains(trimmed) {
        return 1.0;
    }
    let query_words: Vec<&str> = trimmed.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let text_words: Vec<&str> = text_lower.split_whitespace().collect();
    let mut best = 0usize;
    for start in 0..query_words.len() {
        for len in (1..=(query_words.len() - start)).rev() {
            let window = &query_words[start..start + len];
            if text_words.windows(window.len()).any(|w| w == window) {
                best = best.max(len);
                break;
            }
        }
    }
    best as f32 / query_words.len() as f32
}

fn lexical_score(query_tokens: &HashSet<String>, text: &str) -> f32 {
    let text_tokens: HashSet<String> = tokenize_identifier(text).into_iter().collect();
    jaccard(query_tokens, &text_tokens)
}

fn is_code_related(lower: &str) -> bool {
    CODE_MARKERS.iter().any(|m| lower.split(|c: char| !c.is_alphanumeric() && c != '_').any(|w| w == *m))
}

/// Tightest-first proximity window: within 3 tokens is worth more than
/// within 10, which is worth more than within 20.
fn proximity_bonus(key_terms: &[String], text_lower: &str) -> f32 {
    if key_terms.len() < 2 {
        return 0.0;
    }
    let words: Vec<&str> = text_lower.split_whitespace().collect();
    let positions: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, w)| key_terms.iter().any(|t| w.contains(t.as_str())))
        .map(|(i, _)| i)
        .collect();
    if positions.len() < 2 {
        return 0.0;
    }
    let mut min_gap = usize::MAX;
    for pair in positions.windows(2) {
        min_gap = min_gap.min(pair[1] - pair[0]);
    }
    if min_gap <= 3 {
        0.5
    } else if min_gap <= 10 {
        0.3
    } else if min_gap <= 20 {
        0.15
    } else {
        0.0
    }
}

fn context_score(analysis: &QueryAnalysis, candidate: &Candidate) -> f32 {
    let mut score = 0.0f32;
    let query_lower = analysis.original.to_lowercase();
    let trimmed = query_lower.trim();
    let text_lower = candidate.text.to_lowercase();
    if !trimmed.is_empty() && text_lower.contains(trimmed) {
        score += 0.5;
    }
    if is_code_related(&query_lower) && is_code_related(&text_lower) {
        score += 0.3;
    }
    score += proximity_bonus(&analysis.key_terms, &text_lower);
    if let Some(ext) = candidate.file_path.rsplit('.').next() {
        if analysis.preferred_file_types.iter().any(|t| t == ext) {
            score += 0.2;
        }
    }
    score.min(1.0)
}

fn metadata_score(analysis: &QueryAnalysis, candidate: &Candidate) -> f32 {
    let mut score = 0.0f32;
    let file_path_lower = candidate.file_path.to_lowercase();
    for term in &analysis.key_terms {
        if file_path_lower.contains(term.as_str()) {
            score += 0.3;
        }
    }
    if let Some(ext) = candidate.file_path.rsplit('.').next() {
        if analysis.key_terms.iter().any(|t| t == &ext.to_lowercase()) {
            score += 0.2;
        }
    }
    score.min(1.0)
}

fn length_score(text: &str) -> f32 {
    let len = text.chars().count();
    if len < 50 {
        0.3
    } else if len < 200 {
        0.7
    } else if len < 1000 {
        1.0
    } else if len < 3000 {
        0.8
    } else {
        0.5
    }
}

fn position_score(start_line: u32) -> f32 {
    if start_line <= 10 {
        1.0
    } else if start_line <= 50 {
        0.8
    } else if start_line <= 100 {
        0.6
    } else {
        0.4
    }
}

/// §4.6.3's hierarchical interval design: tiers occupy disjoint base-score
/// ranges so no amount of bonus accumulation lets a later rule's candidate
/// outrank an earlier rule's.
pub fn score_and_tier(sub: &SubScores) -> (f32, Tier) {
    let (base, tier) = if sub.exact > 0.7 {
        (90.0 + sub.exact * 8.0 + sub.phrase * 1.5 + sub.context * 0.5, Tier::ExactMatch)
    } else if sub.exact > 0.4 {
        (70.0 + sub.exact * 15.0 + sub.phrase * 3.0 + sub.context * 1.0, Tier::KeywordMatch)
    } else if sub.phrase > 0.5 {
        (50.0 + sub.phrase * 15.0 + sub.exact * 2.0 + sub.lexical * 2.0, Tier::PhraseMatch)
    } else if sub.lexical > 0.4 {
        (30.0 + sub.lexical * 15.0 + sub.exact * 2.0 + sub.semantic * 2.0, Tier::LexicalMatch)
    } else if sub.semantic > 0.5 {
        (15.0 + sub.semantic * 12.0 + sub.context * 2.0 + sub.metadata * 1.0, Tier::SemanticMatch)
    } else {
        (sub.semantic * 10.0 + sub.context * 2.0 + sub.lexical * 1.5 + sub.metadata * 0.5, Tier::WeakMatch)
    };
    let total = base + sub.length * 2.0 + sub.position * 1.5 + sub.metadata * 3.0;
    (total.clamp(0.0, 100.0), tier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::query_analysis::analyze;
    use std::collections::HashMap;

    fn candidate(text: &str, file_path: &str, start_line: u32, vector_score: f32) -> Candidate {
        Candidate {
            id: "c1".to_string(),
            text: text.to_string(),
            file_path: file_path.to_string(),
            kind: None,
            start_line,
            vector_score,
            keyword_score: 0.0,
            metadata: HashMap::new(),
            provisional: 0.0,
        }
    }

    #[test]
    fn verbatim_query_match_scores_high_exact() {
        let analysis = analyze("parseConfig");
        let cand = candidate("fn parseConfig(path: &str) -> Config { todo!() }", "config.rs", 5, 0.2);
        let sub = compute_sub_scores(&analysis, &cand);
        assert!(sub.exact > 0.9);
        let (score, tier) = score_and_tier(&sub);
        assert_eq!(tier, Tier::ExactMatch);
        assert!(score > 90.0);
    }

    #[test]
    fn unrelated_text_scores_into_weak_tier() {
        let analysis = analyze("parseConfig");
        let cand = candidate("struct Unrelated { value: u32 }", "other.rs", 400, 0.0);
        let sub = compute_sub_scores(&analysis, &cand);
        let (_, tier) = score_and_tier(&sub);
        assert_eq!(tier, Tier::WeakMatch);
    }

    #[test]
    fn tiers_are_strictly_ordered_by_base_range() {
        assert!(Tier::ExactMatch > Tier::KeywordMatch);
        assert!(Tier::KeywordMatch > Tier::PhraseMatch);
        assert!(Tier::PhraseMatch > Tier::LexicalMatch);
        assert!(Tier::LexicalMatch > Tier::SemanticMatch);
        assert!(Tier::SemanticMatch > Tier::WeakMatch);
    }

    #[test]
    fn high_semantic_score_alone_cannot_reach_exact_tier() {
        let analysis = analyze("totally unrelated query text");
        let cand = candidate("fn something_else() {}", "a.rs", 1, 1.0);
        let sub = compute_sub_scores(&analysis, &cand);
        let (score, tier) = score_and_tier(&sub);
        assert_ne!(tier, Tier::ExactMatch);
        assert!(score < 90.0);
    }
}
