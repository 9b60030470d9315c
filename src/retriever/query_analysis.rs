//! Query analysis (§4.6.1): turns a raw query string into a `QueryAnalysis`
//! the rest of the retriever scores candidates against.

use crate::enrich::tokenizer::tokenize_identifier;
use crate::llm::{complete_with_timeout, LlmClient};
use std::collections::HashSet;
use std::time::Duration;

const CONCEPTUAL_MARKERS: &[&str] = &["similar", "like", "related", "concept"];
const ENTITY_KEYWORDS: &[&str] = &["class", "method", "function", "interface", "enum", "constructor"];
const MAX_FALLBACK_KEYWORDS: usize = 15;
const LLM_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    ExactMatch,
    Conceptual,
    Mixed,
}

#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub original: String,
    pub intent: QueryIntent,
    pub preferred_file_types: Vec<String>,
    pub entity_types: Vec<String>,
    pub key_terms: Vec<String>,
}

/// Rule-based analysis only; no LLM call.
pub fn analyze(query: &str) -> QueryAnalysis {
    QueryAnalysis {
        original: query.to_string(),
        intent: classify_intent(query),
        preferred_file_types: extract_file_types(query),
        entity_types: extract_entity_types(query),
        key_terms: extract_key_terms(query),
    }
}

/// Analysis with optional LLM-assisted keyword extraction (§4.6.1). Falls
/// back to the rule-based extractor, capped at 15 keywords, on any error or
/// timeout.
pub async fn analyze_with_llm(query: &str, llm: Option<&dyn LlmClient>) -> QueryAnalysis {
    let mut analysis = analyze(query);
    let Some(client) = llm else {
        return analysis;
    };
    let prompt = format!("List the most important search keywords in this code-search query, comma separated, nothing else:\n{query}");
    let extracted = match complete_with_timeout(client, &prompt, LLM_TIMEOUT).await {
        Some(text) => text
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };
    analysis.key_terms = if extracted.is_empty() { fallback_keywords(query) } else { extracted };
    analysis
}

fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    if query.contains('"') || lower.contains("exact") {
        QueryIntent::ExactMatch
    } else if CONCEPTUAL_MARKERS.iter().any(|m| lower.contains(m)) {
        QueryIntent::Conceptual
    } else {
        QueryIntent::Mixed
    }
}

fn extract_file_types(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    for word in query.split_whitespace() {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '.');
        if let Some(ext) = trimmed.strip_prefix('.') {
            if !ext.is_empty() && ext.chars().all(|c| c.is_alphanumeric()) {
                out.push(ext.to_lowercase());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn extract_entity_types(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    ENTITY_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).map(|kw| kw.to_string()).collect()
}

fn extract_key_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokenize_identifier(query) {
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

/// Harvests identifier-shaped substrings and camelCase words, capped at 15
/// (§4.6.1's LLM-failure fallback).
pub fn fallback_keywords(query: &str) -> Vec<String> {
    let mut out = extract_key_terms(query);
    out.truncate(MAX_FALLBACK_KEYWORDS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_query_is_exact_match() {
        let analysis = analyze("\"renderWidget\"");
        assert_eq!(analysis.intent, QueryIntent::ExactMatch);
    }

    #[test]
    fn conceptual_marker_sets_conceptual_intent() {
        let analysis = analyze("functions similar to parseConfig");
        assert_eq!(analysis.intent, QueryIntent::Conceptual);
    }

    #[test]
    fn plain_query_is_mixed_intent() {
        let analysis = analyze("widget renderer");
        assert_eq!(analysis.intent, QueryIntent::Mixed);
    }

    #[test]
    fn file_extension_hint_is_extracted() {
        let analysis = analyze("parser logic in .rs files");
        assert_eq!(analysis.preferred_file_types, vec!["rs".to_string()]);
    }

    #[test]
    fn entity_type_keyword_is_detected() {
        let analysis = analyze("find the class that implements Widget");
        assert!(analysis.entity_types.contains(&"class".to_string()));
    }

    #[tokio::test]
    async fn llm_none_keeps_rule_based_key_terms() {
        let analysis = analyze_with_llm("renderWidgetTree", None).await;
        assert!(analysis.key_terms.contains(&"render".to_string()));
    }
}
