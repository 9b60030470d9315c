//! Result deduplication (§4.6.6): drop any result whose content is a near-
//! duplicate (Jaccard > 0.85) of an earlier-ranked result.

use crate::model::SearchResult;
use std::collections::HashSet;

const DEDUP_THRESHOLD: f32 = 0.85;

pub fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Results are assumed already sorted best-first; ties go to whichever
/// appears earlier.
pub fn dedup(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = Vec::with_capacity(results.len());
    let mut kept_tokens: Vec<HashSet<String>> = Vec::with_capacity(results.len());
    for result in results {
        let tokens = word_set(&result.content);
        let is_dup = kept_tokens.iter().any(|existing| jaccard(existing, &tokens) > DEDUP_THRESHOLD);
        if !is_dup {
            kept_tokens.push(tokens);
            kept.push(result);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TierLabel;
    use std::collections::HashMap;

    fn result(id: &str, content: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            content: content.to_string(),
            file_path: "f.rs".to_string(),
            line: 1,
            final_score: 0.0,
            tier: TierLabel::WeakMatch,
            sub_scores: HashMap::new(),
            window_context: None,
            parent_context: None,
            contextualized_content: None,
        }
    }

    #[test]
    fn near_identical_content_is_dropped() {
        let a = result("a", "fn widget_handler(req: Request) -> Response { todo!() }");
        let b = result("b", "fn widget_handler(req: Request) -> Response { todo!() } ");
        let out = dedup(vec![a, b]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }

    #[test]
    fn distinct_content_is_kept() {
        let a = result("a", "fn alpha() {}");
        let b = result("b", "struct Beta { value: u32 }");
        let out = dedup(vec![a, b]);
        assert_eq!(out.len(), 2);
    }
}
