//! Hybrid Retriever (§4.6): query analysis, dual candidate retrieval,
//! multi-tier re-ranking, contextual expansion, and deduplication, fused
//! on top of the three indices the Coordinator maintains.

pub mod candidates;
pub mod dedup;
pub mod expansion;
pub mod query_analysis;
pub mod rerank;

use crate::coordinator::IndexingCoordinator;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::model::{EdgeKind, SearchResult, SymbolKind, Tier, TierLabel};
use crate::name_index::SearchFilter;
use crate::semantic_index::embed::EmbeddingModel;
use candidates::{candidate_cap, normalize_lexical_score, provisional_score, Candidate};
use expansion::FileCache;
use query_analysis::analyze_with_llm;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Latency budget below which callers should prefer [`HybridRetriever::search_fast`] (§4.6.5).
pub const FAST_PATH_BUDGET_MS: u64 = 500;

pub struct HybridRetriever {
    coordinator: Arc<IndexingCoordinator>,
    llm: Option<Arc<dyn LlmClient>>,
    file_cache: FileCache,
}

impl HybridRetriever {
    pub fn new(coordinator: Arc<IndexingCoordinator>, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            coordinator,
            llm,
            file_cache: FileCache::default(),
        }
    }

    /// Full pipeline: §4.6.1-§4.6.4, §4.6.6.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, top_k: usize, filter: Option<SearchFilter>) -> Result<Vec<SearchResult>> {
        self.run(query, top_k, filter, false).await
    }

    /// Same pipeline, restricted to candidates that resolved to a known
    /// symbol kind (defensive against malformed metadata making it past the
    /// Coordinator).
    #[instrument(skip(self))]
    pub async fn search_code_only(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.run(query, top_k, None, true).await
    }

    async fn run(&self, query: &str, top_k: usize, filter: Option<SearchFilter>, code_only: bool) -> Result<Vec<SearchResult>> {
        let analysis = analyze_with_llm(query, self.llm.as_deref()).await;
        let mut pool = self.gather_candidates(query, top_k, filter.as_ref())?;
        if code_only {
            pool.retain(|_, c| c.kind.is_some());
        }

        let cap = candidate_cap(top_k);
        let mut ranked: Vec<Candidate> = pool.into_values().filter(|c| c.provisional > 0.0).collect();
        ranked.sort_by(|a, b| b.provisional.partial_cmp(&a.provisional).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(cap);

        let mut scored: Vec<(f32, Tier, Candidate, HashMap<String, f32>)> = ranked
            .into_iter()
            .map(|c| {
                let sub = rerank::compute_sub_scores(&analysis, &c);
                let (score, tier) = rerank::score_and_tier(&sub);
                (score, tier, c, sub.as_map())
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.2.id.cmp(&b.2.id)));

        let results: Vec<SearchResult> = scored
            .into_iter()
            .map(|(score, tier, candidate, sub_scores)| self.build_result(candidate, score, tier.into(), sub_scores))
            .collect();
        let mut deduped = dedup::dedup(results);
        deduped.truncate(top_k);
        Ok(deduped)
    }

    /// §4.6.5: skips query analysis, a single semantic pass, simple additive
    /// keyword boost capped at 0.3, no expansion.
    #[instrument(skip(self))]
    pub fn search_fast(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let embedding = {
            let mut model = self.coordinator.embedding_model().lock().expect("embedding model lock poisoned");
            model.embed(query).map_err(|e| crate::error::CoreError::EmbedFailure {
                id: "query".to_string(),
                reason: e.to_string(),
            })?
        };
        let hits = self
            .coordinator
            .semantic_index()
            .lock()
            .expect("semantic index lock poisoned")
            .search(&embedding, top_k.max(1), 0.3, None);

        let query_words: Vec<String> = query.split_whitespace().map(|w| w.to_lowercase()).collect();
        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| {
                let boost = keyword_boost(&query_words, &hit.text);
                let blended = (hit.cosine_score + boost).clamp(0.0, 1.0);
                let sub = rerank::SubScores {
                    semantic: blended,
                    ..Default::default()
                };
                let (score, tier) = rerank::score_and_tier(&sub);
                let candidate = Candidate {
                    id: hit.id,
                    text: hit.text,
                    file_path: hit.metadata.get("file_path").cloned().unwrap_or_default(),
                    kind: hit.metadata.get("kind").and_then(|k| SymbolKind::parse_str(k)),
                    start_line: hit.metadata.get("start_line").and_then(|s| s.parse().ok()).unwrap_or(1),
                    vector_score: hit.cosine_score,
                    keyword_score: boost,
                    metadata: hit.metadata,
                    provisional: blended,
                };
                self.build_result_minimal(candidate, score, tier.into())
            })
            .collect();
        results.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
        let mut deduped = dedup::dedup(results);
        deduped.truncate(top_k);
        Ok(deduped)
    }

    /// Graph-only lookup through the Structural index; no textual scoring.
    pub fn related(&self, id: &str, edge_kinds: &[EdgeKind], top_k: usize) -> Vec<SearchResult> {
        let neighbor_ids = self.coordinator.structural_index().neighbors(id, edge_kinds, 1);
        let semantic = self.coordinator.semantic_index().lock().expect("semantic index lock poisoned");
        neighbor_ids
            .into_iter()
            .take(top_k)
            .filter_map(|neighbor_id| {
                let (text, metadata) = semantic.get(&neighbor_id)?;
                Some(SearchResult {
                    id: neighbor_id,
                    content: text.to_string(),
                    file_path: metadata.get("file_path").cloned().unwrap_or_default(),
                    line: metadata.get("start_line").and_then(|s| s.parse().ok()).unwrap_or(1),
                    final_score: 100.0,
                    tier: TierLabel::ExactMatch,
                    sub_scores: HashMap::new(),
                    window_context: None,
                    parent_context: None,
                    contextualized_content: None,
                })
            })
            .collect()
    }

    fn gather_candidates(&self, query: &str, top_k: usize, filter: Option<&SearchFilter>) -> Result<HashMap<String, Candidate>> {
        let fetch = 3 * top_k.max(1);
        let owned_filter = filter.cloned().unwrap_or_default();
        let lexical_hits = self.coordinator.name_index().search(query, &owned_filter, fetch)?;

        let embedding = {
            let mut model = self.coordinator.embedding_model().lock().expect("embedding model lock poisoned");
            model.embed(query).map_err(|e| crate::error::CoreError::EmbedFailure {
                id: "query".to_string(),
                reason: e.to_string(),
            })?
        };
        let semantic_hits = {
            let semantic = self.coordinator.semantic_index().lock().expect("semantic index lock poisoned");
            semantic.search(&embedding, fetch, 0.3, None)
        };

        let semantic = self.coordinator.semantic_index().lock().expect("semantic index lock poisoned");
        let mut pool: HashMap<String, Candidate> = HashMap::new();

        for hit in lexical_hits {
            let keyword_score = normalize_lexical_score(hit.lexical_score);
            let (text, metadata) = match semantic.get(&hit.id) {
                Some((text, metadata)) => (text.to_string(), metadata.clone()),
                None => continue,
            };
            let candidate = self.make_candidate(hit.id, text, metadata, 0.0, keyword_score);
            pool.insert(candidate.id.clone(), candidate);
        }

        for hit in semantic_hits {
            pool.entry(hit.id.clone())
                .and_modify(|c| c.vector_score = hit.cosine_score)
                .or_insert_with(|| self.make_candidate(hit.id.clone(), hit.text.clone(), hit.metadata.clone(), hit.cosine_score, 0.0));
        }

        for candidate in pool.values_mut() {
            let has_keyword_match = candidate.keyword_score > 0.0;
            candidate.provisional = provisional_score(has_keyword_match, candidate.vector_score, candidate.keyword_score);
        }
        Ok(pool)
    }

    fn make_candidate(&self, id: String, text: String, metadata: HashMap<String, String>, vector_score: f32, keyword_score: f32) -> Candidate {
        let file_path = metadata.get("file_path").cloned().unwrap_or_default();
        let start_line = metadata.get("start_line").and_then(|s| s.parse().ok()).unwrap_or(1);
        let kind = metadata.get("kind").and_then(|k| SymbolKind::parse_str(k));
        Candidate {
            id,
            text,
            file_path,
            kind,
            start_line,
            vector_score,
            keyword_score,
            metadata,
            provisional: 0.0,
        }
    }

    fn build_result(&self, candidate: Candidate, score: f32, tier: TierLabel, sub_scores: HashMap<String, f32>) -> SearchResult {
        let end_line = candidate.metadata.get("end_line").and_then(|s| s.parse().ok()).unwrap_or(candidate.start_line);
        let kind_label = candidate.kind.map(|k| k.as_str()).unwrap_or("symbol");

        let file_contents = self.file_cache.read(&candidate.file_path).ok();
        let window_context = file_contents
            .as_deref()
            .and_then(|contents| expansion::default_sentence_window(contents, &candidate.text));
        let parent_context = file_contents
            .as_deref()
            .and_then(|contents| expansion::parent_document(contents, candidate.start_line, end_line));
        let preceding = file_contents.as_deref().and_then(|contents| expansion::preceding_lines(contents, candidate.start_line));
        let contextualized_content = Some(expansion::contextualized_content(
            &candidate.file_path,
            kind_label,
            candidate.start_line,
            end_line,
            preceding.as_deref(),
            &candidate.text,
        ));

        SearchResult {
            id: candidate.id,
            content: candidate.text,
            file_path: candidate.file_path,
            line: candidate.start_line,
            final_score: score,
            tier,
            sub_scores,
            window_context,
            parent_context,
            contextualized_content,
        }
    }

    fn build_result_minimal(&self, candidate: Candidate, score: f32, tier: TierLabel) -> SearchResult {
        SearchResult {
            id: candidate.id,
            content: candidate.text,
            file_path: candidate.file_path,
            line: candidate.start_line,
            final_score: score,
            tier,
            sub_scores: HashMap::new(),
            window_context: None,
            parent_context: None,
            contextualized_content: None,
        }
    }
}

/// Additive keyword boost for the fast path (§4.6.5), capped at 0.3 total.
fn keyword_boost(query_words: &[String], text: &str) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let hits = query_words.iter().filter(|w| text_lower.contains(w.as_str())).count();
    (hits as f32 / query_words.len() as f32 * 0.3).min(0.3)
}
