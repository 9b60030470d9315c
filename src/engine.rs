//! The single consolidated entry point: owns the Coordinator and the
//! Retriever, wires them from one [`CoreConfig`], and is the only public
//! surface production callers need (§9: "one `Engine` struct... no parallel
//! legacy service type").

use crate::config::CoreConfig;
use crate::coordinator::{IndexAllOutcome, IndexingCoordinator, ProgressCallback, StatusSnapshot, SymbolSource};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::model::{EdgeKind, SearchResult};
use crate::name_index::{NameIndex, SearchFilter};
use crate::retriever::HybridRetriever;
use crate::semantic_index::embed::EmbeddingModel;
use crate::semantic_index::SemanticIndex;
use crate::structural_index::StructuralIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub struct Engine {
    coordinator: Arc<IndexingCoordinator>,
    retriever: HybridRetriever,
    root: Option<PathBuf>,
    config: CoreConfig,
}

impl Engine {
    /// `root` is the persistence directory for disk-backed variants; ignored
    /// when `config.use_disk_storage` is false. A failed disk-backed open
    /// falls back transparently to the in-memory variant (§4.5/§4.7).
    pub fn new(
        config: CoreConfig,
        root: Option<PathBuf>,
        embedding_model: Box<dyn EmbeddingModel>,
        symbol_source: Box<dyn SymbolSource>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Result<Self> {
        let dimensions = embedding_model.dimensions();

        let name_index = match (&root, config.use_disk_storage) {
            (Some(root), true) => match NameIndex::open_or_create(root.join("name")) {
                Ok(idx) => idx,
                Err(e) => {
                    warn!(error = %e, "disk-backed name index unavailable, falling back to in-memory");
                    NameIndex::create_in_ram()?
                }
            },
            _ => NameIndex::create_in_ram()?,
        };

        let semantic_index = match (&root, config.use_disk_storage) {
            (Some(root), true) if root.join("semantic").exists() => match SemanticIndex::load(root, dimensions) {
                Ok(idx) => idx,
                Err(e) => {
                    warn!(error = %e, "disk-backed semantic index unavailable, falling back to in-memory");
                    SemanticIndex::new(dimensions)
                }
            },
            _ => SemanticIndex::new(dimensions),
        };

        let structural_index = match (&root, config.use_disk_storage) {
            (Some(root), true) => match StructuralIndex::load(root) {
                Ok(idx) => idx,
                Err(e) => {
                    warn!(error = %e, "disk-backed structural index unavailable, falling back to in-memory");
                    StructuralIndex::new()
                }
            },
            _ => StructuralIndex::new(),
        };

        let coordinator = Arc::new(IndexingCoordinator::new(
            name_index,
            semantic_index,
            structural_index,
            embedding_model,
            symbol_source,
            config.worker_threads,
        ));

        if let Some(root) = &root {
            coordinator.load_file_records(root);
        }

        let retriever = HybridRetriever::new(coordinator.clone(), llm);

        Ok(Self {
            coordinator,
            retriever,
            root,
            config,
        })
    }

    pub async fn index_all(&self, root: &Path, force: bool, progress: Option<ProgressCallback>) -> IndexAllOutcome {
        self.coordinator.index_all(root, force, progress).await
    }

    pub fn index_file(&self, path: &Path, force: bool) -> bool {
        self.coordinator.index_file(path, force)
    }

    pub fn drop_file(&self, path: &Path) {
        self.coordinator.drop_file(path)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.coordinator.status()
    }

    pub fn cancel(&self) {
        self.coordinator.cancel()
    }

    pub fn clear(&self) {
        self.coordinator.clear()
    }

    pub async fn search(&self, query: &str, top_k: usize, filter: Option<SearchFilter>) -> Result<Vec<SearchResult>> {
        self.retriever.search(query, top_k, filter).await
    }

    pub fn search_fast(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.search_fast(query, top_k)
    }

    pub async fn search_code_only(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        self.retriever.search_code_only(query, top_k).await
    }

    pub fn related(&self, id: &str, edge_kinds: &[EdgeKind], top_k: usize) -> Vec<SearchResult> {
        self.retriever.related(id, edge_kinds, top_k)
    }

    /// Commits the Name index and flushes Semantic/Structural snapshots plus
    /// the file-record map to `root`; a no-op when no persistence root was
    /// configured. Called on the scheduled persistence tick and on dispose.
    pub fn save(&self) -> Result<()> {
        self.coordinator.name_index().commit()?;
        if let Some(root) = &self.root {
            self.coordinator
                .semantic_index()
                .lock()
                .expect("semantic index lock poisoned")
                .save(root)?;
            self.coordinator
                .structural_index()
                .save(root)
                .map_err(|e| crate::error::CoreError::Coordinator(crate::error::CoordinatorError::Io(e)))?;
            self.coordinator
                .save_file_records(root)
                .map_err(|e| crate::error::CoreError::Coordinator(crate::error::CoordinatorError::Io(e)))?;
        }
        Ok(())
    }

    /// Runs until the process drops it (intended to be spawned as a
    /// background task); ticks every `auto_persist_interval_minutes` and
    /// saves. A failed tick is logged and retried next cycle (§4.5).
    pub async fn run_auto_persist_loop(self: Arc<Self>) {
        if !self.config.auto_persist {
            return;
        }
        let period = std::time::Duration::from_secs(self.config.auto_persist_interval_minutes.max(1) * 60);
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = self.save() {
                warn!(error = %e, "scheduled persistence tick failed, will retry next interval");
            }
        }
    }

    /// Final save on shutdown (§4.5: "commit... on dispose").
    pub fn dispose(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "persistence on dispose failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::RustSource;
    use crate::llm::LlmClient;
    use crate::semantic_index::embed::HashEmbeddingModel;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct NeverLlm;

    #[async_trait]
    impl LlmClient for NeverLlm {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("no llm configured in this test")
        }
    }

    fn build_engine() -> Engine {
        Engine::new(
            CoreConfig::default(),
            None,
            Box::new(HashEmbeddingModel::new(32)),
            Box::new(RustSource::new()),
            None,
        )
        .expect("engine construction should not fail for in-memory config")
    }

    #[tokio::test]
    async fn index_then_search_round_trip() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("widget.rs");
        std::fs::write(&file, "pub fn render_widget(id: u32) -> String { id.to_string() }").unwrap();

        let engine = build_engine();
        assert!(engine.index_file(&file, false));

        let results = engine.search("render_widget", 5, None).await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].content.contains("render_widget"));
    }

    #[tokio::test]
    async fn search_fast_does_not_require_async_query_analysis() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("widget.rs");
        std::fs::write(&file, "pub fn render_widget(id: u32) -> String { id.to_string() }").unwrap();

        let engine = build_engine();
        engine.index_file(&file, false);
        let results = engine.search_fast("render_widget", 5).unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn status_reports_zero_before_any_indexing() {
        let engine = build_engine();
        let status = engine.status();
        assert_eq!(status.files_indexed, 0);
    }

    #[tokio::test]
    async fn search_with_a_failing_llm_falls_back_to_rule_based_keywords() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("widget.rs");
        std::fs::write(&file, "pub fn render_widget(id: u32) -> String { id.to_string() }").unwrap();

        let engine = Engine::new(
            CoreConfig::default(),
            None,
            Box::new(HashEmbeddingModel::new(32)),
            Box::new(RustSource::new()),
            Some(Arc::new(NeverLlm)),
        )
        .unwrap();
        engine.index_file(&file, false);

        let results = engine.search("render_widget", 5, None).await.unwrap();
        assert!(!results.is_empty());
    }
}
