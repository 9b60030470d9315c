//! Indexing Coordinator: the transactional boundary between the upstream
//! parser and the three indices. Owns the `FileRecord` map exclusively and
//! drives per-file indexing atomically across Name, Semantic, and
//! Structural.

pub mod file_record;

use crate::enrich::Enricher;
use crate::model::{CodeSymbol, ElementStructure, FileRecord, IndexEntry, Relationship, VectorEntry};
use crate::name_index::NameIndex;
use crate::semantic_index::embed::EmbeddingModel;
use crate::semantic_index::SemanticIndex;
use crate::structural_index::StructuralIndex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument, warn};

use futures::future::{BoxFuture, FutureExt, Shared};

/// A parsed-symbol producer for one source file. The core never reparses
/// source itself (§6); this is the seam an upstream language parser plugs
/// into. `supported_extensions` lets `index_all` skip files no configured
/// source understands.
pub trait SymbolSource: Send + Sync {
    fn supported_extensions(&self) -> &[&'static str];
    fn extract(&self, path: &Path, contents: &str) -> (Vec<CodeSymbol>, Vec<Relationship>);
}

/// `(files_total, files_done, current_path)`, suspension-cancellable at file
/// boundaries via `IndexingCoordinator::cancel`.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &Path) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct IndexAllOutcome {
    pub files_indexed: u64,
    pub files_failed: u64,
    pub symbols_indexed: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    pub is_indexing: bool,
    pub files_indexed: u64,
    pub symbols_indexed: u64,
    pub files_failed: u64,
    pub symbols_failed: u64,
}

#[derive(Default)]
struct Counters {
    is_indexing: AtomicBool,
    files_indexed: AtomicU64,
    symbols_indexed: AtomicU64,
    files_failed: AtomicU64,
    symbols_failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_indexing: self.is_indexing.load(Ordering::SeqCst),
            files_indexed: self.files_indexed.load(Ordering::SeqCst),
            symbols_indexed: self.symbols_indexed.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            symbols_failed: self.symbols_failed.load(Ordering::SeqCst),
        }
    }
}

type IndexAllFuture = Shared<BoxFuture<'static, IndexAllOutcome>>;

pub struct IndexingCoordinator {
    name_index: NameIndex,
    semantic_index: Mutex<SemanticIndex>,
    structural_index: StructuralIndex,
    embedding_model: Mutex<Box<dyn EmbeddingModel>>,
    symbol_source: Box<dyn SymbolSource>,
    file_records: RwLock<HashMap<String, i64>>,
    /// Which symbol ids each file last contributed, so `drop_file` can
    /// remove exactly those ids from the Semantic and Structural indices
    /// (neither tracks file association itself).
    file_symbol_ids: RwLock<HashMap<String, HashSet<String>>>,
    counters: Counters,
    active_run: tokio::sync::Mutex<Option<IndexAllFuture>>,
    cancel_flag: Arc<AtomicBool>,
    worker_threads: usize,
}

impl IndexingCoordinator {
    pub fn new(
        name_index: NameIndex,
        semantic_index: SemanticIndex,
        structural_index: StructuralIndex,
        embedding_model: Box<dyn EmbeddingModel>,
        symbol_source: Box<dyn SymbolSource>,
        worker_threads: usize,
    ) -> Self {
        Self {
            name_index,
            semantic_index: Mutex::new(semantic_index),
            structural_index,
            embedding_model: Mutex::new(embedding_model),
            symbol_source,
            file_records: RwLock::new(HashMap::new()),
            file_symbol_ids: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            active_run: tokio::sync::Mutex::new(None),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            worker_threads: worker_threads.max(1),
        }
    }

    pub fn name_index(&self) -> &NameIndex {
        &self.name_index
    }

    pub fn semantic_index(&self) -> &Mutex<SemanticIndex> {
        &self.semantic_index
    }

    pub fn structural_index(&self) -> &StructuralIndex {
        &self.structural_index
    }

    pub fn embedding_model(&self) -> &Mutex<Box<dyn EmbeddingModel>> {
        &self.embedding_model
    }

    pub fn status(&self) -> StatusSnapshot {
        self.counters.snapshot()
    }

    /// Requests cooperative cancellation of an in-progress `index_all`; it
    /// stops at the next file boundary rather than mid-file.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.name_index.clear().ok();
        self.semantic_index.lock().expect("semantic index lock poisoned").clear();
        self.structural_index.clear();
        self.file_records.write().expect("file records lock poisoned").clear();
        self.file_symbol_ids.write().expect("file symbol ids lock poisoned").clear();
        self.counters.files_indexed.store(0, Ordering::SeqCst);
        self.counters.symbols_indexed.store(0, Ordering::SeqCst);
        self.counters.files_failed.store(0, Ordering::SeqCst);
        self.counters.symbols_failed.store(0, Ordering::SeqCst);
    }

    /// Removes every symbol belonging to `path` from all three indices, and
    /// its `FileRecord`. A file that was never indexed is a no-op.
    pub fn drop_file(&self, path: &Path) {
        let path_str = path.to_string_lossy().to_string();
        self.name_index.delete_by_file(&path_str).ok();
        self.name_index.commit().ok();

        let ids_to_drop = self
            .file_symbol_ids
            .write()
            .expect("file symbol ids lock poisoned")
            .remove(&path_str)
            .unwrap_or_default();
        {
            let mut semantic = self.semantic_index.lock().expect("semantic index lock poisoned");
            for id in &ids_to_drop {
                semantic.remove(id);
            }
        }
        for id in &ids_to_drop {
            self.structural_index.remove(id).ok();
        }

        self.file_records.write().expect("file records lock poisoned").remove(&path_str);
    }

    /// Indexes (or reindexes) one file. Per the skip rule, a no-op when
    /// `force` is false and the file's `mod_stamp` hasn't changed. All three
    /// index writes for the file's symbols succeed, or the file is counted
    /// failed; individual symbol failures are tolerated and logged (§4.5).
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn index_file(&self, path: &Path, force: bool) -> bool {
        let path_str = path.to_string_lossy().to_string();
        let current_stamp = mod_stamp(path);

        if !force {
            let unchanged = self
                .file_records
                .read()
                .expect("file records lock poisoned")
                .get(&path_str)
                .is_some_and(|stamp| *stamp == current_stamp);
            if unchanged {
                return true;
            }
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read source file, file marked failed");
                self.counters.files_failed.fetch_add(1, Ordering::SeqCst);
                return false;
            }
        };

        // Reindexing: drop whatever this file previously contributed first,
        // so the per-file write below is idempotent (§8 property 7).
        self.drop_file(path);

        let (symbols, relationships) = self.symbol_source.extract(path, &contents);
        let mut relationships_by_from: HashMap<&str, Vec<&Relationship>> = HashMap::new();
        for rel in &relationships {
            relationships_by_from.entry(rel.from_id.as_str()).or_default().push(rel);
        }

        let enricher = Enricher::new();
        let mut ok = true;
        let mut indexed_this_file = 0u64;
        let mut ids_this_file: HashSet<String> = HashSet::new();

        for symbol in &symbols {
            if !symbol.is_well_formed() {
                warn!(symbol_id = %symbol.id, "invalid symbol, skipped");
                self.counters.symbols_failed.fetch_add(1, Ordering::SeqCst);
                continue;
            }

            let called = relationships_by_from
                .get(symbol.id.as_str())
                .into_iter()
                .flatten()
                .filter(|r| r.kind == crate::model::RelationshipKind::Calls)
                .map(|r| r.to_id.clone())
                .collect::<Vec<_>>();
            let enriched = enricher.enrich(symbol, &called, &[]);

            let entry = IndexEntry {
                id: symbol.id.clone(),
                signature: symbol.signature.clone(),
                name_tokens: enriched.tokens.clone(),
                kind: symbol.kind,
                file_path: symbol.file_path.clone(),
                package: symbol.metadata.package.clone(),
                doc: symbol.metadata.doc_comment.clone(),
            };
            if let Err(e) = self.name_index.write(&entry) {
                warn!(symbol_id = %symbol.id, error = %e, "index write failed, symbol marked partial");
                ok = false;
            }

            let embedding = {
                let mut model = self.embedding_model.lock().expect("embedding model lock poisoned");
                match model.embed(&enriched.combined_text) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(symbol_id = %symbol.id, error = %e, "embedding failed, using zero-vector fallback");
                        vec![0.0; model.dimensions()]
                    }
                }
            };
            let mut metadata = HashMap::new();
            metadata.insert("file_path".to_string(), symbol.file_path.clone());
            metadata.insert("kind".to_string(), symbol.kind.as_str().to_string());
            metadata.insert("start_line".to_string(), symbol.start_line.to_string());
            metadata.insert("end_line".to_string(), symbol.end_line.to_string());
            if let Some(package) = &symbol.metadata.package {
                metadata.insert("package".to_string(), package.clone());
            }
            let vector_entry = VectorEntry {
                id: symbol.id.clone(),
                embedding,
                text: enriched.combined_text.clone(),
                metadata,
            };
            self.semantic_index
                .lock()
                .expect("semantic index lock poisoned")
                .write(&vector_entry.id, vector_entry.embedding, vector_entry.text, vector_entry.metadata);

            let mut structure = ElementStructure::new(symbol.id.clone());
            structure.kind = Some(symbol.kind);
            for rel in relationships_by_from.get(symbol.id.as_str()).into_iter().flatten() {
                fold_relationship(&mut structure, rel);
            }
            if let Err(e) = self.structural_index.upsert(structure) {
                warn!(symbol_id = %symbol.id, error = %e, "structural upsert rejected, symbol marked partial");
                ok = false;
            }

            ids_this_file.insert(symbol.id.clone());
            indexed_this_file += 1;
        }

        self.name_index.commit().ok();
        self.counters.symbols_indexed.fetch_add(indexed_this_file, Ordering::SeqCst);
        self.file_records
            .write()
            .expect("file records lock poisoned")
            .insert(path_str.clone(), current_stamp);
        self.file_symbol_ids
            .write()
            .expect("file symbol ids lock poisoned")
            .insert(path_str, ids_this_file);

        if ok {
            self.counters.files_indexed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.files_failed.fetch_add(1, Ordering::SeqCst);
        }
        ok
    }

    /// Enumerates source files under `root` and schedules per-file indexing
    /// across a bounded worker pool. A second call while indexing is already
    /// running is joined to the in-progress future rather than starting a
    /// new pass (state machine Idle → Indexing → Idle).
    #[instrument(skip(self, progress))]
    pub async fn index_all(self: &Arc<Self>, root: &Path, force: bool, progress: Option<ProgressCallback>) -> IndexAllOutcome {
        let mut active = self.active_run.lock().await;
        if let Some(existing) = active.clone() {
            drop(active);
            return existing.await;
        }

        self.cancel_flag.store(false, Ordering::SeqCst);
        self.counters.is_indexing.store(true, Ordering::SeqCst);
        let started = SystemTime::now();

        let this = Arc::clone(self);
        let root = root.to_path_buf();
        let worker_threads = self.worker_threads;
        let fut: BoxFuture<'static, IndexAllOutcome> = async move {
            let files = discover_files(&root, this.symbol_source.supported_extensions());
            let total = files.len();
            info!(files_total = total, "index_all starting");

            let outcome = Arc::new(Mutex::new(IndexAllOutcome::default()));
            let done = Arc::new(AtomicU64::new(0));
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .build()
                .expect("failed to build worker pool");

            pool.install(|| {
                use rayon::prelude::*;
                files.par_iter().for_each(|path| {
                    if this.cancel_flag.load(Ordering::SeqCst) {
                        return;
                    }
                    let ok = this.index_file(path, force);
                    let done_so_far = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(cb) = &progress {
                        cb(total, done_so_far as usize, path);
                    }
                    let mut o = outcome.lock().expect("outcome lock poisoned");
                    if ok {
                        o.files_indexed += 1;
                    } else {
                        o.files_failed += 1;
                    }
                });
            });

            let mut final_outcome = Arc::try_unwrap(outcome)
                .map(|m| m.into_inner().expect("outcome lock poisoned"))
                .unwrap_or_default();
            final_outcome.symbols_indexed = this.counters.symbols_indexed.load(Ordering::SeqCst);
            final_outcome.cancelled = this.cancel_flag.load(Ordering::SeqCst);

            this.counters.is_indexing.store(false, Ordering::SeqCst);
            let elapsed = started.elapsed().unwrap_or_default();
            info!(
                files_indexed = final_outcome.files_indexed,
                files_failed = final_outcome.files_failed,
                symbols_indexed = final_outcome.symbols_indexed,
                elapsed_ms = elapsed.as_millis() as u64,
                "index_all finished"
            );
            final_outcome
        }
        .boxed();

        let shared = fut.shared();
        *active = Some(shared.clone());
        drop(active);

        let result = shared.await;
        *self.active_run.lock().await = None;
        result
    }

    /// Loads persisted `FileRecord`s from `<root>/files.json`; callers
    /// construct the three indices' disk-backed variants separately and pass
    /// them to `new`.
    pub fn load_file_records(&self, root: impl AsRef<Path>) {
        let records = file_record::load(root);
        *self.file_records.write().expect("file records lock poisoned") = records;
    }

    pub fn save_file_records(&self, root: impl AsRef<Path>) -> std::io::Result<()> {
        let records = self.file_records.read().expect("file records lock poisoned").clone();
        file_record::save(root, &records)
    }

    pub fn file_record(&self, path: &Path) -> Option<FileRecord> {
        let path_str = path.to_string_lossy().to_string();
        self.file_records
            .read()
            .expect("file records lock poisoned")
            .get(&path_str)
            .map(|stamp| FileRecord {
                file_path: path_str,
                mod_stamp: *stamp,
            })
    }
}

fn fold_relationship(structure: &mut ElementStructure, rel: &Relationship) {
    use crate::model::RelationshipKind::*;
    match rel.kind {
        Extends => structure.extends = Some(rel.to_id.clone()),
        Implements => {
            structure.implements.insert(rel.to_id.clone());
        }
        Overrides => {
            structure.overrides.insert(rel.to_id.clone());
        }
        Calls => {
            structure.calls.insert(rel.to_id.clone());
        }
        ReadsField => {
            structure.reads_field.insert(rel.to_id.clone());
        }
        WritesField => {
            structure.writes_field.insert(rel.to_id.clone());
        }
        Instantiates => {
            structure.instantiates.insert(rel.to_id.clone());
        }
        UsesType => {
            structure.uses_type.insert(rel.to_id.clone());
        }
    }
}

fn mod_stamp(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn discover_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    const IGNORED_DIRS: &[&str] = &["target", ".git", "node_modules", "dist", "build"];
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            entry.file_type().is_file()
                || !IGNORED_DIRS.contains(&entry.file_name().to_string_lossy().as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RelationshipKind, SymbolKind, SymbolMetadata};
    use crate::semantic_index::embed::HashEmbeddingModel;
    use std::sync::Arc;

    struct FixedSource {
        symbols: Vec<CodeSymbol>,
        relationships: Vec<Relationship>,
    }

    impl SymbolSource for FixedSource {
        fn supported_extensions(&self) -> &[&'static str] {
            &["rs"]
        }

        fn extract(&self, _path: &Path, _contents: &str) -> (Vec<CodeSymbol>, Vec<Relationship>) {
            (self.symbols.clone(), self.relationships.clone())
        }
    }

    fn make_symbol(id: &str, file_path: &str) -> CodeSymbol {
        CodeSymbol {
            id: id.to_string(),
            kind: SymbolKind::Method,
            signature: format!("fn {id}()"),
            file_path: file_path.to_string(),
            start_line: 1,
            end_line: 2,
            metadata: SymbolMetadata::default(),
            body_text: Some("call_other();".to_string()),
        }
    }

    fn build_coordinator(source: FixedSource) -> IndexingCoordinator {
        IndexingCoordinator::new(
            NameIndex::create_in_ram().unwrap(),
            SemanticIndex::new(16),
            StructuralIndex::new(),
            Box::new(HashEmbeddingModel::new(16)),
            Box::new(source),
            2,
        )
    }

    #[test]
    fn index_file_populates_all_three_indices() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn a_foo() {}").unwrap();

        let coordinator = build_coordinator(FixedSource {
            symbols: vec![make_symbol("A#foo", &file_path.to_string_lossy())],
            relationships: vec![Relationship {
                from_id: "A#foo".to_string(),
                to_id: "B#bar".to_string(),
                kind: RelationshipKind::Calls,
                confidence: 1.0,
            }],
        });

        assert!(coordinator.index_file(&file_path, false));
        assert_eq!(coordinator.status().symbols_indexed, 1);
        assert_eq!(coordinator.name_index.num_docs(), 1);
        assert_eq!(coordinator.semantic_index.lock().unwrap().len(), 1);
        let structural = coordinator.structural_index.get("A#foo").unwrap();
        assert!(structural.calls.contains("B#bar"));
    }

    #[test]
    fn unchanged_mod_stamp_skips_reindex() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn a_foo() {}").unwrap();

        let coordinator = build_coordinator(FixedSource {
            symbols: vec![make_symbol("A#foo", &file_path.to_string_lossy())],
            relationships: vec![],
        });

        coordinator.index_file(&file_path, false);
        let first_count = coordinator.status().symbols_indexed;
        coordinator.index_file(&file_path, false);
        assert_eq!(coordinator.status().symbols_indexed, first_count);
    }

    #[test]
    fn drop_file_removes_symbols_from_name_index() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn a_foo() {}").unwrap();

        let coordinator = build_coordinator(FixedSource {
            symbols: vec![make_symbol("A#foo", &file_path.to_string_lossy())],
            relationships: vec![],
        });
        coordinator.index_file(&file_path, false);
        assert_eq!(coordinator.name_index.num_docs(), 1);

        coordinator.drop_file(&file_path);
        assert_eq!(coordinator.name_index.num_docs(), 0);
    }

    #[tokio::test]
    async fn index_all_processes_discovered_files() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn a_foo() {}").unwrap();

        let coordinator = Arc::new(build_coordinator(FixedSource {
            symbols: vec![make_symbol("A#foo", &file_path.to_string_lossy())],
            relationships: vec![],
        }));

        let outcome = coordinator.index_all(dir.path(), false, None).await;
        assert_eq!(outcome.files_indexed, 1);
        assert!(!coordinator.status().is_indexing);
    }
}
