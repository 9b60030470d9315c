//! End-to-end coverage of the public `Engine` surface: index a small
//! fixture tree, then exercise search/related/persistence through it
//! exactly as a real caller would, never reaching into the indices
//! directly.

use codecortex::extractors::RustSource;
use codecortex::name_index::SearchFilter;
use codecortex::semantic_index::embed::HashEmbeddingModel;
use codecortex::{CoreConfig, Engine};
use std::fs;
use tempfile::tempdir;

fn build_engine(root: Option<std::path::PathBuf>) -> Engine {
    let mut config = CoreConfig::default();
    config.use_disk_storage = root.is_some();
    Engine::new(config, root, Box::new(HashEmbeddingModel::new(32)), Box::new(RustSource::new()), None)
        .expect("engine construction should not fail")
}

fn write_fixture(dir: &std::path::Path) {
    fs::write(
        dir.join("auth.rs"),
        r#"
pub struct UserAuthenticator {
    secret: String,
}

impl UserAuthenticator {
    pub fn authenticate_user(&self, token: &str) -> bool {
        self.verify_token(token)
    }

    fn verify_token(&self, token: &str) -> bool {
        token == self.secret
    }
}
"#,
    )
    .unwrap();

    fs::write(
        dir.join("billing.rs"),
        r#"
pub fn charge_customer(amount: u32) -> bool {
    amount > 0
}
"#,
    )
    .unwrap();
}

#[tokio::test]
async fn index_all_then_search_finds_the_right_symbol() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    let outcome = engine.index_all(dir.path(), false, None).await;
    assert_eq!(outcome.files_failed, 0);
    assert!(outcome.symbols_indexed > 0);

    let results = engine.search("authenticate_user", 5, None).await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].content.contains("authenticate_user"));
    assert!(results[0].final_score > 0.0);
}

#[tokio::test]
async fn search_with_a_kind_filter_excludes_other_kinds() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    engine.index_all(dir.path(), false, None).await;

    let filter = SearchFilter {
        kind: Some(codecortex::model::SymbolKind::Method),
        file_pattern: None,
    };
    let results = engine.search("charge_customer", 5, Some(filter)).await.unwrap();
    assert!(results.iter().all(|r| !r.content.contains("pub fn charge_customer")));
}

#[tokio::test]
async fn related_walks_the_call_graph() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    engine.index_all(dir.path(), false, None).await;

    let hits = engine.search("authenticate_user", 1, None).await.unwrap();
    let id = hits[0].id.clone();

    let related = engine.related(&id, &[codecortex::model::EdgeKind::Calls], 10);
    assert!(related.iter().any(|r| r.content.contains("verify_token")));
}

#[tokio::test]
async fn reindexing_an_unchanged_file_without_force_is_a_no_op() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    let first = engine.index_all(dir.path(), false, None).await;
    let second = engine.index_all(dir.path(), false, None).await;

    assert_eq!(first.symbols_indexed, second.symbols_indexed);
}

#[tokio::test]
async fn drop_file_removes_its_symbols_from_search() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    engine.index_all(dir.path(), false, None).await;
    assert!(!engine.search("charge_customer", 5, None).await.unwrap().is_empty());

    engine.drop_file(&dir.path().join("billing.rs"));
    let results = engine.search("charge_customer", 5, None).await.unwrap();
    assert!(results.iter().all(|r| r.file_path != dir.path().join("billing.rs").to_string_lossy()));
}

#[tokio::test]
async fn save_and_reload_preserves_indexed_content_on_disk() {
    let data_dir = tempdir().unwrap();
    let source_dir = tempdir().unwrap();
    write_fixture(source_dir.path());

    {
        let engine = build_engine(Some(data_dir.path().to_path_buf()));
        engine.index_all(source_dir.path(), false, None).await;
        engine.save().unwrap();
    }

    let reloaded = build_engine(Some(data_dir.path().to_path_buf()));
    let results = reloaded.search("authenticate_user", 5, None).await.unwrap();
    assert!(!results.is_empty());
}

#[test]
fn status_reflects_indexing_progress() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    assert_eq!(engine.status().files_indexed, 0);
    engine.index_file(&dir.path().join("auth.rs"), false);
    assert_eq!(engine.status().files_indexed, 1);
}

#[test]
fn clear_empties_the_indices() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let engine = build_engine(None);
    engine.index_file(&dir.path().join("auth.rs"), false);
    assert_eq!(engine.status().files_indexed, 1);

    engine.clear();
    assert_eq!(engine.status().files_indexed, 0);
}
