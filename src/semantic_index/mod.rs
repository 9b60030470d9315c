//! Semantic Index: vector store mapping symbol id -> (embedding, text,
//! metadata), with ANN search by cosine similarity and an optional
//! metadata-equality filter.

pub mod embed;
pub mod vector_store;

use crate::error::SemanticIndexError;
use crate::model::VectorEntry;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use vector_store::VectorStore;

/// Entries beyond which brute-force cosine scan stops being used and an HNSW
/// index is built instead (§4.3: brute force MAY be used up to 10^5).
const BRUTE_FORCE_THRESHOLD: usize = 100_000;

pub struct SemanticIndex {
    store: VectorStore,
    texts: HashMap<String, String>,
    metadata: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub id: String,
    pub cosine_score: f32,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl SemanticIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            store: VectorStore::new(dimensions),
            texts: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn write(&mut self, id: &str, embedding: Vec<f32>, text: String, metadata: HashMap<String, String>) {
        self.store.store_vector(id, embedding);
        self.texts.insert(id.to_string(), text);
        self.metadata.insert(id.to_string(), metadata);
        if self.store.len() > BRUTE_FORCE_THRESHOLD {
            self.store.build_hnsw_index();
        }
    }

    pub fn batch_write(&mut self, entries: Vec<VectorEntry>) {
        for entry in entries {
            self.write(&entry.id, entry.embedding, entry.text, entry.metadata);
        }
    }

    /// Direct by-id lookup (text, metadata), bypassing similarity search.
    /// Used by the retriever to hydrate candidates surfaced only by the name
    /// index, since the combined text lives here regardless of which stream
    /// found the id.
    pub fn get(&self, id: &str) -> Option<(&str, &HashMap<String, String>)> {
        let text = self.texts.get(id)?;
        let metadata = self.metadata.get(id)?;
        Some((text.as_str(), metadata))
    }

    pub fn remove(&mut self, id: &str) {
        self.store.remove_vector(id);
        self.texts.remove(id);
        self.metadata.remove(id);
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.texts.clear();
        self.metadata.clear();
    }

    /// `filter` is a key/value-equality conjunction over metadata.
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        min_score: f32,
        filter: Option<&HashMap<String, String>>,
    ) -> Vec<SemanticHit> {
        let candidate_k = match filter {
            Some(_) => (top_k * 4).max(top_k), // over-fetch before filtering
            None => top_k,
        };
        let raw = if self.store.has_hnsw_index() {
            self.store.search_similar_hnsw(query_embedding, candidate_k, min_score)
        } else {
            self.store.search_similar(query_embedding, candidate_k, min_score)
        };

        let mut hits: Vec<SemanticHit> = raw
            .into_iter()
            .filter(|(id, _)| matches_filter(self.metadata.get(id), filter))
            .map(|(id, score)| SemanticHit {
                text: self.texts.get(&id).cloned().unwrap_or_default(),
                metadata: self.metadata.get(&id).cloned().unwrap_or_default(),
                id,
                cosine_score: score,
            })
            .collect();
        hits.truncate(top_k);
        hits
    }

    pub fn build_hnsw_index(&mut self) {
        self.store.build_hnsw_index();
    }

    /// Writes `<root>/semantic/vectors.bin` (`[id_len:u32][id:utf8][vec:f32*D]`
    /// packed records) and `<root>/semantic/meta.json` (array of `{id, text,
    /// metadata}`), per the persisted state layout.
    pub fn save(&self, root: impl AsRef<Path>) -> Result<(), SemanticIndexError> {
        let dir = root.as_ref().join("semantic");
        std::fs::create_dir_all(&dir)?;

        let mut vectors_file = std::io::BufWriter::new(std::fs::File::create(dir.join("vectors.bin"))?);
        for id in self.store.ids() {
            let vector = self.store.get_vector(id).expect("id came from store.ids()");
            let id_bytes = id.as_bytes();
            vectors_file.write_all(&(id_bytes.len() as u32).to_le_bytes())?;
            vectors_file.write_all(id_bytes)?;
            for component in vector {
                vectors_file.write_all(&component.to_le_bytes())?;
            }
        }
        vectors_file.flush()?;

        let meta: Vec<MetaRecord> = self
            .store
            .ids()
            .map(|id| MetaRecord {
                id: id.clone(),
                text: self.texts.get(id).cloned().unwrap_or_default(),
                metadata: self.metadata.get(id).cloned().unwrap_or_default(),
            })
            .collect();
        std::fs::write(dir.join("meta.json"), serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    pub fn load(root: impl AsRef<Path>, dimensions: usize) -> Result<Self, SemanticIndexError> {
        let dir = root.as_ref().join("semantic");
        let mut index = Self::new(dimensions);

        let meta_path = dir.join("meta.json");
        let mut meta_by_id: HashMap<String, MetaRecord> = HashMap::new();
        if meta_path.exists() {
            let contents = std::fs::read(&meta_path)?;
            let records: Vec<MetaRecord> = serde_json::from_slice(&contents)?;
            for record in records {
                meta_by_id.insert(record.id.clone(), record);
            }
        }

        let vectors_path = dir.join("vectors.bin");
        if vectors_path.exists() {
            let mut file = std::io::BufReader::new(std::fs::File::open(&vectors_path)?);
            let mut len_buf = [0u8; 4];
            loop {
                if file.read_exact(&mut len_buf).is_err() {
                    break;
                }
                let id_len = u32::from_le_bytes(len_buf) as usize;
                let mut id_buf = vec![0u8; id_len];
                file.read_exact(&mut id_buf)?;
                let id = String::from_utf8_lossy(&id_buf).to_string();

                let mut vec_buf = vec![0u8; dimensions * 4];
                file.read_exact(&mut vec_buf)?;
                let vector: Vec<f32> = vec_buf
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();

                let (text, metadata) = meta_by_id
                    .remove(&id)
                    .map(|r| (r.text, r.metadata))
                    .unwrap_or_default();
                index.write(&id, vector, text, metadata);
            }
        }
        Ok(index)
    }
}

fn matches_filter(metadata: Option<&HashMap<String, String>>, filter: Option<&HashMap<String, String>>) -> bool {
    let Some(filter) = filter else { return true };
    let Some(metadata) = metadata else { return filter.is_empty() };
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Default)]
struct MetaRecord {
    id: String,
    text: String,
    metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_search_returns_stored_text_and_metadata() {
        let mut index = SemanticIndex::new(4);
        let mut meta = HashMap::new();
        meta.insert("language".to_string(), "rust".to_string());
        index.write("a", vec![1.0, 0.0, 0.0, 0.0], "fn a()".to_string(), meta);

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 10, 0.0, None);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].text, "fn a()");
        assert_eq!(hits[0].metadata.get("language").unwrap(), "rust");
    }

    #[test]
    fn metadata_filter_excludes_non_matching_entries() {
        let mut index = SemanticIndex::new(2);
        let mut rust_meta = HashMap::new();
        rust_meta.insert("language".to_string(), "rust".to_string());
        let mut java_meta = HashMap::new();
        java_meta.insert("language".to_string(), "java".to_string());
        index.write("rust_fn", vec![1.0, 0.0], String::new(), rust_meta);
        index.write("java_fn", vec![1.0, 0.0], String::new(), java_meta);

        let mut filter = HashMap::new();
        filter.insert("language".to_string(), "rust".to_string());
        let hits = index.search(&[1.0, 0.0], 10, 0.0, Some(&filter));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "rust_fn");
    }

    #[test]
    fn save_then_load_preserves_vectors_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = SemanticIndex::new(3);
        let mut meta = HashMap::new();
        meta.insert("kind".to_string(), "method".to_string());
        index.write("x", vec![0.5, 0.5, 0.0], "body text".to_string(), meta);
        index.save(dir.path()).unwrap();

        let loaded = SemanticIndex::load(dir.path(), 3).unwrap();
        assert_eq!(loaded.len(), 1);
        let hits = loaded.search(&[0.5, 0.5, 0.0], 10, 0.0, None);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[0].text, "body text");
    }

    #[test]
    fn min_score_clips_results() {
        let mut index = SemanticIndex::new(2);
        index.write("close", vec![1.0, 0.0], String::new(), HashMap::new());
        index.write("far", vec![0.0, 1.0], String::new(), HashMap::new());
        let hits = index.search(&[1.0, 0.0], 10, 0.9, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "close");
    }
}
