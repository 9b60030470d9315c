//! In-memory vector store with optional HNSW acceleration.
//!
//! Brute-force cosine scan is used for small corpora; an HNSW index is built
//! on demand for larger ones. `hnsw_rs`'s index is immutable once built, so
//! incremental writes invalidate it until the next explicit rebuild.

use hnsw_rs::prelude::*;
use std::collections::HashMap;

const HNSW_MAX_LAYERS: usize = 16;
const HNSW_MAX_NB_CONNECTION: usize = 32;
const HNSW_EF_CONSTRUCTION: usize = 400;

pub struct VectorStore {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
    hnsw_index: Option<Hnsw<'static, f32, DistCosine>>,
    id_mapping: Vec<String>,
}

impl VectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
            hnsw_index: None,
            id_mapping: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get_vector(&self, id: &str) -> Option<&Vec<f32>> {
        self.vectors.get(id)
    }

    /// Normalize to unit length; dimension mismatches are padded with zeros
    /// or truncated rather than rejected.
    pub fn store_vector(&mut self, id: impl Into<String>, embedding: Vec<f32>) {
        let normalized = normalize(&resize(embedding, self.dimensions));
        self.vectors.insert(id.into(), normalized);
        self.hnsw_index = None; // stale after any mutation
    }

    pub fn update_vector(&mut self, id: impl Into<String>, embedding: Vec<f32>) {
        self.store_vector(id, embedding);
    }

    pub fn remove_vector(&mut self, id: &str) -> bool {
        let removed = self.vectors.remove(id).is_some();
        if removed {
            self.hnsw_index = None;
        }
        removed
    }

    /// Brute-force cosine search, descending score, ties by ascending id.
    pub fn search_similar(&self, query: &[f32], top_k: usize, min_score: f32) -> Vec<(String, f32)> {
        let query = normalize(&resize(query.to_vec(), self.dimensions));
        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(&query, v)))
            .filter(|(_, score)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }

    pub fn has_hnsw_index(&self) -> bool {
        self.hnsw_index.is_some()
    }

    /// Build an ANN index deterministically: insertion order is sorted by id
    /// so repeated builds over the same data produce the same graph.
    pub fn build_hnsw_index(&mut self) {
        if self.vectors.is_empty() {
            return;
        }
        let mut ids: Vec<&String> = self.vectors.keys().collect();
        ids.sort();
        self.id_mapping = ids.iter().map(|s| (*s).clone()).collect();

        let hnsw: Hnsw<f32, DistCosine> = Hnsw::new(
            HNSW_MAX_NB_CONNECTION,
            self.vectors.len(),
            HNSW_MAX_LAYERS,
            HNSW_EF_CONSTRUCTION,
            DistCosine {},
        );
        let data: Vec<(&Vec<f32>, usize)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (self.vectors.get(*id).unwrap(), i))
            .collect();
        hnsw.parallel_insert(&data);
        hnsw.set_searching_mode(true);
        self.hnsw_index = Some(hnsw);
    }

    /// ANN search, with exact cosine recomputed for threshold filtering and
    /// final ordering (so HNSW's approximate distances never leak into the
    /// contract's min_score / ordering guarantees).
    pub fn search_similar_hnsw(&self, query: &[f32], top_k: usize, min_score: f32) -> Vec<(String, f32)> {
        let Some(hnsw) = &self.hnsw_index else {
            return self.search_similar(query, top_k, min_score);
        };
        let query = normalize(&resize(query.to_vec(), self.dimensions));
        let ef_search = (top_k * 2).max(50);
        let neighbors = hnsw.search(&query, top_k, ef_search);

        let mut scored: Vec<(String, f32)> = neighbors
            .into_iter()
            .filter_map(|n| self.id_mapping.get(n.d_id).cloned())
            .filter_map(|id| {
                let v = self.vectors.get(&id)?;
                let score = cosine_similarity(&query, v);
                (score >= min_score).then_some((id, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);
        scored
    }

    pub fn save_hnsw_index(&self, dir: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        if let Some(hnsw) = &self.hnsw_index {
            hnsw.set_searching_mode(false);
            hnsw.file_dump(dir.as_ref(), "hnsw_index")
                .map_err(|e| std::io::Error::other(format!("hnsw dump failed: {e:?}")))?;
            hnsw.set_searching_mode(true);
        }
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.vectors.keys()
    }

    pub fn all_vectors(&self) -> &HashMap<String, Vec<f32>> {
        &self.vectors
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.hnsw_index = None;
        self.id_mapping.clear();
    }
}

fn resize(mut v: Vec<f32>, dims: usize) -> Vec<f32> {
    v.resize(dims, 0.0);
    v
}

pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_retrieve_roundtrips_normalized() {
        let mut store = VectorStore::new(3);
        store.store_vector("a", vec![3.0, 4.0, 0.0]);
        let v = store.get_vector("a").unwrap();
        let len: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }

    #[test]
    fn dimension_mismatch_is_padded_or_truncated() {
        let mut store = VectorStore::new(4);
        store.store_vector("short", vec![1.0, 0.0]);
        store.store_vector("long", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(store.get_vector("short").unwrap().len(), 4);
        assert_eq!(store.get_vector("long").unwrap().len(), 4);
    }

    #[test]
    fn search_similar_orders_by_score_desc_ties_by_id() {
        let mut store = VectorStore::new(2);
        store.store_vector("b", vec![1.0, 0.0]);
        store.store_vector("a", vec![1.0, 0.0]);
        let hits = store.search_similar(&[1.0, 0.0], 10, 0.0);
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
    }

    #[test]
    fn hnsw_and_brute_force_agree_on_top_hit() {
        let mut store = VectorStore::new(4);
        for i in 0..20 {
            store.store_vector(format!("id{i}"), vec![i as f32, 1.0, 0.0, 0.0]);
        }
        store.build_hnsw_index();
        let query = vec![5.0, 1.0, 0.0, 0.0];
        let brute = store.search_similar(&query, 5, 0.0);
        let ann = store.search_similar_hnsw(&query, 5, 0.0);
        assert_eq!(brute[0].0, ann[0].0);
    }

    #[test]
    fn remove_invalidates_hnsw_index() {
        let mut store = VectorStore::new(2);
        store.store_vector("a", vec![1.0, 0.0]);
        store.build_hnsw_index();
        assert!(store.has_hnsw_index());
        store.remove_vector("a");
        assert!(!store.has_hnsw_index());
    }
}
