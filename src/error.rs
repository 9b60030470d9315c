//! Error taxonomy for the engine.
//!
//! Most of these variants are *recovered* at the component boundary (logged,
//! counted, folded into `status()`) rather than propagated — see each
//! component's failure-semantics doc comment for which path it takes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid symbol {id}: {reason}")]
    InvalidSymbol { id: String, reason: String },

    #[error("could not read source file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write to {index} index failed for {id}: {reason}")]
    IndexWrite {
        index: &'static str,
        id: String,
        reason: String,
    },

    #[error("index segment corrupt: {0}")]
    IndexCorrupt(String),

    #[error("embedding failed for {id}: {reason}")]
    EmbedFailure { id: String, reason: String },

    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    NameIndex(#[from] NameIndexError),

    #[error(transparent)]
    SemanticIndex(#[from] SemanticIndexError),

    #[error(transparent)]
    Structural(#[from] StructuralIndexError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

#[derive(Debug, Error)]
pub enum NameIndexError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("query error: {0}")]
    Query(String),

    #[error("index not found at {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SemanticIndexError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("hnsw index unavailable: {0}")]
    HnswUnavailable(String),
}

#[derive(Debug, Error)]
pub enum StructuralIndexError {
    #[error("self-edge not permitted for {kind:?} on {id}")]
    SelfEdge { id: String, kind: crate::model::EdgeKind },

    #[error("{kind:?} edge from {id} may only target a class or interface, but {target} is {target_kind:?}")]
    NonClassTarget {
        id: String,
        kind: crate::model::EdgeKind,
        target: String,
        target_kind: crate::model::SymbolKind,
    },

    #[error("node {0} not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("already indexing")]
    AlreadyIndexing,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
