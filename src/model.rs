//! Core data model shared by every index and by the retriever.
//!
//! These types cross component boundaries by value (or by cheap `Arc`/`id`
//! reference); no index reaches into another index's storage directly.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One named code element, as produced by the upstream parser.
///
/// `id` is the canonical key used everywhere else in the system: methods are
/// `<fqcn>#<name>`, classes are `<fqcn>`, fields are `<fqcn>.<name>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeSymbol {
    pub id: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default)]
    pub metadata: SymbolMetadata,
    /// Full source text of the symbol. May be absent; callers can
    /// reconstruct it from `file_path` + the line range if needed.
    #[serde(default)]
    pub body_text: Option<String>,
}

impl CodeSymbol {
    /// `end_line >= start_line`, clamping defensively rather than panicking;
    /// upstream parsers are an external collaborator and not trusted blindly.
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && self.end_line >= self.start_line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Method,
    Constructor,
    Field,
    FreeFunction,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Field => "field",
            SymbolKind::FreeFunction => "free_function",
        }
    }

    /// Non-authoritative hint used only when an upstream symbol is missing a
    /// `kind` (defensive default, never overrides a real `kind`). Per the
    /// source's own admission this heuristic is fragile: a lower-case first
    /// letter after the last `.` looks like a field, everything else like a
    /// class.
    /// Inverse of [`SymbolKind::as_str`]; used to recover the kind stored as
    /// a metadata string (e.g. the Semantic index's `"kind"` entry).
    pub fn parse_str(s: &str) -> Option<SymbolKind> {
        match s {
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "enum" => Some(SymbolKind::Enum),
            "method" => Some(SymbolKind::Method),
            "constructor" => Some(SymbolKind::Constructor),
            "field" => Some(SymbolKind::Field),
            "free_function" => Some(SymbolKind::FreeFunction),
            _ => None,
        }
    }

    pub fn guess_from_id(id: &str) -> SymbolKind {
        match id.rsplit('.').next() {
            Some(tail) if tail.chars().next().is_some_and(|c| c.is_lowercase()) => {
                SymbolKind::Field
            }
            _ => SymbolKind::Class,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SymbolMetadata {
    pub package: Option<String>,
    pub doc_comment: Option<String>,
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    pub return_type: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// A directed fact between two symbols, emitted by the upstream parser
/// alongside its `CodeSymbol` stream. The Coordinator groups these by
/// `from_id` and folds them into the `ElementStructure` it upserts for that
/// symbol; the enricher never sees them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub from_id: String,
    pub to_id: String,
    pub kind: RelationshipKind,
    /// Heuristic confidence in [0, 1]; a parser unsure whether a scanned
    /// identifier resolves to `to_id` may emit < 1.0 rather than omit it.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Extends,
    Implements,
    Overrides,
    ReadsField,
    WritesField,
    Instantiates,
    UsesType,
}

impl RelationshipKind {
    pub fn as_edge_kind(self) -> EdgeKind {
        match self {
            RelationshipKind::Calls => EdgeKind::Calls,
            RelationshipKind::Extends => EdgeKind::Extends,
            RelationshipKind::Implements => EdgeKind::Implements,
            RelationshipKind::Overrides => EdgeKind::Overrides,
            RelationshipKind::ReadsField => EdgeKind::ReadsField,
            RelationshipKind::WritesField => EdgeKind::WritesField,
            RelationshipKind::Instantiates => EdgeKind::Instantiates,
            RelationshipKind::UsesType => EdgeKind::UsesType,
        }
    }
}

/// Derived, feeds the Semantic index. Never persisted independently.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContent {
    pub combined_text: String,
    pub tokens: Vec<String>,
}

/// Edge kinds carried by the Structural index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    CalledBy,
    Overrides,
    OverriddenBy,
    Extends,
    SubclassedBy,
    Implements,
    ImplementedBy,
    ReadsField,
    WritesField,
    Instantiates,
    UsesType,
}

impl EdgeKind {
    /// The edge kind that must exist in the opposite direction whenever
    /// `self` is inserted, maintaining the §3 symmetry invariant. Only
    /// calls/called_by, overrides/overridden_by, extends/subclassed_by, and
    /// implements/implemented_by are required to be symmetric; the
    /// remaining kinds are plain one-directional facts with no mandated
    /// inverse, so they map to themselves (a no-op "also insert the
    /// inverse" step).
    pub fn inverse(self) -> EdgeKind {
        match self {
            EdgeKind::Calls => EdgeKind::CalledBy,
            EdgeKind::CalledBy => EdgeKind::Calls,
            EdgeKind::Overrides => EdgeKind::OverriddenBy,
            EdgeKind::OverriddenBy => EdgeKind::Overrides,
            EdgeKind::Extends => EdgeKind::SubclassedBy,
            EdgeKind::SubclassedBy => EdgeKind::Extends,
            EdgeKind::Implements => EdgeKind::ImplementedBy,
            EdgeKind::ImplementedBy => EdgeKind::Implements,
            EdgeKind::ReadsField => EdgeKind::ReadsField,
            EdgeKind::WritesField => EdgeKind::WritesField,
            EdgeKind::Instantiates => EdgeKind::Instantiates,
            EdgeKind::UsesType => EdgeKind::UsesType,
        }
    }
}

/// Node in the Structural index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementStructure {
    pub id: String,
    pub kind: Option<SymbolKind>,
    pub extends: Option<String>,
    #[serde(default)]
    pub subclassed_by: HashSet<String>,
    #[serde(default)]
    pub implements: HashSet<String>,
    #[serde(default)]
    pub implemented_by: HashSet<String>,
    #[serde(default)]
    pub overrides: HashSet<String>,
    #[serde(default)]
    pub overridden_by: HashSet<String>,
    #[serde(default)]
    pub calls: HashSet<String>,
    #[serde(default)]
    pub called_by: HashSet<String>,
    #[serde(default)]
    pub reads_field: HashSet<String>,
    #[serde(default)]
    pub writes_field: HashSet<String>,
    #[serde(default)]
    pub instantiates: HashSet<String>,
    #[serde(default)]
    pub uses_type: HashSet<String>,
}

impl ElementStructure {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Direct (non-`extends`/`subclassed_by`) edge sets, keyed by kind. The
    /// Structural index handles `extends`/`subclassed_by` separately since
    /// `extends` is a single optional id rather than a set.
    pub fn edge_set(&self, kind: EdgeKind) -> Option<&HashSet<String>> {
        match kind {
            EdgeKind::Calls => Some(&self.calls),
            EdgeKind::CalledBy => Some(&self.called_by),
            EdgeKind::Overrides => Some(&self.overrides),
            EdgeKind::OverriddenBy => Some(&self.overridden_by),
            EdgeKind::Implements => Some(&self.implements),
            EdgeKind::ImplementedBy => Some(&self.implemented_by),
            EdgeKind::ReadsField => Some(&self.reads_field),
            EdgeKind::WritesField => Some(&self.writes_field),
            EdgeKind::Instantiates => Some(&self.instantiates),
            EdgeKind::UsesType => Some(&self.uses_type),
            EdgeKind::SubclassedBy => Some(&self.subclassed_by),
            EdgeKind::Extends => None,
        }
    }
}

/// Entry in the Name index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub signature: String,
    pub name_tokens: Vec<String>,
    pub kind: SymbolKind,
    pub file_path: String,
    pub package: Option<String>,
    pub doc: Option<String>,
}

/// Entry in the Semantic index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: HashMap<String, String>,
}

/// `file_path -> last_indexed_mod_stamp`, owned exclusively by the Coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_path: String,
    pub mod_stamp: i64,
}

/// Coarse confidence classification of a search result's final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    WeakMatch,
    SemanticMatch,
    LexicalMatch,
    PhraseMatch,
    KeywordMatch,
    ExactMatch,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::ExactMatch => "EXACT_MATCH",
            Tier::KeywordMatch => "KEYWORD_MATCH",
            Tier::PhraseMatch => "PHRASE_MATCH",
            Tier::LexicalMatch => "LEXICAL_MATCH",
            Tier::SemanticMatch => "SEMANTIC_MATCH",
            Tier::WeakMatch => "WEAK_MATCH",
        }
    }
}

/// One ranked hit returned by the Hybrid Retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub line: u32,
    pub final_score: f32,
    pub tier: TierLabel,
    pub sub_scores: HashMap<String, f32>,
    pub window_context: Option<String>,
    pub parent_context: Option<String>,
    pub contextualized_content: Option<String>,
}

/// Serde-friendly mirror of [`Tier`] (kept separate so `Tier`'s `Ord` derive,
/// used for tier-boundary assertions in tests, isn't tangled with wire format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierLabel {
    ExactMatch,
    KeywordMatch,
    PhraseMatch,
    LexicalMatch,
    SemanticMatch,
    WeakMatch,
}

impl From<Tier> for TierLabel {
    fn from(t: Tier) -> Self {
        match t {
            Tier::ExactMatch => TierLabel::ExactMatch,
            Tier::KeywordMatch => TierLabel::KeywordMatch,
            Tier::PhraseMatch => TierLabel::PhraseMatch,
            Tier::LexicalMatch => TierLabel::LexicalMatch,
            Tier::SemanticMatch => TierLabel::SemanticMatch,
            Tier::WeakMatch => TierLabel::WeakMatch,
        }
    }
}

impl TierLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierLabel::ExactMatch => "EXACT_MATCH",
            TierLabel::KeywordMatch => "KEYWORD_MATCH",
            TierLabel::PhraseMatch => "PHRASE_MATCH",
            TierLabel::LexicalMatch => "LEXICAL_MATCH",
            TierLabel::SemanticMatch => "SEMANTIC_MATCH",
            TierLabel::WeakMatch => "WEAK_MATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_requires_nonempty_id_and_line_order() {
        let mut sym = CodeSymbol {
            id: "pkg.Foo#bar".into(),
            kind: SymbolKind::Method,
            signature: "fn bar()".into(),
            file_path: "foo.rs".into(),
            start_line: 10,
            end_line: 12,
            metadata: SymbolMetadata::default(),
            body_text: None,
        };
        assert!(sym.is_well_formed());
        sym.end_line = 5;
        assert!(!sym.is_well_formed());
    }

    #[test]
    fn edge_kind_inverse_is_involutive() {
        for kind in [
            EdgeKind::Calls,
            EdgeKind::Overrides,
            EdgeKind::Extends,
            EdgeKind::Implements,
            EdgeKind::ReadsField,
            EdgeKind::Instantiates,
        ] {
            assert_eq!(kind.inverse().inverse(), kind);
        }
    }

    #[test]
    fn kind_guess_prefers_lowercase_tail_as_field() {
        assert_eq!(SymbolKind::guess_from_id("com.pkg.Foo.bar"), SymbolKind::Field);
        assert_eq!(SymbolKind::guess_from_id("com.pkg.Foo"), SymbolKind::Class);
    }
}
