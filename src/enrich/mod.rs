//! Tokenizer & Signature Enricher.
//!
//! Turns a [`CodeSymbol`] plus its body text into a lexical token stream, an
//! enriched text blob for the Semantic index, and (via `structural_index`
//! upstream) a relation record. This module owns the text side only.

pub mod tokenizer;

use crate::model::CodeSymbol;
use std::collections::HashSet;

pub use tokenizer::{is_stop_word, split_camel_case, split_snake_case, tokenize_identifier};

/// Decision-point keywords counted toward cyclomatic complexity. Each `case`
/// arm counts once (the source's double-counting of switch arms is not
/// reproduced here, per the recorded open-question resolution).
const DECISION_KEYWORDS: &[&str] = &[
    "if", "for", "while", "case", "catch", "do",
];

#[derive(Debug, Clone, Default)]
pub struct CodeMetrics {
    pub loc: usize,
    pub cyclomatic_complexity: u32,
    pub parameter_count: usize,
    pub max_nesting_depth: u32,
    pub call_count: usize,
}

/// Derived text blob fed to the Semantic index.
#[derive(Debug, Clone, Default)]
pub struct Enriched {
    pub combined_text: String,
    pub tokens: Vec<String>,
}

/// Stateless; every method is a pure function of its arguments so enrichment
/// is trivially deterministic and parallelizable.
#[derive(Debug, Default, Clone, Copy)]
pub struct Enricher;

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    /// Build the deterministic enriched-text blob and token list for a
    /// symbol. `called_identifiers` and `ast_paths` come from the upstream
    /// parser/extractor when available; an empty slice omits the
    /// corresponding line rather than emitting a null placeholder.
    pub fn enrich(
        &self,
        symbol: &CodeSymbol,
        called_identifiers: &[String],
        ast_paths: &[String],
    ) -> Enriched {
        let metrics = symbol.body_text.as_deref().map(compute_metrics);

        let mut lines: Vec<String> = Vec::new();
        lines.push(symbol.signature.clone());
        lines.push(String::new());
        lines.push(format!("Type: {}", symbol.kind.as_str()));
        lines.push(format!("ID: {}", symbol.id));
        lines.push(String::new());

        if let Some(doc) = &symbol.metadata.doc_comment {
            lines.push(format!("Documentation: {}", doc));
        }
        if let Some(pkg) = &symbol.metadata.package {
            lines.push(format!("Package: {}", pkg));
        }
        if let Some(class) = containing_class(&symbol.id) {
            lines.push(format!("Class: {}", class));
        }
        // `extends`/`implements` are Structural-index concerns; the enricher
        // only has access to symbol metadata, so it surfaces them when the
        // upstream parser chose to carry them as annotations.
        let extends: Vec<&String> = symbol
            .metadata
            .annotations
            .iter()
            .filter(|a| a.starts_with("extends:"))
            .collect();
        if let Some(e) = extends.first() {
            lines.push(format!("Extends: {}", e.trim_start_matches("extends:")));
        }
        let implements: Vec<String> = symbol
            .metadata
            .annotations
            .iter()
            .filter_map(|a| a.strip_prefix("implements:"))
            .map(|s| s.to_string())
            .collect();
        if !implements.is_empty() {
            lines.push(format!("Implements: {}", implements.join(", ")));
        }
        if let Some(ret) = &symbol.metadata.return_type {
            lines.push(format!("Returns: {}", ret));
        }
        if !symbol.metadata.parameter_types.is_empty() {
            lines.push(format!(
                "Parameters: {}",
                symbol.metadata.parameter_types.join(", ")
            ));
        }
        if !called_identifiers.is_empty() {
            lines.push(format!("Calls: {}", called_identifiers.join(", ")));
        }

        let tokens = token_list(symbol);
        if !tokens.is_empty() {
            lines.push(format!("Tokens: {}", tokens.join(", ")));
        }

        if !ast_paths.is_empty() {
            lines.push("AST Patterns:".to_string());
            for path in sample_diverse(ast_paths, 50) {
                lines.push(format!("- {}", path));
            }
        }

        if let Some(m) = &metrics {
            lines.push(format!(
                "Metrics: LOC={} CC={} Params={}",
                m.loc, m.cyclomatic_complexity, symbol.metadata.parameter_types.len()
            ));
        }

        Enriched {
            combined_text: lines.join("\n"),
            tokens,
        }
    }
}

/// Identifier tokens split on camelCase/snake_case/dot/`#`, lowercased,
/// deduplicated while preserving first-seen order.
fn token_list(symbol: &CodeSymbol) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokenize_identifier(&symbol.id).into_iter().chain(tokenize_identifier(&symbol.signature)) {
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

/// The enclosing class name, derived from a dotted method/field id
/// (`pkg.Class#method` -> `pkg.Class`, `pkg.Class.field` -> `pkg.Class`).
/// Best-effort only; authoritative parent linkage lives in the Structural
/// index.
fn containing_class(id: &str) -> Option<String> {
    if let Some(hash_pos) = id.find('#') {
        return Some(id[..hash_pos].to_string());
    }
    let mut parts: Vec<&str> = id.split('.').collect();
    if parts.len() > 1 {
        parts.pop();
        Some(parts.join("."))
    } else {
        None
    }
}

/// Cyclomatic complexity is 1 + count of decision points; max nesting depth
/// is the deepest lexical `{`/`}` block depth; LOC counts non-blank lines.
pub fn compute_metrics(body_text: &str) -> CodeMetrics {
    let mut cyclomatic_complexity: u32 = 1;
    let mut max_depth: u32 = 0;
    let mut depth: u32 = 0;
    let mut call_count = 0usize;
    let mut loc = 0usize;

    for line in body_text.lines() {
        if !line.trim().is_empty() {
            loc += 1;
        }
        for word in split_words(line) {
            if DECISION_KEYWORDS.contains(&word) {
                cyclomatic_complexity += 1;
            }
        }
        if line.contains('?') && !line.trim_start().starts_with("//") {
            // ternary `cond ? a : b` - conservative, only when a `:` also appears on the line
            if line.contains(':') {
                cyclomatic_complexity += 1;
            }
        }
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                '}' => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
        }
        call_count += count_call_sites(line);
    }

    CodeMetrics {
        loc,
        cyclomatic_complexity,
        parameter_count: 0,
        max_nesting_depth: max_depth,
        call_count,
    }
}

fn split_words(line: &str) -> Vec<&str> {
    line.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect()
}

/// Heuristic call-site counter: an identifier immediately followed by `(`.
fn count_call_sites(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' && i > 0 {
            let prev = bytes[i - 1];
            if prev.is_ascii_alphanumeric() || prev == b'_' {
                count += 1;
            }
        }
        i += 1;
    }
    count
}

/// Sample at most `cap` entries at a uniform stride, preserving relative
/// order, rather than truncating to the first `cap` (which would bias
/// toward whichever AST region happened to be visited first).
fn sample_diverse<T: Clone>(items: &[T], cap: usize) -> Vec<T> {
    if items.len() <= cap || cap == 0 {
        return items.to_vec();
    }
    let stride = items.len() as f64 / cap as f64;
    (0..cap)
        .map(|i| items[((i as f64) * stride) as usize].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SymbolKind, SymbolMetadata};

    fn sample_symbol() -> CodeSymbol {
        CodeSymbol {
            id: "com.pkg.UserService#authenticateUser".into(),
            kind: SymbolKind::Method,
            signature: "public boolean authenticateUser(String username, String password)".into(),
            file_path: "UserService.java".into(),
            start_line: 10,
            end_line: 20,
            metadata: SymbolMetadata {
                package: Some("com.pkg".into()),
                doc_comment: Some("Validates credentials.".into()),
                return_type: Some("boolean".into()),
                parameter_types: vec!["String".into(), "String".into()],
                ..Default::default()
            },
            body_text: Some(
                "if (username == null) { return false; }\nfor (int i = 0; i < 3; i++) { check(i); }".into(),
            ),
        }
    }

    #[test]
    fn combined_text_starts_with_signature_and_is_deterministic() {
        let enricher = Enricher::new();
        let sym = sample_symbol();
        let first = enricher.enrich(&sym, &[], &[]);
        let second = enricher.enrich(&sym, &[], &[]);
        assert_eq!(first.combined_text, second.combined_text);
        assert!(first.combined_text.starts_with(&sym.signature));
        assert!(first.combined_text.contains("Type: method"));
        assert!(first.combined_text.contains("ID: com.pkg.UserService#authenticateUser"));
        assert!(first.combined_text.contains("Documentation: Validates credentials."));
        assert!(first.combined_text.contains("Metrics: LOC="));
    }

    #[test]
    fn missing_metadata_omits_lines_without_null_placeholders() {
        let enricher = Enricher::new();
        let mut sym = sample_symbol();
        sym.metadata.doc_comment = None;
        let enriched = enricher.enrich(&sym, &[], &[]);
        assert!(!enriched.combined_text.contains("Documentation:"));
        assert!(!enriched.combined_text.to_lowercase().contains("null"));
    }

    #[test]
    fn missing_body_text_omits_metrics_without_panicking() {
        let enricher = Enricher::new();
        let mut sym = sample_symbol();
        sym.body_text = None;
        let enriched = enricher.enrich(&sym, &[], &[]);
        assert!(!enriched.combined_text.contains("Metrics:"));
    }

    #[test]
    fn cyclomatic_complexity_counts_decision_points() {
        let metrics = compute_metrics("if (a) {}\nfor (;;) {}\nwhile (x) {}\ncase 1:\n");
        assert_eq!(metrics.cyclomatic_complexity, 1 + 4);
    }
}
