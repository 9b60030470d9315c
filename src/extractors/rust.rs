//! Tree-sitter-backed `SymbolSource` for Rust source, two-phase like the
//! corpus's own Rust extractor: structs/enums/traits/free functions on the
//! first pass, `impl` blocks (and the methods inside them) on the second so
//! a method's parent type is always already known.
//!
//! `calls` relationships are inferred heuristically by scanning a
//! function's body for `identifier(` call sites that match another symbol
//! extracted from the same file; cross-file resolution is left to a real
//! parser, which is why this module documents itself as a fixture, not a
//! production path.

use crate::coordinator::SymbolSource;
use crate::model::{CodeSymbol, Relationship, RelationshipKind, SymbolKind, SymbolMetadata};
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Bundled Rust extractor. Not a substitute for an external, authoritative
/// parser (§1) — it exists to give the CLI's `index` command and the test
/// suite a real `SymbolSource` to run against.
pub struct RustSource;

impl RustSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolSource for RustSource {
    fn supported_extensions(&self) -> &[&'static str] {
        &["rs"]
    }

    fn extract(&self, path: &Path, contents: &str) -> (Vec<CodeSymbol>, Vec<Relationship>) {
        let mut parser = Parser::new();
        if parser.set_language(&tree_sitter_rust::LANGUAGE.into()).is_err() {
            return (Vec::new(), Vec::new());
        }
        let Some(tree) = parser.parse(contents, None) else {
            return (Vec::new(), Vec::new());
        };

        let module = module_name(path);
        let file_path = path.to_string_lossy().to_string();
        let mut ctx = ExtractCtx {
            contents,
            module: &module,
            file_path: &file_path,
            symbols: Vec::new(),
            relationships: Vec::new(),
        };

        // Phase 1: everything except impl-block methods.
        walk(tree.root_node(), &mut ctx, false);
        // Phase 2: impl blocks, now that every struct/enum/trait id exists.
        walk(tree.root_node(), &mut ctx, true);

        let calls = infer_calls(&ctx.symbols);
        ctx.relationships.extend(calls);
        (ctx.symbols, ctx.relationships)
    }
}

struct ExtractCtx<'a> {
    contents: &'a str,
    module: &'a str,
    file_path: &'a str,
    symbols: Vec<CodeSymbol>,
    relationships: Vec<Relationship>,
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "module".to_string())
}

/// `process_impls=false` extracts everything but `impl_item` bodies;
/// `process_impls=true` extracts only `impl_item` bodies. Two passes over
/// the same tree avoid the deferred-node bookkeeping the corpus's own
/// two-phase extractor needs to survive past the borrow of a single walk.
fn walk(node: Node, ctx: &mut ExtractCtx, process_impls: bool) {
    match node.kind() {
        "struct_item" if !process_impls => {
            ctx.symbols.push(item_symbol(node, ctx, SymbolKind::Class, "struct"));
        }
        "enum_item" if !process_impls => {
            ctx.symbols.push(item_symbol(node, ctx, SymbolKind::Class, "enum"));
        }
        "trait_item" if !process_impls => {
            ctx.symbols.push(item_symbol(node, ctx, SymbolKind::Interface, "trait"));
        }
        "function_item" if !process_impls && !inside_impl(node) => {
            ctx.symbols.push(function_symbol(node, ctx, None, SymbolKind::FreeFunction));
        }
        "impl_item" if process_impls => {
            extract_impl(node, ctx);
            return;
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, ctx, process_impls);
    }
}

fn inside_impl(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "impl_item" {
            return true;
        }
        current = n.parent();
    }
    false
}

fn item_symbol(node: Node, ctx: &ExtractCtx, kind: SymbolKind, keyword: &str) -> CodeSymbol {
    let name = field_text(node, "name", ctx.contents).unwrap_or_else(|| "Anonymous".to_string());
    let id = format!("{}::{}", ctx.module, name);
    let signature = declaration_text(node, ctx.contents, keyword, &name);
    CodeSymbol {
        id,
        kind,
        signature,
        file_path: ctx.file_path.to_string(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        metadata: SymbolMetadata {
            doc_comment: doc_comment(node, ctx.contents),
            package: Some(ctx.module.to_string()),
            ..Default::default()
        },
        body_text: Some(node_text(node, ctx.contents).to_string()),
    }
}

fn function_symbol(node: Node, ctx: &ExtractCtx, parent_class: Option<&str>, kind: SymbolKind) -> CodeSymbol {
    let name = field_text(node, "name", ctx.contents).unwrap_or_else(|| "anonymous".to_string());
    let id = match parent_class {
        Some(parent) => format!("{parent}#{name}"),
        None => format!("{}::{}", ctx.module, name),
    };
    let signature = declaration_text(node, ctx.contents, "fn", &name);
    let parameter_types = field_text(node, "parameters", ctx.contents)
        .map(|p| p.trim_matches(|c| c == '(' || c == ')').to_string())
        .filter(|p| !p.is_empty())
        .map(|p| vec![p])
        .unwrap_or_default();
    let return_type = node
        .child_by_field_name("return_type")
        .map(|n| node_text(n, ctx.contents).to_string());

    CodeSymbol {
        id,
        kind,
        signature,
        file_path: ctx.file_path.to_string(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        metadata: SymbolMetadata {
            doc_comment: doc_comment(node, ctx.contents),
            package: Some(ctx.module.to_string()),
            parameter_types,
            return_type,
            ..Default::default()
        },
        body_text: Some(node_text(node, ctx.contents).to_string()),
    }
}

fn extract_impl(node: Node, ctx: &mut ExtractCtx) {
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();

    let type_name = children
        .iter()
        .rev()
        .find(|c| c.kind() == "type_identifier")
        .map(|c| node_text(*c, ctx.contents).to_string());
    let trait_name = if children.iter().any(|c| node_text(*c, ctx.contents) == "for") {
        children
            .iter()
            .take_while(|c| node_text(**c, ctx.contents) != "for")
            .rev()
            .find(|c| c.kind() == "type_identifier")
            .map(|c| node_text(*c, ctx.contents).to_string())
    } else {
        None
    };

    let Some(type_name) = type_name else { return };
    let parent_id = format!("{}::{}", ctx.module, type_name);

    if let Some(trait_name) = trait_name {
        ctx.relationships.push(Relationship {
            from_id: parent_id.clone(),
            to_id: format!("{}::{}", ctx.module, trait_name),
            kind: RelationshipKind::Implements,
            confidence: 1.0,
        });
    }

    let Some(body) = children.iter().find(|c| c.kind() == "declaration_list") else { return };
    let mut body_cursor = body.walk();
    for child in body.children(&mut body_cursor) {
        if child.kind() == "function_item" {
            ctx.symbols.push(function_symbol(child, ctx, Some(&parent_id), SymbolKind::Method));
        }
    }
}

fn field_text(node: Node, field: &str, contents: &str) -> Option<String> {
    node.child_by_field_name(field).map(|n| node_text(n, contents).to_string())
}

fn node_text<'a>(node: Node, contents: &'a str) -> &'a str {
    &contents[node.start_byte()..node.end_byte()]
}

/// Declaration text up to (not including) the opening `{`, matching the
/// enriched-text/signature convention the Name index stores.
fn declaration_text(node: Node, contents: &str, keyword: &str, name: &str) -> String {
    let full = node_text(node, contents);
    match full.find('{') {
        Some(idx) => full[..idx].trim().to_string(),
        None => format!("{keyword} {name}"),
    }
}

/// Contiguous `///` line comments immediately preceding `node`, joined with
/// spaces; `None` when there are none.
fn doc_comment(node: Node, contents: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(n) = current {
        if n.kind() != "line_comment" {
            break;
        }
        let text = node_text(n, contents);
        let Some(stripped) = text.strip_prefix("///") else { break };
        lines.push(stripped.trim().to_string());
        current = n.prev_sibling();
    }
    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join(" "))
    }
}

/// Best-effort same-file call-graph: for each symbol with a body, scan for
/// `<name>(` call sites matching another symbol's bare name extracted from
/// this file. Heuristic, hence the reduced confidence.
fn infer_calls(symbols: &[CodeSymbol]) -> Vec<Relationship> {
    let mut by_name: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for s in symbols {
        let bare = s.id.rsplit(['#', ':']).next().unwrap_or(&s.id);
        by_name.insert(bare, s.id.as_str());
    }

    let mut out = Vec::new();
    for s in symbols {
        let Some(body) = &s.body_text else { continue };
        for name in call_site_identifiers(body) {
            if let Some(&target) = by_name.get(name.as_str()) {
                if target != s.id {
                    out.push(Relationship {
                        from_id: s.id.clone(),
                        to_id: target.to_string(),
                        kind: RelationshipKind::Calls,
                        confidence: 0.6,
                    });
                }
            }
        }
    }
    out
}

fn call_site_identifiers(body: &str) -> Vec<String> {
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            let mut j = i;
            while j > 0 && (bytes[j - 1].is_ascii_alphanumeric() || bytes[j - 1] == b'_') {
                j -= 1;
            }
            if j < i {
                out.push(body[j..i].to_string());
            }
        }
        i += 1;
    }
    out
}
