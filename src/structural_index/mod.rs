//! Structural Index: a bidirectional graph over symbol ids with typed edges.
//!
//! Represented as `id -> set<id>` maps per edge kind (never as object
//! pointers, since the graph is intrinsically cyclic via calls/called_by).
//! Writes are serialized per node through the outer `RwLock`; reads take a
//! read lock and clone the small adjacency sets they need, which is the
//! same "copy-on-write snapshot" shape the rest of the corpus uses for its
//! lock-free-read structures, scaled down to a single in-process lock since
//! this index has no on-disk segment to keep consistent with a snapshot.

use crate::error::StructuralIndexError;
use crate::model::{EdgeKind, ElementStructure, SymbolKind};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
struct Graph {
    nodes: HashMap<String, ElementStructure>,
}

pub struct StructuralIndex {
    graph: RwLock<Graph>,
}

impl Default for StructuralIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl StructuralIndex {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Graph::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.graph.read().expect("structural index lock poisoned").nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the node for `structure.id`, re-establishing symmetric
    /// inverse edges on both the new node's neighbors and (if the node
    /// already existed) pruning inverse edges the new version dropped.
    pub fn upsert(&self, structure: ElementStructure) -> Result<(), StructuralIndexError> {
        let mut graph = self.graph.write().expect("structural index lock poisoned");
        validate(&graph, &structure)?;

        if let Some(previous) = graph.nodes.get(&structure.id).cloned() {
            retract_edges(&mut graph, &previous);
        }
        establish_edges(&mut graph, &structure);
        graph.nodes.insert(structure.id.clone(), structure);
        Ok(())
    }

    /// Removes the node and every incident edge, including inverses held by
    /// its neighbors.
    pub fn remove(&self, id: &str) -> Result<(), StructuralIndexError> {
        let mut graph = self.graph.write().expect("structural index lock poisoned");
        let Some(node) = graph.nodes.remove(id) else {
            return Ok(());
        };
        retract_edges(&mut graph, &node);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ElementStructure> {
        self.graph
            .read()
            .expect("structural index lock poisoned")
            .nodes
            .get(id)
            .cloned()
    }

    /// BFS over the requested edge kinds, bounded by `depth` (depth=1
    /// returns direct neighbors only). Does not include `id` itself.
    pub fn neighbors(&self, id: &str, edge_kinds: &[EdgeKind], depth: u32) -> Vec<String> {
        let graph = self.graph.read().expect("structural index lock poisoned");
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(id.to_string());
        let mut frontier: Vec<String> = vec![id.to_string()];

        for _ in 0..depth {
            let mut next = Vec::new();
            for current in &frontier {
                let Some(node) = graph.nodes.get(current) else { continue };
                for neighbor in direct_neighbors(node, edge_kinds) {
                    if visited.insert(neighbor.clone()) {
                        next.push(neighbor);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        visited.remove(id);
        let mut result: Vec<String> = visited.into_iter().collect();
        result.sort();
        result
    }

    pub fn clear(&self) {
        self.graph.write().expect("structural index lock poisoned").nodes.clear();
    }

    /// Writes `<root>/structural/graph.json`: a JSON array of nodes with
    /// their adjacency lists, human-readable for debugging.
    pub fn save(&self, root: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let dir = root.as_ref().join("structural");
        std::fs::create_dir_all(&dir)?;
        let graph = self.graph.read().expect("structural index lock poisoned");
        let nodes: Vec<&ElementStructure> = graph.nodes.values().collect();
        let bytes = serde_json::to_vec_pretty(&nodes)?;
        std::fs::write(dir.join("graph.json"), bytes)
    }

    pub fn load(root: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = root.as_ref().join("structural").join("graph.json");
        let index = Self::new();
        if !path.exists() {
            return Ok(index);
        }
        let bytes = std::fs::read(&path)?;
        let nodes: Vec<ElementStructure> = serde_json::from_slice(&bytes)?;
        let mut graph = index.graph.write().expect("structural index lock poisoned");
        for node in nodes {
            graph.nodes.insert(node.id.clone(), node);
        }
        drop(graph);
        Ok(index)
    }
}

fn direct_neighbors(node: &ElementStructure, edge_kinds: &[EdgeKind]) -> Vec<String> {
    let mut out = Vec::new();
    for &kind in edge_kinds {
        match kind {
            EdgeKind::Extends => out.extend(node.extends.clone()),
            _ => {
                if let Some(set) = node.edge_set(kind) {
                    out.extend(set.iter().cloned());
                }
            }
        }
    }
    out
}

fn validate(graph: &Graph, structure: &ElementStructure) -> Result<(), StructuralIndexError> {
    if structure.extends.as_deref() == Some(structure.id.as_str()) {
        return Err(StructuralIndexError::SelfEdge {
            id: structure.id.clone(),
            kind: EdgeKind::Extends,
        });
    }
    if structure.overrides.contains(&structure.id) {
        return Err(StructuralIndexError::SelfEdge {
            id: structure.id.clone(),
            kind: EdgeKind::Overrides,
        });
    }
    if structure.implements.contains(&structure.id) {
        return Err(StructuralIndexError::SelfEdge {
            id: structure.id.clone(),
            kind: EdgeKind::Implements,
        });
    }
    check_class_only_targets(graph, structure, &structure.instantiates, EdgeKind::Instantiates)?;
    check_class_only_targets(graph, structure, &structure.uses_type, EdgeKind::UsesType)?;
    Ok(())
}

/// `instantiates`/`uses_type` targets not yet indexed (no node, or a node
/// with no resolved `kind`) are let through permissively; only a target
/// whose kind is already known to be something other than a class or
/// interface is rejected.
fn check_class_only_targets(
    graph: &Graph,
    structure: &ElementStructure,
    targets: &HashSet<String>,
    kind: EdgeKind,
) -> Result<(), StructuralIndexError> {
    for target in targets {
        let target_kind = graph.nodes.get(target).and_then(|n| n.kind);
        if !class_only_edges(target_kind) {
            return Err(StructuralIndexError::NonClassTarget {
                id: structure.id.clone(),
                kind,
                target: target.clone(),
                target_kind: target_kind.expect("class_only_edges only rejects a known kind"),
            });
        }
    }
    Ok(())
}

/// Insert the inverse edge on every neighbor named by `structure`'s forward
/// edges, creating placeholder nodes for neighbors not yet indexed (their
/// own forward edges will be filled in when their `upsert` runs).
fn establish_edges(graph: &mut Graph, structure: &ElementStructure) {
    for target in &structure.calls {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).called_by.insert(structure.id.clone());
    }
    for target in &structure.called_by {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).calls.insert(structure.id.clone());
    }
    for target in &structure.overrides {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).overridden_by.insert(structure.id.clone());
    }
    for target in &structure.overridden_by {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).overrides.insert(structure.id.clone());
    }
    if let Some(parent) = &structure.extends {
        graph.nodes.entry(parent.clone()).or_insert_with(|| ElementStructure::new(parent.clone())).subclassed_by.insert(structure.id.clone());
    }
    for target in &structure.implements {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).implemented_by.insert(structure.id.clone());
    }
    for target in &structure.reads_field {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).writes_field.insert(structure.id.clone());
    }
    for target in &structure.writes_field {
        graph.nodes.entry(target.clone()).or_insert_with(|| ElementStructure::new(target.clone())).reads_field.insert(structure.id.clone());
    }
}

fn retract_edges(graph: &mut Graph, structure: &ElementStructure) {
    for target in &structure.calls {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.called_by.remove(&structure.id);
        }
    }
    for target in &structure.called_by {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.calls.remove(&structure.id);
        }
    }
    for target in &structure.overrides {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.overridden_by.remove(&structure.id);
        }
    }
    for target in &structure.overridden_by {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.overrides.remove(&structure.id);
        }
    }
    if let Some(parent) = &structure.extends {
        if let Some(n) = graph.nodes.get_mut(parent) {
            n.subclassed_by.remove(&structure.id);
        }
    }
    for target in &structure.implements {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.implemented_by.remove(&structure.id);
        }
    }
    for target in &structure.reads_field {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.writes_field.remove(&structure.id);
        }
    }
    for target in &structure.writes_field {
        if let Some(n) = graph.nodes.get_mut(target) {
            n.reads_field.remove(&structure.id);
        }
    }
}

/// `instantiates`/`uses_type` may only target classes or interfaces. A
/// target with no resolved kind yet (not indexed, or a placeholder node)
/// passes permissively — `validate` tightens this once the target's own
/// node is upserted.
fn class_only_edges(kind: Option<SymbolKind>) -> bool {
    matches!(kind, None | Some(SymbolKind::Class) | Some(SymbolKind::Interface))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_establishes_inverse_calls_edge() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#foo");
        a.calls.insert("B#bar".to_string());
        index.upsert(a).unwrap();

        let b = index.get("B#bar").unwrap();
        assert!(b.called_by.contains("A#foo"));
    }

    #[test]
    fn remove_prunes_inverse_edges() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#foo");
        a.calls.insert("B#bar".to_string());
        index.upsert(a).unwrap();
        index.remove("A#foo").unwrap();

        let b = index.get("B#bar").unwrap();
        assert!(!b.called_by.contains("A#foo"));
    }

    #[test]
    fn self_edge_on_extends_is_rejected() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A");
        a.extends = Some("A".to_string());
        assert!(index.upsert(a).is_err());
    }

    #[test]
    fn neighbors_respects_depth() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#foo");
        a.calls.insert("B#bar".to_string());
        index.upsert(a).unwrap();
        let mut b = ElementStructure::new("B#bar");
        b.calls.insert("C#baz".to_string());
        index.upsert(b).unwrap();

        let one_hop = index.neighbors("A#foo", &[EdgeKind::Calls], 1);
        assert_eq!(one_hop, vec!["B#bar".to_string()]);

        let two_hop = index.neighbors("A#foo", &[EdgeKind::Calls], 2);
        assert!(two_hop.contains(&"B#bar".to_string()));
        assert!(two_hop.contains(&"C#baz".to_string()));
    }

    #[test]
    fn extends_establishes_inverse_subclassed_by_on_parent() {
        let index = StructuralIndex::new();
        let mut child = ElementStructure::new("Dog");
        child.extends = Some("Animal".to_string());
        index.upsert(child).unwrap();

        let parent = index.get("Animal").unwrap();
        assert!(parent.subclassed_by.contains("Dog"));

        index.remove("Dog").unwrap();
        let parent = index.get("Animal").unwrap();
        assert!(!parent.subclassed_by.contains("Dog"));
    }

    #[test]
    fn implements_establishes_inverse_implemented_by_on_interface() {
        let index = StructuralIndex::new();
        let mut impl_ = ElementStructure::new("Dog");
        impl_.implements.insert("Pet".to_string());
        index.upsert(impl_).unwrap();

        let iface = index.get("Pet").unwrap();
        assert!(iface.implemented_by.contains("Dog"));
        assert!(iface.implements.is_empty());

        index.remove("Dog").unwrap();
        let iface = index.get("Pet").unwrap();
        assert!(!iface.implemented_by.contains("Dog"));
    }

    #[test]
    fn save_then_load_preserves_symmetric_edges() {
        let dir = tempfile::tempdir().unwrap();
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#foo");
        a.calls.insert("B#bar".to_string());
        index.upsert(a).unwrap();
        index.save(dir.path()).unwrap();

        let loaded = StructuralIndex::load(dir.path()).unwrap();
        let b = loaded.get("B#bar").unwrap();
        assert!(b.called_by.contains("A#foo"));
    }

    #[test]
    fn instantiates_targeting_an_unindexed_symbol_is_allowed() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#make_dog");
        a.instantiates.insert("Dog".to_string());
        assert!(index.upsert(a).is_ok());
    }

    #[test]
    fn instantiates_targeting_a_class_is_allowed() {
        let index = StructuralIndex::new();
        let mut dog = ElementStructure::new("Dog");
        dog.kind = Some(SymbolKind::Class);
        index.upsert(dog).unwrap();

        let mut a = ElementStructure::new("A#make_dog");
        a.instantiates.insert("Dog".to_string());
        assert!(index.upsert(a).is_ok());
    }

    #[test]
    fn instantiates_targeting_a_known_non_class_is_rejected() {
        let index = StructuralIndex::new();
        let mut bark = ElementStructure::new("Dog#bark");
        bark.kind = Some(SymbolKind::Method);
        index.upsert(bark).unwrap();

        let mut a = ElementStructure::new("A#make_dog");
        a.instantiates.insert("Dog#bark".to_string());
        assert!(index.upsert(a).is_err());
    }

    #[test]
    fn uses_type_targeting_a_known_non_class_is_rejected() {
        let index = StructuralIndex::new();
        let mut field = ElementStructure::new("A#count");
        field.kind = Some(SymbolKind::Field);
        index.upsert(field).unwrap();

        let mut a = ElementStructure::new("A#method");
        a.uses_type.insert("A#count".to_string());
        assert!(index.upsert(a).is_err());
    }

    #[test]
    fn upsert_is_idempotent_for_unchanged_edges() {
        let index = StructuralIndex::new();
        let mut a = ElementStructure::new("A#foo");
        a.calls.insert("B#bar".to_string());
        index.upsert(a.clone()).unwrap();
        index.upsert(a).unwrap();
        let b = index.get("B#bar").unwrap();
        assert_eq!(b.called_by.len(), 1);
    }
}
