//! Schema Reference Graph
//!
//! The reference-resolution layer: owns the merged schema document, addresses
//! every node by canonical JSON pointer, resolves `$ref` chains, and mirrors
//! the reference structure between definitions into a petgraph DiGraph for
//! cycle analysis and export.
//!
//! The model-building engine consumes this graph; it never touches the
//! filesystem itself. Unresolved references are fatal here, before any
//! model is built.

pub mod analysis;
pub mod diagnostics;
pub mod loader;
pub mod patterns;

// Re-export key types from submodules
pub use analysis::{compute_scc_analysis, SccAnalysis, SccGroup};
pub use diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics, Severity};
pub use loader::{load_directory, load_document, load_input, LoadConfig};
pub use patterns::{classify, classify_resolved, ScalarKind, Shape};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ModelgenError, Result};

/// Canonical JSON pointer of a schema node, e.g. `#/definitions/Pet` or
/// `#/definitions/Pet/properties/tags/items`
pub type Pointer = String;

/// Pointer to the definitions container inside the merged document
pub const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Types of edges in the schema reference graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Standard $ref dependency
    Ref,
    /// allOf composition member
    AllOf,
    /// items element type
    Items,
    /// additionalItems tuple tail type
    AdditionalItems,
    /// additionalProperties map value type
    AdditionalProperties,
    /// Property field type
    Property,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ref => "ref",
            Self::AllOf => "allOf",
            Self::Items => "items",
            Self::AdditionalItems => "additionalItems",
            Self::AdditionalProperties => "additionalProperties",
            Self::Property => "property",
        }
    }
}

/// The resolved schema document graph
///
/// Nodes are top-level definitions; edges are the `$ref`s found anywhere in a
/// definition's subtree, tagged by the keyword context they were found under.
#[derive(Debug)]
pub struct SchemaGraph {
    /// The merged document; every pointer resolves against this value
    root: Value,

    /// Reference structure between definitions
    pub(crate) graph: DiGraph<Pointer, EdgeKind>,

    /// Node index lookup: definition pointer -> NodeIndex
    pub(crate) node_indices: HashMap<Pointer, NodeIndex>,

    /// Index: definition name -> pointer
    by_name: HashMap<String, Pointer>,

    /// Index: definition pointer -> name
    names: HashMap<Pointer, String>,

    /// Definition names in traversal order (lexicographic, which is what
    /// serde_json's map yields; keeps every run deterministic)
    definition_order: Vec<String>,
}

impl SchemaGraph {
    /// Build the graph from a merged document
    ///
    /// The document must be an object with a non-empty `definitions` member.
    /// Every `$ref` in every definition subtree must resolve locally;
    /// anything else is a contract violation and fails the build.
    pub fn from_document(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(ModelgenError::InvalidDocument {
                path: "<document>".to_string(),
            });
        }

        let def_names: Vec<String> = match root.get("definitions").and_then(Value::as_object) {
            Some(defs) if !defs.is_empty() => defs.keys().cloned().collect(),
            _ => {
                return Err(ModelgenError::EmptyDocument {
                    path: "<document>".to_string(),
                })
            }
        };

        let mut graph = DiGraph::with_capacity(def_names.len(), def_names.len() * 3);
        let mut node_indices = HashMap::with_capacity(def_names.len());
        let mut by_name = HashMap::with_capacity(def_names.len());
        let mut names = HashMap::with_capacity(def_names.len());

        for name in &def_names {
            let pointer = format!("{}{}", DEFINITIONS_PREFIX, escape_token(name));
            let idx = graph.add_node(pointer.clone());
            node_indices.insert(pointer.clone(), idx);
            by_name.insert(name.clone(), pointer.clone());
            names.insert(pointer, name.clone());
        }

        let mut sg = Self {
            root,
            graph,
            node_indices,
            by_name,
            names,
            definition_order: def_names,
        };

        // Validate every $ref and mirror the reference structure into edges.
        let mut pending: Vec<(Pointer, Pointer, EdgeKind)> = Vec::new();
        for name in sg.definition_order.clone() {
            let from = sg.by_name[&name].clone();
            let node = sg
                .resolve_pointer(&from)
                .cloned()
                .ok_or_else(|| ModelgenError::UnresolvedRef {
                    pointer: from.clone(),
                    reference: from.clone(),
                })?;
            let mut found = Vec::new();
            collect_edges(&node, &mut found);
            for (kind, reference) in found {
                let target = sg.canonicalize_ref(&from, &reference)?;
                if let Some(def) = sg.owning_definition(&target) {
                    pending.push((from.clone(), def, kind));
                }
            }
        }
        for (from, to, kind) in pending {
            if let (Some(&a), Some(&b)) = (sg.node_indices.get(&from), sg.node_indices.get(&to)) {
                sg.graph.add_edge(a, b, kind);
            }
        }

        tracing::debug!(
            definitions = sg.definition_order.len(),
            edges = sg.graph.edge_count(),
            "schema graph built"
        );

        Ok(sg)
    }

    // ========== Public API ==========

    /// Number of top-level definitions
    pub fn definition_count(&self) -> usize {
        self.definition_order.len()
    }

    /// Number of reference edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Definitions in stable traversal order: (name, pointer)
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &Pointer)> {
        self.definition_order
            .iter()
            .map(move |n| (n.as_str(), &self.by_name[n]))
    }

    /// Pointer of a named definition
    pub fn definition(&self, name: &str) -> Option<&Pointer> {
        self.by_name.get(name)
    }

    /// Name of a definition pointer
    pub fn name_of(&self, pointer: &str) -> Option<&str> {
        self.names.get(pointer).map(String::as_str)
    }

    /// Resolve a canonical pointer to its raw node
    pub fn resolve_pointer(&self, pointer: &str) -> Option<&Value> {
        let rest = pointer.strip_prefix('#')?;
        if rest.is_empty() {
            return Some(&self.root);
        }
        let mut current = &self.root;
        for token in rest.split('/').skip(1) {
            let token = unescape_token(token);
            current = match current {
                Value::Object(map) => map.get(&token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a `$ref` string found at `from` to the canonical pointer of
    /// the terminal non-reference node
    ///
    /// Bare reference chains (a node that is nothing but `$ref` to another
    /// `$ref`) are followed; a chain that never reaches a concrete schema is
    /// fatal, as is any reference that does not resolve locally.
    pub fn canonicalize_ref(&self, from: &str, reference: &str) -> Result<Pointer> {
        if !reference.starts_with("#/") {
            return Err(ModelgenError::UnresolvedRef {
                pointer: from.to_string(),
                reference: reference.to_string(),
            });
        }

        let mut current = reference.to_string();
        let mut visited = vec![current.clone()];
        loop {
            let node = self
                .resolve_pointer(&current)
                .ok_or_else(|| ModelgenError::UnresolvedRef {
                    pointer: from.to_string(),
                    reference: current.clone(),
                })?;
            match node.get("$ref").and_then(Value::as_str) {
                Some(next) => {
                    if !next.starts_with("#/") {
                        return Err(ModelgenError::UnresolvedRef {
                            pointer: current.clone(),
                            reference: next.to_string(),
                        });
                    }
                    if visited.iter().any(|v| v == next) {
                        return Err(ModelgenError::RefChainLoop {
                            pointer: from.to_string(),
                        });
                    }
                    visited.push(next.to_string());
                    current = next.to_string();
                }
                None => return Ok(current),
            }
        }
    }

    /// The definition pointer that owns a (possibly nested) pointer
    pub fn owning_definition(&self, pointer: &str) -> Option<Pointer> {
        let rest = pointer.strip_prefix(DEFINITIONS_PREFIX)?;
        let name = rest.split('/').next()?;
        let def = format!("{}{}", DEFINITIONS_PREFIX, name);
        self.node_indices.contains_key(&def).then_some(def)
    }

    /// Immediate outgoing references of a definition
    pub fn refs_out(&self, pointer: &str) -> Vec<&Pointer> {
        let Some(&idx) = self.node_indices.get(pointer) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .filter_map(|e| self.graph.node_weight(e.target()))
            .collect()
    }

    /// Immediate incoming references of a definition
    pub fn refs_in(&self, pointer: &str) -> Vec<&Pointer> {
        let Some(&idx) = self.node_indices.get(pointer) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter_map(|e| self.graph.node_weight(e.source()))
            .collect()
    }

    /// Definitions that compose this one via allOf (used by polymorphism
    /// resolution to find a base's variants)
    pub fn composers_of(&self, pointer: &str) -> Vec<&Pointer> {
        let Some(&idx) = self.node_indices.get(pointer) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| *e.weight() == EdgeKind::AllOf)
            .filter_map(|e| self.graph.node_weight(e.source()))
            .collect()
    }

    /// Export the reference graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph SchemaGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str(
            "  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n",
        );
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        let color_map = [
            ("object", "#00BCD4"),
            ("composed", "#FF9800"),
            ("polymorphic", "#9C27B0"),
            ("array", "#4CAF50"),
            ("tuple", "#8BC34A"),
            ("map", "#3F51B5"),
            ("alias", "#607D8B"),
            ("primitive", "#9E9E9E"),
        ];

        for name in &self.definition_order {
            let pointer = &self.by_name[name];
            let family = self
                .resolve_pointer(pointer)
                .map(|node| classify(node).family())
                .unwrap_or("primitive");
            let color = color_map
                .iter()
                .find(|(f, _)| *f == family)
                .map(|(_, c)| *c)
                .unwrap_or("#9E9E9E");
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                dot_id(pointer),
                name,
                color
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            if let (Some(source), Some(target)) = (
                self.graph.node_weight(edge.source()),
                self.graph.node_weight(edge.target()),
            ) {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                    dot_id(source),
                    dot_id(target),
                    edge.weight().as_str()
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}

fn dot_id(pointer: &str) -> String {
    pointer
        .replace('#', "")
        .replace('/', "_")
        .replace('.', "_")
        .replace('-', "_")
}

/// JSON-pointer token escaping (RFC 6901)
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// JSON-pointer token unescaping (RFC 6901)
pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Collect every `$ref` in a definition subtree, tagged by the keyword
/// context it appears under
fn collect_edges(node: &Value, out: &mut Vec<(EdgeKind, String)>) {
    let Value::Object(obj) = node else {
        if let Value::Array(items) = node {
            for item in items {
                collect_edges(item, out);
            }
        }
        return;
    };

    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        out.push((EdgeKind::Ref, reference.to_string()));
    }

    if let Some(members) = obj.get("allOf").and_then(Value::as_array) {
        for member in members {
            match member.get("$ref").and_then(Value::as_str) {
                Some(reference) => out.push((EdgeKind::AllOf, reference.to_string())),
                None => collect_edges(member, out),
            }
        }
    }

    if let Some(items) = obj.get("items") {
        match items {
            Value::Array(positions) => {
                for position in positions {
                    match position.get("$ref").and_then(Value::as_str) {
                        Some(reference) => out.push((EdgeKind::Items, reference.to_string())),
                        None => collect_edges(position, out),
                    }
                }
            }
            _ => match items.get("$ref").and_then(Value::as_str) {
                Some(reference) => out.push((EdgeKind::Items, reference.to_string())),
                None => collect_edges(items, out),
            },
        }
    }

    if let Some(tail) = obj.get("additionalItems") {
        if tail.is_object() {
            match tail.get("$ref").and_then(Value::as_str) {
                Some(reference) => out.push((EdgeKind::AdditionalItems, reference.to_string())),
                None => collect_edges(tail, out),
            }
        }
    }

    if let Some(values) = obj.get("additionalProperties") {
        if values.is_object() {
            match values.get("$ref").and_then(Value::as_str) {
                Some(reference) => {
                    out.push((EdgeKind::AdditionalProperties, reference.to_string()))
                }
                None => collect_edges(values, out),
            }
        }
    }

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for prop in props.values() {
            match prop.get("$ref").and_then(Value::as_str) {
                Some(reference) => out.push((EdgeKind::Property, reference.to_string())),
                None => collect_edges(prop, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_graph() -> SchemaGraph {
        SchemaGraph::from_document(json!({
            "definitions": {
                "Pet": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "tag": {"$ref": "#/definitions/Tag"}
                    }
                },
                "Tag": {
                    "type": "object",
                    "properties": {
                        "label": {"type": "string"}
                    }
                },
                "TagAlias": {"$ref": "#/definitions/Tag"},
                "Tags": {
                    "type": "array",
                    "items": {"$ref": "#/definitions/Tag"}
                }
            }
        }))
        .expect("valid document")
    }

    #[test]
    fn test_definitions_in_lexicographic_order() {
        let graph = sample_graph();
        let names: Vec<&str> = graph.definitions().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Pet", "Tag", "TagAlias", "Tags"]);
    }

    #[test]
    fn test_resolve_pointer_walks_nesting() {
        let graph = sample_graph();
        let node = graph
            .resolve_pointer("#/definitions/Pet/properties/name")
            .expect("nested node");
        assert_eq!(node.get("type").and_then(Value::as_str), Some("string"));
    }

    #[test]
    fn test_canonicalize_follows_bare_ref_chain() {
        let graph = sample_graph();
        let target = graph
            .canonicalize_ref("#/definitions/Pet", "#/definitions/TagAlias")
            .expect("chain resolves");
        assert_eq!(target, "#/definitions/Tag");
    }

    #[test]
    fn test_unresolved_ref_is_fatal() {
        let err = SchemaGraph::from_document(json!({
            "definitions": {
                "Pet": {
                    "type": "object",
                    "properties": {"tag": {"$ref": "#/definitions/Missing"}}
                }
            }
        }))
        .unwrap_err();
        match err {
            ModelgenError::UnresolvedRef { reference, .. } => {
                assert!(reference.contains("Missing"));
            }
            other => panic!("expected UnresolvedRef, got {:?}", other),
        }
    }

    #[test]
    fn test_pure_ref_loop_is_fatal() {
        let err = SchemaGraph::from_document(json!({
            "definitions": {
                "A": {"$ref": "#/definitions/B"},
                "B": {"$ref": "#/definitions/A"}
            }
        }))
        .unwrap_err();
        assert!(matches!(err, ModelgenError::RefChainLoop { .. }));
    }

    #[test]
    fn test_refs_between_definitions() {
        let graph = sample_graph();
        let outs = graph.refs_out("#/definitions/Pet");
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0], "#/definitions/Tag");

        let ins = graph.refs_in("#/definitions/Tag");
        assert_eq!(ins.len(), 3);
    }

    #[test]
    fn test_escaped_definition_name() {
        let graph = SchemaGraph::from_document(json!({
            "definitions": {
                "a/b": {"type": "string"}
            }
        }))
        .expect("valid document");
        let pointer = graph.definition("a/b").expect("definition exists");
        assert_eq!(pointer, "#/definitions/a~1b");
        assert!(graph.resolve_pointer(pointer).is_some());
    }

    #[test]
    fn test_empty_document_rejected() {
        let err = SchemaGraph::from_document(json!({"definitions": {}})).unwrap_err();
        assert!(matches!(err, ModelgenError::EmptyDocument { .. }));
    }
}
