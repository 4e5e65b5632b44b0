//! Schema Shape Classification
//!
//! Assigns every resolved schema node exactly one shape variant from a closed
//! set. This is pure structural classification - no naming, no type lowering,
//! no validation derivation. The model-building engine branches on the result
//! with exhaustive matches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Pointer, SchemaGraph};

// =============================================================================
// Scalar Kinds
// =============================================================================

/// Raw scalar type as declared by the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Swagger's upload type; lowered to a binary stream
    File,
}

impl ScalarKind {
    pub fn from_type_str(type_str: &str) -> Option<Self> {
        match type_str {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::File => "file",
        }
    }
}

// =============================================================================
// Shape Variants
// =============================================================================

/// The closed set of shape variants
///
/// `classify` never returns `PolymorphicVariant` - recognizing a variant
/// requires resolving its allOf members against the graph, which
/// `classify_resolved` does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Scalar with an optional format tag; `scalar: None` means an enum (or
    /// constraint set) declared without a type
    Primitive {
        scalar: Option<ScalarKind>,
        format: Option<String>,
    },
    /// Primitive with a declared semantic format, nameable as an alias type
    FormattedAlias { scalar: ScalarKind, format: String },
    /// Homogeneous sequence; the item schema lives under `items`
    Array,
    /// Fixed-arity heterogeneous sequence with optional overflow tail
    Tuple { arity: usize, has_tail: bool },
    /// Free-form keyed container: additionalProperties without declared
    /// properties
    Map,
    /// Named properties, optionally with an overflow value schema
    Object { has_overflow: bool },
    /// allOf aggregation of two or more member shapes
    Composed { members: usize },
    /// Discriminator-bearing base type
    PolymorphicBase { discriminator: String },
    /// Subtype composing a discriminator-bearing base
    PolymorphicVariant { base: Pointer },
    /// No constraints at all; accepts any value
    Opaque,
    /// More than one declared raw type (schema-author error, treated as
    /// Opaque downstream)
    MultiType { types: Vec<String> },
}

impl Shape {
    /// Coarse family tag used for graph export coloring
    pub fn family(&self) -> &'static str {
        match self {
            Self::Object { .. } => "object",
            Self::Composed { .. } => "composed",
            Self::PolymorphicBase { .. } | Self::PolymorphicVariant { .. } => "polymorphic",
            Self::Array => "array",
            Self::Tuple { .. } => "tuple",
            Self::Map => "map",
            Self::FormattedAlias { .. } => "alias",
            Self::Primitive { .. } | Self::Opaque | Self::MultiType { .. } => "primitive",
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Metadata-only keys that do not make a schema constrained
const METADATA_KEYS: &[&str] = &[
    "title",
    "description",
    "example",
    "examples",
    "$schema",
    "$id",
    "id",
    "default",
    "readOnly",
];

/// Classify a resolved schema node into exactly one shape variant
///
/// Decision precedence, first match wins:
/// enum without type, multiple raw types, discriminator, allOf, object with
/// properties, object with only a value schema, array (single or positional
/// items), formatted scalar, plain scalar, unconstrained.
pub fn classify(node: &Value) -> Shape {
    let Some(obj) = node.as_object() else {
        // `true` / `{}` schema forms accept anything
        return Shape::Opaque;
    };

    let declared_types = declared_types(node);
    let format = obj.get("format").and_then(Value::as_str);

    // enum with no declared type: value-enum over arbitrary literals
    if obj.contains_key("enum") && declared_types.is_empty() {
        return Shape::Primitive {
            scalar: None,
            format: None,
        };
    }

    if declared_types.len() > 1 {
        return Shape::MultiType {
            types: declared_types,
        };
    }
    let type_str = declared_types.first().map(String::as_str);

    if let Some(discriminator) = obj.get("discriminator").and_then(Value::as_str) {
        return Shape::PolymorphicBase {
            discriminator: discriminator.to_string(),
        };
    }

    if let Some(members) = obj.get("allOf").and_then(Value::as_array) {
        return Shape::Composed {
            members: members.len(),
        };
    }

    let has_properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| !p.is_empty())
        .unwrap_or(false);
    let overflow = matches!(obj.get("additionalProperties"), Some(Value::Object(_)))
        || matches!(obj.get("additionalProperties"), Some(Value::Bool(true)));

    if has_properties && matches!(type_str, None | Some("object")) {
        return Shape::Object {
            has_overflow: overflow,
        };
    }

    if matches!(type_str, None | Some("object")) && overflow && !has_properties {
        return Shape::Map;
    }

    if type_str == Some("array") || obj.contains_key("items") {
        return match obj.get("items") {
            Some(Value::Array(positions)) => Shape::Tuple {
                arity: positions.len(),
                has_tail: matches!(obj.get("additionalItems"), Some(Value::Object(_)))
                    || matches!(obj.get("additionalItems"), Some(Value::Bool(true))),
            },
            _ => Shape::Array,
        };
    }

    if let (Some(t), Some(f)) = (type_str, format) {
        if let Some(scalar) = ScalarKind::from_type_str(t) {
            if matches!(
                scalar,
                ScalarKind::String | ScalarKind::Integer | ScalarKind::Number
            ) && !f.is_empty()
            {
                return Shape::FormattedAlias {
                    scalar,
                    format: f.to_string(),
                };
            }
        }
    }

    if let Some(t) = type_str {
        return Shape::Primitive {
            scalar: ScalarKind::from_type_str(t),
            format: format.map(String::from),
        };
    }

    // No type at all: either truly unconstrained, or a typeless constraint set
    if is_unconstrained(obj) {
        Shape::Opaque
    } else {
        Shape::Primitive {
            scalar: None,
            format: format.map(String::from),
        }
    }
}

/// Classify with graph context, recognizing polymorphic variants
///
/// A Composed node whose allOf references a discriminator-bearing definition
/// is that base's variant.
pub fn classify_resolved(node: &Value, pointer: &str, graph: &SchemaGraph) -> Shape {
    let shape = classify(node);
    if let Shape::Composed { .. } = shape {
        if let Some(base) = variant_base(node, pointer, graph) {
            return Shape::PolymorphicVariant { base };
        }
    }
    shape
}

/// The discriminator-bearing base a Composed node's allOf references, if any
pub fn variant_base(node: &Value, pointer: &str, graph: &SchemaGraph) -> Option<Pointer> {
    let members = node.get("allOf")?.as_array()?;
    for member in members {
        let Some(reference) = member.get("$ref").and_then(Value::as_str) else {
            continue;
        };
        let Ok(target) = graph.canonicalize_ref(pointer, reference) else {
            continue;
        };
        let Some(target_node) = graph.resolve_pointer(&target) else {
            continue;
        };
        if matches!(classify(target_node), Shape::PolymorphicBase { .. }) {
            return Some(target);
        }
    }
    None
}

/// The declared raw type(s) of a node: `type` may be a string or an array
fn declared_types(node: &Value) -> Vec<String> {
    match node.get("type") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

/// True when nothing but metadata and extensions constrain the node
fn is_unconstrained(obj: &serde_json::Map<String, Value>) -> bool {
    obj.keys()
        .all(|k| METADATA_KEYS.contains(&k.as_str()) || k.starts_with("x-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaGraph;
    use serde_json::json;

    #[test]
    fn test_plain_scalars() {
        assert_eq!(
            classify(&json!({"type": "string"})),
            Shape::Primitive {
                scalar: Some(ScalarKind::String),
                format: None
            }
        );
        assert_eq!(
            classify(&json!({"type": "boolean"})),
            Shape::Primitive {
                scalar: Some(ScalarKind::Boolean),
                format: None
            }
        );
    }

    #[test]
    fn test_formatted_scalar_is_alias() {
        assert_eq!(
            classify(&json!({"type": "string", "format": "date"})),
            Shape::FormattedAlias {
                scalar: ScalarKind::String,
                format: "date".to_string()
            }
        );
        assert_eq!(
            classify(&json!({"type": "integer", "format": "int32"})),
            Shape::FormattedAlias {
                scalar: ScalarKind::Integer,
                format: "int32".to_string()
            }
        );
    }

    #[test]
    fn test_formatted_boolean_stays_primitive() {
        assert_eq!(
            classify(&json!({"type": "boolean", "format": "checkbox"})),
            Shape::Primitive {
                scalar: Some(ScalarKind::Boolean),
                format: Some("checkbox".to_string())
            }
        );
    }

    #[test]
    fn test_object_with_properties() {
        let shape = classify(&json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        }));
        assert_eq!(shape, Shape::Object { has_overflow: false });
    }

    #[test]
    fn test_object_with_overflow() {
        let shape = classify(&json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "additionalProperties": {"type": "integer"}
        }));
        assert_eq!(shape, Shape::Object { has_overflow: true });
    }

    #[test]
    fn test_map_classification() {
        // additionalProperties with no sibling properties is a map
        let shape = classify(&json!({
            "type": "object",
            "additionalProperties": {"type": "string", "format": "date"}
        }));
        assert_eq!(shape, Shape::Map);
    }

    #[test]
    fn test_free_form_map() {
        assert_eq!(
            classify(&json!({"type": "object", "additionalProperties": true})),
            Shape::Map
        );
    }

    #[test]
    fn test_bare_object_is_empty_object() {
        assert_eq!(
            classify(&json!({"type": "object"})),
            Shape::Object { has_overflow: false }
        );
    }

    #[test]
    fn test_array_single_items() {
        assert_eq!(
            classify(&json!({"type": "array", "items": {"type": "string"}})),
            Shape::Array
        );
    }

    #[test]
    fn test_tuple_with_tail() {
        let shape = classify(&json!({
            "type": "array",
            "items": [{"type": "string"}, {"type": "integer"}],
            "additionalItems": {"type": "boolean"}
        }));
        assert_eq!(
            shape,
            Shape::Tuple {
                arity: 2,
                has_tail: true
            }
        );
    }

    #[test]
    fn test_tuple_without_tail() {
        let shape = classify(&json!({
            "type": "array",
            "items": [{"type": "string"}, {"type": "integer"}],
            "additionalItems": false
        }));
        assert_eq!(
            shape,
            Shape::Tuple {
                arity: 2,
                has_tail: false
            }
        );
    }

    #[test]
    fn test_multi_type_warning_shape() {
        let shape = classify(&json!({"type": ["string", "integer"]}));
        assert_eq!(
            shape,
            Shape::MultiType {
                types: vec!["string".to_string(), "integer".to_string()]
            }
        );
    }

    #[test]
    fn test_enum_without_type() {
        assert_eq!(
            classify(&json!({"enum": ["a", 1, true]})),
            Shape::Primitive {
                scalar: None,
                format: None
            }
        );
    }

    #[test]
    fn test_opaque() {
        assert_eq!(classify(&json!({})), Shape::Opaque);
        assert_eq!(classify(&json!({"description": "anything"})), Shape::Opaque);
        assert_eq!(classify(&json!(true)), Shape::Opaque);
    }

    #[test]
    fn test_typeless_constraints_are_primitive() {
        assert_eq!(
            classify(&json!({"minLength": 2})),
            Shape::Primitive {
                scalar: None,
                format: None
            }
        );
    }

    #[test]
    fn test_composed() {
        let shape = classify(&json!({
            "allOf": [
                {"$ref": "#/definitions/A"},
                {"properties": {"b": {"type": "string"}}}
            ]
        }));
        assert_eq!(shape, Shape::Composed { members: 2 });
    }

    #[test]
    fn test_polymorphic_base() {
        let shape = classify(&json!({
            "type": "object",
            "discriminator": "petType",
            "properties": {"petType": {"type": "string"}},
            "required": ["petType"]
        }));
        assert_eq!(
            shape,
            Shape::PolymorphicBase {
                discriminator: "petType".to_string()
            }
        );
    }

    #[test]
    fn test_polymorphic_variant_needs_graph() {
        let graph = SchemaGraph::from_document(json!({
            "definitions": {
                "Pet": {
                    "type": "object",
                    "discriminator": "petType",
                    "properties": {"petType": {"type": "string"}},
                    "required": ["petType"]
                },
                "Cat": {
                    "allOf": [
                        {"$ref": "#/definitions/Pet"},
                        {"type": "object", "properties": {"purrs": {"type": "boolean"}}}
                    ]
                }
            }
        }))
        .expect("valid document");

        let cat = graph.resolve_pointer("#/definitions/Cat").unwrap().clone();
        let shape = classify_resolved(&cat, "#/definitions/Cat", &graph);
        assert_eq!(
            shape,
            Shape::PolymorphicVariant {
                base: "#/definitions/Pet".to_string()
            }
        );

        // Without graph context it is just a composition
        assert_eq!(classify(&cat), Shape::Composed { members: 2 });
    }
}
