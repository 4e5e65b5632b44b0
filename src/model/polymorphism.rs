//! Polymorphism Resolution
//!
//! For a discriminator-bearing base, builds a dispatch table mapping each
//! variant's discriminator value to its Model, with the base itself as the
//! fallback case. Dispatching an unknown value is an error carrying that
//! value; the table never silently defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::model::ModelId;

// =============================================================================
// Dispatch Table
// =============================================================================

/// One discriminator value and the Model it selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchCase {
    pub value: String,
    pub target: ModelId,
}

/// Discriminator-keyed dispatch for one polymorphic base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchTable {
    /// JSON key of the discriminator property
    pub discriminator: String,
    /// Variant cases, sorted by discriminator value
    pub cases: Vec<DispatchCase>,
    /// The base's own case, taken when a payload names the base itself
    pub fallback: DispatchCase,
}

impl DispatchTable {
    /// Select the Model a payload's discriminator value decodes into
    pub fn dispatch(&self, value: &str) -> Result<ModelId, UnknownVariant> {
        if let Some(case) = self.cases.iter().find(|c| c.value == value) {
            return Ok(case.target);
        }
        if self.fallback.value == value {
            return Ok(self.fallback.target);
        }
        Err(UnknownVariant {
            discriminator: self.discriminator.clone(),
            value: value.to_string(),
        })
    }

    /// Number of variant cases, excluding the base fallback
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }
}

/// Build a table from discovered cases; ordering is normalized here
pub fn build_table(
    discriminator: &str,
    fallback: DispatchCase,
    mut cases: Vec<DispatchCase>,
) -> DispatchTable {
    cases.sort_by(|a, b| a.value.cmp(&b.value));
    DispatchTable {
        discriminator: discriminator.to_string(),
        cases,
        fallback,
    }
}

/// Decode-time contract error: no case matched the payload's value
///
/// This is the error the emitted dispatch logic reports; the build itself
/// never raises it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub discriminator: String,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized discriminator value '{}' for '{}'",
            self.value, self.discriminator
        )
    }
}

impl std::error::Error for UnknownVariant {}

// =============================================================================
// Schema Inspection
// =============================================================================

/// The discriminator value a variant answers to: its definition name unless
/// overridden
pub fn discriminator_value(node: &Value, definition_name: &str) -> String {
    node.get("x-discriminator-value")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| definition_name.to_string())
}

/// Whether the base declares its discriminator as a required property
///
/// A gap here is recoverable: the engine injects an implicit required string
/// property and warns.
pub fn discriminator_declared(node: &Value, discriminator: &str) -> bool {
    let has_property = node
        .get("properties")
        .and_then(|p| p.get(discriminator))
        .is_some();
    let required = node
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().any(|v| v.as_str() == Some(discriminator)))
        .unwrap_or(false);
    has_property && required
}

/// A variant property that re-declares a base property byte-for-byte is
/// dropped in favor of the base's copy
pub fn redeclares_identically(base_node: &Value, key: &str, variant_prop: &Value) -> bool {
    base_node
        .get("properties")
        .and_then(|p| p.get(key))
        .map(|base_prop| base_prop == variant_prop)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(n: usize) -> ModelId {
        // handles are opaque outside the arena; round-trip through serde
        serde_json::from_value(json!(n)).unwrap()
    }

    fn shape_table() -> DispatchTable {
        build_table(
            "kind",
            DispatchCase {
                value: "Shape".to_string(),
                target: id(0),
            },
            vec![
                DispatchCase {
                    value: "square".to_string(),
                    target: id(2),
                },
                DispatchCase {
                    value: "circle".to_string(),
                    target: id(1),
                },
            ],
        )
    }

    #[test]
    fn test_cases_sorted_by_value() {
        let table = shape_table();
        assert_eq!(table.case_count(), 2);
        assert_eq!(table.cases[0].value, "circle");
        assert_eq!(table.cases[1].value, "square");
    }

    #[test]
    fn test_dispatch_hits_variant_and_fallback() {
        let table = shape_table();
        assert_eq!(table.dispatch("circle").unwrap(), id(1));
        assert_eq!(table.dispatch("square").unwrap(), id(2));
        assert_eq!(table.dispatch("Shape").unwrap(), id(0));
    }

    #[test]
    fn test_unknown_value_is_named_in_error() {
        let table = shape_table();
        let err = table.dispatch("triangle").unwrap_err();
        assert_eq!(err.value, "triangle");
        assert!(err.to_string().contains("'triangle'"));
    }

    #[test]
    fn test_discriminator_value_override() {
        let node = json!({"x-discriminator-value": "cat-v2"});
        assert_eq!(discriminator_value(&node, "Cat"), "cat-v2");
        assert_eq!(discriminator_value(&json!({}), "Cat"), "Cat");
    }

    #[test]
    fn test_discriminator_declared() {
        let sound = json!({
            "type": "object",
            "discriminator": "petType",
            "properties": {"petType": {"type": "string"}},
            "required": ["petType"]
        });
        assert!(discriminator_declared(&sound, "petType"));

        let missing_required = json!({
            "type": "object",
            "discriminator": "petType",
            "properties": {"petType": {"type": "string"}}
        });
        assert!(!discriminator_declared(&missing_required, "petType"));

        let missing_property = json!({
            "type": "object",
            "discriminator": "petType",
            "required": ["petType"]
        });
        assert!(!discriminator_declared(&missing_property, "petType"));
    }

    #[test]
    fn test_identical_redeclaration_detected() {
        let base = json!({
            "properties": {"name": {"type": "string", "minLength": 1}}
        });
        assert!(redeclares_identically(
            &base,
            "name",
            &json!({"type": "string", "minLength": 1})
        ));
        assert!(!redeclares_identically(
            &base,
            "name",
            &json!({"type": "string"})
        ));
        assert!(!redeclares_identically(&base, "other", &json!({"type": "string"})));
    }
}
