//! Validation Rule Derivation
//!
//! Converts constraint keywords on a schema node into an ordered list of
//! Rules, each carrying the path string an emitter will report failures
//! against. Emission order is fixed: required, then format/pattern/length,
//! then numeric bounds, then collection bounds, then enum. Absent keywords
//! emit nothing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::graph::{Diagnostics, ScalarKind};
use crate::model::types;

// =============================================================================
// Rule Paths
// =============================================================================

/// One step in a validation path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object property access by literal key
    Key(String),
    /// Tuple position, a literal numeral
    Index(usize),
    /// Array iteration variable; depth 1 renders `i`, depth 2 `ii`
    IndexVar(usize),
    /// Map iteration key variable; depth 1 renders `k`, depth 2 `kk`
    KeyVar(usize),
    /// Tuple tail position: fixed arity plus the loop variable, `2+i`
    TailVar { offset: usize, depth: usize },
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(n) => write!(f, "{}", n),
            Self::IndexVar(depth) => f.write_str(&"i".repeat(*depth)),
            Self::KeyVar(depth) => f.write_str(&"k".repeat(*depth)),
            Self::TailVar { offset, depth } => {
                write!(f, "{}+{}", offset, "i".repeat(*depth))
            }
        }
    }
}

/// A composable validation path
///
/// Segments join with a literal `.`; loop-variable depths are derived from
/// how many enclosing iterations the path already carries, so nested
/// containers get distinct variables (`i`, `ii`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulePath {
    segments: Vec<PathSegment>,
}

impl RulePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: &str) -> Self {
        self.child(PathSegment::Key(key.to_string()))
    }

    /// Literal tuple position
    pub fn index(&self, n: usize) -> Self {
        self.child(PathSegment::Index(n))
    }

    /// Next array loop variable at this nesting depth
    pub fn index_var(&self) -> Self {
        self.child(PathSegment::IndexVar(self.array_depth() + 1))
    }

    /// Next map key variable at this nesting depth
    pub fn key_var(&self) -> Self {
        self.child(PathSegment::KeyVar(self.map_depth() + 1))
    }

    /// Tuple tail positions, numbered from the fixed arity
    pub fn tail_var(&self, arity: usize) -> Self {
        self.child(PathSegment::TailVar {
            offset: arity,
            depth: self.array_depth() + 1,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    fn array_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::IndexVar(_) | PathSegment::TailVar { .. }))
            .count()
    }

    fn map_depth(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::KeyVar(_)))
            .count()
    }
}

impl fmt::Display for RulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

// =============================================================================
// Rules
// =============================================================================

/// Rule kind with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "params")]
pub enum RuleKind {
    Required,
    MinLength(u64),
    MaxLength(u64),
    Pattern(String),
    Minimum(f64),
    Maximum(f64),
    ExclusiveMinimum(f64),
    ExclusiveMaximum(f64),
    MultipleOf(f64),
    MinItems(u64),
    MaxItems(u64),
    UniqueItems,
    Enum(Vec<Value>),
    Format(String),
}

/// A single validation operation bound to a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub path: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl Rule {
    pub fn new(path: &RulePath, kind: RuleKind) -> Self {
        Self {
            path: path.render(),
            kind,
        }
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// Whether a schema-level default or readOnly marker makes absence
/// non-fatal for this property
pub fn absence_tolerated(node: &Value) -> bool {
    node.get("default").is_some()
        || node.get("readOnly").and_then(Value::as_bool).unwrap_or(false)
}

/// Explicit nullability extension on a node
pub fn explicit_nullable(node: &Value) -> bool {
    node.get("x-nullable")
        .or_else(|| node.get("x-isnullable"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Derive the ordered rule list for one schema node
///
/// `required` is the containing object's declaration for this property;
/// pass false for nodes that are not object properties. Container recursion
/// is the engine's job; this only reads the flat keywords present here.
pub fn derive_rules(
    node: &Value,
    path: &RulePath,
    required: bool,
    pointer: &str,
    diagnostics: &mut Diagnostics,
) -> Vec<Rule> {
    let mut rules = Vec::new();
    let Some(obj) = node.as_object() else {
        return rules;
    };

    // required, unless a default/readOnly makes absence non-fatal
    if required {
        let tolerated = absence_tolerated(node);
        if tolerated && explicit_nullable(node) && obj.contains_key("default") {
            diagnostics.ambiguous_nullable(pointer, &path.render());
        }
        if !tolerated {
            rules.push(Rule::new(path, RuleKind::Required));
        }
    }

    // format, when the table knows it; degraded formats stay hints
    let resolved = resolved_scalar(obj);
    if let Some(format) = obj.get("format").and_then(Value::as_str) {
        if let Some(r) = &resolved {
            if r.format_hint.is_none() && !matches!(r.semantic, types::SemanticType::Stream) {
                rules.push(Rule::new(path, RuleKind::Format(format.to_string())));
            }
        }
    }

    // length and pattern are meaningless when the format dictates syntax
    let syntax_implied = resolved
        .as_ref()
        .map(|r| r.format_hint.is_none() && r.semantic.implies_own_syntax())
        .unwrap_or(false);
    if syntax_implied
        && (obj.contains_key("pattern")
            || obj.contains_key("minLength")
            || obj.contains_key("maxLength"))
    {
        tracing::debug!(
            pointer = pointer,
            "length/pattern constraints dropped, format dictates syntax"
        );
    }
    if !syntax_implied {
        if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
            match regex::Regex::new(pattern) {
                Ok(_) => rules.push(Rule::new(path, RuleKind::Pattern(pattern.to_string()))),
                Err(err) => diagnostics.invalid_pattern(pointer, pattern, &err.to_string()),
            }
        }
        if let Some(n) = obj.get("minLength").and_then(Value::as_u64) {
            rules.push(Rule::new(path, RuleKind::MinLength(n)));
        }
        if let Some(n) = obj.get("maxLength").and_then(Value::as_u64) {
            rules.push(Rule::new(path, RuleKind::MaxLength(n)));
        }
    }

    // numeric bounds; a draft-4 boolean exclusivity marker converts the
    // bound's kind, a bare numeric exclusive bound stands alone
    if let Some(min) = obj.get("minimum").and_then(Value::as_f64) {
        if bool_keyword(obj, "exclusiveMinimum") {
            rules.push(Rule::new(path, RuleKind::ExclusiveMinimum(min)));
        } else {
            rules.push(Rule::new(path, RuleKind::Minimum(min)));
        }
    } else if let Some(min) = obj.get("exclusiveMinimum").and_then(Value::as_f64) {
        rules.push(Rule::new(path, RuleKind::ExclusiveMinimum(min)));
    }
    if let Some(max) = obj.get("maximum").and_then(Value::as_f64) {
        if bool_keyword(obj, "exclusiveMaximum") {
            rules.push(Rule::new(path, RuleKind::ExclusiveMaximum(max)));
        } else {
            rules.push(Rule::new(path, RuleKind::Maximum(max)));
        }
    } else if let Some(max) = obj.get("exclusiveMaximum").and_then(Value::as_f64) {
        rules.push(Rule::new(path, RuleKind::ExclusiveMaximum(max)));
    }
    if let Some(m) = obj.get("multipleOf").and_then(Value::as_f64) {
        if m > 0.0 {
            rules.push(Rule::new(path, RuleKind::MultipleOf(m)));
        }
    }

    // collection bounds
    if let Some(n) = obj.get("minItems").and_then(Value::as_u64) {
        rules.push(Rule::new(path, RuleKind::MinItems(n)));
    }
    if let Some(n) = obj.get("maxItems").and_then(Value::as_u64) {
        rules.push(Rule::new(path, RuleKind::MaxItems(n)));
    }
    if obj
        .get("uniqueItems")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        rules.push(Rule::new(path, RuleKind::UniqueItems));
    }

    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        rules.push(Rule::new(path, RuleKind::Enum(values.clone())));
    }

    rules
}

fn bool_keyword(obj: &serde_json::Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn resolved_scalar(obj: &serde_json::Map<String, Value>) -> Option<types::ResolvedType> {
    let type_str = obj.get("type").and_then(Value::as_str)?;
    let scalar = ScalarKind::from_type_str(type_str)?;
    let format = obj.get("format").and_then(Value::as_str);
    Some(types::resolve(scalar, format))
}
