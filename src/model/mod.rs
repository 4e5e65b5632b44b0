//! Model Intermediate Representation
//!
//! The frozen output of the build: an arena of named Models addressed by
//! stable handle, each carrying Properties and derived validation Rules.
//! Models reference each other by handle only; the arena owns every Model,
//! so reference cycles are representable without ownership cycles.
//!
//! Everything here serializes, so the export binary can dump a build for an
//! external emitter.

pub mod engine;
pub mod naming;
pub mod polymorphism;
pub mod types;
pub mod validation;

pub use engine::{build, build_with_acronyms, BuildOutput, Mode};
pub use naming::{NameBranch, Namespace};
pub use polymorphism::{DispatchCase, DispatchTable};
pub use types::{ResolvedType, SemanticType};
pub use validation::{PathSegment, Rule, RuleKind, RulePath};

use serde::{Deserialize, Serialize};

use crate::graph::Pointer;

// =============================================================================
// Handles and Type References
// =============================================================================

/// Stable handle of a Model in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(usize);

impl ModelId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a Property's value is
///
/// Containers stay inline only while their element is trivial; anything with
/// properties or rules of its own is a Model handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeRef {
    /// Another Model, by non-owning handle
    Model(ModelId),
    /// Leaf semantic type
    Primitive(SemanticType),
    /// Inline homogeneous sequence
    Array(Box<TypeRef>),
    /// Inline free-form map
    Map(Box<TypeRef>),
    /// Accepts any value
    Any,
}

// =============================================================================
// Models
// =============================================================================

/// Structural category of a Model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelShape {
    /// Named properties; `overflow` is the additionalProperties value type
    Object { overflow: Option<TypeRef> },
    /// Standalone alias of a semantic type
    Alias { semantic: SemanticType },
    /// Promoted homogeneous sequence
    Array { element: TypeRef },
    /// Fixed positions live in `properties`; `tail` accepts overflow items
    Tuple { tail: Option<TypeRef> },
    /// Free-form keyed container
    Map { value: TypeRef },
    /// Named alias of another Model (a bare reference definition)
    Ref { target: ModelId },
    /// Composition kept as embeds; members in `composed_of`
    Composed,
    /// Discriminator-bearing polymorphic base; dispatch table attached
    Base,
    /// Polymorphic subtype; its base is the first entry in `composed_of`
    Variant,
    /// No constraints
    Opaque,
}

/// One named entity of the IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub name: String,
    pub shape: ModelShape,
    pub properties: Vec<Property>,
    /// Embedded member Models, in declaration order
    pub composed_of: Vec<ModelId>,
    /// Model-level rules (alias constraints, delegated member rules)
    pub validations: Vec<Rule>,
    pub is_nullable: bool,
    pub source_pointer: Pointer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Raw format string preserved on soft fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_hint: Option<String>,
    /// Present on `Base` Models only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchTable>,
}

impl Model {
    /// Empty placeholder filled in once the body is built; lets a Model be
    /// addressable before its own subtree finishes resolving
    pub fn placeholder(name: String, source_pointer: Pointer) -> Self {
        Self {
            name,
            shape: ModelShape::Opaque,
            properties: Vec::new(),
            composed_of: Vec::new(),
            validations: Vec::new(),
            is_nullable: false,
            source_pointer,
            title: None,
            description: None,
            format_hint: None,
            dispatch: None,
        }
    }

    pub fn property(&self, json_key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.json_key == json_key)
    }
}

/// A field of an Object (or a position of a Tuple) Model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Key as it appears on the wire
    pub json_key: String,
    /// Accessor identifier derived from the key
    pub accessor_name: String,
    /// Value type
    pub shape: TypeRef,
    pub required: bool,
    /// Optional representation: explicit nullability extension, or a
    /// default/readOnly marker tolerating absence
    pub nullable: bool,
    pub validations: Vec<Rule>,
    /// Validation path of this property relative to its owning Model
    pub path: String,
}

// =============================================================================
// Arena
// =============================================================================

/// Owns every Model; handles index into it
#[derive(Debug, Default)]
pub struct ModelArena {
    models: Vec<Model>,
}

impl ModelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a slot under a name before its body exists
    pub fn reserve(&mut self, name: impl Into<String>, source_pointer: impl Into<Pointer>) -> ModelId {
        let id = ModelId(self.models.len());
        self.models
            .push(Model::placeholder(name.into(), source_pointer.into()));
        id
    }

    pub fn fill(&mut self, id: ModelId, model: Model) {
        self.models[id.0] = model;
    }

    pub fn get(&self, id: ModelId) -> &Model {
        &self.models[id.0]
    }

    pub fn get_mut(&mut self, id: ModelId) -> &mut Model {
        &mut self.models[id.0]
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &Model)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }
}

// =============================================================================
// Frozen IR
// =============================================================================

/// The frozen Model IR, ordered by first encounter during traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIr {
    pub mode: Mode,
    pub models: Vec<Model>,
}

impl ModelIr {
    pub fn model(&self, id: ModelId) -> &Model {
        &self.models[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
