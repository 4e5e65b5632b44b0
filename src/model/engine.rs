//! Flatten/Expand Engine
//!
//! Rewrites the resolved schema graph into the Model IR under one of two
//! policies. Flatten hoists every nested schema that needs a type of its
//! own to a top-level named Model and merges safely-mergeable allOf
//! compositions. Expand inlines referenced schemas at each use site
//! instead, trading duplication for the absence of indirection.
//!
//! The builder is single-threaded on purpose: names must be reserved in
//! traversal order for collision handling to be deterministic, and cycle
//! detection rides on one consistent in-progress set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelgenError, Result};
use crate::graph::{
    classify, classify_resolved, escape_token, unescape_token, Diagnostics, Pointer, ScalarKind,
    SchemaGraph, Shape,
};
use crate::model::naming::{accessor_ident, NameBranch, Namespace};
use crate::model::polymorphism::{self, DispatchCase};
use crate::model::types::{self, SemanticType};
use crate::model::validation::{self, Rule, RuleKind, RulePath};
use crate::model::{Model, ModelArena, ModelId, ModelIr, ModelShape, Property, TypeRef};

// =============================================================================
// Mode
// =============================================================================

/// Normalization policy, selected once per generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Flatten,
    Expand,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flatten => "flatten",
            Self::Expand => "expand",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ModelgenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flatten" => Ok(Self::Flatten),
            "expand" => Ok(Self::Expand),
            other => Err(ModelgenError::UnknownMode(other.to_string())),
        }
    }
}

// =============================================================================
// Entry Points
// =============================================================================

/// A finished build: the frozen IR plus everything worth telling the user
#[derive(Debug)]
pub struct BuildOutput {
    pub ir: ModelIr,
    pub diagnostics: Diagnostics,
}

/// Build the Model IR for a resolved graph
pub fn build(graph: &SchemaGraph, mode: Mode) -> Result<BuildOutput> {
    build_with_acronyms(graph, mode, &crate::config::default_acronyms())
}

/// Build with a custom acronym list for name casing
pub fn build_with_acronyms(
    graph: &SchemaGraph,
    mode: Mode,
    acronyms: &[String],
) -> Result<BuildOutput> {
    Builder::new(graph, mode, acronyms).run()
}

// =============================================================================
// Builder
// =============================================================================

/// One resolution site: the raw name material and canonical pointer of a
/// sub-schema encountered while building a Model
struct Site {
    /// Words the Model name derives from, should this site need one
    base: String,
    /// Memo key; also the diagnostic pointer for anything found here
    pointer: Pointer,
    branch: NameBranch,
}

/// Property collection state shared across the members of one object body
#[derive(Default)]
struct ObjectAccumulator {
    properties: Vec<Property>,
    /// Keys already emitted; later identical redeclarations are dropped
    seen_keys: HashSet<String>,
    accessors: HashSet<String>,
    anon_seq: usize,
}

/// One allOf member with its reference target resolved
struct ComposedMember<'g> {
    index: usize,
    /// Canonical target pointer when the member is a reference
    target: Option<Pointer>,
    node: &'g Value,
}

struct Builder<'g> {
    graph: &'g SchemaGraph,
    mode: Mode,
    namespace: Namespace,
    arena: ModelArena,
    diagnostics: Diagnostics,
    /// Pointer -> Model handle for everything already claimed: definitions
    /// and hoisted anonymous nodes alike
    resolved: HashMap<Pointer, ModelId>,
    /// Definitions currently mid-build; hitting one again is a cycle
    in_progress: HashSet<Pointer>,
}

impl<'g> Builder<'g> {
    fn new(graph: &'g SchemaGraph, mode: Mode, acronyms: &[String]) -> Self {
        Self {
            graph,
            mode,
            namespace: Namespace::new(acronyms),
            arena: ModelArena::new(),
            diagnostics: Diagnostics::new(),
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    fn run(mut self) -> Result<BuildOutput> {
        let definitions: Vec<(String, Pointer)> = self
            .graph
            .definitions()
            .map(|(name, pointer)| (name.to_string(), pointer.clone()))
            .collect();

        for (name, pointer) in &definitions {
            self.ensure_definition(name, pointer)?;
        }
        self.wire_dispatch(&definitions)?;

        tracing::debug!(
            mode = %self.mode,
            models = self.arena.len(),
            diagnostics = self.diagnostics.len(),
            "model build complete"
        );

        Ok(BuildOutput {
            ir: ModelIr {
                mode: self.mode,
                models: self.arena.into_models(),
            },
            diagnostics: self.diagnostics,
        })
    }

    fn node_at(&self, pointer: &str) -> Result<&'g Value> {
        let graph = self.graph;
        graph
            .resolve_pointer(pointer)
            .ok_or_else(|| ModelgenError::UnresolvedRef {
                pointer: pointer.to_string(),
                reference: pointer.to_string(),
            })
    }

    fn definition_name(&self, pointer: &Pointer) -> String {
        self.graph
            .name_of(pointer)
            .map(String::from)
            .unwrap_or_else(|| last_pointer_token(pointer))
    }

    // ========== Definitions ==========

    /// Model for a top-level definition, building it on first demand
    fn ensure_definition(&mut self, name: &str, pointer: &Pointer) -> Result<ModelId> {
        if let Some(&id) = self.resolved.get(pointer) {
            return Ok(id);
        }

        let claimed = self.namespace.claim(pointer, name, NameBranch::Definition)?;
        if claimed.used_placeholder {
            self.diagnostics
                .name_placeholder(pointer.clone(), name, &claimed.name);
        }

        let id = self.arena.reserve(claimed.name.clone(), pointer.clone());
        self.resolved.insert(pointer.clone(), id);
        self.in_progress.insert(pointer.clone());

        let node = self.node_at(pointer)?;
        let model = self.build_model(id, &claimed.name, pointer, node)?;
        self.arena.fill(id, model);

        self.in_progress.remove(pointer);
        Ok(id)
    }

    // ========== Model Bodies ==========

    fn build_model(
        &mut self,
        id: ModelId,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
    ) -> Result<Model> {
        let mut model = Model::placeholder(name.to_string(), pointer.clone());
        model.title = text_field(node, "title");
        model.description = text_field(node, "description");
        model.is_nullable = validation::explicit_nullable(node);

        // A bare reference definition aliases (or, expanding, copies) its
        // target
        if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
            return self.build_reference_alias(model, id, name, pointer, reference);
        }

        match classify_resolved(node, pointer, self.graph) {
            Shape::Object { has_overflow } => {
                let mut acc = ObjectAccumulator::default();
                self.collect_object_member(&mut acc, name, pointer, node)?;
                let mut overflow = None;
                if has_overflow {
                    let (value, rules) = self.overflow_value(name, pointer, node)?;
                    overflow = value;
                    model.validations = rules;
                }
                model.properties = acc.properties;
                model.shape = ModelShape::Object { overflow };
            }
            Shape::Map => self.build_map(&mut model, name, pointer, node)?,
            Shape::Array => self.build_array(&mut model, name, pointer, node)?,
            Shape::Tuple { arity, has_tail } => {
                self.build_tuple(&mut model, name, pointer, node, arity, has_tail)?;
            }
            Shape::Composed { .. } => self.build_composed(&mut model, name, pointer, node)?,
            Shape::PolymorphicBase { discriminator } => {
                self.build_base(&mut model, name, pointer, node, &discriminator)?;
            }
            Shape::PolymorphicVariant { base } => {
                self.build_variant(&mut model, name, pointer, node, &base)?;
            }
            Shape::FormattedAlias { scalar, format } => {
                self.build_alias(&mut model, pointer, node, Some(scalar), Some(&format));
            }
            Shape::Primitive { scalar, format } => {
                self.build_alias(&mut model, pointer, node, scalar, format.as_deref());
            }
            Shape::Opaque => {
                model.shape = ModelShape::Opaque;
            }
            Shape::MultiType { types } => {
                self.diagnostics.multi_type(pointer.clone(), &types);
                model.shape = ModelShape::Opaque;
            }
        }

        Ok(model)
    }

    fn build_reference_alias(
        &mut self,
        mut model: Model,
        id: ModelId,
        name: &str,
        pointer: &Pointer,
        reference: &str,
    ) -> Result<Model> {
        let target = self.graph.canonicalize_ref(pointer, reference)?;
        let target_def = self
            .graph
            .owning_definition(&target)
            .unwrap_or_else(|| target.clone());

        match self.mode {
            Mode::Flatten => {
                let target_name = self.definition_name(&target_def);
                let target_id = self.ensure_definition(&target_name, &target_def)?;
                model.shape = ModelShape::Ref { target: target_id };
                Ok(model)
            }
            Mode::Expand => {
                if self.in_progress.contains(&target_def) {
                    tracing::debug!(
                        pointer = %pointer,
                        target = %target_def,
                        "reference cycle, keeping named reference"
                    );
                    let target_name = self.definition_name(&target_def);
                    let target_id = self.ensure_definition(&target_name, &target_def)?;
                    model.shape = ModelShape::Ref { target: target_id };
                    return Ok(model);
                }
                let target_node = self.node_at(&target)?;
                self.in_progress.insert(target_def.clone());
                let copied = self.build_model(id, name, pointer, target_node);
                self.in_progress.remove(&target_def);
                copied
            }
        }
    }

    // ========== Objects ==========

    /// Fold one object body's properties into the accumulator; later
    /// members of a merge skip keys the first declarer already emitted
    fn collect_object_member(
        &mut self,
        acc: &mut ObjectAccumulator,
        owner_name: &str,
        member_pointer: &str,
        member_node: &'g Value,
    ) -> Result<()> {
        let required = required_set(member_node);
        if let Some(props) = member_node.get("properties").and_then(Value::as_object) {
            for (key, prop_node) in props {
                if !acc.seen_keys.insert(key.clone()) {
                    continue;
                }
                let property = self.build_property(
                    owner_name,
                    member_pointer,
                    key,
                    prop_node,
                    required.contains(key.as_str()),
                    acc,
                )?;
                acc.properties.push(property);
            }
        }
        Ok(())
    }

    /// Like `collect_object_member`, but drops properties the variant
    /// redeclares identically from its base
    fn collect_variant_member(
        &mut self,
        acc: &mut ObjectAccumulator,
        owner_name: &str,
        member_pointer: &str,
        member_node: &'g Value,
        base_node: &'g Value,
    ) -> Result<()> {
        let required = required_set(member_node);
        if let Some(props) = member_node.get("properties").and_then(Value::as_object) {
            for (key, prop_node) in props {
                if polymorphism::redeclares_identically(base_node, key, prop_node) {
                    continue;
                }
                if !acc.seen_keys.insert(key.clone()) {
                    continue;
                }
                let property = self.build_property(
                    owner_name,
                    member_pointer,
                    key,
                    prop_node,
                    required.contains(key.as_str()),
                    acc,
                )?;
                acc.properties.push(property);
            }
        }
        Ok(())
    }

    fn build_property(
        &mut self,
        owner_name: &str,
        member_pointer: &str,
        key: &str,
        prop_node: &'g Value,
        declared_required: bool,
        acc: &mut ObjectAccumulator,
    ) -> Result<Property> {
        let ordinal = acc.anon_seq;
        acc.anon_seq += 1;

        let site = Site {
            base: format!("{} {}", owner_name, key),
            pointer: format!("{}/properties/{}", member_pointer, escape_token(key)),
            branch: NameBranch::Anonymous(ordinal),
        };
        let shape = self.resolve_site(&site, prop_node)?;

        let path = RulePath::root().key(key);
        let (constraints_node, constraints_pointer) = if matches!(shape, TypeRef::Model(_)) {
            (prop_node, site.pointer.clone())
        } else {
            self.rules_source(&site.pointer, prop_node)
        };
        let mut validations = validation::derive_rules(
            constraints_node,
            &path,
            declared_required,
            &constraints_pointer,
            &mut self.diagnostics,
        );
        if matches!(shape, TypeRef::Model(_)) {
            // constraints live on the referenced Model; membership is all
            // that remains here
            validations.retain(|r| matches!(r.kind, RuleKind::Required));
        } else {
            self.inline_container_rules(
                constraints_node,
                &shape,
                &path,
                &constraints_pointer,
                &mut validations,
            );
        }

        let nullable = validation::explicit_nullable(constraints_node)
            || validation::absence_tolerated(constraints_node);

        Ok(Property {
            json_key: key.to_string(),
            accessor_name: unique_accessor(key, &mut acc.accessors),
            shape,
            required: declared_required,
            nullable,
            validations,
            path: path.render(),
        })
    }

    /// Type and rules of an object's overflow value schema
    fn overflow_value(
        &mut self,
        owner_name: &str,
        pointer: &str,
        node: &'g Value,
    ) -> Result<(Option<TypeRef>, Vec<Rule>)> {
        let Some(values) = node.get("additionalProperties") else {
            return Ok((None, Vec::new()));
        };
        if !values.is_object() {
            return Ok((Some(TypeRef::Any), Vec::new()));
        }

        let site = Site {
            base: format!("{} Value", owner_name),
            pointer: format!("{}/additionalProperties", pointer),
            branch: NameBranch::Anonymous(0),
        };
        let shape = self.resolve_site(&site, values)?;

        let mut rules = Vec::new();
        if !matches!(shape, TypeRef::Model(_)) {
            let (rules_node, rules_pointer) = self.rules_source(&site.pointer, values);
            let path = RulePath::root().key_var();
            rules = validation::derive_rules(
                rules_node,
                &path,
                false,
                &rules_pointer,
                &mut self.diagnostics,
            );
            self.inline_container_rules(rules_node, &shape, &path, &rules_pointer, &mut rules);
        }
        Ok((Some(shape), rules))
    }

    // ========== Site Resolution ==========

    /// Type a sub-schema, hoisting or inlining per the mode
    fn resolve_site(&mut self, site: &Site, node: &'g Value) -> Result<TypeRef> {
        if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
            return self.resolve_reference_site(site, reference);
        }

        match classify(node) {
            Shape::Primitive { scalar, format } => Ok(TypeRef::Primitive(self.leaf_type(
                &site.pointer,
                scalar,
                format.as_deref(),
            ))),
            Shape::FormattedAlias { scalar, format } => Ok(TypeRef::Primitive(self.leaf_type(
                &site.pointer,
                Some(scalar),
                Some(&format),
            ))),
            Shape::Opaque => Ok(TypeRef::Any),
            Shape::MultiType { types } => {
                self.diagnostics.multi_type(site.pointer.clone(), &types);
                Ok(TypeRef::Any)
            }
            Shape::Array => {
                if inline_composite(node.get("items")) {
                    // the element carries structure of its own, so the
                    // sequence is hoisted and owns the element rules
                    return self.promote(site, node).map(TypeRef::Model);
                }
                let element = match node.get("items") {
                    Some(items) if items.is_object() => {
                        let element_site = Site {
                            base: site.base.clone(),
                            pointer: format!("{}/items", site.pointer),
                            branch: NameBranch::Items(0),
                        };
                        self.resolve_site(&element_site, items)?
                    }
                    _ => TypeRef::Any,
                };
                Ok(TypeRef::Array(Box::new(element)))
            }
            Shape::Map => {
                if inline_composite(node.get("additionalProperties")) {
                    return self.promote(site, node).map(TypeRef::Model);
                }
                let value = match node.get("additionalProperties") {
                    Some(values) if values.is_object() => {
                        let value_site = Site {
                            base: format!("{} Value", site.base),
                            pointer: format!("{}/additionalProperties", site.pointer),
                            branch: NameBranch::Anonymous(0),
                        };
                        self.resolve_site(&value_site, values)?
                    }
                    _ => TypeRef::Any,
                };
                Ok(TypeRef::Map(Box::new(value)))
            }
            Shape::Object { .. }
            | Shape::Tuple { .. }
            | Shape::Composed { .. }
            | Shape::PolymorphicBase { .. }
            | Shape::PolymorphicVariant { .. } => self.promote(site, node).map(TypeRef::Model),
        }
    }

    fn resolve_reference_site(&mut self, site: &Site, reference: &str) -> Result<TypeRef> {
        let target = self.graph.canonicalize_ref(&site.pointer, reference)?;
        let target_def = self
            .graph
            .owning_definition(&target)
            .unwrap_or_else(|| target.clone());

        match self.mode {
            Mode::Flatten => {
                if let Some(name) = self.graph.name_of(&target) {
                    let name = name.to_string();
                    Ok(TypeRef::Model(self.ensure_definition(&name, &target)?))
                } else {
                    // reference into the middle of a definition; hoist the
                    // target node once and share it between referrers
                    let node = self.node_at(&target)?;
                    let nested_site = Site {
                        base: nested_target_base(self.graph, &target, &target_def),
                        pointer: target.clone(),
                        branch: NameBranch::Anonymous(0),
                    };
                    self.resolve_site(&nested_site, node)
                }
            }
            Mode::Expand => {
                if self.in_progress.contains(&target_def) {
                    tracing::debug!(
                        site = %site.pointer,
                        target = %target_def,
                        "reference cycle, keeping named reference"
                    );
                    let name = self.definition_name(&target_def);
                    return Ok(TypeRef::Model(self.ensure_definition(&name, &target_def)?));
                }
                let node = self.node_at(&target)?;
                self.in_progress.insert(target_def.clone());
                // the copy keeps the use site's pointer, so every site gets
                // its own independently named copy
                let copied = self.resolve_site(site, node);
                self.in_progress.remove(&target_def);
                copied
            }
        }
    }

    /// The node whose constraint keywords apply at a site. Under expand a
    /// bare reference dissolves into its target, and the target's
    /// constraints come with it.
    fn rules_source(&self, site_pointer: &str, node: &'g Value) -> (&'g Value, Pointer) {
        let graph = self.graph;
        if self.mode == Mode::Expand {
            if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
                if let Ok(target) = graph.canonicalize_ref(site_pointer, reference) {
                    if let Some(target_node) = graph.resolve_pointer(&target) {
                        return (target_node, target);
                    }
                }
            }
        }
        (node, site_pointer.to_string())
    }

    fn leaf_type(
        &mut self,
        pointer: &str,
        scalar: Option<ScalarKind>,
        format: Option<&str>,
    ) -> SemanticType {
        let Some(scalar) = scalar else {
            return SemanticType::Any;
        };
        let resolved = types::resolve(scalar, format);
        if let Some(hint) = &resolved.format_hint {
            self.diagnostics
                .unknown_format(pointer.to_string(), hint, resolved.semantic.as_str());
        }
        resolved.semantic
    }

    /// Hoist an anonymous node to a named Model, memoized per pointer
    fn promote(&mut self, site: &Site, node: &'g Value) -> Result<ModelId> {
        if let Some(&id) = self.resolved.get(&site.pointer) {
            return Ok(id);
        }

        let claimed = self.namespace.claim(&site.pointer, &site.base, site.branch)?;
        if claimed.used_placeholder {
            self.diagnostics
                .name_placeholder(site.pointer.clone(), &site.base, &claimed.name);
        }

        let id = self.arena.reserve(claimed.name.clone(), site.pointer.clone());
        self.resolved.insert(site.pointer.clone(), id);

        let model = self.build_model(id, &claimed.name, &site.pointer, node)?;
        self.arena.fill(id, model);
        Ok(id)
    }

    /// Rules for the contents of an inline container, one path fragment
    /// per nesting level
    fn inline_container_rules(
        &mut self,
        node: &'g Value,
        shape: &TypeRef,
        path: &RulePath,
        pointer: &str,
        rules: &mut Vec<Rule>,
    ) {
        match shape {
            TypeRef::Array(element) => {
                if let Some(items) = node.get("items").filter(|v| v.is_object()) {
                    let element_path = path.index_var();
                    let element_pointer = format!("{}/items", pointer);
                    let (rules_node, rules_pointer) = self.rules_source(&element_pointer, items);
                    rules.extend(validation::derive_rules(
                        rules_node,
                        &element_path,
                        false,
                        &rules_pointer,
                        &mut self.diagnostics,
                    ));
                    self.inline_container_rules(
                        rules_node,
                        element,
                        &element_path,
                        &rules_pointer,
                        rules,
                    );
                }
            }
            TypeRef::Map(value) => {
                if let Some(values) = node.get("additionalProperties").filter(|v| v.is_object()) {
                    let value_path = path.key_var();
                    let value_pointer = format!("{}/additionalProperties", pointer);
                    let (rules_node, rules_pointer) = self.rules_source(&value_pointer, values);
                    rules.extend(validation::derive_rules(
                        rules_node,
                        &value_path,
                        false,
                        &rules_pointer,
                        &mut self.diagnostics,
                    ));
                    self.inline_container_rules(
                        rules_node,
                        value,
                        &value_path,
                        &rules_pointer,
                        rules,
                    );
                }
            }
            _ => {}
        }
    }

    // ========== Containers ==========

    fn build_map(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
    ) -> Result<()> {
        let mut rules = validation::derive_rules(
            node,
            &RulePath::root(),
            false,
            pointer,
            &mut self.diagnostics,
        );

        let value = match node.get("additionalProperties") {
            Some(values) if values.is_object() => {
                let site = Site {
                    base: format!("{} Value", name),
                    pointer: format!("{}/additionalProperties", pointer),
                    branch: NameBranch::Anonymous(0),
                };
                let shape = self.resolve_site(&site, values)?;
                if !matches!(shape, TypeRef::Model(_)) {
                    let (rules_node, rules_pointer) = self.rules_source(&site.pointer, values);
                    let value_path = RulePath::root().key_var();
                    rules.extend(validation::derive_rules(
                        rules_node,
                        &value_path,
                        false,
                        &rules_pointer,
                        &mut self.diagnostics,
                    ));
                    self.inline_container_rules(
                        rules_node,
                        &shape,
                        &value_path,
                        &rules_pointer,
                        &mut rules,
                    );
                }
                shape
            }
            _ => TypeRef::Any,
        };

        model.validations = rules;
        model.shape = ModelShape::Map { value };
        Ok(())
    }

    fn build_array(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
    ) -> Result<()> {
        let mut rules = validation::derive_rules(
            node,
            &RulePath::root(),
            false,
            pointer,
            &mut self.diagnostics,
        );

        let element = match node.get("items") {
            Some(items) if items.is_object() => {
                let site = Site {
                    base: name.to_string(),
                    pointer: format!("{}/items", pointer),
                    branch: NameBranch::Items(0),
                };
                let shape = self.resolve_site(&site, items)?;
                if !matches!(shape, TypeRef::Model(_)) {
                    let (rules_node, rules_pointer) = self.rules_source(&site.pointer, items);
                    let element_path = RulePath::root().index_var();
                    rules.extend(validation::derive_rules(
                        rules_node,
                        &element_path,
                        false,
                        &rules_pointer,
                        &mut self.diagnostics,
                    ));
                    self.inline_container_rules(
                        rules_node,
                        &shape,
                        &element_path,
                        &rules_pointer,
                        &mut rules,
                    );
                }
                shape
            }
            _ => TypeRef::Any,
        };

        model.validations = rules;
        model.shape = ModelShape::Array { element };
        Ok(())
    }

    fn build_tuple(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
        arity: usize,
        has_tail: bool,
    ) -> Result<()> {
        let mut model_rules = validation::derive_rules(
            node,
            &RulePath::root(),
            false,
            pointer,
            &mut self.diagnostics,
        );

        let positions: Vec<&'g Value> = node
            .get("items")
            .and_then(Value::as_array)
            .map(|a| a.iter().collect())
            .unwrap_or_default();

        let mut properties = Vec::with_capacity(arity);
        for (i, pos_node) in positions.into_iter().enumerate() {
            let site = Site {
                base: name.to_string(),
                pointer: format!("{}/items/{}", pointer, i),
                branch: NameBranch::TuplePosition(i),
            };
            let shape = self.resolve_site(&site, pos_node)?;

            // fixed arity implies presence of every position
            let path = RulePath::root().index(i);
            let (constraints_node, constraints_pointer) = if matches!(shape, TypeRef::Model(_)) {
                (pos_node, site.pointer.clone())
            } else {
                self.rules_source(&site.pointer, pos_node)
            };
            let mut validations = validation::derive_rules(
                constraints_node,
                &path,
                true,
                &constraints_pointer,
                &mut self.diagnostics,
            );
            if matches!(shape, TypeRef::Model(_)) {
                validations.retain(|r| matches!(r.kind, RuleKind::Required));
            } else {
                self.inline_container_rules(
                    constraints_node,
                    &shape,
                    &path,
                    &constraints_pointer,
                    &mut validations,
                );
            }

            properties.push(Property {
                json_key: i.to_string(),
                accessor_name: format!("p{}", i),
                shape,
                required: true,
                nullable: validation::explicit_nullable(pos_node),
                validations,
                path: path.render(),
            });
        }

        let tail = if has_tail {
            match node.get("additionalItems") {
                Some(tail_node) if tail_node.is_object() => {
                    let site = Site {
                        base: name.to_string(),
                        pointer: format!("{}/additionalItems", pointer),
                        branch: NameBranch::Items(arity),
                    };
                    let shape = self.resolve_site(&site, tail_node)?;
                    if !matches!(shape, TypeRef::Model(_)) {
                        let (rules_node, rules_pointer) =
                            self.rules_source(&site.pointer, tail_node);
                        let tail_path = RulePath::root().tail_var(arity);
                        model_rules.extend(validation::derive_rules(
                            rules_node,
                            &tail_path,
                            false,
                            &rules_pointer,
                            &mut self.diagnostics,
                        ));
                        self.inline_container_rules(
                            rules_node,
                            &shape,
                            &tail_path,
                            &rules_pointer,
                            &mut model_rules,
                        );
                    }
                    Some(shape)
                }
                _ => Some(TypeRef::Any),
            }
        } else {
            None
        };

        model.properties = properties;
        model.validations = model_rules;
        model.shape = ModelShape::Tuple { tail };
        Ok(())
    }

    // ========== Composition ==========

    fn build_composed(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
    ) -> Result<()> {
        let mut members = Vec::new();
        if let Some(entries) = node.get("allOf").and_then(Value::as_array) {
            for (i, entry) in entries.iter().enumerate() {
                if let Some(reference) = entry.get("$ref").and_then(Value::as_str) {
                    let target = self.graph.canonicalize_ref(pointer, reference)?;
                    let resolved = self.node_at(&target)?;
                    members.push(ComposedMember {
                        index: i,
                        target: Some(target),
                        node: resolved,
                    });
                } else {
                    members.push(ComposedMember {
                        index: i,
                        target: None,
                        node: entry,
                    });
                }
            }
        }

        let all_flat = members.iter().all(|m| {
            matches!(
                classify(m.node),
                Shape::Object { .. } | Shape::FormattedAlias { .. }
            )
        });
        let conflict = find_merge_conflict(&members);
        if let Some((key, left, right)) = &conflict {
            self.diagnostics
                .merge_conflict(pointer.clone(), key, left, right);
        }

        if all_flat && conflict.is_none() {
            self.merge_members(model, name, pointer, &members)
        } else {
            self.embed_members(model, name, pointer, &members)
        }
    }

    /// Safe composition: one flat Object with the union of all members
    fn merge_members(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        members: &[ComposedMember<'g>],
    ) -> Result<()> {
        let mut acc = ObjectAccumulator::default();
        let mut model_rules = Vec::new();
        let mut overflow = None;

        for member in members {
            let (owner, member_pointer) = match &member.target {
                Some(target) => (self.definition_name(target), target.clone()),
                None => (
                    name.to_string(),
                    format!("{}/allOf/{}", pointer, member.index),
                ),
            };
            match classify(member.node) {
                Shape::Object { has_overflow } => {
                    self.collect_object_member(&mut acc, &owner, &member_pointer, member.node)?;
                    if overflow.is_none() && has_overflow {
                        let (value, mut rules) =
                            self.overflow_value(&owner, &member_pointer, member.node)?;
                        overflow = value;
                        model_rules.append(&mut rules);
                    }
                }
                _ => {
                    // a formatted branch folds its own rules into the whole
                    model_rules.extend(validation::derive_rules(
                        member.node,
                        &RulePath::root(),
                        false,
                        &member_pointer,
                        &mut self.diagnostics,
                    ));
                }
            }
        }

        model.properties = acc.properties;
        model.validations = model_rules;
        model.shape = ModelShape::Object { overflow };
        Ok(())
    }

    /// Unsafe composition: keep members as named embeds and delegate
    /// validation to each in declaration order
    fn embed_members(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        members: &[ComposedMember<'g>],
    ) -> Result<()> {
        let mut composed_ids = Vec::with_capacity(members.len());
        for member in members {
            let id = match &member.target {
                Some(target) => {
                    if self.graph.name_of(target).is_some() {
                        let target_name = self.definition_name(target);
                        self.ensure_definition(&target_name, target)?
                    } else {
                        let def = self
                            .graph
                            .owning_definition(target)
                            .unwrap_or_else(|| target.clone());
                        let site = Site {
                            base: nested_target_base(self.graph, target, &def),
                            pointer: target.clone(),
                            branch: NameBranch::Anonymous(0),
                        };
                        self.promote(&site, member.node)?
                    }
                }
                None => {
                    let site = Site {
                        base: name.to_string(),
                        pointer: format!("{}/allOf/{}", pointer, member.index),
                        branch: NameBranch::AllOf(member.index),
                    };
                    self.promote(&site, member.node)?
                }
            };
            composed_ids.push(id);
        }

        let mut rules = Vec::new();
        for &id in &composed_ids {
            rules.extend(self.arena.get(id).validations.iter().cloned());
        }

        model.composed_of = composed_ids;
        model.validations = rules;
        model.shape = ModelShape::Composed;
        Ok(())
    }

    // ========== Polymorphism ==========

    fn build_base(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
        discriminator: &str,
    ) -> Result<()> {
        let mut acc = ObjectAccumulator::default();
        self.collect_object_member(&mut acc, name, pointer, node)?;
        if overflow_declared(node) {
            let (_, rules) = self.overflow_value(name, pointer, node)?;
            model.validations = rules;
        }

        if !polymorphism::discriminator_declared(node, discriminator) {
            self.diagnostics
                .discriminator_gap(pointer.clone(), discriminator);
            let path = RulePath::root().key(discriminator);
            if let Some(existing) = acc
                .properties
                .iter_mut()
                .find(|p| p.json_key == discriminator)
            {
                existing.required = true;
                if !existing
                    .validations
                    .iter()
                    .any(|r| matches!(r.kind, RuleKind::Required))
                {
                    existing
                        .validations
                        .insert(0, Rule::new(&path, RuleKind::Required));
                }
            } else {
                acc.properties.push(Property {
                    json_key: discriminator.to_string(),
                    accessor_name: accessor_ident(discriminator),
                    shape: TypeRef::Primitive(SemanticType::String),
                    required: true,
                    nullable: false,
                    validations: vec![Rule::new(&path, RuleKind::Required)],
                    path: path.render(),
                });
            }
        }

        model.properties = acc.properties;
        model.shape = ModelShape::Base;
        Ok(())
    }

    fn build_variant(
        &mut self,
        model: &mut Model,
        name: &str,
        pointer: &Pointer,
        node: &'g Value,
        base: &Pointer,
    ) -> Result<()> {
        // the base link stays a named reference in both modes; inlining it
        // would lose the dispatch relationship
        let base_name = self.definition_name(base);
        let base_id = self.ensure_definition(&base_name, base)?;
        let base_node = self.node_at(base)?;

        let mut composed_ids = vec![base_id];
        let mut acc = ObjectAccumulator::default();

        if let Some(entries) = node.get("allOf").and_then(Value::as_array) {
            for (i, entry) in entries.iter().enumerate() {
                if let Some(reference) = entry.get("$ref").and_then(Value::as_str) {
                    let target = self.graph.canonicalize_ref(pointer, reference)?;
                    if target == *base {
                        continue;
                    }
                    let target_name = self.definition_name(&target);
                    let id = self.ensure_definition(&target_name, &target)?;
                    composed_ids.push(id);
                } else if matches!(classify(entry), Shape::Object { .. }) {
                    let member_pointer = format!("{}/allOf/{}", pointer, i);
                    self.collect_variant_member(&mut acc, name, &member_pointer, entry, base_node)?;
                } else {
                    let site = Site {
                        base: name.to_string(),
                        pointer: format!("{}/allOf/{}", pointer, i),
                        branch: NameBranch::AllOf(i),
                    };
                    let id = self.promote(&site, entry)?;
                    composed_ids.push(id);
                }
            }
        }

        model.properties = acc.properties;
        model.composed_of = composed_ids;
        model.shape = ModelShape::Variant;
        Ok(())
    }

    /// Dispatch tables are wired after every definition exists, so each
    /// case can point at its finished variant Model
    fn wire_dispatch(&mut self, definitions: &[(String, Pointer)]) -> Result<()> {
        for (name, pointer) in definitions {
            let node = self.node_at(pointer)?;
            let Shape::PolymorphicBase { discriminator } = classify(node) else {
                continue;
            };
            let base_id = self.ensure_definition(name, pointer)?;

            let composers: Vec<Pointer> = self
                .graph
                .composers_of(pointer)
                .into_iter()
                .cloned()
                .collect();

            let mut cases = Vec::new();
            for variant_pointer in &composers {
                let variant_node = self.node_at(variant_pointer)?;
                match classify_resolved(variant_node, variant_pointer, self.graph) {
                    Shape::PolymorphicVariant { base } if base == *pointer => {}
                    _ => continue,
                }
                let variant_name = self.definition_name(variant_pointer);
                let variant_id = self.ensure_definition(&variant_name, variant_pointer)?;
                cases.push(DispatchCase {
                    value: polymorphism::discriminator_value(variant_node, &variant_name),
                    target: variant_id,
                });
            }

            let fallback = DispatchCase {
                value: polymorphism::discriminator_value(node, name),
                target: base_id,
            };
            let table = polymorphism::build_table(&discriminator, fallback, cases);
            tracing::debug!(
                base = %name,
                discriminator = %discriminator,
                variants = table.case_count(),
                "dispatch table wired"
            );
            self.arena.get_mut(base_id).dispatch = Some(table);
        }
        Ok(())
    }

    // ========== Leaves ==========

    fn build_alias(
        &mut self,
        model: &mut Model,
        pointer: &Pointer,
        node: &'g Value,
        scalar: Option<ScalarKind>,
        format: Option<&str>,
    ) {
        let semantic = match scalar {
            Some(scalar) => {
                let resolved = types::resolve(scalar, format);
                if let Some(hint) = &resolved.format_hint {
                    self.diagnostics
                        .unknown_format(pointer.clone(), hint, resolved.semantic.as_str());
                    model.format_hint = Some(hint.clone());
                }
                resolved.semantic
            }
            None => SemanticType::Any,
        };

        model.validations = validation::derive_rules(
            node,
            &RulePath::root(),
            false,
            pointer,
            &mut self.diagnostics,
        );
        model.shape = ModelShape::Alias { semantic };
    }
}

// =============================================================================
// Node Inspection
// =============================================================================

/// Whether a container's child schema needs a Model of its own (so the
/// container is hoisted rather than kept inline)
fn inline_composite(child: Option<&Value>) -> bool {
    let Some(child) = child else {
        return false;
    };
    if !child.is_object() || child.get("$ref").is_some() {
        return false;
    }
    match classify(child) {
        Shape::Object { .. }
        | Shape::Tuple { .. }
        | Shape::Composed { .. }
        | Shape::PolymorphicBase { .. }
        | Shape::PolymorphicVariant { .. } => true,
        Shape::Array => inline_composite(child.get("items")),
        Shape::Map => inline_composite(child.get("additionalProperties")),
        _ => false,
    }
}

fn overflow_declared(node: &Value) -> bool {
    match node.get("additionalProperties") {
        Some(Value::Bool(allowed)) => *allowed,
        Some(value) => value.is_object(),
        None => false,
    }
}

/// First property two members both declare with differing schemas, if any
fn find_merge_conflict<'g>(members: &[ComposedMember<'g>]) -> Option<(String, String, String)> {
    let mut seen: HashMap<&'g str, &'g Value> = HashMap::new();
    for member in members {
        let Some(props) = member.node.get("properties").and_then(Value::as_object) else {
            continue;
        };
        for (key, prop) in props {
            match seen.get(key.as_str()) {
                Some(first) if *first != prop => {
                    return Some((key.clone(), type_label(first), type_label(prop)));
                }
                Some(_) => {}
                None => {
                    seen.insert(key.as_str(), prop);
                }
            }
        }
    }
    None
}

fn type_label(node: &Value) -> String {
    if let Some(t) = node.get("type").and_then(Value::as_str) {
        return t.to_string();
    }
    if node.get("$ref").is_some() {
        return "reference".to_string();
    }
    classify(node).family().to_string()
}

fn text_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(String::from)
}

fn required_set(node: &Value) -> HashSet<&str> {
    node.get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn unique_accessor(key: &str, seen: &mut HashSet<String>) -> String {
    let base = accessor_ident(key);
    if seen.insert(base.clone()) {
        return base;
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{}_{}", base, counter);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Name material for a reference into the middle of a definition: the
/// owning definition's name plus the structural path tokens
fn nested_target_base(graph: &SchemaGraph, target: &str, target_def: &str) -> String {
    let def_name = graph.name_of(target_def).unwrap_or("");
    let tail = target.strip_prefix(target_def).unwrap_or(target);

    let mut parts = vec![def_name.to_string()];
    for token in tail.split('/').filter(|t| !t.is_empty()) {
        if matches!(
            token,
            "properties" | "items" | "additionalProperties" | "additionalItems" | "allOf"
        ) {
            continue;
        }
        parts.push(unescape_token(token));
    }
    parts.join(" ")
}

fn last_pointer_token(pointer: &str) -> String {
    pointer
        .rsplit('/')
        .next()
        .map(unescape_token)
        .unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
