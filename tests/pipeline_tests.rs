//! End-to-End Pipeline Tests
//!
//! Loads fixture documents through the real loader, resolves them into a
//! reference graph, and builds the Model IR in both normalization modes.
//! Each section pins one externally observable contract of the pipeline.

use std::path::{Path, PathBuf};

use serde_json::Value;

use modelgen::graph::{load_input, DiagnosticCode, LoadConfig};
use modelgen::model::{ModelShape, Property, RuleKind, SemanticType, TypeRef};
use modelgen::{build, Diagnostics, Mode, ModelIr, SchemaGraph};

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn build_fixture(raw: &str, mode: Mode) -> (ModelIr, Diagnostics) {
    let doc: Value = serde_json::from_str(raw).unwrap();
    let graph = SchemaGraph::from_document(doc).unwrap();
    let output = build(&graph, mode).unwrap();
    (output.ir, output.diagnostics)
}

fn petstore(mode: Mode) -> (ModelIr, Diagnostics) {
    let doc = load_input(&fixtures_dir().join("petstore"), &LoadConfig::default()).unwrap();
    let graph = SchemaGraph::from_document(doc).unwrap();
    let output = build(&graph, mode).unwrap();
    (output.ir, output.diagnostics)
}

fn model_index(ir: &ModelIr, name: &str) -> usize {
    ir.models
        .iter()
        .position(|m| m.name == name)
        .unwrap_or_else(|| panic!("no model named '{}'", name))
}

fn names(ir: &ModelIr) -> Vec<&str> {
    ir.models.iter().map(|m| m.name.as_str()).collect()
}

fn rule_kinds(property: &Property) -> Vec<RuleKind> {
    property.validations.iter().map(|r| r.kind.clone()).collect()
}

/// Unwrap a property's shape as a Model handle index
fn handle(property: &Property) -> usize {
    match &property.shape {
        TypeRef::Model(id) => id.index(),
        other => panic!("expected a model handle, got {:?}", other),
    }
}

// =============================================================================
// Directory Loading
// =============================================================================

#[test]
fn test_petstore_directory_merges_and_builds_clean() {
    let doc = load_input(&fixtures_dir().join("petstore"), &LoadConfig::default()).unwrap();

    // cross-file references are rewritten to local canonical form
    assert_eq!(
        doc.pointer("/definitions/Order/properties/pet/$ref")
            .and_then(Value::as_str),
        Some("#/definitions/Pet")
    );
    assert_eq!(
        doc.pointer("/definitions/Pet/properties/id/$ref")
            .and_then(Value::as_str),
        Some("#/definitions/Id")
    );

    let graph = SchemaGraph::from_document(doc).unwrap();
    assert_eq!(graph.definition_count(), 4);

    for mode in [Mode::Flatten, Mode::Expand] {
        let output = build(&graph, mode).unwrap();
        assert!(
            output.diagnostics.is_empty(),
            "{} build should be clean:\n{}",
            mode,
            output.diagnostics.format_all()
        );
    }
}

// =============================================================================
// Flatten Mode
// =============================================================================

#[test]
fn test_flatten_model_set_and_encounter_order() {
    let (ir, _) = petstore(Mode::Flatten);

    assert_eq!(
        names(&ir),
        [
            "ID",
            "Order",
            "Pet",
            "PetAddress",
            "PetTags",
            "PetTagsItems0",
            "Timestamp"
        ]
    );
}

#[test]
fn test_flatten_shares_named_references() {
    let (ir, _) = petstore(Mode::Flatten);

    let order = ir.by_name("Order").unwrap();
    let pet = order.property("pet").unwrap();
    assert_eq!(handle(pet), model_index(&ir, "Pet"));
    assert!(pet.required);
    // membership is the only rule kept at the use site
    assert_eq!(rule_kinds(pet), vec![RuleKind::Required]);

    let ship_date = order.property("shipDate").unwrap();
    assert_eq!(handle(ship_date), model_index(&ir, "Timestamp"));
    assert!(ship_date.validations.is_empty());

    // the referenced alias carries its own constraints at the root path
    let timestamp = ir.by_name("Timestamp").unwrap();
    assert!(matches!(
        timestamp.shape,
        ModelShape::Alias {
            semantic: SemanticType::DateTime
        }
    ));
    assert_eq!(timestamp.validations.len(), 1);
    assert_eq!(timestamp.validations[0].path, "");
    assert_eq!(
        timestamp.validations[0].kind,
        RuleKind::Format("date-time".to_string())
    );

    let id = ir.by_name("ID").unwrap();
    assert!(matches!(
        id.shape,
        ModelShape::Alias {
            semantic: SemanticType::Int64
        }
    ));
    assert_eq!(
        id.validations.iter().map(|r| r.kind.clone()).collect::<Vec<_>>(),
        vec![
            RuleKind::Format("int64".to_string()),
            RuleKind::Minimum(1.0)
        ]
    );
}

#[test]
fn test_flatten_hoists_nested_object_to_shared_model() {
    let (ir, _) = petstore(Mode::Flatten);

    let pet = ir.by_name("Pet").unwrap();
    let address = pet.property("address").unwrap();
    assert_eq!(handle(address), model_index(&ir, "PetAddress"));

    let hoisted = ir.by_name("PetAddress").unwrap();
    assert!(matches!(hoisted.shape, ModelShape::Object { overflow: None }));
    let city = hoisted.property("city").unwrap();
    assert_eq!(
        rule_kinds(city),
        vec![RuleKind::Required, RuleKind::MinLength(1)]
    );
    assert_eq!(city.path, "city");
    assert_eq!(hoisted.property("street").unwrap().accessor_name, "street");
}

#[test]
fn test_property_rules_follow_declaration_paths() {
    let (ir, _) = petstore(Mode::Flatten);
    let pet = ir.by_name("Pet").unwrap();

    let name = pet.property("name").unwrap();
    assert_eq!(
        rule_kinds(name),
        vec![
            RuleKind::Required,
            RuleKind::MinLength(1),
            RuleKind::MaxLength(64)
        ]
    );
    assert!(name.validations.iter().all(|r| r.path == "name"));

    // element constraints land one index variable deep
    let photos = pet.property("photoUrls").unwrap();
    assert_eq!(photos.accessor_name, "photo_urls");
    assert!(matches!(
        photos.shape,
        TypeRef::Array(ref element) if **element == TypeRef::Primitive(SemanticType::Uri)
    ));
    assert_eq!(
        photos
            .validations
            .iter()
            .map(|r| (r.path.as_str(), r.kind.clone()))
            .collect::<Vec<_>>(),
        vec![
            ("photoUrls", RuleKind::Required),
            ("photoUrls", RuleKind::MaxItems(20)),
            ("photoUrls.i", RuleKind::Format("uri".to_string())),
        ]
    );

    // map value constraints land on the key variable
    let attributes = pet.property("attributes").unwrap();
    assert!(matches!(
        attributes.shape,
        TypeRef::Map(ref value) if **value == TypeRef::Primitive(SemanticType::String)
    ));
    assert_eq!(
        attributes
            .validations
            .iter()
            .map(|r| (r.path.as_str(), r.kind.clone()))
            .collect::<Vec<_>>(),
        vec![("attributes.k", RuleKind::MaxLength(128))]
    );

    let order = ir.by_name("Order").unwrap();
    let quantity = order.property("quantity").unwrap();
    assert!(!quantity.required);
    assert!(quantity.nullable, "a default tolerates absence");
    assert_eq!(
        rule_kinds(quantity),
        vec![
            RuleKind::Format("int32".to_string()),
            RuleKind::Minimum(1.0),
            RuleKind::Maximum(100.0)
        ]
    );

    let status = order.property("status").unwrap();
    assert_eq!(
        rule_kinds(status),
        vec![RuleKind::Enum(vec![
            Value::from("placed"),
            Value::from("approved"),
            Value::from("delivered")
        ])]
    );
}

#[test]
fn test_array_of_objects_promotes_sequence_and_element() {
    let (ir, _) = petstore(Mode::Flatten);

    let pet = ir.by_name("Pet").unwrap();
    let tags = pet.property("tags").unwrap();
    assert_eq!(handle(tags), model_index(&ir, "PetTags"));

    let sequence = ir.by_name("PetTags").unwrap();
    match &sequence.shape {
        ModelShape::Array { element } => match element {
            TypeRef::Model(id) => assert_eq!(id.index(), model_index(&ir, "PetTagsItems0")),
            other => panic!("expected element handle, got {:?}", other),
        },
        other => panic!("expected array shape, got {:?}", other),
    }
    assert!(sequence.validations.is_empty());

    let element = ir.by_name("PetTagsItems0").unwrap();
    let label = element.property("label").unwrap();
    assert_eq!(
        rule_kinds(label),
        vec![RuleKind::Pattern("^[a-z]+$".to_string())]
    );
}

// =============================================================================
// Expand Mode
// =============================================================================

#[test]
fn test_expand_copies_references_per_use_site() {
    let (ir, _) = petstore(Mode::Expand);

    assert_eq!(
        names(&ir),
        [
            "ID",
            "Order",
            "OrderPet",
            "OrderPetAddress",
            "OrderPetTags",
            "OrderPetTagsItems0",
            "Pet",
            "PetAddress",
            "PetTags",
            "PetTagsItems0",
            "Timestamp"
        ]
    );

    let order = ir.by_name("Order").unwrap();
    assert_eq!(handle(order.property("pet").unwrap()), model_index(&ir, "OrderPet"));

    // the copy mirrors the definition it was expanded from
    let copy = ir.by_name("OrderPet").unwrap();
    let original = ir.by_name("Pet").unwrap();
    let copy_keys: Vec<&str> = copy.properties.iter().map(|p| p.json_key.as_str()).collect();
    let original_keys: Vec<&str> = original
        .properties
        .iter()
        .map(|p| p.json_key.as_str())
        .collect();
    assert_eq!(copy_keys, original_keys);
    assert_eq!(
        copy.property("name").unwrap().validations,
        original.property("name").unwrap().validations
    );
}

#[test]
fn test_expand_inlines_scalar_aliases_with_their_constraints() {
    let (ir, _) = petstore(Mode::Expand);

    // the alias dissolves into its semantic type; its constraints move to
    // the use site's path
    let pet = ir.by_name("Pet").unwrap();
    let id = pet.property("id").unwrap();
    assert_eq!(id.shape, TypeRef::Primitive(SemanticType::Int64));
    assert_eq!(
        id.validations
            .iter()
            .map(|r| (r.path.as_str(), r.kind.clone()))
            .collect::<Vec<_>>(),
        vec![
            ("id", RuleKind::Format("int64".to_string())),
            ("id", RuleKind::Minimum(1.0)),
        ]
    );

    let order = ir.by_name("Order").unwrap();
    let ship_date = order.property("shipDate").unwrap();
    assert_eq!(ship_date.shape, TypeRef::Primitive(SemanticType::DateTime));
    assert_eq!(
        rule_kinds(ship_date),
        vec![RuleKind::Format("date-time".to_string())]
    );
}

#[test]
fn test_modes_agree_on_inline_scalar_properties() {
    let (flat, _) = petstore(Mode::Flatten);
    let (exp, _) = petstore(Mode::Expand);

    let flat_pet = flat.by_name("Pet").unwrap();
    let exp_pet = exp.by_name("Pet").unwrap();
    for key in ["name", "photoUrls", "attributes"] {
        assert_eq!(
            flat_pet.property(key).unwrap().validations,
            exp_pet.property(key).unwrap().validations,
            "rules for '{}' should not depend on the mode",
            key
        );
    }
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn test_flatten_represents_cycles_as_handles() {
    let (ir, diagnostics) =
        build_fixture(include_str!("fixtures/recursive.json"), Mode::Flatten);
    assert!(diagnostics.is_empty());
    assert_eq!(names(&ir), ["Department", "Employee", "TreeNode"]);

    let tree = ir.by_name("TreeNode").unwrap();
    let children = tree.property("children").unwrap();
    match &children.shape {
        TypeRef::Array(element) => match element.as_ref() {
            TypeRef::Model(id) => assert_eq!(id.index(), model_index(&ir, "TreeNode")),
            other => panic!("expected self handle, got {:?}", other),
        },
        other => panic!("expected array, got {:?}", other),
    }

    let employee = ir.by_name("Employee").unwrap();
    assert_eq!(
        handle(employee.property("department").unwrap()),
        model_index(&ir, "Department")
    );
}

#[test]
fn test_expand_keeps_named_references_inside_cycles() {
    let (ir, diagnostics) =
        build_fixture(include_str!("fixtures/recursive.json"), Mode::Expand);
    assert!(diagnostics.is_empty());
    assert_eq!(
        names(&ir),
        ["Department", "DepartmentHead", "Employee", "TreeNode"]
    );

    // the head property got its own copy, but the cycle back into
    // Department stays a named reference instead of expanding forever
    let head = ir.by_name("DepartmentHead").unwrap();
    assert_eq!(
        handle(head.property("department").unwrap()),
        model_index(&ir, "Department")
    );
    match &head.property("reports").unwrap().shape {
        TypeRef::Array(element) => match element.as_ref() {
            TypeRef::Model(id) => assert_eq!(id.index(), model_index(&ir, "Employee")),
            other => panic!("expected named element handle, got {:?}", other),
        },
        other => panic!("expected array, got {:?}", other),
    }

    let tree = ir.by_name("TreeNode").unwrap();
    match &tree.property("children").unwrap().shape {
        TypeRef::Array(element) => match element.as_ref() {
            TypeRef::Model(id) => assert_eq!(id.index(), model_index(&ir, "TreeNode")),
            other => panic!("expected self handle, got {:?}", other),
        },
        other => panic!("expected array, got {:?}", other),
    }
}

// =============================================================================
// Composition
// =============================================================================

#[test]
fn test_disjoint_members_merge_into_flat_object() {
    for mode in [Mode::Flatten, Mode::Expand] {
        let (ir, diagnostics) =
            build_fixture(include_str!("fixtures/compositions.json"), mode);

        let document = ir.by_name("Document").unwrap();
        assert!(matches!(document.shape, ModelShape::Object { overflow: None }));
        assert!(document.composed_of.is_empty());
        let keys: Vec<&str> = document
            .properties
            .iter()
            .map(|p| p.json_key.as_str())
            .collect();
        assert_eq!(keys, ["createdAt", "createdBy", "title"]);
        assert_eq!(
            rule_kinds(document.property("title").unwrap()),
            vec![RuleKind::Required, RuleKind::MinLength(1)]
        );
        assert!(ir.by_name("DocumentAllOf0").is_none());

        assert_eq!(
            diagnostics
                .all()
                .iter()
                .filter(|d| d.code == DiagnosticCode::MergeConflict)
                .count(),
            1,
            "only the conflicted composition should warn in {} mode",
            mode
        );
    }
}

#[test]
fn test_conflicting_members_fall_back_to_embedding() {
    let (ir, diagnostics) =
        build_fixture(include_str!("fixtures/compositions.json"), Mode::Flatten);

    let conflicted = ir.by_name("Conflicted").unwrap();
    assert!(matches!(conflicted.shape, ModelShape::Composed));
    assert_eq!(conflicted.composed_of.len(), 2);
    assert_eq!(
        conflicted
            .composed_of
            .iter()
            .map(|id| ir.model(*id).name.as_str())
            .collect::<Vec<_>>(),
        ["ConflictedAllOf0", "ConflictedAllOf1"]
    );

    let conflict = diagnostics
        .all()
        .iter()
        .find(|d| d.code == DiagnosticCode::MergeConflict)
        .unwrap();
    assert_eq!(conflict.pointer, "#/definitions/Conflicted");
    assert!(conflict.message.contains("status"));
}

// =============================================================================
// Polymorphism
// =============================================================================

#[test]
fn test_dispatch_table_binds_discriminator_values() {
    let (ir, diagnostics) = build_fixture(include_str!("fixtures/shapes.json"), Mode::Flatten);
    assert!(diagnostics.is_empty(), "{}", diagnostics.format_all());
    assert_eq!(names(&ir), ["Circle", "Shape", "Square"]);

    let base = ir.by_name("Shape").unwrap();
    assert!(matches!(base.shape, ModelShape::Base));
    let table = base.dispatch.as_ref().unwrap();
    assert_eq!(table.discriminator, "kind");
    assert_eq!(
        table.cases.iter().map(|c| c.value.as_str()).collect::<Vec<_>>(),
        ["circle", "square"]
    );
    assert_eq!(
        table.dispatch("circle").unwrap().index(),
        model_index(&ir, "Circle")
    );
    assert_eq!(
        table.dispatch("Shape").unwrap().index(),
        model_index(&ir, "Shape")
    );
    let err = table.dispatch("triangle").unwrap_err();
    assert_eq!(err.value, "triangle");

    let circle = ir.by_name("Circle").unwrap();
    assert!(matches!(circle.shape, ModelShape::Variant));
    assert_eq!(
        circle.composed_of.first().map(|id| id.index()),
        Some(model_index(&ir, "Shape"))
    );
    assert_eq!(
        rule_kinds(circle.property("radius").unwrap()),
        vec![
            RuleKind::Required,
            RuleKind::Format("double".to_string()),
            RuleKind::Minimum(0.0)
        ]
    );
}

#[test]
fn test_dispatch_is_mode_independent() {
    let (flat, _) = build_fixture(include_str!("fixtures/shapes.json"), Mode::Flatten);
    let (exp, _) = build_fixture(include_str!("fixtures/shapes.json"), Mode::Expand);

    let flat_table = flat.by_name("Shape").unwrap().dispatch.as_ref().unwrap();
    let exp_table = exp.by_name("Shape").unwrap().dispatch.as_ref().unwrap();
    assert_eq!(flat_table.discriminator, exp_table.discriminator);
    assert_eq!(
        flat_table.cases.iter().map(|c| c.value.as_str()).collect::<Vec<_>>(),
        exp_table.cases.iter().map(|c| c.value.as_str()).collect::<Vec<_>>()
    );
}

// =============================================================================
// Tuples
// =============================================================================

#[test]
fn test_tuple_positions_and_tail_paths() {
    let (ir, diagnostics) = build_fixture(include_str!("fixtures/geo.json"), Mode::Flatten);
    assert!(diagnostics.is_empty());

    let tuple = ir.by_name("LatLon").unwrap();
    match &tuple.shape {
        ModelShape::Tuple { tail } => {
            assert_eq!(tail.as_ref(), Some(&TypeRef::Primitive(SemanticType::Float64)));
        }
        other => panic!("expected tuple, got {:?}", other),
    }

    assert_eq!(tuple.properties.len(), 2);
    let lat = &tuple.properties[0];
    assert_eq!(lat.json_key, "0");
    assert_eq!(lat.accessor_name, "p0");
    assert_eq!(lat.path, "0");
    assert!(lat.required);
    assert_eq!(
        rule_kinds(lat),
        vec![
            RuleKind::Required,
            RuleKind::Format("double".to_string()),
            RuleKind::Minimum(-90.0),
            RuleKind::Maximum(90.0)
        ]
    );
    assert_eq!(tuple.properties[1].path, "1");

    // whole-tuple bounds at the root, tail constraints offset past arity
    assert_eq!(
        tuple
            .validations
            .iter()
            .map(|r| (r.path.as_str(), r.kind.clone()))
            .collect::<Vec<_>>(),
        vec![
            ("", RuleKind::MinItems(2)),
            ("2+i", RuleKind::Format("double".to_string())),
        ]
    );
}

// =============================================================================
// Nullability
// =============================================================================

#[test]
fn test_nullable_markers_change_representation_not_membership() {
    let (ir, diagnostics) =
        build_fixture(include_str!("fixtures/nullable.json"), Mode::Flatten);

    let profile = ir.by_name("Profile").unwrap();

    // required + nullable + default: the default wins, membership rule
    // dropped, and the combination is reported once
    let display_name = profile.property("displayName").unwrap();
    assert!(display_name.required);
    assert!(display_name.nullable);
    assert!(display_name.validations.is_empty());
    let ambiguous: Vec<_> = diagnostics
        .all()
        .iter()
        .filter(|d| d.code == DiagnosticCode::AmbiguousNullable)
        .collect();
    assert_eq!(ambiguous.len(), 1);
    assert_eq!(
        ambiguous[0].pointer,
        "#/definitions/Profile/properties/displayName"
    );

    let bio = profile.property("bio").unwrap();
    assert!(bio.nullable);
    assert_eq!(rule_kinds(bio), vec![RuleKind::Required]);

    let avatar = profile.property("avatar").unwrap();
    assert!(!avatar.required);
    assert!(avatar.nullable, "readOnly tolerates absence");
    assert!(avatar.validations.is_empty());
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_builds_are_deterministic() {
    for mode in [Mode::Flatten, Mode::Expand] {
        let (first, _) = petstore(mode);
        let (second, _) = petstore(mode);
        assert_eq!(names(&first), names(&second));
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap(),
            "serialized IR should be byte-identical across {} runs",
            mode
        );
    }
}

#[test]
fn test_serialized_ir_layout() {
    let (ir, _) = petstore(Mode::Flatten);
    let value = serde_json::to_value(&ir).unwrap();

    assert_eq!(value["mode"], "flatten");
    assert_eq!(value["models"][0]["name"], "ID");

    let pet = &value["models"][model_index(&ir, "Pet")];
    assert_eq!(pet["sourcePointer"], "#/definitions/Pet");
    assert_eq!(pet["title"], "Pet");
    assert_eq!(pet["description"], "A pet available in the store");
    let name_prop = pet["properties"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["jsonKey"] == "name")
        .unwrap();
    assert_eq!(name_prop["accessorName"], "name");
    assert_eq!(
        name_prop["validations"][0],
        serde_json::json!({"path": "name", "kind": "required"})
    );
    assert_eq!(
        name_prop["validations"][1],
        serde_json::json!({"path": "name", "kind": "minLength", "params": 1})
    );
}
