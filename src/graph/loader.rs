//! Document Loading
//!
//! Loads schema documents from the filesystem: either a single JSON document
//! carrying a `definitions` member, or a directory of documents merged into
//! one. Merging gives every definition a slot under `#/definitions/` and
//! rewrites cross-file references to local canonical form, so the rest of the
//! pipeline only ever sees one document.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{escape_token, DEFINITIONS_PREFIX};
use crate::error::{ModelgenError, Result};

/// Configuration for directory loading
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Skip files whose directory-relative path starts with one of these
    pub skip_prefixes: Vec<String>,
    /// When non-empty, only load files matching one of these prefixes
    pub include_prefixes: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: vec![
                "target/".to_string(),
                ".git/".to_string(),
                "node_modules/".to_string(),
                "artifacts/".to_string(),
            ],
            include_prefixes: Vec::new(),
        }
    }
}

/// Load a single JSON document
pub fn load_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;
    let json: Value = serde_json::from_str(&content).map_err(|source| ModelgenError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    if !json.is_object() {
        return Err(ModelgenError::InvalidDocument {
            path: path.display().to_string(),
        });
    }
    Ok(json)
}

/// Load a file or a directory, whichever `path` is
pub fn load_input(path: &Path, config: &LoadConfig) -> Result<Value> {
    if path.is_dir() {
        load_directory(path, config)
    } else {
        load_document(path)
    }
}

/// Merge every JSON document under a directory into one
///
/// A file with a `definitions` member contributes each of its definitions; a
/// standalone schema file contributes itself under its file-stem name
/// (`User.schema.json` becomes `User`). File-path `$ref`s are rewritten to
/// `#/definitions/` form. Two files claiming the same definition name is a
/// contract violation.
pub fn load_directory(dir: &Path, config: &LoadConfig) -> Result<Value> {
    let mut definitions = Map::new();
    let mut sources: HashMap<String, PathBuf> = HashMap::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }

        let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if !config.include_prefixes.is_empty()
            && !config
                .include_prefixes
                .iter()
                .any(|p| relative_str.starts_with(p.as_str()))
        {
            continue;
        }
        if config
            .skip_prefixes
            .iter()
            .any(|p| relative_str.starts_with(p.as_str()))
        {
            continue;
        }

        let mut json = load_document(path)?;
        localize_refs(&mut json);

        match json.get("definitions").and_then(Value::as_object) {
            Some(defs) => {
                let defs = defs.clone();
                for (name, schema) in defs {
                    insert_definition(&mut definitions, &mut sources, name, schema, &relative)?;
                }
            }
            None => {
                let name = definition_name_from_path(&relative);
                insert_definition(&mut definitions, &mut sources, name, json, &relative)?;
            }
        }
        tracing::debug!(file = %relative_str, "document merged");
    }

    if definitions.is_empty() {
        return Err(ModelgenError::EmptyDocument {
            path: dir.display().to_string(),
        });
    }

    tracing::debug!(definitions = definitions.len(), "directory merge complete");

    let mut root = Map::new();
    root.insert("definitions".to_string(), Value::Object(definitions));
    Ok(Value::Object(root))
}

fn insert_definition(
    definitions: &mut Map<String, Value>,
    sources: &mut HashMap<String, PathBuf>,
    name: String,
    schema: Value,
    file: &Path,
) -> Result<()> {
    if let Some(first) = sources.get(&name) {
        return Err(ModelgenError::DuplicateDefinition {
            name,
            first: first.display().to_string(),
            second: file.display().to_string(),
        });
    }
    sources.insert(name.clone(), file.to_path_buf());
    definitions.insert(name, schema);
    Ok(())
}

/// Rewrite every file-path `$ref` in a subtree to local `#/definitions/` form
fn localize_refs(node: &mut Value) {
    match node {
        Value::Object(obj) => {
            if let Some(Value::String(reference)) = obj.get_mut("$ref") {
                if !reference.starts_with('#') {
                    *reference = localize_ref(reference);
                }
            }
            for value in obj.values_mut() {
                localize_refs(value);
            }
        }
        Value::Array(items) => {
            for item in items {
                localize_refs(item);
            }
        }
        _ => {}
    }
}

/// `common.json#/definitions/Tag` keeps its fragment; `Tag.schema.json`
/// resolves to the stem name
fn localize_ref(reference: &str) -> String {
    if let Some((_, fragment)) = reference.split_once('#') {
        if fragment.starts_with('/') {
            return format!("#{}", fragment);
        }
    }
    let name = definition_name_from_path(Path::new(reference));
    format!("{}{}", DEFINITIONS_PREFIX, escape_token(&name))
}

/// Definition name of a standalone schema file: stem minus a `.schema` suffix
fn definition_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim_end_matches(".schema")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SchemaGraph;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(dir: &Path, relative: &str, value: &Value) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    #[test]
    fn test_load_single_document() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "api.json",
            &json!({
                "definitions": {
                    "Pet": {"type": "object", "properties": {"name": {"type": "string"}}}
                }
            }),
        );

        let doc = load_document(&dir.path().join("api.json")).unwrap();
        let graph = SchemaGraph::from_document(doc).unwrap();
        assert_eq!(graph.definition_count(), 1);
    }

    #[test]
    fn test_merge_standalone_files() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "Pet.json",
            &json!({
                "type": "object",
                "properties": {"tag": {"$ref": "Tag.json"}}
            }),
        );
        write_file(dir.path(), "Tag.json", &json!({"type": "string"}));

        let doc = load_directory(dir.path(), &LoadConfig::default()).unwrap();
        let defs = doc.get("definitions").unwrap().as_object().unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(
            doc.pointer("/definitions/Pet/properties/tag/$ref")
                .and_then(Value::as_str),
            Some("#/definitions/Tag")
        );

        // The merged document resolves as one graph
        let graph = SchemaGraph::from_document(doc).unwrap();
        assert_eq!(graph.refs_out("#/definitions/Pet").len(), 1);
    }

    #[test]
    fn test_schema_suffix_stripped() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "User.schema.json", &json!({"type": "object"}));

        let doc = load_directory(dir.path(), &LoadConfig::default()).unwrap();
        assert!(doc.pointer("/definitions/User").is_some());
    }

    #[test]
    fn test_definitions_member_merged() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "common.json",
            &json!({
                "definitions": {
                    "Id": {"type": "integer", "format": "int64"},
                    "Name": {"type": "string"}
                }
            }),
        );
        write_file(
            dir.path(),
            "Order.json",
            &json!({
                "type": "object",
                "properties": {"id": {"$ref": "common.json#/definitions/Id"}}
            }),
        );

        let doc = load_directory(dir.path(), &LoadConfig::default()).unwrap();
        let defs = doc.get("definitions").unwrap().as_object().unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!(
            doc.pointer("/definitions/Order/properties/id/$ref")
                .and_then(Value::as_str),
            Some("#/definitions/Id")
        );
    }

    #[test]
    fn test_duplicate_definition_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "Pet.json", &json!({"type": "object"}));
        write_file(dir.path(), "sub/Pet.json", &json!({"type": "string"}));

        let err = load_directory(dir.path(), &LoadConfig::default()).unwrap_err();
        match err {
            ModelgenError::DuplicateDefinition { name, .. } => assert_eq!(name, "Pet"),
            other => panic!("expected DuplicateDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_prefix_filters_files() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "Pet.json", &json!({"type": "object"}));
        write_file(dir.path(), "target/Cached.json", &json!({"type": "object"}));

        let doc = load_directory(dir.path(), &LoadConfig::default()).unwrap();
        let defs = doc.get("definitions").unwrap().as_object().unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs.contains_key("Pet"));
    }

    #[test]
    fn test_include_prefix_narrows() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "core/Pet.json", &json!({"type": "object"}));
        write_file(dir.path(), "extra/Toy.json", &json!({"type": "object"}));

        let config = LoadConfig {
            include_prefixes: vec!["core/".to_string()],
            ..LoadConfig::default()
        };
        let doc = load_directory(dir.path(), &config).unwrap();
        let defs = doc.get("definitions").unwrap().as_object().unwrap();
        assert_eq!(defs.len(), 1);
        assert!(defs.contains_key("Pet"));
    }

    #[test]
    fn test_parse_failure_names_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let err = load_directory(dir.path(), &LoadConfig::default()).unwrap_err();
        match err {
            ModelgenError::Parse { path, .. } => assert!(path.contains("broken.json")),
            other => panic!("expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let err = load_directory(dir.path(), &LoadConfig::default()).unwrap_err();
        assert!(matches!(err, ModelgenError::EmptyDocument { .. }));
    }
}
