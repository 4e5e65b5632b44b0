//! Schema Check CLI
//!
//! Validates a schema corpus against the draft-4 meta-schema, runs a full
//! model build, and reports every diagnostic. Exits non-zero when the
//! corpus cannot produce a usable model set.

use clap::Parser;
use include_dir::{include_dir, Dir};
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modelgen::model::Mode;
use modelgen::{GeneratorConfig, SchemaGraph};

static META_SCHEMAS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

#[derive(Parser)]
#[command(name = "modelgen-check")]
#[command(about = "Validate schemas and run a full model build")]
struct Cli {
    /// Schema file or directory to check
    input: PathBuf,

    /// Normalization mode: flatten or expand (overrides config)
    #[arg(short, long)]
    mode: Option<String>,

    /// Path to a config file (modelgen.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Skip meta-schema validation
    #[arg(long)]
    skip_meta_schema: bool,

    /// Strict mode - treat warnings as failures
    #[arg(long)]
    strict: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = GeneratorConfig::load_from(cli.config.as_deref())?;
    let mode = match &cli.mode {
        Some(raw) => raw.parse::<Mode>()?,
        None => config.build.mode,
    };

    println!("🔍 Checking schemas at {:?}", cli.input);
    let document = modelgen::graph::load_input(&cli.input, &config.load_config())?;

    let definition_count = document
        .get("definitions")
        .and_then(Value::as_object)
        .map(|d| d.len())
        .unwrap_or(0);
    println!("  Definitions: {}", definition_count);
    println!();

    if config.check.meta_schema && !cli.skip_meta_schema {
        let violations = meta_schema_violations(&document)?;
        if violations.is_empty() {
            println!("✅ Meta-schema validation passed");
        } else {
            println!("❌ Meta-schema validation failed:");
            for violation in &violations {
                println!("   └─ {}", violation);
            }
            std::process::exit(1);
        }
    }

    let graph = SchemaGraph::from_document(document)?;
    let output = modelgen::model::build_with_acronyms(&graph, mode, &config.build.acronyms)?;

    println!("📊 Build ({} mode): {} models", mode, output.ir.len());
    println!();

    if !output.diagnostics.is_empty() {
        print!("{}", output.diagnostics.format_all());
    }

    let fail_on_warnings = cli.strict || config.check.fail_on_warnings;
    if output.diagnostics.has_errors() {
        println!("❌ Check failed");
        std::process::exit(1);
    }
    if fail_on_warnings && output.diagnostics.warning_count() > 0 {
        println!("❌ Check failed (strict mode, warnings present)");
        std::process::exit(1);
    }

    println!("✅ Check passed");
    Ok(())
}

/// Validate the assembled document against the embedded draft-4 meta-schema
fn meta_schema_violations(document: &Value) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let file = META_SCHEMAS
        .get_file("jsonschema-draft-04.json")
        .ok_or("embedded draft-4 meta-schema missing")?;
    let text = file
        .contents_utf8()
        .ok_or("embedded draft-4 meta-schema is not UTF-8")?;
    let meta: Value = serde_json::from_str(text)?;

    let compiled = JSONSchema::options()
        .with_draft(Draft::Draft4)
        .compile(&meta)
        .map_err(|e| format!("meta-schema compile failed: {}", e))?;

    let mut violations = Vec::new();
    if let Err(errors) = compiled.validate(document) {
        for error in errors {
            violations.push(format!("{} at '{}'", error, error.instance_path));
        }
    }
    Ok(violations)
}
