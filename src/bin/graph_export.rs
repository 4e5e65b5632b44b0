use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use modelgen::graph::analysis::compute_scc_analysis;
use modelgen::{GeneratorConfig, SchemaGraph};

#[derive(Parser)]
#[command(name = "modelgen-graph-export")]
#[command(about = "Export the schema reference graph to DOT/JSON format")]
struct Cli {
    /// Path to a schema file or directory (defaults to current directory)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (defaults to schema-graph.dot; json defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: dot or json
    #[arg(short, long, default_value = "dot")]
    format: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let input = cli.input.unwrap_or_else(|| PathBuf::from("."));
    let config = GeneratorConfig::load_from(None)?;

    println!("Loading schema graph from: {:?}", input);
    let document = modelgen::graph::load_input(&input, &config.load_config())?;
    let graph = SchemaGraph::from_document(document)?;

    println!(
        "Graph loaded: {} definitions, {} edges",
        graph.definition_count(),
        graph.edge_count()
    );

    let analysis = compute_scc_analysis(&graph);
    if analysis.groups.is_empty() {
        println!("✅ No reference cycles");
    } else {
        for group in &analysis.groups {
            println!("🔁 Cycle group {}: {}", group.id, group.members.join(", "));
        }
    }

    match cli.format.as_str() {
        "dot" => {
            let output_path = cli
                .output
                .unwrap_or_else(|| PathBuf::from("schema-graph.dot"));
            std::fs::write(&output_path, graph.to_dot())?;
            println!("✅ Exported DOT to: {:?}", output_path);
        }
        "json" => {
            let mut adjacency = serde_json::Map::new();
            for (name, pointer) in graph.definitions() {
                let references: Vec<&str> = graph
                    .refs_out(pointer)
                    .into_iter()
                    .map(String::as_str)
                    .collect();
                adjacency.insert(
                    name.to_string(),
                    json!({
                        "pointer": pointer,
                        "references": references,
                    }),
                );
            }
            let report = json!({
                "definitionCount": graph.definition_count(),
                "edgeCount": graph.edge_count(),
                "adjacency": adjacency,
                "cycles": analysis.groups,
            });
            let rendered = serde_json::to_string_pretty(&report)?;
            match cli.output {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    println!("✅ Exported graph report to: {:?}", path);
                }
                None => println!("{}", rendered),
            }
        }
        _ => {
            eprintln!("❌ Invalid format. Use 'dot' or 'json'");
            std::process::exit(1);
        }
    }

    Ok(())
}
