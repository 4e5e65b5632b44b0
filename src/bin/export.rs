//! Model Export CLI
//!
//! Runs the full pipeline and writes the frozen Model IR as JSON, either to
//! a file or to stdout. Status and diagnostics go to stderr so the output
//! stream stays machine-readable.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modelgen::config::OutputFormat;
use modelgen::model::Mode;
use modelgen::{GeneratorConfig, SchemaGraph};

#[derive(Parser)]
#[command(name = "modelgen-export")]
#[command(about = "Build the model IR and export it as JSON")]
struct Cli {
    /// Schema file or directory to build from
    input: PathBuf,

    /// Normalization mode: flatten or expand (overrides config)
    #[arg(short, long)]
    mode: Option<String>,

    /// Path to a config file (modelgen.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: pretty or compact (overrides config)
    #[arg(short, long)]
    format: Option<String>,
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
    let format = match cli.format.as_deref() {
        Some("pretty") => OutputFormat::Pretty,
        Some("compact") => OutputFormat::Compact,
        Some(other) => return Err(format!("invalid format '{}', use pretty or compact", other).into()),
        None => config.export.output_format,
    };

    eprintln!("📦 Model Export ({} mode)", mode);
    eprintln!("  Input: {:?}", cli.input);

    let document = modelgen::graph::load_input(&cli.input, &config.load_config())?;
    let graph = SchemaGraph::from_document(document)?;
    let output = modelgen::model::build_with_acronyms(&graph, mode, &config.build.acronyms)?;

    eprintln!("  Models: {}", output.ir.len());

    if !output.diagnostics.is_empty() {
        eprint!("{}", output.diagnostics.format_all());
    }
    if output.diagnostics.has_errors() {
        eprintln!("❌ Export aborted, model build has errors");
        std::process::exit(1);
    }

    let json = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(&output.ir)?,
        OutputFormat::Compact => serde_json::to_string(&output.ir)?,
    };

    if let Some(path) = cli.output {
        std::fs::write(&path, &json)?;
        eprintln!("✅ Exported {} models to {:?}", output.ir.len(), path);
    } else {
        println!("{}", json);
    }

    Ok(())
}
