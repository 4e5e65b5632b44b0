//! Schema Model Generator
//!
//! Turns a JSON Schema definition corpus into a frozen, generator-ready
//! Model intermediate representation: named types, resolved references,
//! derived validation rules, and discriminator dispatch tables.
//!
//! ## Features
//!
//! - **Reference Resolution**: Local `$ref` chains canonicalized up front,
//!   with cycle-safe traversal
//! - **Two Normalization Modes**: `flatten` hoists nested schemas into
//!   shared named Models; `expand` inlines referenced schemas per use site
//! - **Deterministic Naming**: Collision handling by structural suffix and
//!   counter, stable across runs
//! - **Validation Derivation**: Constraint keywords become ordered Rules
//!   bound to dotted paths an emitter can report against
//! - **Polymorphism**: Discriminator bases get dispatch tables mapping each
//!   variant's value to its Model
//!
//! ## Architecture
//!
//! ```text
//! input file / directory
//!   │  graph::load_input
//!   ▼
//! SchemaGraph        reference edges, shape classification, SCC analysis
//!   │  model::build (flatten | expand)
//!   ▼
//! ModelIr            named Models, Properties, Rules, dispatch tables
//!   │  bin/export
//!   ▼
//! JSON for downstream emitters
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod model;

pub use config::GeneratorConfig;
pub use error::{ModelgenError, Result};
pub use graph::{Diagnostics, SchemaGraph};
pub use model::{build, BuildOutput, Mode, ModelIr};
