//! Configuration management for the generator
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (modelgen.toml)
//! - Environment variables (MODELGEN_*)
//!
//! ## Example config file (modelgen.toml):
//! ```toml
//! [build]
//! mode = "flatten"
//! acronyms = ["id", "api", "url", "http", "json"]
//!
//! [loader]
//! skip_prefixes = ["target/", ".git/"]
//!
//! [export]
//! output_format = "pretty"
//!
//! [check]
//! meta_schema = true
//! fail_on_warnings = false
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::graph::LoadConfig;
use crate::model::Mode;

/// Main configuration for the generator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeneratorConfig {
    /// Model build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Input loading settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Check settings
    #[serde(default)]
    pub check: CheckConfig,
}

/// Model build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Normalization mode (flatten or expand)
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Words kept upper-case when deriving Model names
    #[serde(default = "default_acronyms")]
    pub acronyms: Vec<String>,
}

/// Input loading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Skip files whose directory-relative path starts with one of these
    #[serde(default = "default_skip_prefixes")]
    pub skip_prefixes: Vec<String>,

    /// When non-empty, only load files matching one of these prefixes
    #[serde(default)]
    pub include_prefixes: Vec<String>,
}

/// Export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Output format (pretty or compact)
    #[serde(default)]
    pub output_format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

/// Check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Validate inputs against the JSON Schema draft-4 meta-schema
    #[serde(default = "default_true")]
    pub meta_schema: bool,

    /// Treat warnings as failures
    #[serde(default)]
    pub fail_on_warnings: bool,
}

// Default value functions
fn default_mode() -> Mode {
    Mode::Flatten
}

/// Acronyms recognized during name casing when no config overrides them
pub fn default_acronyms() -> Vec<String> {
    ["id", "api", "url", "uri", "http", "https", "json", "xml", "uuid", "ip", "sql"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_skip_prefixes() -> Vec<String> {
    LoadConfig::default().skip_prefixes
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            acronyms: default_acronyms(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            skip_prefixes: default_skip_prefixes(),
            include_prefixes: Vec::new(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Pretty,
        }
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            meta_schema: true,
            fail_on_warnings: false,
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["modelgen.toml", ".modelgen.toml", "config/modelgen.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "modelgen", "modelgen") {
            let xdg_config = config_dir.config_dir().join("modelgen.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (MODELGEN_*)
        builder = builder.add_source(
            Environment::with_prefix("MODELGEN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Loader settings in the form the graph loader consumes
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            skip_prefixes: self.loader.skip_prefixes.clone(),
            include_prefixes: self.loader.include_prefixes.clone(),
        }
    }
}
