//! Diagnostics
//!
//! Collects recoverable anomalies during resolution and model building.
//! Fatal conditions travel as `ModelgenError`; everything else accumulates
//! here and is returned alongside the Model IR so one bad sub-schema does
//! not abort unrelated siblings.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Pointer;

// =============================================================================
// Diagnostic Codes
// =============================================================================

/// Diagnostic code for categorizing issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // === Resolution ===
    /// $ref target not found in the document
    UnresolvedRef,
    /// Two files/definitions claim the same name
    DuplicateDefinition,
    /// Document root is not a schema object
    InvalidDocument,

    // === Naming ===
    /// All disambiguation suffixes and counters taken
    NamingExhausted,
    /// Key normalized to an empty identifier, placeholder substituted
    NamePlaceholder,

    // === Classification ===
    /// Schema declares more than one raw type
    MultiTypeSchema,
    /// Format string not in the semantic type table
    UnknownFormat,

    // === Composition ===
    /// allOf members declare overlapping properties with differing types
    MergeConflict,
    /// nullable + required + default together; default wins
    AmbiguousNullable,

    // === Polymorphism ===
    /// Discriminator property missing or not required on the base
    DiscriminatorGap,

    // === Constraints ===
    /// pattern constraint does not compile as a regex
    InvalidPattern,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnresolvedRef => "E001",
            Self::NamingExhausted => "E002",
            Self::DuplicateDefinition => "E003",
            Self::InvalidDocument => "E004",
            Self::MultiTypeSchema => "W001",
            Self::UnknownFormat => "W002",
            Self::MergeConflict => "W003",
            Self::AmbiguousNullable => "W004",
            Self::NamePlaceholder => "W005",
            Self::DiscriminatorGap => "W006",
            Self::InvalidPattern => "W007",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::UnresolvedRef
            | Self::NamingExhausted
            | Self::DuplicateDefinition
            | Self::InvalidDocument => Severity::Error,

            Self::MultiTypeSchema
            | Self::UnknownFormat
            | Self::MergeConflict
            | Self::AmbiguousNullable
            | Self::NamePlaceholder
            | Self::DiscriminatorGap
            | Self::InvalidPattern => Severity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Diagnostic Item
// =============================================================================

/// A single diagnostic item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    /// Canonical pointer of the schema that caused this diagnostic
    pub pointer: Pointer,
    /// Diagnostic code
    pub code: DiagnosticCode,
    /// Human-readable message
    pub message: String,
    /// Additional context (related pointers, paths, values)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

impl DiagnosticItem {
    pub fn new(
        pointer: impl Into<Pointer>,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pointer: pointer.into(),
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }
}

impl fmt::Display for DiagnosticItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} ({})",
            self.code,
            self.code.severity(),
            self.message,
            self.pointer
        )?;

        for ctx in &self.context {
            write!(f, "\n  - {}", ctx)?;
        }

        Ok(())
    }
}

// =============================================================================
// Diagnostics Collection
// =============================================================================

/// Collection of diagnostics from resolution and model-building passes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<DiagnosticItem>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a diagnostic item
    pub fn push(&mut self, item: DiagnosticItem) {
        self.items.push(item);
    }

    /// Add a warning
    pub fn warning(
        &mut self,
        pointer: impl Into<Pointer>,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.push(DiagnosticItem::new(pointer, code, message));
    }

    /// Add an error-severity item (used by the check binary when a document
    /// fails fatally but the scan should continue with its siblings)
    pub fn error(
        &mut self,
        pointer: impl Into<Pointer>,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.push(DiagnosticItem::new(pointer, code, message));
    }

    /// Schema declares multiple raw types; treated as Opaque
    pub fn multi_type(&mut self, pointer: impl Into<Pointer>, types: &[String]) {
        self.push(
            DiagnosticItem::new(
                pointer,
                DiagnosticCode::MultiTypeSchema,
                format!("schema declares multiple types {:?}; treating as opaque", types),
            ),
        );
    }

    /// Format not in the semantic type table; base type used
    pub fn unknown_format(&mut self, pointer: impl Into<Pointer>, format: &str, base: &str) {
        self.push(
            DiagnosticItem::new(
                pointer,
                DiagnosticCode::UnknownFormat,
                format!("unrecognized format '{}'; falling back to {}", format, base),
            )
            .with_context(format!("format hint preserved: {}", format)),
        );
    }

    /// allOf members overlap on a property with differing types
    pub fn merge_conflict(
        &mut self,
        pointer: impl Into<Pointer>,
        property: &str,
        left: &str,
        right: &str,
    ) {
        self.push(
            DiagnosticItem::new(
                pointer,
                DiagnosticCode::MergeConflict,
                format!(
                    "allOf members both declare '{}' with differing types; embedding instead of merging",
                    property
                ),
            )
            .with_context(format!("member types: {} vs {}", left, right)),
        );
    }

    /// nullable + required + default on the same property
    pub fn ambiguous_nullable(&mut self, pointer: impl Into<Pointer>, property: &str) {
        self.push(DiagnosticItem::new(
            pointer,
            DiagnosticCode::AmbiguousNullable,
            format!(
                "'{}' is nullable, required, and has a default; default wins, required rule suppressed",
                property
            ),
        ));
    }

    /// Key normalized to nothing; placeholder used
    pub fn name_placeholder(&mut self, pointer: impl Into<Pointer>, key: &str, placeholder: &str) {
        self.push(DiagnosticItem::new(
            pointer,
            DiagnosticCode::NamePlaceholder,
            format!("key '{}' has no identifier characters; using '{}'", key, placeholder),
        ));
    }

    /// Discriminator property absent from (or optional on) the base
    pub fn discriminator_gap(&mut self, pointer: impl Into<Pointer>, field: &str) {
        self.push(DiagnosticItem::new(
            pointer,
            DiagnosticCode::DiscriminatorGap,
            format!(
                "discriminator '{}' is not a required property of the base; treating as implicit required string",
                field
            ),
        ));
    }

    /// pattern constraint failed to compile
    pub fn invalid_pattern(&mut self, pointer: impl Into<Pointer>, pattern: &str, err: &str) {
        self.push(
            DiagnosticItem::new(
                pointer,
                DiagnosticCode::InvalidPattern,
                format!("pattern '{}' does not compile; rule skipped", pattern),
            )
            .with_context(err.to_string()),
        );
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.severity() == Severity::Error)
    }

    /// Get all errors
    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Error)
    }

    /// Get all warnings
    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticItem> {
        self.items.iter().filter(|i| i.severity() == Severity::Warning)
    }

    /// Get all items
    pub fn all(&self) -> &[DiagnosticItem] {
        &self.items
    }

    /// Get total count
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Count errors
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Count warnings
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Merge another Diagnostics into this one
    pub fn merge(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Format all diagnostics for display
    pub fn format_all(&self) -> String {
        let mut output = String::new();

        for item in &self.items {
            output.push_str(&format!("{}\n", item));
        }

        if self.has_errors() {
            output.push_str(&format!(
                "\n{} error(s), {} warning(s)\n",
                self.error_count(),
                self.warning_count()
            ));
        } else if !self.is_empty() {
            output.push_str(&format!("\n{} warning(s)\n", self.warning_count()));
        }

        output
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for Diagnostics {
    type Item = DiagnosticItem;
    type IntoIter = std::vec::IntoIter<DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticItem;
    type IntoIter = std::slice::Iter<'a, DiagnosticItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
