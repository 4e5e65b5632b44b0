//! Type Resolution
//!
//! Maps a leaf schema's raw `(type, format)` pair to a semantic target type.
//! The table is closed: every recognized format has a row here, and an
//! unregistered format degrades softly to the scalar's base type with the raw
//! string preserved as a hint. Degrading is never fatal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::ScalarKind;

// =============================================================================
// Semantic Types
// =============================================================================

/// Semantic target type, the Type Resolver's output vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SemanticType {
    String,
    Boolean,
    /// Accepts any value
    Any,
    /// Binary payload consumed as a stream (`file` type, `binary` format)
    Stream,
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Date,
    DateTime,
    Duration,
    Uuid,
    Uuid3,
    Uuid4,
    Uuid5,
    Email,
    Hostname,
    Ipv4,
    Ipv6,
    Mac,
    Uri,
    Isbn,
    Isbn10,
    Isbn13,
    CreditCard,
    Ssn,
    HexColor,
    RgbColor,
    Password,
    Base64,
    ObjectId,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Any => "any",
            Self::Stream => "stream",
            Self::Char => "char",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::Uuid3 => "uuid3",
            Self::Uuid4 => "uuid4",
            Self::Uuid5 => "uuid5",
            Self::Email => "email",
            Self::Hostname => "hostname",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::Mac => "mac",
            Self::Uri => "uri",
            Self::Isbn => "isbn",
            Self::Isbn10 => "isbn10",
            Self::Isbn13 => "isbn13",
            Self::CreditCard => "creditcard",
            Self::Ssn => "ssn",
            Self::HexColor => "hexcolor",
            Self::RgbColor => "rgbcolor",
            Self::Password => "password",
            Self::Base64 => "base64",
            Self::ObjectId => "objectid",
        }
    }

    /// Formats whose syntax is fully implied by the semantic type; sibling
    /// length and pattern constraints are meaningless for these and get
    /// suppressed during rule derivation
    pub fn implies_own_syntax(&self) -> bool {
        matches!(
            self,
            Self::Date
                | Self::DateTime
                | Self::Duration
                | Self::Uuid
                | Self::Uuid3
                | Self::Uuid4
                | Self::Uuid5
                | Self::Base64
                | Self::ObjectId
        )
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Result of resolving a `(type, format)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    pub semantic: SemanticType,
    /// The raw format string when it was not in the table; recorded but
    /// unenforced
    pub format_hint: Option<String>,
}

impl ResolvedType {
    fn known(semantic: SemanticType) -> Self {
        Self {
            semantic,
            format_hint: None,
        }
    }

    fn degraded(semantic: SemanticType, raw_format: &str) -> Self {
        Self {
            semantic,
            format_hint: Some(raw_format.to_string()),
        }
    }
}

/// The unformatted base type of a scalar
pub fn base_type(scalar: ScalarKind) -> SemanticType {
    match scalar {
        ScalarKind::String => SemanticType::String,
        ScalarKind::Integer => SemanticType::Int64,
        ScalarKind::Number => SemanticType::Float64,
        ScalarKind::Boolean => SemanticType::Boolean,
        ScalarKind::File => SemanticType::Stream,
    }
}

/// Resolve a scalar and optional format to a semantic type
///
/// Lookup is hyphen-insensitive (`date-time` and `datetime` hit the same
/// row). A format the table does not know falls back to the scalar's base
/// type, carrying the raw string as a hint.
pub fn resolve(scalar: ScalarKind, format: Option<&str>) -> ResolvedType {
    if scalar == ScalarKind::File {
        return ResolvedType::known(SemanticType::Stream);
    }

    let Some(raw) = format.filter(|f| !f.is_empty()) else {
        return ResolvedType::known(base_type(scalar));
    };
    let normalized = raw.replace('-', "").to_ascii_lowercase();

    let hit = match scalar {
        ScalarKind::String => string_format(&normalized),
        ScalarKind::Integer => integer_format(&normalized),
        ScalarKind::Number => number_format(&normalized),
        ScalarKind::Boolean | ScalarKind::File => None,
    };

    match hit {
        Some(semantic) => ResolvedType::known(semantic),
        None => ResolvedType::degraded(base_type(scalar), raw),
    }
}

fn string_format(normalized: &str) -> Option<SemanticType> {
    let semantic = match normalized {
        "date" => SemanticType::Date,
        "datetime" => SemanticType::DateTime,
        "duration" => SemanticType::Duration,
        "uuid" => SemanticType::Uuid,
        "uuid3" => SemanticType::Uuid3,
        "uuid4" => SemanticType::Uuid4,
        "uuid5" => SemanticType::Uuid5,
        "email" => SemanticType::Email,
        "hostname" => SemanticType::Hostname,
        "ipv4" => SemanticType::Ipv4,
        "ipv6" => SemanticType::Ipv6,
        "mac" => SemanticType::Mac,
        "uri" => SemanticType::Uri,
        "isbn" => SemanticType::Isbn,
        "isbn10" => SemanticType::Isbn10,
        "isbn13" => SemanticType::Isbn13,
        "creditcard" => SemanticType::CreditCard,
        "ssn" => SemanticType::Ssn,
        "hexcolor" => SemanticType::HexColor,
        "rgbcolor" => SemanticType::RgbColor,
        "password" => SemanticType::Password,
        "byte" | "base64" => SemanticType::Base64,
        "objectid" | "bsonobjectid" => SemanticType::ObjectId,
        "binary" => SemanticType::Stream,
        "char" => SemanticType::Char,
        _ => return None,
    };
    Some(semantic)
}

fn integer_format(normalized: &str) -> Option<SemanticType> {
    let semantic = match normalized {
        "int8" => SemanticType::Int8,
        "int16" => SemanticType::Int16,
        "int32" => SemanticType::Int32,
        "int" | "int64" => SemanticType::Int64,
        "uint8" => SemanticType::Uint8,
        "uint16" => SemanticType::Uint16,
        "uint32" => SemanticType::Uint32,
        "uint" | "uint64" => SemanticType::Uint64,
        _ => return None,
    };
    Some(semantic)
}

fn number_format(normalized: &str) -> Option<SemanticType> {
    let semantic = match normalized {
        "float" | "float32" => SemanticType::Float32,
        "double" | "float64" => SemanticType::Float64,
        _ => return None,
    };
    Some(semantic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unformatted_bases() {
        assert_eq!(
            resolve(ScalarKind::String, None).semantic,
            SemanticType::String
        );
        assert_eq!(
            resolve(ScalarKind::Integer, None).semantic,
            SemanticType::Int64
        );
        assert_eq!(
            resolve(ScalarKind::Number, None).semantic,
            SemanticType::Float64
        );
        assert_eq!(
            resolve(ScalarKind::Boolean, None).semantic,
            SemanticType::Boolean
        );
    }

    #[test]
    fn test_hyphen_insensitive_lookup() {
        assert_eq!(
            resolve(ScalarKind::String, Some("date-time")).semantic,
            SemanticType::DateTime
        );
        assert_eq!(
            resolve(ScalarKind::String, Some("datetime")).semantic,
            SemanticType::DateTime
        );
        assert_eq!(
            resolve(ScalarKind::String, Some("credit-card")).semantic,
            SemanticType::CreditCard
        );
    }

    #[test]
    fn test_string_domain_formats() {
        assert_eq!(
            resolve(ScalarKind::String, Some("uuid4")).semantic,
            SemanticType::Uuid4
        );
        assert_eq!(
            resolve(ScalarKind::String, Some("email")).semantic,
            SemanticType::Email
        );
        assert_eq!(
            resolve(ScalarKind::String, Some("byte")).semantic,
            SemanticType::Base64
        );
    }

    #[test]
    fn test_numeric_widths() {
        assert_eq!(
            resolve(ScalarKind::Integer, Some("int32")).semantic,
            SemanticType::Int32
        );
        assert_eq!(
            resolve(ScalarKind::Integer, Some("uint8")).semantic,
            SemanticType::Uint8
        );
        assert_eq!(
            resolve(ScalarKind::Number, Some("float")).semantic,
            SemanticType::Float32
        );
        assert_eq!(
            resolve(ScalarKind::Number, Some("double")).semantic,
            SemanticType::Float64
        );
    }

    #[test]
    fn test_binary_forms_are_streams() {
        assert_eq!(resolve(ScalarKind::File, None).semantic, SemanticType::Stream);
        assert_eq!(
            resolve(ScalarKind::String, Some("binary")).semantic,
            SemanticType::Stream
        );
    }

    #[test]
    fn test_unknown_format_soft_degrade() {
        let resolved = resolve(ScalarKind::String, Some("phone-number"));
        assert_eq!(resolved.semantic, SemanticType::String);
        assert_eq!(resolved.format_hint.as_deref(), Some("phone-number"));

        let resolved = resolve(ScalarKind::Integer, Some("bignum"));
        assert_eq!(resolved.semantic, SemanticType::Int64);
        assert_eq!(resolved.format_hint.as_deref(), Some("bignum"));
    }

    #[test]
    fn test_format_on_boolean_degrades() {
        let resolved = resolve(ScalarKind::Boolean, Some("checkbox"));
        assert_eq!(resolved.semantic, SemanticType::Boolean);
        assert_eq!(resolved.format_hint.as_deref(), Some("checkbox"));
    }

    #[test]
    fn test_self_describing_formats() {
        assert!(SemanticType::Date.implies_own_syntax());
        assert!(SemanticType::Uuid4.implies_own_syntax());
        assert!(SemanticType::ObjectId.implies_own_syntax());
        assert!(!SemanticType::Email.implies_own_syntax());
        assert!(!SemanticType::String.implies_own_syntax());
    }
}
