//! Name Resolution
//!
//! Derives unique, deterministic names for every node that needs a standalone
//! Model. The namespace is an explicit context threaded through the engine,
//! never ambient state, so name assignment is reproducible and testable per
//! subtree. A pointer that already claimed a name always gets the same name
//! back.

use std::collections::{BTreeSet, HashMap};

use crate::error::{ModelgenError, Result};
use crate::graph::Pointer;

/// Substituted when a key normalizes to nothing usable
pub const PLACEHOLDER: &str = "Anon";

/// Collision ladder cutoff; running past it is a fatal condition
const MAX_COUNTER: usize = 1000;

/// Reserved words that accessor names must not collide with
const RESERVED: &[&str] = &[
    "abstract", "as", "async", "await", "break", "case", "catch", "class",
    "const", "continue", "crate", "default", "do", "dyn", "else", "enum",
    "extern", "false", "final", "finally", "fn", "for", "if", "impl", "import",
    "in", "interface", "let", "loop", "match", "mod", "move", "mut", "new",
    "null", "package", "private", "protected", "pub", "public", "ref",
    "return", "self", "static", "struct", "super", "switch", "throw", "trait",
    "true", "try", "type", "unsafe", "use", "var", "where", "while", "yield",
];

// =============================================================================
// Branch Kinds
// =============================================================================

/// Where in the schema tree a name request comes from; determines the
/// structural disambiguation suffix tried before numeric counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameBranch {
    /// Top-level definition; no structural suffix, counters only
    Definition,
    /// allOf member at this index
    AllOf(usize),
    /// Array/tuple item schema at this index
    Items(usize),
    /// Tuple position
    TuplePosition(usize),
    /// Anonymous nested schema at this ordinal under its parent
    Anonymous(usize),
}

impl NameBranch {
    fn suffix(&self) -> Option<String> {
        match self {
            Self::Definition => None,
            Self::AllOf(n) => Some(format!("AllOf{}", n)),
            Self::Items(n) => Some(format!("Items{}", n)),
            Self::TuplePosition(n) => Some(format!("P{}", n)),
            Self::Anonymous(n) => Some(format!("Anon{}", n)),
        }
    }
}

// =============================================================================
// Namespace
// =============================================================================

/// A name claimed for a pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedName {
    pub name: String,
    /// The raw key had no usable characters and the placeholder was
    /// substituted
    pub used_placeholder: bool,
}

/// The run-wide naming namespace
///
/// Tracks every claimed Model name and which pointer owns it. Claims are
/// idempotent per pointer; collisions between pointers walk the suffix
/// ladder.
#[derive(Debug, Clone)]
pub struct Namespace {
    assigned: HashMap<Pointer, ClaimedName>,
    taken: HashMap<String, Pointer>,
    acronyms: BTreeSet<String>,
}

impl Namespace {
    pub fn new(acronyms: &[String]) -> Self {
        Self {
            assigned: HashMap::new(),
            taken: HashMap::new(),
            acronyms: acronyms.iter().map(|a| a.to_ascii_uppercase()).collect(),
        }
    }

    /// Claim a Model name for a pointer
    ///
    /// The same pointer always receives the same name. A fresh pointer gets
    /// the normalized base if free, then base + structural suffix, then
    /// base + suffix + counter. Exhausting the ladder is fatal.
    pub fn claim(
        &mut self,
        pointer: &str,
        raw_base: &str,
        branch: NameBranch,
    ) -> Result<ClaimedName> {
        if let Some(existing) = self.assigned.get(pointer) {
            return Ok(existing.clone());
        }

        let (base, used_placeholder) = match pascal_ident(raw_base, &self.acronyms) {
            Some(base) => (base, false),
            None => (PLACEHOLDER.to_string(), true),
        };

        let name = self.next_free(&base, branch).ok_or_else(|| {
            ModelgenError::NamingExhausted {
                base: base.clone(),
                pointer: pointer.to_string(),
            }
        })?;

        let claimed = ClaimedName {
            name: name.clone(),
            used_placeholder,
        };
        self.taken.insert(name, pointer.to_string());
        self.assigned.insert(pointer.to_string(), claimed.clone());
        Ok(claimed)
    }

    /// The name already assigned to a pointer, if any
    pub fn name_of(&self, pointer: &str) -> Option<&str> {
        self.assigned.get(pointer).map(|c| c.name.as_str())
    }

    /// Whether a candidate name is already owned by some pointer
    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    fn next_free(&self, base: &str, branch: NameBranch) -> Option<String> {
        if !self.is_taken(base) {
            return Some(base.to_string());
        }

        let suffixed = branch.suffix().map(|s| format!("{}{}", base, s));
        if let Some(candidate) = &suffixed {
            if !self.is_taken(candidate) {
                return Some(candidate.clone());
            }
        }

        let stem = suffixed.unwrap_or_else(|| base.to_string());
        for counter in 2..MAX_COUNTER {
            let candidate = format!("{}{}", stem, counter);
            if !self.is_taken(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

// =============================================================================
// Identifier Normalization
// =============================================================================

/// Split a raw key into words at separators, case boundaries, and
/// letter/digit transitions
fn split_words(raw: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in raw.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        let boundary = match prev {
            Some(p) => {
                (p.is_ascii_lowercase() && c.is_ascii_uppercase())
                    || (p.is_ascii_alphabetic() && c.is_ascii_digit())
                    || (p.is_ascii_digit() && c.is_ascii_alphabetic())
            }
            None => false,
        };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// PascalCase form of a raw key, honoring configured acronyms
///
/// Returns None when no usable characters remain.
pub fn pascal_ident(raw: &str, acronyms: &BTreeSet<String>) -> Option<String> {
    let words = split_words(raw);
    if words.is_empty() {
        return None;
    }

    let mut out = String::new();
    for word in words {
        let upper = word.to_ascii_uppercase();
        if acronyms.contains(&upper) {
            out.push_str(&upper);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(&chars.as_str().to_ascii_lowercase());
            }
        }
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "Nr");
    }
    Some(out)
}

/// snake_case accessor name for a JSON key, escaping reserved words with a
/// trailing underscore
pub fn accessor_ident(raw: &str) -> String {
    let words = split_words(raw);
    if words.is_empty() {
        return PLACEHOLDER.to_ascii_lowercase();
    }

    let mut out = words
        .iter()
        .map(|w| w.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_");

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "nr");
    }
    if RESERVED.contains(&out.as_str()) {
        out.push('_');
    }
    out
}
