//! Validation of selection names, field names, values and the condition.
//!
//! Every check is a pure function returning at most one
//! [`ValidationError`]. [`validate_document`] runs all of them and collects
//! the results into an [`ErrorMap`] keyed by [`FieldId`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::condition::{ConditionSyntaxError, parse_clauses};
use crate::model::{Document, FieldMatch, Selection};

/// Top-level key the codec reserves for the condition string.
pub const RESERVED_SELECTION_NAMES: &[&str] = &["condition"];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
});

// =============================================================================
// Public types
// =============================================================================

/// Stable address of an editable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldId {
    Condition,
    SelectionName { selection: usize },
    FieldName { selection: usize, field: usize },
    Value { selection: usize, field: usize },
}

impl FieldId {
    /// Index of the selection this id belongs to, if any.
    pub fn selection(&self) -> Option<usize> {
        match *self {
            FieldId::Condition => None,
            FieldId::SelectionName { selection }
            | FieldId::FieldName { selection, .. }
            | FieldId::Value { selection, .. } => Some(selection),
        }
    }

    /// Index of the field match this id belongs to, if any.
    pub fn field(&self) -> Option<usize> {
        match *self {
            FieldId::FieldName { field, .. } | FieldId::Value { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// JSON-pointer-style path, e.g. `/selections/0/data/1/values`.
impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Condition => write!(f, "/condition"),
            FieldId::SelectionName { selection } => write!(f, "/selections/{selection}/name"),
            FieldId::FieldName { selection, field } => {
                write!(f, "/selections/{selection}/data/{field}/field")
            }
            FieldId::Value { selection, field } => {
                write!(f, "/selections/{selection}/data/{field}/values")
            }
        }
    }
}

/// A validation failure for a single input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required")]
    Required,

    #[error(
        "'{0}' is not a valid identifier (letters, digits and underscores, not starting with a digit)"
    )]
    InvalidIdentifier(String),

    #[error("'{0}' is already used")]
    Duplicate(String),

    #[error("'{0}' is a reserved name")]
    Reserved(String),

    #[error("invalid condition: {0}")]
    ConditionSyntax(#[from] ConditionSyntaxError),

    #[error(
        "unknown selection {}; allowed: {}",
        quoted_list(.unknown),
        allowed_list(.allowed)
    )]
    UnknownSelection {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Required => "required",
            ValidationError::InvalidIdentifier(_) => "invalid-identifier",
            ValidationError::Duplicate(_) => "duplicate",
            ValidationError::Reserved(_) => "reserved",
            ValidationError::ConditionSyntax(_) => "invalid-condition",
            ValidationError::UnknownSelection { .. } => "unknown-selection",
        }
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// Errors for a whole document, at most one per [`FieldId`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMap {
    errors: BTreeMap<FieldId, ValidationError>,
}

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FieldId, error: Option<ValidationError>) {
        if let Some(error) = error {
            self.errors.insert(id, error);
        }
    }

    pub fn get(&self, id: &FieldId) -> Option<&ValidationError> {
        self.errors.get(id)
    }

    pub fn contains(&self, id: &FieldId) -> bool {
        self.errors.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &ValidationError)> {
        self.errors.iter()
    }

    /// Only the errors for inputs the user has interacted with.
    pub fn visible(&self, touched: &BTreeSet<FieldId>) -> ErrorMap {
        ErrorMap {
            errors: self
                .errors
                .iter()
                .filter(|(id, _)| touched.contains(id))
                .map(|(id, e)| (*id, e.clone()))
                .collect(),
        }
    }
}

impl Serialize for ErrorMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.errors.len()))?;
        for (id, error) in &self.errors {
            map.serialize_entry(&id.to_string(), error)?;
        }
        map.end()
    }
}

// =============================================================================
// Validators
// =============================================================================

pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

/// Check the name of the selection at `index` against its siblings.
pub fn validate_selection_name(doc: &Document, index: usize) -> Option<ValidationError> {
    let name = &doc.selections.get(index)?.name;
    // Checked first: two equal keys cannot both be written out.
    if doc.name_count(name) > 1 {
        return Some(ValidationError::Duplicate(name.clone()));
    }
    if let Some(e) = check_identifier(name) {
        return Some(e);
    }
    if RESERVED_SELECTION_NAMES.contains(&name.as_str()) {
        return Some(ValidationError::Reserved(name.clone()));
    }
    None
}

/// Check the field name of the field match at `index` within `selection`.
///
/// Uniqueness is by serialized key, so `Image` and `Image|endswith` may
/// share a field name while two unfilled slots may not.
pub fn validate_field_name(selection: &Selection, index: usize) -> Option<ValidationError> {
    let fm = selection.data.get(index)?;
    let key = fm.key();
    if selection.data.iter().filter(|other| other.key() == key).count() > 1 {
        return Some(ValidationError::Duplicate(key));
    }
    check_identifier(&fm.field)
}

/// A single value must be filled in; a list may be empty.
pub fn validate_value(fm: &FieldMatch) -> Option<ValidationError> {
    match fm.values.as_slice() {
        [only] if only.is_empty() => Some(ValidationError::Required),
        _ => None,
    }
}

/// Check the condition grammar and that every name refers to a selection.
pub fn validate_condition<S: AsRef<str>>(
    condition: &str,
    selection_names: &[S],
) -> Option<ValidationError> {
    if condition.is_empty() {
        return Some(ValidationError::Required);
    }

    let clauses = match parse_clauses(condition) {
        Ok(clauses) => clauses,
        Err(e) => return Some(ValidationError::ConditionSyntax(e)),
    };

    let mut unknown: Vec<String> = Vec::new();
    let mut repeated: Option<&str> = None;
    for (i, clause) in clauses.iter().enumerate() {
        let name = clause.selection_name.as_str();
        let known = selection_names.iter().any(|n| n.as_ref() == name);
        if !known && !unknown.iter().any(|u| u == name) {
            unknown.push(name.to_string());
        }
        if repeated.is_none() && clauses[..i].iter().any(|c| c.selection_name == name) {
            repeated = Some(name);
        }
    }

    if !unknown.is_empty() {
        return Some(ValidationError::UnknownSelection {
            unknown,
            allowed: selection_names
                .iter()
                .map(|n| n.as_ref().to_string())
                .collect(),
        });
    }
    // A selection may back at most one clause.
    repeated.map(|name| ValidationError::Duplicate(name.to_string()))
}

/// Run every validator over `doc`.
pub fn validate_document(doc: &Document) -> ErrorMap {
    let mut errors = ErrorMap::new();

    errors.insert(
        FieldId::Condition,
        validate_condition(&doc.condition, &doc.selection_names()),
    );

    for (s, selection) in doc.selections.iter().enumerate() {
        errors.insert(
            FieldId::SelectionName { selection: s },
            validate_selection_name(doc, s),
        );
        for (f, fm) in selection.data.iter().enumerate() {
            errors.insert(
                FieldId::FieldName {
                    selection: s,
                    field: f,
                },
                validate_field_name(selection, f),
            );
            errors.insert(
                FieldId::Value {
                    selection: s,
                    field: f,
                },
                validate_value(fm),
            );
        }
    }

    errors
}

// =============================================================================
// Helpers
// =============================================================================

fn check_identifier(s: &str) -> Option<ValidationError> {
    if s.is_empty() {
        Some(ValidationError::Required)
    } else if !is_identifier(s) {
        Some(ValidationError::InvalidIdentifier(s.to_string()))
    } else {
        None
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn allowed_list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

// =============================================================================
// Tests
// =============================================================================
