//! In-memory detection block: selections of field matches combined by a
//! condition string, plus the clause chain derived from that condition.
//!
//! These are plain values. Every edit produces a new [`Document`]; nothing in
//! here holds references into another document.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix used for generated selection names (`Selection_1`, `Selection_2`, ...).
pub const DEFAULT_SELECTION_PREFIX: &str = "Selection_";

// =============================================================================
// Modifiers
// =============================================================================

/// Field modifiers supported by the editor.
///
/// This is the subset of Sigma modifiers the editor can present. Keys that
/// carry any other modifier are kept verbatim as the field name so they
/// survive a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Contains,
    All,
    Base64,
    EndsWith,
    StartsWith,
}

impl Modifier {
    pub const ALL: [Modifier; 5] = [
        Modifier::Contains,
        Modifier::All,
        Modifier::Base64,
        Modifier::EndsWith,
        Modifier::StartsWith,
    ];

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "contains" => Some(Modifier::Contains),
            "all" => Some(Modifier::All),
            "base64" => Some(Modifier::Base64),
            "endswith" => Some(Modifier::EndsWith),
            "startswith" => Some(Modifier::StartsWith),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Contains => "contains",
            Modifier::All => "all",
            Modifier::Base64 => "base64",
            Modifier::EndsWith => "endswith",
            Modifier::StartsWith => "startswith",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Field matches and selections
// =============================================================================

/// One `field[|modifier]: value(s)` matcher inside a selection.
///
/// A single value is edited as a scalar; any other length (including zero,
/// an explicitly cleared list) is edited as a list. The two shapes are kept
/// apart all the way through serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    /// `None` when the source key had no modifier. Never defaulted here.
    #[serde(default)]
    pub modifier: Option<Modifier>,
    pub values: Vec<String>,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, modifier: Option<Modifier>, values: Vec<String>) -> Self {
        FieldMatch {
            field: field.into(),
            modifier,
            values,
        }
    }

    /// An unfilled slot: no field name, no modifier, one empty value.
    pub fn empty() -> Self {
        FieldMatch::new("", None, vec![String::new()])
    }

    /// The mapping key this matcher serializes under.
    pub fn key(&self) -> String {
        match self.modifier {
            Some(m) => format!("{}|{m}", self.field),
            None => self.field.clone(),
        }
    }

    /// `true` unless the matcher holds exactly one value.
    pub fn is_list(&self) -> bool {
        self.values.len() != 1
    }

    /// The modifier to display. An absent modifier is shown as `contains`
    /// but stays absent in the stored value.
    pub fn display_modifier(&self) -> Modifier {
        self.modifier.unwrap_or(Modifier::Contains)
    }

    pub fn set_single(&mut self, value: impl Into<String>) {
        self.values = vec![value.into()];
    }

    pub fn set_list(&mut self, values: Vec<String>) {
        self.values = values;
    }
}

impl Default for FieldMatch {
    fn default() -> Self {
        FieldMatch::empty()
    }
}

/// A named group of field matches, referenced by name from the condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    /// Never empty in a document produced by the codec or the editor.
    pub data: Vec<FieldMatch>,
}

impl Selection {
    /// A selection with a single unfilled field match.
    pub fn new(name: impl Into<String>) -> Self {
        Selection {
            name: name.into(),
            data: vec![FieldMatch::empty()],
        }
    }

    pub fn with_data(name: impl Into<String>, data: Vec<FieldMatch>) -> Self {
        let mut data = data;
        if data.is_empty() {
            data.push(FieldMatch::empty());
        }
        Selection {
            name: name.into(),
            data,
        }
    }
}

// =============================================================================
// Document
// =============================================================================

/// An editable detection block.
///
/// The condition may transiently reference a selection that no longer
/// exists; that is reported by validation, not prevented here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub condition: String,
    pub selections: Vec<Selection>,
}

impl Document {
    pub fn new(condition: impl Into<String>, selections: Vec<Selection>) -> Self {
        Document {
            condition: condition.into(),
            selections,
        }
    }

    /// The document used when there is nothing (or nothing usable) to parse:
    /// one empty selection named `<prefix>1`, referenced by the condition.
    pub fn with_prefix(prefix: &str) -> Self {
        let name = format!("{prefix}1");
        Document {
            condition: name.clone(),
            selections: vec![Selection::new(name)],
        }
    }

    pub fn selection_names(&self) -> Vec<&str> {
        self.selections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.selections.iter().position(|s| s.name == name)
    }

    /// Number of selections carrying `name`. More than one means the name is
    /// ambiguous until the duplicate is fixed.
    pub fn name_count(&self, name: &str) -> usize {
        self.selections.iter().filter(|s| s.name == name).count()
    }

    /// First `<prefix>N` not already taken, starting from `len + 1`.
    pub fn next_selection_name(&self, prefix: &str) -> String {
        let mut n = self.selections.len() + 1;
        loop {
            let candidate = format!("{prefix}{n}");
            if self.position(&candidate).is_none() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::with_prefix(DEFAULT_SELECTION_PREFIX)
    }
}

// =============================================================================
// Clauses
// =============================================================================

/// Connective placed before a clause's selection name.
///
/// The chain is flat and read left to right; `not` is a positional
/// connective like `and`/`or`, not a prefix negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Only valid on the first clause.
    None,
    And,
    Or,
    Not,
}

impl Operator {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "and" => Some(Operator::And),
            "or" => Some(Operator::Or),
            "not" => Some(Operator::Not),
            _ => None,
        }
    }

    /// Condition keyword, `None` for [`Operator::None`].
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Operator::None => None,
            Operator::And => Some("and"),
            Operator::Or => Some("or"),
            Operator::Not => Some("not"),
        }
    }

    pub fn is_keyword(s: &str) -> bool {
        Operator::from_keyword(s).is_some()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword().unwrap_or("none"))
    }
}

/// One UI-editable link of the condition chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub operator: Operator,
    pub selection_name: String,
}

impl Clause {
    pub fn new(operator: Operator, selection_name: impl Into<String>) -> Self {
        Clause {
            operator,
            selection_name: selection_name.into(),
        }
    }

    pub fn first(selection_name: impl Into<String>) -> Self {
        Clause::new(Operator::None, selection_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_references_its_selection() {
        let doc = Document::default();
        assert_eq!(doc.condition, "Selection_1");
        assert_eq!(doc.selection_names(), vec!["Selection_1"]);
        assert_eq!(doc.selections[0].data, vec![FieldMatch::empty()]);
    }

    #[test]
    fn field_match_key() {
        let plain = FieldMatch::new("CommandLine", None, vec!["x".into()]);
        assert_eq!(plain.key(), "CommandLine");
        let modded = FieldMatch::new("Image", Some(Modifier::EndsWith), vec!["x".into()]);
        assert_eq!(modded.key(), "Image|endswith");
    }

    #[test]
    fn absent_modifier_displays_as_contains() {
        let fm = FieldMatch::empty();
        assert_eq!(fm.modifier, None);
        assert_eq!(fm.display_modifier(), Modifier::Contains);
    }

    #[test]
    fn list_mode_is_derived_from_length() {
        let mut fm = FieldMatch::empty();
        assert!(!fm.is_list());
        fm.set_list(Vec::new());
        assert!(fm.is_list());
        fm.set_list(vec!["a".into(), "b".into()]);
        assert!(fm.is_list());
        fm.set_single("a");
        assert!(!fm.is_list());
    }

    #[test]
    fn next_selection_name_skips_taken() {
        let doc = Document::new(
            "",
            vec![Selection::new("Selection_2"), Selection::new("Selection_3")],
        );
        assert_eq!(doc.next_selection_name("Selection_"), "Selection_4");

        let doc = Document::new("", vec![Selection::new("A")]);
        assert_eq!(doc.next_selection_name("Selection_"), "Selection_2");
    }

    #[test]
    fn selection_with_no_data_gets_a_slot() {
        let sel = Selection::with_data("A", Vec::new());
        assert_eq!(sel.data.len(), 1);
    }

    #[test]
    fn modifier_names() {
        for m in Modifier::ALL {
            assert_eq!(Modifier::from_name(m.as_str()), Some(m));
        }
        assert_eq!(Modifier::from_name("re"), None);
    }

    #[test]
    fn operator_keywords() {
        assert_eq!(Operator::from_keyword("and"), Some(Operator::And));
        assert_eq!(Operator::from_keyword("AND"), None);
        assert_eq!(Operator::None.keyword(), None);
        assert!(Operator::is_keyword("not"));
    }
}
