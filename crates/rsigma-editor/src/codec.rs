//! YAML ↔ [`Document`] codec for detection blocks.
//!
//! A detection block is a mapping with a `condition` key and one key per
//! selection:
//!
//! ```yaml
//! condition: selection and filter
//! selection:
//!     CommandLine|contains: whoami
//! filter:
//!     User:
//!         - SYSTEM
//!         - LOCAL SERVICE
//! ```
//!
//! Mapping order is preserved in both directions, and a single value is kept
//! distinct from a list (including the empty list) so that
//! `parse(serialize(doc)) == doc`.

use serde_yaml::{Mapping, Value};

use crate::error::{EditorError, Result};
use crate::model::{DEFAULT_SELECTION_PREFIX, Document, FieldMatch, Modifier, Selection};

const CONDITION_KEY: &str = "condition";

// =============================================================================
// Public API
// =============================================================================

/// Parse a detection block, falling back to the default document when the
/// text is empty, unparsable, or not a mapping.
pub fn parse(text: &str) -> Document {
    parse_with_prefix(text, DEFAULT_SELECTION_PREFIX)
}

/// Like [`parse`], with a custom prefix for the fallback selection name.
pub fn parse_with_prefix(text: &str, prefix: &str) -> Document {
    match try_parse(text, prefix) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("falling back to default detection block: {e}");
            Document::with_prefix(prefix)
        }
    }
}

/// Parse a detection block, reporting structural failures instead of
/// recovering from them.
///
/// Empty input (blank text, `~`, `{}`) is not a failure: it yields the
/// default document.
pub fn try_parse(text: &str, prefix: &str) -> Result<Document> {
    if text.trim().is_empty() {
        return Ok(Document::with_prefix(prefix));
    }

    let value: Value = serde_yaml::from_str(text)?;
    let mapping = match value {
        Value::Null => return Ok(Document::with_prefix(prefix)),
        Value::Mapping(m) => m,
        _ => return Err(EditorError::NotAMapping),
    };
    if mapping.is_empty() {
        return Ok(Document::with_prefix(prefix));
    }

    let mut condition = String::new();
    let mut selections = Vec::new();

    for (key, val) in &mapping {
        let Some(name) = scalar_to_string(key) else {
            log::warn!("skipping detection entry with non-scalar key");
            continue;
        };
        if name == CONDITION_KEY {
            condition = parse_condition_value(val);
        } else {
            selections.push(parse_selection(name, val));
        }
    }

    Ok(Document::new(condition, selections))
}

/// Serialize a document back to a detection block.
///
/// `condition` comes first, followed by each selection in stored order.
pub fn serialize(doc: &Document) -> Result<String> {
    Ok(serde_yaml::to_string(&to_yaml_value(doc))?)
}

/// Build the YAML value [`serialize`] emits.
pub fn to_yaml_value(doc: &Document) -> Value {
    let mut root = Mapping::new();
    root.insert(
        Value::String(CONDITION_KEY.to_string()),
        Value::String(doc.condition.clone()),
    );

    for selection in &doc.selections {
        let mut body = Mapping::new();
        for fm in &selection.data {
            body.insert(Value::String(fm.key()), values_to_yaml(&fm.values));
        }
        root.insert(Value::String(selection.name.clone()), Value::Mapping(body));
    }

    Value::Mapping(root)
}

/// Split a selection key like `Image|endswith` into field name and modifier.
///
/// Only the first `|` is considered. When the remainder is not a supported
/// modifier (`Image|re`, `Image|contains|all`), the whole key is kept as the
/// field name so nothing is lost on re-serialization.
pub fn split_field_key(key: &str) -> (String, Option<Modifier>) {
    if let Some((field, modifier)) = key.split_once('|')
        && let Some(m) = Modifier::from_name(modifier)
    {
        return (field.to_string(), Some(m));
    }
    (key.to_string(), None)
}

/// The field match that [`parse`] reads back after [`serialize`].
///
/// A `|` typed into the field name is re-split the way a key is, so
/// `Image|endswith` with no modifier becomes `Image` + `endswith`.
pub fn canonicalize(fm: FieldMatch) -> FieldMatch {
    let (field, modifier) = split_field_key(&fm.key());
    FieldMatch {
        field,
        modifier,
        ..fm
    }
}

// =============================================================================
// Internal parsing helpers
// =============================================================================

fn parse_condition_value(value: &Value) -> String {
    if let Some(s) = scalar_to_string(value) {
        return s;
    }
    log::warn!("condition is not a scalar; treating it as empty");
    String::new()
}

/// A selection body is a mapping of field keys to values. Anything else
/// (keyword lists, lists of mappings) is outside what the editor handles and
/// becomes an empty selection.
fn parse_selection(name: String, value: &Value) -> Selection {
    let body = match value {
        Value::Mapping(m) => m,
        Value::Null => return Selection::new(name),
        _ => {
            log::warn!("selection '{name}' is not a mapping; replacing it with an empty one");
            return Selection::new(name);
        }
    };

    let data = body
        .iter()
        .filter_map(|(k, v)| {
            let Some(key) = scalar_to_string(k) else {
                log::warn!("skipping non-scalar field key in selection '{name}'");
                return None;
            };
            let (field, modifier) = split_field_key(&key);
            Some(FieldMatch::new(field, modifier, parse_values(v)))
        })
        .collect();

    Selection::with_data(name, data)
}

fn parse_values(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(seq) => seq.iter().filter_map(scalar_to_string).collect(),
        _ => vec![scalar_to_string(value).unwrap_or_default()],
    }
}

/// String form of a YAML scalar. `null` reads as the empty string; mappings
/// and sequences have no scalar form.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn values_to_yaml(values: &[String]) -> Value {
    match values {
        [single] => Value::String(single.clone()),
        _ => Value::Sequence(values.iter().cloned().map(Value::String).collect()),
    }
}

// =============================================================================
// Tests
// =============================================================================


#[cfg(test)]
mod proptests {
    use std::collections::BTreeSet;

    use super::*;
    use proptest::prelude::*;

    fn identifier() -> impl Strategy<Value = String> {
        "[A-Za-z_][A-Za-z0-9_]{0,8}"
    }

    fn field_match() -> impl Strategy<Value = FieldMatch> {
        (
            identifier(),
            prop::option::of(prop::sample::select(Modifier::ALL.to_vec())),
            prop::collection::vec("[ -~]{0,12}", 0..4),
        )
            .prop_map(|(field, modifier, values)| FieldMatch::new(field, modifier, values))
    }

    fn selection_body() -> impl Strategy<Value = Vec<FieldMatch>> {
        prop::collection::vec(field_match(), 1..4).prop_map(|mut data| {
            let mut seen = BTreeSet::new();
            data.retain(|fm| seen.insert(fm.field.clone()));
            data
        })
    }

    fn document() -> impl Strategy<Value = Document> {
        (
            prop::collection::btree_set(identifier(), 1..4),
            prop::collection::vec(selection_body(), 4),
            "[ -~]{0,20}",
        )
            .prop_map(|(names, bodies, condition)| {
                let selections = names
                    .into_iter()
                    .filter(|n| n != CONDITION_KEY)
                    .zip(bodies)
                    .map(|(name, data)| Selection::with_data(name, data))
                    .collect();
                Document::new(condition, selections)
            })
    }

    proptest! {
        #[test]
        fn serialize_then_parse_is_identity(doc in document()) {
            let text = serialize(&doc).unwrap();
            prop_assert_eq!(parse(&text), doc, "serialized:\n{}", text);
        }
    }
}
