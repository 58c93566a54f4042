//! Edit coordinator: applies one user edit to a document.
//!
//! Each call to [`Editor::apply`] takes the current [`EditorState`] by
//! reference and returns a new one. Within an edit the order is fixed:
//!
//! 1. the structural change to the document,
//! 2. re-deriving the condition string from its clauses,
//! 3. validation of the resulting document,
//!
//! so the error map always describes the document it is returned with.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::condition::{self, available_names, compose, decompose};
use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::import::{ImportRejected, Upload, import_upload};
use crate::model::{Clause, Document, FieldMatch, Operator, Selection};
use crate::validate::{ErrorMap, FieldId, validate_document};

// =============================================================================
// Edits
// =============================================================================

/// A single logical edit coming from the host UI.
///
/// Indices address the document the edit is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    RenameSelection {
        selection: usize,
        name: String,
    },
    DeleteSelection {
        selection: usize,
    },
    AddSelection,
    SetFieldMatch {
        selection: usize,
        field: usize,
        field_match: FieldMatch,
    },
    AddFieldMatch {
        selection: usize,
    },
    DeleteFieldMatch {
        selection: usize,
        field: usize,
    },
    SetCondition {
        condition: String,
    },
    ImportValues {
        selection: usize,
        field: usize,
        upload: Upload,
    },
    /// Append `{default operator, first unused selection}` to the condition.
    AddClause,
    /// Change the operator and/or selection of one clause.
    SetClause {
        clause: usize,
        #[serde(default)]
        operator: Option<Operator>,
        #[serde(default)]
        selection_name: Option<String>,
    },
    RemoveClause {
        clause: usize,
    },
}

impl Edit {
    pub fn name(&self) -> &'static str {
        match self {
            Edit::RenameSelection { .. } => "rename_selection",
            Edit::DeleteSelection { .. } => "delete_selection",
            Edit::AddSelection => "add_selection",
            Edit::SetFieldMatch { .. } => "set_field_match",
            Edit::AddFieldMatch { .. } => "add_field_match",
            Edit::DeleteFieldMatch { .. } => "delete_field_match",
            Edit::SetCondition { .. } => "set_condition",
            Edit::ImportValues { .. } => "import_values",
            Edit::AddClause => "add_clause",
            Edit::SetClause { .. } => "set_clause",
            Edit::RemoveClause { .. } => "remove_clause",
        }
    }
}

// =============================================================================
// Editor state
// =============================================================================

/// A document together with its validation results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorState {
    pub document: Document,
    /// All current errors, touched or not.
    pub errors: ErrorMap,
    /// Inputs the user has edited; only their errors are shown.
    pub touched: BTreeSet<FieldId>,
    /// Set when the last edit was an import the upload contract rejected.
    /// The document is unchanged in that case.
    #[serde(serialize_with = "serialize_rejection")]
    pub import_error: Option<ImportRejected>,
    /// Condition names kept for selections renamed to something that cannot
    /// appear in a condition (empty, `A B`, a keyword), keyed by selection
    /// index. The next valid rename rewrites the kept name.
    #[serde(skip)]
    pending_renames: BTreeMap<usize, String>,
}

impl EditorState {
    fn new(document: Document, touched: BTreeSet<FieldId>) -> Self {
        let errors = validate_document(&document);
        EditorState {
            document,
            errors,
            touched,
            import_error: None,
            pending_renames: BTreeMap::new(),
        }
    }

    /// Errors for touched inputs only.
    pub fn visible_errors(&self) -> ErrorMap {
        self.errors.visible(&self.touched)
    }

    /// `true` when the document has no errors at all, touched or not.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Mark every input as touched, e.g. before a save attempt.
    pub fn touch_all(&self) -> EditorState {
        let mut touched = self.touched.clone();
        touched.insert(FieldId::Condition);
        for (s, selection) in self.document.selections.iter().enumerate() {
            touched.insert(FieldId::SelectionName { selection: s });
            for f in 0..selection.data.len() {
                touched.insert(FieldId::FieldName {
                    selection: s,
                    field: f,
                });
                touched.insert(FieldId::Value {
                    selection: s,
                    field: f,
                });
            }
        }
        EditorState {
            touched,
            ..self.clone()
        }
    }

    /// The condition as a clause chain.
    pub fn clauses(&self) -> Vec<Clause> {
        decompose(&self.document.condition, &self.document.selection_names())
    }

    /// Selection names a new clause may still reference.
    pub fn available_names(&self) -> Vec<String> {
        available_names(&self.document.selection_names(), &self.clauses())
    }

    pub fn to_yaml(&self) -> Result<String> {
        codec::serialize(&self.document)
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Applies edits according to an [`EditorConfig`].
#[derive(Debug, Clone, Default)]
pub struct Editor {
    config: EditorConfig,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Editor { config }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Start a session from raw detection block text. Nothing is touched yet.
    pub fn load(&self, text: &str) -> EditorState {
        let document = codec::parse_with_prefix(text, &self.config.selection_prefix);
        EditorState::new(document, BTreeSet::new())
    }

    /// Start a session from an existing document.
    pub fn open(&self, document: Document) -> EditorState {
        EditorState::new(document, BTreeSet::new())
    }

    /// Apply a sequence of edits, stopping at the first index error.
    pub fn apply_all(
        &self,
        state: &EditorState,
        edits: impl IntoIterator<Item = Edit>,
    ) -> Result<EditorState> {
        let mut current = state.clone();
        for edit in edits {
            current = self.apply(&current, edit)?;
        }
        Ok(current)
    }

    /// Apply one edit, returning the new state. `state` is left untouched.
    ///
    /// Only caller mistakes produce an `Err`: indices that do not address
    /// anything in the document, or a clause pointed at a selection another
    /// clause already uses. Everything else is reported in the returned
    /// error map.
    pub fn apply(&self, state: &EditorState, edit: Edit) -> Result<EditorState> {
        log::debug!("applying {} edit", edit.name());

        let mut doc = state.document.clone();
        let mut touched = state.touched.clone();
        let mut pending = state.pending_renames.clone();
        let mut import_error = None;

        match edit {
            Edit::RenameSelection { selection, name } => {
                let old = selection_ref(&doc, selection)?.name.clone();
                doc.selections[selection].name = name.clone();
                touched.insert(FieldId::SelectionName { selection });

                // The condition may still use a name this selection had
                // before an unusable rename.
                let linked = pending.remove(&selection).unwrap_or(old);
                // Only a name no other selection holds is rewritten, and
                // only into a name that is unique and fits the grammar.
                let orphaned = linked != name
                    && is_single_token(&linked)
                    && doc.name_count(&linked) == 0;
                if orphaned {
                    if condition::is_selection_token(&name) && doc.name_count(&name) == 1 {
                        doc.condition =
                            condition::rename_selection(&doc.condition, &linked, &name);
                    } else {
                        pending.insert(selection, linked);
                    }
                }
            }

            Edit::DeleteSelection { selection } => {
                selection_ref(&doc, selection)?;
                let removed = doc.selections.remove(selection);
                let linked = pending.remove(&selection).unwrap_or(removed.name);
                if doc.name_count(&linked) == 0 {
                    doc.condition = condition::remove_selection(&doc.condition, &linked);
                }
                touched = reindex_after_selection_removal(&touched, selection);
                pending = pending
                    .into_iter()
                    .map(|(s, n)| if s > selection { (s - 1, n) } else { (s, n) })
                    .collect();
            }

            Edit::AddSelection => {
                let name = doc.next_selection_name(&self.config.selection_prefix);
                doc.selections.push(Selection::new(name));
            }

            Edit::SetFieldMatch {
                selection,
                field,
                field_match,
            } => {
                let field_match = codec::canonicalize(field_match);
                let slot = field_match_mut(&mut doc, selection, field)?;
                if slot.key() != field_match.key() {
                    touched.insert(FieldId::FieldName { selection, field });
                }
                if slot.values != field_match.values {
                    touched.insert(FieldId::Value { selection, field });
                }
                *slot = field_match;
            }

            Edit::AddFieldMatch { selection } => {
                let sel = selection_mut(&mut doc, selection)?;
                // An unfilled slot already exists; a second would share its key.
                if sel.data.iter().any(|fm| fm.key().is_empty()) {
                    log::debug!("selection {selection} already has an unfilled field match");
                } else {
                    sel.data.push(FieldMatch::empty());
                }
            }

            Edit::DeleteFieldMatch { selection, field } => {
                let sel = selection_mut(&mut doc, selection)?;
                if field >= sel.data.len() {
                    return Err(EditorError::FieldMatchOutOfRange { selection, field });
                }
                if sel.data.len() == 1 {
                    // A selection always keeps one slot; clear it instead.
                    sel.data[0] = FieldMatch::empty();
                } else {
                    sel.data.remove(field);
                }
                touched = reindex_after_field_removal(&touched, selection, field);
            }

            Edit::SetCondition { condition } => {
                doc.condition = condition;
                touched.insert(FieldId::Condition);
            }

            Edit::ImportValues {
                selection,
                field,
                upload,
            } => {
                let slot = field_match_mut(&mut doc, selection, field)?;
                match import_upload(&upload, &self.config.import) {
                    Ok(values) => {
                        log::debug!("imported {} values", values.len());
                        slot.values = values;
                        touched.insert(FieldId::Value { selection, field });
                    }
                    Err(e) => {
                        log::info!("import rejected: {e}");
                        import_error = Some(e);
                    }
                }
            }

            Edit::AddClause => {
                let names = doc.selection_names();
                let clauses = decompose(&doc.condition, &names);
                let next = condition::append_clause(&clauses, &names, self.config.default_operator)
                    .map(|c| compose(&c));
                match next {
                    Some(condition) => doc.condition = condition,
                    None => log::debug!("every selection is already used by a clause"),
                }
            }

            Edit::SetClause {
                clause,
                operator,
                selection_name,
            } => {
                let names = doc.selection_names();
                let mut clauses = decompose(&doc.condition, &names);
                if clause >= clauses.len() {
                    return Err(EditorError::ClauseOutOfRange(clause));
                }
                if let Some(name) = selection_name {
                    let used_elsewhere = clauses
                        .iter()
                        .enumerate()
                        .any(|(i, c)| i != clause && c.selection_name == name);
                    if used_elsewhere {
                        return Err(EditorError::SelectionInUse(name));
                    }
                    clauses[clause].selection_name = name;
                }
                if let Some(op) = operator {
                    clauses[clause].operator = op;
                }
                doc.condition = compose(&condition::normalize(clauses));
                touched.insert(FieldId::Condition);
            }

            Edit::RemoveClause { clause } => {
                let names = doc.selection_names();
                let clauses = decompose(&doc.condition, &names);
                if clause >= clauses.len() {
                    return Err(EditorError::ClauseOutOfRange(clause));
                }
                doc.condition = compose(&condition::remove_clause(&clauses, clause));
                touched.insert(FieldId::Condition);
            }
        }

        let mut next = EditorState::new(doc, touched);
        next.import_error = import_error;
        next.pending_renames = pending;
        Ok(next)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A name the condition can hold in one name position.
fn is_single_token(name: &str) -> bool {
    !name.is_empty() && !name.contains(' ')
}

fn selection_ref(doc: &Document, selection: usize) -> Result<&Selection> {
    doc.selections
        .get(selection)
        .ok_or(EditorError::SelectionOutOfRange(selection))
}

fn selection_mut(doc: &mut Document, selection: usize) -> Result<&mut Selection> {
    doc.selections
        .get_mut(selection)
        .ok_or(EditorError::SelectionOutOfRange(selection))
}

fn field_match_mut(doc: &mut Document, selection: usize, field: usize) -> Result<&mut FieldMatch> {
    selection_mut(doc, selection)?
        .data
        .get_mut(field)
        .ok_or(EditorError::FieldMatchOutOfRange { selection, field })
}

/// Drop ids of the removed selection and shift later selections down.
fn reindex_after_selection_removal(touched: &BTreeSet<FieldId>, removed: usize) -> BTreeSet<FieldId> {
    touched
        .iter()
        .filter_map(|id| match id.selection() {
            Some(s) if s == removed => None,
            Some(s) if s > removed => Some(with_selection(*id, s - 1)),
            _ => Some(*id),
        })
        .collect()
}

/// Drop ids of the removed field match and shift later ones down.
fn reindex_after_field_removal(
    touched: &BTreeSet<FieldId>,
    selection: usize,
    removed: usize,
) -> BTreeSet<FieldId> {
    touched
        .iter()
        .filter_map(|id| {
            if id.selection() != Some(selection) {
                return Some(*id);
            }
            match id.field() {
                Some(f) if f == removed => None,
                Some(f) if f > removed => Some(with_field(*id, f - 1)),
                _ => Some(*id),
            }
        })
        .collect()
}

fn with_selection(id: FieldId, selection: usize) -> FieldId {
    match id {
        FieldId::Condition => FieldId::Condition,
        FieldId::SelectionName { .. } => FieldId::SelectionName { selection },
        FieldId::FieldName { field, .. } => FieldId::FieldName { selection, field },
        FieldId::Value { field, .. } => FieldId::Value { selection, field },
    }
}

fn with_field(id: FieldId, field: usize) -> FieldId {
    match id {
        FieldId::FieldName { selection, .. } => FieldId::FieldName { selection, field },
        FieldId::Value { selection, .. } => FieldId::Value { selection, field },
        other => other,
    }
}

fn serialize_rejection<S: serde::Serializer>(
    rejection: &Option<ImportRejected>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match rejection {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

// =============================================================================
// Tests
// =============================================================================
