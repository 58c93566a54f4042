//! # rsigma-editor
//!
//! Editing engine for Sigma detection blocks.
//!
//! A detection block is the part of a Sigma rule that holds the named
//! selections and the condition combining them. This crate turns such a
//! block into an editable [`Document`], applies user edits to it, keeps the
//! condition consistent with the selections, validates everything after each
//! edit, and writes the result back out as YAML.
//!
//! - [`codec`]: YAML text ↔ [`Document`], preserving order, modifiers and
//!   the scalar/list distinction
//! - [`condition`]: condition string ↔ flat clause chain, backed by a PEG
//!   grammar ([`pest`])
//! - [`validate`]: field-keyed validation of names, values and the condition
//! - [`editor`]: the coordinator that applies one [`Edit`] at a time
//! - [`import`]: turning uploaded CSV / plain-text files into value lists
//! - [`config`]: per-project settings from `.rsigma-editor.yml`
//!
//! ## Quick Start
//!
//! ```rust
//! use rsigma_editor::{Edit, Editor};
//!
//! let yaml = r#"
//! condition: selection and filter
//! selection:
//!     CommandLine|contains: whoami
//! filter:
//!     User: SYSTEM
//! "#;
//!
//! let editor = Editor::default();
//! let state = editor.load(yaml);
//! assert!(state.is_valid());
//!
//! let state = editor
//!     .apply(&state, Edit::RenameSelection { selection: 1, name: "not_system".into() })
//!     .unwrap();
//! assert_eq!(state.document.condition, "selection and not_system");
//! ```

pub mod codec;
pub mod condition;
pub mod config;
pub mod editor;
pub mod error;
pub mod import;
pub mod model;
pub mod validate;

// Re-export the most commonly used types and functions at crate root
pub use codec::{parse, serialize, try_parse};
pub use condition::{ConditionSyntaxError, compose, decompose, parse_clauses};
pub use config::{EditorConfig, RawEditorConfig};
pub use editor::{Edit, Editor, EditorState};
pub use error::{EditorError, Result};
pub use import::{
    ImportOptions, ImportRejected, ImportShape, Upload, import_upload, import_values,
};
pub use model::{Clause, Document, FieldMatch, Modifier, Operator, Selection};
pub use validate::{ErrorMap, FieldId, ValidationError, validate_document};
