use thiserror::Error;

/// Errors surfaced by the editing engine.
///
/// User mistakes (bad names, unknown selections, rejected uploads) are never
/// reported through this type; they are returned as data alongside the
/// document. These variants cover I/O, malformed host input and indices
/// that do not address anything in the document.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Detection block is not a YAML mapping")]
    NotAMapping,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No selection at index {0}")]
    SelectionOutOfRange(usize),

    #[error("No field match at index {field} in selection {selection}")]
    FieldMatchOutOfRange { selection: usize, field: usize },

    #[error("No clause at index {0}")]
    ClauseOutOfRange(usize),

    #[error("Selection '{0}' is already used by another clause")]
    SelectionInUse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EditorError>;
