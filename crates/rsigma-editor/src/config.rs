//! Editor configuration.
//!
//! Loaded from a `.rsigma-editor.yml` file found next to (or above) the
//! detection block being edited, then overlaid with command-line flags.
//!
//! ```yaml
//! selection_prefix: Selection_
//! default_operator: and
//! import:
//!   max_bytes: 1048576
//!   delimiter: ","
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::import::{DEFAULT_DELIMITER, ImportOptions, MAX_IMPORT_BYTES};
use crate::model::{DEFAULT_SELECTION_PREFIX, Operator};

const CONFIG_FILE_NAMES: &[&str] = &[".rsigma-editor.yml", ".rsigma-editor.yaml"];

/// Settings for an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditorConfig {
    /// Prefix for generated selection names.
    pub selection_prefix: String,
    /// Connective used by the "add clause" action.
    pub default_operator: Operator,
    pub import: ImportOptions,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            selection_prefix: DEFAULT_SELECTION_PREFIX.to_string(),
            default_operator: Operator::And,
            import: ImportOptions::default(),
        }
    }
}

/// Raw YAML shape for `.rsigma-editor.yml`. Every key is optional so a file
/// (or a set of flags) can override just part of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEditorConfig {
    #[serde(default)]
    pub selection_prefix: Option<String>,
    #[serde(default)]
    pub default_operator: Option<String>,
    #[serde(default)]
    pub import: RawImportConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImportConfig {
    #[serde(default)]
    pub max_bytes: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl EditorConfig {
    /// Load a config file, filling unspecified keys with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: RawEditorConfig = serde_yaml::from_str(text)?;
        let mut config = EditorConfig::default();
        config.merge(&raw)?;
        Ok(config)
    }

    /// Walk up from `start_path` to find the nearest config file.
    ///
    /// Checks `start_path` itself (if a directory) or its parent, then
    /// ancestors until the filesystem root.
    pub fn find_in_ancestors(start_path: &Path) -> Option<PathBuf> {
        let dir = if start_path.is_file() {
            start_path.parent()?
        } else {
            start_path
        };

        let mut current = dir;
        loop {
            for name in CONFIG_FILE_NAMES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            current = current.parent()?;
        }
    }

    /// Overlay the keys set in `raw` (e.g. command-line flags) on this config.
    pub fn merge(&mut self, raw: &RawEditorConfig) -> Result<()> {
        if let Some(prefix) = &raw.selection_prefix {
            if prefix.is_empty() {
                return Err(EditorError::Config(
                    "selection_prefix must not be empty".into(),
                ));
            }
            self.selection_prefix = prefix.clone();
        }

        if let Some(op) = &raw.default_operator {
            self.default_operator = Operator::from_keyword(op).ok_or_else(|| {
                EditorError::Config(format!(
                    "invalid default_operator '{op}', expected and, or or not"
                ))
            })?;
        }

        if let Some(max_bytes) = raw.import.max_bytes {
            if max_bytes == 0 || max_bytes > MAX_IMPORT_BYTES {
                return Err(EditorError::Config(format!(
                    "import.max_bytes must be between 1 and {MAX_IMPORT_BYTES}"
                )));
            }
            self.import.max_bytes = max_bytes;
        }

        if let Some(delimiter) = &raw.import.delimiter {
            self.import.delimiter = parse_delimiter(delimiter)?;
        }

        Ok(())
    }
}

fn parse_delimiter(s: &str) -> Result<char> {
    if s == "\\t" {
        return Ok('\t');
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '\n' && c != '\r' => Ok(c),
        _ => Err(EditorError::Config(format!(
            "import.delimiter must be a single character, got '{s}' (default '{DEFAULT_DELIMITER}')"
        ))),
    }
}
