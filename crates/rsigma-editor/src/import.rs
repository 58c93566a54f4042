//! Importing field values from an uploaded text file.
//!
//! The upload widget hands over raw bytes and the declared MIME type.
//! Accepted uploads become an ordered list of values; anything else is
//! reported as [`ImportRejected`] and leaves the document alone.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted upload, in bytes (1 MiB).
pub const MAX_IMPORT_BYTES: usize = 1024 * 1024;

pub const DEFAULT_DELIMITER: char = ',';

/// How the uploaded text is split into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportShape {
    /// One record per line; only the first column is kept.
    Csv,
    /// One value per line, kept verbatim.
    NewlineDelimited,
}

impl ImportShape {
    /// Shape implied by a declared MIME type. Parameters such as
    /// `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/csv" => Some(ImportShape::Csv),
            "text/plain" => Some(ImportShape::NewlineDelimited),
            _ => None,
        }
    }
}

/// An uploaded file as received from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl Upload {
    pub fn new(bytes: impl Into<Vec<u8>>, mime: impl Into<String>) -> Self {
        Upload {
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }
}

/// Limits applied to uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    pub max_bytes: usize,
    pub delimiter: char,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            max_bytes: MAX_IMPORT_BYTES,
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

/// Why an upload was not turned into values. Every variant maps to the
/// same `invalid-file` signal for the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportRejected {
    #[error("file is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported file type '{0}', expected text/csv or text/plain")]
    UnsupportedType(String),

    #[error("file is not valid UTF-8 text")]
    NotUtf8,
}

impl ImportRejected {
    pub fn code(&self) -> &'static str {
        "invalid-file"
    }
}

/// Check an upload against the size and type contract and split it into
/// values using the shape its MIME type declares.
pub fn import_upload(
    upload: &Upload,
    options: &ImportOptions,
) -> Result<Vec<String>, ImportRejected> {
    if upload.bytes.len() > options.max_bytes {
        return Err(ImportRejected::TooLarge {
            size: upload.bytes.len(),
            limit: options.max_bytes,
        });
    }
    let shape = ImportShape::from_mime(&upload.mime)
        .ok_or_else(|| ImportRejected::UnsupportedType(upload.mime.clone()))?;
    let text = std::str::from_utf8(&upload.bytes).map_err(|_| ImportRejected::NotUtf8)?;

    Ok(import_values(text, shape, options.delimiter))
}

/// Split `text` into values.
///
/// Lines end at `\n` (a preceding `\r` is dropped). A single trailing empty
/// line, the one produced by a final newline, is not a value.
pub fn import_values(text: &str, shape: ImportShape, delimiter: char) -> Vec<String> {
    text.lines()
        .map(|line| match shape {
            ImportShape::Csv => line.split(delimiter).next().unwrap_or_default().to_string(),
            ImportShape::NewlineDelimited => line.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_keeps_first_column() {
        assert_eq!(
            import_values("a,b\nc,d\n", ImportShape::Csv, ','),
            vec!["a", "c"]
        );
    }

    #[test]
    fn csv_custom_delimiter() {
        assert_eq!(
            import_values("a;b\nc,x;d", ImportShape::Csv, ';'),
            vec!["a", "c,x"]
        );
    }

    #[test]
    fn newline_keeps_lines_verbatim() {
        assert_eq!(
            import_values("a,b\n  c \n", ImportShape::NewlineDelimited, ','),
            vec!["a,b", "  c "]
        );
    }

    #[test]
    fn only_one_trailing_empty_line_dropped() {
        assert_eq!(
            import_values("a\n\n", ImportShape::NewlineDelimited, ','),
            vec!["a", ""]
        );
        assert_eq!(
            import_values("a\nb", ImportShape::NewlineDelimited, ','),
            vec!["a", "b"]
        );
        assert!(import_values("", ImportShape::Csv, ',').is_empty());
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            import_values("a,1\r\nb,2\r\n", ImportShape::Csv, ','),
            vec!["a", "b"]
        );
    }

    #[test]
    fn shape_from_mime() {
        assert_eq!(ImportShape::from_mime("text/csv"), Some(ImportShape::Csv));
        assert_eq!(
            ImportShape::from_mime("text/plain; charset=utf-8"),
            Some(ImportShape::NewlineDelimited)
        );
        assert_eq!(ImportShape::from_mime("application/json"), None);
    }

    #[test]
    fn upload_accepted() {
        let upload = Upload::new("x,1\ny,2\n", "text/csv");
        assert_eq!(
            import_upload(&upload, &ImportOptions::default()).unwrap(),
            vec!["x", "y"]
        );
    }

    #[test]
    fn upload_too_large() {
        let upload = Upload::new(vec![b'a'; MAX_IMPORT_BYTES + 1], "text/plain");
        let err = import_upload(&upload, &ImportOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ImportRejected::TooLarge {
                size: MAX_IMPORT_BYTES + 1,
                limit: MAX_IMPORT_BYTES
            }
        );
        assert_eq!(err.code(), "invalid-file");
    }

    #[test]
    fn upload_at_limit_accepted() {
        let upload = Upload::new(vec![b'a'; MAX_IMPORT_BYTES], "text/plain");
        let values = import_upload(&upload, &ImportOptions::default()).unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn upload_wrong_type() {
        let upload = Upload::new("a", "image/png");
        assert_eq!(
            import_upload(&upload, &ImportOptions::default()),
            Err(ImportRejected::UnsupportedType("image/png".into()))
        );
    }

    #[test]
    fn upload_not_utf8() {
        let upload = Upload::new(vec![0xff, 0xfe, 0x00], "text/plain");
        assert_eq!(
            import_upload(&upload, &ImportOptions::default()),
            Err(ImportRejected::NotUtf8)
        );
    }
}
