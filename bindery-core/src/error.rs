// Error model for the conversion pipeline.
//
// Recoverable conditions (reconciliation flags, missing media, classifier
// fallback) are values carried through the pipeline, not errors. Everything
// in this module is fatal for the current conversion: the error record keeps
// the pipeline stage and, for subprocess failures, the captured stderr so
// batch callers can report what actually went wrong.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConversionError>;

/// Pipeline stage where a fatal error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Ocr,
    Layout,
    Structure,
    Packaging,
    Validation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extraction => "extraction",
            Stage::Ocr => "ocr",
            Stage::Layout => "layout",
            Stage::Structure => "structure",
            Stage::Packaging => "packaging",
            Stage::Validation => "validation",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Error)]
pub enum ConversionError {
    /// Source document or required companion file does not exist.
    #[error("input not found: {0}")]
    InputNotFound(PathBuf),

    /// Input exists but cannot be interpreted (bad EPUB container, missing
    /// OPF spine item, empty content in strict mode).
    #[error("invalid input {path}: {message}")]
    InvalidInput { path: PathBuf, message: String },

    /// An external tool exited non-zero. stderr is attached verbatim.
    #[error("{tool} failed during {stage}: {stderr}")]
    Subprocess {
        tool: String,
        stage: Stage,
        stderr: String,
    },

    /// Malformed positional XML (unparseable geometry attributes, truncated
    /// document).
    #[error("malformed positional XML: {0}")]
    Layout(String),

    /// Strict mode: extractors still disagree after the optional OCR pass.
    #[error("strict mode: extractor mismatch on pages {pages:?}")]
    StrictMismatch { pages: Vec<u32> },

    /// Strict mode: the QA pass flagged pages.
    #[error("strict mode: flagged pages {pages:?}")]
    StrictFlagged { pages: Vec<u32> },

    /// DTD validation rejected the document.
    #[error("DTD validation failed: {stderr}")]
    Validation { stderr: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    /// Exit code for the CLI collaborator contract: 2 for missing inputs,
    /// 1 for everything else fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConversionError::InputNotFound(_) => 2,
            _ => 1,
        }
    }
}
