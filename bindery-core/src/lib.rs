// Bindery Core Library
//
// Converts publisher-grade source documents (PDF, EPUB) into validated,
// chapterised DocBook bundles. Main interface for the conversion pipeline.

pub mod classify;
pub mod config;
pub mod docbook;
pub mod epub;
pub mod error;
pub mod extractors;
pub mod layout;
pub mod normalize;
pub mod ocr;
pub mod package;
pub mod pipeline;
pub mod qa;
pub mod reconcile;
pub mod types;
pub mod validate;

// Re-export main types and functions for easy use
pub use config::ConversionConfig;
pub use epub::convert_epub;
pub use error::{ConversionError, Result};
pub use pipeline::{convert_pdf, ConversionOutcome, ConvertOptions, PdfToolchain};
pub use qa::QaReport;
pub use types::*;
