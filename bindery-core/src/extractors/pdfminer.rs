//! pdfminer.six-backed secondary extractor.
//!
//! Deliberately a different engine from the Poppler extractor so the
//! reconciler compares genuinely independent readings of the same document.
//! `pdf2txt.py` honours the same form-feed page separation contract.

use super::{pages_from_form_feeds, TextExtractor};
use crate::error::{Result, Stage};
use crate::extractors::process::run_cmd;
use crate::types::PageText;
use std::path::Path;

pub struct PdfMinerTextExtractor;

impl TextExtractor for PdfMinerTextExtractor {
    fn extract_pages(&self, pdf_path: &Path) -> Result<Vec<PageText>> {
        let args = [pdf_path.display().to_string()];
        let output = run_cmd("pdf2txt.py", Stage::Extraction, &args, &[])?;
        Ok(pages_from_form_feeds(&output))
    }

    fn name(&self) -> &str {
        "pdf2txt"
    }
}
