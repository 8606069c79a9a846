//! Poppler-backed extractors: `pdftotext` for the primary text stream and
//! `pdftohtml -xml` for the positional representation.

use super::{pages_from_form_feeds, PdfXmlProducer, TextExtractor};
use crate::error::{Result, Stage};
use crate::extractors::process::run_cmd;
use crate::types::PageText;
use std::path::Path;

pub struct PopplerTextExtractor;

impl TextExtractor for PopplerTextExtractor {
    fn extract_pages(&self, pdf_path: &Path) -> Result<Vec<PageText>> {
        let args = [
            "-enc".to_string(),
            "UTF-8".to_string(),
            "-layout".to_string(),
            pdf_path.display().to_string(),
            "-".to_string(),
        ];
        let output = run_cmd("pdftotext", Stage::Extraction, &args, &[])?;
        Ok(pages_from_form_feeds(&output))
    }

    fn name(&self) -> &str {
        "pdftotext"
    }
}

pub struct PopplerXmlProducer;

impl PdfXmlProducer for PopplerXmlProducer {
    fn produce_xml(&self, pdf_path: &Path, out_path: &Path) -> Result<()> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let args = [
            "-xml".to_string(),
            "-enc".to_string(),
            "UTF-8".to_string(),
            "-nodrm".to_string(),
            "-zoom".to_string(),
            "1.0".to_string(),
            pdf_path.display().to_string(),
            out_path.display().to_string(),
        ];
        run_cmd("pdftohtml", Stage::Extraction, &args, &[])?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pdftohtml"
    }
}
