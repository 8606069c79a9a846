//! OCR escalation for image-only pages.
//!
//! The reconciler hands over the pages both extractors agree are image-only;
//! the engine adds a text layer to exactly those pages and the extractors
//! rerun on the returned document.

use crate::error::{Result, Stage};
use crate::extractors::process::run_cmd;
use std::path::{Path, PathBuf};

/// External OCR engine contract: force-OCR the listed pages, skip pages that
/// already carry text, write the augmented PDF to `out_path`.
pub trait OcrEngine {
    fn ocr(&self, pdf_path: &Path, pages: &[u32], out_path: &Path) -> Result<PathBuf>;

    fn name(&self) -> &str;
}

/// Collapse a page set into the compact range expression the OCR engine
/// expects, e.g. `[1,2,3,5,9,10]` -> `"1-3,5,9-10"`.
pub fn collapse_ranges(pages: &[u32]) -> String {
    let mut sorted: Vec<u32> = pages.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<String> = Vec::new();
    let mut run: Option<(u32, u32)> = None;
    for page in sorted {
        match run {
            None => run = Some((page, page)),
            Some((start, prev)) if page == prev + 1 => run = Some((start, page)),
            Some((start, prev)) => {
                ranges.push(format_range(start, prev));
                run = Some((page, page));
            }
        }
    }
    if let Some((start, prev)) = run {
        ranges.push(format_range(start, prev));
    }
    ranges.join(",")
}

fn format_range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

/// OCRmyPDF-backed engine.
pub struct OcrMyPdfEngine {
    pub language: String,
}

impl OcrMyPdfEngine {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    fn build_args(&self, pdf_path: &Path, page_spec: &str, out_path: &Path) -> Vec<String> {
        vec![
            "--force-ocr".to_string(),
            "--skip-text".to_string(),
            "--language".to_string(),
            self.language.clone(),
            "--pages".to_string(),
            page_spec.to_string(),
            pdf_path.display().to_string(),
            out_path.display().to_string(),
        ]
    }
}

impl OcrEngine for OcrMyPdfEngine {
    fn ocr(&self, pdf_path: &Path, pages: &[u32], out_path: &Path) -> Result<PathBuf> {
        if pages.is_empty() {
            return Ok(pdf_path.to_path_buf());
        }
        let page_spec = collapse_ranges(pages);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        println!(
            "🔎 Running OCR on {} pages {}",
            pdf_path.display(),
            page_spec
        );
        let args = self.build_args(pdf_path, &page_spec, out_path);
        run_cmd("ocrmypdf", Stage::Ocr, &args, &[])?;
        Ok(out_path.to_path_buf())
    }

    fn name(&self) -> &str {
        "ocrmypdf"
    }
}
