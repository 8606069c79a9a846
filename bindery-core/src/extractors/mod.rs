// Extractor abstraction for the text acquisition stage.
//
// Two independent extractors run on every PDF so their output can be
// cross-verified page by page. The traits here are the subprocess boundary:
// each implementation wraps one external tool, and a pure-library backend
// can replace any of them without touching the pipeline.

pub mod pdfminer;
pub mod poppler;
pub mod process;

use crate::error::Result;
use crate::types::PageText;
use std::path::Path;

pub use pdfminer::PdfMinerTextExtractor;
pub use poppler::{PopplerTextExtractor, PopplerXmlProducer};

/// Per-page plain-text extraction. One `PageText` per physical page,
/// numbered from 1, in document order.
pub trait TextExtractor {
    fn extract_pages(&self, pdf_path: &Path) -> Result<Vec<PageText>>;

    /// Extractor name for logging and diagnostics
    fn name(&self) -> &str;
}

/// Positional representation producer: writes the per-page
/// `<text top/left/width/height font>` stream the layout analyzer consumes.
pub trait PdfXmlProducer {
    fn produce_xml(&self, pdf_path: &Path, out_path: &Path) -> Result<()>;

    fn name(&self) -> &str;
}

/// Split a form-feed separated extractor output into page records.
///
/// Extractors terminate every page with U+000C including the last one, so a
/// single trailing empty segment is dropped; interior empty segments are
/// real (image-only) pages and are preserved.
pub fn pages_from_form_feeds(output: &str) -> Vec<PageText> {
    let mut parts: Vec<&str> = output.split('\u{000C}').collect();
    if parts.len() > 1 && parts.last().is_some_and(|last| last.is_empty()) {
        parts.pop();
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, text)| PageText::new(idx as u32 + 1, text.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_from_form_feeds_numbering() {
        let pages = pages_from_form_feeds("first\u{000C}second\u{000C}");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_num, 1);
        assert_eq!(pages[0].raw_text, "first");
        assert_eq!(pages[1].page_num, 2);
        assert_eq!(pages[1].raw_text, "second");
    }

    #[test]
    fn test_interior_empty_pages_survive() {
        let pages = pages_from_form_feeds("one\u{000C}\u{000C}three\u{000C}");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].raw_text, "");
    }

    #[test]
    fn test_single_page_without_trailing_feed() {
        let pages = pages_from_form_feeds("only");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].raw_text, "only");
    }
}
