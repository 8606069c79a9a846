// Layout analysis: positional stream parsing and structural labeling.
//
// The parser turns the positional XML into ordered lines and image markers;
// the labeler turns those into semantically labeled blocks.

pub mod labeler;
pub mod parser;

pub use labeler::{body_font_size, collect_multiline_book_title, label_blocks};
pub use parser::{
    assemble_lines, page_entries, parse_pdfxml_file, parse_pdfxml_str, PositionalDocument,
};

use crate::config::ConversionConfig;
use crate::types::Block;

/// Full layout analysis of a parsed positional document.
pub fn label_document(document: &PositionalDocument, config: &ConversionConfig) -> Vec<Block> {
    let entries = page_entries(document);
    label_blocks(&entries, &document.bookmarks, config)
}
