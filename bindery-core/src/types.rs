use serde::{Deserialize, Serialize};

use crate::normalize::checksum;

// ===== PAGE TEXT =====
// One record per physical page, produced by a text extractor and mutated
// only by the normalizer. Frozen after normalization.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationEvent {
    pub rule: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number
    pub page_num: u32,
    pub raw_text: String,
    pub norm_text: String,
    /// SHA-256 of norm_text, lowercase hex
    pub checksum: String,
    #[serde(default)]
    pub has_ocr: bool,
    #[serde(default)]
    pub events: Vec<NormalizationEvent>,
}

impl PageText {
    pub fn new(page_num: u32, raw_text: String) -> Self {
        let digest = checksum(&raw_text);
        Self {
            page_num,
            norm_text: raw_text.clone(),
            raw_text,
            checksum: digest,
            has_ocr: false,
            events: Vec::new(),
        }
    }
}

/// Per-page QA flag vocabulary, shared by the reconciler and the QA pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFlag {
    MissingOutputPage,
    TextMismatch,
    CharCountDiff,
}

impl PageFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageFlag::MissingOutputPage => "missing_output_page",
            PageFlag::TextMismatch => "text_mismatch",
            PageFlag::CharCountDiff => "char_count_diff",
        }
    }
}

impl std::fmt::Display for PageFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===== GEOMETRY =====
// Positional records assembled from the pdf2xml stream. Coordinates are in
// points with the origin at the top-left of the page.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub left: f32,
    pub width: f32,
    pub font_size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub page_num: u32,
    pub page_width: f32,
    pub page_height: f32,
    pub top: f32,
    pub left: f32,
    pub height: f32,
    pub font_size: f32,
    pub text: String,
    pub segments: Vec<TextSegment>,
}

/// Tolerance used when clustering segment lefts into column positions.
const COLUMN_TOLERANCE: f32 = 6.0;

impl Line {
    /// Rightmost edge across all segments.
    pub fn right(&self) -> f32 {
        self.segments
            .iter()
            .map(|seg| seg.left + seg.width)
            .fold(None, |acc: Option<f32>, value| {
                Some(acc.map_or(value, |a| a.max(value)))
            })
            .unwrap_or(self.left)
    }

    /// Canonical left x-coordinates of the text columns within this line,
    /// computed by clustering segment lefts and smoothing jitter with a
    /// running midpoint.
    pub fn column_positions(&self) -> Vec<f32> {
        let mut segments: Vec<&TextSegment> = self.segments.iter().collect();
        segments.sort_by(|a, b| a.left.total_cmp(&b.left));

        let mut positions: Vec<f32> = Vec::new();
        for segment in segments {
            let mut placed = false;
            for value in positions.iter_mut() {
                if (*value - segment.left).abs() <= COLUMN_TOLERANCE {
                    *value = (*value + segment.left) / 2.0;
                    placed = true;
                    break;
                }
            }
            if !placed {
                positions.push(segment.left);
            }
        }
        positions.sort_by(|a, b| a.total_cmp(b));
        positions
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    pub page_num: u32,
    pub src: String,
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

/// A positional entry in reading order: either an assembled text line or an
/// image marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LayoutEntry {
    Line(Line),
    Image(PageImage),
}

impl LayoutEntry {
    pub fn page_num(&self) -> u32 {
        match self {
            LayoutEntry::Line(line) => line.page_num,
            LayoutEntry::Image(image) => image.page_num,
        }
    }

    pub fn top(&self) -> f32 {
        match self {
            LayoutEntry::Line(line) => line.top,
            LayoutEntry::Image(image) => image.top,
        }
    }

    pub fn left(&self) -> f32 {
        match self {
            LayoutEntry::Line(line) => line.left,
            LayoutEntry::Image(image) => image.left,
        }
    }

    pub fn as_line(&self) -> Option<&Line> {
        match self {
            LayoutEntry::Line(line) => Some(line),
            LayoutEntry::Image(_) => None,
        }
    }
}

// ===== LABELED BLOCKS =====
// The labeler's output. Label-specific payloads live on the variant so every
// downstream switch is exhaustive.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Ordered,
    Itemized,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum BlockKind {
    BookTitle,
    Toc,
    Chapter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
    },
    Section,
    Para,
    ListItem {
        list_type: ListType,
    },
    Figure {
        src: String,
    },
    Table {
        rows: Vec<Vec<String>>,
    },
    Caption,
    Footnote,
}

impl BlockKind {
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::BookTitle => "book_title",
            BlockKind::Toc => "toc",
            BlockKind::Chapter { .. } => "chapter",
            BlockKind::Section => "section",
            BlockKind::Para => "para",
            BlockKind::ListItem { .. } => "list_item",
            BlockKind::Figure { .. } => "figure",
            BlockKind::Table { .. } => "table",
            BlockKind::Caption => "caption",
            BlockKind::Footnote => "footnote",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(flatten)]
    pub kind: BlockKind,
    pub text: String,
    pub page_num: u32,
    pub bbox: BBox,
    pub font_size: f32,
}

impl Block {
    pub fn new(kind: BlockKind, text: String, page_num: u32, bbox: BBox, font_size: f32) -> Self {
        Self {
            kind,
            text,
            page_num,
            bbox,
            font_size,
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// A block after the classifier shim. The tree builder always consumes
/// `classifier_label` in preference to the heuristic label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledBlock {
    #[serde(flatten)]
    pub block: Block,
    pub classifier_label: String,
    pub classifier_confidence: f32,
}

impl LabeledBlock {
    /// Wrap a block with the heuristic label echoed at full confidence.
    pub fn passthrough(block: Block) -> Self {
        let label = block.label().to_string();
        Self {
            block,
            classifier_label: label,
            classifier_confidence: 1.0,
        }
    }
}
