//! Labeler behavior over positional fixtures: book titles, chapter boundary
//! guidance (TOC, bookmarks, keywords), index grouping, lists, captions and
//! tables.

use bindery_core::config::ConversionConfig;
use bindery_core::layout::{collect_multiline_book_title, label_document, parse_pdfxml_str};
use bindery_core::types::{Block, BlockKind, LayoutEntry, Line, ListType, TextSegment};

// ============================================================================
// Fixture helpers
// ============================================================================

fn make_line(text: &str, page: u32, top: f32, left: f32, font_size: f32) -> Line {
    Line {
        page_num: page,
        page_width: 600.0,
        page_height: 800.0,
        top,
        left,
        height: 20.0,
        font_size,
        text: text.to_string(),
        segments: vec![TextSegment {
            text: text.to_string(),
            left,
            width: 200.0,
            font_size,
        }],
    }
}

fn labels_of(blocks: &[Block]) -> Vec<&'static str> {
    blocks.iter().map(|b| b.label()).collect()
}

fn chapter_titles(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::Chapter { .. }))
        .map(|b| b.text.trim().to_string())
        .collect()
}

fn run_labeler(xml: &str) -> Vec<Block> {
    let document = parse_pdfxml_str(xml).unwrap();
    label_document(&document, &ConversionConfig::default())
}

// ============================================================================
// Book title collection
// ============================================================================

#[test]
fn multiline_book_title_stops_before_table_of_contents() {
    let entries = vec![
        LayoutEntry::Line(make_line("Great Adventures", 1, 120.0, 100.0, 24.0)),
        LayoutEntry::Line(make_line("A Journey", 1, 145.0, 100.0, 23.5)),
        LayoutEntry::Line(make_line("Table of Contents", 2, 100.0, 100.0, 24.0)),
    ];

    let (collected, next_idx) = collect_multiline_book_title(&entries, 0, 12.0);
    let texts: Vec<&str> = collected.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["Great Adventures", "A Journey"]);
    assert_eq!(next_idx, 2);
}

#[test]
fn multiline_book_title_requires_similar_font() {
    let entries = vec![
        LayoutEntry::Line(make_line("Science 101", 1, 100.0, 100.0, 24.0)),
        LayoutEntry::Line(make_line("Introduction", 1, 140.0, 100.0, 14.0)),
    ];

    let (collected, next_idx) = collect_multiline_book_title(&entries, 0, 12.0);
    let texts: Vec<&str> = collected.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(texts, vec!["Science 101"]);
    assert_eq!(next_idx, 1);
}

#[test]
fn book_title_block_joins_lines_with_single_space() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="24" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="120" left="100" width="240" height="30" font="f1">Great Adventures</text>
            <text top="155" left="100" width="240" height="28" font="f1">A Journey</text>
            <text top="300" left="110" width="320" height="20" font="f2">Body text that is comfortably long enough for font stats.</text>
            <text top="330" left="110" width="320" height="20" font="f2">More body text that is also long enough to count here.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let titles: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::BookTitle)
        .collect();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].text, "Great Adventures A Journey");
    assert_eq!(titles[0].page_num, 1);
}

#[test]
fn single_line_document_is_its_own_title() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="30" family="Heading"/>
        <page number="1" width="600" height="800">
            <text top="150" left="140" width="320" height="36" font="f1">The Lonely Broadside</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(labels_of(&blocks), vec!["book_title"]);
    assert_eq!(blocks[0].text, "The Lonely Broadside");
    assert!(chapter_titles(&blocks).is_empty());
}

// ============================================================================
// Chapter boundary guidance
// ============================================================================

#[test]
fn chapter_keyword_controls_split() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="3" width="600" height="800">
            <text top="80" left="100" width="240" height="30" font="f1">Chapter 1</text>
            <text top="180" left="110" width="320" height="20" font="f2">Body text after heading that provides sufficient length for detection.</text>
            <text top="210" left="110" width="320" height="20" font="f2">Additional paragraph content to stabilise the body font size estimate.</text>
            <text top="300" left="100" width="260" height="30" font="f1">Learning Objectives</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(chapter_titles(&blocks), vec!["Chapter 1"]);
    assert!(blocks
        .iter()
        .any(|b| b.kind == BlockKind::Section && b.text == "Learning Objectives"));
}

#[test]
fn chapter_keyword_detected_anywhere_in_heading() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="3" width="600" height="800">
            <text top="80" left="100" width="300" height="30" font="f1">Unit Overview - Chapter 1</text>
            <text top="130" left="110" width="320" height="20" font="f2">Body text to establish base font size in this document.</text>
            <text top="220" left="110" width="320" height="20" font="f2">More supporting content beneath the heading for statistics.</text>
            <text top="300" left="100" width="260" height="30" font="f1">Glossary</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let chapters = chapter_titles(&blocks);
    assert_eq!(chapters.len(), 1);
    assert!(chapters[0].starts_with("Unit Overview - Chapter 1"));
    assert!(blocks
        .iter()
        .any(|b| b.kind == BlockKind::Section && b.text == "Glossary"));
}

#[test]
fn chapter_boundaries_follow_table_of_contents() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="80" left="100" width="240" height="30" font="f1">Table of Contents</text>
            <text top="140" left="120" width="320" height="20" font="f2">Chapter 1 Basics ........ 5</text>
            <text top="170" left="120" width="320" height="20" font="f2">Chapter 2 Advanced ........ 9</text>
        </page>
        <page number="2" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 1 Basics</text>
            <text top="140" left="110" width="320" height="20" font="f2">Body text for chapter one.</text>
        </page>
        <page number="3" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 2 Advanced</text>
            <text top="140" left="110" width="320" height="20" font="f2">Body text for chapter two.</text>
        </page>
        <page number="4" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Appendix A</text>
            <text top="140" left="110" width="320" height="20" font="f2">Supplemental material.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(
        chapter_titles(&blocks),
        vec!["Chapter 1 Basics", "Chapter 2 Advanced"]
    );
    assert!(blocks.iter().any(|b| b.kind == BlockKind::Toc));
}

#[test]
fn chapter_boundaries_ignore_nested_toc_entries() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="24" family="Heading"/>
        <fontspec id="f3" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="80" left="100" width="240" height="30" font="f1">Table of Contents</text>
            <text top="140" left="120" width="320" height="20" font="f3">Chapter 1 Basics ........ 5</text>
            <text top="170" left="150" width="320" height="20" font="f3">Section 1.1 Overview ........ 6</text>
            <text top="200" left="120" width="320" height="20" font="f3">Chapter 2 Advanced ........ 10</text>
        </page>
        <page number="2" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 1 Basics</text>
            <text top="140" left="110" width="320" height="20" font="f3">Body text for chapter one.</text>
            <text top="220" left="100" width="240" height="28" font="f2">Section 1.1 Overview</text>
            <text top="260" left="110" width="320" height="20" font="f3">Section body text.</text>
        </page>
        <page number="3" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 2 Advanced</text>
            <text top="140" left="110" width="320" height="20" font="f3">Body text for chapter two.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let chapters = chapter_titles(&blocks);
    assert_eq!(chapters, vec!["Chapter 1 Basics", "Chapter 2 Advanced"]);
    assert!(blocks
        .iter()
        .any(|b| b.kind == BlockKind::Section && b.text == "Section 1.1 Overview"));
}

#[test]
fn chapter_boundaries_follow_bookmarks() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <outline>
            <item title="Preface"/>
            <item title="Chapter 1"/>
        </outline>
        <page number="1" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Preface</text>
            <text top="140" left="110" width="320" height="20" font="f2">Opening remarks.</text>
        </page>
        <page number="2" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 1</text>
            <text top="140" left="110" width="320" height="20" font="f2">Body text chapter one.</text>
        </page>
        <page number="3" width="600" height="800">
            <text top="90" left="100" width="240" height="30" font="f1">Chapter 2</text>
            <text top="140" left="110" width="320" height="20" font="f2">Additional chapter not bookmarked.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(chapter_titles(&blocks), vec!["Preface", "Chapter 1"]);
}

#[test]
fn chapter_fallback_without_keyword() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="3" width="600" height="800">
            <text top="80" left="100" width="240" height="30" font="f1">Introduction</text>
            <text top="130" left="110" width="320" height="20" font="f2">Body text establishing base font size.</text>
        </page>
        <page number="4" width="600" height="800">
            <text top="80" left="100" width="240" height="30" font="f1">Background</text>
            <text top="130" left="110" width="320" height="20" font="f2">More body text content here.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(chapter_titles(&blocks), vec!["Introduction", "Background"]);
}

// ============================================================================
// Index grouping
// ============================================================================

#[test]
fn index_chapter_groups_following_lines_as_paragraphs() {
    let xml = r#"<pdf2xml>
        <fontspec id="f1" size="28" family="Heading"/>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="3" width="600" height="800">
            <text top="60" left="100" width="240" height="35" font="f1">Sample Book</text>
            <text top="110" left="110" width="300" height="20" font="f2">An engaging introduction to testing heuristics.</text>
        </page>
        <page number="2" width="600" height="800">
            <text top="100" left="100" width="220" height="30" font="f1">Chapter 1</text>
            <text top="140" left="110" width="320" height="20" font="f2">This is some body text used to estimate the base font size.</text>
        </page>
        <page number="3" width="600" height="800">
            <text top="100" left="100" width="200" height="30" font="f1">Index</text>
            <text top="140" left="110" width="200" height="20" font="f2">Apple ........ 10</text>
            <text top="170" left="110" width="200" height="25" font="f1">A</text>
            <text top="200" left="110" width="200" height="20" font="f2">Ant ........ 12</text>
        </page>
        <page number="4" width="600" height="800">
            <text top="100" left="100" width="220" height="30" font="f1">Chapter 7</text>
            <text top="140" left="110" width="200" height="20" font="f2">Next section text</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);

    assert!(blocks.iter().any(|b| matches!(
        &b.kind,
        BlockKind::Chapter { role: Some(role) } if role == "index"
    ) && b.text.eq_ignore_ascii_case("index")));

    assert!(blocks
        .iter()
        .any(|b| b.kind == BlockKind::Para && b.text == "A"));
    assert!(blocks
        .iter()
        .any(|b| b.kind == BlockKind::Para && b.text.starts_with("Apple")));

    assert!(chapter_titles(&blocks)
        .iter()
        .any(|t| t.starts_with("Chapter 7")));
}

// ============================================================================
// Lists, captions, tables, suppression
// ============================================================================

#[test]
fn list_items_detected_with_markers_and_numbering() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="100" left="110" width="320" height="20" font="f2">Plain paragraph text of a decent length for the statistics.</text>
            <text top="140" left="110" width="320" height="20" font="f2">• First bullet point</text>
            <text top="170" left="110" width="320" height="20" font="f2">• Second bullet point</text>
            <text top="210" left="110" width="320" height="20" font="f2">1. Numbered step</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let items: Vec<&Block> = blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::ListItem { .. }))
        .collect();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].text, "First bullet point");
    assert!(matches!(
        items[0].kind,
        BlockKind::ListItem {
            list_type: ListType::Itemized
        }
    ));
    assert_eq!(items[2].text, "Numbered step");
    assert!(matches!(
        items[2].kind,
        BlockKind::ListItem {
            list_type: ListType::Ordered
        }
    ));
}

#[test]
fn caption_lines_detected() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="100" left="110" width="320" height="20" font="f2">Figure 3 The processing pipeline overview</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(labels_of(&blocks), vec!["caption"]);
}

#[test]
fn aligned_columns_become_a_table() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="100" left="100" width="80" height="14" font="f2">Name</text>
            <text top="100" left="300" width="80" height="14" font="f2">Value</text>
            <text top="120" left="100" width="80" height="14" font="f2">Alpha</text>
            <text top="120" left="300" width="80" height="14" font="f2">1</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let tables: Vec<&Block> = blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::Table { .. }))
        .collect();
    assert_eq!(tables.len(), 1);
    match &tables[0].kind {
        BlockKind::Table { rows } => {
            assert_eq!(
                rows,
                &vec![
                    vec!["Name".to_string(), "Value".to_string()],
                    vec!["Alpha".to_string(), "1".to_string()],
                ]
            );
        }
        _ => unreachable!(),
    }
}

#[test]
fn page_numbers_and_copyright_lines_are_suppressed() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="20" left="290" width="20" height="12" font="f2">17</text>
            <text top="400" left="110" width="320" height="20" font="f2">Real content paragraph with plenty of characters in it.</text>
            <text top="770" left="110" width="300" height="12" font="f2">Copyright 2024 Example Press</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].text.starts_with("Real content"));
}

#[test]
fn image_entries_become_figure_blocks() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="100" left="110" width="320" height="20" font="f2">Paragraph before the image with enough text to count.</text>
            <image src="img/diagram.png" top="200" left="90" width="300" height="180"/>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let figure = blocks
        .iter()
        .find(|b| matches!(b.kind, BlockKind::Figure { .. }))
        .expect("figure block");
    match &figure.kind {
        BlockKind::Figure { src } => assert_eq!(src, "img/diagram.png"),
        _ => unreachable!(),
    }
}

#[test]
fn consecutive_lines_merge_into_one_paragraph() {
    let xml = r#"<pdf2xml>
        <fontspec id="f2" size="12" family="Body"/>
        <page number="1" width="600" height="800">
            <text top="100" left="110" width="320" height="14" font="f2">This paragraph spans several physical lines of the page</text>
            <text top="118" left="110" width="320" height="14" font="f2">and keeps flowing without any vertical break between them</text>
            <text top="136" left="110" width="320" height="14" font="f2">until the very end of the thought.</text>
            <text top="400" left="110" width="320" height="14" font="f2">A separate paragraph starts after a large vertical gap.</text>
        </page>
    </pdf2xml>"#;

    let blocks = run_labeler(xml);
    let paras: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Para)
        .collect();
    assert_eq!(paras.len(), 2);
    assert!(paras[0].text.starts_with("This paragraph"));
    assert!(paras[0].text.ends_with("end of the thought."));
    assert!(paras[1].text.starts_with("A separate paragraph"));
}
