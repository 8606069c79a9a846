//! Heuristic structural labeler.
//!
//! Converts the ordered layout entries of a document into labeled blocks
//! using font-size statistics, geometric cues and keyword patterns. Chapter
//! boundaries are additionally guided by the best available source of truth:
//! the book's own table of contents, the PDF outline bookmarks, or the
//! presence of explicit chapter keywords, in that order.

use crate::config::ConversionConfig;
use crate::types::{BBox, Block, BlockKind, LayoutEntry, Line, ListType};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static CHAPTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(chapter|chap\.|unit|lesson|module)\b").unwrap());

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(section|sec\.|part)\b").unwrap());

static CAPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(figure|fig\.|table)\s+\d+").unwrap());

static ORDERED_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\(?\d+[.)]|[A-Za-z][.)])\s+").unwrap());

static DOT_LEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static TOC_TRAILING_PAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d[\d\s,–-]*$").unwrap());

/// Multi-line headings join when fonts are within this tolerance.
const HEADING_FONT_TOLERANCE: f32 = 1.0;

/// TOC entries indented further than this past the shallowest entry are
/// nested (sections, not chapters).
const TOC_NESTING_TOLERANCE: f32 = 12.0;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(|c| c.is_uppercase()) && !text.chars().any(|c| c.is_lowercase())
}

fn normalize_title(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").to_lowercase()
}

fn is_toc_heading(text: &str) -> bool {
    normalize_title(text) == "table of contents"
}

fn is_index_heading(text: &str) -> bool {
    normalize_title(text) == "index"
}

/// Body font size: median over lines carrying at least 30 characters of
/// text, falling back to any non-zero size and finally to 12pt.
pub fn body_font_size(lines: &[&Line]) -> f32 {
    let mut samples: Vec<f32> = lines
        .iter()
        .filter(|line| line.text.trim().chars().count() >= 30 && line.font_size > 0.0)
        .map(|line| line.font_size)
        .collect();
    if samples.is_empty() {
        samples = lines
            .iter()
            .filter(|line| line.font_size > 0.0)
            .map(|line| line.font_size)
            .collect();
    }
    if samples.is_empty() {
        return 12.0;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        samples[mid]
    } else {
        (samples[mid - 1] + samples[mid]) / 2.0
    }
}

/// Running heads, page numbers and copyright lines carry no content.
fn is_header_footer(line: &Line) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return true;
    }
    if text.chars().count() <= 4 && text.chars().all(|c| c.is_ascii_digit()) {
        if line.page_height > 0.0
            && (line.top < line.page_height * 0.08 || line.top > line.page_height * 0.9)
        {
            return true;
        }
    }
    if text.chars().count() <= 30 && text.to_lowercase().starts_with("copyright") {
        return true;
    }
    false
}

/// Upper part of an early page, where book titles live.
fn in_title_zone(line: &Line) -> bool {
    if line.page_num > 2 {
        return false;
    }
    if line.page_height > 0.0 {
        line.top <= line.page_height * 0.45
    } else {
        line.top <= 400.0
    }
}

fn looks_like_book_title(line: &Line, body_size: f32) -> bool {
    let text = line.text.trim();
    if text.is_empty() || !in_title_zone(line) {
        return false;
    }
    if line.font_size >= body_size + 6.0 {
        return true;
    }
    if line.font_size >= body_size + 4.0 && word_count(text) <= 12 {
        return true;
    }
    false
}

fn looks_like_chapter_heading(line: &Line, body_size: f32) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return false;
    }
    if CHAPTER_RE.is_match(text) {
        return true;
    }
    if line.font_size >= body_size + 3.0 {
        if line.page_height > 0.0 && line.top <= line.page_height * 0.45 {
            return true;
        }
        if word_count(text) <= 10 {
            return true;
        }
    }
    false
}

fn looks_like_section_heading(line: &Line, body_size: f32) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return false;
    }
    if SECTION_RE.is_match(text) {
        return true;
    }
    if line.font_size >= body_size + 1.5 && word_count(text) <= 14 {
        return true;
    }
    if word_count(text) <= 8 && is_all_caps(text) && line.font_size >= body_size {
        return true;
    }
    false
}

fn looks_like_caption(line: &Line) -> bool {
    CAPTION_RE.is_match(line.text.trim())
}

fn match_list_item(text: &str, markers: &[String]) -> Option<(ListType, String)> {
    let stripped = text.trim_start();
    for marker in markers {
        if let Some(rest) = stripped.strip_prefix(marker.as_str()) {
            let remainder = rest.trim();
            let body = if remainder.is_empty() {
                text.trim().to_string()
            } else {
                remainder.to_string()
            };
            return Some((ListType::Itemized, body));
        }
    }
    if let Some(m) = ORDERED_LIST_RE.find(stripped) {
        let remainder = stripped[m.end()..].trim();
        let body = if remainder.is_empty() {
            stripped.to_string()
        } else {
            remainder.to_string()
        };
        return Some((ListType::Ordered, body));
    }
    None
}

fn line_gap(prev: &Line, next: &Line) -> f32 {
    next.top - prev.top
}

fn should_merge(prev: &Line, next: &Line) -> bool {
    if prev.page_num != next.page_num {
        return false;
    }
    let gap = line_gap(prev, next);
    if gap > prev.height.max(next.height) * 1.9 + 2.0 {
        return false;
    }
    let indent_diff = (prev.left - next.left).abs();
    if indent_diff > 60.0 && gap > prev.height.min(next.height) * 1.1 {
        return false;
    }
    // Significant outdent signals a fresh paragraph (hanging indent)
    if next.left - prev.left < -80.0 {
        return false;
    }
    true
}

fn bbox_of_lines(lines: &[&Line]) -> BBox {
    let top = lines[0].top;
    let left = lines.iter().map(|l| l.left).fold(f32::INFINITY, f32::min);
    let right = lines.iter().map(|l| l.right()).fold(f32::NEG_INFINITY, f32::max);
    let bottom = lines
        .iter()
        .map(|l| l.top + l.height)
        .fold(f32::NEG_INFINITY, f32::max);
    BBox {
        top,
        left,
        width: right - left,
        height: bottom - top,
    }
}

fn max_font(lines: &[&Line]) -> f32 {
    lines
        .iter()
        .map(|l| l.font_size)
        .fold(0.0_f32, f32::max)
}

fn line_bbox(line: &Line) -> BBox {
    BBox {
        top: line.top,
        left: line.left,
        width: line.right() - line.left,
        height: line.height,
    }
}

fn joined_text(lines: &[&Line]) -> String {
    lines
        .iter()
        .map(|l| l.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn finalize_paragraph(lines: &[&Line]) -> Block {
    Block::new(
        BlockKind::Para,
        joined_text(lines),
        lines[0].page_num,
        bbox_of_lines(lines),
        max_font(lines),
    )
}

fn single_line_block(kind: BlockKind, line: &Line) -> Block {
    Block::new(
        kind,
        line.text.trim().to_string(),
        line.page_num,
        line_bbox(line),
        line.font_size,
    )
}

// ===== TABLE DETECTION =====

struct TableCandidate {
    block: Block,
    consumed_lines: usize,
}

fn extract_table(lines: &[&Line]) -> Option<TableCandidate> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut column_positions: Vec<f32> = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        let cols = line.column_positions();
        if cols.len() < 2 {
            break;
        }
        if column_positions.is_empty() {
            column_positions = cols;
        } else if cols.len() != column_positions.len() {
            break;
        } else if cols
            .iter()
            .zip(column_positions.iter())
            .any(|(a, b)| (a - b).abs() > 25.0)
        {
            break;
        }

        let mut cells = vec![String::new(); column_positions.len()];
        let mut segments: Vec<_> = line.segments.iter().collect();
        segments.sort_by(|a, b| a.left.total_cmp(&b.left));
        for segment in segments {
            if segment.text.trim().is_empty() {
                continue;
            }
            // Nearest column by left position; the first index wins ties.
            let mut nearest = 0;
            let mut best = f32::INFINITY;
            for (col_idx, col_left) in column_positions.iter().enumerate() {
                let distance = (col_left - segment.left).abs();
                if distance < best {
                    best = distance;
                    nearest = col_idx;
                }
            }
            if cells[nearest].is_empty() {
                cells[nearest] = segment.text.trim().to_string();
            } else {
                if !cells[nearest].ends_with(' ') && !segment.text.starts_with(' ') {
                    cells[nearest].push(' ');
                }
                cells[nearest].push_str(&segment.text);
            }
        }
        rows.push(cells.into_iter().map(|c| c.trim().to_string()).collect());
        idx += 1;

        if idx < lines.len() {
            let gap = line_gap(line, lines[idx]);
            if gap > line.height.max(lines[idx].height) * 1.8 {
                break;
            }
        }
    }

    if rows.len() < 2 {
        return None;
    }

    let first = lines[0];
    let last = lines[idx - 1];
    let (col_min, col_max) = column_positions
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let text = rows
        .iter()
        .map(|row| row.join(" | "))
        .collect::<Vec<_>>()
        .join("\n");
    let block = Block::new(
        BlockKind::Table { rows },
        text,
        first.page_num,
        BBox {
            top: first.top,
            left: col_min,
            width: col_max - col_min,
            height: last.top - first.top + last.height,
        },
        max_font(&[first]),
    );
    Some(TableCandidate {
        block,
        consumed_lines: idx,
    })
}

// ===== BOOK TITLE COLLECTION =====

/// Collect the run of lines forming a multi-line book title starting at
/// `start_idx`. Returns the collected lines and the index of the first entry
/// past the title. The collection never crosses a `Table of Contents` line.
pub fn collect_multiline_book_title<'a>(
    entries: &'a [LayoutEntry],
    start_idx: usize,
    body_size: f32,
) -> (Vec<&'a Line>, usize) {
    let first_line = entries[start_idx]
        .as_line()
        .expect("book title collection starts on a line entry");
    let mut heading_lines = vec![first_line];
    let mut lookahead = start_idx + 1;

    while lookahead < entries.len() {
        let Some(next_line) = entries[lookahead].as_line() else {
            break;
        };
        if is_header_footer(next_line) {
            break;
        }
        let text = next_line.text.trim();
        if text.is_empty() || is_toc_heading(text) {
            break;
        }

        let same_page = next_line.page_num == first_line.page_num;
        let similar_font = first_line.font_size > 0.0
            && next_line.font_size > 0.0
            && (next_line.font_size - first_line.font_size).abs() <= HEADING_FONT_TOLERANCE;

        if same_page && (similar_font || looks_like_book_title(next_line, body_size)) {
            heading_lines.push(next_line);
            lookahead += 1;
            continue;
        }
        break;
    }

    (heading_lines, lookahead)
}

// ===== CHAPTER GUIDANCE =====

#[derive(Debug)]
enum GuidanceMode {
    /// Chapter titles harvested from the document's own table of contents
    Toc(HashSet<String>),
    /// Chapter titles from the PDF outline bookmarks
    Bookmarks(HashSet<String>),
    /// Only keyword-matching headings open chapters
    Keyword,
    /// No source of truth: any qualified heading opens a chapter
    Fallback,
}

struct ChapterGuidance {
    mode: GuidanceMode,
}

impl ChapterGuidance {
    fn detect(entries: &[LayoutEntry], bookmarks: &[String]) -> Self {
        let toc_titles = harvest_toc_titles(entries);
        if !toc_titles.is_empty() {
            return Self {
                mode: GuidanceMode::Toc(toc_titles),
            };
        }
        if !bookmarks.is_empty() {
            let titles = bookmarks.iter().map(|t| normalize_title(t)).collect();
            return Self {
                mode: GuidanceMode::Bookmarks(titles),
            };
        }
        let has_keyword = entries.iter().any(|entry| {
            entry
                .as_line()
                .is_some_and(|line| !is_header_footer(line) && CHAPTER_RE.is_match(line.text.trim()))
        });
        if has_keyword {
            return Self {
                mode: GuidanceMode::Keyword,
            };
        }
        Self {
            mode: GuidanceMode::Fallback,
        }
    }

    /// May a qualified heading with this text open a chapter?
    fn allows(&self, text: &str) -> bool {
        match &self.mode {
            GuidanceMode::Toc(titles) | GuidanceMode::Bookmarks(titles) => {
                titles.contains(&normalize_title(text))
            }
            GuidanceMode::Keyword => CHAPTER_RE.is_match(text.trim()),
            GuidanceMode::Fallback => true,
        }
    }

    /// Is this text a designated chapter title? Designated titles are exempt
    /// from book-title detection.
    fn designates_chapter(&self, text: &str) -> bool {
        match &self.mode {
            GuidanceMode::Toc(titles) | GuidanceMode::Bookmarks(titles) => {
                titles.contains(&normalize_title(text))
            }
            GuidanceMode::Keyword | GuidanceMode::Fallback => CHAPTER_RE.is_match(text.trim()),
        }
    }

    fn is_listing(&self) -> bool {
        matches!(
            self.mode,
            GuidanceMode::Toc(_) | GuidanceMode::Bookmarks(_)
        )
    }
}

/// Parse a dot-leadered TOC entry line into its title, or None when the line
/// does not look like an entry at all.
fn parse_toc_entry(text: &str) -> Option<String> {
    let has_leaders = DOT_LEADER_RE.is_match(text);
    let cleaned = DOT_LEADER_RE.replace_all(text, " ");
    let cleaned = WS_RE.replace_all(cleaned.trim(), " ").into_owned();
    let stripped = TOC_TRAILING_PAGES_RE.replace(&cleaned, "").into_owned();
    let had_pages = stripped != cleaned;
    if !has_leaders && !had_pages {
        return None;
    }
    let title = stripped
        .trim_matches(|c: char| matches!(c, ' ' | '.' | ',' | ';' | ':'))
        .to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Top-level entry titles from the page that carries the `Table of Contents`
/// heading. Entries indented past the shallowest entry are nested and do not
/// name chapters.
fn harvest_toc_titles(entries: &[LayoutEntry]) -> HashSet<String> {
    let mut heading_pos: Option<(usize, u32)> = None;
    for (idx, entry) in entries.iter().enumerate() {
        if let Some(line) = entry.as_line() {
            if is_toc_heading(&line.text) {
                heading_pos = Some((idx, line.page_num));
                break;
            }
        }
    }
    let Some((heading_idx, toc_page)) = heading_pos else {
        return HashSet::new();
    };

    let mut candidates: Vec<(String, f32)> = Vec::new();
    for entry in &entries[heading_idx + 1..] {
        let Some(line) = entry.as_line() else { continue };
        if line.page_num != toc_page {
            break;
        }
        if is_header_footer(line) {
            continue;
        }
        if let Some(title) = parse_toc_entry(line.text.trim()) {
            candidates.push((title, line.left));
        }
    }
    if candidates.is_empty() {
        return HashSet::new();
    }

    let base_left = candidates
        .iter()
        .map(|(_, left)| *left)
        .fold(f32::INFINITY, f32::min);
    candidates
        .into_iter()
        .filter(|(_, left)| left - base_left <= TOC_NESTING_TOLERANCE)
        .map(|(title, _)| normalize_title(&title))
        .collect()
}

// ===== MAIN LABELING PASS =====

pub fn label_blocks(
    entries: &[LayoutEntry],
    bookmarks: &[String],
    config: &ConversionConfig,
) -> Vec<Block> {
    let lines: Vec<&Line> = entries.iter().filter_map(|e| e.as_line()).collect();
    let body_size = body_font_size(&lines);
    let guidance = ChapterGuidance::detect(entries, bookmarks);
    let markers = &config.pdf.list_markers;
    // A one-line document is its own body font, so the relative-size title
    // rule can never fire; the lone line in the title zone IS the title.
    let single_line_title = lines.len() == 1 && in_title_zone(lines[0]);

    let mut blocks: Vec<Block> = Vec::new();
    let mut current_para: Vec<&Line> = Vec::new();
    let mut saw_book_title = false;
    // Once structural content has opened, a late large heading is never the
    // book title.
    let mut saw_structure = false;
    let mut in_index = false;
    let mut toc_entry_page: Option<u32> = None;

    macro_rules! flush_para {
        () => {
            if !current_para.is_empty() {
                blocks.push(finalize_paragraph(&current_para));
                current_para.clear();
            }
        };
    }

    let mut idx = 0;
    while idx < entries.len() {
        let entry = &entries[idx];

        let line = match entry {
            LayoutEntry::Image(image) => {
                flush_para!();
                blocks.push(Block::new(
                    BlockKind::Figure {
                        src: image.src.clone(),
                    },
                    String::new(),
                    image.page_num,
                    BBox {
                        top: image.top,
                        left: image.left,
                        width: image.width,
                        height: image.height,
                    },
                    0.0,
                ));
                idx += 1;
                continue;
            }
            LayoutEntry::Line(line) => line,
        };

        if is_header_footer(line) {
            idx += 1;
            continue;
        }

        let text = line.text.trim();

        // Lines following the TOC heading on its page are entry listings,
        // kept as plain paragraphs.
        if let Some(page) = toc_entry_page {
            if line.page_num == page {
                flush_para!();
                blocks.push(single_line_block(BlockKind::Para, line));
                idx += 1;
                continue;
            }
            toc_entry_page = None;
        }

        // Inside an index everything short of the next chapter heading is a
        // plain paragraph the index parser consumes downstream.
        if in_index {
            let ends_index = looks_like_chapter_heading(line, body_size)
                && (guidance.allows(text) || is_index_heading(text));
            if !ends_index {
                flush_para!();
                blocks.push(single_line_block(BlockKind::Para, line));
                idx += 1;
                continue;
            }
        }

        // Table detection runs on the contiguous run of lines ahead.
        if !in_index {
            let remaining: Vec<&Line> =
                entries[idx..].iter().filter_map(|e| e.as_line()).collect();
            if let Some(candidate) = extract_table(&remaining) {
                flush_para!();
                blocks.push(candidate.block);
                // Advance past the consumed lines, skipping interleaved
                // image entries.
                let mut consumed = 0;
                let mut advanced = 0;
                while idx + advanced < entries.len() && consumed < candidate.consumed_lines {
                    if entries[idx + advanced].as_line().is_some() {
                        consumed += 1;
                    }
                    advanced += 1;
                }
                idx += advanced;
                continue;
            }
        }

        if !saw_book_title
            && !saw_structure
            && (looks_like_book_title(line, body_size) || single_line_title)
            && !is_toc_heading(text)
            && !guidance.designates_chapter(text)
            && !is_index_heading(text)
        {
            flush_para!();
            let (heading_lines, next_idx) =
                collect_multiline_book_title(entries, idx, body_size);
            blocks.push(Block::new(
                BlockKind::BookTitle,
                joined_text(&heading_lines),
                heading_lines[0].page_num,
                bbox_of_lines(&heading_lines),
                max_font(&heading_lines),
            ));
            saw_book_title = true;
            idx = next_idx;
            continue;
        }

        if is_toc_heading(text) {
            flush_para!();
            in_index = false;
            saw_structure = true;
            blocks.push(single_line_block(BlockKind::Toc, line));
            toc_entry_page = Some(line.page_num);
            idx += 1;
            continue;
        }

        if looks_like_chapter_heading(line, body_size) {
            if is_index_heading(text) {
                flush_para!();
                blocks.push(single_line_block(
                    BlockKind::Chapter {
                        role: Some("index".to_string()),
                    },
                    line,
                ));
                in_index = true;
                saw_structure = true;
                idx += 1;
                continue;
            }

            if guidance.allows(text) {
                flush_para!();
                in_index = false;
                saw_structure = true;

                let mut heading_lines = vec![line];
                let mut lookahead = idx + 1;
                while lookahead < entries.len() {
                    let Some(next_line) = entries[lookahead].as_line() else {
                        break;
                    };
                    if is_header_footer(next_line) {
                        break;
                    }
                    if !looks_like_chapter_heading(next_line, body_size) {
                        break;
                    }
                    // A line that names its own chapter starts one.
                    if guidance.is_listing() && guidance.allows(next_line.text.trim()) {
                        break;
                    }
                    heading_lines.push(next_line);
                    lookahead += 1;
                }

                blocks.push(Block::new(
                    BlockKind::Chapter { role: None },
                    joined_text(&heading_lines),
                    heading_lines[0].page_num,
                    bbox_of_lines(&heading_lines),
                    max_font(&heading_lines),
                ));
                idx = lookahead;
                continue;
            }
            // Qualified but not designated: falls through to the section and
            // paragraph rules below.
        }

        if looks_like_section_heading(line, body_size) {
            flush_para!();
            blocks.push(single_line_block(BlockKind::Section, line));
            idx += 1;
            continue;
        }

        if looks_like_caption(line) {
            flush_para!();
            blocks.push(single_line_block(BlockKind::Caption, line));
            idx += 1;
            continue;
        }

        if let Some((list_type, item_text)) = match_list_item(text, markers) {
            flush_para!();
            blocks.push(Block::new(
                BlockKind::ListItem { list_type },
                item_text,
                line.page_num,
                line_bbox(line),
                line.font_size,
            ));
            idx += 1;
            continue;
        }

        if current_para.is_empty() {
            current_para.push(line);
        } else if should_merge(current_para[current_para.len() - 1], line) {
            current_para.push(line);
        } else {
            blocks.push(finalize_paragraph(&current_para));
            current_para.clear();
            current_para.push(line);
        }
        idx += 1;
    }

    if !current_para.is_empty() {
        blocks.push(finalize_paragraph(&current_para));
    }

    println!("🏷️  Labeled {} blocks (body font {body_size:.1}pt)", blocks.len());
    blocks
}
