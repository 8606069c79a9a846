//! Geometric stream parser for the positional pdf2xml representation.
//!
//! Turns the `<fontspec>` / `<page>` / `<text>` / `<image>` stream into
//! ordered layout entries: text nodes are grouped into lines by vertical
//! proximity, images pass through as markers. An optional `<outline>` block
//! contributes bookmark titles used downstream for chapter guidance.

use crate::error::{ConversionError, Result};
use crate::types::{LayoutEntry, Line, PageImage, TextSegment};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// Text nodes whose tops differ by no more than this are one line.
const LINE_TOP_TOLERANCE: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct FontSpec {
    pub id: String,
    pub size: f32,
    pub family: String,
}

#[derive(Debug, Clone)]
pub struct RawTextNode {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
    pub font: Option<String>,
    pub size: Option<f32>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct PositionalPage {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub texts: Vec<RawTextNode>,
    pub images: Vec<PageImage>,
}

#[derive(Debug, Clone, Default)]
pub struct PositionalDocument {
    pub fontspecs: HashMap<String, FontSpec>,
    /// Outline/bookmark titles in document order, when the producer emitted
    /// an `<outline>` block
    pub bookmarks: Vec<String>,
    pub pages: Vec<PositionalPage>,
}

impl PositionalDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

fn layout_err(message: impl Into<String>) -> ConversionError {
    ConversionError::Layout(message.into())
}

fn collect_attrs(element: &BytesStart) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| layout_err(format!("bad attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| layout_err(format!("bad attribute value: {e}")))?
            .into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Missing geometry attributes default to zero; present but unparseable ones
/// are a fatal layout error.
fn attr_f32(attrs: &HashMap<String, String>, name: &str) -> Result<f32> {
    match attrs.get(name) {
        None => Ok(0.0),
        Some(value) if value.is_empty() => Ok(0.0),
        Some(value) => value
            .parse::<f32>()
            .map_err(|_| layout_err(format!("unparseable {name}={value:?}"))),
    }
}

fn attr_u32(attrs: &HashMap<String, String>, name: &str) -> Result<u32> {
    match attrs.get(name) {
        None => Ok(0),
        Some(value) if value.is_empty() => Ok(0),
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| layout_err(format!("unparseable {name}={value:?}"))),
    }
}

pub fn parse_pdfxml_file(path: &Path) -> Result<PositionalDocument> {
    if !path.exists() {
        return Err(ConversionError::InputNotFound(path.to_path_buf()));
    }
    let xml = std::fs::read_to_string(path)?;
    parse_pdfxml_str(&xml)
}

pub fn parse_pdfxml_str(xml: &str) -> Result<PositionalDocument> {
    let mut reader = Reader::from_str(xml);
    let mut document = PositionalDocument::default();
    let mut current_page: Option<PositionalPage> = None;
    // (attrs, text buffer) of the <text> element being read
    let mut open_text: Option<(HashMap<String, String>, String)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| layout_err(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(&event, Event::Empty(_));
                match e.name().as_ref() {
                    b"fontspec" => {
                        let attrs = collect_attrs(e)?;
                        let id = attrs.get("id").cloned().unwrap_or_default();
                        let spec = FontSpec {
                            id: id.clone(),
                            size: attr_f32(&attrs, "size")?,
                            family: attrs.get("family").cloned().unwrap_or_default(),
                        };
                        document.fontspecs.insert(id, spec);
                    }
                    b"page" => {
                        let attrs = collect_attrs(e)?;
                        let page = PositionalPage {
                            number: attr_u32(&attrs, "number")?,
                            width: attr_f32(&attrs, "width")?,
                            height: attr_f32(&attrs, "height")?,
                            texts: Vec::new(),
                            images: Vec::new(),
                        };
                        if is_empty {
                            document.pages.push(page);
                        } else {
                            current_page = Some(page);
                        }
                    }
                    b"text" => {
                        let attrs = collect_attrs(e)?;
                        if is_empty {
                            push_text_node(&mut current_page, attrs, String::new())?;
                        } else {
                            open_text = Some((attrs, String::new()));
                        }
                    }
                    b"image" => {
                        let attrs = collect_attrs(e)?;
                        if let Some(page) = current_page.as_mut() {
                            if let Some(src) = attrs.get("src").filter(|s| !s.is_empty()) {
                                page.images.push(PageImage {
                                    page_num: page.number,
                                    src: src.clone(),
                                    top: attr_f32(&attrs, "top")?,
                                    left: attr_f32(&attrs, "left")?,
                                    width: attr_f32(&attrs, "width")?,
                                    height: attr_f32(&attrs, "height")?,
                                });
                            }
                        }
                    }
                    b"item" => {
                        let attrs = collect_attrs(e)?;
                        if let Some(title) = attrs.get("title") {
                            let title = title.trim();
                            if !title.is_empty() {
                                document.bookmarks.push(title.to_string());
                            }
                        }
                    }
                    // <b>/<i> and friends inside <text> contribute only their
                    // character data, handled by the Text arm below.
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some((_, buffer)) = open_text.as_mut() {
                    let piece = t
                        .unescape()
                        .map_err(|e| layout_err(format!("bad text content: {e}")))?;
                    buffer.push_str(&piece);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"text" => {
                    if let Some((attrs, buffer)) = open_text.take() {
                        push_text_node(&mut current_page, attrs, buffer)?;
                    }
                }
                b"page" => {
                    if let Some(page) = current_page.take() {
                        document.pages.push(page);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(document)
}

fn push_text_node(
    current_page: &mut Option<PositionalPage>,
    attrs: HashMap<String, String>,
    text: String,
) -> Result<()> {
    if let Some(page) = current_page.as_mut() {
        let size = match attrs.get("size") {
            Some(value) if !value.is_empty() => Some(
                value
                    .parse::<f32>()
                    .map_err(|_| layout_err(format!("unparseable size={value:?}")))?,
            ),
            _ => None,
        };
        page.texts.push(RawTextNode {
            top: attr_f32(&attrs, "top")?,
            left: attr_f32(&attrs, "left")?,
            width: attr_f32(&attrs, "width")?,
            height: attr_f32(&attrs, "height")?,
            font: attrs.get("font").cloned(),
            size,
            text,
        });
    }
    Ok(())
}

fn clean_join(segments: &[TextSegment]) -> String {
    let mut ordered: Vec<&TextSegment> = segments.iter().collect();
    ordered.sort_by(|a, b| a.left.total_cmp(&b.left));

    let mut result = String::new();
    for segment in ordered {
        if segment.text.is_empty() {
            continue;
        }
        if !result.is_empty() && !result.ends_with(' ') && !segment.text.starts_with(' ') {
            result.push(' ');
        }
        result.push_str(&segment.text);
    }
    result
}

/// Assemble the page's raw text nodes into ordered lines.
pub fn assemble_lines(page: &PositionalPage, fontspecs: &HashMap<String, FontSpec>) -> Vec<Line> {
    let mut nodes: Vec<&RawTextNode> = page.texts.iter().collect();
    nodes.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.left.total_cmp(&b.left)));

    let mut lines: Vec<Line> = Vec::new();
    for node in nodes {
        if node.text.trim().is_empty() {
            continue;
        }
        let font_size = node
            .font
            .as_ref()
            .and_then(|id| fontspecs.get(id))
            .map(|spec| spec.size)
            .or(node.size)
            .unwrap_or(0.0);
        let segment = TextSegment {
            text: node.text.clone(),
            left: node.left,
            width: node.width,
            font_size,
        };

        match lines.last_mut() {
            Some(line) if (line.top - node.top).abs() <= LINE_TOP_TOLERANCE => {
                line.left = line.left.min(node.left);
                line.height = line.height.max(node.height);
                if segment.font_size > 0.0 {
                    line.font_size = line.font_size.max(segment.font_size);
                }
                line.segments.push(segment);
            }
            _ => {
                lines.push(Line {
                    page_num: page.number,
                    page_width: page.width,
                    page_height: page.height,
                    top: node.top,
                    left: node.left,
                    height: node.height,
                    font_size,
                    text: String::new(),
                    segments: vec![segment],
                });
            }
        }
    }

    for line in lines.iter_mut() {
        line.text = clean_join(&line.segments);
        if line.font_size == 0.0 {
            line.font_size = line
                .segments
                .iter()
                .map(|seg| seg.font_size)
                .fold(0.0_f32, f32::max);
        }
    }

    lines.retain(|line| !line.text.trim().is_empty());
    lines
}

/// All layout entries of the document: lines and image markers, ordered by
/// `(page document order, top, left)`.
pub fn page_entries(document: &PositionalDocument) -> Vec<LayoutEntry> {
    let mut entries: Vec<LayoutEntry> = Vec::new();
    for page in &document.pages {
        let mut page_entries: Vec<LayoutEntry> = assemble_lines(page, &document.fontspecs)
            .into_iter()
            .map(LayoutEntry::Line)
            .collect();
        page_entries.extend(page.images.iter().cloned().map(LayoutEntry::Image));
        page_entries.sort_by(|a, b| a.top().total_cmp(&b.top()).then(a.left().total_cmp(&b.left())));
        entries.extend(page_entries);
    }
    entries
}
