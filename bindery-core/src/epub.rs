//! EPUB front-end.
//!
//! Aggregates the spine documents of an EPUB container into one logical
//! HTML tree, derives per-spine-item page records for QA, transforms the
//! aggregate into DocBook, and hands the result to the same packager as the
//! PDF path with a fetcher that reads media straight out of the archive.

use crate::config::ConversionConfig;
use crate::docbook::xml::{NodeId, XmlTree};
use crate::error::{ConversionError, Result};
use crate::normalize::{checksum, normalize_text};
use crate::package::package_docbook;
use crate::pipeline::{ConversionOutcome, ConvertOptions};
use crate::qa::{compute_metrics, write_csv, write_json};
use crate::types::PageText;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

type Archive = ZipArchive<std::fs::File>;

fn invalid(path: &Path, message: impl Into<String>) -> ConversionError {
    ConversionError::InvalidInput {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn read_archive_file(archive: &mut Archive, name: &str, epub_path: &Path) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| invalid(epub_path, format!("missing archive member {name}")))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Resolve the OPF root file from `META-INF/container.xml`.
fn read_container(archive: &mut Archive, epub_path: &Path) -> Result<String> {
    let container = read_archive_file(archive, "META-INF/container.xml", epub_path)?;
    let tree = XmlTree::parse(&container)?;
    for node in tree.descendant_elements(tree.root()) {
        if tree.name(node) == Some("rootfile") {
            if let Some(full_path) = tree.attr(node, "full-path") {
                return Ok(full_path.to_string());
            }
        }
    }
    Err(invalid(epub_path, "container missing rootfile"))
}

struct OpfInfo {
    /// manifest id -> href
    manifest: HashMap<String, String>,
    /// ordered spine idrefs
    spine: Vec<String>,
}

fn parse_opf(opf_xml: &str) -> Result<OpfInfo> {
    let tree = XmlTree::parse(opf_xml)?;
    let mut manifest = HashMap::new();
    let mut spine = Vec::new();
    for node in tree.descendant_elements(tree.root()) {
        match tree.name(node) {
            Some("item") => {
                if let (Some(id), Some(href)) = (tree.attr(node, "id"), tree.attr(node, "href")) {
                    manifest.insert(id.to_string(), href.to_string());
                }
            }
            Some("itemref") => {
                if let Some(idref) = tree.attr(node, "idref") {
                    spine.push(idref.to_string());
                }
            }
            _ => {}
        }
    }
    Ok(OpfInfo { manifest, spine })
}

/// Join archive-relative paths with forward slashes.
fn join_archive_path(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{base}/{href}")
    }
}

fn parent_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

/// Append the spine documents' body children to one synthetic `<html>` tree,
/// rewriting image references to archive-root-relative paths on the way.
fn aggregate_spine(
    archive: &mut Archive,
    opf_path: &str,
    opf: &OpfInfo,
    epub_path: &Path,
) -> Result<XmlTree> {
    let base = parent_dir(opf_path);
    let mut html = XmlTree::new("html");
    let body = html.add_element(html.root(), "body");

    for idref in &opf.spine {
        let Some(href) = opf.manifest.get(idref) else {
            println!("⚠️  Missing manifest item for spine id {idref}");
            continue;
        };
        let item_path = join_archive_path(&base, href);
        let contents = read_archive_file(archive, &item_path, epub_path)?;
        let mut doc = XmlTree::parse(&contents)?;

        let doc_dir = parent_dir(&item_path);
        for node in doc.descendant_elements(doc.root()) {
            if doc.name(node) == Some("img") {
                if let Some(src) = doc.attr(node, "src").map(str::to_string) {
                    doc.set_attr(node, "src", &join_archive_path(&doc_dir, &src));
                }
            }
        }

        let doc_body = doc
            .find_child_element(doc.root(), "body")
            .ok_or_else(|| invalid(epub_path, format!("spine item {item_path} has no body")))?;
        for child in doc.children(doc_body) {
            html.graft(body, &doc, child);
        }
    }

    Ok(html)
}

/// One text block per top-level body child, spine order.
fn collect_text_blocks(html: &XmlTree) -> Vec<String> {
    let body = html
        .find_child_element(html.root(), "body")
        .expect("aggregate tree always has a body");
    html.children(body)
        .into_iter()
        .filter(|&child| html.is_element(child))
        .map(|child| html.joined_text(child, " "))
        .collect()
}

// ===== HTML -> DOCBOOK TRANSFORM =====

#[derive(Default)]
struct TransformState {
    chapter: Option<NodeId>,
    sect1: Option<NodeId>,
    sect2: Option<NodeId>,
}

impl TransformState {
    fn container(&self, root: NodeId) -> NodeId {
        self.sect2.or(self.sect1).or(self.chapter).unwrap_or(root)
    }
}

/// Structural mapping of the aggregate HTML tree onto DocBook: h1/h2/h3
/// open chapter/sect1/sect2, lists and paragraphs map to their DocBook
/// counterparts, images become figures.
fn transform_html_to_docbook(html: &XmlTree, root_name: &str) -> XmlTree {
    let mut docbook = XmlTree::new(root_name);
    let root = docbook.root();
    let mut state = TransformState::default();

    let body = html
        .find_child_element(html.root(), "body")
        .expect("aggregate tree always has a body");
    for child in html.child_elements(body) {
        transform_node(html, child, &mut docbook, root, &mut state);
    }
    docbook
}

fn transform_node(
    html: &XmlTree,
    node: NodeId,
    docbook: &mut XmlTree,
    root: NodeId,
    state: &mut TransformState,
) {
    let text = html.joined_text(node, " ");
    let text = text.trim();
    match html.name(node) {
        Some("h1") => {
            let chapter = docbook.add_element(root, "chapter");
            docbook.ensure_title(chapter, text);
            state.chapter = Some(chapter);
            state.sect1 = None;
            state.sect2 = None;
        }
        Some("h2") => {
            let parent = state.chapter.unwrap_or(root);
            let sect1 = docbook.add_element(parent, "sect1");
            docbook.ensure_title(sect1, text);
            state.sect1 = Some(sect1);
            state.sect2 = None;
        }
        Some("h3") => {
            let parent = state.sect1.or(state.chapter).unwrap_or(root);
            let sect2 = docbook.add_element(parent, "sect2");
            docbook.ensure_title(sect2, text);
            state.sect2 = Some(sect2);
        }
        Some("p") => {
            if !text.is_empty() {
                let container = state.container(root);
                let para = docbook.add_element(container, "para");
                docbook.set_element_text(para, text);
            }
        }
        Some("ul") | Some("ol") => {
            let tag = if html.name(node) == Some("ol") {
                "orderedlist"
            } else {
                "itemizedlist"
            };
            let container = state.container(root);
            let list = docbook.add_element(container, tag);
            for li in html.child_elements(node) {
                if html.name(li) != Some("li") {
                    continue;
                }
                let item_text = html.joined_text(li, " ");
                let item_text = item_text.trim();
                if item_text.is_empty() {
                    continue;
                }
                let listitem = docbook.add_element(list, "listitem");
                let para = docbook.add_element(listitem, "para");
                docbook.set_element_text(para, item_text);
            }
        }
        Some("img") => {
            if let Some(src) = html.attr(node, "src") {
                let container = state.container(root);
                let figure = docbook.add_element(container, "figure");
                let mediaobject = docbook.add_element(figure, "mediaobject");
                let imageobject = docbook.add_element(mediaobject, "imageobject");
                let imagedata = docbook.add_element(imageobject, "imagedata");
                docbook.set_attr(imagedata, "fileref", src);
            }
        }
        Some(_) => {
            // Unknown container: recurse so nested structure still lands
            for child in html.child_elements(node) {
                transform_node(html, child, docbook, root, state);
            }
        }
        None => {}
    }
}

/// Convert an EPUB into the packaged DocBook deliverable.
pub fn convert_epub(
    epub_path: &Path,
    out_path: &Path,
    options: &ConvertOptions,
) -> Result<ConversionOutcome> {
    if !epub_path.exists() {
        return Err(ConversionError::InputNotFound(epub_path.to_path_buf()));
    }
    let config =
        ConversionConfig::load_mapping(&options.config_dir, options.publisher.as_deref())?;

    println!("📖 Converting EPUB: {}", epub_path.display());
    let file = std::fs::File::open(epub_path)?;
    let mut archive: Archive =
        ZipArchive::new(file).map_err(|e| invalid(epub_path, format!("unreadable EPUB: {e}")))?;

    let opf_path = read_container(&mut archive, epub_path)?;
    let opf_xml = read_archive_file(&mut archive, &opf_path, epub_path)?;
    let opf = parse_opf(&opf_xml)?;
    let html = aggregate_spine(&mut archive, &opf_path, &opf, epub_path)?;

    let blocks = collect_text_blocks(&html);
    if options.strict && blocks.iter().any(|block| block.trim().is_empty()) {
        return Err(invalid(epub_path, "empty content block in strict mode"));
    }

    let mut pages: Vec<PageText> = Vec::with_capacity(blocks.len());
    for (idx, text) in blocks.iter().enumerate() {
        let mut events = Vec::new();
        let norm = normalize_text(text, &config.normalization, &mut events);
        let mut page = PageText::new(idx as u32 + 1, text.clone());
        page.checksum = checksum(&norm);
        page.norm_text = norm;
        page.events = events;
        pages.push(page);
    }

    let docbook = transform_html_to_docbook(&html, &config.docbook.root);

    let mut fetch = |reference: &str| -> Option<Vec<u8>> {
        let normalized = reference.trim_start_matches('/');
        for key in [normalized, reference] {
            if let Ok(mut entry) = archive.by_name(key) {
                let mut bytes = Vec::new();
                if entry.read_to_end(&mut bytes).is_ok() {
                    return Some(bytes);
                }
            }
        }
        // Fall back to the leaf filename
        if let Some(leaf) = normalized.rsplit('/').next() {
            let candidate = archive
                .file_names()
                .find(|name| *name == leaf || name.ends_with(&format!("/{leaf}")))
                .map(str::to_string);
            if let Some(name) = candidate {
                if let Ok(mut entry) = archive.by_name(&name) {
                    let mut bytes = Vec::new();
                    if entry.read_to_end(&mut bytes).is_ok() {
                        return Some(bytes);
                    }
                }
            }
        }
        println!("⚠️  Missing media resource in EPUB: {reference}");
        None
    };

    let zip_path = package_docbook(
        &docbook,
        &config.docbook.root,
        &config.docbook.dtd_system,
        out_path,
        Some(&mut fetch),
    )?;

    let post_pages: Vec<PageText> = pages
        .iter()
        .map(|page| {
            let mut post = PageText::new(page.page_num, page.norm_text.clone());
            post.checksum = page.checksum.clone();
            post
        })
        .collect();
    let mut report = compute_metrics(&pages, &post_pages);
    report.output_path = zip_path.display().to_string();

    let report_dir = options
        .report_dir
        .clone()
        .or_else(|| zip_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    std::fs::create_dir_all(&report_dir)?;
    let stem = zip_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    write_csv(&report, &report_dir.join(format!("{stem}.qa.csv")))?;
    write_json(&report, &report_dir.join(format!("{stem}.qa.json")))?;

    if options.strict {
        let flagged = report.flagged_pages();
        if !flagged.is_empty() {
            return Err(ConversionError::StrictFlagged { pages: flagged });
        }
    }

    Ok(ConversionOutcome { zip_path, report })
}
