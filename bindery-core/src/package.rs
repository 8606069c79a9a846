//! Chapter-sharded DocBook packaging.
//!
//! Splits the book tree into chapter fragments tied together by XML ENTITY
//! references from a master `Book.xml`, rewrites media references into a
//! flattened per-chapter namespace, and emits a deterministic ZIP whose
//! basename is the sanitized ISBN when the book carries one.

use crate::docbook::xml::{NodeId, XmlTree};
use crate::error::Result;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use zip::write::FileOptions;
use zip::ZipWriter;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z]").unwrap());

static BASENAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_-]").unwrap());

/// Elements that start their own fragment when found directly under the
/// book root.
const CHAPTER_KIND_NAMES: [&str; 7] = [
    "chapter",
    "preface",
    "appendix",
    "part",
    "article",
    "section",
    "sect1",
];

/// Resolves an original media reference to its bytes. `None` means the asset
/// is missing and a placeholder is written instead.
pub type MediaFetcher<'a> = &'a mut dyn FnMut(&str) -> Option<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    Chapter,
    Toc,
    Index,
}

/// One extracted chapter-sized fragment, referenced from `Book.xml` through
/// its entity.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub entity: String,
    pub filename: String,
    pub tree: XmlTree,
    pub kind: FragmentKind,
    pub title: String,
}

fn is_toc_node(tree: &XmlTree, id: NodeId) -> bool {
    if tree.name(id) != Some("chapter") {
        return false;
    }
    if tree
        .attr(id, "role")
        .is_some_and(|role| role.eq_ignore_ascii_case("toc"))
    {
        return true;
    }
    tree.title_text(id).to_lowercase() == "table of contents"
}

fn is_index_node(tree: &XmlTree, id: NodeId) -> bool {
    match tree.name(id) {
        Some("index") => true,
        Some("chapter") => tree
            .attr(id, "role")
            .is_some_and(|role| role.eq_ignore_ascii_case("index")),
        _ => false,
    }
}

fn is_chapter_node(tree: &XmlTree, id: NodeId) -> bool {
    tree.name(id)
        .is_some_and(|name| CHAPTER_KIND_NAMES.contains(&name))
}

fn copy_root_shell(tree: &XmlTree) -> XmlTree {
    let root_name = tree.name(tree.root()).unwrap_or("book");
    let mut shallow = XmlTree::new(root_name);
    if let crate::docbook::xml::XmlNode::Element { attributes, .. } = tree.node(tree.root()) {
        for (key, value) in attributes {
            shallow.set_attr(shallow.root(), key, value);
        }
    }
    shallow
}

/// Split the book into a shallow master copy (entity references standing in
/// for chapter-kind children) and the ordered fragment list. When no
/// fragment-worthy children exist, all non-metadata children collapse into a
/// synthesized `Ch001` chapter so downstream consumers always see at least
/// one fragment.
pub fn split_root(tree: &XmlTree) -> (XmlTree, Vec<Fragment>) {
    let root = tree.root();
    let mut shallow = copy_root_shell(tree);
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut chapter_index = 0u32;

    for child in tree.children(root) {
        if !tree.is_element(child) {
            shallow.graft(shallow.root(), tree, child);
            continue;
        }

        if is_toc_node(tree, child) {
            let title = {
                let t = tree.title_text(child);
                if t.is_empty() {
                    "Table of Contents".to_string()
                } else {
                    t
                }
            };
            fragments.push(Fragment {
                entity: "toc".to_string(),
                filename: "TableOfContents.xml".to_string(),
                tree: tree.extract_subtree(child),
                kind: FragmentKind::Toc,
                title,
            });
            shallow.add_entity_ref(shallow.root(), "toc");
            continue;
        }

        if is_index_node(tree, child) {
            fragments.push(Fragment {
                entity: "Index".to_string(),
                filename: "Index.xml".to_string(),
                tree: tree.extract_subtree(child),
                kind: FragmentKind::Index,
                title: tree.title_text(child),
            });
            shallow.add_entity_ref(shallow.root(), "Index");
            continue;
        }

        if is_chapter_node(tree, child) {
            chapter_index += 1;
            let entity = format!("Ch{chapter_index:03}");
            fragments.push(Fragment {
                filename: format!("{entity}.xml"),
                entity: entity.clone(),
                tree: tree.extract_subtree(child),
                kind: FragmentKind::Chapter,
                title: tree.title_text(child),
            });
            shallow.add_entity_ref(shallow.root(), &entity);
            continue;
        }

        shallow.graft(shallow.root(), tree, child);
    }

    if fragments.is_empty() {
        let mut shallow = copy_root_shell(tree);
        let mut wrapper = XmlTree::new("chapter");
        for child in tree.children(root) {
            let is_metadata = tree.is_element(child)
                && matches!(tree.name(child), Some("bookinfo") | Some("info"));
            if is_metadata {
                shallow.graft(shallow.root(), tree, child);
            } else {
                wrapper.graft(wrapper.root(), tree, child);
            }
        }
        shallow.add_entity_ref(shallow.root(), "Ch001");
        let fragments = vec![Fragment {
            entity: "Ch001".to_string(),
            filename: "Ch001.xml".to_string(),
            tree: wrapper,
            kind: FragmentKind::Chapter,
            title: String::new(),
        }];
        return (shallow, fragments);
    }

    (shallow, fragments)
}

/// First non-empty `<isbn>` in the tree, sanitized to alphanumerics.
pub fn extract_isbn(tree: &XmlTree) -> Option<String> {
    for node in tree.descendant_elements(tree.root()) {
        if tree.name(node) == Some("isbn") {
            let text = tree.text_content(node);
            let cleaned = NON_ALNUM_RE.replace_all(text.trim(), "").into_owned();
            if !cleaned.is_empty() {
                return Some(cleaned);
            }
        }
    }
    None
}

pub fn sanitise_basename(name: &str) -> String {
    let cleaned = BASENAME_RE.replace_all(name, "").into_owned();
    if cleaned.is_empty() {
        "book".to_string()
    } else {
        cleaned
    }
}

/// Rebuild the TOC fragment body as an itemized listing of the chapter
/// fragments.
fn populate_toc_fragment(toc: &mut Fragment, chapters: &[(String, String)]) {
    let desired_title = if toc.title.is_empty() {
        "Table of Contents".to_string()
    } else {
        toc.title.clone()
    };
    let root = toc.tree.root();
    let title = toc.tree.ensure_title(root, &desired_title);
    toc.tree.set_children(root, vec![title]);

    let itemized = toc.tree.add_element(root, "itemizedlist");
    for (chapter_title, filename) in chapters {
        let listitem = toc.tree.add_element(itemized, "listitem");
        let para = toc.tree.add_element(listitem, "para");
        let display = if chapter_title.is_empty() {
            filename.clone()
        } else {
            chapter_title.clone()
        };
        toc.tree
            .set_element_text(para, &format!("{display} ({filename})"));
    }
}

/// Rewrite every `imagedata`/`graphic` fileref in the fragment to the
/// flattened `media/<Entity>f<NN>.<ext>` namespace and fetch the bytes by
/// the original reference. Missing assets become zero-byte placeholders.
fn rewrite_fragment_media(
    fragment: &mut Fragment,
    media_fetcher: &mut Option<MediaFetcher<'_>>,
) -> Vec<(String, Vec<u8>)> {
    let root = fragment.tree.root();
    let targets: Vec<NodeId> = fragment
        .tree
        .descendant_elements(root)
        .into_iter()
        .filter(|&node| {
            matches!(fragment.tree.name(node), Some("imagedata") | Some("graphic"))
                && fragment
                    .tree
                    .attr(node, "fileref")
                    .is_some_and(|r| !r.is_empty())
        })
        .collect();

    let mut media_files = Vec::new();
    let mut image_index = 1u32;
    for node in targets {
        let original = fragment
            .tree
            .attr(node, "fileref")
            .expect("filtered on fileref")
            .to_string();
        let extension = Path::new(&original)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".jpg".to_string());
        let new_name = format!("{}f{:02}{}", fragment.entity, image_index, extension);
        image_index += 1;
        fragment
            .tree
            .set_attr(node, "fileref", &format!("media/{new_name}"));

        let data = media_fetcher
            .as_mut()
            .and_then(|fetcher| fetcher(&original));
        match data {
            Some(bytes) => media_files.push((new_name, bytes)),
            None => {
                println!("⚠️  Missing media asset for {original}; creating placeholder");
                media_files.push((new_name, Vec::new()));
            }
        }
    }
    media_files
}

/// Render `Book.xml`: XML declaration, DOCTYPE with the entity internal
/// subset in fragment order, then the shallow book body.
fn render_book_xml(
    shallow: &XmlTree,
    root_name: &str,
    dtd_system: &str,
    fragments: &[Fragment],
) -> Result<String> {
    let mut header: Vec<String> = vec!["<?xml version=\"1.0\" encoding=\"UTF-8\"?>".to_string()];
    header.push(format!("<!DOCTYPE {root_name} SYSTEM \"{dtd_system}\"["));
    for fragment in fragments {
        header.push(format!(
            "        <!ENTITY {} SYSTEM \"{}\">",
            fragment.entity, fragment.filename
        ));
    }
    header.push("]>".to_string());

    let body = shallow.serialize()?;
    Ok(format!("{}\n\n{}", header.join("\n"), body))
}

/// Package the DocBook tree into the chapterised ZIP bundle. Returns the
/// path of the written archive.
pub fn package_docbook(
    tree: &XmlTree,
    root_name: &str,
    dtd_system: &str,
    out_path: &Path,
    mut media_fetcher: Option<MediaFetcher<'_>>,
) -> Result<PathBuf> {
    let (shallow, mut fragments) = split_root(tree);

    let base = extract_isbn(tree).unwrap_or_else(|| {
        out_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let base = sanitise_basename(&base);
    let zip_path = out_path.with_file_name(format!("{base}.zip"));

    let chapter_listing: Vec<(String, String)> = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Chapter)
        .map(|f| (f.title.clone(), f.filename.clone()))
        .collect();
    if let Some(toc) = fragments.iter_mut().find(|f| f.kind == FragmentKind::Toc) {
        populate_toc_fragment(toc, &chapter_listing);
    }

    let mut media_files: Vec<(String, Vec<u8>)> = Vec::new();
    for fragment in fragments.iter_mut() {
        media_files.extend(rewrite_fragment_media(fragment, &mut media_fetcher));
    }
    media_files.sort_by(|a, b| a.0.cmp(&b.0));

    let book_xml = render_book_xml(&shallow, root_name, dtd_system, &fragments)?;

    if let Some(parent) = zip_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(&zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("Book.xml", options)?;
    zip.write_all(book_xml.as_bytes())?;

    for fragment in &fragments {
        zip.start_file(fragment.filename.as_str(), options)?;
        zip.write_all(fragment.tree.serialize()?.as_bytes())?;
    }

    zip.add_directory("media", options)?;
    for (name, bytes) in &media_files {
        zip.start_file(format!("media/{name}"), options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;

    println!(
        "📦 Packaged {} fragments and {} media files into {}",
        fragments.len(),
        media_files.len(),
        zip_path.display()
    );
    Ok(zip_path)
}

/// Media fetcher resolving references against a list of base directories;
/// the first existing candidate wins.
pub fn make_file_fetcher(search_paths: Vec<PathBuf>) -> impl FnMut(&str) -> Option<Vec<u8>> {
    move |name: &str| {
        let reference = Path::new(name);
        let mut candidates: Vec<PathBuf> = Vec::new();
        if reference.is_absolute() {
            candidates.push(reference.to_path_buf());
        }
        for base in &search_paths {
            candidates.push(base.join(name));
        }
        for candidate in candidates {
            if candidate.exists() {
                match std::fs::read(&candidate) {
                    Ok(bytes) => return Some(bytes),
                    Err(e) => {
                        println!("⚠️  Failed reading media {}: {e}", candidate.display());
                    }
                }
            }
        }
        None
    }
}
