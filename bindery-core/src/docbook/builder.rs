//! DocBook tree synthesis.
//!
//! A state machine over the labeled block stream. Container state (current
//! chapter, section, open list, last emitted structure, open index) is one
//! explicit struct; every transition is the table below, switched on the
//! classifier label with the heuristic payload carried on the block variant.

use crate::docbook::index::{handle_index_para, IndexState};
use crate::docbook::xml::{NodeId, XmlTree};
use crate::types::{BlockKind, LabeledBlock, ListType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    BookTitle,
    Toc,
    Chapter,
    Section,
    Para,
    ListItem,
    Figure,
    Table,
    Caption,
    Footnote,
    Other,
}

impl Label {
    fn parse(label: &str) -> Self {
        match label {
            "book_title" => Label::BookTitle,
            "toc" => Label::Toc,
            "chapter" => Label::Chapter,
            "section" => Label::Section,
            "para" => Label::Para,
            "list_item" => Label::ListItem,
            "figure" => Label::Figure,
            "table" => Label::Table,
            "caption" => Label::Caption,
            "footnote" => Label::Footnote,
            _ => Label::Other,
        }
    }
}

#[derive(Default)]
struct BuilderState {
    current_chapter: Option<NodeId>,
    current_section: Option<NodeId>,
    current_list: Option<NodeId>,
    last_structure: Option<NodeId>,
    current_index: Option<NodeId>,
    index_state: Option<IndexState>,
}

impl BuilderState {
    fn close_list(&mut self) {
        self.current_list = None;
    }

    /// Innermost open container: index > section > chapter > root.
    fn container(&self, root: NodeId) -> NodeId {
        self.current_index
            .or(self.current_section)
            .or(self.current_chapter)
            .unwrap_or(root)
    }
}

fn append_para(tree: &mut XmlTree, parent: NodeId, text: &str) -> NodeId {
    let para = tree.add_element(parent, "para");
    tree.set_element_text(para, text.trim());
    para
}

/// Attach caption text to the last emitted figure or table. Returns false
/// when there is nothing suitable to attach to.
fn attach_caption(tree: &mut XmlTree, target: Option<NodeId>, text: &str) -> bool {
    let Some(target) = target else {
        return false;
    };
    let name = tree.name(target).unwrap_or_default();
    if !matches!(name, "figure" | "informaltable" | "table") {
        return false;
    }
    let caption = match tree.find_child_element(target, "caption") {
        Some(caption) => caption,
        None => tree.add_element(target, "caption"),
    };
    tree.set_element_text(caption, text.trim());
    true
}

/// Build the DocBook element tree for a labeled block stream.
pub fn build_docbook_tree(blocks: &[LabeledBlock], root_name: &str) -> XmlTree {
    let mut tree = XmlTree::new(root_name);
    let root = tree.root();
    let mut state = BuilderState::default();

    for labeled in blocks {
        let block = &labeled.block;
        let mut label = Label::parse(&labeled.classifier_label);
        let text = block.text.trim();

        // Everything labeled para inside an open index belongs to the index
        // parser.
        if let (Some(index), Label::Para) = (state.current_index, label) {
            let index_state = state.index_state.get_or_insert_with(IndexState::new);
            if handle_index_para(&mut tree, index, index_state, text, Some(block.bbox.left)) {
                state.last_structure = Some(index);
                state.close_list();
                continue;
            }
        }

        match label {
            Label::BookTitle if !text.is_empty() => {
                tree.ensure_title(root, text);
                state.close_list();
                state.last_structure = Some(root);
                continue;
            }
            Label::Toc if !text.is_empty() => {
                let chapter = tree.add_element(root, "chapter");
                tree.set_attr(chapter, "role", "toc");
                tree.ensure_title(chapter, text);
                state.current_chapter = Some(chapter);
                state.current_section = None;
                state.close_list();
                state.last_structure = Some(chapter);
                continue;
            }
            Label::Chapter if !text.is_empty() => {
                let role = match &block.kind {
                    BlockKind::Chapter { role } => role.clone(),
                    _ => None,
                };
                if role.as_deref() == Some("index") {
                    let index = tree.add_element(root, "index");
                    tree.ensure_title(index, text);
                    state.current_index = Some(index);
                    state.index_state = Some(IndexState::new());
                    state.current_chapter = None;
                    state.current_section = None;
                    state.close_list();
                    state.last_structure = Some(index);
                    continue;
                }

                state.current_index = None;
                state.index_state = None;
                let chapter = tree.add_element(root, "chapter");
                if let Some(role) = role {
                    tree.set_attr(chapter, "role", &role);
                }
                tree.ensure_title(chapter, text);
                state.current_chapter = Some(chapter);
                state.current_section = None;
                state.close_list();
                state.last_structure = Some(chapter);
                continue;
            }
            Label::Section if !text.is_empty() => {
                if let Some(index) = state.current_index {
                    let index_state = state.index_state.get_or_insert_with(IndexState::new);
                    if handle_index_para(
                        &mut tree,
                        index,
                        index_state,
                        text,
                        Some(block.bbox.left),
                    ) {
                        state.last_structure = Some(index);
                        state.close_list();
                        continue;
                    }
                }
                let container = state.current_chapter.unwrap_or(root);
                let section = tree.add_element(container, "sect1");
                tree.ensure_title(section, text);
                state.current_section = Some(section);
                state.close_list();
                state.last_structure = Some(section);
                continue;
            }
            Label::ListItem if !text.is_empty() => {
                let container = state.container(root);
                let list_type = match &block.kind {
                    BlockKind::ListItem { list_type } => *list_type,
                    _ => ListType::Itemized,
                };
                let tag = match list_type {
                    ListType::Ordered => "orderedlist",
                    ListType::Itemized => "itemizedlist",
                };
                let list = match state.current_list {
                    Some(list) if tree.name(list) == Some(tag) => list,
                    _ => {
                        let list = tree.add_element(container, tag);
                        state.current_list = Some(list);
                        list
                    }
                };
                let item = tree.add_element(list, "listitem");
                append_para(&mut tree, item, text);
                state.last_structure = Some(list);
                continue;
            }
            Label::Figure => {
                let src = match &block.kind {
                    BlockKind::Figure { src } => src.clone(),
                    _ => String::new(),
                };
                if !src.is_empty() {
                    let container = state.container(root);
                    let figure = tree.add_element(container, "figure");
                    let mediaobject = tree.add_element(figure, "mediaobject");
                    let imageobject = tree.add_element(mediaobject, "imageobject");
                    let imagedata = tree.add_element(imageobject, "imagedata");
                    tree.set_attr(imagedata, "fileref", &src);
                    state.last_structure = Some(figure);
                    state.close_list();
                }
                continue;
            }
            Label::Table => {
                let rows = match &block.kind {
                    BlockKind::Table { rows } => rows.clone(),
                    _ => Vec::new(),
                };
                if !rows.is_empty() {
                    let container = state.container(root);
                    let cols = rows[0].len();
                    let table = tree.add_element(container, "informaltable");
                    let tgroup = tree.add_element(table, "tgroup");
                    tree.set_attr(tgroup, "cols", &cols.to_string());
                    let tbody = tree.add_element(tgroup, "tbody");
                    for row in &rows {
                        let row_el = tree.add_element(tbody, "row");
                        for cell in row {
                            let entry = tree.add_element(row_el, "entry");
                            tree.set_element_text(entry, cell.trim());
                        }
                    }
                    state.last_structure = Some(table);
                    state.close_list();
                }
                continue;
            }
            Label::Caption if !text.is_empty() => {
                if attach_caption(&mut tree, state.last_structure, text) {
                    continue;
                }
                // No figure or table to attach to: degrade to a paragraph
                label = Label::Para;
            }
            _ => {}
        }

        match label {
            Label::Para | Label::Caption | Label::Other if !text.is_empty() => {
                let container = state.container(root);
                append_para(&mut tree, container, text);
                state.last_structure = Some(container);
                state.close_list();
            }
            Label::Footnote if !text.is_empty() => {
                let container = state.container(root);
                let footnote = tree.add_element(container, "footnote");
                append_para(&mut tree, footnote, text);
                state.last_structure = Some(footnote);
                state.close_list();
            }
            _ => {}
        }
    }

    tree
}
