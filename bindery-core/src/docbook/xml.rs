//! Owned XML element tree.
//!
//! The builder and packager share this arena-backed DOM: nodes live in a
//! flat vector and refer to each other by id, so containers can be reopened
//! and subtrees grafted without fighting the borrow checker. Serialization
//! goes through the quick-xml writer (indented, no XML declaration); entity
//! reference nodes are emitted as pre-escaped text so `&Name;` survives into
//! the output.

use crate::error::{ConversionError, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<NodeId>,
    },
    Text(String),
    EntityRef(String),
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
    root: NodeId,
}

impl XmlTree {
    pub fn new(root_name: &str) -> Self {
        Self {
            nodes: vec![XmlNode::Element {
                name: root_name.to_string(),
                attributes: Vec::new(),
                children: Vec::new(),
            }],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id]
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id] {
            XmlNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id], XmlNode::Element { .. })
    }

    fn push_node(&mut self, node: XmlNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn children_mut(&mut self, parent: NodeId) -> &mut Vec<NodeId> {
        match &mut self.nodes[parent] {
            XmlNode::Element { children, .. } => children,
            _ => panic!("node {parent} is not an element"),
        }
    }

    /// Append a new child element and return its id.
    pub fn add_element(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = self.push_node(XmlNode::Element {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        });
        self.children_mut(parent).push(id);
        id
    }

    /// Insert a new child element at a fixed position.
    pub fn insert_element(&mut self, parent: NodeId, name: &str, position: usize) -> NodeId {
        let id = self.push_node(XmlNode::Element {
            name: name.to_string(),
            attributes: Vec::new(),
            children: Vec::new(),
        });
        let children = self.children_mut(parent);
        let position = position.min(children.len());
        children.insert(position, id);
        id
    }

    pub fn add_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.push_node(XmlNode::Text(text.to_string()));
        self.children_mut(parent).push(id);
        id
    }

    pub fn add_entity_ref(&mut self, parent: NodeId, entity: &str) -> NodeId {
        let id = self.push_node(XmlNode::EntityRef(entity.to_string()));
        self.children_mut(parent).push(id);
        id
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let XmlNode::Element { attributes, .. } = &mut self.nodes[id] {
            if let Some(existing) = attributes.iter_mut().find(|(k, _)| k == name) {
                existing.1 = value.to_string();
            } else {
                attributes.push((name.to_string(), value.to_string()));
            }
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id] {
            XmlNode::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id] {
            XmlNode::Element { children, .. } => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Replace an element's child list. Orphaned nodes stay in the arena and
    /// are simply never serialized.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        *self.children_mut(id) = children;
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .into_iter()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn find_child_element(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children(id)
            .into_iter()
            .find(|&c| self.name(c) == Some(name))
    }

    /// Pre-order descendant elements, excluding `id` itself.
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id);
        stack.reverse();
        while let Some(node) = stack.pop() {
            result.push(node);
            let mut kids = self.child_elements(node);
            kids.reverse();
            stack.extend(kids);
        }
        result
    }

    /// Concatenated text of the subtree, document order, no separators.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out, "");
        out
    }

    /// Text nodes of the subtree joined with a separator.
    pub fn joined_text(&self, id: NodeId, separator: &str) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out, separator);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String, separator: &str) {
        match &self.nodes[id] {
            XmlNode::Text(text) => {
                if !out.is_empty() && !separator.is_empty() {
                    out.push_str(separator);
                }
                out.push_str(text);
            }
            XmlNode::Element { children, .. } => {
                for &child in children {
                    self.collect_text(child, out, separator);
                }
            }
            XmlNode::EntityRef(_) => {}
        }
    }

    /// Replace the element's content with a single text node.
    pub fn set_element_text(&mut self, id: NodeId, text: &str) {
        let text_id = self.push_node(XmlNode::Text(text.to_string()));
        self.set_children(id, vec![text_id]);
    }

    /// Title text of a container (empty when absent).
    pub fn title_text(&self, id: NodeId) -> String {
        self.find_child_element(id, "title")
            .map(|t| self.text_content(t).trim().to_string())
            .unwrap_or_default()
    }

    /// Set the container's `<title>`, creating it as the first child when
    /// missing.
    pub fn ensure_title(&mut self, id: NodeId, text: &str) -> NodeId {
        let title = match self.find_child_element(id, "title") {
            Some(title) => title,
            None => self.insert_element(id, "title", 0),
        };
        self.set_element_text(title, text.trim());
        title
    }

    /// Deep-copy the subtree rooted at `src` in `source` under `parent`.
    pub fn graft(&mut self, parent: NodeId, source: &XmlTree, src: NodeId) -> NodeId {
        match source.node(src) {
            XmlNode::Element {
                name,
                attributes,
                children,
            } => {
                let copy = self.add_element(parent, name);
                if let XmlNode::Element {
                    attributes: dest_attrs,
                    ..
                } = &mut self.nodes[copy]
                {
                    *dest_attrs = attributes.clone();
                }
                for &child in children {
                    self.graft(copy, source, child);
                }
                copy
            }
            XmlNode::Text(text) => self.add_text(parent, text),
            XmlNode::EntityRef(entity) => self.add_entity_ref(parent, entity),
        }
    }

    /// Deep-copy the subtree into a standalone tree.
    pub fn extract_subtree(&self, id: NodeId) -> XmlTree {
        let name = self.name(id).unwrap_or("fragment").to_string();
        let mut tree = XmlTree::new(&name);
        if let XmlNode::Element { attributes, .. } = self.node(id) {
            for (k, v) in attributes {
                tree.set_attr(tree.root(), k, v);
            }
        }
        for child in self.children(id) {
            tree.graft(tree.root, self, child);
        }
        tree
    }

    /// Serialize the tree: UTF-8, two-space indent, no XML declaration.
    pub fn serialize(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        self.write_node(self.root, &mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| ConversionError::Config(format!("non-UTF-8 serializer output: {e}")))
    }

    fn write_node(&self, id: NodeId, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        match &self.nodes[id] {
            XmlNode::Element {
                name,
                attributes,
                children,
            } => {
                let mut start = BytesStart::new(name.as_str());
                for (key, value) in attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for &child in children {
                        self.write_node(child, writer)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            XmlNode::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            XmlNode::EntityRef(entity) => {
                // Pre-escaped so the reference survives serialization intact
                writer.write_event(Event::Text(BytesText::from_escaped(format!("&{entity};"))))?;
            }
        }
        Ok(())
    }

    /// Parse an XML document into a tree. Namespace prefixes are stripped
    /// from element and attribute names; whitespace-only text is dropped.
    pub fn parse(xml: &str) -> Result<XmlTree> {
        let mut reader = Reader::from_str(xml);
        let mut tree: Option<XmlTree> = None;
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = local_name(e.name().as_ref());
                    match tree.as_mut() {
                        None => {
                            let mut new_tree = XmlTree::new(&name);
                            apply_attributes(&mut new_tree, 0, &e)?;
                            stack.push(new_tree.root());
                            tree = Some(new_tree);
                        }
                        Some(tree) => {
                            let parent = *stack.last().ok_or_else(|| {
                                ConversionError::Config("unbalanced XML".to_string())
                            })?;
                            let id = tree.add_element(parent, &name);
                            apply_attributes(tree, id, &e)?;
                            stack.push(id);
                        }
                    }
                }
                Event::Empty(e) => {
                    let name = local_name(e.name().as_ref());
                    match tree.as_mut() {
                        None => {
                            let mut new_tree = XmlTree::new(&name);
                            apply_attributes(&mut new_tree, 0, &e)?;
                            tree = Some(new_tree);
                        }
                        Some(tree) => {
                            let parent = *stack.last().ok_or_else(|| {
                                ConversionError::Config("unbalanced XML".to_string())
                            })?;
                            let id = tree.add_element(parent, &name);
                            apply_attributes(tree, id, &e)?;
                        }
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) => {
                    if let (Some(tree), Some(&parent)) = (tree.as_mut(), stack.last()) {
                        let text = t
                            .unescape()
                            .map(|cow| cow.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                        if !text.trim().is_empty() {
                            tree.add_text(parent, &text);
                        }
                    }
                }
                Event::CData(t) => {
                    if let (Some(tree), Some(&parent)) = (tree.as_mut(), stack.last()) {
                        let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                        if !text.trim().is_empty() {
                            tree.add_text(parent, &text);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        tree.ok_or_else(|| ConversionError::Config("empty XML document".to_string()))
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn apply_attributes(tree: &mut XmlTree, id: NodeId, element: &BytesStart) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let raw_key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if raw_key == "xmlns" || raw_key.starts_with("xmlns:") {
            continue;
        }
        let key = local_name(attr.key.as_ref());
        let value = attr
            .unescape_value()
            .map(|cow| cow.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        tree.set_attr(id, &key, &value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_serialize() {
        let mut tree = XmlTree::new("book");
        let chapter = tree.add_element(tree.root(), "chapter");
        tree.ensure_title(chapter, "One");
        let para = tree.add_element(chapter, "para");
        tree.add_text(para, "Hello & <world>");

        let xml = tree.serialize().unwrap();
        assert!(xml.contains("<title>One</title>"));
        assert!(xml.contains("Hello &amp; &lt;world&gt;"));
    }

    #[test]
    fn test_entity_refs_survive_serialization() {
        let mut tree = XmlTree::new("book");
        tree.add_entity_ref(tree.root(), "Ch001");
        let xml = tree.serialize().unwrap();
        assert!(xml.contains("&Ch001;"));
        assert!(!xml.contains("&amp;Ch001;"));
    }

    #[test]
    fn test_ensure_title_is_first_child_and_idempotent() {
        let mut tree = XmlTree::new("chapter");
        let para = tree.add_element(tree.root(), "para");
        tree.add_text(para, "body");
        tree.ensure_title(tree.root(), "First");
        tree.ensure_title(tree.root(), "Second");

        let children = tree.child_elements(tree.root());
        assert_eq!(tree.name(children[0]), Some("title"));
        assert_eq!(tree.title_text(tree.root()), "Second");
        // Only one title element
        let titles = children
            .iter()
            .filter(|&&c| tree.name(c) == Some("title"))
            .count();
        assert_eq!(titles, 1);
    }

    #[test]
    fn test_parse_strips_namespaces() {
        let xml = r#"<opf:package xmlns:opf="http://www.idpf.org/2007/opf">
            <opf:manifest><opf:item id="a" href="ch1.xhtml"/></opf:manifest>
        </opf:package>"#;
        let tree = XmlTree::parse(xml).unwrap();
        assert_eq!(tree.name(tree.root()), Some("package"));
        let manifest = tree.find_child_element(tree.root(), "manifest").unwrap();
        let item = tree.find_child_element(manifest, "item").unwrap();
        assert_eq!(tree.attr(item, "href"), Some("ch1.xhtml"));
    }

    #[test]
    fn test_parse_roundtrip_text() {
        let xml = "<chapter><title>T</title><para>alpha beta</para></chapter>";
        let tree = XmlTree::parse(xml).unwrap();
        let para = tree.find_child_element(tree.root(), "para").unwrap();
        assert_eq!(tree.text_content(para), "alpha beta");
    }

    #[test]
    fn test_extract_subtree_copies_attributes() {
        let mut tree = XmlTree::new("book");
        let chapter = tree.add_element(tree.root(), "chapter");
        tree.set_attr(chapter, "role", "toc");
        let para = tree.add_element(chapter, "para");
        tree.add_text(para, "text");

        let fragment = tree.extract_subtree(chapter);
        assert_eq!(fragment.name(fragment.root()), Some("chapter"));
        assert_eq!(fragment.attr(fragment.root(), "role"), Some("toc"));
        assert_eq!(
            fragment.text_content(fragment.root()).trim(),
            "text"
        );
    }
}
