//! Back-of-book index parsing.
//!
//! Index pages arrive as a heterogeneous paragraph stream: single-letter
//! division headers, primary entries with dot-leadered page numbers,
//! cross-references (`, see [also] TARGET`) and indented continuation lines.
//! This sub-state machine turns that stream into `indexdiv` / `indexentry`
//! structure with `primaryie`, `secondaryie`, `seeie` and `seealsoie`
//! payloads.

use crate::docbook::xml::{NodeId, XmlTree};
use regex::Regex;
use std::sync::LazyLock;

static LETTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]$").unwrap());

static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i),\s*(see(?:\s+also)?)\s+(.*)$").unwrap());

static PAGES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d[\d\sA-Za-z,–-]*)$").unwrap());

static DOTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Entries indented no further than this past the division's base left edge
/// are new primary entries; deeper indents nest under the current entry.
const INDENT_THRESHOLD: f32 = 18.0;

#[derive(Debug, Default)]
pub struct IndexState {
    current_div: Option<NodeId>,
    current_entry: Option<NodeId>,
    base_left: Option<f32>,
}

impl IndexState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Replace dot-leader runs with a space and collapse whitespace.
fn normalise_index_text(text: &str) -> String {
    let cleaned = DOTS_RE.replace_all(text, " ");
    WS_RE.replace_all(cleaned.trim(), " ").into_owned()
}

/// Split a trailing `, see [also] TARGET` cross-reference off the entry.
fn extract_reference(text: &str) -> (String, Option<String>) {
    let Some(captures) = REFERENCE_RE.captures(text) else {
        return (text.to_string(), None);
    };
    let whole = captures.get(0).unwrap();
    let prefix = captures.get(1).unwrap().as_str();
    let target = captures.get(2).unwrap().as_str().trim();
    let remainder = text[..whole.start()]
        .trim_end_matches(|c| c == ',' || c == ' ')
        .to_string();
    (remainder, Some(format!("{prefix} {target}").trim().to_string()))
}

/// Split a trailing page-number run (digits plus separators) off the entry.
fn extract_pages(text: &str) -> (String, Option<String>) {
    let Some(m) = PAGES_RE.find(text) else {
        return (text.to_string(), None);
    };
    let pages = m.as_str().trim().to_string();
    let remainder = text[..m.start()]
        .trim_end_matches(|c| matches!(c, ',' | ';' | ':' | ' '))
        .to_string();
    (remainder, Some(pages))
}

fn start_div(tree: &mut XmlTree, index: NodeId, title: &str, state: &mut IndexState) -> NodeId {
    let div = tree.add_element(index, "indexdiv");
    tree.ensure_title(div, title);
    state.current_div = Some(div);
    div
}

fn first_letter_title(text: &str) -> String {
    text.chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "#".to_string())
}

/// Feed one paragraph into the index. Returns true when the paragraph was
/// consumed (it always is while an index is open).
pub fn handle_index_para(
    tree: &mut XmlTree,
    index: NodeId,
    state: &mut IndexState,
    text: &str,
    left: Option<f32>,
) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return true;
    }
    let normalised = normalise_index_text(text);
    if normalised.is_empty() {
        return true;
    }

    if state.base_left.is_none() {
        state.base_left = left;
    }

    // Single uppercase letter: a new alphabetic division
    if LETTER_RE.is_match(&normalised) {
        start_div(tree, index, &normalised, state);
        state.current_entry = None;
        if left.is_some() {
            state.base_left = left;
        }
        return true;
    }

    if state.current_div.is_none() {
        let title = first_letter_title(&normalised);
        start_div(tree, index, &title, state);
        if left.is_some() {
            state.base_left = left;
        }
    }

    let base_left = state.base_left.unwrap_or(0.0);
    let indent = left.map(|l| (l - base_left).max(0.0)).unwrap_or(0.0);

    let (working, reference) = extract_reference(&normalised);
    let (working, pages) = extract_pages(&working);
    let entry_text = working
        .trim_matches(|c| c == ',' || c == ' ')
        .to_string();

    if entry_text.is_empty() {
        // Pure page/reference continuation: attach to the open entry
        if let Some(entry) = state.current_entry {
            if let Some(pages) = pages {
                let seeie = tree.add_element(entry, "seeie");
                tree.set_element_text(seeie, &pages);
            }
            if let Some(reference) = reference {
                let seealso = tree.add_element(entry, "seealsoie");
                tree.set_element_text(seealso, &reference);
            }
        }
        return true;
    }

    let div = state
        .current_div
        .expect("index division exists after auto-creation");

    if indent <= INDENT_THRESHOLD || state.current_entry.is_none() {
        let entry = tree.add_element(div, "indexentry");
        let primary = tree.add_element(entry, "primaryie");
        tree.set_element_text(primary, &entry_text);
        if let Some(pages) = pages {
            let seeie = tree.add_element(entry, "seeie");
            tree.set_element_text(seeie, &pages);
        }
        if let Some(reference) = reference {
            let seealso = tree.add_element(entry, "seealsoie");
            tree.set_element_text(seealso, &reference);
        }
        state.current_entry = Some(entry);
        return true;
    }

    // Indented continuation: nest under the current entry
    let parent_entry = state.current_entry.expect("checked above");
    let container = tree.add_element(parent_entry, "secondaryie");
    let term = tree.add_element(container, "secondaryie");
    tree.set_element_text(term, &entry_text);
    if let Some(pages) = pages {
        let seeie = tree.add_element(container, "seeie");
        tree.set_element_text(seeie, &pages);
    }
    if let Some(reference) = reference {
        let seealso = tree.add_element(container, "seealsoie");
        tree.set_element_text(seealso, &reference);
    }
    true
}
