//! Rich-text document tree
//!
//! A document is a tree of typed nodes with a closed set of kinds. Positions
//! are token positions: every character of a text node counts one, an inline
//! atom counts one, and every node below the root contributes an opening and
//! a closing token. The root `Doc` contributes no tokens of its own, so valid
//! positions in a document run from `0` to `size()`.
//!
//! Editing methods mutate the receiver and are meant to run against a working
//! copy; a failed edit may leave that copy half-modified, so callers discard
//! it and keep the original (see `Step::apply`).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mark::Mark;

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Doc {
        content: Vec<Node>,
    },
    Paragraph {
        content: Vec<Node>,
    },
    Heading {
        level: u8,
        content: Vec<Node>,
    },
    BulletList {
        content: Vec<Node>,
    },
    OrderedList {
        content: Vec<Node>,
    },
    ListItem {
        content: Vec<Node>,
    },
    Table {
        content: Vec<Node>,
    },
    TableRow {
        content: Vec<Node>,
    },
    TableCell {
        content: Vec<Node>,
    },
    Footnote {
        content: Vec<Node>,
    },
    Image {
        src: String,
        alt: String,
    },
    Text {
        text: String,
        #[serde(default)]
        marks: Vec<Mark>,
    },
}

impl Node {
    /// A fresh document: one empty paragraph.
    pub fn empty_doc() -> Node {
        Node::Doc {
            content: vec![Node::Paragraph { content: vec![] }],
        }
    }

    /// Unmarked text node.
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Doc { .. } => "doc",
            Node::Paragraph { .. } => "paragraph",
            Node::Heading { .. } => "heading",
            Node::BulletList { .. } => "bullet_list",
            Node::OrderedList { .. } => "ordered_list",
            Node::ListItem { .. } => "list_item",
            Node::Table { .. } => "table",
            Node::TableRow { .. } => "table_row",
            Node::TableCell { .. } => "table_cell",
            Node::Footnote { .. } => "footnote",
            Node::Image { .. } => "image",
            Node::Text { .. } => "text",
        }
    }

    /// Token size of this node. See the module docs for the position scheme.
    pub fn size(&self) -> usize {
        match self {
            Node::Text { text, .. } => text.chars().count(),
            Node::Image { .. } => 1,
            Node::Doc { content } => content.iter().map(Node::size).sum(),
            _ => 2 + self.children().map_or(0, |c| c.iter().map(Node::size).sum::<usize>()),
        }
    }

    fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Doc { content }
            | Node::Paragraph { content }
            | Node::Heading { content, .. }
            | Node::BulletList { content }
            | Node::OrderedList { content }
            | Node::ListItem { content }
            | Node::Table { content }
            | Node::TableRow { content }
            | Node::TableCell { content }
            | Node::Footnote { content } => Some(content),
            Node::Image { .. } | Node::Text { .. } => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Doc { content }
            | Node::Paragraph { content }
            | Node::Heading { content, .. }
            | Node::BulletList { content }
            | Node::OrderedList { content }
            | Node::ListItem { content }
            | Node::Table { content }
            | Node::TableRow { content }
            | Node::TableCell { content }
            | Node::Footnote { content } => Some(content),
            Node::Image { .. } | Node::Text { .. } => None,
        }
    }

    /// Textblocks hold inline content directly.
    fn is_textblock(&self) -> bool {
        matches!(
            self,
            Node::Paragraph { .. } | Node::Heading { .. } | Node::Footnote { .. }
        )
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Node::Text { .. } | Node::Image { .. })
    }

    fn can_contain(&self, child: &Node) -> bool {
        match self {
            Node::Doc { .. } => matches!(
                child,
                Node::Paragraph { .. }
                    | Node::Heading { .. }
                    | Node::BulletList { .. }
                    | Node::OrderedList { .. }
                    | Node::Table { .. }
                    | Node::Footnote { .. }
            ),
            Node::Paragraph { .. } | Node::Heading { .. } | Node::Footnote { .. } => {
                child.is_inline()
            }
            Node::BulletList { .. } | Node::OrderedList { .. } => {
                matches!(child, Node::ListItem { .. })
            }
            Node::ListItem { .. } | Node::TableCell { .. } => matches!(
                child,
                Node::Paragraph { .. }
                    | Node::Heading { .. }
                    | Node::BulletList { .. }
                    | Node::OrderedList { .. }
            ),
            Node::Table { .. } => matches!(child, Node::TableRow { .. }),
            Node::TableRow { .. } => matches!(child, Node::TableCell { .. }),
            Node::Image { .. } | Node::Text { .. } => false,
        }
    }

    /// Validate a whole document. Used on hydration, where the tree comes
    /// from outside the process; editing methods keep a valid tree valid.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self, Node::Doc { .. }) {
            return Err(Error::MalformedDocument(format!(
                "document root must be a doc node, found {}",
                self.kind()
            )));
        }
        self.validate_subtree()
    }

    pub(crate) fn validate_subtree(&self) -> Result<()> {
        if let Node::Heading { level, .. } = self {
            if !(1..=6).contains(level) {
                return Err(Error::MalformedDocument(format!(
                    "heading level {level} out of range"
                )));
            }
        }
        if let Node::Text { text, .. } = self {
            if text.is_empty() {
                return Err(Error::MalformedDocument("empty text node".into()));
            }
        }
        if let Some(children) = self.children() {
            for child in children {
                if !self.can_contain(child) {
                    return Err(Error::MalformedDocument(format!(
                        "{} cannot contain {}",
                        self.kind(),
                        child.kind()
                    )));
                }
                child.validate_subtree()?;
            }
        }
        Ok(())
    }

    /// Concatenated text of the document, blocks separated by newlines.
    pub fn text_content(&self) -> String {
        fn collect(node: &Node, out: &mut String) {
            match node {
                Node::Text { text, .. } => out.push_str(text),
                Node::Image { .. } => {}
                _ => {
                    if let Some(children) = node.children() {
                        for child in children {
                            collect(child, out);
                            if !child.is_inline() && !out.ends_with('\n') {
                                out.push('\n');
                            }
                        }
                    }
                }
            }
        }
        let mut out = String::new();
        collect(self, &mut out);
        out.truncate(out.trim_end_matches('\n').len());
        out
    }

    /// The node whose opening token sits exactly at `pos`.
    pub fn node_at(&self, pos: usize) -> Option<&Node> {
        let children = self.children()?;
        let mut offset = 0;
        for child in children {
            if pos == offset {
                return Some(child);
            }
            let size = child.size();
            if pos < offset + size {
                return child.node_at(pos - offset - 1);
            }
            offset += size;
        }
        None
    }

    /// Insert text at a position inside a textblock.
    pub fn insert_text(&mut self, pos: usize, text: &str, marks: &[Mark]) -> Result<()> {
        if pos > self.size() {
            return Err(Error::InvalidStep(format!(
                "position {pos} outside document of size {}",
                self.size()
            )));
        }
        self.insert_text_at(pos, text, marks)
    }

    fn insert_text_at(&mut self, pos: usize, text: &str, marks: &[Mark]) -> Result<()> {
        if self.is_textblock() {
            let content = self.children_mut().unwrap_or_else(|| unreachable!());
            return insert_inline_text(content, pos, text, marks);
        }
        let children = self
            .children_mut()
            .ok_or_else(|| Error::InvalidStep(format!("position {pos} is not a text position")))?;
        let mut offset = 0;
        for child in children.iter_mut() {
            let size = child.size();
            if pos > offset && pos < offset + size {
                return child.insert_text_at(pos - offset - 1, text, marks);
            }
            offset += size;
        }
        Err(Error::InvalidStep(format!(
            "position {pos} is not inside a text block"
        )))
    }

    /// Delete the inline range `[from, to)`. The range must stay within a
    /// single textblock; deletions crossing block boundaries are rejected.
    pub fn delete_text(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= to || to > self.size() {
            return Err(Error::InvalidStep(format!(
                "invalid deletion range {from}..{to}"
            )));
        }
        self.delete_text_at(from, to)
    }

    fn delete_text_at(&mut self, from: usize, to: usize) -> Result<()> {
        if self.is_textblock() {
            let content = self.children_mut().unwrap_or_else(|| unreachable!());
            return delete_inline(content, from, to);
        }
        let children = self
            .children_mut()
            .ok_or_else(|| Error::InvalidStep(format!("range {from}..{to} is not inline")))?;
        let mut offset = 0;
        for child in children.iter_mut() {
            let size = child.size();
            if from >= offset + size {
                offset += size;
                continue;
            }
            if from == offset || to >= offset + size {
                return Err(Error::InvalidStep(format!(
                    "deletion range {from}..{to} crosses block boundaries"
                )));
            }
            return child.delete_text_at(from - offset - 1, to - offset - 1);
        }
        Err(Error::InvalidStep(format!(
            "deletion range {from}..{to} outside document"
        )))
    }

    /// The inline content covered by `[from, to)`, trimmed to the range.
    /// Same single-textblock constraint as `delete_text`.
    pub fn inline_slice(&self, from: usize, to: usize) -> Result<Vec<Node>> {
        if from >= to || to > self.size() {
            return Err(Error::InvalidStep(format!("invalid range {from}..{to}")));
        }
        self.inline_slice_at(from, to)
    }

    fn inline_slice_at(&self, from: usize, to: usize) -> Result<Vec<Node>> {
        if self.is_textblock() {
            let mut out = Vec::new();
            let mut offset = 0;
            for child in self.children().unwrap_or_else(|| unreachable!()) {
                let size = child.size();
                let start = from.max(offset);
                let end = to.min(offset + size);
                if start < end {
                    match child {
                        Node::Text { text, marks } => {
                            let b0 = byte_index(text, start - offset);
                            let b1 = byte_index(text, end - offset);
                            out.push(Node::Text {
                                text: text[b0..b1].to_string(),
                                marks: marks.clone(),
                            });
                        }
                        _ => out.push(child.clone()),
                    }
                }
                offset += size;
            }
            return Ok(out);
        }
        let children = self
            .children()
            .ok_or_else(|| Error::InvalidStep(format!("range {from}..{to} is not inline")))?;
        let mut offset = 0;
        for child in children {
            let size = child.size();
            if from >= offset + size {
                offset += size;
                continue;
            }
            if from == offset || to >= offset + size {
                return Err(Error::InvalidStep(format!(
                    "range {from}..{to} crosses block boundaries"
                )));
            }
            return child.inline_slice_at(from - offset - 1, to - offset - 1);
        }
        Err(Error::InvalidStep(format!(
            "range {from}..{to} outside document"
        )))
    }

    /// Add or remove a mark over `[from, to)`. The range may span blocks;
    /// atoms inside the range are skipped.
    pub fn mark_range(&mut self, from: usize, to: usize, mark: &Mark, add: bool) -> Result<()> {
        if from > to || to > self.size() {
            return Err(Error::InvalidStep(format!("invalid mark range {from}..{to}")));
        }
        let children = self
            .children_mut()
            .ok_or_else(|| Error::MalformedDocument("mark target is not a container".into()))?;
        mark_children(children, from, to, mark, add);
        Ok(())
    }

    /// Insert a node. Inline nodes land inside a textblock (splitting text if
    /// needed); block nodes land on a boundary whose parent accepts the kind.
    pub fn insert_node(&mut self, pos: usize, node: Node) -> Result<()> {
        if pos > self.size() {
            return Err(Error::InvalidStep(format!(
                "position {pos} outside document of size {}",
                self.size()
            )));
        }
        node.validate_subtree()
            .map_err(|e| Error::InvalidStep(e.to_string()))?;
        if node.is_inline() {
            self.insert_inline_node_at(pos, node)
        } else {
            self.insert_block_at(pos, node)
        }
    }

    fn insert_inline_node_at(&mut self, pos: usize, node: Node) -> Result<()> {
        if self.is_textblock() {
            let content = self.children_mut().unwrap_or_else(|| unreachable!());
            return insert_inline_node(content, pos, node);
        }
        let children = self
            .children_mut()
            .ok_or_else(|| Error::InvalidStep(format!("position {pos} is not inline")))?;
        let mut offset = 0;
        for child in children.iter_mut() {
            let size = child.size();
            if pos > offset && pos < offset + size {
                return child.insert_inline_node_at(pos - offset - 1, node);
            }
            offset += size;
        }
        Err(Error::InvalidStep(format!(
            "position {pos} is not inside a text block"
        )))
    }

    fn insert_block_at(&mut self, pos: usize, node: Node) -> Result<()> {
        let accepts = self.can_contain(&node);
        let kind = node.kind();
        let children = self.children_mut().ok_or_else(|| {
            Error::InvalidStep(format!("no block boundary at position {pos}"))
        })?;
        let mut offset = 0;
        for idx in 0..children.len() {
            if pos == offset {
                if !accepts {
                    return Err(Error::InvalidStep(format!(
                        "parent cannot contain a {kind} node here"
                    )));
                }
                children.insert(idx, node);
                return Ok(());
            }
            let size = children[idx].size();
            if pos < offset + size {
                return children[idx].insert_block_at(pos - offset - 1, node);
            }
            offset += size;
        }
        if pos == offset {
            if !accepts {
                return Err(Error::InvalidStep(format!(
                    "parent cannot contain a {kind} node here"
                )));
            }
            children.push(node);
            return Ok(());
        }
        Err(Error::InvalidStep(format!(
            "no block boundary at position {pos}"
        )))
    }

    /// Remove the node whose opening token sits exactly at `pos`.
    pub fn delete_node(&mut self, pos: usize) -> Result<()> {
        let children = self
            .children_mut()
            .ok_or_else(|| Error::InvalidStep(format!("no node at position {pos}")))?;
        let mut offset = 0;
        for idx in 0..children.len() {
            if pos == offset {
                children.remove(idx);
                return Ok(());
            }
            let size = children[idx].size();
            if pos < offset + size {
                return children[idx].delete_node(pos - offset - 1);
            }
            offset += size;
        }
        Err(Error::InvalidStep(format!("no node at position {pos}")))
    }
}

/// Byte offset of the `char_idx`-th character.
fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

fn insert_inline_text(
    content: &mut Vec<Node>,
    pos: usize,
    text: &str,
    marks: &[Mark],
) -> Result<()> {
    enum Place {
        Within(usize, usize),
        Boundary(usize),
    }

    let mut offset = 0;
    let mut place = None;
    for (idx, child) in content.iter().enumerate() {
        let size = child.size();
        if pos <= offset + size {
            place = Some(match child {
                Node::Text { .. } => Place::Within(idx, pos - offset),
                _ if pos == offset => Place::Boundary(idx),
                _ if pos == offset + size => Place::Boundary(idx + 1),
                _ => return Err(Error::InvalidStep(format!("position {pos} inside an atom"))),
            });
            break;
        }
        offset += size;
    }
    let place = match place {
        Some(p) => p,
        None if pos == offset => Place::Boundary(content.len()),
        None => {
            return Err(Error::InvalidStep(format!(
                "position {pos} outside inline content"
            )))
        }
    };

    match place {
        Place::Within(idx, at) => {
            let same_marks =
                matches!(&content[idx], Node::Text { marks: m, .. } if m.as_slice() == marks);
            if same_marks {
                if let Node::Text { text: existing, .. } = &mut content[idx] {
                    let b = byte_index(existing, at);
                    existing.insert_str(b, text);
                }
                return Ok(());
            }
            let new_node = Node::Text {
                text: text.to_string(),
                marks: marks.to_vec(),
            };
            let end = content[idx].size();
            if at == 0 {
                content.insert(idx, new_node);
            } else if at == end {
                content.insert(idx + 1, new_node);
            } else if let Node::Text { text: existing, marks: m } = &mut content[idx] {
                let b = byte_index(existing, at);
                let tail = existing.split_off(b);
                let tail_marks = m.clone();
                content.insert(
                    idx + 1,
                    Node::Text {
                        text: tail,
                        marks: tail_marks,
                    },
                );
                content.insert(idx + 1, new_node);
            }
            Ok(())
        }
        Place::Boundary(idx) => {
            content.insert(
                idx,
                Node::Text {
                    text: text.to_string(),
                    marks: marks.to_vec(),
                },
            );
            Ok(())
        }
    }
}

fn insert_inline_node(content: &mut Vec<Node>, pos: usize, node: Node) -> Result<()> {
    let mut offset = 0;
    for idx in 0..content.len() {
        if pos == offset {
            content.insert(idx, node);
            return Ok(());
        }
        let size = content[idx].size();
        if pos < offset + size {
            if let Node::Text { text, marks } = &mut content[idx] {
                let b = byte_index(text, pos - offset);
                let tail = text.split_off(b);
                let tail_marks = marks.clone();
                content.insert(
                    idx + 1,
                    Node::Text {
                        text: tail,
                        marks: tail_marks,
                    },
                );
                content.insert(idx + 1, node);
                return Ok(());
            }
            return Err(Error::InvalidStep(format!("position {pos} inside an atom")));
        }
        offset += size;
    }
    if pos == offset {
        content.push(node);
        return Ok(());
    }
    Err(Error::InvalidStep(format!(
        "position {pos} outside inline content"
    )))
}

fn delete_inline(content: &mut Vec<Node>, from: usize, to: usize) -> Result<()> {
    let total: usize = content.iter().map(Node::size).sum();
    if to > total {
        return Err(Error::InvalidStep(format!(
            "deletion range {from}..{to} outside inline content"
        )));
    }
    let mut rebuilt = Vec::with_capacity(content.len());
    let mut offset = 0;
    for mut child in content.drain(..) {
        let size = child.size();
        let start = from.max(offset);
        let end = to.min(offset + size);
        if start >= end {
            rebuilt.push(child);
        } else if start > offset || end < offset + size {
            // partial overlap: only text can be trimmed, atoms are size one
            // and always either untouched or fully covered
            if let Node::Text { text, .. } = &mut child {
                let b0 = byte_index(text, start - offset);
                let b1 = byte_index(text, end - offset);
                text.replace_range(b0..b1, "");
                rebuilt.push(child);
            }
        }
        offset += size;
    }
    *content = rebuilt;
    Ok(())
}

fn mark_children(children: &mut Vec<Node>, from: usize, to: usize, mark: &Mark, add: bool) {
    let mut offset = 0;
    let mut idx = 0;
    while idx < children.len() {
        let size = children[idx].size();
        let start = from.max(offset);
        let end = to.min(offset + size);
        if start < end {
            match &children[idx] {
                Node::Text { .. } => {
                    let produced = mark_text(children, idx, start - offset, end - offset, mark, add);
                    offset += size;
                    idx += produced;
                    continue;
                }
                Node::Image { .. } => {}
                _ => {
                    let inner_from = start.max(offset + 1) - (offset + 1);
                    let inner_to = end.min(offset + size - 1).saturating_sub(offset + 1);
                    if inner_from < inner_to {
                        if let Some(inner) = children[idx].children_mut() {
                            mark_children(inner, inner_from, inner_to, mark, add);
                        }
                    }
                }
            }
        }
        offset += size;
        idx += 1;
    }
}

/// Split a text node so the mark change applies exactly to `[from_ch, to_ch)`.
/// Returns how many nodes now occupy the original slot.
fn mark_text(
    children: &mut Vec<Node>,
    idx: usize,
    from_ch: usize,
    to_ch: usize,
    mark: &Mark,
    add: bool,
) -> usize {
    let node = children.remove(idx);
    let Node::Text { text, marks } = node else {
        unreachable!("mark_text called on a non-text node");
    };
    let mut target = marks.clone();
    if add {
        if !target.contains(mark) {
            target.push(mark.clone());
        }
    } else {
        target.retain(|m| m != mark);
    }
    let b0 = byte_index(&text, from_ch);
    let b1 = byte_index(&text, to_ch);
    let mut produced = 0;
    let mut at = idx;
    if b0 > 0 {
        children.insert(
            at,
            Node::Text {
                text: text[..b0].to_string(),
                marks: marks.clone(),
            },
        );
        at += 1;
        produced += 1;
    }
    children.insert(
        at,
        Node::Text {
            text: text[b0..b1].to_string(),
            marks: target,
        },
    );
    at += 1;
    produced += 1;
    if b1 < text.len() {
        children.insert(
            at,
            Node::Text {
                text: text[b1..].to_string(),
                marks,
            },
        );
        produced += 1;
    }
    produced
}
