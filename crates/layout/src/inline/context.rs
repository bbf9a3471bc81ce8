//! Paragraph element arrays and line lists.
//!
//! An inline container's subtree is flattened into one element per code
//! point or inline object. The array is rebuilt whenever text or structure
//! below the container changes; advances are filled in by incremental
//! measurement and break solutions refer to elements by index.
//!
//! # Invariants
//! - An element with `WORD_END` always has `PenaltyType::None`.
//! - An element produced by a hyphenation delimiter has
//!   `PenaltyType::Multipart`.
//! - Line lists partition `[0, N]`: `line[i].a == line[i-1].b`,
//!   `line[0].a == 0`, `line[last].b == N`.

use bitflags::bitflags;
use dom::{NodeArena, NodeFlags, NodeId};
use style::{LayoutClass, WhiteSpace, WrapMode};

use crate::fixed::TextFixed;
use crate::inline::inline_next;

/// Code point recorded for inline-object elements (the Unicode object
/// replacement character).
pub const OBJECT_CODE_POINT: u32 = 0xFFFC;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ElementFlags: u8 {
        /// Last code point of a word; inter-word glue follows.
        const WORD_END      = 1 << 0;
        /// The element stands for an inline object, not a code point.
        const INLINE_OBJECT = 1 << 1;
        /// First element generated by its node.
        const NODE_FIRST    = 1 << 2;
        /// Part of the current text selection.
        const SELECTED      = 1 << 3;
    }
}

/// Break opportunity class of the position after an element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PenaltyType {
    /// A free break (word boundaries, forced-wrap characters).
    #[default]
    None = 0,
    /// Breaking here is forbidden.
    ProhibitBreak = 1,
    /// A hyphenation delimiter; cheap to break after.
    Multipart = 2,
    /// Mid-word position; breaking is a last resort.
    InterCharacter = 3,
    /// The line must end here.
    ForceBreak = 4,
}

/// Penalty values indexed by `PenaltyType`.
pub const PENALTIES: [i32; 5] = [0, 10_000, 50, 5_000, -10_000];

/// One atomic typesetting unit: a code point or an inline object.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParagraphElement {
    pub code_point: u32,
    /// Measured advance, text-metric fixed point.
    pub advance: TextFixed,
    pub penalty: PenaltyType,
    pub flags: ElementFlags,
}

impl ParagraphElement {
    pub fn is_word_end(&self) -> bool {
        self.flags.contains(ElementFlags::WORD_END)
    }

    pub fn is_inline_object(&self) -> bool {
        self.flags.contains(ElementFlags::INLINE_OBJECT)
    }

    pub fn is_node_first(&self) -> bool {
        self.flags.contains(ElementFlags::NODE_FIRST)
    }

    pub fn is_selected(&self) -> bool {
        self.flags.contains(ElementFlags::SELECTED)
    }
}

/// One line of a finalized break solution. `a..b` is the element range,
/// `width`/`height` are whole pixels, `adjustment_ratio` scales the line's
/// glue to justify it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParagraphLine {
    pub a: usize,
    pub b: usize,
    pub width: u32,
    pub height: u32,
    pub adjustment_ratio: TextFixed,
    pub demerits: i64,
}

/// A finalized break solution for one maximum width.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineList {
    pub lines: Vec<ParagraphLine>,
    /// The width the solution was built for, px.
    pub max_width: i32,
}

/// Per-container inline state.
#[derive(Default)]
pub struct InlineContext {
    pub elements: Vec<ParagraphElement>,
    pub lines: Option<LineList>,
}

fn is_space(ch: u32) -> bool {
    matches!(ch, 0x20 | 0x9 | 0xA | 0xC | 0xD)
}

/// Hyphen-like delimiters that split a word into breakable parts.
fn is_multipart_delimiter(ch: u32) -> bool {
    matches!(ch, 0x2D /* - */ | 0x2010 | 0x2011 | 0x2F /* / */)
}

/// Walks the text content of an inline container, yielding one event per
/// code point or inline object.
struct TextEvents<'a> {
    nodes: &'a NodeArena,
    root: NodeId,
    node: NodeId,
    chars: std::str::Chars<'a>,
}

enum TextEvent {
    Char(NodeId, u32),
    Object(NodeId),
}

impl<'a> TextEvents<'a> {
    fn new(nodes: &'a NodeArena, root: NodeId) -> TextEvents<'a> {
        TextEvents { nodes, root, node: root, chars: nodes.get(root).text.chars() }
    }

    fn next(&mut self) -> Option<TextEvent> {
        loop {
            if let Some(ch) = self.chars.next() {
                return Some(TextEvent::Char(self.node, ch as u32));
            }
            self.node = inline_next(self.nodes, self.root, self.node)?;
            let n = self.nodes.get(self.node);
            match n.layout {
                LayoutClass::Inline => {
                    self.chars = n.text.chars();
                }
                LayoutClass::None => {
                    self.chars = "".chars();
                }
                _ => {
                    self.chars = "".chars();
                    return Some(TextEvent::Object(self.node));
                }
            }
        }
    }
}

/// Rebuilds a container's paragraph element array from its subtree.
/// Clears and re-derives the per-node `HAS_PARAGRAPH_ELEMENTS` bits.
pub fn build_paragraph_elements(
    nodes: &mut NodeArena,
    container: NodeId,
    mode: WhiteSpace,
    wrap: WrapMode,
) -> Vec<ParagraphElement> {
    // Clear the empty bits for the whole inline subtree.
    let mut cur = Some(container);
    while let Some(n) = cur {
        nodes.get_mut(n).flags.remove(NodeFlags::HAS_PARAGRAPH_ELEMENTS);
        cur = inline_next(nodes, container, n);
    }

    let mut out = Vec::new();
    let mut source_nodes: Vec<NodeId> = Vec::new();
    {
        let nodes_ref: &NodeArena = nodes;
        let mut events = TextEvents::new(nodes_ref, container);

        // Skip leading white space unless it is preserved.
        let mut pending = events.next();
        if mode == WhiteSpace::Normal {
            while let Some(TextEvent::Char(_, ch)) = pending {
                if !is_space(ch) {
                    break;
                }
                pending = events.next();
            }
        }

        let mut last_node: Option<NodeId> = None;
        while let Some(event) = pending {
            let (node, code_point, object) = match event {
                TextEvent::Char(n, ch) => (n, ch, false),
                TextEvent::Object(n) => (n, OBJECT_CODE_POINT, true),
            };

            let mut e = ParagraphElement {
                code_point,
                advance: TextFixed::ZERO,
                penalty: if is_multipart_delimiter(code_point) {
                    PenaltyType::Multipart
                } else if wrap == WrapMode::CharacterWrap {
                    PenaltyType::None
                } else {
                    PenaltyType::InterCharacter
                },
                flags: ElementFlags::empty(),
            };
            if object {
                e.flags |= ElementFlags::INLINE_OBJECT;
            }
            if last_node != Some(node) {
                e.flags |= ElementFlags::NODE_FIRST;
            }
            last_node = Some(node);

            pending = events.next();
            if mode == WhiteSpace::Normal {
                // A following space (or the end of the stream) ends a word;
                // collapse the whole space run.
                let at_space = matches!(&pending, Some(TextEvent::Char(_, ch)) if is_space(*ch));
                if at_space || pending.is_none() {
                    e.flags |= ElementFlags::WORD_END;
                    e.penalty = PenaltyType::None;
                    while matches!(&pending, Some(TextEvent::Char(_, ch)) if is_space(*ch)) {
                        pending = events.next();
                    }
                }
            } else {
                // Preserved white space: every position breaks freely,
                // newlines force a break, \r is normalized away.
                if code_point == 0xD {
                    continue;
                }
                e.penalty =
                    if code_point == 0xA { PenaltyType::ForceBreak } else { PenaltyType::None };
            }

            source_nodes.push(node);
            out.push(e);
        }
    }

    for n in source_nodes {
        nodes.get_mut(n).flags.insert(NodeFlags::HAS_PARAGRAPH_ELEMENTS);
    }
    out
}

/// Encodes a run of elements as UTF-8, optionally inserting a synthetic
/// space after each word end (except a trailing one). Inline objects are
/// skipped. Returns the string and the number of characters it contains.
pub fn encode_elements(
    elements: &[ParagraphElement],
    synthetic_spaces: bool,
) -> (String, usize) {
    let mut s = String::new();
    let mut chars = 0;
    for (i, e) in elements.iter().enumerate() {
        if e.is_inline_object() {
            continue;
        }
        s.push(char::from_u32(e.code_point).unwrap_or('\u{FFFD}'));
        chars += 1;
        if synthetic_spaces && e.is_word_end() && i + 1 != elements.len() {
            s.push(' ');
            chars += 1;
        }
    }
    (s, chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::NodeType;

    fn paragraph_with(texts: &[&str]) -> (NodeArena, NodeId) {
        let mut nodes = NodeArena::new();
        let para = nodes.create(NodeType::Paragraph);
        for t in texts {
            let child = nodes.create(NodeType::Text);
            nodes.set_text(child, t);
            nodes.append_child(para, child);
        }
        (nodes, para)
    }

    #[test]
    fn words_collapse_and_flag() {
        let (mut nodes, para) = paragraph_with(&["Hello   World "]);
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Normal, WrapMode::WordWrap);
        assert_eq!(elements.len(), 10);
        assert!(elements[4].is_word_end());
        assert_eq!(elements[4].penalty, PenaltyType::None);
        assert!(elements[9].is_word_end());
        assert!(elements[0].is_node_first());
        assert!(!elements[1].is_node_first());
        // Word-end invariant: penalty None wherever WORD_END is set.
        for e in &elements {
            if e.is_word_end() {
                assert_eq!(e.penalty, PenaltyType::None);
            }
        }
    }

    #[test]
    fn hyphen_gets_multipart_penalty() {
        let (mut nodes, para) = paragraph_with(&["re-do"]);
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Normal, WrapMode::WordWrap);
        assert_eq!(elements[2].penalty, PenaltyType::Multipart);
        assert_eq!(elements[1].penalty, PenaltyType::InterCharacter);
    }

    #[test]
    fn preserve_mode_keeps_spaces_and_forces_newlines() {
        let (mut nodes, para) = paragraph_with(&["a b\r\nc"]);
        nodes.get_mut(para).style.white_space = WhiteSpace::Preserve;
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Preserve, WrapMode::WordWrap);
        // "a", " ", "b", "\n" (\r eaten), "c"
        assert_eq!(elements.len(), 5);
        assert_eq!(elements[1].code_point, 0x20);
        assert_eq!(elements[3].penalty, PenaltyType::ForceBreak);
    }

    #[test]
    fn node_first_marks_style_boundaries() {
        let (mut nodes, para) = paragraph_with(&["ab", "cd"]);
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Normal, WrapMode::WordWrap);
        assert_eq!(elements.len(), 4);
        assert!(elements[0].is_node_first());
        assert!(elements[2].is_node_first());
        // "ab" ends a word because "cd" starts a new node without space?
        // No: no space between them, so no word end at index 1.
        assert!(!elements[1].is_word_end());
    }

    #[test]
    fn encode_synthetic_spaces() {
        let (mut nodes, para) = paragraph_with(&["ab cd"]);
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Normal, WrapMode::WordWrap);
        let (with, n_with) = encode_elements(&elements, true);
        let (without, n_without) = encode_elements(&elements, false);
        assert_eq!(with, "ab cd");
        assert_eq!(n_with, 5);
        assert_eq!(without, "abcd");
        assert_eq!(n_without, 4);
    }
}
