//! Grouped iteration over paragraph elements.
//!
//! Three groupings share one iterator:
//! - *measurement groups*: maximal runs measurable with one back-end call
//!   (same font), pausing at inline objects so their advances can be taken
//!   from their boxes;
//! - *placement groups*: maximal runs positioned by one text box (same text
//!   style, no inline objects, never crossing a line end);
//! - *fragments*: runs within one box sharing a draw style and selection
//!   state.
//!
//! The iterator tracks the child node generating the current group through
//! the `NODE_FIRST` element bits, so style lookups never rescan the tree.

use dom::{NodeArena, NodeId};

use crate::inline::context::{InlineContext, ParagraphElement, ParagraphLine};
use crate::inline::{inline_first_nonempty, inline_next_nonempty};
use style::TextStyle;

#[derive(Clone)]
pub struct ParagraphIterator {
    pub container: NodeId,
    /// First element of the current group.
    pub offset: usize,
    /// Number of elements in the current group.
    pub count: usize,
    /// Iteration limit.
    pub end: usize,
    /// End of the current line (placement groups never cross it).
    pub eol: usize,
    /// UTF-8 byte range of the current group within the encoded stream.
    pub text_start: usize,
    pub text_end: usize,
    /// Node that generated the current group.
    pub child: Option<NodeId>,
    /// Node that will generate the next group.
    pub next_child: Option<NodeId>,
}

fn utf8_len(e: &ParagraphElement) -> usize {
    if e.is_inline_object() {
        return 0;
    }
    char::from_u32(e.code_point).map_or(3, char::len_utf8)
}

impl ParagraphIterator {
    pub fn init(
        nodes: &NodeArena,
        container: NodeId,
        child: Option<NodeId>,
        offset: usize,
        end: usize,
    ) -> ParagraphIterator {
        let _ = nodes;
        ParagraphIterator {
            container,
            offset,
            count: 0,
            end,
            eol: end,
            text_start: 0,
            text_end: 0,
            child,
            next_child: child,
        }
    }

    /// Starts iteration over every element of a container.
    pub fn over_container(
        nodes: &NodeArena,
        icx: &InlineContext,
        container: NodeId,
    ) -> ParagraphIterator {
        let first = inline_first_nonempty(nodes, container);
        ParagraphIterator::init(nodes, container, first, 0, icx.elements.len())
    }

    /// Starts iteration over a box's element range, whose generating node
    /// the caller already knows.
    pub fn over_range(
        nodes: &NodeArena,
        container: NodeId,
        child: Option<NodeId>,
        first_element: usize,
        last_element: usize,
    ) -> ParagraphIterator {
        ParagraphIterator::init(nodes, container, child, first_element, last_element)
    }

    pub fn style(&self, nodes: &NodeArena) -> TextStyle {
        match self.child {
            Some(c) => nodes.get(c).style.text,
            None => TextStyle::default(),
        }
    }

    pub fn next_style(&self, nodes: &NodeArena) -> TextStyle {
        match self.next_child {
            Some(c) => nodes.get(c).style.text,
            None => TextStyle::default(),
        }
    }

    fn advance_child(&mut self, nodes: &NodeArena) {
        if let Some(nc) = self.next_child {
            self.next_child = inline_next_nonempty(nodes, self.container, nc);
        }
    }

    /// True if the next child is a text node whose style is incompatible
    /// with the current group under `compatible`. Objects (no owned text)
    /// never split groups on style.
    fn next_breaks_style(
        &self,
        nodes: &NodeArena,
        compatible: fn(&TextStyle, &TextStyle) -> bool,
    ) -> bool {
        match self.next_child {
            Some(nc) => {
                !nodes.get(nc).text.is_empty()
                    && !compatible(&self.style(nodes), &nodes.get(nc).style.text)
            }
            None => false,
        }
    }

    /// Moves to the first element after the current group. Returns false at
    /// the iteration limit.
    fn begin_group(&mut self, icx: &InlineContext) -> bool {
        self.offset += self.count;
        self.child = self.next_child;
        self.text_start = self.text_end;
        self.count = 0;
        if self.offset == self.end {
            return false;
        }
        self.count = 1;
        self.text_end += utf8_len(&icx.elements[self.offset]);
        true
    }

    /// Expands the group up to (not including) the next node's first
    /// element. Returns false if the group ends at the iteration limit.
    fn expand_to_style_boundary(&mut self, nodes: &NodeArena, icx: &InlineContext) -> bool {
        while self.offset + self.count != self.end {
            if icx.elements[self.offset + self.count].is_node_first() {
                self.advance_child(nodes);
                return true;
            }
            self.text_end += utf8_len(&icx.elements[self.offset + self.count]);
            self.count += 1;
        }
        false
    }

    /// Expands to the next placement boundary: a style boundary or the end
    /// of the line, whichever comes first. Returns true if the group could
    /// absorb the boundary element (same-style text on the same line).
    fn expand_to_placement_boundary(&mut self, nodes: &NodeArena, icx: &InlineContext) -> bool {
        while self.offset + self.count != self.end {
            let e = icx.elements[self.offset + self.count];
            if e.is_node_first() {
                self.advance_child(nodes);
            }
            // When stopping at EOL the node-first advance above must still
            // have happened, so the next line starts with the right child.
            if self.offset + self.count == self.eol {
                break;
            }
            if e.is_node_first() {
                let prev = icx.elements[self.offset + self.count - 1];
                return !(e.is_inline_object() || prev.is_inline_object());
            }
            self.count += 1;
        }
        false
    }

    // ----- measurement groups ---------------------------------------------

    /// Advances to the next measurement group. Returns the index of an
    /// inline object encountered inside it, which the caller must resolve
    /// (copy the object's width in) before calling `expand_measurement_group`
    /// again; `None` means the group is complete.
    pub fn next_measurement_group(
        &mut self,
        nodes: &NodeArena,
        icx: &InlineContext,
    ) -> Option<usize> {
        if !self.begin_group(icx) {
            return None;
        }
        if icx.elements[self.offset].is_inline_object() {
            return Some(self.offset);
        }
        self.expand_measurement_group(nodes, icx)
    }

    pub fn expand_measurement_group(
        &mut self,
        nodes: &NodeArena,
        icx: &InlineContext,
    ) -> Option<usize> {
        while self.expand_to_style_boundary(nodes, icx) {
            if self.next_breaks_style(nodes, TextStyle::measurement_compatible) {
                break;
            }
            let index = self.offset + self.count;
            let e = icx.elements[index];
            self.text_end += utf8_len(&e);
            self.count += 1;
            if e.is_inline_object() {
                return Some(index);
            }
        }
        None
    }

    /// True if there are elements left to visit.
    pub fn in_progress(&self) -> bool {
        self.count != 0
    }

    // ----- placement groups -----------------------------------------------

    /// Advances to the next placement group; returns its length (0 at the
    /// limit).
    pub fn next_placement_group(&mut self, nodes: &NodeArena, icx: &InlineContext) -> usize {
        if !self.begin_group(icx) {
            return 0;
        }
        while self.expand_to_placement_boundary(nodes, icx) {
            if self.next_breaks_style(nodes, TextStyle::measurement_compatible) {
                break;
            }
            self.text_end += utf8_len(&icx.elements[self.offset + self.count]);
            self.count += 1;
        }
        self.count
    }

    /// Moves to the first placement group of `line`, scanning forward from
    /// the current position to keep the child node in sync.
    ///
    /// The iterator maintains `next_child == node of the element at
    /// `offset + count`, with that element's `NODE_FIRST` already
    /// accounted. Moving the position from `p` to `line.a` therefore
    /// advances once per node-first element in `(p, line.a]`.
    pub fn seek_line(
        &mut self,
        nodes: &NodeArena,
        icx: &InlineContext,
        line: &ParagraphLine,
    ) -> usize {
        self.offset += self.count;
        self.count = 0;
        debug_assert!(self.offset <= line.a);
        let p = self.offset;
        for o in (p + 1)..=line.a {
            if o < icx.elements.len() && icx.elements[o].is_node_first() {
                self.advance_child(nodes);
            }
        }
        self.offset = line.a;
        self.eol = line.b;
        self.next_placement_group(nodes, icx)
    }

    /// True if the current placement group is the last on its line.
    pub fn at_eol(&self) -> bool {
        self.offset + self.count == self.eol
    }

    // ----- fragments -------------------------------------------------------

    /// Advances to the next draw fragment: a run with one draw style and
    /// one selection state. Returns its length.
    pub fn next_fragment(&mut self, nodes: &NodeArena, icx: &InlineContext) -> usize {
        if !self.begin_group(icx) {
            return 0;
        }
        let in_selection = icx.elements[self.offset].is_selected();
        while self.offset + self.count != self.end {
            let e = icx.elements[self.offset + self.count];
            if e.is_node_first() {
                self.advance_child(nodes);
                if !self.style(nodes).fragment_compatible(&self.next_style(nodes)) {
                    break;
                }
                // The boundary element now belongs to the next child.
                self.child = self.next_child;
            }
            if e.is_selected() != in_selection {
                break;
            }
            self.text_end += utf8_len(&e);
            self.count += 1;
        }
        self.count
    }

    /// Selection state of the current fragment.
    pub fn fragment_selected(&self, icx: &InlineContext) -> bool {
        self.offset < icx.elements.len() && icx.elements[self.offset].is_selected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::context::build_paragraph_elements;
    use dom::NodeType;
    use style::values::Color;
    use style::{WhiteSpace, WrapMode};

    fn setup(texts: &[&str]) -> (NodeArena, NodeId, InlineContext) {
        let mut nodes = NodeArena::new();
        let para = nodes.create(NodeType::Paragraph);
        for t in texts {
            let child = nodes.create(NodeType::Text);
            nodes.set_text(child, t);
            nodes.append_child(para, child);
        }
        let elements =
            build_paragraph_elements(&mut nodes, para, WhiteSpace::Normal, WrapMode::WordWrap);
        (nodes, para, InlineContext { elements, lines: None })
    }

    #[test]
    fn one_measurement_group_for_same_font() {
        let (nodes, para, icx) = setup(&["ab", "cd ef"]);
        let mut ei = ParagraphIterator::over_container(&nodes, &icx, para);
        assert_eq!(ei.next_measurement_group(&nodes, &icx), None);
        assert_eq!((ei.offset, ei.count), (0, 7));
        assert!(!{
            let mut e2 = ei.clone();
            e2.begin_group(&icx)
        });
    }

    #[test]
    fn colour_change_does_not_split_measurement_but_splits_fragments() {
        let (mut nodes, para, icx) = setup(&["ab", "cd"]);
        let second = nodes.children(para).nth(1).unwrap();
        nodes.get_mut(second).style.text.color = Color::rgb(200, 0, 0);

        let mut ei = ParagraphIterator::over_container(&nodes, &icx, para);
        assert_eq!(ei.next_measurement_group(&nodes, &icx), None);
        assert_eq!(ei.count, 4);

        let mut fi = ParagraphIterator::over_container(&nodes, &icx, para);
        assert_eq!(fi.next_fragment(&nodes, &icx), 2);
        assert_eq!(fi.next_fragment(&nodes, &icx), 2);
        assert_eq!(fi.next_fragment(&nodes, &icx), 0);
    }

    #[test]
    fn placement_groups_stop_at_eol() {
        let (nodes, para, icx) = setup(&["aa bb"]);
        let line = ParagraphLine { a: 0, b: 2, ..Default::default() };
        let mut ei = ParagraphIterator::over_container(&nodes, &icx, para);
        let n = ei.seek_line(&nodes, &icx, &line);
        assert_eq!(n, 2);
        assert!(ei.at_eol());
    }

    #[test]
    fn text_byte_ranges_accumulate() {
        let (nodes, para, icx) = setup(&["héllo"]);
        let mut ei = ParagraphIterator::over_container(&nodes, &icx, para);
        ei.next_fragment(&nodes, &icx);
        // h(1) é(2) l l o -> 6 bytes.
        assert_eq!(ei.text_start, 0);
        assert_eq!(ei.text_end, 6);
    }
}
