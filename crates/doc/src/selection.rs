//! Mouse-driven text selection.
//!
//! While the left button is held, both selection ends are re-resolved from
//! the down point and the current point: an anchor query walks vertical
//! slices of the grid towards the other end, the winning anchor box is
//! turned into a caret address, and every inline container between the two
//! canonical addresses has its element selection bits rewritten with the
//! closer-end clamping rules.

use dom::{NodeArena, NodeId};
use layout::inline::caret::{
    self, CaretAddress, RewriteMode, clear_selected_elements, set_selected_element_range,
};
use layout::{ANCHOR_STEP, BoxId, LayoutTree};
use platform::Backend;
use style::LayoutClass;

/// Vertical band around an anchor inside which the x position picks a
/// caret; outside it the selection extends to the line ends.
const LINE_HIT_MARGIN: f32 = 128.0;

#[derive(Default)]
pub struct SelectionState {
    pub selecting: bool,
    pub down: (f32, f32),
    pub start: Option<CaretAddress>,
    pub end: Option<CaretAddress>,
    /// Containers whose selection bits are currently set.
    pub chain: Vec<NodeId>,
}

impl SelectionState {
    pub fn clear(&mut self, lt: &mut LayoutTree) {
        for &n in &self.chain {
            clear_selected_elements(lt, n);
        }
        self.chain.clear();
        self.start = None;
        self.end = None;
    }

    pub fn forget_node(&mut self, node: NodeId) {
        self.chain.retain(|&n| n != node);
        if self.start.map(|a| a.node) == Some(node) {
            self.start = None;
        }
        if self.end.map(|a| a.node) == Some(node) {
            self.end = None;
        }
    }

    /// Re-applies the selection bits after a layout; element arrays may
    /// have been rebuilt, which loses their selection bits.
    pub fn refresh(&mut self, nodes: &NodeArena, lt: &mut LayoutTree) {
        let (Some(start), Some(end)) = (self.start, self.end) else { return };
        apply_selection(self, nodes, lt, start, end);
    }

    /// Selected text across the chain, containers in document order.
    pub fn read_text(&self, nodes: &NodeArena, lt: &LayoutTree) -> String {
        let mut out = String::new();
        for &n in &self.chain {
            if nodes.get(n).layout == LayoutClass::InlineContainer {
                let piece = caret::read_selected_text(lt, n);
                if !piece.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&piece);
                }
            }
        }
        out
    }
}

/// Converts an anchor box and a mouse position into a caret address. When
/// `y` is outside the vertical band around the anchor, the whole line end
/// nearer the pointer is used instead of an x split.
fn resolve_selection_anchor(
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    backend: &dyn Backend,
    anchor: BoxId,
    x: f32,
    y: f32,
) -> Option<CaretAddress> {
    let owner = lt.boxes.get(anchor).owner?;
    let node = caret::find_layout_node(nodes, owner);
    let r = lt.boxes.outer_rectangle(anchor);
    if nodes.get(node).layout == LayoutClass::InlineContainer
        && (y < r.y0 - LINE_HIT_MARGIN || y > r.y1 + LINE_HIT_MARGIN)
    {
        let (line_start, line_end) = caret::containing_line_range(lt, anchor)?;
        let selecting_from_above = y <= r.y1;
        let offset = if selecting_from_above { line_start } else { line_end };
        return Some(CaretAddress { node, offset });
    }
    caret::caret_position(nodes, lt, backend, anchor, x)
}

/// Rewrites the selection bits of every container between two canonical
/// addresses, and records the new chain.
fn apply_selection(
    state: &mut SelectionState,
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    start: CaretAddress,
    end: CaretAddress,
) {
    // Clear containers the new selection no longer touches.
    let between = caret::nodes_between(nodes, start, end);
    for &old in &state.chain {
        if !between.contains(&old) {
            clear_selected_elements(lt, old);
        }
    }
    for &n in &between {
        if nodes.get(n).layout == LayoutClass::InlineContainer {
            set_selected_element_range(nodes, lt, n, start, end);
        }
    }
    state.chain = between;
}

/// Recomputes both selection ends from the down point and the current
/// point. Returns true if the selection changed.
pub fn update_mouse_selection(
    state: &mut SelectionState,
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    backend: &dyn Backend,
    root_box: BoxId,
    (x0, y0): (f32, f32),
    (x1, y1): (f32, f32),
) -> bool {
    let doc = lt.boxes.outer_rectangle(root_box);
    let (mut band_y0, mut band_y1) = (doc.y0, doc.y1);
    if y1 < y0 {
        std::mem::swap(&mut band_y0, &mut band_y1);
    }

    let start_box =
        lt.grid.query_anchor(&lt.boxes, root_box, x0, doc.x0, doc.x1, y0, band_y1, ANCHOR_STEP);
    let end_box =
        lt.grid.query_anchor(&lt.boxes, root_box, x1, doc.x0, doc.x1, y1, band_y0, ANCHOR_STEP);

    let (Some(start_box), Some(end_box)) = (start_box, end_box) else {
        let had = state.start.is_some();
        state.clear(lt);
        return had;
    };

    let start = resolve_selection_anchor(nodes, lt, backend, start_box, x0, y0);
    let end = resolve_selection_anchor(nodes, lt, backend, end_box, x1, y1);
    let (Some(start), Some(end)) = (start, end) else {
        let had = state.start.is_some();
        state.clear(lt);
        return had;
    };

    let start = caret::canonical_address(nodes, lt, start);
    let end = caret::canonical_address(nodes, lt, end);
    if state.start == Some(start) && state.end == Some(end) {
        return false;
    }
    state.start = Some(start);
    state.end = Some(end);
    apply_selection(state, nodes, lt, start, end);
    true
}
