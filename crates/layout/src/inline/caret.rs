//! Caret addresses and text selection.
//!
//! A caret address names a position in the document: a node plus an offset.
//! Addresses are canonicalized so that positions inside an inline container
//! subtree always name the container itself, with the offset being a
//! paragraph element index or the sentinel [`CARET_END`].

use dom::{NodeArena, NodeId};
use platform::Backend;
use style::{Axis, LayoutClass};

use crate::LayoutTree;
use crate::box_tree::BoxId;
use crate::flags::BoxFlags;
use crate::inline::context::{ElementFlags, InlineContext, encode_elements};
use crate::inline::synthesis::update_box_text_layer;
use crate::inline::{inline_first_nonempty, inline_next_nonempty};
use crate::layers::LayerContent;

/// Offset meaning "after the last element / at the end of the node".
pub const CARET_END: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaretAddress {
    pub node: NodeId,
    pub offset: usize,
}

/// Which end of a node an interior address collapses to when clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteMode {
    TiesToStart,
    TiesToEnd,
    TiesToCloser,
}

/// First node at or above `node` that establishes a layout of its own
/// (anything that is not plain inline text).
pub fn find_layout_node(nodes: &NodeArena, mut node: NodeId) -> NodeId {
    while nodes.get(node).layout == LayoutClass::Inline {
        match nodes.get(node).parent {
            Some(p) => node = p,
            None => break,
        }
    }
    node
}

fn num_elements(lt: &LayoutTree, node: NodeId) -> usize {
    lt.inline_context(node).map_or(0, |icx| icx.elements.len())
}

/// Converts `CARET_END` into a concrete element index.
pub fn expand_internal_address(
    nodes: &NodeArena,
    lt: &LayoutTree,
    node: NodeId,
    ia: usize,
) -> usize {
    if ia == CARET_END && nodes.get(node).layout == LayoutClass::InlineContainer {
        return num_elements(lt, node);
    }
    ia
}

fn same_internal_address(
    nodes: &NodeArena,
    lt: &LayoutTree,
    node: NodeId,
    a: usize,
    b: usize,
) -> bool {
    expand_internal_address(nodes, lt, node, a) == expand_internal_address(nodes, lt, node, b)
}

/// Finds the child node that generated the element at `ia` in `container`.
pub fn inline_node_at(
    nodes: &NodeArena,
    lt: &LayoutTree,
    container: NodeId,
    ia: usize,
) -> NodeId {
    let Some(icx) = lt.inline_context(container) else { return container };
    let ia = expand_internal_address(nodes, lt, container, ia).min(icx.elements.len());
    let mut child = inline_first_nonempty(nodes, container).unwrap_or(container);
    for i in 1..ia {
        if icx.elements[i].is_node_first() {
            child = inline_next_nonempty(nodes, container, child).unwrap_or(child);
        }
    }
    child
}

/// Offset of the first element generated by `child` within `container`.
fn internal_address_of(
    nodes: &NodeArena,
    lt: &LayoutTree,
    container: NodeId,
    child: NodeId,
) -> usize {
    let Some(icx) = lt.inline_context(container) else { return CARET_END };
    let mut node = match inline_first_nonempty(nodes, container) {
        Some(n) => n,
        None => return CARET_END,
    };
    let mut ia = 0;
    while node != child {
        ia += 1;
        if ia >= icx.elements.len() {
            return CARET_END;
        }
        if icx.elements[ia].is_node_first() {
            node = match inline_next_nonempty(nodes, container, node) {
                Some(n) => n,
                None => return CARET_END,
            };
        }
    }
    ia
}

/// The deepest node containing the address (for addresses canonicalized to
/// a container, the generating child).
pub fn node_at_caret(nodes: &NodeArena, lt: &LayoutTree, address: CaretAddress) -> NodeId {
    if nodes.get(address.node).layout == LayoutClass::InlineContainer {
        inline_node_at(nodes, lt, address.node, address.offset)
    } else {
        address.node
    }
}

/// True if address `a` precedes address `b` in document order.
pub fn caret_before(nodes: &NodeArena, a: CaretAddress, b: CaretAddress) -> bool {
    if a.node != b.node {
        nodes.before_in_tree_order(a.node, b.node)
    } else {
        a.offset < b.offset
    }
}

/// Rewrites an address inside an inline container's subtree in terms of the
/// container.
pub fn canonical_address(
    nodes: &NodeArena,
    lt: &LayoutTree,
    address: CaretAddress,
) -> CaretAddress {
    if let Some(container) = nodes.inline_container_above(address.node) {
        let ia = internal_address_of(nodes, lt, container, address.node);
        return CaretAddress { node: container, offset: ia };
    }
    address
}

pub fn start_address(nodes: &NodeArena, lt: &LayoutTree, node: NodeId) -> CaretAddress {
    canonical_address(nodes, lt, CaretAddress { node, offset: 0 })
}

pub fn end_address(nodes: &NodeArena, lt: &LayoutTree, node: NodeId) -> CaretAddress {
    canonical_address(nodes, lt, CaretAddress { node, offset: CARET_END })
}

/// Clamps an internal address to the start or end of its node.
fn closer_end(
    nodes: &NodeArena,
    lt: &LayoutTree,
    node: NodeId,
    ia: usize,
    mode: RewriteMode,
) -> usize {
    if nodes.get(node).layout != LayoutClass::InlineContainer {
        return ia;
    }
    let n = num_elements(lt, node);
    let after = match mode {
        RewriteMode::TiesToCloser => expand_internal_address(nodes, lt, node, ia) >= n / 2,
        _ => {
            if same_internal_address(nodes, lt, node, ia, 0) {
                false
            } else if same_internal_address(nodes, lt, node, ia, CARET_END) {
                true
            } else {
                mode == RewriteMode::TiesToEnd
            }
        }
    };
    if after { CARET_END } else { 0 }
}

/// Attempts to rewrite an address in terms of an ancestor `target`.
/// Returns `None` if `target` is not in the address' parent chain.
fn rewrite_address(
    nodes: &NodeArena,
    lt: &LayoutTree,
    target: NodeId,
    mut address: CaretAddress,
    mode: RewriteMode,
) -> Option<CaretAddress> {
    loop {
        if address.node == target {
            return Some(canonical_address(nodes, lt, address));
        }
        address.offset = closer_end(nodes, lt, address.node, address.offset, mode);
        if let Some(container) = nodes.inline_container_above(address.node) {
            let ia = internal_address_of(nodes, lt, container, address.node);
            address.offset = if address.offset == CARET_END && ia != CARET_END {
                ia + 1
            } else {
                ia
            };
            address.node = container;
        } else {
            address.node = nodes.get(address.node).parent?;
        }
    }
}

/// The internal address inside `node` closest to `address`, clamping ties
/// per `mode`.
pub fn closest_internal_address(
    nodes: &NodeArena,
    lt: &LayoutTree,
    node: NodeId,
    address: CaretAddress,
    mode: RewriteMode,
) -> usize {
    // If the address lies inside `node`'s subtree, rewriting gives the
    // exact position.
    if let Some(rewritten) = rewrite_address(nodes, lt, node, address, mode) {
        return rewritten.offset;
    }

    // If `node` lies inside the address' subtree, the answer is whichever
    // end of `node` is nearer the address.
    let a0 = rewrite_address(nodes, lt, address.node, start_address(nodes, lt, node), mode);
    let a1 = rewrite_address(nodes, lt, address.node, end_address(nodes, lt, node), mode);
    if let (Some(a0), Some(a1)) = (a0, a1) {
        let ia_a0 = expand_internal_address(nodes, lt, address.node, a0.offset);
        let ia_a1 = expand_internal_address(nodes, lt, address.node, a1.offset);
        let ia_b = expand_internal_address(nodes, lt, address.node, address.offset);
        if ia_a0 >= ia_b {
            return 0;
        }
        if ia_b >= ia_a1 {
            return CARET_END;
        }
        return closer_end(nodes, lt, node, ia_b, mode);
    }

    // Disjoint subtrees: pick an end by document order.
    if nodes.before_in_tree_order(address.node, node) { 0 } else { CARET_END }
}

/// Sets element selection bits so exactly `[start, end)` (resolved within
/// `container`) is selected.
pub fn set_selected_element_range(
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    container: NodeId,
    start: CaretAddress,
    end: CaretAddress,
) {
    let start_offset =
        closest_internal_address(nodes, lt, container, start, RewriteMode::TiesToEnd);
    let end_offset =
        closest_internal_address(nodes, lt, container, end, RewriteMode::TiesToStart);
    let start_offset = expand_internal_address(nodes, lt, container, start_offset);
    let end_offset = expand_internal_address(nodes, lt, container, end_offset);
    let Some(icx) = lt.inline_context_mut(container) else { return };
    rewrite_selection_bits(icx, start_offset, end_offset);
}

/// Clears every selection bit in a container.
pub fn clear_selected_elements(lt: &mut LayoutTree, container: NodeId) {
    if let Some(icx) = lt.inline_context_mut(container) {
        rewrite_selection_bits(icx, 0, 0);
    }
}

fn rewrite_selection_bits(icx: &mut InlineContext, start: usize, end: usize) {
    let n = icx.elements.len();
    let start = start.min(n);
    let end = end.min(n).max(start);
    for (i, e) in icx.elements.iter_mut().enumerate() {
        e.flags.set(ElementFlags::SELECTED, i >= start && i < end);
    }
}

/// Reads the first contiguous run of selected elements in a container as
/// UTF-8 with synthetic spaces at word ends.
pub fn read_selected_text(lt: &LayoutTree, container: NodeId) -> String {
    let Some(icx) = lt.inline_context(container) else { return String::new() };
    let i = icx.elements.iter().position(|e| e.is_selected());
    let Some(i) = i else { return String::new() };
    let j = icx.elements[i..]
        .iter()
        .position(|e| !e.is_selected())
        .map_or(icx.elements.len(), |p| i + p);
    encode_elements(&icx.elements[i..j], true).0
}

/// All nodes between two canonical addresses in document order, inclusive.
/// Inline containers in the result are the ones whose selection bits a
/// selection update must rewrite.
pub fn nodes_between(
    nodes: &NodeArena,
    mut a: CaretAddress,
    mut b: CaretAddress,
) -> Vec<NodeId> {
    if caret_before(nodes, b, a) {
        std::mem::swap(&mut a, &mut b);
    }
    let mut root = a.node;
    while let Some(p) = nodes.get(root).parent {
        root = p;
    }
    let mut out = Vec::new();
    let mut cur = Some(a.node);
    let mut passed_end = false;
    while let Some(n) = cur {
        out.push(n);
        if n == b.node {
            passed_end = true;
            break;
        }
        cur = nodes.next_in_subtree(root, n);
    }
    debug_assert!(passed_end || cur.is_none(), "selection endpoints in different trees");
    out
}

// ----- caret resolution ----------------------------------------------------

/// Element index within a text box's layer nearest to document-space `dx`
/// (relative to the box's left edge).
fn intercharacter_position(
    positions: &[i32],
    layer_start: usize,
    box_width: f32,
    dx: f32,
) -> usize {
    let mut best = 0;
    let mut best_d = f32::INFINITY;
    for (i, &x) in positions.iter().enumerate() {
        let d = (dx - x as f32).abs();
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    // The split after the last character competes too.
    if (dx - box_width).abs() < best_d {
        best = positions.len();
    }
    layer_start + best
}

/// Resolves a document-space x position into a caret address within the
/// positions spanned by `b`.
pub fn caret_position(
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    backend: &dyn Backend,
    b: BoxId,
    x: f32,
) -> Option<CaretAddress> {
    let owner = lt.boxes.get(b).owner?;
    let node = find_layout_node(nodes, owner);
    let dx = x - lt.boxes.get(b).axis_ref(Axis::Horizontal).pos;
    let offset = if lt.boxes.get(b).flags.contains(BoxFlags::IS_TEXT_BOX) {
        let width = lt.boxes.get_slot(b, crate::SizeSlot::Extrinsic, Axis::Horizontal);
        let layer = update_box_text_layer(nodes, lt, backend, b)?;
        let LayerContent::Text(t) = &lt.layers.get(layer).content else { return None };
        intercharacter_position(&t.x_positions, t.start, width, dx)
    } else {
        let mid = 0.5 * lt.boxes.outer_dim(b, Axis::Horizontal);
        if dx < mid { 0 } else { CARET_END }
    };
    Some(CaretAddress { node, offset })
}

/// Element range of the line containing `b`.
pub fn containing_line_range(lt: &LayoutTree, b: BoxId) -> Option<(usize, usize)> {
    let mut cur = Some(b);
    while let Some(id) = cur {
        let bx = lt.boxes.get(id);
        if bx.flags.contains(BoxFlags::IS_LINE_BOX) {
            return Some((bx.first_element, bx.last_element));
        }
        cur = bx.parent;
    }
    // A container whose single line is its own box.
    let bx = lt.boxes.get(b);
    if bx.flags.contains(BoxFlags::IS_TEXT_BOX) {
        return Some((bx.first_element, bx.last_element));
    }
    None
}
