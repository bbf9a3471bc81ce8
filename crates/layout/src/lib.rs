//! Incremental document layout.
//!
//! The crate owns everything below the node tree: the box tree and its
//! validity flags, the spatial grid, visual layers, per-container inline
//! state, and the interruptible passes that keep them consistent
//! (dependency analysis, sizing, bounds, clip). The document driver feeds
//! it a [`dom::NodeArena`] and a platform back end; views read the results
//! through [`LayoutTree`].

pub mod box_tree;
pub mod cursor;
pub mod fixed;
pub mod flags;
pub mod geometry;
pub mod grid;
pub mod inline;
pub mod layers;
pub mod sizing;

pub use box_tree::{BoxArena, BoxId, GrowthDirection, LayoutBox, SizeSlot, depth_sort_boxes};
pub use fixed::{TEXT_METRIC_PRECISION, TextFixed};
pub use flags::{BoxFlags, LayoutFlags};
pub use geometry::Rect;
pub use grid::{ANCHOR_STEP, Grid};
pub use inline::{CARET_END, CaretAddress, InlineContext, LineList, ParagraphElement};
pub use layers::{LayerChain, LayerContent, LayerId, LayerKey, LayerStore};
pub use sizing::{Budget, LayoutState};
pub use style::Axis;

use std::collections::HashMap;

use dom::{NodeArena, NodeFlags, NodeId};
use style::{EdgeFlags, LayoutClass};

use crate::flags::axis_flag;

/// The laid-out side of a document: box tree, spatial grid, layers and
/// inline contexts, plus the node↔box side tables.
#[derive(Default)]
pub struct LayoutTree {
    pub boxes: BoxArena,
    pub grid: Grid,
    pub layers: LayerStore,
    inline: HashMap<NodeId, InlineContext>,
    primary: HashMap<NodeId, BoxId>,
    node_layer_heads: HashMap<NodeId, Option<LayerId>>,
}

impl LayoutTree {
    pub fn new() -> LayoutTree {
        LayoutTree::default()
    }

    // ----- node ↔ box -------------------------------------------------------

    pub fn primary_box(&self, node: NodeId) -> Option<BoxId> {
        self.primary.get(&node).copied()
    }

    pub fn set_primary_box(&mut self, node: NodeId, b: BoxId) {
        self.primary.insert(node, b);
    }

    /// True if `b` is the primary box of its owner node.
    pub fn is_main_box(&self, b: BoxId) -> bool {
        match self.boxes.get(b).owner {
            Some(owner) => self.primary_box(owner) == Some(b),
            None => false,
        }
    }

    // ----- inline contexts --------------------------------------------------

    pub fn inline_context(&self, node: NodeId) -> Option<&InlineContext> {
        self.inline.get(&node)
    }

    pub fn inline_context_mut(&mut self, node: NodeId) -> Option<&mut InlineContext> {
        self.inline.get_mut(&node)
    }

    /// Rebuilds a container's paragraph elements from its subtree and marks
    /// everything that depended on the old elements stale.
    pub fn rebuild_inline_context(&mut self, nodes: &mut NodeArena, container: NodeId) {
        let style = nodes.get(container).style.clone();
        let elements = inline::context::build_paragraph_elements(
            nodes,
            container,
            style.white_space,
            style.wrap,
        );
        self.inline.insert(container, InlineContext { elements, lines: None });

        let flags = &mut nodes.get_mut(container).flags;
        flags.remove(NodeFlags::RECONSTRUCT_PARAGRAPH);
        flags.insert(NodeFlags::REMEASURE_ELEMENTS);

        if let Some(b) = self.primary_box(container) {
            self.boxes.get_mut(b).flags.remove(BoxFlags::SAME_PARAGRAPH);
            // New elements mean new advances: every derived size of the
            // container is stale, not just the breakpoints.
            self.boxes.clear_flags(
                b,
                LayoutFlags::TEXT_VALID
                    | LayoutFlags::INLINE_BOXES_VALID
                    | LayoutFlags::all_valid(Axis::Horizontal)
                    | LayoutFlags::all_valid(Axis::Vertical),
            );
        }
    }

    pub fn destroy_inline_context(&mut self, container: NodeId) {
        if self.inline.remove(&container).is_none() {
            return;
        }
        // Line boxes and their text boxes die with the context; inline
        // object boxes are orphaned, their nodes own them.
        if let Some(cb) = self.primary_box(container) {
            let mut line = self.boxes.get(cb).first_child;
            while let Some(lb) = line {
                line = self.boxes.get(lb).next_sibling;
                let mut child = self.boxes.get(lb).first_child;
                while let Some(c) = child {
                    child = self.boxes.get(c).next_sibling;
                    self.boxes.remove_from_parent(c);
                    if self.boxes.get(c).flags.contains(BoxFlags::IS_TEXT_BOX) {
                        self.destroy_box(c);
                    }
                }
                self.destroy_box(lb);
            }
        }
    }

    // ----- layer chains -----------------------------------------------------

    pub fn node_layer_head(&self, node: NodeId) -> Option<LayerId> {
        self.node_layer_heads.get(&node).copied().flatten()
    }

    /// Replaces the layer with `key` on a node's authoritative chain.
    pub fn replace_node_layer(
        &mut self,
        node: NodeId,
        key: LayerKey,
        layer: Option<LayerId>,
    ) -> Option<LayerId> {
        let mut head = self.node_layer_head(node);
        let removed = self.layers.chain_replace(LayerChain::Node, &mut head, key, layer);
        self.node_layer_heads.insert(node, head);
        removed
    }

    /// Replaces the layer with `key` on a box's render chain.
    pub fn replace_box_layer(
        &mut self,
        b: BoxId,
        key: LayerKey,
        layer: Option<LayerId>,
    ) -> Option<LayerId> {
        let mut head = self.boxes.get(b).layers;
        let removed = self.layers.chain_replace(LayerChain::Box, &mut head, key, layer);
        self.boxes.get_mut(b).layers = head;
        removed
    }

    // ----- grid -------------------------------------------------------------

    pub fn grid_insert(&mut self, b: BoxId) {
        self.grid.insert(&mut self.boxes, b);
    }

    pub fn grid_remove(&mut self, b: BoxId) {
        self.grid.remove(&mut self.boxes, b);
    }

    // ----- destruction ------------------------------------------------------

    /// Destroys one box: unlinks it from its parent, the grid and its layer
    /// chain, and releases the arena slot. Children are not touched.
    pub fn destroy_box(&mut self, b: BoxId) {
        debug_assert!(self.boxes.get(b).first_child.is_none(), "children must be handled first");
        self.boxes.remove_from_parent(b);
        self.grid.remove(&mut self.boxes, b);
        let mut head = self.boxes.get(b).layers;
        self.layers.release_chain(LayerChain::Box, &mut head);
        self.boxes.get_mut(b).layers = None;
        if let Some(owner) = self.boxes.get(b).owner {
            if self.primary.get(&owner) == Some(&b) {
                self.primary.remove(&owner);
            }
        }
        self.boxes.release(b);
    }

    /// Destroys a box and its whole subtree.
    pub fn destroy_box_subtree(&mut self, root: BoxId) {
        let mut stack = vec![root];
        let mut order = Vec::new();
        while let Some(b) = stack.pop() {
            order.push(b);
            let mut child = self.boxes.get(b).first_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.boxes.get(c).next_sibling;
            }
        }
        // Leaves first so destroy_box's no-children invariant holds.
        for b in order.into_iter().rev() {
            let mut child = self.boxes.get(b).first_child;
            while let Some(c) = child {
                let next = self.boxes.get(c).next_sibling;
                self.boxes.remove_from_parent(c);
                child = next;
            }
            self.destroy_box(b);
        }
    }

    /// Drops all per-node layout state when a node is destroyed.
    pub fn remove_node_state(&mut self, node: NodeId) {
        self.destroy_inline_context(node);
        if let Some(b) = self.primary.remove(&node) {
            self.destroy_box_subtree(b);
        }
        if let Some(mut head) = self.node_layer_heads.remove(&node) {
            self.layers.release_chain(LayerChain::Node, &mut head);
        }
    }
}

/// Creates or reconfigures a node's primary box from its declared style.
/// Inline text leaves get no primary box; everything else does.
pub fn configure_box(lt: &mut LayoutTree, nodes: &mut NodeArena, node: NodeId) -> Option<BoxId> {
    let layout = nodes.get(node).layout;
    if layout == LayoutClass::Inline || layout == LayoutClass::None {
        return None;
    }

    let b = match lt.primary_box(node) {
        Some(b) => b,
        None => {
            let b = lt.boxes.create(Some(node));
            lt.set_primary_box(node, b);
            b
        }
    };

    let bs = nodes.get(node).box_style;
    {
        let bx = lt.boxes.get_mut(b);
        bx.axis = bs.axis;
        bx.arrangement = bs.arrangement;
        bx.alignment = bs.alignment;
        bx.growth[GrowthDirection::Grow as usize] = bs.grow;
        bx.growth[GrowthDirection::Shrink as usize] = bs.shrink;
        bx.clip_box = bs.clip_box;
        bx.depth_interval = bs.depth_interval;
        bx.flags.set(BoxFlags::CLIP_LEFT, bs.clip_edges.contains(EdgeFlags::LEFT));
        bx.flags.set(BoxFlags::CLIP_RIGHT, bs.clip_edges.contains(EdgeFlags::RIGHT));
        bx.flags.set(BoxFlags::CLIP_TOP, bs.clip_edges.contains(EdgeFlags::TOP));
        bx.flags.set(BoxFlags::CLIP_BOTTOM, bs.clip_edges.contains(EdgeFlags::BOTTOM));
        bx.flags
            .set(BoxFlags::IS_INLINE_CONTAINER, layout == LayoutClass::InlineContainer);
        bx.flags.set(
            BoxFlags::HIT_TEST,
            nodes.get(node).flags.contains(NodeFlags::HIT_TEST),
        );
        bx.flags.set(
            BoxFlags::SELECTION_ANCHOR,
            nodes.get(node).flags.contains(NodeFlags::SELECTION_ANCHOR),
        );
        for axis in Axis::BOTH {
            let a = &bs.axes[axis.index()];
            let ax = bx.axis_mut(axis);
            ax.min = a.min;
            ax.max = a.max;
            ax.pad_lower = a.pad_lower;
            ax.pad_upper = a.pad_upper;
            ax.margin_lower = a.margin_lower;
            ax.margin_upper = a.margin_upper;
        }
    }
    // The dependency analysis pass must revisit this subtree; the clear
    // propagates so ancestors stop skipping it.
    lt.boxes.clear_flags(b, LayoutFlags::LAYOUT_INFO_VALID);

    for axis in Axis::BOTH {
        let a = bs.axes[axis.index()];
        lt.boxes.set_ideal_size(b, axis, a.mode, a.dim);
    }

    // Keep the box tree linkage mirroring the node tree for non-inline
    // parents.
    let parent_box = nodes
        .get(node)
        .parent
        .filter(|&p| nodes.get(p).layout != LayoutClass::InlineContainer)
        .and_then(|p| lt.primary_box(p));
    if let Some(pb) = parent_box {
        if lt.boxes.get(b).parent != Some(pb) {
            // Insert keeping document order: before the first following
            // sibling that already has a box under the same parent.
            let mut before = None;
            let mut sib = nodes.get(node).next_sibling;
            while let Some(s) = sib {
                if let Some(sb) = lt.primary_box(s) {
                    if lt.boxes.get(sb).parent == Some(pb) {
                        before = Some(sb);
                        break;
                    }
                }
                sib = nodes.get(s).next_sibling;
            }
            lt.boxes.insert_child_before(pb, b, before);
            lt.boxes.clear_flags(
                b,
                axis_flag(LayoutFlags::EXTRINSIC_VALID_H, Axis::Horizontal)
                    | axis_flag(LayoutFlags::EXTRINSIC_VALID_H, Axis::Vertical),
            );
        }
    }

    nodes.get_mut(node).flags.remove(NodeFlags::BOX_STYLE_DIRTY);
    Some(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::NodeType;

    #[test]
    fn configure_creates_and_links_boxes() {
        let mut nodes = NodeArena::new();
        let mut lt = LayoutTree::new();
        let root = nodes.create(NodeType::Vbox);
        let a = nodes.create(NodeType::Basic);
        let b = nodes.create(NodeType::Basic);
        nodes.append_child(root, a);
        nodes.append_child(root, b);

        let rb = configure_box(&mut lt, &mut nodes, root).unwrap();
        let ab = configure_box(&mut lt, &mut nodes, a).unwrap();
        let bb = configure_box(&mut lt, &mut nodes, b).unwrap();
        assert_eq!(lt.boxes.get(ab).parent, Some(rb));
        assert_eq!(lt.boxes.get(bb).parent, Some(rb));
        assert_eq!(lt.boxes.children(rb).collect::<Vec<_>>(), vec![ab, bb]);
        assert!(lt.is_main_box(rb));
    }

    #[test]
    fn text_leaves_get_no_primary_box() {
        let mut nodes = NodeArena::new();
        let mut lt = LayoutTree::new();
        let t = nodes.create(NodeType::Text);
        assert!(configure_box(&mut lt, &mut nodes, t).is_none());
    }

    #[test]
    fn remove_node_state_releases_everything() {
        let mut nodes = NodeArena::new();
        let mut lt = LayoutTree::new();
        let p = nodes.create(NodeType::Paragraph);
        let t = nodes.create(NodeType::Text);
        nodes.set_text(t, "hi");
        nodes.append_child(p, t);
        configure_box(&mut lt, &mut nodes, p).unwrap();
        lt.rebuild_inline_context(&mut nodes, p);
        assert!(lt.inline_context(p).is_some());

        lt.remove_node_state(p);
        assert!(lt.inline_context(p).is_none());
        assert!(lt.primary_box(p).is_none());
        assert!(lt.boxes.is_empty());
    }
}
