//! Interruptible traversal over the box tree.
//!
//! Two modes share one cursor. `BoxOnly` walks box links directly (bounds
//! and clip passes, which must visit line and text boxes). `Hybrid` is the
//! sizing view: at an inline container box it swaps to the owner node's
//! inline subtree and visits only the boxes of inline objects found there —
//! line and text boxes are the synthesis pass's responsibility, but object
//! boxes must be sized before text measurement reads their widths.
//!
//! The cursor state is plain data (current box, visit flags, a frame stack
//! of sibling sources), so a suspended pass freezes on the heap and resumes
//! exactly where it stopped.

use dom::{NodeArena, NodeId};
use style::LayoutClass;

use crate::LayoutTree;
use crate::box_tree::BoxId;
use crate::flags::BoxFlags;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Visit: u8 {
        /// First arrival, walking downwards.
        const PREORDER = 1 << 0;
        /// Leaving, walking upwards. Leaves arrive with both bits.
        const POSTORDER = 1 << 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorMode {
    BoxOnly,
    Hybrid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Skip the current subtree.
    Over,
    /// Normal depth-first order.
    Into,
}

/// How the current box's siblings are enumerated.
#[derive(Clone)]
enum LevelKind {
    /// Through box sibling links.
    Boxes,
    /// Through a pre-collected list of inline object boxes.
    Objects { list: Vec<BoxId>, index: usize },
}

#[derive(Clone)]
struct Level {
    /// The box this level was entered from; stepping up returns here.
    parent: BoxId,
    kind: LevelKind,
}

pub struct BoxCursor {
    mode: CursorMode,
    root: BoxId,
    levels: Vec<Level>,
    pub current: Option<BoxId>,
    pub visit: Visit,
}

/// Collects the boxes of the inline objects in a container's subtree, in
/// document order, without descending into the objects themselves.
fn collect_inline_object_boxes(
    nodes: &NodeArena,
    lt: &LayoutTree,
    container: NodeId,
) -> Vec<BoxId> {
    let mut out = Vec::new();
    let mut cur = crate::inline::inline_next(nodes, container, container);
    while let Some(n) = cur {
        if crate::inline::is_inline_object(nodes, container, n) {
            if let Some(b) = lt.primary_box(n) {
                out.push(b);
            }
        }
        cur = crate::inline::inline_next(nodes, container, n);
    }
    out
}

impl BoxCursor {
    pub fn begin(nodes: &NodeArena, lt: &LayoutTree, root: BoxId, mode: CursorMode) -> BoxCursor {
        let mut c = BoxCursor { mode, root, levels: Vec::new(), current: Some(root), visit: Visit::empty() };
        c.visit = c.arrival_visit(nodes, lt, root);
        c
    }

    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    fn is_hybrid_container(&self, lt: &LayoutTree, b: BoxId) -> bool {
        self.mode == CursorMode::Hybrid
            && lt.boxes.get(b).flags.contains(BoxFlags::IS_INLINE_CONTAINER)
            && lt.is_main_box(b)
    }

    fn first_child_level(&self, nodes: &NodeArena, lt: &LayoutTree, b: BoxId) -> Option<(Level, BoxId)> {
        if self.is_hybrid_container(lt, b) {
            let owner = lt.boxes.get(b).owner?;
            let list = collect_inline_object_boxes(nodes, lt, owner);
            let first = *list.first()?;
            return Some((Level { parent: b, kind: LevelKind::Objects { list, index: 0 } }, first));
        }
        let first = lt.boxes.get(b).first_child?;
        Some((Level { parent: b, kind: LevelKind::Boxes }, first))
    }

    fn has_children(&self, nodes: &NodeArena, lt: &LayoutTree, b: BoxId) -> bool {
        if self.is_hybrid_container(lt, b) {
            match lt.boxes.get(b).owner {
                Some(owner) => {
                    // Any inline object below the container?
                    let mut cur = crate::inline::inline_next(nodes, owner, owner);
                    while let Some(n) = cur {
                        if crate::inline::is_inline_object(nodes, owner, n)
                            && lt.primary_box(n).is_some()
                        {
                            return true;
                        }
                        cur = crate::inline::inline_next(nodes, owner, n);
                    }
                    false
                }
                None => false,
            }
        } else {
            lt.boxes.get(b).first_child.is_some()
        }
    }

    fn arrival_visit(&self, nodes: &NodeArena, lt: &LayoutTree, b: BoxId) -> Visit {
        if self.has_children(nodes, lt, b) {
            Visit::PREORDER
        } else {
            Visit::PREORDER | Visit::POSTORDER
        }
    }

    fn next_sibling(&mut self, lt: &LayoutTree, b: BoxId) -> Option<BoxId> {
        match self.levels.last_mut().map(|l| &mut l.kind) {
            Some(LevelKind::Boxes) | None => lt.boxes.get(b).next_sibling,
            Some(LevelKind::Objects { list, index }) => {
                *index += 1;
                list.get(*index).copied()
            }
        }
    }

    /// Resets visit flags as if the current box had just been reached while
    /// walking downwards (used to re-run a subtree in place).
    pub fn revisit_current(&mut self, nodes: &NodeArena, lt: &LayoutTree) {
        if let Some(b) = self.current {
            self.visit = self.arrival_visit(nodes, lt, b);
        }
    }

    /// Advances one step. Returns the new visit flags; `Visit::empty()`
    /// means the traversal ended.
    pub fn step(&mut self, nodes: &NodeArena, lt: &LayoutTree, kind: StepKind) -> Visit {
        let Some(b) = self.current else {
            self.visit = Visit::empty();
            return self.visit;
        };

        // Walking down.
        if kind == StepKind::Into
            && self.visit.contains(Visit::PREORDER)
            && !self.visit.contains(Visit::POSTORDER)
        {
            if let Some((level, first)) = self.first_child_level(nodes, lt, b) {
                self.levels.push(level);
                self.current = Some(first);
                self.visit = self.arrival_visit(nodes, lt, first);
                return self.visit;
            }
            // No children after all: leave the box.
            self.visit = Visit::POSTORDER;
            return self.visit;
        }

        // Walking right or up.
        if b == self.root {
            self.current = None;
            self.visit = Visit::empty();
            return self.visit;
        }
        if let Some(sib) = self.next_sibling(lt, b) {
            self.current = Some(sib);
            self.visit = self.arrival_visit(nodes, lt, sib);
            return self.visit;
        }
        // Up to the parent: postorder visit of the box this level was
        // entered from.
        match self.levels.pop() {
            Some(level) => {
                self.current = Some(level.parent);
                self.visit = Visit::POSTORDER;
            }
            None => {
                self.current = None;
                self.visit = Visit::empty();
            }
        }
        self.visit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure_box;
    use dom::NodeType;

    #[test]
    fn box_only_walk_visits_pre_and_post() {
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

        let mut order = Vec::new();
        let mut c = BoxCursor::begin(&nodes, &lt, rb, CursorMode::BoxOnly);
        while !c.at_end() {
            order.push((c.current.unwrap(), c.visit));
            c.step(&nodes, &lt, StepKind::Into);
        }
        assert_eq!(
            order,
            vec![
                (rb, Visit::PREORDER),
                (ab, Visit::PREORDER | Visit::POSTORDER),
                (bb, Visit::PREORDER | Visit::POSTORDER),
                (rb, Visit::POSTORDER),
            ]
        );
    }

    #[test]
    fn hybrid_walk_visits_inline_object_boxes() {
        let mut nodes = NodeArena::new();
        let mut lt = LayoutTree::new();
        let para = nodes.create(NodeType::Paragraph);
        let text = nodes.create(NodeType::Text);
        nodes.set_text(text, "hi ");
        let img = nodes.create(NodeType::Image);
        nodes.append_child(para, text);
        nodes.append_child(para, img);
        let pb = configure_box(&mut lt, &mut nodes, para).unwrap();
        let ib = configure_box(&mut lt, &mut nodes, img).unwrap();

        let mut seen = Vec::new();
        let mut c = BoxCursor::begin(&nodes, &lt, pb, CursorMode::Hybrid);
        while !c.at_end() {
            if c.visit.contains(Visit::PREORDER) {
                seen.push(c.current.unwrap());
            }
            c.step(&nodes, &lt, StepKind::Into);
        }
        assert_eq!(seen, vec![pb, ib]);
    }

    #[test]
    fn step_over_skips_subtrees() {
        let mut nodes = NodeArena::new();
        let mut lt = LayoutTree::new();
        let root = nodes.create(NodeType::Vbox);
        let a = nodes.create(NodeType::Basic);
        let a1 = nodes.create(NodeType::Basic);
        nodes.append_child(root, a);
        nodes.append_child(a, a1);
        let rb = configure_box(&mut lt, &mut nodes, root).unwrap();
        let ab = configure_box(&mut lt, &mut nodes, a).unwrap();
        configure_box(&mut lt, &mut nodes, a1).unwrap();

        let mut c = BoxCursor::begin(&nodes, &lt, rb, CursorMode::BoxOnly);
        c.step(&nodes, &lt, StepKind::Into); // at a, preorder
        assert_eq!(c.current, Some(ab));
        let v = c.step(&nodes, &lt, StepKind::Over); // skip a1
        assert_eq!(c.current, Some(rb));
        assert_eq!(v, Visit::POSTORDER);
    }
}
