//! The logical document tree.
//!
//! Nodes live in an arena indexed by [`NodeId`]; destroyed slots are kept on
//! a free list and reused, so ids are compact and allocation is cheap during
//! incremental edits. All sibling/parent links are ids, which keeps the tree
//! mutable without reference gymnastics.
//!
//! # Invariants
//! - A node is linked under at most one parent; `detach` is the only way to
//!   change that.
//! - Destroying a node destroys its subtree and clears every membership
//!   chain link (hit chain, selection chain) first.
//! - `NodeFlags::RECONSTRUCT_PARAGRAPH` is raised on the nearest inline
//!   container whenever text or structure changes below it.

use std::num::NonZeroU32;

use style::{BoxStyle, LayoutClass, NodeStyle};

use crate::flags::NodeFlags;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    fn new(index: usize) -> NodeId {
        NodeId(NonZeroU32::new(index as u32 + 1).unwrap())
    }

    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Element type tag of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Basic,
    Text,
    Hbox,
    Vbox,
    Paragraph,
    Heading,
    Hyperlink,
    Image,
    User(u8),
}

impl NodeType {
    /// The layout class a node of this type starts with. Images are
    /// blocks: inside an inline container they become inline objects with
    /// their own box rather than flowing text.
    pub fn default_layout(self) -> LayoutClass {
        match self {
            NodeType::Text | NodeType::Hyperlink => LayoutClass::Inline,
            NodeType::Paragraph | NodeType::Heading => LayoutClass::InlineContainer,
            NodeType::Basic
            | NodeType::Hbox
            | NodeType::Vbox
            | NodeType::Image
            | NodeType::User(_) => LayoutClass::Block,
        }
    }

    pub fn tag_name(self) -> &'static str {
        match self {
            NodeType::Basic => "box",
            NodeType::Text => "text",
            NodeType::Hbox => "hbox",
            NodeType::Vbox => "vbox",
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::Hyperlink => "hyperlink",
            NodeType::Image => "image",
            NodeType::User(_) => "user",
        }
    }
}

pub struct Node {
    pub node_type: NodeType,
    pub layout: LayoutClass,
    pub style: NodeStyle,
    pub box_style: BoxStyle,
    /// Owned text for inline leaves; empty otherwise.
    pub text: String,
    pub classes: Vec<Box<str>>,
    pub flags: NodeFlags,

    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,

    /// Doubly linked membership in the document's hit chain.
    pub hit_prev: Option<NodeId>,
    pub hit_next: Option<NodeId>,
    pub hit_stamp: u32,
}

impl Node {
    fn new(node_type: NodeType) -> Node {
        let mut box_style = BoxStyle::default();
        if node_type == NodeType::Hbox {
            box_style.axis = style::Axis::Horizontal;
        }
        Node {
            node_type,
            layout: node_type.default_layout(),
            style: NodeStyle::default(),
            box_style,
            text: String::new(),
            classes: Vec::new(),
            flags: NodeFlags::BOX_STYLE_DIRTY | NodeFlags::STYLE_DIRTY | NodeFlags::HIT_TEST,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            hit_prev: None,
            hit_next: None,
            hit_stamp: 0,
        }
    }
}

#[derive(Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> NodeArena {
        NodeArena::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn create(&mut self, node_type: NodeType) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(i) => {
                let i = i as usize;
                debug_assert!(self.slots[i].is_none());
                self.slots[i] = Some(Node::new(node_type));
                NodeId::new(i)
            }
            None => {
                self.slots.push(Some(Node::new(node_type)));
                NodeId::new(self.slots.len() - 1)
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }

    #[track_caller]
    pub fn get(&self, id: NodeId) -> &Node {
        self.slots[id.index()].as_ref().expect("stale NodeId")
    }

    #[track_caller]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.index()].as_mut().expect("stale NodeId")
    }

    /// Unlinks `id` from its parent and siblings. The hit/selection chain
    /// links are the document's to clear; tree surgery leaves them alone.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = self.get(id);
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        if let Some(p) = prev {
            self.get_mut(p).next_sibling = next;
        } else if let Some(par) = parent {
            self.get_mut(par).first_child = next;
        }
        if let Some(nx) = next {
            self.get_mut(nx).prev_sibling = prev;
        } else if let Some(par) = parent {
            self.get_mut(par).last_child = prev;
        }
        let n = self.get_mut(id);
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
        if let Some(par) = parent {
            self.mark_structure_changed(par);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_child_before(parent, child, None);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        let first = self.get(parent).first_child;
        self.insert_child_before(parent, child, first);
    }

    pub fn insert_child_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        debug_assert_ne!(parent, child);
        self.detach(child);
        let prev = match before {
            Some(b) => {
                debug_assert_eq!(self.get(b).parent, Some(parent));
                self.get(b).prev_sibling
            }
            None => self.get(parent).last_child,
        };
        {
            let c = self.get_mut(child);
            c.parent = Some(parent);
            c.prev_sibling = prev;
            c.next_sibling = before;
        }
        match prev {
            Some(p) => self.get_mut(p).next_sibling = Some(child),
            None => self.get_mut(parent).first_child = Some(child),
        }
        match before {
            Some(b) => self.get_mut(b).prev_sibling = Some(child),
            None => self.get_mut(parent).last_child = Some(child),
        }
        self.mark_structure_changed(parent);
    }

    /// Destroys `id` and its whole subtree. Returns the destroyed ids so the
    /// caller can drop per-node side state (boxes, inline contexts, chains).
    pub fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        self.detach(id);
        let mut destroyed = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let mut child = self.get(n).first_child;
            while let Some(c) = child {
                child = self.get(c).next_sibling;
                stack.push(c);
            }
            destroyed.push(n);
            self.slots[n.index()] = None;
            self.free.push(n.index() as u32);
            self.live -= 1;
        }
        destroyed
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let n = self.get_mut(id);
        if n.text == text {
            return;
        }
        n.text.clear();
        n.text.push_str(text);
        self.mark_structure_changed(id);
    }

    /// Raises `RECONSTRUCT_PARAGRAPH` on the nearest inline container at or
    /// above `id`, and `BOX_STYLE_DIRTY` so layout revisits the subtree.
    pub fn mark_structure_changed(&mut self, id: NodeId) {
        if let Some(container) = self.inline_container_of(id) {
            self.get_mut(container).flags |=
                NodeFlags::RECONSTRUCT_PARAGRAPH | NodeFlags::REMEASURE_ELEMENTS;
        }
        self.get_mut(id).flags |= NodeFlags::BOX_STYLE_DIRTY;
    }

    /// The nearest node at or above `id` whose layout class is
    /// `InlineContainer`, if any.
    pub fn inline_container_of(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.get(n).layout == LayoutClass::InlineContainer {
                return Some(n);
            }
            cur = self.get(n).parent;
        }
        None
    }

    /// Like `inline_container_of`, but only containers strictly above `id`.
    pub fn inline_container_above(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).parent.and_then(|p| self.inline_container_of(p))
    }

    pub fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).parent {
                Some(p) => node = p,
                None => return false,
            }
        }
    }

    pub fn children(&self, id: NodeId) -> ChildIter<'_> {
        ChildIter { arena: self, next: self.get(id).first_child }
    }

    /// Next node in preorder within the subtree of `root` (excluding a step
    /// above `root`). Standard first-child / next-sibling / up walk.
    pub fn next_in_subtree(&self, root: NodeId, id: NodeId) -> Option<NodeId> {
        let n = self.get(id);
        if let Some(c) = n.first_child {
            return Some(c);
        }
        let mut cur = id;
        loop {
            if cur == root {
                return None;
            }
            if let Some(s) = self.get(cur).next_sibling {
                return Some(s);
            }
            cur = self.get(cur).parent?;
        }
    }

    /// Preorder position test: true if `a` comes before `b` in document
    /// order. Nodes in different trees compare by root identity.
    pub fn before_in_tree_order(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        let path = |mut n: NodeId| {
            let mut p = vec![n];
            while let Some(parent) = self.get(n).parent {
                p.push(parent);
                n = parent;
            }
            p.reverse();
            p
        };
        let pa = path(a);
        let pb = path(b);
        let mut i = 0;
        while i < pa.len() && i < pb.len() && pa[i] == pb[i] {
            i += 1;
        }
        if i == pa.len() {
            return true; // a is an ancestor of b
        }
        if i == pb.len() {
            return false;
        }
        // Compare the two diverging siblings under pa[i-1].
        let mut cur = Some(pa[i]);
        while let Some(n) = cur {
            if n == pb[i] {
                return true;
            }
            cur = self.get(n).next_sibling;
        }
        false
    }
}

pub struct ChildIter<'a> {
    arena: &'a NodeArena,
    next: Option<NodeId>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.get(id).next_sibling;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_detach_keep_sibling_links_consistent() {
        let mut arena = NodeArena::new();
        let root = arena.create(NodeType::Vbox);
        let a = arena.create(NodeType::Basic);
        let b = arena.create(NodeType::Basic);
        let c = arena.create(NodeType::Basic);
        arena.append_child(root, a);
        arena.append_child(root, b);
        arena.append_child(root, c);
        assert_eq!(arena.children(root).collect::<Vec<_>>(), vec![a, b, c]);

        arena.detach(b);
        assert_eq!(arena.children(root).collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(arena.get(a).next_sibling, Some(c));
        assert_eq!(arena.get(c).prev_sibling, Some(a));
        assert_eq!(arena.get(b).parent, None);
    }

    #[test]
    fn destroy_recycles_slots() {
        let mut arena = NodeArena::new();
        let root = arena.create(NodeType::Vbox);
        let child = arena.create(NodeType::Paragraph);
        let leaf = arena.create(NodeType::Text);
        arena.append_child(root, child);
        arena.append_child(child, leaf);

        let destroyed = arena.destroy(child);
        assert_eq!(destroyed.len(), 2);
        assert!(arena.contains(root));
        assert!(!arena.contains(child));
        assert_eq!(arena.len(), 1);

        // Freed slots are reused.
        let again = arena.create(NodeType::Basic);
        assert!(destroyed.contains(&again));
    }

    #[test]
    fn structure_change_marks_the_container() {
        let mut arena = NodeArena::new();
        let para = arena.create(NodeType::Paragraph);
        let word = arena.create(NodeType::Text);
        arena.append_child(para, word);
        assert!(arena.get(para).flags.contains(NodeFlags::RECONSTRUCT_PARAGRAPH));

        arena.get_mut(para).flags.remove(NodeFlags::RECONSTRUCT_PARAGRAPH);
        arena.set_text(word, "hello");
        assert!(arena.get(para).flags.contains(NodeFlags::RECONSTRUCT_PARAGRAPH));
    }

    #[test]
    fn tree_order() {
        let mut arena = NodeArena::new();
        let root = arena.create(NodeType::Vbox);
        let a = arena.create(NodeType::Basic);
        let b = arena.create(NodeType::Basic);
        let b1 = arena.create(NodeType::Text);
        arena.append_child(root, a);
        arena.append_child(root, b);
        arena.append_child(b, b1);
        assert!(arena.before_in_tree_order(a, b1));
        assert!(arena.before_in_tree_order(root, b1));
        assert!(!arena.before_in_tree_order(b1, a));
    }
}
