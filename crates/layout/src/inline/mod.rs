//! Inline layout: paragraph elements, line breaking and box synthesis.

pub mod breaker;
pub mod caret;
pub mod context;
pub mod iter;
pub mod measure;
pub mod synthesis;

pub use breaker::{BreakState, INFINITE_LINE_WIDTH};
pub use caret::{CARET_END, CaretAddress, RewriteMode};
pub use context::{
    ElementFlags, InlineContext, LineList, ParagraphElement, ParagraphLine, PenaltyType,
};
pub use iter::ParagraphIterator;
pub use measure::MeasureState;
pub use synthesis::BoxUpdateState;

use dom::{NodeArena, NodeFlags, NodeId};
use style::LayoutClass;

/// True if `node` contributes an inline object (rather than flowing text)
/// to the inline container `root` it sits in.
pub fn is_inline_object(nodes: &NodeArena, root: NodeId, node: NodeId) -> bool {
    node != root && nodes.get(node).layout != LayoutClass::Inline
}

/// Preorder successor within an inline container's subtree. Does not
/// descend into inline objects (their contents belong to their own layout)
/// or hidden subtrees.
pub fn inline_next(nodes: &NodeArena, root: NodeId, node: NodeId) -> Option<NodeId> {
    let descend = node == root || nodes.get(node).layout == LayoutClass::Inline;
    if descend {
        if let Some(c) = nodes.get(node).first_child {
            return Some(c);
        }
    }
    let mut cur = node;
    loop {
        if cur == root {
            return None;
        }
        if let Some(s) = nodes.get(cur).next_sibling {
            return Some(s);
        }
        cur = nodes.get(cur).parent?;
    }
}

/// First node in the container (including the container itself) that
/// generated paragraph elements.
pub fn inline_first_nonempty(nodes: &NodeArena, root: NodeId) -> Option<NodeId> {
    let mut cur = Some(root);
    while let Some(n) = cur {
        if nodes.get(n).flags.contains(NodeFlags::HAS_PARAGRAPH_ELEMENTS) {
            return Some(n);
        }
        cur = inline_next(nodes, root, n);
    }
    None
}

/// Next node after `node` that generated paragraph elements.
pub fn inline_next_nonempty(nodes: &NodeArena, root: NodeId, node: NodeId) -> Option<NodeId> {
    let mut cur = inline_next(nodes, root, node);
    while let Some(n) = cur {
        if nodes.get(n).flags.contains(NodeFlags::HAS_PARAGRAPH_ELEMENTS) {
            return Some(n);
        }
        cur = inline_next(nodes, root, n);
    }
    None
}
