//! The box tree: laid-out rectangles owned by document nodes.
//!
//! Boxes live in an arena with a free list, so the churn of inline box
//! synthesis (text boxes created and destroyed as lines rebreak) reuses
//! memory instead of allocating. Tree links, grid links and layer chains are
//! all ids into sibling arenas.
//!
//! # Invariants
//! - `clear_flags` is the only path that clears validity bits during layout;
//!   every site that sets a size goes through `set_ideal_size`/`set_size`
//!   which call it. This keeps the §flag-propagation rules auditable in one
//!   place.
//! - A box with `BOUNDS_DEFINED` and a live tree membership is in exactly
//!   one grid cell (`cell_code != INVALID_CELL_CODE`).

use dom::NodeId;
use std::num::NonZeroU32;
use style::{Alignment, Axis, ClipBoxSelector, DimensionMode};

use crate::flags::{BoxFlags, LayoutFlags, axis_flag, slot_flag};
use crate::geometry::{Rect, band_distance};
use crate::layers::LayerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(NonZeroU32);

impl BoxId {
    fn new(index: usize) -> BoxId {
        BoxId(NonZeroU32::new(index as u32 + 1).unwrap())
    }

    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// The four sizes a box axis carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeSlot {
    /// Declared dimension.
    Ideal = 0,
    /// Size at infinite available width (max-content).
    Preferred = 1,
    /// Size computed bottom-up from children at the current constraint.
    Intrinsic = 2,
    /// Final size imposed by the parent and flex distribution.
    Extrinsic = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthDirection {
    Grow = 0,
    Shrink = 1,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BoxAxis {
    pub mode_dim: DimensionMode,
    /// Indexed by `SizeSlot`; validity lives in the box's `layout_flags`.
    pub sizes: [f32; 4],
    /// Document-space position of the outer (margin) edge.
    pub pos: f32,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub pad_lower: f32,
    pub pad_upper: f32,
    pub margin_lower: f32,
    pub margin_upper: f32,
}

pub const INVALID_CELL_CODE: u32 = u32::MAX;

pub struct LayoutBox {
    pub owner: Option<NodeId>,

    pub parent: Option<BoxId>,
    pub first_child: Option<BoxId>,
    pub last_child: Option<BoxId>,
    pub prev_sibling: Option<BoxId>,
    pub next_sibling: Option<BoxId>,

    pub axes: [BoxAxis; 2],
    /// Major axis along which children are stacked.
    pub axis: Axis,
    pub arrangement: Alignment,
    pub alignment: Alignment,
    pub clip_box: ClipBoxSelector,
    /// Grow and shrink factors, indexed by `GrowthDirection`.
    pub growth: [f32; 2],

    pub flags: BoxFlags,
    pub layout_flags: LayoutFlags,

    pub depth: u16,
    pub depth_interval: u16,
    pub clip: Rect,
    pub clip_ancestor: Option<BoxId>,

    pub visibility_stamp: u32,
    pub mouse_hit_stamp: u32,

    pub cell_code: u32,
    pub cell_prev: Option<BoxId>,
    pub cell_next: Option<BoxId>,

    /// Range of paragraph elements positioned by this box (text and line
    /// boxes only).
    pub first_element: usize,
    pub last_element: usize,
    pub line_number: u32,

    /// Head of the box's render layer chain.
    pub layers: Option<LayerId>,
}

impl LayoutBox {
    fn new(owner: Option<NodeId>) -> LayoutBox {
        LayoutBox {
            owner,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            axes: [BoxAxis::default(); 2],
            axis: Axis::Vertical,
            arrangement: Alignment::Start,
            alignment: Alignment::Start,
            clip_box: ClipBoxSelector::default(),
            growth: [0.0; 2],
            flags: BoxFlags::empty(),
            layout_flags: LayoutFlags::empty(),
            depth: 0,
            depth_interval: 1,
            clip: Rect::INFINITE,
            clip_ancestor: None,
            visibility_stamp: 0,
            mouse_hit_stamp: 0,
            cell_code: INVALID_CELL_CODE,
            cell_prev: None,
            cell_next: None,
            first_element: 0,
            last_element: 0,
            line_number: 0,
            layers: None,
        }
    }

    #[inline]
    pub fn axis_ref(&self, axis: Axis) -> &BoxAxis {
        &self.axes[axis.index()]
    }

    #[inline]
    pub fn axis_mut(&mut self, axis: Axis) -> &mut BoxAxis {
        &mut self.axes[axis.index()]
    }

    pub fn padding(&self, axis: Axis) -> f32 {
        let a = self.axis_ref(axis);
        a.pad_lower + a.pad_upper
    }

    pub fn margins(&self, axis: Axis) -> f32 {
        let a = self.axis_ref(axis);
        a.margin_lower + a.margin_upper
    }

    pub fn padding_and_margins(&self, axis: Axis) -> f32 {
        self.padding(axis) + self.margins(axis)
    }

    /// Applies the axis' min/max bounds to a candidate size.
    pub fn apply_min_max(&self, axis: Axis, mut dim: f32) -> f32 {
        let a = self.axis_ref(axis);
        if let Some(min) = a.min {
            dim = dim.max(min);
        }
        if let Some(max) = a.max {
            dim = dim.min(max);
        }
        dim
    }
}

/// Two sizes are equal for layout purposes if they agree to well under a
/// pixel; avoids ping-ponging on float noise.
pub fn sizes_equal(a: f32, b: f32) -> bool {
    (a - b).abs() < 1.0 / 128.0
}

#[derive(Default)]
pub struct BoxArena {
    slots: Vec<Option<LayoutBox>>,
    free: Vec<u32>,
    live: usize,
}

impl BoxArena {
    pub fn new() -> BoxArena {
        BoxArena::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn create(&mut self, owner: Option<NodeId>) -> BoxId {
        self.live += 1;
        match self.free.pop() {
            Some(i) => {
                let i = i as usize;
                debug_assert!(self.slots[i].is_none());
                self.slots[i] = Some(LayoutBox::new(owner));
                BoxId::new(i)
            }
            None => {
                self.slots.push(Some(LayoutBox::new(owner)));
                BoxId::new(self.slots.len() - 1)
            }
        }
    }

    pub fn contains(&self, id: BoxId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }

    #[track_caller]
    pub fn get(&self, id: BoxId) -> &LayoutBox {
        self.slots[id.index()].as_ref().expect("stale BoxId")
    }

    #[track_caller]
    pub fn get_mut(&mut self, id: BoxId) -> &mut LayoutBox {
        self.slots[id.index()].as_mut().expect("stale BoxId")
    }

    /// Frees one slot. Callers must have unlinked the box from its tree,
    /// grid cell and layer chain first; `LayoutTree::destroy_box` does.
    pub(crate) fn release(&mut self, id: BoxId) {
        debug_assert!(self.slots[id.index()].is_some());
        self.slots[id.index()] = None;
        self.free.push(id.index() as u32);
        self.live -= 1;
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = BoxId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| BoxId::new(i))
    }

    // ----- size slots ------------------------------------------------------

    pub fn size_valid(&self, id: BoxId, slot: SizeSlot, axis: Axis) -> bool {
        self.get(id).layout_flags.contains(slot_flag(slot, axis))
    }

    pub fn validate_size(&mut self, id: BoxId, slot: SizeSlot, axis: Axis) {
        let f = slot_flag(slot, axis);
        self.get_mut(id).layout_flags |= f;
    }

    pub fn get_slot(&self, id: BoxId, slot: SizeSlot, axis: Axis) -> f32 {
        self.get(id).axis_ref(axis).sizes[slot as usize]
    }

    #[track_caller]
    pub fn get_size(&self, id: BoxId, slot: SizeSlot, axis: Axis) -> f32 {
        debug_assert!(self.size_valid(id, slot, axis), "reading invalid {slot:?} size");
        self.get_slot(id, slot, axis)
    }

    /// Extrinsic size shorthand for geometry. Reads the slot without a
    /// validity assertion: geometry accessors run on boxes whose sizes may
    /// be mid-recomputation, and the last stored value is the right answer
    /// for them.
    pub fn extrinsic(&self, id: BoxId, axis: Axis) -> f32 {
        self.get_slot(id, SizeSlot::Extrinsic, axis)
    }

    /// Writes a slot and marks it valid without running flag propagation.
    /// Inline box synthesis uses this: it takes over all sizing of the boxes
    /// it builds.
    pub fn set_slot(&mut self, id: BoxId, slot: SizeSlot, axis: Axis, new_size: f32) {
        let f = slot_flag(slot, axis);
        let b = self.get_mut(id);
        b.axis_mut(axis).sizes[slot as usize] = new_size;
        b.layout_flags |= f;
    }

    /// Writes a slot, marks it valid and reports whether the stored value
    /// changed.
    pub fn set_size(&mut self, id: BoxId, slot: SizeSlot, axis: Axis, new_size: f32) -> bool {
        let valid = self.size_valid(id, slot, axis);
        let old = self.get_slot(id, slot, axis);
        self.set_slot(id, slot, axis, new_size);
        !valid || !sizes_equal(old, new_size)
    }

    /// Sets the declared dimension of a box. Returns true if the mode or
    /// value changed, in which case all derived sizes of the axis are
    /// invalidated through the normal propagation path.
    pub fn set_ideal_size(
        &mut self,
        id: BoxId,
        axis: Axis,
        mode: DimensionMode,
        dim: f32,
    ) -> bool {
        let dim = self.get(id).apply_min_max(axis, dim);
        {
            let b = self.get(id);
            let a = b.axis_ref(axis);
            if a.mode_dim == mode
                && sizes_equal(a.sizes[SizeSlot::Ideal as usize], dim)
                && b.layout_flags.contains(slot_flag(SizeSlot::Ideal, axis))
            {
                return false;
            }
        }
        let b = self.get_mut(id);
        b.axis_mut(axis).mode_dim = mode;
        b.axis_mut(axis).sizes[SizeSlot::Ideal as usize] = dim;
        b.layout_flags |= slot_flag(SizeSlot::Ideal, axis);
        self.clear_flags_axis(id, axis, LayoutFlags::all_valid(axis));
        log::trace!("ideal changed: box {:?} axis {:?} -> {:.2}", id, axis, dim);
        true
    }

    // ----- tree links ------------------------------------------------------

    pub fn remove_from_parent(&mut self, id: BoxId) {
        let (parent, prev, next) = {
            let b = self.get(id);
            (b.parent, b.prev_sibling, b.next_sibling)
        };
        if let Some(p) = prev {
            self.get_mut(p).next_sibling = next;
        } else if let Some(par) = parent {
            self.get_mut(par).first_child = next;
        }
        if let Some(n) = next {
            self.get_mut(n).prev_sibling = prev;
        } else if let Some(par) = parent {
            self.get_mut(par).last_child = prev;
        }
        let b = self.get_mut(id);
        b.parent = None;
        b.prev_sibling = None;
        b.next_sibling = None;
    }

    pub fn append_child(&mut self, parent: BoxId, child: BoxId) {
        self.insert_child_before(parent, child, None);
    }

    pub fn insert_child_before(&mut self, parent: BoxId, child: BoxId, before: Option<BoxId>) {
        debug_assert_ne!(parent, child);
        self.remove_from_parent(child);
        let prev = match before {
            Some(b) => self.get(b).prev_sibling,
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
    }

    pub fn children(&self, id: BoxId) -> BoxChildIter<'_> {
        BoxChildIter { arena: self, next: self.get(id).first_child }
    }

    pub fn is_ancestor(&self, ancestor: BoxId, mut id: BoxId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.get(id).parent {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    /// Preorder comparison within the box tree; used to depth-sort hit
    /// results (later in preorder = drawn later = nearer the viewer).
    pub fn before_in_tree_order(&self, a: BoxId, b: BoxId) -> bool {
        if a == b {
            return false;
        }
        let path = |mut n: BoxId| {
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
            return true;
        }
        if i == pb.len() {
            return false;
        }
        let mut cur = Some(pa[i]);
        while let Some(n) = cur {
            if n == pb[i] {
                return true;
            }
            cur = self.get(n).next_sibling;
        }
        false
    }

    // ----- geometry --------------------------------------------------------

    pub fn padded_dim(&self, id: BoxId, axis: Axis) -> f32 {
        let b = self.get(id);
        self.extrinsic(id, axis) + b.padding(axis)
    }

    pub fn outer_dim(&self, id: BoxId, axis: Axis) -> f32 {
        let b = self.get(id);
        self.extrinsic(id, axis) + b.padding_and_margins(axis)
    }

    pub fn outer_edge_lower(&self, id: BoxId, axis: Axis) -> f32 {
        self.get(id).axis_ref(axis).pos
    }

    pub fn padding_edge_lower(&self, id: BoxId, axis: Axis) -> f32 {
        let b = self.get(id);
        b.axis_ref(axis).pos + b.axis_ref(axis).margin_lower
    }

    pub fn content_edge_lower(&self, id: BoxId, axis: Axis) -> f32 {
        let a = self.get(id).axis_ref(axis);
        a.pos + a.margin_lower + a.pad_lower
    }

    pub fn content_edge_upper(&self, id: BoxId, axis: Axis) -> f32 {
        self.content_edge_lower(id, axis) + self.extrinsic(id, axis)
    }

    pub fn outer_rectangle(&self, id: BoxId) -> Rect {
        Rect {
            x0: self.outer_edge_lower(id, Axis::Horizontal),
            x1: self.outer_edge_lower(id, Axis::Horizontal) + self.outer_dim(id, Axis::Horizontal),
            y0: self.outer_edge_lower(id, Axis::Vertical),
            y1: self.outer_edge_lower(id, Axis::Vertical) + self.outer_dim(id, Axis::Vertical),
        }
    }

    pub fn padding_rectangle(&self, id: BoxId) -> Rect {
        Rect {
            x0: self.padding_edge_lower(id, Axis::Horizontal),
            x1: self.padding_edge_lower(id, Axis::Horizontal)
                + self.padded_dim(id, Axis::Horizontal),
            y0: self.padding_edge_lower(id, Axis::Vertical),
            y1: self.padding_edge_lower(id, Axis::Vertical) + self.padded_dim(id, Axis::Vertical),
        }
    }

    pub fn content_rectangle(&self, id: BoxId) -> Rect {
        Rect {
            x0: self.content_edge_lower(id, Axis::Horizontal),
            x1: self.content_edge_upper(id, Axis::Horizontal),
            y0: self.content_edge_lower(id, Axis::Vertical),
            y1: self.content_edge_upper(id, Axis::Vertical),
        }
    }

    /// The rectangle mouse hits are tested against.
    pub fn hit_rectangle(&self, id: BoxId) -> Rect {
        if self.get(id).flags.contains(BoxFlags::HIT_OUTER) {
            self.outer_rectangle(id)
        } else {
            self.padding_rectangle(id)
        }
    }

    pub fn bounding_box_rectangle(&self, id: BoxId, selector: ClipBoxSelector) -> Rect {
        match selector {
            ClipBoxSelector::Outer => self.outer_rectangle(id),
            ClipBoxSelector::Padding => self.padding_rectangle(id),
            ClipBoxSelector::Content => self.content_rectangle(id),
        }
    }

    /// Builds the box's own clip rectangle: the selected bounding box with
    /// non-clipped edges opened to infinity.
    pub fn build_clip_rectangle(&self, id: BoxId) -> Rect {
        let b = self.get(id);
        let r = self.bounding_box_rectangle(id, b.clip_box);
        Rect {
            x0: if b.flags.contains(BoxFlags::CLIP_LEFT) { r.x0 } else { f32::NEG_INFINITY },
            x1: if b.flags.contains(BoxFlags::CLIP_RIGHT) { r.x1 } else { f32::INFINITY },
            y0: if b.flags.contains(BoxFlags::CLIP_TOP) { r.y0 } else { f32::NEG_INFINITY },
            y1: if b.flags.contains(BoxFlags::CLIP_BOTTOM) { r.y1 } else { f32::INFINITY },
        }
    }

    // ----- flag propagation ------------------------------------------------

    /// Enforces invariants between validity bits being cleared on one box.
    fn normalize_clear(&self, id: BoxId, axis: Axis, mut flags: LayoutFlags) -> LayoutFlags {
        let preferred = slot_flag(SizeSlot::Preferred, axis);
        let intrinsic = slot_flag(SizeSlot::Intrinsic, axis);
        if flags.intersects(preferred) {
            flags |= intrinsic;
        }
        if flags.intersects(intrinsic)
            && self
                .get(id)
                .layout_flags
                .intersects(axis_flag(LayoutFlags::DEPENDS_ON_CHILDREN_H, axis))
        {
            flags |= slot_flag(SizeSlot::Extrinsic, axis);
        }
        flags
    }

    /// The parent/child consistency rules: given bits cleared in a child and
    /// bits to clear on this box, returns the full set to clear here.
    fn modify_clear(
        &self,
        id: BoxId,
        axis: Axis,
        mut to_clear: LayoutFlags,
        cleared_in_child: LayoutFlags,
    ) -> LayoutFlags {
        let b = self.get(id);
        let valid_mask = LayoutFlags::all_valid(axis);

        let cleared_in_child = self.normalize_clear(id, axis, cleared_in_child);
        if cleared_in_child.intersects(valid_mask) {
            // The containing box must be visited.
            to_clear |= LayoutFlags::TREE_VALID;
            // If this box is sized from its children, its size may have
            // changed too.
            if b.layout_flags.intersects(axis_flag(LayoutFlags::DEPENDS_ON_CHILDREN_H, axis)) {
                to_clear |= cleared_in_child & valid_mask;
            }
            // A changed child size forces flex redistribution.
            if b.layout_flags.contains(LayoutFlags::HAS_FLEXIBLE_CHILD) {
                to_clear |= LayoutFlags::FLEX_VALID;
            }
            // Siblings may move.
            to_clear |= LayoutFlags::CHILD_BOUNDS_VALID
                | LayoutFlags::TREE_BOUNDS_VALID
                | LayoutFlags::TREE_CLIP_VALID;
        }

        // Tree-scoped bits propagate from child to parent unconditionally.
        to_clear |= cleared_in_child
            & (LayoutFlags::LAYOUT_INFO_VALID
                | LayoutFlags::TREE_VALID
                | LayoutFlags::TREE_BOUNDS_VALID
                | LayoutFlags::TREE_CLIP_VALID);

        if to_clear.intersects(valid_mask) {
            // Dependent children must be re-sized.
            if b.layout_flags.intersects(axis_flag(LayoutFlags::HAS_DEPENDENT_CHILD_H, axis)) {
                to_clear |= axis_flag(LayoutFlags::CHILD_SIZES_IN_SYNC_H, axis)
                    | LayoutFlags::TREE_VALID;
            }
            // A size change on the major axis invalidates flex.
            if b.layout_flags.contains(LayoutFlags::HAS_FLEXIBLE_CHILD) && axis == b.axis {
                to_clear |= LayoutFlags::FLEX_VALID;
            }
            // Width changes on an inline container invalidate its paragraph
            // layout and inline boxes.
            if axis == Axis::Horizontal && b.flags.contains(BoxFlags::IS_INLINE_CONTAINER) {
                to_clear |= LayoutFlags::TEXT_VALID | LayoutFlags::INLINE_BOXES_VALID;
            }
        }

        to_clear
    }

    /// Clears `to_clear` on `id` and propagates the consequences to every
    /// ancestor. The sole mutation path for validity bits during layout.
    pub fn clear_flags_axis(&mut self, id: BoxId, axis: Axis, to_clear: LayoutFlags) {
        let mut cleared_in_child = LayoutFlags::empty();
        let mut to_clear = to_clear;
        let mut cur = Some(id);
        while let Some(b) = cur {
            let cleared = self.modify_clear(b, axis, to_clear, cleared_in_child);
            self.get_mut(b).layout_flags &= !cleared;
            cleared_in_child = cleared;
            to_clear = LayoutFlags::empty();
            cur = self.get(b).parent;
        }
    }

    /// Both-axes variant of `clear_flags_axis`.
    pub fn clear_flags(&mut self, id: BoxId, to_clear: LayoutFlags) {
        let mut cleared_in_child = LayoutFlags::empty();
        let mut to_clear = to_clear;
        let mut cur = Some(id);
        while let Some(b) = cur {
            let cleared = self.modify_clear(b, Axis::Horizontal, to_clear, cleared_in_child)
                | self.modify_clear(b, Axis::Vertical, to_clear, cleared_in_child);
            self.get_mut(b).layout_flags &= !cleared;
            cleared_in_child = cleared;
            to_clear = LayoutFlags::empty();
            cur = self.get(b).parent;
        }
    }

    /// Clears `mask` on every box in the subtree of `root`.
    pub fn clear_tree_flags(&mut self, root: BoxId, mask: LayoutFlags) {
        let mut stack = vec![root];
        while let Some(b) = stack.pop() {
            self.get_mut(b).layout_flags &= !mask;
            let mut child = self.get(b).first_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).next_sibling;
            }
        }
    }

    // ----- anchors ---------------------------------------------------------

    /// Selection anchor preference order. Compares siblings along their
    /// shared parent's major axis, non-siblings by vertical then horizontal
    /// distance, preferring a descendant whose hit rectangle contains the
    /// point.
    pub fn better_anchor(&self, x: f32, y: f32, a: BoxId, b: BoxId) -> bool {
        let ra = self.hit_rectangle(a);
        let rb = self.hit_rectangle(b);
        let dxa = band_distance(x, ra.x0, ra.x1);
        let dya = band_distance(y, ra.y0, ra.y1);
        let dxb = band_distance(x, rb.x0, rb.x1);
        let dyb = band_distance(y, rb.y0, rb.y1);
        if self.is_ancestor(b, a) && dxb == 0.0 && dyb == 0.0 {
            return true;
        }
        let pa = self.get(a).parent;
        let mut axis = Axis::Horizontal;
        if pa.is_some() && pa == self.get(b).parent {
            axis = self.get(pa.unwrap()).axis;
        } else if (dya - dyb).abs() >= 1.0 {
            axis = Axis::Vertical;
        }
        match axis {
            Axis::Horizontal => dxa < dxb,
            Axis::Vertical => dya < dyb,
        }
    }
}

pub struct BoxChildIter<'a> {
    arena: &'a BoxArena,
    next: Option<BoxId>,
}

impl<'a> Iterator for BoxChildIter<'a> {
    type Item = BoxId;

    fn next(&mut self) -> Option<BoxId> {
        let id = self.next?;
        self.next = self.arena.get(id).next_sibling;
        Some(id)
    }
}

/// Sorts a hit stack so that deeper (later drawn) boxes come last.
pub fn depth_sort_boxes(arena: &BoxArena, boxes: &mut [BoxId]) {
    boxes.sort_by(|&a, &b| {
        if a == b {
            std::cmp::Ordering::Equal
        } else if arena.before_in_tree_order(a, b) {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(arena: &mut BoxArena, w: f32, h: f32) -> BoxId {
        let id = arena.create(None);
        arena.set_ideal_size(id, Axis::Horizontal, DimensionMode::Absolute, w);
        arena.set_ideal_size(id, Axis::Vertical, DimensionMode::Absolute, h);
        arena.set_slot(id, SizeSlot::Extrinsic, Axis::Horizontal, w);
        arena.set_slot(id, SizeSlot::Extrinsic, Axis::Vertical, h);
        id
    }

    #[test]
    fn rectangles_nest() {
        let mut arena = BoxArena::new();
        let id = configured(&mut arena, 100.0, 50.0);
        {
            let b = arena.get_mut(id);
            let h = b.axis_mut(Axis::Horizontal);
            h.pad_lower = 4.0;
            h.pad_upper = 4.0;
            h.margin_lower = 2.0;
            h.margin_upper = 2.0;
            h.pos = 10.0;
        }
        assert_eq!(arena.outer_dim(id, Axis::Horizontal), 112.0);
        let outer = arena.outer_rectangle(id);
        let padding = arena.padding_rectangle(id);
        let content = arena.content_rectangle(id);
        assert_eq!(outer.x0, 10.0);
        assert_eq!(padding.x0, 12.0);
        assert_eq!(content.x0, 16.0);
        assert_eq!(content.x1, 116.0);
        assert_eq!(outer.x1, 122.0);
    }

    #[test]
    fn set_ideal_size_invalidates_derived_slots() {
        let mut arena = BoxArena::new();
        let id = configured(&mut arena, 100.0, 50.0);
        assert!(arena.size_valid(id, SizeSlot::Extrinsic, Axis::Horizontal));
        assert!(arena.set_ideal_size(id, Axis::Horizontal, DimensionMode::Absolute, 80.0));
        // Invariant: after a changed ideal, the extrinsic slot is invalid
        // until the next layout recomputes it.
        assert!(!arena.size_valid(id, SizeSlot::Extrinsic, Axis::Horizontal));
        // Unchanged set is a no-op.
        assert!(!arena.set_ideal_size(id, Axis::Horizontal, DimensionMode::Absolute, 80.0));
    }

    #[test]
    fn clearing_child_size_invalidates_dependent_parent() {
        let mut arena = BoxArena::new();
        let parent = arena.create(None);
        let child = arena.create(None);
        arena.append_child(parent, child);
        // Parent is auto-sized from children on both axes.
        arena.get_mut(parent).layout_flags |=
            LayoutFlags::DEPENDS_ON_CHILDREN_H | LayoutFlags::DEPENDS_ON_CHILDREN_V;
        arena.set_slot(parent, SizeSlot::Intrinsic, Axis::Horizontal, 10.0);
        arena.set_slot(parent, SizeSlot::Extrinsic, Axis::Horizontal, 10.0);
        arena.get_mut(parent).layout_flags |= LayoutFlags::TREE_VALID;

        arena.clear_flags_axis(child, Axis::Horizontal, LayoutFlags::all_valid(Axis::Horizontal));
        let pf = arena.get(parent).layout_flags;
        assert!(!pf.contains(LayoutFlags::TREE_VALID));
        assert!(!pf.contains(LayoutFlags::INTRINSIC_VALID_H));
        assert!(!pf.contains(LayoutFlags::EXTRINSIC_VALID_H));
    }

    #[test]
    fn depth_sort_orders_by_preorder() {
        let mut arena = BoxArena::new();
        let root = arena.create(None);
        let a = arena.create(None);
        let b = arena.create(None);
        let b1 = arena.create(None);
        arena.append_child(root, a);
        arena.append_child(root, b);
        arena.append_child(b, b1);
        let mut stack = vec![b1, root, b, a];
        depth_sort_boxes(&arena, &mut stack);
        assert_eq!(stack, vec![root, a, b, b1]);
    }
}
