//! Inline box synthesis: materializes line and text boxes from a final
//! break solution.
//!
//! Streaming and interruptible: up to eight lines wait in a build queue
//! while boxes reclaimed from bulldozed lines sit on a free list for reuse.
//! A line whose element range matches the existing line box is skipped
//! entirely when the paragraph hasn't changed (`SAME_PARAGRAPH`).
//!
//! # Invariants
//! - Every text box's element range is a sub-range of its line's range and
//!   contains no inline-object elements.
//! - Consecutive groups on a line are separated by margins computed from a
//!   fixed-point accumulator rounded to the pixel grid at each boundary, so
//!   pixel rounding never drifts across a line.

use std::collections::VecDeque;

use dom::{NodeArena, NodeId};
use platform::Backend;
use style::{Alignment, Axis, DimensionMode, Justification};

use crate::LayoutTree;
use crate::box_tree::{BoxId, SizeSlot};
use crate::fixed::{TextFixed, adjust_glue};
use crate::flags::{BoxFlags, LayoutFlags};
use crate::inline::context::{ParagraphElement, ParagraphLine, encode_elements};
use crate::inline::iter::ParagraphIterator;
use crate::layers::{LayerChain, LayerContent, LayerKey, TextLayer};
use crate::sizing::Budget;

const BUILD_QUEUE_CAPACITY: usize = 8;

pub struct BoxUpdateState {
    ei: ParagraphIterator,
    container: NodeId,

    /// Lines awaiting rebuild: (line index, line box).
    queue: VecDeque<(usize, BoxId)>,
    /// Boxes reclaimed from bulldozed lines, oldest first.
    free_list: VecDeque<BoxId>,

    /// Index of the line most recently advanced to; -1 before the first.
    line_number: i64,
    line_box: Option<BoxId>,
    must_update_bounds: bool,
    eol: bool,

    /// High-precision x accumulator and its pixel-grid shadow.
    xpos: TextFixed,
    xpos_rounded: i32,
}

fn num_lines(lt: &LayoutTree, container: NodeId) -> usize {
    lt.inline_context(container)
        .and_then(|icx| icx.lines.as_ref())
        .map_or(0, |l| l.lines.len())
}

fn line(lt: &LayoutTree, container: NodeId, index: usize) -> ParagraphLine {
    lt.inline_context(container).unwrap().lines.as_ref().unwrap().lines[index]
}

impl BoxUpdateState {
    pub fn begin(nodes: &NodeArena, lt: &LayoutTree, container: NodeId) -> BoxUpdateState {
        let icx = lt.inline_context(container).expect("container has no inline context");
        BoxUpdateState {
            ei: ParagraphIterator::over_container(nodes, icx, container),
            container,
            queue: VecDeque::with_capacity(BUILD_QUEUE_CAPACITY),
            free_list: VecDeque::new(),
            line_number: -1,
            line_box: None,
            must_update_bounds: false,
            eol: true,
            xpos: TextFixed::ZERO,
            xpos_rounded: 0,
        }
    }

    /// Runs synthesis steps until complete or out of budget. Returns true
    /// on completion.
    pub fn update(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
    ) -> bool {
        loop {
            if budget.expired(backend) {
                return false;
            }
            if self.should_advance(lt) {
                self.next_line(nodes, lt);
                continue;
            }
            self.build_step(nodes, lt, backend);
            if self.is_complete(lt) {
                break;
            }
        }
        self.finish(lt);
        true
    }

    fn should_advance(&self, lt: &LayoutTree) -> bool {
        // Prefer consuming free boxes over reclaiming more lines.
        if !self.free_list.is_empty() && !self.queue.is_empty() {
            return false;
        }
        if self.queue.len() == BUILD_QUEUE_CAPACITY {
            return false;
        }
        self.line_number + 1 != num_lines(lt, self.container) as i64
    }

    fn is_complete(&self, lt: &LayoutTree) -> bool {
        self.eol
            && self.queue.is_empty()
            && self.line_number + 1 == num_lines(lt, self.container) as i64
    }

    /// Moves to the next line: reuse the matching line box where possible,
    /// otherwise bulldoze it and queue the line for rebuild.
    fn next_line(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree) {
        let container_box = lt.primary_box(self.container).expect("container box");
        self.line_number += 1;
        let line_index = self.line_number as usize;
        let pl = line(lt, self.container, line_index);

        let existing = match self.line_box {
            Some(prev) => lt.boxes.get(prev).next_sibling,
            None => lt.boxes.get(container_box).first_child,
        };

        let (lb, rebuild) = match existing {
            None => {
                let lb = self.add_line_box(nodes, lt, container_box, line_index);
                self.must_update_bounds = true;
                (lb, true)
            }
            Some(lb) => {
                let rebuild = must_rebuild_line(lt, container_box, &pl, lb);
                if rebuild {
                    self.bulldoze_line(lt, lb);
                }
                (lb, rebuild)
            }
        };
        self.line_box = Some(lb);

        if rebuild {
            self.update_line_box(nodes, lt, &pl, line_index, lb);
            self.queue.push_back((line_index, lb));
        }
    }

    fn add_line_box(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        container_box: BoxId,
        line_index: usize,
    ) -> BoxId {
        let justification = nodes.get(self.container).style.justification;
        let lb = lt.boxes.create(Some(self.container));
        {
            let b = lt.boxes.get_mut(lb);
            b.axis = Axis::Horizontal;
            b.arrangement = match justification {
                Justification::Right => Alignment::End,
                Justification::Center => Alignment::Middle,
                Justification::Flush | Justification::Left => Alignment::Start,
            };
            b.flags |= BoxFlags::IS_LINE_BOX;
            b.axis_mut(Axis::Horizontal).mode_dim = DimensionMode::Absolute;
            b.axis_mut(Axis::Vertical).mode_dim = DimensionMode::Absolute;
            b.line_number = line_index as u32;
            // The container manages the dependency flags of its children.
            b.layout_flags |= LayoutFlags::LAYOUT_INFO_VALID;
        }
        lt.boxes.append_child(container_box, lb);
        lb
    }

    /// Clears a line and moves its boxes to the free list tail.
    fn bulldoze_line(&mut self, lt: &mut LayoutTree, lb: BoxId) {
        let mut child = lt.boxes.get(lb).first_child;
        while let Some(c) = child {
            child = lt.boxes.get(c).next_sibling;
            lt.boxes.remove_from_parent(c);
            self.free_list.push_back(c);
        }
    }

    fn update_line_box(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        pl: &ParagraphLine,
        line_index: usize,
        lb: BoxId,
    ) {
        let (leading, indent) = {
            let s = &nodes.get(self.container).style;
            (s.leading, s.hanging_indent)
        };
        {
            let b = lt.boxes.get_mut(lb);
            b.first_element = pl.a;
            b.last_element = pl.b;
            b.flags.remove(BoxFlags::IS_TEXT_BOX);
            b.line_number = line_index as u32;
        }
        let mut changed = lt.boxes.set_size(lb, SizeSlot::Extrinsic, Axis::Horizontal, pl.width as f32);
        changed |= lt.boxes.set_size(lb, SizeSlot::Extrinsic, Axis::Vertical, pl.height as f32);
        if line_index != 0 && leading > 0 {
            let axis = lt.boxes.get_mut(lb).axis_mut(Axis::Vertical);
            if axis.margin_lower != leading as f32 {
                axis.margin_lower = leading as f32;
                changed = true;
            }
        }
        // A hanging indent pushes every line but the first off the margin.
        if line_index != 0 && indent > 0 {
            let axis = lt.boxes.get_mut(lb).axis_mut(Axis::Horizontal);
            if axis.margin_lower != indent as f32 {
                axis.margin_lower = indent as f32;
                changed = true;
            }
        }
        if changed {
            lt.boxes.get_mut(lb).layout_flags &= !(LayoutFlags::TREE_BOUNDS_VALID
                | LayoutFlags::CHILD_BOUNDS_VALID
                | LayoutFlags::TREE_CLIP_VALID);
            self.must_update_bounds = true;
        }
    }

    /// Positions the iterator at the first placement group of the line at
    /// the head of the build queue. Lines skipped since the last rebuilt
    /// one are scanned over by `seek_line`, which keeps the generating
    /// node in sync.
    fn move_to_line_start(&mut self, nodes: &NodeArena, lt: &LayoutTree, line_index: usize) {
        let icx = lt.inline_context(self.container).unwrap();
        let pl = line(lt, self.container, line_index);
        self.ei.seek_line(nodes, icx, &pl);
    }

    /// Processes one placement group, adding one box to the line at the
    /// head of the build queue.
    fn build_step(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree, backend: &dyn Backend) {
        let Some(&(line_index, lb)) = self.queue.front() else { return };
        let pl = line(lt, self.container, line_index);

        if self.eol {
            self.move_to_line_start(nodes, lt, line_index);
            self.xpos = TextFixed::ZERO;
            self.xpos_rounded = 0;
            self.eol = false;
        }

        let b = self.get_or_create_group_box(nodes, lt, backend, &pl, lb);
        self.set_intergroup_space(nodes, lt, backend, &pl, b);
        self.insert_box_into_line(lt, b, lb);

        let icx = lt.inline_context(self.container).unwrap();
        if self.ei.at_eol() {
            self.finish_line(lt, lb);
            self.queue.pop_front();
        } else {
            self.ei.next_placement_group(nodes, icx);
        }
    }

    /// Pops reusable text boxes from the free list. Inline-object boxes
    /// encountered on the way out are dropped from the list (their nodes
    /// own them) after leaving the grid.
    fn dequeue_text_box(&mut self, lt: &mut LayoutTree) -> Option<BoxId> {
        while let Some(b) = self.free_list.pop_front() {
            if lt.boxes.get(b).flags.contains(BoxFlags::IS_TEXT_BOX) {
                return Some(b);
            }
            lt.grid_remove(b);
        }
        None
    }

    fn get_or_create_group_box(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        pl: &ParagraphLine,
        lb: BoxId,
    ) -> BoxId {
        let child = self.ei.child.expect("placement group has a node");
        let icx = lt.inline_context(self.container).unwrap();
        let first: ParagraphElement = icx.elements[self.ei.offset];
        let (offset, count) = (self.ei.offset, self.ei.count);

        let b = if first.is_inline_object() {
            // The inline object's own box is placed; reclaim it from the
            // free list or its current parent.
            let b = match lt.primary_box(child) {
                Some(b) => b,
                None => {
                    let b = lt.boxes.create(Some(child));
                    lt.set_primary_box(child, b);
                    b
                }
            };
            if let Some(pos) = self.free_list.iter().position(|&x| x == b) {
                self.free_list.remove(pos);
            } else {
                lt.boxes.remove_from_parent(b);
            }
            b
        } else {
            let whole_line = pl.a == offset && self.ei.at_eol();
            let b = if whole_line {
                // The group is the full text of the line; the line box
                // itself displays it.
                lb
            } else {
                match self.dequeue_text_box(lt) {
                    Some(b) => b,
                    None => lt.boxes.create(Some(child)),
                }
            };
            {
                let bx = lt.boxes.get_mut(b);
                bx.owner = Some(child);
                bx.flags |= BoxFlags::IS_TEXT_BOX
                    | BoxFlags::SELECTION_ANCHOR
                    | BoxFlags::HIT_TEST;
                bx.line_number = self.queue.front().map_or(0, |&(i, _)| i as u32);
            }
            self.do_group_box_sizing(nodes, lt, backend, pl, b);
            self.maybe_invalidate_text_layer(lt, b);
            b
        };
        let bx = lt.boxes.get_mut(b);
        bx.first_element = offset;
        bx.last_element = offset + count;
        b
    }

    /// Sizes a text box from its elements and the line's glue, advancing
    /// the fixed-point accumulator; pixel sizes round up.
    fn do_group_box_sizing(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        pl: &ParagraphLine,
        b: BoxId,
    ) {
        let style = self.ei.style(nodes);
        let m = backend.font_metrics(style.font_id);
        let glue = adjust_glue(
            pl.adjustment_ratio,
            TextFixed(m.space_width),
            TextFixed(m.space_stretch),
            TextFixed(m.space_shrink),
        );
        let icx = lt.inline_context(self.container).unwrap();
        let elements = &icx.elements[self.ei.offset..self.ei.offset + self.ei.count];
        let width = placement_group_width(elements, glue);
        let height = TextFixed(m.height);

        self.xpos += width;
        let pixel_width = width.ceil_px();
        let pixel_height = height.ceil_px();
        // Synthesis owns all sizing of text boxes: set every slot through
        // the low-level path that does not touch validity propagation.
        for slot in [SizeSlot::Preferred, SizeSlot::Intrinsic, SizeSlot::Extrinsic] {
            lt.boxes.set_slot(b, slot, Axis::Horizontal, pixel_width as f32);
            lt.boxes.set_slot(b, slot, Axis::Vertical, pixel_height as f32);
        }
        let bx = lt.boxes.get_mut(b);
        bx.axis_mut(Axis::Horizontal).mode_dim = DimensionMode::Absolute;
        bx.axis_mut(Axis::Vertical).mode_dim = DimensionMode::Absolute;
        self.xpos_rounded += pixel_width;
    }

    /// Sets the margin after a group so the next group lands on the pixel
    /// nearest the high-precision position.
    fn set_intergroup_space(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        pl: &ParagraphLine,
        b: BoxId,
    ) {
        let last_element = lt.boxes.get(b).last_element;
        let space = if last_element == pl.b {
            TextFixed::ZERO
        } else {
            // The wider space of the two fonts meeting at the boundary.
            let m1 = backend.font_metrics(self.ei.style(nodes).font_id);
            let m2 = backend.font_metrics(self.ei.next_style(nodes).font_id);
            let m = if m1.space_width > m2.space_width { m1 } else { m2 };
            adjust_glue(
                pl.adjustment_ratio,
                TextFixed(m.space_width),
                TextFixed(m.space_stretch),
                TextFixed(m.space_shrink),
            )
        };
        self.xpos += space;
        let nearest_pixel = self.xpos.round_px();
        let bx = lt.boxes.get_mut(b);
        bx.axis_mut(Axis::Horizontal).margin_upper = (nearest_pixel - self.xpos_rounded) as f32;
        self.xpos_rounded = nearest_pixel;
    }

    fn insert_box_into_line(&mut self, lt: &mut LayoutTree, b: BoxId, lb: BoxId) {
        if b == lb {
            return;
        }
        lt.boxes.insert_child_before(lb, b, None);
        lt.boxes.get_mut(lb).layout_flags &= !LayoutFlags::BOUNDS_VALID_MASK;
        self.must_update_bounds = true;
        let line_number = lt.boxes.get(lb).line_number;
        let bx = lt.boxes.get_mut(b);
        bx.line_number = line_number;
        // Word and object boxes do not depend on their containing line;
        // the container manages their dependency flags.
        bx.layout_flags |= LayoutFlags::LAYOUT_INFO_VALID;
    }

    /// Any existing text layer must be rechecked before use; if the
    /// paragraph changed since the last box update it cannot be valid.
    fn maybe_invalidate_text_layer(&self, lt: &mut LayoutTree, b: BoxId) {
        let container_box = lt.primary_box(self.container).expect("container box");
        let same = lt.boxes.get(container_box).flags.contains(BoxFlags::SAME_PARAGRAPH);
        let bx = lt.boxes.get_mut(b);
        bx.flags.remove(BoxFlags::TEXT_LAYER_KNOWN_VALID);
        if !same {
            bx.flags.remove(BoxFlags::TEXT_LAYER_MAY_BE_VALID);
        }
    }

    fn finish_line(&mut self, lt: &mut LayoutTree, lb: BoxId) {
        // A line box that stopped displaying text no longer needs a text
        // layer.
        if !lt.boxes.get(lb).flags.contains(BoxFlags::IS_TEXT_BOX) {
            destroy_box_text_layer(lt, lb);
        }
        self.eol = true;
    }

    fn finish(&mut self, lt: &mut LayoutTree) {
        // Unused free-list text boxes die here.
        while let Some(b) = self.dequeue_text_box(lt) {
            lt.destroy_box(b);
        }
        // Surplus line boxes beyond the last line are destroyed, orphaning
        // any inline-object children (their nodes own them).
        if let Some(last) = self.line_box {
            let mut surplus = lt.boxes.get(last).next_sibling;
            while let Some(s) = surplus {
                surplus = lt.boxes.get(s).next_sibling;
                let mut child = lt.boxes.get(s).first_child;
                while let Some(c) = child {
                    child = lt.boxes.get(c).next_sibling;
                    lt.boxes.remove_from_parent(c);
                    if lt.boxes.get(c).flags.contains(BoxFlags::IS_TEXT_BOX) {
                        lt.destroy_box(c);
                    }
                }
                lt.destroy_box(s);
            }
        }
        if self.must_update_bounds {
            if let Some(cb) = lt.primary_box(self.container) {
                lt.boxes.clear_flags(cb, LayoutFlags::BOUNDS_VALID_MASK);
            }
        }
        // Subsequent box updates may now skip unchanged lines.
        if let Some(cb) = lt.primary_box(self.container) {
            lt.boxes.get_mut(cb).flags.insert(BoxFlags::SAME_PARAGRAPH);
        }
    }
}

/// True if the boxes inside a line must be rebuilt from elements.
fn must_rebuild_line(
    lt: &LayoutTree,
    container_box: BoxId,
    line: &ParagraphLine,
    lb: BoxId,
) -> bool {
    if !lt.boxes.get(container_box).flags.contains(BoxFlags::SAME_PARAGRAPH) {
        return true;
    }
    let b = lt.boxes.get(lb);
    b.first_element != line.a || b.last_element != line.b
}

/// Total width of a placement group with the given glue width. The group
/// contains no inline objects.
pub fn placement_group_width(elements: &[ParagraphElement], glue: TextFixed) -> TextFixed {
    let mut width = TextFixed::ZERO;
    for e in elements {
        debug_assert!(!e.is_inline_object());
        width += e.advance;
        if e.is_word_end() {
            width += glue;
        }
    }
    if elements.last().is_some_and(|e| e.is_word_end()) {
        width = width - glue;
    }
    width
}

// ----- text layers ---------------------------------------------------------

pub fn destroy_box_text_layer(lt: &mut LayoutTree, b: BoxId) {
    let mut head = lt.boxes.get(b).layers;
    lt.layers.chain_replace(LayerChain::Box, &mut head, LayerKey::Text, None);
    lt.boxes.get_mut(b).layers = head;
}

/// Rebuilds (or revalidates) the text layer for a text box: the encoded
/// characters of its element range and their x positions, built with the
/// line's adjusted glue.
pub fn update_box_text_layer(
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    backend: &dyn Backend,
    b: BoxId,
) -> Option<crate::layers::LayerId> {
    debug_assert!(lt.boxes.get(b).flags.contains(BoxFlags::IS_TEXT_BOX));

    let mut head = lt.boxes.get(b).layers;
    let old = lt.layers.chain_find(LayerChain::Box, head, LayerKey::Text);
    if lt.boxes.get(b).flags.contains(BoxFlags::TEXT_LAYER_KNOWN_VALID)
        && lt.boxes.get(b).flags.contains(BoxFlags::TEXT_LAYER_MAY_BE_VALID)
    {
        return old;
    }

    let owner = lt.boxes.get(b).owner?;
    let container = nodes.inline_container_of(owner)?;
    let start = lt.boxes.get(b).first_element;
    let end = lt.boxes.get(b).last_element;
    let line_number = lt.boxes.get(b).line_number as usize;
    let font_id = nodes.get(owner).style.text.font_id;
    let adjustment_ratio = {
        let icx = lt.inline_context(container)?;
        icx.lines.as_ref()?.lines.get(line_number)?.adjustment_ratio
    };

    // Reuse the existing layer if nothing it depends on changed.
    if lt.boxes.get(b).flags.contains(BoxFlags::TEXT_LAYER_MAY_BE_VALID) {
        if let Some(old_id) = old {
            if let LayerContent::Text(t) = &lt.layers.get(old_id).content {
                if t.start == start
                    && t.end == end
                    && t.font_id == font_id
                    && t.adjustment_ratio == adjustment_ratio
                {
                    lt.boxes.get_mut(b).flags.insert(BoxFlags::TEXT_LAYER_KNOWN_VALID);
                    return Some(old_id);
                }
            }
        }
    }

    let (text, positions) = {
        let icx = lt.inline_context(container)?;
        let elements = &icx.elements[start..end];
        let (text, _chars) = encode_elements(elements, false);
        let m = backend.font_metrics(font_id);
        let glue = adjust_glue(
            adjustment_ratio,
            TextFixed(m.space_width),
            TextFixed(m.space_stretch),
            TextFixed(m.space_shrink),
        );
        let mut positions = Vec::with_capacity(elements.len());
        let mut x = TextFixed::ZERO;
        for e in elements {
            debug_assert!(!e.is_inline_object());
            positions.push(x.round_px());
            x += e.advance;
            if e.is_word_end() {
                x += glue;
            }
        }
        (text, positions)
    };

    let layer = lt.layers.create(
        LayerKey::Text,
        LayerContent::Text(TextLayer {
            container,
            start,
            end,
            font_id,
            adjustment_ratio,
            text,
            x_positions: positions,
        }),
    );
    lt.layers.chain_replace(LayerChain::Box, &mut head, LayerKey::Text, Some(layer));
    lt.boxes.get_mut(b).layers = head;
    lt.boxes.get_mut(b).flags.insert(BoxFlags::TEXT_LAYER_VALID_MASK);
    Some(layer)
}

/// Creates, updates or removes the selection sublayer of a text box so it
/// covers the selected sub-range of its elements. Returns the layer if the
/// box has selected content.
pub fn require_selection_layer(
    nodes: &NodeArena,
    lt: &mut LayoutTree,
    backend: &dyn Backend,
    b: BoxId,
) -> Option<crate::layers::LayerId> {
    if !lt.boxes.get(b).flags.contains(BoxFlags::IS_TEXT_BOX) {
        return None;
    }
    let owner = lt.boxes.get(b).owner?;
    let container = nodes.inline_container_of(owner)?;
    let start = lt.boxes.get(b).first_element;
    let end = lt.boxes.get(b).last_element;

    let (sel_start, sel_end) = {
        let icx = lt.inline_context(container)?;
        let mut s = end;
        let mut e = start;
        for i in start..end {
            if icx.elements[i].is_selected() {
                s = s.min(i);
                e = e.max(i + 1);
            }
        }
        (s, e)
    };

    let mut head = lt.boxes.get(b).layers;
    if sel_start >= sel_end {
        lt.layers.chain_replace(LayerChain::Box, &mut head, LayerKey::Selection, None);
        lt.boxes.get_mut(b).layers = head;
        return None;
    }

    // Positions come from the text layer; build it if needed.
    let text_layer = update_box_text_layer(nodes, lt, backend, b)?;
    let (x0, x1) = {
        let LayerContent::Text(t) = &lt.layers.get(text_layer).content else { return None };
        let x0 = t.x_positions.get(sel_start - start).copied().unwrap_or(0) as f32;
        let x1 = if sel_end - start < t.x_positions.len() {
            t.x_positions[sel_end - start] as f32
        } else {
            lt.boxes.get_slot(b, SizeSlot::Extrinsic, Axis::Horizontal)
        };
        (x0, x1)
    };

    let mut head = lt.boxes.get(b).layers;
    let existing = lt.layers.chain_find(LayerChain::Box, head, LayerKey::Selection);
    if let Some(id) = existing {
        if let LayerContent::Selection { x0: ox0, x1: ox1 } = lt.layers.get(id).content {
            if ox0 == x0 && ox1 == x1 {
                return Some(id);
            }
        }
    }
    let layer = lt.layers.create(LayerKey::Selection, LayerContent::Selection { x0, x1 });
    lt.layers.chain_replace(LayerChain::Box, &mut head, LayerKey::Selection, Some(layer));
    lt.boxes.get_mut(b).layers = head;
    Some(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::TextFixed;
    use crate::inline::context::ElementFlags;

    fn element(advance_px: i32, word_end: bool) -> ParagraphElement {
        ParagraphElement {
            code_point: 'a' as u32,
            advance: TextFixed::from_px(advance_px),
            penalty: Default::default(),
            flags: if word_end { ElementFlags::WORD_END } else { ElementFlags::empty() },
        }
    }

    #[test]
    fn group_width_excludes_trailing_glue() {
        let glue = TextFixed::from_px(5);
        let elements = [element(4, false), element(4, true), element(6, false)];
        // 4 + 4 + glue + 6
        assert_eq!(placement_group_width(&elements, glue), TextFixed::from_px(19));
        let trailing = [element(4, false), element(4, true)];
        assert_eq!(placement_group_width(&trailing, glue), TextFixed::from_px(8));
    }
}
