//! The document: one logical tree, its layout, and the update driver.
//!
//! A document is owned by one thread. `update` runs the incremental layout
//! under a time budget and can be called repeatedly until it reports
//! completion; suspended state lives on the heap inside the document.
//! Public operations that read or change geometry force-complete any
//! pending update first, so stale geometry is never observable.

use std::collections::VecDeque;

use dom::{
    AttributeError, AttributeName, AttributeOp, Message, MouseButton, NodeArena, NodeFlags,
    NodeId, NodeType,
};
use gfx::View;
use layout::inline::caret;
use layout::sizing::Budget;
use layout::{
    Axis, CaretAddress, LayoutState, LayoutTree, Rect, configure_box, depth_sort_boxes,
};
use platform::FontFlags;
use style::values::{AttributeValue, Color};
use style::{DimensionMode, LayoutClass, Pseudo, Selector};

use crate::selection::SelectionState;
use crate::system::System;

pub struct Document {
    pub system: System,
    pub nodes: NodeArena,
    pub layout: LayoutTree,
    state: LayoutState,
    root: NodeId,

    update_clock: u32,
    hit_clock: u32,
    change_clock: u64,
    clock_at_layout: u64,
    update_in_progress: bool,

    messages: VecDeque<Message>,

    hit_chain_head: Option<NodeId>,
    hit_chain_tail: Option<NodeId>,
    mouse_down_node: Option<NodeId>,

    pub(crate) selection: SelectionState,

    source: Option<String>,
}

impl Document {
    pub fn new(system: System) -> Document {
        let mut nodes = NodeArena::new();
        let root = nodes.create(NodeType::Vbox);
        let default_font = system.default_font();
        nodes.get_mut(root).style.text.font_id = default_font;
        Document {
            system,
            nodes,
            layout: LayoutTree::new(),
            state: LayoutState::new(),
            root,
            update_clock: 0,
            hit_clock: 0,
            change_clock: 1,
            clock_at_layout: 0,
            update_in_progress: false,
            messages: VecDeque::new(),
            hit_chain_head: None,
            hit_chain_tail: None,
            mouse_down_node: None,
            selection: SelectionState::default(),
            source: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn update_clock(&self) -> u32 {
        self.update_clock
    }

    pub fn hit_clock(&self) -> u32 {
        self.hit_clock
    }

    // ----- tree building ----------------------------------------------------

    pub fn create_node(&mut self, node_type: NodeType) -> NodeId {
        self.force_complete();
        let id = self.nodes.create(node_type);
        self.nodes.get_mut(id).style.text.font_id = self.system.default_font();
        self.change_clock += 1;
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.force_complete();
        self.nodes.append_child(parent, child);
        self.change_clock += 1;
    }

    pub fn insert_child_before(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        self.force_complete();
        self.nodes.insert_child_before(parent, child, before);
        self.change_clock += 1;
    }

    pub fn destroy_node(&mut self, node: NodeId) {
        self.force_complete();
        // Detach from the membership chains before the memory goes away.
        let destroyed = {
            let mut ids = vec![node];
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                for c in self.nodes.children(n).collect::<Vec<_>>() {
                    ids.push(c);
                    stack.push(c);
                }
            }
            ids
        };
        for &n in &destroyed {
            self.remove_from_hit_chain(n);
            self.selection.forget_node(n);
            if self.mouse_down_node == Some(n) {
                self.mouse_down_node = None;
            }
        }
        self.nodes.destroy(node);
        for n in destroyed {
            self.layout.remove_node_state(n);
        }
        self.change_clock += 1;
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.force_complete();
        self.nodes.set_text(node, text);
        self.change_clock += 1;
    }

    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        op: AttributeOp,
        value: &str,
    ) -> Result<(), AttributeError> {
        self.force_complete();
        let name = AttributeName::parse(name)?;
        let value = AttributeValue::parse(value).map_err(|_| {
            AttributeError::TypeMismatch { attribute: "value", expected: "parsable value" }
        })?;
        dom::attribute::set_attribute(&mut self.nodes, node, name, op, &value)?;
        self.change_clock += 1;
        Ok(())
    }

    pub fn set_font(&mut self, node: NodeId, face: &str, size: u32, flags: FontFlags) {
        self.force_complete();
        let font = self.system.match_font(face, size, flags);
        let n = self.nodes.get_mut(node);
        if n.style.text.font_id != font {
            n.style.text.font_id = font;
            n.flags |= NodeFlags::STYLE_DIRTY;
            self.nodes.mark_structure_changed(node);
            self.change_clock += 1;
        }
    }

    /// Imposes an outer dimension on the root.
    pub fn set_root_dimension(&mut self, axis: Axis, px: f32) {
        self.force_complete();
        let bs = &mut self.nodes.get_mut(self.root).box_style;
        let a = bs.axis_mut(axis);
        a.mode = DimensionMode::Absolute;
        a.dim = px;
        self.nodes.get_mut(self.root).flags |= NodeFlags::BOX_STYLE_DIRTY;
        self.change_clock += 1;
    }

    pub fn set_source(&mut self, source: &str) {
        self.source = Some(source.to_string());
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    // ----- update -----------------------------------------------------------

    fn needs_update(&self) -> bool {
        self.update_in_progress || self.change_clock != self.clock_at_layout
    }

    /// Runs the incremental update for at most `timeout_us` microseconds
    /// (`None` = to completion). Returns true when the document is fully
    /// up to date.
    pub fn update(&mut self, timeout_us: Option<u64>) -> bool {
        if !self.needs_update() {
            return true;
        }
        let budget = Budget::new(self.system.backend(), timeout_us);

        if !self.update_in_progress {
            self.begin_update();
        }
        let done = self.state.advance(
            &mut self.nodes,
            &mut self.layout,
            self.system.backend(),
            &budget,
        );
        if done {
            self.update_in_progress = false;
            self.update_clock += 1;
            self.clock_at_layout = self.change_clock;
            self.selection.refresh(&self.nodes, &mut self.layout);
            log::debug!("document update {} complete", self.update_clock);
        }
        done
    }

    /// Completes a suspended update with no time limit. Mutators call this
    /// so the tree never changes under a frozen pass.
    pub fn force_complete(&mut self) {
        if self.update_in_progress {
            self.update(None);
        }
    }

    /// Brings the whole document up to date. Geometry queries, views and
    /// hit testing come through here, so they never observe stale layout.
    pub fn ensure_updated(&mut self) {
        if self.needs_update() {
            self.update(None);
        }
    }

    fn begin_update(&mut self) {
        self.pre_layout_pass();
        let root_box = self
            .layout
            .primary_box(self.root)
            .expect("root always has a box after the pre-layout pass");
        self.state.begin(&self.nodes, &self.layout, root_box);
        self.update_in_progress = true;
    }

    /// Synchronizes per-node state into the box tree: boxes configured from
    /// declared style, background layers, inline contexts rebuilt.
    fn pre_layout_pass(&mut self) {
        let mut cur = Some(self.root);
        while let Some(n) = cur {
            let flags = self.nodes.get(n).flags;
            if flags.contains(NodeFlags::BOX_STYLE_DIRTY)
                || (self.nodes.get(n).layout != LayoutClass::Inline
                    && self.nodes.get(n).layout != LayoutClass::None
                    && self.layout.primary_box(n).is_none())
            {
                configure_box(&mut self.layout, &mut self.nodes, n);
            }
            if flags.contains(NodeFlags::STYLE_DIRTY) {
                self.sync_background_layer(n);
                // Style affects measurement (fonts) and text layers.
                if let Some(container) = self.nodes.inline_container_of(n) {
                    self.nodes.get_mut(container).flags |= NodeFlags::REMEASURE_ELEMENTS;
                    if let Some(cb) = self.layout.primary_box(container) {
                        self.layout.boxes.clear_flags(
                            cb,
                            layout::LayoutFlags::TEXT_VALID
                                | layout::LayoutFlags::INLINE_BOXES_VALID
                                | layout::LayoutFlags::all_valid(Axis::Horizontal)
                                | layout::LayoutFlags::all_valid(Axis::Vertical),
                        );
                    }
                }
                self.nodes.get_mut(n).flags.remove(NodeFlags::STYLE_DIRTY);
            }
            if self.nodes.get(n).layout == LayoutClass::InlineContainer
                && self.nodes.get(n).flags.contains(NodeFlags::RECONSTRUCT_PARAGRAPH)
            {
                self.layout.rebuild_inline_context(&mut self.nodes, n);
            } else if self.nodes.get(n).layout == LayoutClass::InlineContainer
                && self.layout.inline_context(n).is_none()
            {
                self.layout.rebuild_inline_context(&mut self.nodes, n);
            }
            cur = self.nodes.next_in_subtree(self.root, n);
        }
    }

    /// Keeps a node's background pane layer in sync with its style. The
    /// node chain is authoritative; the box chain is the render copy.
    fn sync_background_layer(&mut self, n: NodeId) {
        use layout::{LayerContent, LayerKey};
        let background = self.nodes.get(n).style.background;
        let has = self
            .layout
            .node_layer_head(n)
            .map(|head| {
                self.layout
                    .layers
                    .chain_find(layout::LayerChain::Node, Some(head), LayerKey::Background)
                    .is_some()
            })
            .unwrap_or(false);
        if background.a == 0 {
            if has {
                self.layout.replace_node_layer(n, LayerKey::Background, None);
                if let Some(b) = self.layout.primary_box(n) {
                    self.layout.replace_box_layer(b, LayerKey::Background, None);
                }
            }
            return;
        }
        let layer = self.layout.layers.create(
            LayerKey::Background,
            LayerContent::Pane(layout::layers::PaneLayer {
                fill: background,
                border_color: Color::TRANSPARENT,
                border_width: 0.0,
            }),
        );
        self.layout.replace_node_layer(n, LayerKey::Background, Some(layer));
        if let Some(b) = self.layout.primary_box(n) {
            // Second membership: the render copy on the box chain.
            self.layout.replace_box_layer(b, LayerKey::Background, Some(layer));
        }
    }

    /// Rebuilds a view's command list if the document changed since the
    /// view last built it.
    pub fn update_view(&mut self, view: &mut View) {
        self.ensure_updated();
        view.update(&self.nodes, &mut self.layout, self.system.backend(), self.update_clock);
    }

    // ----- geometry queries -------------------------------------------------

    /// Outer rectangle of a node's primary box.
    pub fn node_rectangle(&mut self, node: NodeId) -> Option<Rect> {
        self.ensure_updated();
        let b = self.layout.primary_box(node)?;
        Some(self.layout.boxes.outer_rectangle(b))
    }

    pub fn root_rectangle(&mut self) -> Option<Rect> {
        self.node_rectangle(self.root)
    }

    // ----- messages ---------------------------------------------------------

    pub fn poll_message(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub(crate) fn enqueue(&mut self, message: Message) {
        self.messages.push_back(message);
    }

    // ----- hit testing ------------------------------------------------------

    fn remove_from_hit_chain(&mut self, node: NodeId) {
        if !self.nodes.contains(node)
            || !self.nodes.get(node).flags.contains(NodeFlags::IN_HIT_CHAIN)
        {
            return;
        }
        let (prev, next) = {
            let n = self.nodes.get(node);
            (n.hit_prev, n.hit_next)
        };
        match prev {
            Some(p) => self.nodes.get_mut(p).hit_next = next,
            None => self.hit_chain_head = next,
        }
        match next {
            Some(nx) => self.nodes.get_mut(nx).hit_prev = prev,
            None => self.hit_chain_tail = prev,
        }
        let n = self.nodes.get_mut(node);
        n.hit_prev = None;
        n.hit_next = None;
        n.flags.remove(NodeFlags::IN_HIT_CHAIN);
    }

    fn add_to_hit_chain(&mut self, node: NodeId) {
        if self.nodes.get(node).flags.contains(NodeFlags::IN_HIT_CHAIN) {
            return;
        }
        let old_head = self.hit_chain_head;
        {
            let n = self.nodes.get_mut(node);
            n.hit_prev = None;
            n.hit_next = old_head;
            n.flags.insert(NodeFlags::IN_HIT_CHAIN);
        }
        match old_head {
            Some(h) => self.nodes.get_mut(h).hit_prev = Some(node),
            None => self.hit_chain_tail = Some(node),
        }
        self.hit_chain_head = Some(node);
    }

    /// Sends `Unhit` to every chained node the pointer left this tick.
    fn prune_hit_chain(&mut self) {
        let mut cur = self.hit_chain_head;
        let mut stale = Vec::new();
        while let Some(n) = cur {
            cur = self.nodes.get(n).hit_next;
            if self.nodes.get(n).hit_stamp != self.hit_clock {
                stale.push(n);
            }
        }
        for n in stale {
            self.remove_from_hit_chain(n);
            self.nodes.get_mut(n).flags.remove(NodeFlags::HOVERED);
            self.enqueue(Message::Unhit { node: n });
        }
    }

    /// Depth-sorts the boxes under the pointer and delivers hit messages,
    /// topmost first. Returns the topmost hit node.
    fn process_hits(&mut self, x: f32, y: f32) -> Option<NodeId> {
        self.hit_clock += 1;
        let mut stack = self.layout.grid.query_point(&self.layout.boxes, x, y);
        stack.retain(|&b| {
            self.layout.boxes.get(b).flags.contains(layout::BoxFlags::HIT_TEST)
                && self.layout.boxes.hit_rectangle(b).contains(x, y)
        });
        depth_sort_boxes(&self.layout.boxes, &mut stack);

        let mut hit_node = None;
        for (i, &b) in stack.iter().enumerate().rev() {
            self.layout.boxes.get_mut(b).mouse_hit_stamp = self.hit_clock;
            let Some(address) =
                caret::caret_position(&self.nodes, &mut self.layout, self.system.backend(), b, x)
            else {
                continue;
            };
            let node = caret::node_at_caret(&self.nodes, &self.layout, address);
            let topmost = i + 1 == stack.len();
            if hit_node.is_none() {
                hit_node = Some(node);
            }
            if self.nodes.get(node).hit_stamp != self.hit_clock {
                self.nodes.get_mut(node).hit_stamp = self.hit_clock;
                if topmost {
                    self.nodes.get_mut(node).flags.insert(NodeFlags::HOVERED);
                }
                self.add_to_hit_chain(node);
            }
            self.enqueue(Message::Hit { node, x, y, topmost });
        }
        self.prune_hit_chain();
        hit_node
    }

    // ----- mouse ------------------------------------------------------------

    pub fn mouse_move(&mut self, x: f32, y: f32) {
        self.ensure_updated();
        if self.selection.selecting {
            self.update_mouse_selection(x, y);
            self.hit_clock += 1;
            self.prune_hit_chain();
            return;
        }
        self.process_hits(x, y);
    }

    pub fn mouse_down(&mut self, x: f32, y: f32, button: MouseButton) {
        self.ensure_updated();
        let hit = self.process_hits(x, y);
        self.mouse_down_node = hit;
        if let Some(node) = hit {
            self.nodes.get_mut(node).flags.insert(NodeFlags::ACTIVE);
            self.enqueue(Message::MouseDown { node, x, y, button, topmost: true });
        }
        if button == MouseButton::Left {
            self.begin_mouse_selection(x, y);
        }
    }

    pub fn mouse_up(&mut self, x: f32, y: f32, button: MouseButton) {
        self.ensure_updated();
        // Pair the up with the node that took the down.
        let target = self.mouse_down_node.take();
        if let Some(node) = target {
            if self.nodes.contains(node) {
                self.nodes.get_mut(node).flags.remove(NodeFlags::ACTIVE);
                self.enqueue(Message::MouseUp { node, x, y, button, topmost: true });
                if self.nodes.get(node).node_type == NodeType::Hyperlink {
                    self.enqueue(Message::LinkActivated { node });
                }
            }
        }
        if button == MouseButton::Left && self.selection.selecting {
            self.end_mouse_selection(x, y);
        }
    }

    /// Keyboard input. Ctrl+C copies the selection; everything else is
    /// forwarded to the host as a message.
    pub fn key_down(&mut self, code: u32, ctrl: bool) {
        if ctrl && (code == 'c' as u32 || code == 'C' as u32) {
            self.copy_selection();
            return;
        }
        self.enqueue(Message::KeyDown { code, ctrl });
    }

    // ----- selection --------------------------------------------------------

    fn begin_mouse_selection(&mut self, x: f32, y: f32) {
        self.selection.selecting = true;
        self.selection.down = (x, y);
        self.update_mouse_selection(x, y);
    }

    fn end_mouse_selection(&mut self, x: f32, y: f32) {
        self.update_mouse_selection(x, y);
        self.selection.selecting = false;
    }

    fn update_mouse_selection(&mut self, x1: f32, y1: f32) {
        let Some(root_box) = self.layout.primary_box(self.root) else { return };
        let (x0, y0) = self.selection.down;
        let changed = crate::selection::update_mouse_selection(
            &mut self.selection,
            &self.nodes,
            &mut self.layout,
            self.system.backend(),
            root_box,
            (x0, y0),
            (x1, y1),
        );
        if changed {
            self.change_clock += 1;
            self.enqueue(Message::SelectionChanged);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear(&mut self.layout);
        self.change_clock += 1;
    }

    pub fn selection_start(&self) -> Option<CaretAddress> {
        self.selection.start
    }

    pub fn selection_end(&self) -> Option<CaretAddress> {
        self.selection.end
    }

    /// The selected text across every container the selection touches.
    pub fn selected_text(&mut self) -> String {
        self.ensure_updated();
        self.selection.read_text(&self.nodes, &self.layout)
    }

    /// Copies the selected text to the platform clipboard.
    pub fn copy_selection(&mut self) {
        let text = self.selected_text();
        if !text.is_empty() {
            log::debug!("{} bytes copied to the clipboard", text.len());
            self.system.backend_mut().copy_to_clipboard(text.as_bytes());
        }
    }

    // ----- selectors --------------------------------------------------------

    /// True if `node` matches the last clause of `selector` with every
    /// earlier clause matched by some ancestor chain, in order.
    pub fn node_matches(&self, node: NodeId, selector: &Selector) -> bool {
        fn atom_matches(doc: &Document, node: NodeId, atom: &style::SelectorAtom) -> bool {
            let n = doc.nodes.get(node);
            if let Some(tag) = &atom.tag {
                if **tag != *n.node_type.tag_name() {
                    return false;
                }
            }
            if let Some(class) = &atom.class {
                if !n.classes.iter().any(|c| c == class) {
                    return false;
                }
            }
            match atom.pseudo {
                Some(Pseudo::Active) => n.flags.contains(NodeFlags::ACTIVE),
                Some(Pseudo::Highlighted) => {
                    n.flags.intersects(NodeFlags::HIGHLIGHTED | NodeFlags::HOVERED)
                }
                None => true,
            }
        }

        fn clause_matches(doc: &Document, node: NodeId, clause: &style::selectors::SelectorClause) -> bool {
            clause.alternatives.iter().any(|a| atom_matches(doc, node, a))
        }

        let Some(last) = selector.clauses.last() else { return false };
        if !clause_matches(self, node, last) {
            return false;
        }
        // Remaining clauses must match ancestors, nearest-last.
        let mut clause_index = selector.clauses.len().wrapping_sub(2);
        let mut cur = self.nodes.get(node).parent;
        while clause_index != usize::MAX {
            let clause = &selector.clauses[clause_index];
            let mut found = false;
            while let Some(n) = cur {
                cur = self.nodes.get(n).parent;
                if clause_matches(self, n, clause) {
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
            clause_index = clause_index.wrapping_sub(1);
        }
        true
    }

    /// All nodes in the document matching `selector`, in document order.
    pub fn match_nodes(&self, selector: &Selector) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(self.root);
        while let Some(n) = cur {
            if self.node_matches(n, selector) {
                out.push(n);
            }
            cur = self.nodes.next_in_subtree(self.root, n);
        }
        out
    }

}
