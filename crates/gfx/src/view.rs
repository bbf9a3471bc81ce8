//! A view: a document-space window that renders to a draw-command list.
//!
//! Updating a view queries the grid for visible boxes, demand-creates their
//! text and selection layers, emits one command header per layer, sorts the
//! headers by `(depth + layer offset) << 3 | layer key` ascending (deepest
//! first), then rewrites the sorted stream into final commands: lazy
//! `SetClip`s with a small ring memory, and runs of text layers coalesced
//! into batched [`TextRun`]s whose fragments share font, clip ancestor and
//! baseline row.
//!
//! The command list is rebuilt from scratch each update; partial lists are
//! never observed.

use bitflags::bitflags;
use dom::NodeArena;
use layout::inline::synthesis::{require_selection_layer, update_box_text_layer};
use layout::inline::{InlineContext, ParagraphIterator};
use layout::{
    Axis, BoxFlags, BoxId, LayerChain, LayerContent, LayerId, LayerKey, LayoutTree, Rect, SizeSlot,
};
use platform::{Backend, FontId};
use style::TextStyle;
use style::values::Color;

use crate::command::{DrawCommand, TextRun};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ViewFlags: u8 {
        /// Outline every visible box with a hairline rectangle.
        const DEBUG_OUTLINES = 1 << 0;
    }
}

const KEY_LAYER_BITS: u32 = 3;
const CLIP_MEMORY_SIZE: usize = 4;

#[derive(Clone, Copy)]
struct Header {
    key: u32,
    seq: u32,
    kind: HeaderKind,
}

#[derive(Clone, Copy)]
enum HeaderKind {
    Layer { b: BoxId, layer: LayerId },
    Outline { b: BoxId },
}

pub struct View {
    pub bounds: Rect,
    pub flags: ViewFlags,
    /// Colour used for selected text in place of the styled colour.
    pub selected_text_color: Color,
    commands: Vec<DrawCommand>,
    visible: Vec<BoxId>,
}

impl View {
    pub fn new(bounds: Rect) -> View {
        View {
            bounds,
            flags: ViewFlags::empty(),
            selected_text_color: Color::WHITE,
            commands: Vec::new(),
            visible: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Rebuilds the command list for the current document state.
    pub fn update(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        update_clock: u32,
    ) {
        // Visible set.
        self.visible = lt.grid.query_rect(&lt.boxes, self.bounds, true);
        // Keep the emitted order deterministic regardless of grid hashing.
        let visible = std::mem::take(&mut self.visible);
        let mut visible = visible;
        layout::depth_sort_boxes(&lt.boxes, &mut visible);
        self.visible = visible;

        // Mark visibility and demand-create text/selection layers.
        for &b in &self.visible {
            lt.boxes.get_mut(b).visibility_stamp = update_clock;
            if lt.boxes.get(b).flags.contains(BoxFlags::IS_TEXT_BOX) {
                update_box_text_layer(nodes, lt, backend, b);
                require_selection_layer(nodes, lt, backend, b);
            }
        }

        // One header per layer. The three key bits order layers within one
        // depth: background, selection, content, text.
        let mut headers: Vec<Header> = Vec::new();
        for &b in &self.visible {
            let base_depth = lt.boxes.get(b).depth as i32;
            let head = lt.boxes.get(b).layers;
            for layer in lt.layers.chain_iter(LayerChain::Box, head) {
                let l = lt.layers.get(layer);
                let key = make_command_key(base_depth + l.depth_offset as i32, l.key);
                headers.push(Header {
                    key,
                    seq: headers.len() as u32,
                    kind: HeaderKind::Layer { b, layer },
                });
            }
            if self.flags.contains(ViewFlags::DEBUG_OUTLINES) {
                headers.push(Header {
                    key: make_command_key(base_depth, LayerKey::Text) + (1 << KEY_LAYER_BITS),
                    seq: headers.len() as u32,
                    kind: HeaderKind::Outline { b },
                });
            }
        }

        radix_sort_headers(&mut headers);
        self.emit(nodes, lt, backend, &headers);
    }

    fn emit(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        headers: &[Header],
    ) {
        self.commands.clear();
        let mut clip = ClipMemory::new(self.bounds);
        let mut text_run_start: Option<usize> = None;

        for (i, header) in headers.iter().enumerate() {
            let is_text_layer = match header.kind {
                HeaderKind::Layer { layer, .. } => {
                    matches!(lt.layers.get(layer).content, LayerContent::Text(_))
                }
                HeaderKind::Outline { .. } => false,
            };
            if is_text_layer {
                if text_run_start.is_none() {
                    text_run_start = Some(i);
                }
                continue;
            }
            if let Some(start) = text_run_start.take() {
                self.combine_text_layers(nodes, lt, backend, &headers[start..i], &mut clip);
            }
            self.emit_plain(lt, backend, header, &mut clip);
        }
        if let Some(start) = text_run_start.take() {
            self.combine_text_layers(nodes, lt, backend, &headers[start..], &mut clip);
        }
        self.commands.push(DrawCommand::End);
        log::trace!("view rebuilt: {} commands", self.commands.len());
    }

    fn emit_plain(
        &mut self,
        lt: &LayoutTree,
        backend: &dyn Backend,
        header: &Header,
        clip: &mut ClipMemory,
    ) {
        match header.kind {
            HeaderKind::Layer { b, layer } => {
                let box_clip = lt.boxes.get(b).clip;
                match &lt.layers.get(layer).content {
                    LayerContent::Pane(p) => {
                        clip.set(&mut self.commands, box_clip);
                        self.commands.push(DrawCommand::Rectangle {
                            bounds: lt.boxes.padding_rectangle(b),
                            fill: p.fill,
                            border_color: p.border_color,
                            border_width: p.border_width,
                        });
                    }
                    LayerContent::Image(img) => {
                        // An image that is still loading draws nothing.
                        if backend.query_network_image(img.image).is_none() {
                            return;
                        }
                        clip.set(&mut self.commands, box_clip);
                        self.commands.push(DrawCommand::Image {
                            bounds: lt.boxes.content_rectangle(b),
                            image: img.image,
                            tint: img.tint,
                        });
                    }
                    LayerContent::Selection { x0, x1 } => {
                        clip.set(&mut self.commands, box_clip);
                        let content = lt.boxes.content_rectangle(b);
                        self.commands.push(DrawCommand::Rectangle {
                            bounds: Rect {
                                x0: content.x0 + x0,
                                x1: content.x0 + x1,
                                y0: content.y0,
                                y1: content.y1,
                            },
                            fill: Color::rgba(120, 150, 220, 128),
                            border_color: Color::TRANSPARENT,
                            border_width: 0.0,
                        });
                    }
                    LayerContent::Text(_) => unreachable!("text layers batch separately"),
                }
            }
            HeaderKind::Outline { b } => {
                clip.set(&mut self.commands, Rect::INFINITE);
                self.commands.push(DrawCommand::Rectangle {
                    bounds: lt.boxes.outer_rectangle(b),
                    fill: Color::TRANSPARENT,
                    border_color: Color::rgb(255, 0, 255),
                    border_width: 1.0,
                });
            }
        }
    }

    /// Converts a run of text-layer headers into batched text commands.
    fn combine_text_layers(
        &mut self,
        nodes: &NodeArena,
        lt: &LayoutTree,
        backend: &dyn Backend,
        headers: &[Header],
        clip: &mut ClipMemory,
    ) {
        let _ = backend;
        let mut fragments: Vec<Fragment> = Vec::new();
        for header in headers {
            let HeaderKind::Layer { b, layer } = header.kind else { continue };
            let LayerContent::Text(t) = &lt.layers.get(layer).content else { continue };
            let Some(icx) = lt.inline_context(t.container) else { continue };
            build_fragments(nodes, lt, icx, b, layer, t.container, &mut fragments);
        }

        // Cluster compatible fragments: same font, same clip ancestor, same
        // baseline row.
        fragments.sort_by_key(|f| f.cluster_key(lt));

        let mut i = 0;
        while i < fragments.len() {
            let mut j = i + 1;
            while j < fragments.len()
                && fragments[j].cluster_key(lt) == fragments[i].cluster_key(lt)
            {
                j += 1;
            }
            self.emit_text_cluster(lt, &fragments[i..j], clip);
            i = j;
        }
    }

    fn emit_text_cluster(&mut self, lt: &LayoutTree, fragments: &[Fragment], clip: &mut ClipMemory) {
        let first = &fragments[0];
        clip.set(&mut self.commands, lt.boxes.get(first.b).clip);

        let mut run = TextRun {
            font_id: first.style.font_id,
            text: String::new(),
            x_positions: Vec::new(),
            line_y: lt.boxes.content_edge_lower(first.b, Axis::Vertical).round() as i32,
            palette: Vec::new(),
            run_counts: Vec::new(),
        };

        let mut current_color: Option<Color> = None;
        for f in fragments {
            let LayerContent::Text(t) = &lt.layers.get(f.layer).content else { continue };
            run.text.push_str(&t.text[f.text_start..f.text_end]);
            let offset_x = lt.boxes.get(f.b).axis_ref(Axis::Horizontal).pos.round() as i32;
            for k in f.start..f.end {
                run.x_positions.push(offset_x + t.x_positions[k]);
            }
            let color = if f.selected {
                self.selected_text_color
            } else {
                f.style.color.blend(f.style.tint)
            };
            if current_color != Some(color) {
                run.palette.push(color);
                run.run_counts.push((0, 0));
                current_color = Some(color);
            }
            let counts = run.run_counts.last_mut().unwrap();
            counts.0 += (f.end - f.start) as u32;
            counts.1 += (f.text_end - f.text_start) as u32;
        }
        self.commands.push(DrawCommand::Text(run));
    }
}

/// One styled, selection-uniform run within a text box's layer.
struct Fragment {
    b: BoxId,
    layer: LayerId,
    /// Character range relative to the layer.
    start: usize,
    end: usize,
    /// Byte range into the layer's text.
    text_start: usize,
    text_end: usize,
    style: TextStyle,
    selected: bool,
}

impl Fragment {
    fn cluster_key(&self, lt: &LayoutTree) -> (FontId, Option<BoxId>, i32) {
        (
            self.style.font_id,
            lt.boxes.get(self.b).clip_ancestor,
            lt.boxes.content_edge_lower(self.b, Axis::Vertical).round() as i32,
        )
    }
}

fn build_fragments(
    nodes: &NodeArena,
    lt: &LayoutTree,
    icx: &InlineContext,
    b: BoxId,
    layer: LayerId,
    container: dom::NodeId,
    out: &mut Vec<Fragment>,
) {
    let owner = lt.boxes.get(b).owner;
    let LayerContent::Text(t) = &lt.layers.get(layer).content else { return };
    let mut ei = ParagraphIterator::over_range(nodes, container, owner, t.start, t.end);
    let mut n = ei.next_fragment(nodes, icx);
    while n != 0 {
        out.push(Fragment {
            b,
            layer,
            start: ei.offset - t.start,
            end: ei.offset + ei.count - t.start,
            text_start: ei.text_start,
            text_end: ei.text_end,
            style: ei.style(nodes),
            selected: ei.fragment_selected(icx),
        });
        n = ei.next_fragment(nodes, icx);
    }
}

fn make_command_key(depth: i32, key: LayerKey) -> u32 {
    let depth = depth.max(0) as u32;
    (depth << KEY_LAYER_BITS) | key as u32
}

/// Stable LSD radix sort over the 32-bit command key.
fn radix_sort_headers(headers: &mut Vec<Header>) {
    let mut scratch: Vec<Header> = headers.clone();
    for pass in 0..4 {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for h in headers.iter() {
            counts[((h.key >> shift) & 0xff) as usize] += 1;
        }
        let mut sum = 0;
        for c in counts.iter_mut() {
            let n = *c;
            *c = sum;
            sum += n;
        }
        for h in headers.iter() {
            let bucket = ((h.key >> shift) & 0xff) as usize;
            scratch[counts[bucket]] = *h;
            counts[bucket] += 1;
        }
        std::mem::swap(headers, &mut scratch);
    }
}

/// Remembers the last few clip rectangles so repeated requests for the same
/// clip emit nothing.
struct ClipMemory {
    bounds: Rect,
    ring: Vec<(Rect, Rect)>,
    current: Option<Rect>,
}

impl ClipMemory {
    fn new(bounds: Rect) -> ClipMemory {
        ClipMemory { bounds, ring: Vec::with_capacity(CLIP_MEMORY_SIZE), current: None }
    }

    fn set(&mut self, out: &mut Vec<DrawCommand>, requested: Rect) {
        if self.current == Some(requested) {
            return;
        }
        let clipped = match self.ring.iter().find(|(req, _)| *req == requested) {
            Some((_, clipped)) => *clipped,
            None => {
                let clipped = self.bounds.intersect(&requested);
                if self.ring.len() == CLIP_MEMORY_SIZE {
                    self.ring.remove(0);
                }
                self.ring.push((requested, clipped));
                clipped
            }
        };
        self.current = Some(requested);
        out.push(DrawCommand::SetClip { rect: clipped });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_sort_is_stable_and_ordered() {
        let mk = |key, seq| Header { key, seq, kind: HeaderKind::Outline { b: dummy_box() } };
        let mut headers = vec![mk(300, 0), mk(5, 1), mk(300, 2), mk(1 << 20, 3), mk(0, 4)];
        radix_sort_headers(&mut headers);
        let keys: Vec<u32> = headers.iter().map(|h| h.key).collect();
        assert_eq!(keys, vec![0, 5, 300, 300, 1 << 20]);
        // Equal keys keep their original order.
        assert_eq!(headers[2].seq, 0);
        assert_eq!(headers[3].seq, 2);
    }

    fn dummy_box() -> BoxId {
        let mut arena = layout::BoxArena::new();
        arena.create(None)
    }

    #[test]
    fn clip_memory_suppresses_repeats() {
        let mut out = Vec::new();
        let mut clip = ClipMemory::new(Rect::new(0.0, 100.0, 0.0, 100.0));
        let a = Rect::new(0.0, 50.0, 0.0, 50.0);
        let b = Rect::new(10.0, 60.0, 0.0, 50.0);
        clip.set(&mut out, a);
        clip.set(&mut out, a);
        clip.set(&mut out, b);
        clip.set(&mut out, a);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0], DrawCommand::SetClip { .. }));
    }
}
