//! Visual layers: the drawable content attached to nodes and boxes.
//!
//! A layer has two list memberships: the owning node's chain is the
//! authoritative stack, the box chain is the render-time copy views walk.
//! The two membership bits act as the reference count; a layer is freed
//! when it is on neither chain.

use dom::NodeId;
use platform::{FontId, ImageHandle};
use std::num::NonZeroU32;
use style::values::Color;

use crate::fixed::TextFixed;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(NonZeroU32);

impl LayerId {
    fn new(index: usize) -> LayerId {
        LayerId(NonZeroU32::new(index as u32 + 1).unwrap())
    }

    fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// Sort key within one depth: background panes draw first, text last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKey {
    Background = 0,
    Selection = 1,
    Content = 2,
    Text = 3,
}

/// Which chain an operation works on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerChain {
    Node = 0,
    Box = 1,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PaneLayer {
    pub fill: Color,
    pub border_color: Color,
    pub border_width: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageLayer {
    pub image: ImageHandle,
    pub tint: Color,
    /// Natural size last reported by the back end, if any.
    pub natural_size: Option<(u32, u32)>,
}

/// Positioned characters for one text box. Character `i` of `text` starts
/// at `x_positions[i]` px from the box's content left edge; there are no
/// space glyphs, word gaps appear as position jumps.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayer {
    pub container: NodeId,
    /// Element range of the owning text box when the layer was built.
    pub start: usize,
    pub end: usize,
    pub font_id: FontId,
    pub adjustment_ratio: TextFixed,
    pub text: String,
    pub x_positions: Vec<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerContent {
    Pane(PaneLayer),
    Image(ImageLayer),
    Text(TextLayer),
    /// Selection highlight over `[x0, x1)` px of the owning text box.
    Selection { x0: f32, x1: f32 },
}

pub struct VisualLayer {
    pub key: LayerKey,
    pub depth_offset: i16,
    pub content: LayerContent,
    pub next: [Option<LayerId>; 2],
    in_chain: [bool; 2],
}

#[derive(Default)]
pub struct LayerStore {
    slots: Vec<Option<VisualLayer>>,
    free: Vec<u32>,
}

impl LayerStore {
    pub fn new() -> LayerStore {
        LayerStore::default()
    }

    pub fn create(&mut self, key: LayerKey, content: LayerContent) -> LayerId {
        let layer = VisualLayer {
            key,
            depth_offset: 0,
            content,
            next: [None, None],
            in_chain: [false, false],
        };
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(layer);
                LayerId::new(i as usize)
            }
            None => {
                self.slots.push(Some(layer));
                LayerId::new(self.slots.len() - 1)
            }
        }
    }

    #[track_caller]
    pub fn get(&self, id: LayerId) -> &VisualLayer {
        self.slots[id.index()].as_ref().expect("stale LayerId")
    }

    #[track_caller]
    pub fn get_mut(&mut self, id: LayerId) -> &mut VisualLayer {
        self.slots[id.index()].as_mut().expect("stale LayerId")
    }

    fn maybe_free(&mut self, id: LayerId) {
        let l = self.get(id);
        if !l.in_chain[0] && !l.in_chain[1] {
            self.slots[id.index()] = None;
            self.free.push(id.index() as u32);
        }
    }

    /// Finds the first layer with `key` in the chain starting at `head`.
    pub fn chain_find(&self, chain: LayerChain, head: Option<LayerId>, key: LayerKey) -> Option<LayerId> {
        let mut cur = head;
        while let Some(id) = cur {
            let l = self.get(id);
            if l.key == key {
                return Some(id);
            }
            cur = l.next[chain as usize];
        }
        None
    }

    /// Replaces the first layer with `key` in the chain by `replacement`
    /// (or removes it when `replacement` is `None`). Returns the layer that
    /// was removed, already released from this chain (and freed if that was
    /// its last membership).
    pub fn chain_replace(
        &mut self,
        chain: LayerChain,
        head: &mut Option<LayerId>,
        key: LayerKey,
        replacement: Option<LayerId>,
    ) -> Option<LayerId> {
        let c = chain as usize;
        // Unlink the old layer with this key, if any.
        let mut prev: Option<LayerId> = None;
        let mut cur = *head;
        let mut removed = None;
        while let Some(id) = cur {
            let next = self.get(id).next[c];
            if self.get(id).key == key {
                match prev {
                    Some(p) => self.get_mut(p).next[c] = next,
                    None => *head = next,
                }
                let l = self.get_mut(id);
                l.next[c] = None;
                l.in_chain[c] = false;
                removed = Some(id);
                break;
            }
            prev = Some(id);
            cur = next;
        }
        // Link the replacement at the head.
        if let Some(id) = replacement {
            debug_assert!(!self.get(id).in_chain[c]);
            let old_head = *head;
            let l = self.get_mut(id);
            l.next[c] = old_head;
            l.in_chain[c] = true;
            *head = Some(id);
        }
        if let Some(id) = removed {
            self.maybe_free(id);
        }
        removed
    }

    /// Releases every layer on a chain (box destruction, node destruction).
    pub fn release_chain(&mut self, chain: LayerChain, head: &mut Option<LayerId>) {
        let c = chain as usize;
        let mut cur = head.take();
        while let Some(id) = cur {
            cur = self.get(id).next[c];
            let l = self.get_mut(id);
            l.next[c] = None;
            l.in_chain[c] = false;
            self.maybe_free(id);
        }
    }

    pub fn chain_iter<'a>(&'a self, chain: LayerChain, head: Option<LayerId>) -> ChainIter<'a> {
        ChainIter { store: self, chain, cur: head }
    }
}

pub struct ChainIter<'a> {
    store: &'a LayerStore,
    chain: LayerChain,
    cur: Option<LayerId>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = LayerId;

    fn next(&mut self) -> Option<LayerId> {
        let id = self.cur?;
        self.cur = self.store.get(id).next[self.chain as usize];
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane() -> LayerContent {
        LayerContent::Pane(PaneLayer {
            fill: Color::rgb(1, 2, 3),
            border_color: Color::TRANSPARENT,
            border_width: 0.0,
        })
    }

    #[test]
    fn replace_swaps_by_key() {
        let mut store = LayerStore::new();
        let mut head = None;
        let a = store.create(LayerKey::Background, pane());
        let b = store.create(LayerKey::Background, pane());
        store.chain_replace(LayerChain::Box, &mut head, LayerKey::Background, Some(a));
        assert_eq!(head, Some(a));
        let removed = store.chain_replace(LayerChain::Box, &mut head, LayerKey::Background, Some(b));
        assert_eq!(removed, Some(a));
        assert_eq!(head, Some(b));
        // `a` left its only chain and was freed; its slot is reusable.
        let c = store.create(LayerKey::Text, pane());
        assert_eq!(c, a);
    }

    #[test]
    fn layer_lives_while_on_either_chain() {
        let mut store = LayerStore::new();
        let mut node_head = None;
        let mut box_head = None;
        let l = store.create(LayerKey::Content, pane());
        store.chain_replace(LayerChain::Node, &mut node_head, LayerKey::Content, Some(l));
        store.chain_replace(LayerChain::Box, &mut box_head, LayerKey::Content, Some(l));
        store.release_chain(LayerChain::Box, &mut box_head);
        // Still reachable through the node chain.
        assert_eq!(store.chain_find(LayerChain::Node, node_head, LayerKey::Content), Some(l));
        store.release_chain(LayerChain::Node, &mut node_head);
        let again = store.create(LayerKey::Content, pane());
        assert_eq!(again, l);
    }
}
