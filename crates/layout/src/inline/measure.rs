//! Incremental measurement of paragraph element advances.
//!
//! Walks measurement groups, encodes each as UTF-8 with synthetic spaces at
//! word ends, hands the run to the back-end measurer and copies the
//! advances back onto the elements. Inline objects take their advance from
//! their box's intrinsic width instead.

use dom::{NodeArena, NodeId};
use platform::Backend;

use crate::fixed::TextFixed;
use crate::inline::context::encode_elements;
use crate::inline::iter::ParagraphIterator;
use crate::sizing::Budget;
use crate::{LayoutTree, SizeSlot};
use style::Axis;

pub struct MeasureState {
    ei: ParagraphIterator,
    container: NodeId,
    /// Scratch for encoded text and returned advances, reused per group.
    buffer: String,
    advances: Vec<i32>,
}

impl MeasureState {
    pub fn begin(nodes: &NodeArena, lt: &mut LayoutTree, container: NodeId) -> MeasureState {
        let icx = lt.inline_context(container).expect("container has no inline context");
        let mut ei = ParagraphIterator::over_container(nodes, icx, container);
        let first_object = ei.next_measurement_group(nodes, icx);
        let mut s = MeasureState { ei, container, buffer: String::new(), advances: Vec::new() };
        s.resolve_objects(nodes, lt, first_object);
        s
    }

    /// Copies intrinsic widths into inline-object elements until the group
    /// is closed.
    fn resolve_objects(&mut self, nodes: &NodeArena, lt: &mut LayoutTree, first: Option<usize>) {
        let mut pending = first;
        while let Some(index) = pending {
            let advance = match self.ei.next_child.and_then(|n| lt.primary_box(n)) {
                Some(b) if lt.boxes.size_valid(b, SizeSlot::Intrinsic, Axis::Horizontal) => {
                    TextFixed::from_f32(lt.boxes.get_size(b, SizeSlot::Intrinsic, Axis::Horizontal))
                }
                _ => TextFixed::ZERO,
            };
            let icx = lt.inline_context_mut(self.container).expect("inline context");
            icx.elements[index].advance = advance;
            let icx = lt.inline_context(self.container).expect("inline context");
            pending = self.ei.expand_measurement_group(nodes, icx);
        }
    }

    /// Measures one group per iteration until done or out of budget.
    /// Returns true when every element has a current advance.
    pub fn update(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
    ) -> bool {
        while self.ei.in_progress() {
            if budget.expired(backend) {
                return false;
            }
            let (offset, count) = (self.ei.offset, self.ei.count);
            let font_id = self.ei.style(nodes).font_id;
            {
                let icx = lt.inline_context(self.container).expect("inline context");
                let (text, _chars) = encode_elements(&icx.elements[offset..offset + count], true);
                self.buffer = text;
            }
            self.advances.clear();
            backend.measure_text(font_id, &self.buffer, &mut self.advances);
            let num_characters = self.advances.len();

            {
                let icx = lt.inline_context_mut(self.container).expect("inline context");
                let mut j = 0;
                for i in 0..count {
                    let e = &mut icx.elements[offset + i];
                    if e.is_inline_object() {
                        continue;
                    }
                    e.advance = TextFixed(self.advances.get(j).copied().unwrap_or(0));
                    j += 1;
                    // Skip the synthetic space's advance after a word end.
                    if e.is_word_end() && j != num_characters {
                        j += 1;
                    }
                }
            }

            let next_object = {
                let icx = lt.inline_context(self.container).expect("inline context");
                self.ei.next_measurement_group(nodes, icx)
            };
            self.resolve_objects(nodes, lt, next_object);
        }
        true
    }
}
