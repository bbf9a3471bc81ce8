//! Incremental optimal-fit line breaking.
//!
//! A restricted Knuth–Plass: the set of active candidate line starts is
//! bounded (16), which keeps each element O(1) while producing optimal
//! breaks for all practical paragraphs. The breaker runs incrementally —
//! `update` consumes elements until it finishes or the budget expires, and
//! resumes exactly where it stopped on the next call.
//!
//! All width arithmetic is in text-metric fixed point. Badness approximates
//! `100·r³` for the adjustment ratio `r`, saturating near 10,000 at
//! `r ≈ 4.64`; demerits are `(1 + badness)² + sign(penalty)·penalty²`.

use dom::{NodeArena, NodeId};
use platform::{Backend, FontMetrics};
use smallvec::SmallVec;

use crate::fixed::{TextFixed, adjust_glue};
use crate::inline::context::{
    InlineContext, LineList, PENALTIES, ParagraphElement, ParagraphLine, PenaltyType,
};
use crate::inline::{inline_first_nonempty, inline_next_nonempty};
use crate::sizing::Budget;
use crate::{LayoutTree, SizeSlot};
use style::{Axis, Justification};

pub const MAX_ACTIVE_BREAKPOINTS: usize = 16;
pub const INFINITE_BADNESS: i32 = 10_000;
const INFINITE_DEMERITS: i64 = i64::MAX / 4;

/// Line width treated as unbounded (the ideal break).
pub const INFINITE_LINE_WIDTH: i32 = -1;

/// A committed candidate break position.
#[derive(Clone, Copy, Debug)]
struct Breakpoint {
    /// Element index the line ends at.
    b: usize,
    predecessor: i32,
    total_demerits: i64,
    /// Unscaled width of the line ending here, for the chosen predecessor.
    width: TextFixed,
    /// Stretch (under-full) or shrink (over-full) total for that line.
    stretch_or_shrink: TextFixed,
    height: TextFixed,
    /// Last-line rule: the line is never expanded to flush.
    unscaled: bool,
}

/// A breakpoint still eligible to start the current line.
#[derive(Clone, Copy, Debug)]
struct ActiveBreakpoint {
    offset: usize,
    width: TextFixed,
    stretch: TextFixed,
    shrink: TextFixed,
    height: TextFixed,
    unscaled: bool,
}

pub struct BreakState {
    container: NodeId,
    max_width: TextFixed,
    num_elements: usize,
    position: usize,

    breakpoints: Vec<Breakpoint>,
    active: SmallVec<[ActiveBreakpoint; MAX_ACTIVE_BREAKPOINTS]>,

    trailing_space: TextFixed,
    trailing_stretch: TextFixed,
    trailing_shrink: TextFixed,

    element: ParagraphElement,
    next_element: ParagraphElement,
    node: Option<NodeId>,
    next_node: Option<NodeId>,
    metrics: FontMetrics,
    next_metrics: FontMetrics,
    height: TextFixed,
    next_height: TextFixed,
}

const ZERO_METRICS: FontMetrics = FontMetrics {
    height: 0,
    em_width: 0,
    space_width: 0,
    space_stretch: 0,
    space_shrink: 0,
    paragraph_indent_width: 0,
};

impl BreakState {
    pub fn begin(
        nodes: &NodeArena,
        lt: &LayoutTree,
        backend: &dyn Backend,
        container: NodeId,
        line_width_px: i32,
    ) -> BreakState {
        let icx = lt.inline_context(container).expect("container has no inline context");

        // Negative widths count as infinity. Even then the result is not
        // necessarily one line: forced breaks still apply.
        let line_width_px = if line_width_px < 0 { 10_000 } else { line_width_px };

        let mut s = BreakState {
            container,
            max_width: TextFixed::from_px(line_width_px),
            num_elements: icx.elements.len(),
            position: 0,
            breakpoints: Vec::with_capacity(icx.elements.len() + 1),
            active: SmallVec::new(),
            trailing_space: TextFixed::ZERO,
            trailing_stretch: TextFixed::ZERO,
            trailing_shrink: TextFixed::ZERO,
            element: ParagraphElement::default(),
            next_element: ParagraphElement::default(),
            node: None,
            next_node: None,
            metrics: ZERO_METRICS,
            next_metrics: ZERO_METRICS,
            height: TextFixed::ZERO,
            next_height: TextFixed::ZERO,
        };

        // One breakpoint before the first element seeds the search.
        s.breakpoints.push(Breakpoint {
            b: 0,
            predecessor: -1,
            total_demerits: 0,
            width: TextFixed::ZERO,
            stretch_or_shrink: TextFixed::ZERO,
            height: TextFixed::ZERO,
            unscaled: false,
        });
        s.active.push(ActiveBreakpoint {
            offset: 0,
            width: TextFixed::ZERO,
            stretch: TextFixed::ZERO,
            shrink: TextFixed::ZERO,
            height: TextFixed::ZERO,
            unscaled: false,
        });

        if s.num_elements != 0 {
            s.next_element = icx.elements[0];
            s.next_node = inline_first_nonempty(nodes, container);
            s.update_metrics(nodes, lt, backend);
        }
        s
    }

    fn update_metrics(&mut self, nodes: &NodeArena, lt: &LayoutTree, backend: &dyn Backend) {
        let Some(next) = self.next_node else { return };
        self.next_metrics = backend.font_metrics(nodes.get(next).style.text.font_id);
        if self.next_element.is_inline_object() {
            self.next_height = match lt.primary_box(next) {
                Some(b) if lt.boxes.size_valid(b, SizeSlot::Intrinsic, Axis::Vertical) => {
                    TextFixed::from_f32(lt.boxes.get_size(b, SizeSlot::Intrinsic, Axis::Vertical))
                }
                _ => TextFixed::ZERO,
            };
        } else {
            self.next_height = TextFixed(self.next_metrics.height);
        }
    }

    fn maybe_update_metrics(&mut self, nodes: &NodeArena, lt: &LayoutTree, backend: &dyn Backend) {
        // Nothing to do while the next element comes from the same node.
        if !self.next_element.is_node_first() {
            return;
        }
        let node = match self.node {
            Some(n) => n,
            None => {
                self.next_node = inline_first_nonempty(nodes, self.container);
                self.update_metrics(nodes, lt, backend);
                return;
            }
        };
        self.next_node = inline_next_nonempty(nodes, self.container, node);
        let same_font = match self.next_node {
            Some(nn) => nodes
                .get(node)
                .style
                .text
                .measurement_compatible(&nodes.get(nn).style.text),
            None => false,
        };
        if same_font && !self.element.is_inline_object() && !self.next_element.is_inline_object() {
            return;
        }
        self.update_metrics(nodes, lt, backend);
    }

    fn step_element(
        &mut self,
        nodes: &NodeArena,
        lt: &LayoutTree,
        backend: &dyn Backend,
        icx: &InlineContext,
    ) -> bool {
        if self.position == self.num_elements {
            return false;
        }
        self.element = self.next_element;
        self.metrics = self.next_metrics;
        self.height = self.next_height;
        self.node = self.next_node;
        self.position += 1;
        if self.position != self.num_elements {
            self.next_element = icx.elements[self.position];
            self.maybe_update_metrics(nodes, lt, backend);
        }
        true
    }

    /// Approximates badness `100·r³`, scaled so `badness(max r) ≈ 10,000`.
    fn calculate_badness(&self, ab: &ActiveBreakpoint) -> i32 {
        let slack = self.max_width - ab.width;
        if slack.0 == 0 || ab.unscaled {
            return 0; // A perfect fit.
        }

        // Too long: consume shrink. Too short: consume stretch.
        let stretch_or_shrink = if slack.0 < 0 { ab.shrink } else { ab.stretch };

        // r is scaled so r_scaled³ stays inside 31 bits at the largest r of
        // interest, max_r ≈ (10,000 / 100)^⅓ ≈ 4.64.
        let r_scaled;
        let denom = stretch_or_shrink.round_px();
        if denom != 0 {
            r_scaled = 277 * slack.round_px() / denom;
        } else {
            let width_px = ab.width.round_px();
            if slack.0 >= 0 && width_px != 0 {
                // No stretch at all is very bad, but rigid lines still order
                // among themselves by how short they fall.
                let limit_px = self.max_width.round_px();
                r_scaled = 800 + 105 * limit_px / width_px;
            } else {
                return INFINITE_BADNESS;
            }
        }
        if r_scaled > 1290 {
            return INFINITE_BADNESS;
        }
        r_scaled * r_scaled * r_scaled / 214_668
    }

    fn calculate_demerits(e: &ParagraphElement, badness: i32) -> i64 {
        let d = 1 + badness as i64;
        let demerits =
            if d.abs() >= INFINITE_BADNESS as i64 { INFINITE_DEMERITS } else { d * d };
        let penalty = PENALTIES[e.penalty as usize] as i64;
        demerits + penalty.abs() * penalty
    }

    /// Scores a break after the current element against every active
    /// candidate; commits the best. Returns false if no candidate exists.
    fn build_breakpoint(&mut self, e: ParagraphElement, position: usize) -> bool {
        let mut b = Breakpoint {
            b: position,
            predecessor: -1,
            total_demerits: i64::MAX,
            width: TextFixed::ZERO,
            stretch_or_shrink: TextFixed::ZERO,
            height: TextFixed::ZERO,
            unscaled: false,
        };
        for (j, ab) in self.active.iter().enumerate() {
            let badness = self.calculate_badness(ab);
            let demerits = Self::calculate_demerits(&e, badness);
            let a = &self.breakpoints[ab.offset];
            let total = a.total_demerits.saturating_add(demerits);
            if total < b.total_demerits || (e.penalty == PenaltyType::ForceBreak && j == 0) {
                b.predecessor = ab.offset as i32;
                b.unscaled = ab.unscaled;
                b.stretch_or_shrink =
                    if self.max_width > ab.width { ab.stretch } else { ab.shrink };
                b.width = ab.width;
                b.height = ab.height;
                b.total_demerits = total;
            }
        }

        let mut have_breakpoint = b.total_demerits != i64::MAX;
        if e.penalty == PenaltyType::ForceBreak {
            // An empty active set still honours the forced break with an
            // empty line.
            if !have_breakpoint {
                b = self.breakpoints[0];
                b.b = position;
                b.predecessor = 0;
                b.total_demerits = 0;
                b.stretch_or_shrink = TextFixed::ZERO;
                b.width = TextFixed::ZERO;
                b.height = TextFixed(self.metrics.height);
                b.unscaled = false;
                have_breakpoint = true;
            }
            // Emptying the active set stops later breakpoints from reaching
            // behind the forced break, which would exclude it from the
            // solution.
            self.active.clear();
        }

        if have_breakpoint {
            self.breakpoints.push(b);
        }
        have_breakpoint
    }

    /// Adds the newest breakpoint to the active set, displacing the
    /// worst-scoring candidate when full. The trailing-glue accumulators
    /// are negated so the next element initializes the sums correctly.
    fn activate_breakpoint(&mut self) {
        let entry = ActiveBreakpoint {
            offset: self.breakpoints.len() - 1,
            width: -self.trailing_space,
            stretch: -self.trailing_stretch,
            shrink: -self.trailing_shrink,
            height: TextFixed::ZERO,
            unscaled: false,
        };
        if self.active.len() == MAX_ACTIVE_BREAKPOINTS {
            let mut worst = 0;
            for j in 1..self.active.len() {
                if self.breakpoints[self.active[j].offset].total_demerits
                    > self.breakpoints[self.active[worst].offset].total_demerits
                {
                    worst = j;
                }
            }
            self.active[worst] = entry;
        } else {
            self.active.push(entry);
        }
    }

    /// Adds the current element (and any glue its predecessor generated) to
    /// every candidate line, dropping candidates that can no longer fit —
    /// but never the last one.
    fn update_active_breakpoints(&mut self, e: ParagraphElement) {
        let width = self.trailing_space + e.advance;
        let stretch = self.trailing_stretch;
        let shrink = self.trailing_shrink;
        if e.is_word_end() {
            // Inter-word glue takes the wider space of the two fonts
            // meeting at the boundary.
            let m = if self.metrics.space_width > self.next_metrics.space_width {
                &self.metrics
            } else {
                &self.next_metrics
            };
            self.trailing_space = TextFixed(m.space_width);
            self.trailing_stretch = TextFixed(m.space_stretch);
            self.trailing_shrink = TextFixed(m.space_shrink);
        } else {
            self.trailing_space = TextFixed::ZERO;
            self.trailing_stretch = TextFixed::ZERO;
            self.trailing_shrink = TextFixed::ZERO;
        }

        // The last line of a paragraph has infinite stretch and is never
        // expanded.
        let unscaled = self.position == self.num_elements;

        let mut j = 0;
        for i in 0..self.active.len() {
            let mut ab = self.active[i];
            ab.unscaled = unscaled;
            ab.width += width;
            ab.stretch += stretch;
            ab.shrink += shrink;
            if self.height > ab.height {
                ab.height = self.height;
            }
            self.active[j] = ab;
            if (ab.width - ab.shrink) <= self.max_width {
                j += 1;
            }
        }
        let keep = j.max(1);
        self.active.truncate(keep);
    }

    /// Consumes elements until the paragraph ends or the budget expires.
    /// Returns true when breaking is complete.
    pub fn update(
        &mut self,
        nodes: &NodeArena,
        lt: &LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
    ) -> bool {
        let icx = lt.inline_context(self.container).expect("container has no inline context");
        while self.step_element(nodes, lt, backend, icx) {
            let e = self.element;
            self.update_active_breakpoints(e);
            if e.penalty != PenaltyType::ProhibitBreak && self.build_breakpoint(e, self.position) {
                self.activate_breakpoint();
            }
            if budget.expired(backend) {
                return false;
            }
        }
        true
    }

    /// Final adjusted width of the line ending at `b` and its effective
    /// adjustment ratio under `justification`.
    fn justified_width(&self, b: &Breakpoint, justification: Justification) -> (TextFixed, TextFixed) {
        let mut r = TextFixed::ZERO;
        let squashing = b.width > self.max_width;
        if squashing || (justification == Justification::Flush && !b.unscaled) {
            let slack = self.max_width - b.width;
            if slack.0 != 0 && b.stretch_or_shrink.0 != 0 {
                let denom = b.stretch_or_shrink.round_px();
                if denom != 0 {
                    r = TextFixed(slack.0 / denom);
                }
            }
        }
        let width = if r.0 != 0 { self.max_width } else { b.width };
        (width, r)
    }

    fn solution_tail(&self) -> &Breakpoint {
        self.breakpoints.last().expect("breakpoint list never empty")
    }

    /// Walks the minimum-demerits path into a line list. Returns the list
    /// plus the container's (width, height) in px, with leading applied
    /// between lines.
    pub fn build_lines(
        &self,
        justification: Justification,
        leading: i32,
    ) -> (LineList, u32, u32) {
        debug_assert_eq!(self.position, self.num_elements);

        let mut num_lines = 0;
        let mut bp = self.solution_tail();
        while bp.predecessor >= 0 {
            num_lines += 1;
            bp = &self.breakpoints[bp.predecessor as usize];
        }

        let mut lines = vec![ParagraphLine::default(); num_lines];
        let mut max_width = 0u32;
        let mut total_height = 0u32;
        let mut bp = self.solution_tail();
        let mut i = num_lines;
        while bp.predecessor >= 0 {
            let a = &self.breakpoints[bp.predecessor as usize];
            i -= 1;
            let (w, r) = self.justified_width(bp, justification);
            let line = &mut lines[i];
            line.a = a.b;
            line.b = bp.b;
            line.demerits = bp.total_demerits;
            line.adjustment_ratio = r;
            line.width = w.ceil_px().max(0) as u32;
            line.height = bp.height.ceil_px().max(0) as u32;
            total_height += line.height;
            max_width = max_width.max(line.width);
            bp = a;
        }

        if num_lines > 1 {
            total_height += (num_lines as u32 - 1) * leading.max(0) as u32;
        }
        let list = LineList { lines, max_width: self.max_width.round_px() };
        (list, max_width, total_height)
    }

    /// Size of the broken paragraph without materializing lines.
    pub fn compute_size(&self, justification: Justification, leading: i32) -> (u32, u32) {
        debug_assert_eq!(self.position, self.num_elements);
        let mut max_width = 0u32;
        let mut total_height = 0u32;
        let mut num_lines = 0u32;
        let mut bp = self.solution_tail();
        while bp.predecessor >= 0 {
            let (w, _) = self.justified_width(bp, justification);
            max_width = max_width.max(w.ceil_px().max(0) as u32);
            total_height += bp.height.ceil_px().max(0) as u32;
            num_lines += 1;
            bp = &self.breakpoints[bp.predecessor as usize];
        }
        if num_lines > 1 {
            total_height += (num_lines - 1) * leading.max(0) as u32;
        }
        (max_width, total_height)
    }
}
