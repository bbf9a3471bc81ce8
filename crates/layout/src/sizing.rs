//! The incremental layout passes.
//!
//! A document update runs four stages over the box tree: dependency-flag
//! analysis, sizing, bounds, clip. Each stage is a state machine over a
//! [`BoxCursor`] with explicit frames, so the whole thing can be frozen on
//! the heap mid-pass and resumed later — `advance` checks the time budget
//! between steps and returns control when it expires.
//!
//! The sizing stage is the interesting one: a per-box "wheel" that computes
//! extrinsic sizes top-down, initiating bottom-up intrinsic passes (and,
//! for inline containers, text measurement, ideal and final line breaking
//! and inline box synthesis) whenever a needed input is missing, then
//! repeating subtrees whose inputs became available late. Every repeat
//! strictly increases the number of valid slots, so termination is
//! guaranteed.

use dom::{NodeArena, NodeFlags};
use platform::{Backend, TimerSample};
use style::{Alignment, Axis, DimensionMode};

use crate::LayoutTree;
use crate::box_tree::{BoxId, GrowthDirection, SizeSlot};
use crate::cursor::{BoxCursor, CursorMode, StepKind, Visit};
use crate::flags::{BoxFlags, LayoutFlags, axis_flag, axis_mask, slot_flag};
use crate::geometry::Rect;
use crate::inline::{BreakState, INFINITE_LINE_WIDTH, MeasureState, synthesis::BoxUpdateState};

// ----- budget ---------------------------------------------------------------

/// A layout time budget. `None` means run to completion.
#[derive(Clone, Copy)]
pub struct Budget {
    start: TimerSample,
    timeout_us: Option<u64>,
}

impl Budget {
    pub fn new(backend: &dyn Backend, timeout_us: Option<u64>) -> Budget {
        Budget { start: backend.query_timer(), timeout_us }
    }

    pub fn expired(&self, backend: &dyn Backend) -> bool {
        match self.timeout_us {
            Some(us) => backend.check_timeout(self.start, us),
            None => false,
        }
    }
}

// ----- frame flags ----------------------------------------------------------

const FF_PARENT_CHANGED_H: u32 = 1 << 0;
const FF_ANCESTOR_CHANGED_H: u32 = 1 << 2;
const FF_INVALIDATE_H: u32 = 1 << 4;
const FF_REPEAT: u32 = 1 << 6;
const FF_PARENT_REPEAT: u32 = 1 << 7;
/// The box's extrinsic validity bits have been refreshed this pass.
const FF_SIZING_FLAGS_VALID: u32 = 1 << 8;
const FF_REQUEST_SHIFT: u32 = 9;
const FF_SATISFY_SHIFT: u32 = 13;

/// Request/satisfy bits are laid out `[axis][preferred|intrinsic]`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ReqSlot {
    Preferred = 0,
    Intrinsic = 1,
}

fn req_flag(axis: Axis, slot: ReqSlot) -> u32 {
    1 << (FF_REQUEST_SHIFT + 2 * axis.index() as u32 + slot as u32)
}

fn sat_flag(axis: Axis, slot: ReqSlot) -> u32 {
    1 << (FF_SATISFY_SHIFT + 2 * axis.index() as u32 + slot as u32)
}

const FF_REQUEST_PREFERRED_MASK: u32 =
    (1 << (FF_REQUEST_SHIFT)) | (1 << (FF_REQUEST_SHIFT + 2));
const FF_REQUEST_INTRINSIC_MASK: u32 =
    (1 << (FF_REQUEST_SHIFT + 1)) | (1 << (FF_REQUEST_SHIFT + 3));
const FF_REQUEST_ALL: u32 = FF_REQUEST_PREFERRED_MASK | FF_REQUEST_INTRINSIC_MASK;
const FF_SATISFY_ALL: u32 = FF_REQUEST_ALL << (FF_SATISFY_SHIFT - FF_REQUEST_SHIFT);

fn parent_changed_flag(axis: Axis) -> u32 {
    FF_PARENT_CHANGED_H << axis.index() as u32
}

fn ancestor_changed_flag(axis: Axis) -> u32 {
    FF_ANCESTOR_CHANGED_H << axis.index() as u32
}

fn invalidate_flag(axis: Axis) -> u32 {
    FF_INVALIDATE_H << axis.index() as u32
}

fn req_slot_for(slot: SizeSlot) -> ReqSlot {
    match slot {
        SizeSlot::Preferred => ReqSlot::Preferred,
        _ => ReqSlot::Intrinsic,
    }
}

// ----- stages ---------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SizingStage {
    ExtrinsicMain,
    Extrinsic,
    /// Re-entered extrinsic after a bottom-up jump; must not start another
    /// bottom-up pass.
    IndependentExtrinsic,
    DoFlex,
    VisitChildren,
    IntrinsicMain,
    TextMeasurement,
    BreakIdeal,
    BreakFinal,
    InlineBoxUpdate,
}

/// Repeat passes beyond this force-resolve the box's sizes so layout
/// terminates even on degenerate dependency graphs.
const MAX_SIZING_REPEATS: u8 = 8;

struct SizingFrame {
    flags: u32,
    cflags: u32,
    clear_mask: LayoutFlags,
    stage: SizingStage,
    jump_stage: Option<SizingStage>,
    repeats: u8,
    /// Child size accumulators, `[preferred|intrinsic][axis]`.
    sizes: [[f32; 2]; 2],
}

impl SizingFrame {
    fn new(stage: SizingStage, flags: u32) -> SizingFrame {
        SizingFrame {
            flags,
            cflags: 0,
            clear_mask: LayoutFlags::empty(),
            stage,
            jump_stage: None,
            repeats: 0,
            sizes: [[0.0; 2]; 2],
        }
    }
}

// Info-pass frame bits.
const IFF_DEPENDENT_DESCENDANT_H: u32 = 1 << 0;
const IFF_DESCENDANT_IS_GROW_H: u32 = 1 << 2;

struct ClipFrame {
    clip: Rect,
    ancestor: Option<BoxId>,
    depth: i32,
    must_update: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayoutStage {
    UpdateInfo,
    ComputeSizes,
    ComputeBounds,
    UpdateClip,
    Complete,
}

/// Heap-resident state of an in-flight layout. Create once, `begin` a pass,
/// then call `advance` until it reports completion.
pub struct LayoutState {
    stage: LayoutStage,
    root: Option<BoxId>,
    cursor: Option<BoxCursor>,
    sizing_frames: Vec<SizingFrame>,
    info_frames: Vec<u32>,
    bounds_frames: Vec<bool>,
    clip_frames: Vec<ClipFrame>,
    measurement: Option<MeasureState>,
    break_state: Option<BreakState>,
    box_update: Option<BoxUpdateState>,
}

impl Default for LayoutState {
    fn default() -> Self {
        LayoutState::new()
    }
}

impl LayoutState {
    pub fn new() -> LayoutState {
        LayoutState {
            stage: LayoutStage::Complete,
            root: None,
            cursor: None,
            sizing_frames: Vec::new(),
            info_frames: Vec::new(),
            bounds_frames: Vec::new(),
            clip_frames: Vec::new(),
            measurement: None,
            break_state: None,
            box_update: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == LayoutStage::Complete
    }

    /// Starts a new layout over the subtree of `root`. Any suspended pass
    /// is abandoned.
    pub fn begin(&mut self, nodes: &NodeArena, lt: &LayoutTree, root: BoxId) {
        self.root = Some(root);
        self.measurement = None;
        self.break_state = None;
        self.box_update = None;
        self.begin_info_stage(nodes, lt, root);
    }

    fn begin_info_stage(&mut self, nodes: &NodeArena, lt: &LayoutTree, root: BoxId) {
        self.cursor = Some(BoxCursor::begin(nodes, lt, root, CursorMode::Hybrid));
        self.info_frames.clear();
        self.info_frames.push(0);
        self.stage = LayoutStage::UpdateInfo;
    }

    fn begin_sizing_stage(&mut self, nodes: &NodeArena, lt: &LayoutTree, root: BoxId) {
        self.cursor = Some(BoxCursor::begin(nodes, lt, root, CursorMode::Hybrid));
        self.sizing_frames.clear();
        self.sizing_frames.push(SizingFrame::new(SizingStage::ExtrinsicMain, 0));
        self.stage = LayoutStage::ComputeSizes;
    }

    fn begin_bounds_stage(&mut self, nodes: &NodeArena, lt: &LayoutTree, root: BoxId) {
        self.cursor = Some(BoxCursor::begin(nodes, lt, root, CursorMode::BoxOnly));
        self.bounds_frames.clear();
        self.bounds_frames.push(true);
        self.stage = LayoutStage::ComputeBounds;
    }

    fn begin_clip_stage(&mut self, nodes: &NodeArena, lt: &LayoutTree, root: BoxId) {
        self.cursor = Some(BoxCursor::begin(nodes, lt, root, CursorMode::BoxOnly));
        self.clip_frames.clear();
        self.clip_frames.push(ClipFrame {
            clip: Rect::INFINITE,
            ancestor: None,
            depth: 0,
            must_update: false,
        });
        self.stage = LayoutStage::UpdateClip;
    }

    /// Runs layout steps until the pass completes or the budget expires.
    /// Returns true on completion.
    pub fn advance(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
    ) -> bool {
        let Some(root) = self.root else { return true };
        loop {
            let stage_done = match self.stage {
                LayoutStage::UpdateInfo => self.continue_info_update(nodes, lt),
                LayoutStage::ComputeSizes => {
                    self.continue_size_update(nodes, lt, backend, budget)
                }
                LayoutStage::ComputeBounds => self.continue_bounds_update(nodes, lt),
                LayoutStage::UpdateClip => self.continue_clip_update(nodes, lt),
                LayoutStage::Complete => return true,
            };
            if stage_done {
                match self.stage {
                    LayoutStage::UpdateInfo => self.begin_sizing_stage(nodes, lt, root),
                    LayoutStage::ComputeSizes => self.begin_bounds_stage(nodes, lt, root),
                    LayoutStage::ComputeBounds => self.begin_clip_stage(nodes, lt, root),
                    LayoutStage::UpdateClip => {
                        self.stage = LayoutStage::Complete;
                        log::debug!("layout complete");
                        return true;
                    }
                    LayoutStage::Complete => return true,
                }
            }
            if budget.expired(backend) {
                return false;
            }
        }
    }

    // ----- info pass --------------------------------------------------------

    fn continue_info_update(&mut self, nodes: &NodeArena, lt: &mut LayoutTree) -> bool {
        let cursor = self.cursor.as_mut().unwrap();
        if cursor.at_end() {
            return true;
        }
        let b = cursor.current.unwrap();
        let visit = cursor.visit;

        let mut visit = visit;
        if visit.contains(Visit::PREORDER) {
            *self.info_frames.last_mut().unwrap() = 0;
            if !lt.boxes.get(b).layout_flags.contains(LayoutFlags::LAYOUT_INFO_VALID) {
                update_dependency_flags_preorder(lt, b);
                if !visit.contains(Visit::POSTORDER) {
                    cursor.step(nodes, lt, StepKind::Into);
                    self.info_frames.push(0);
                    return false;
                }
            } else if !visit.contains(Visit::POSTORDER) {
                // Valid subtree: step over, but still propagate to the
                // parent below.
                visit = Visit::POSTORDER;
                cursor.visit = Visit::PREORDER | Visit::POSTORDER;
            }
        }

        if visit.contains(Visit::POSTORDER) {
            let depth = self.info_frames.len();
            let own = self.info_frames[depth - 1];
            let up = update_dependency_flags_postorder(lt, b, own);
            if depth >= 2 {
                self.info_frames[depth - 2] = up;
            }
            lt.boxes.get_mut(b).layout_flags |= LayoutFlags::LAYOUT_INFO_VALID;
        }

        // Step over the finished subtree, popping on the way up.
        let new_visit = cursor.step(nodes, lt, StepKind::Over);
        if new_visit == Visit::POSTORDER || new_visit == Visit::empty() {
            self.info_frames.pop();
        }
        cursor.at_end()
    }

    // ----- sizing pass ------------------------------------------------------

    fn continue_size_update(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
    ) -> bool {
        let cursor = self.cursor.as_ref().unwrap();
        if cursor.at_end() {
            return true;
        }
        let visit = cursor.visit;
        if !visit.intersects(Visit::PREORDER | Visit::POSTORDER) {
            let done = self.next_up(nodes, lt) == Visit::empty();
            return done;
        }

        let b = self.cursor.as_ref().unwrap().current.unwrap();
        let mut handled = false;
        while !handled {
            let stage = self.sizing_frames.last().unwrap().stage;
            handled = match stage {
                SizingStage::ExtrinsicMain
                | SizingStage::Extrinsic
                | SizingStage::IndependentExtrinsic
                | SizingStage::DoFlex
                | SizingStage::VisitChildren => self.handle_main_wheel(nodes, lt, b),
                SizingStage::IntrinsicMain => self.handle_intrinsic_main(nodes, lt, backend, b),
                SizingStage::TextMeasurement => {
                    self.handle_text_measurement(nodes, lt, backend, budget, b)
                }
                SizingStage::BreakIdeal => self.handle_break_ideal(nodes, lt, backend, budget, b),
                SizingStage::BreakFinal => self.handle_break_final(nodes, lt, backend, budget, b),
                SizingStage::InlineBoxUpdate => {
                    self.handle_inline_box_update(nodes, lt, backend, budget, b)
                }
            };
        }
        self.cursor.as_ref().unwrap().at_end()
    }

    /// Steps over the current box; pops the frame when moving upwards.
    fn next_up(&mut self, nodes: &NodeArena, lt: &LayoutTree) -> Visit {
        let cursor = self.cursor.as_mut().unwrap();
        let visit = cursor.step(nodes, lt, StepKind::Over);
        if visit == Visit::POSTORDER || visit == Visit::empty() {
            self.sizing_frames.pop();
        }
        visit
    }

    fn frame(&mut self) -> &mut SizingFrame {
        self.sizing_frames.last_mut().unwrap()
    }

    fn handle_main_wheel(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree, b: BoxId) -> bool {
        let mut visit = self.cursor.as_ref().unwrap().visit;
        let mut stage = self.frame().stage;

        if stage == SizingStage::ExtrinsicMain {
            if visit.contains(Visit::PREORDER) {
                self.apply_change_flags(lt, b);
                stage = SizingStage::Extrinsic;
            } else {
                stage = SizingStage::VisitChildren;
            }
        }

        if stage == SizingStage::Extrinsic || stage == SizingStage::IndependentExtrinsic {
            let may_compute = stage == SizingStage::Extrinsic;
            if !self.do_compute_extrinsic_stage(nodes, lt, b, may_compute) {
                return true;
            }
            stage = SizingStage::DoFlex;
        }

        if stage == SizingStage::DoFlex {
            if !self.do_flex_adjustment(nodes, lt, b) {
                return true;
            }
            stage = SizingStage::VisitChildren;
        }

        if stage == SizingStage::VisitChildren {
            if visit.contains(Visit::PREORDER) {
                if self.maybe_prepare_to_visit_children(nodes, lt, b) {
                    self.cursor.as_mut().unwrap().step(nodes, lt, StepKind::Into);
                    self.frame_at(1).stage = stage;
                    return true;
                }
                visit |= Visit::POSTORDER;
            }
            if visit.contains(Visit::POSTORDER) {
                stage = SizingStage::ExtrinsicMain;
                let repeat = should_repeat_sizing(lt, b)
                    && self.frame().repeats < MAX_SIZING_REPEATS;
                if should_repeat_sizing(lt, b) && !repeat {
                    // Give up converging and force a size; every tree must
                    // yield a layout.
                    self.force_resolve_sizes(nodes, lt, b);
                }
                if repeat {
                    let f = self.frame();
                    f.flags |= FF_REPEAT;
                    f.repeats += 1;
                    let cursor = self.cursor.as_mut().unwrap();
                    cursor.revisit_current(nodes, lt);
                } else {
                    self.propagate_flags_upwards(nodes, lt, b);
                    let v = self.next_up(nodes, lt);
                    if v == Visit::POSTORDER || v == Visit::empty() {
                        return true; // Frame popped; don't touch it.
                    }
                    // The frame is reused for the next sibling.
                    let f = self.frame();
                    f.flags = reset_repeat_flags(f.flags);
                    f.repeats = 0;
                }
            }
        }

        self.frame().stage = stage;
        true
    }

    /// Frame `levels_up` frames below the top (0 = top).
    fn frame_at(&mut self, levels_down: usize) -> &mut SizingFrame {
        let len = self.sizing_frames.len();
        &mut self.sizing_frames[len - 1 - levels_down]
    }

    /// Last-resort sizing for a box whose dependencies never settled: take
    /// the best slot available and call it done.
    fn force_resolve_sizes(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree, b: BoxId) {
        for axis in Axis::BOTH {
            if lt.boxes.size_valid(b, SizeSlot::Extrinsic, axis) {
                continue;
            }
            let fallback = [SizeSlot::Intrinsic, SizeSlot::Preferred, SizeSlot::Ideal]
                .into_iter()
                .find(|&s| lt.boxes.size_valid(b, s, axis))
                .map(|s| lt.boxes.get_slot(b, s, axis))
                .unwrap_or(0.0);
            let size = lt.boxes.get(b).apply_min_max(axis, fallback);
            lt.boxes.set_size(b, SizeSlot::Extrinsic, axis, size);
            self.notify_extrinsic_changed(lt, nodes, b, axis);
            log::warn!("forced extrinsic {:?} of {:?} to {:.1}", axis, b, size);
        }
        lt.boxes.get_mut(b).layout_flags |= LayoutFlags::TREE_VALID;
    }

    fn apply_change_flags(&mut self, lt: &mut LayoutTree, b: BoxId) {
        let f = self.frame();
        let sflags = f.flags;
        f.flags |= FF_SIZING_FLAGS_VALID;
        if sflags & FF_REPEAT != 0 {
            return;
        }
        let mut bf = lt.boxes.get(b).layout_flags;
        for axis in Axis::BOTH {
            let parent_changed = sflags & parent_changed_flag(axis) != 0;
            let ancestor_changed = sflags & ancestor_changed_flag(axis) != 0;
            let depends_on_parent =
                bf.intersects(axis_flag(LayoutFlags::DEPENDS_ON_PARENT_H, axis));
            let depends_on_ancestor =
                bf.intersects(axis_flag(LayoutFlags::DEPENDS_ON_ANCESTOR_H, axis));
            let force = sflags & invalidate_flag(axis) != 0;
            if force
                || (parent_changed && depends_on_parent)
                || (ancestor_changed && depends_on_ancestor)
            {
                bf &= !slot_flag(SizeSlot::Extrinsic, axis);
                bf &= !LayoutFlags::TEXT_VALID;
                // An ancestor dependency (grow width) involves the
                // intrinsic as well.
                if ancestor_changed && depends_on_ancestor {
                    bf &= !slot_flag(SizeSlot::Intrinsic, axis);
                }
            }
            let in_chain = bf.intersects(axis_flag(LayoutFlags::IN_DEPENDENCE_CHAIN_H, axis));
            if ancestor_changed && in_chain {
                bf &= !LayoutFlags::TREE_VALID;
            }
        }
        lt.boxes.get_mut(b).layout_flags = bf;
    }

    /// Starts a bottom-up intrinsic pass for the current box, suspending
    /// the active stage. With `return_stage` set the wheel resumes there
    /// once the bottom-up pass completes; without it the repeat pass picks
    /// up the now-computable sizes instead.
    fn begin_bottom_up(
        &mut self,
        nodes: &NodeArena,
        lt: &LayoutTree,
        return_stage: Option<SizingStage>,
        request: u32,
    ) {
        let f = self.frame();
        if f.stage != SizingStage::IntrinsicMain {
            f.jump_stage = return_stage;
            f.stage = SizingStage::IntrinsicMain;
        }
        f.flags |= request;
        self.cursor.as_mut().unwrap().revisit_current(nodes, lt);
    }

    fn update_extrinsic_size(
        &mut self,
        lt: &mut LayoutTree,
        nodes: &mut NodeArena,
        b: BoxId,
        axis: Axis,
        may_compute_intrinsic: bool,
    ) -> bool {
        if lt.boxes.size_valid(b, SizeSlot::Extrinsic, axis) {
            return true;
        }

        let mode = lt.boxes.get(b).axis_ref(axis).mode_dim;
        let new_size;
        match mode {
            DimensionMode::Absolute => {
                new_size = lt.boxes.get_slot(b, SizeSlot::Ideal, axis);
            }
            DimensionMode::Fractional | DimensionMode::Grow
                if mode == DimensionMode::Fractional || axis == Axis::Vertical =>
            {
                // A function of the parent's extrinsic size; wait a pass if
                // the parent is not ready.
                let parent_size = match lt.boxes.get(b).parent {
                    Some(p) => {
                        if !lt.boxes.size_valid(p, SizeSlot::Extrinsic, axis) {
                            return true;
                        }
                        lt.boxes.get_slot(p, SizeSlot::Extrinsic, axis)
                    }
                    None => 0.0,
                };
                new_size = if mode == DimensionMode::Grow {
                    parent_size
                } else {
                    resolve_fractional_size(lt, b, axis, parent_size)
                };
            }
            _ => {
                // Auto, shrink, or a grow width: the extrinsic comes from
                // the intrinsic (or the preferred at the top of a cycle).
                let slot = if lt
                    .boxes
                    .get(b)
                    .layout_flags
                    .intersects(axis_flag(LayoutFlags::CYCLE_H, axis))
                {
                    SizeSlot::Preferred
                } else {
                    SizeSlot::Intrinsic
                };
                if lt.boxes.size_valid(b, slot, axis) {
                    new_size = lt.boxes.get_slot(b, slot, axis);
                } else if may_compute_intrinsic {
                    self.begin_bottom_up(
                        nodes,
                        lt,
                        Some(SizingStage::IndependentExtrinsic),
                        req_flag(axis, req_slot_for(slot)),
                    );
                    return false;
                } else {
                    return true;
                }
            }
        }
        let new_size = lt.boxes.get(b).apply_min_max(axis, new_size);
        lt.boxes.set_size(b, SizeSlot::Extrinsic, axis, new_size);
        self.notify_extrinsic_changed(lt, nodes, b, axis);
        true
    }

    fn do_compute_extrinsic_stage(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        b: BoxId,
        may_compute_intrinsic: bool,
    ) -> bool {
        let mut may_continue = true;
        for axis in Axis::BOTH {
            if !self.update_extrinsic_size(lt, nodes, b, axis, may_compute_intrinsic) {
                may_continue = false;
            }
        }
        may_continue
    }

    /// Called whenever an extrinsic slot is written during layout.
    fn notify_extrinsic_changed(
        &mut self,
        lt: &mut LayoutTree,
        nodes: &mut NodeArena,
        b: BoxId,
        axis: Axis,
    ) {
        // Note the change on the owning node so layers reposition.
        if lt.is_main_box(b) {
            if let Some(owner) = lt.boxes.get(b).owner {
                let flag = match axis {
                    Axis::Horizontal => NodeFlags::WIDTH_CHANGED,
                    Axis::Vertical => NodeFlags::HEIGHT_CHANGED,
                };
                nodes.get_mut(owner).flags |= flag | NodeFlags::UPDATE_BOX_LAYERS;
            }
        }

        {
            let bx = lt.boxes.get_mut(b);
            bx.layout_flags &=
                !(LayoutFlags::CHILD_BOUNDS_VALID | LayoutFlags::TREE_CLIP_VALID);
        }
        self.frame().clear_mask |= LayoutFlags::TREE_BOUNDS_VALID | LayoutFlags::TREE_CLIP_VALID;

        // Children that depend on this size must be re-sized.
        if lt
            .boxes
            .get(b)
            .layout_flags
            .intersects(axis_flag(LayoutFlags::HAS_DEPENDENT_CHILD_H, axis))
        {
            let bx = lt.boxes.get_mut(b);
            bx.layout_flags &= !axis_flag(LayoutFlags::CHILD_SIZES_IN_SYNC_H, axis);
            bx.layout_flags &= !LayoutFlags::TREE_VALID;
        }

        // Text breaks to the extrinsic width; the intrinsic height of an
        // inline container depends on it.
        if axis == Axis::Horizontal
            && lt.boxes.get(b).flags.contains(BoxFlags::IS_INLINE_CONTAINER)
        {
            let bx = lt.boxes.get_mut(b);
            bx.layout_flags &= !slot_flag(SizeSlot::Intrinsic, Axis::Vertical);
            bx.layout_flags &= !LayoutFlags::TEXT_VALID;
            self.notify_intrinsic_changed(lt, b, Axis::Vertical);
        }

        if axis == lt.boxes.get(b).axis {
            lt.boxes.get_mut(b).layout_flags &= !LayoutFlags::FLEX_VALID;
        }
    }

    fn notify_intrinsic_changed(&mut self, lt: &mut LayoutTree, b: BoxId, axis: Axis) {
        self.frame().clear_mask |= slot_flag(SizeSlot::Intrinsic, axis);
        // Modes whose extrinsic copies the intrinsic must re-copy it.
        let mode = lt.boxes.get(b).axis_ref(axis).mode_dim;
        if matches!(mode, DimensionMode::Auto | DimensionMode::Shrink | DimensionMode::Grow) {
            lt.boxes.get_mut(b).layout_flags &= !slot_flag(SizeSlot::Extrinsic, axis);
        }
    }

    /// Flex basis: the preferred size (or fraction of the parent's basis).
    fn basis_size(
        &mut self,
        nodes: &NodeArena,
        lt: &LayoutTree,
        b: BoxId,
        axis: Axis,
    ) -> Option<f32> {
        let size = if lt.boxes.get(b).axis_ref(axis).mode_dim == DimensionMode::Fractional {
            let parent_size = match lt.boxes.get(b).parent {
                Some(p) => self.basis_size(nodes, lt, p, axis)?,
                None => 0.0,
            };
            resolve_fractional_size(lt, b, axis, parent_size)
        } else {
            if !lt.boxes.size_valid(b, SizeSlot::Preferred, axis) {
                self.begin_bottom_up(nodes, lt, None, req_flag(axis, ReqSlot::Preferred));
                return None;
            }
            lt.boxes.get_slot(b, SizeSlot::Preferred, axis)
        };
        Some(lt.boxes.get(b).apply_min_max(axis, size))
    }

    /// Distributes the parent's slack over flexible children along the
    /// major axis.
    fn do_flex_adjustment(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree, b: BoxId) -> bool {
        let bf = lt.boxes.get(b).layout_flags;
        if !bf.contains(LayoutFlags::HAS_FLEXIBLE_CHILD) || bf.contains(LayoutFlags::FLEX_VALID) {
            return true;
        }
        let major = lt.boxes.get(b).axis;
        if !lt.boxes.size_valid(b, SizeSlot::Extrinsic, major) {
            return true;
        }

        let parent_dim = lt.boxes.get_slot(b, SizeSlot::Extrinsic, major);
        let mut basis_total = 0.0;
        let mut scale = [0.0f32; 2];
        let children: Vec<BoxId> = lt.boxes.children(b).collect();
        for &child in &children {
            let Some(unadjusted) = self.basis_size(nodes, lt, child, major) else {
                return false;
            };
            basis_total += unadjusted + lt.boxes.get(child).padding_and_margins(major);
            scale[GrowthDirection::Shrink as usize] +=
                lt.boxes.get(child).growth[GrowthDirection::Shrink as usize];
            scale[GrowthDirection::Grow as usize] +=
                lt.boxes.get(child).growth[GrowthDirection::Grow as usize];
        }

        let mut adjustment = parent_dim - basis_total;
        let gdir = if adjustment >= 0.0 { GrowthDirection::Grow } else { GrowthDirection::Shrink };
        if scale[gdir as usize].abs() > f32::EPSILON {
            adjustment /= scale[gdir as usize];
        }

        for &child in &children {
            let Some(unadjusted) = self.basis_size(nodes, lt, child, major) else {
                return false;
            };
            let adjusted = unadjusted + adjustment * lt.boxes.get(child).growth[gdir as usize];
            let adjusted = lt.boxes.get(child).apply_min_max(major, adjusted);
            if lt.boxes.set_size(child, SizeSlot::Extrinsic, major, adjusted) {
                self.notify_extrinsic_changed(lt, nodes, child, major);
            } else {
                lt.boxes.validate_size(child, SizeSlot::Extrinsic, major);
            }
        }
        let bx = lt.boxes.get_mut(b);
        bx.layout_flags |= LayoutFlags::FLEX_VALID;
        bx.layout_flags |= axis_flag(LayoutFlags::CHILD_SIZES_IN_SYNC_H, major);
        true
    }

    /// Pushes a frame and returns true if the children need visiting.
    fn maybe_prepare_to_visit_children(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        b: BoxId,
    ) -> bool {
        let parent_lflags = lt.boxes.get(b).layout_flags;
        if parent_lflags.contains(LayoutFlags::TREE_VALID) {
            return false;
        }
        // Optimistically assume one pass will settle the subtree.
        {
            let bx = lt.boxes.get_mut(b);
            bx.layout_flags |= LayoutFlags::TREE_VALID;
            bx.layout_flags |= axis_mask(LayoutFlags::CHILD_SIZES_IN_SYNC_H);
        }
        let visit = self.cursor.as_ref().unwrap().visit;
        if visit.contains(Visit::POSTORDER) {
            return false; // Leaf.
        }
        self.push_sizing_frame(SizingStage::ExtrinsicMain, parent_lflags.bits(), None);
        true
    }

    fn push_sizing_frame(&mut self, stage: SizingStage, parent_lflags_bits: u32, flags: Option<u32>) {
        let parent_lflags = LayoutFlags::from_bits_retain(parent_lflags_bits);
        let inherited = flags.unwrap_or(self.frame().flags);
        let mut f = SizingFrame::new(stage, 0);
        let mut frame_flags = down_propagate_repeat_flags(inherited);
        frame_flags = down_propagate_change_flags(parent_lflags, frame_flags);
        f.flags = frame_flags;
        self.sizing_frames.push(f);
    }

    /// Propagates size invalidations from a finished frame to the parent
    /// box before the frame is dropped or reused.
    fn propagate_flags_upwards(&mut self, nodes: &NodeArena, lt: &mut LayoutTree, b: BoxId) {
        let Some(parent) = self.effective_parent(nodes, lt, b) else {
            self.frame().clear_mask = LayoutFlags::empty();
            return;
        };
        let mut mask = self.frame().clear_mask;

        if !lt.boxes.get(b).layout_flags.contains(LayoutFlags::TREE_VALID) {
            mask |= LayoutFlags::TREE_VALID;
        }
        let extrinsics = axis_mask(LayoutFlags::EXTRINSIC_VALID_H);
        if lt.boxes.get(b).layout_flags & extrinsics != extrinsics {
            mask |= LayoutFlags::TREE_VALID;
        }

        // An invalidated intrinsic invalidates the extrinsic of a parent
        // sized from its children.
        for axis in Axis::BOTH {
            if mask.intersects(slot_flag(SizeSlot::Intrinsic, axis))
                && lt
                    .boxes
                    .get(parent)
                    .layout_flags
                    .intersects(axis_flag(LayoutFlags::DEPENDS_ON_CHILDREN_H, axis))
            {
                mask |= slot_flag(SizeSlot::Extrinsic, axis);
            }
        }

        lt.boxes.get_mut(parent).layout_flags &= !mask;
        self.frame().clear_mask = LayoutFlags::empty();
    }

    /// The box the cursor would return to from `b` — the tree parent, or
    /// the inline container box for object boxes reached through the swap.
    fn effective_parent(&self, nodes: &NodeArena, lt: &LayoutTree, b: BoxId) -> Option<BoxId> {
        if let Some(p) = lt.boxes.get(b).parent {
            if !lt.boxes.get(p).flags.contains(BoxFlags::IS_LINE_BOX) {
                return Some(p);
            }
            // Object boxes sit in line boxes; their sizing parent is the
            // container box above the lines.
            let mut q = p;
            while lt.boxes.get(q).flags.contains(BoxFlags::IS_LINE_BOX) {
                match lt.boxes.get(q).parent {
                    Some(pp) => q = pp,
                    None => break,
                }
            }
            return Some(q);
        }
        // Parentless object box: find the container through the owner.
        let owner = lt.boxes.get(b).owner?;
        let container = nodes.inline_container_above(owner)?;
        lt.primary_box(container)
    }

    // ----- intrinsic wheel --------------------------------------------------

    fn handle_intrinsic_main(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        b: BoxId,
    ) -> bool {
        let mut visit = self.cursor.as_ref().unwrap().visit;
        let is_container = lt.boxes.get(b).flags.contains(BoxFlags::IS_INLINE_CONTAINER);

        if visit.contains(Visit::PREORDER) {
            {
                let f = self.frame();
                f.cflags = f.flags | FF_SATISFY_ALL;
            }
            // The intrinsic width of an inline container needs its
            // preferred width.
            if is_container
                && self.frame().cflags & req_flag(Axis::Horizontal, ReqSlot::Intrinsic) != 0
            {
                self.frame().cflags |= req_flag(Axis::Horizontal, ReqSlot::Preferred);
            }

            self.compute_trivial_sizes(nodes, lt, b);

            self.frame().sizes = [[0.0; 2]; 2];
            let request_remaining = self.frame().cflags & FF_REQUEST_ALL != 0;
            if request_remaining && !visit.contains(Visit::POSTORDER) {
                let mut child_flags = self.frame().cflags;
                if is_container && requires_text_measurement(nodes, lt, b) {
                    // Measurement reads the intrinsic sizes of inline
                    // objects.
                    child_flags |= FF_REQUEST_INTRINSIC_MASK;
                }
                let parent_lflags = lt.boxes.get(b).layout_flags.bits();
                self.push_sizing_frame(SizingStage::IntrinsicMain, parent_lflags, Some(child_flags));
                self.cursor.as_mut().unwrap().step(nodes, lt, StepKind::Into);
                return true;
            }
            visit |= Visit::POSTORDER;
        }

        if visit.contains(Visit::POSTORDER) {
            self.maybe_handle_unbounded_grow_width(lt, b);

            if is_container {
                if self.maybe_start_text_measurement(nodes, lt, b) {
                    return false;
                }
                if self.maybe_start_ideal_break(nodes, lt, backend, b) {
                    return false;
                }
                if self.maybe_start_final_break(nodes, lt, backend, b) {
                    return false;
                }
                // Inline boxes may still need a rebuild even when the text
                // was valid.
                if self.maybe_start_inline_box_update(nodes, lt, b) {
                    return false;
                }
            } else {
                self.set_sizes_from_frame(lt, b);
            }
            self.accumulate_sizes(nodes, lt, b);

            // Jump back to whatever stage the bottom-up pass interrupted.
            if let Some(jump) = self.frame().jump_stage.take() {
                self.cursor.as_mut().unwrap().revisit_current(nodes, lt);
                self.frame().stage = jump;
                return false;
            }

            self.propagate_flags_upwards(nodes, lt, b);
            self.next_up(nodes, lt);
        }
        true
    }

    /// Satisfies slots that need no traversal: absolute sizes, and grow
    /// widths inside a known bound.
    fn compute_trivial_sizes(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree, b: BoxId) {
        for slot in [SizeSlot::Preferred, SizeSlot::Intrinsic] {
            for axis in Axis::BOTH {
                let rf = req_flag(axis, req_slot_for(slot));
                let sf = sat_flag(axis, req_slot_for(slot));
                if lt.boxes.size_valid(b, slot, axis) {
                    let f = self.frame();
                    f.cflags &= !(rf | sf);
                    continue;
                }
                let mode = lt.boxes.get(b).axis_ref(axis).mode_dim;
                let new_size;
                let mut set_extrinsic_too = false;
                if mode == DimensionMode::Absolute {
                    let ideal = lt.boxes.get_slot(b, SizeSlot::Ideal, axis);
                    new_size = lt.boxes.get(b).apply_min_max(axis, ideal);
                } else if mode == DimensionMode::Grow
                    && slot == SizeSlot::Intrinsic
                    && axis == Axis::Horizontal
                {
                    match width_bound(lt, b) {
                        WidthBound::Bounded(bound) => {
                            let inner = bound - lt.boxes.get(b).padding_and_margins(axis);
                            new_size = lt.boxes.get(b).apply_min_max(axis, inner);
                            set_extrinsic_too = true;
                        }
                        WidthBound::Wait => {
                            // The bound arrives next pass; stop requesting
                            // and forbid child-computed values.
                            let f = self.frame();
                            f.cflags &= !(rf | sf);
                            continue;
                        }
                        WidthBound::Unbounded => {
                            // No bound anywhere: the grow width becomes the
                            // preferred width, resolved in postorder.
                            self.frame().cflags |= req_flag(Axis::Horizontal, ReqSlot::Preferred);
                            continue;
                        }
                    }
                } else {
                    continue; // Computed from children by the main process.
                }

                if lt.boxes.set_size(b, slot, axis, new_size) && slot == SizeSlot::Intrinsic {
                    self.notify_intrinsic_changed(lt, b, axis);
                }
                if set_extrinsic_too {
                    // A bounded grow width determines the extrinsic as
                    // well; setting it now saves a pass before paragraph
                    // layout.
                    if lt.boxes.set_size(b, SizeSlot::Extrinsic, Axis::Horizontal, new_size) {
                        self.notify_extrinsic_changed(lt, nodes, b, Axis::Horizontal);
                    }
                }
                let f = self.frame();
                f.cflags &= !(rf | sf);
            }
        }
    }

    /// A grow width that found no bound takes the preferred width.
    fn maybe_handle_unbounded_grow_width(&mut self, lt: &mut LayoutTree, b: BoxId) {
        if lt.boxes.get(b).axis_ref(Axis::Horizontal).mode_dim != DimensionMode::Grow
            || self.frame().cflags & req_flag(Axis::Horizontal, ReqSlot::Intrinsic) == 0
        {
            return;
        }
        if !lt.boxes.size_valid(b, SizeSlot::Preferred, Axis::Horizontal) {
            return;
        }
        let preferred = lt.boxes.get_slot(b, SizeSlot::Preferred, Axis::Horizontal);
        if lt.boxes.set_size(b, SizeSlot::Intrinsic, Axis::Horizontal, preferred) {
            self.notify_intrinsic_changed(lt, b, Axis::Horizontal);
        }
        self.frame().cflags &= !req_flag(Axis::Horizontal, ReqSlot::Intrinsic);
    }

    fn set_sizes_from_frame(&mut self, lt: &mut LayoutTree, b: BoxId) {
        for (si, slot) in [SizeSlot::Preferred, SizeSlot::Intrinsic].into_iter().enumerate() {
            for axis in Axis::BOTH {
                if self.frame().cflags & sat_flag(axis, req_slot_for(slot)) == 0 {
                    continue;
                }
                let raw = self.frame().sizes[si][axis.index()];
                let new_size = lt.boxes.get(b).apply_min_max(axis, raw);
                if lt.boxes.set_size(b, slot, axis, new_size) && slot == SizeSlot::Intrinsic {
                    self.notify_intrinsic_changed(lt, b, axis);
                }
            }
        }
    }

    /// Adds this box's outer sizes into the parent frame's accumulators:
    /// sum along the parent's major axis, max along the minor.
    fn accumulate_sizes(&mut self, nodes: &NodeArena, lt: &LayoutTree, b: BoxId) {
        if self.sizing_frames.len() < 2 {
            return;
        }
        let parent_stage = self.frame_at(1).stage;
        if parent_stage != SizingStage::IntrinsicMain {
            return;
        }
        let Some(parent) = self.effective_parent(nodes, lt, b) else { return };
        let major = lt.boxes.get(parent).axis;
        let minor = major.transverse();

        let mut unsatisfied = 0u32;
        let mut additions: [[Option<f32>; 2]; 2] = [[None; 2]; 2];
        for (si, slot) in [SizeSlot::Preferred, SizeSlot::Intrinsic].into_iter().enumerate() {
            if lt.boxes.size_valid(b, slot, major) {
                let size = lt.boxes.get_slot(b, slot, major)
                    + lt.boxes.get(b).padding_and_margins(major);
                additions[si][major.index()] = Some(size);
            } else {
                unsatisfied |= sat_flag(major, req_slot_for(slot));
            }
            if lt.boxes.size_valid(b, slot, minor) {
                let size = lt.boxes.get_slot(b, slot, minor)
                    + lt.boxes.get(b).padding_and_margins(minor);
                additions[si][minor.index()] = Some(size);
            } else {
                unsatisfied |= sat_flag(minor, req_slot_for(slot));
            }
        }
        let pf = self.frame_at(1);
        for si in 0..2 {
            if let Some(v) = additions[si][major.index()] {
                pf.sizes[si][major.index()] += v;
            }
            if let Some(v) = additions[si][minor.index()] {
                let cur = pf.sizes[si][minor.index()];
                if v > cur {
                    pf.sizes[si][minor.index()] = v;
                }
            }
        }
        pf.cflags &= !unsatisfied;
    }

    // ----- inline stages ----------------------------------------------------

    fn maybe_start_text_measurement(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        b: BoxId,
    ) -> bool {
        if !requires_text_measurement(nodes, lt, b) {
            return false;
        }
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        self.measurement = Some(MeasureState::begin(nodes, lt, owner));
        self.frame().stage = SizingStage::TextMeasurement;
        true
    }

    fn handle_text_measurement(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
        b: BoxId,
    ) -> bool {
        let mut ms = self.measurement.take().expect("measurement in progress");
        if !ms.update(nodes, lt, backend, budget) {
            self.measurement = Some(ms);
            return true;
        }
        if let Some(owner) = lt.boxes.get(b).owner {
            nodes.get_mut(owner).flags.remove(NodeFlags::REMEASURE_ELEMENTS);
        }
        self.frame().stage = SizingStage::IntrinsicMain;
        false
    }

    fn maybe_start_ideal_break(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        b: BoxId,
    ) -> bool {
        let preferred = axis_mask(LayoutFlags::PREFERRED_VALID_H);
        if lt.boxes.get(b).layout_flags & preferred == preferred {
            return false;
        }
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        self.break_state =
            Some(BreakState::begin(nodes, lt, backend, owner, INFINITE_LINE_WIDTH));
        self.frame().stage = SizingStage::BreakIdeal;
        true
    }

    fn handle_break_ideal(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
        b: BoxId,
    ) -> bool {
        let mut bs = self.break_state.take().expect("break in progress");
        if !bs.update(nodes, lt, backend, budget) {
            self.break_state = Some(bs);
            return true;
        }
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        let style = &nodes.get(owner).style;
        let (width, height) = bs.compute_size(style.justification, style.leading);
        lt.boxes.set_slot(b, SizeSlot::Preferred, Axis::Horizontal, width as f32);
        lt.boxes.set_slot(b, SizeSlot::Preferred, Axis::Vertical, height as f32);
        // Shrink-fit intrinsic widths equal the preferred width; they would
        // never be produced by bottom-up accumulation. Heights come from
        // the final break instead.
        let wmode = lt.boxes.get(b).axis_ref(Axis::Horizontal).mode_dim;
        if matches!(
            wmode,
            DimensionMode::Auto | DimensionMode::Shrink | DimensionMode::Grow
        ) && !lt.boxes.size_valid(b, SizeSlot::Intrinsic, Axis::Horizontal)
            && lt.boxes.set_size(b, SizeSlot::Intrinsic, Axis::Horizontal, width as f32)
        {
            self.notify_intrinsic_changed(lt, b, Axis::Horizontal);
        }
        self.frame().stage = SizingStage::IntrinsicMain;
        self.frame().cflags &= !FF_REQUEST_PREFERRED_MASK;
        false
    }

    fn maybe_start_final_break(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        b: BoxId,
    ) -> bool {
        if lt.boxes.get(b).layout_flags.contains(LayoutFlags::TEXT_VALID) {
            lt.boxes.validate_size(b, SizeSlot::Intrinsic, Axis::Vertical);
            return false;
        }
        if !lt.boxes.size_valid(b, SizeSlot::Extrinsic, Axis::Horizontal) {
            return false;
        }
        let max_width =
            lt.boxes.get_slot(b, SizeSlot::Extrinsic, Axis::Horizontal).round() as i32;
        lt.boxes.get_mut(b).layout_flags &= !LayoutFlags::INLINE_BOXES_VALID;
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        self.break_state = Some(BreakState::begin(nodes, lt, backend, owner, max_width));
        self.frame().stage = SizingStage::BreakFinal;
        true
    }

    fn handle_break_final(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
        b: BoxId,
    ) -> bool {
        let mut bs = self.break_state.take().expect("break in progress");
        if !bs.update(nodes, lt, backend, budget) {
            self.break_state = Some(bs);
            return true;
        }
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        let (justification, leading) = {
            let s = &nodes.get(owner).style;
            (s.justification, s.leading)
        };
        let (lines, _width, height) = bs.build_lines(justification, leading);
        if let Some(icx) = lt.inline_context_mut(owner) {
            icx.lines = Some(lines);
        }
        if lt.boxes.set_size(b, SizeSlot::Intrinsic, Axis::Vertical, height as f32) {
            self.notify_intrinsic_changed(lt, b, Axis::Vertical);
        }
        self.frame().cflags &= !req_flag(Axis::Vertical, ReqSlot::Intrinsic);
        lt.boxes.get_mut(b).layout_flags |= LayoutFlags::TEXT_VALID;

        let started = self.maybe_start_inline_box_update(nodes, lt, b);
        debug_assert!(started, "final break always precedes a box update");
        false
    }

    fn maybe_start_inline_box_update(
        &mut self,
        nodes: &NodeArena,
        lt: &mut LayoutTree,
        b: BoxId,
    ) -> bool {
        let bf = lt.boxes.get(b).layout_flags;
        if bf.contains(LayoutFlags::INLINE_BOXES_VALID) || !bf.contains(LayoutFlags::TEXT_VALID) {
            return false;
        }
        let owner = lt.boxes.get(b).owner.expect("container box has an owner");
        self.box_update = Some(BoxUpdateState::begin(nodes, lt, owner));
        self.frame().stage = SizingStage::InlineBoxUpdate;
        true
    }

    fn handle_inline_box_update(
        &mut self,
        nodes: &mut NodeArena,
        lt: &mut LayoutTree,
        backend: &dyn Backend,
        budget: &Budget,
        b: BoxId,
    ) -> bool {
        let mut bu = self.box_update.take().expect("box update in progress");
        if !bu.update(nodes, lt, backend, budget) {
            self.box_update = Some(bu);
            return true;
        }
        lt.boxes.get_mut(b).layout_flags |= LayoutFlags::INLINE_BOXES_VALID;
        self.frame().stage = SizingStage::IntrinsicMain;
        false
    }

    // ----- bounds pass ------------------------------------------------------

    fn continue_bounds_update(&mut self, nodes: &mut NodeArena, lt: &mut LayoutTree) -> bool {
        let cursor = self.cursor.as_mut().unwrap();
        if cursor.at_end() {
            return true;
        }
        let b = cursor.current.unwrap();
        let visit = cursor.visit;
        let mut kind = StepKind::Into;

        if visit.contains(Visit::PREORDER) {
            let parent_valid = *self.bounds_frames.last().unwrap();
            if !parent_valid
                || !lt.boxes.get(b).layout_flags.contains(LayoutFlags::CHILD_BOUNDS_VALID)
            {
                // The root positions itself; everything else was placed by
                // its parent on the way down.
                if lt.boxes.get(b).parent.is_none() {
                    set_box_position(lt, nodes, b, 0.0, 0.0, Axis::Horizontal);
                }
                position_children(lt, nodes, b);
                lt.boxes.get_mut(b).layout_flags |= LayoutFlags::CHILD_BOUNDS_VALID;
            }

            if !visit.contains(Visit::POSTORDER)
                && (!parent_valid
                    || !lt.boxes.get(b).layout_flags.contains(LayoutFlags::TREE_BOUNDS_VALID))
            {
                self.bounds_frames.push(true);
            } else {
                kind = StepKind::Over;
            }
            lt.boxes.get_mut(b).layout_flags |= LayoutFlags::TREE_BOUNDS_VALID;
        } else {
            self.bounds_frames.pop();
        }

        let cursor = self.cursor.as_mut().unwrap();
        cursor.step(nodes, lt, kind) == Visit::empty()
    }

    // ----- clip pass --------------------------------------------------------

    fn continue_clip_update(&mut self, nodes: &NodeArena, lt: &mut LayoutTree) -> bool {
        let cursor = self.cursor.as_mut().unwrap();
        if cursor.at_end() {
            return true;
        }
        let b = cursor.current.unwrap();
        let visit = cursor.visit;
        let mut kind = StepKind::Into;

        if visit.contains(Visit::PREORDER) {
            let pf = self.clip_frames.last().unwrap();
            let (pf_clip, pf_ancestor, pf_depth, pf_must) =
                (pf.clip, pf.ancestor, pf.depth, pf.must_update);
            if pf_must
                || !lt.boxes.get(b).layout_flags.contains(LayoutFlags::TREE_CLIP_VALID)
            {
                let ancestor;
                if lt.boxes.get(b).flags.intersects(BoxFlags::CLIP_ALL) {
                    let own = lt.boxes.build_clip_rectangle(b);
                    let clip = pf_clip.intersect(&own);
                    lt.boxes.get_mut(b).clip = clip;
                    ancestor = Some(b);
                } else {
                    lt.boxes.get_mut(b).clip = pf_clip;
                    ancestor = pf_ancestor;
                }
                lt.boxes.get_mut(b).clip_ancestor = ancestor;
                lt.boxes.get_mut(b).depth = pf_depth.clamp(0, u16::MAX as i32) as u16;

                if !visit.contains(Visit::POSTORDER) {
                    let depth = pf_depth + lt.boxes.get(b).depth_interval as i32;
                    let clip = lt.boxes.get(b).clip;
                    self.clip_frames.push(ClipFrame {
                        clip,
                        ancestor,
                        depth,
                        must_update: true,
                    });
                }
            } else {
                kind = StepKind::Over;
            }
        } else {
            lt.boxes.get_mut(b).layout_flags |= LayoutFlags::TREE_CLIP_VALID;
            self.clip_frames.pop();
        }

        let cursor = self.cursor.as_mut().unwrap();
        cursor.step(nodes, lt, kind) == Visit::empty()
    }
}

// ----- dependency analysis --------------------------------------------------

fn is_flexible(lt: &LayoutTree, b: BoxId) -> bool {
    let bx = lt.boxes.get(b);
    bx.growth[0] != 0.0 || bx.growth[1] != 0.0
}

fn sized_by_flex(lt: &LayoutTree, b: BoxId, axis: Axis) -> bool {
    match lt.boxes.get(b).parent {
        Some(p) => {
            lt.boxes.get(p).axis == axis
                && lt.boxes.get(p).layout_flags.contains(LayoutFlags::HAS_FLEXIBLE_CHILD)
        }
        None => false,
    }
}

fn size_depends_on_parent(lt: &LayoutTree, b: BoxId, axis: Axis) -> bool {
    match lt.boxes.get(b).axis_ref(axis).mode_dim {
        DimensionMode::Absolute => sized_by_flex(lt, b, axis) && is_flexible(lt, b),
        DimensionMode::Fractional => true,
        DimensionMode::Grow => axis == Axis::Vertical,
        DimensionMode::Auto | DimensionMode::Shrink => false,
    }
}

fn size_depends_on_ancestor(lt: &LayoutTree, b: BoxId, axis: Axis) -> bool {
    axis == Axis::Horizontal && lt.boxes.get(b).axis_ref(axis).mode_dim == DimensionMode::Grow
}

fn size_depends_on_children(lt: &LayoutTree, b: BoxId, axis: Axis) -> bool {
    matches!(
        lt.boxes.get(b).axis_ref(axis).mode_dim,
        DimensionMode::Auto | DimensionMode::Shrink | DimensionMode::Grow
    )
}

fn update_dependency_flags_preorder(lt: &mut LayoutTree, b: BoxId) {
    let mut flags = LayoutFlags::empty();
    for axis in Axis::BOTH {
        if size_depends_on_parent(lt, b, axis) {
            flags |= axis_flag(LayoutFlags::DEPENDS_ON_PARENT_H, axis);
        }
        if size_depends_on_ancestor(lt, b, axis) {
            flags |= axis_flag(LayoutFlags::DEPENDS_ON_ANCESTOR_H, axis);
        }
        if size_depends_on_children(lt, b, axis) {
            flags |= axis_flag(LayoutFlags::DEPENDS_ON_CHILDREN_H, axis);
        }
    }
    let children: Vec<BoxId> = lt.boxes.children(b).collect();
    for child in children {
        if is_flexible(lt, child) {
            flags |= LayoutFlags::HAS_FLEXIBLE_CHILD;
        }
    }
    let dependency_mask = axis_mask(LayoutFlags::DEPENDS_ON_PARENT_H)
        | axis_mask(LayoutFlags::DEPENDS_ON_ANCESTOR_H)
        | axis_mask(LayoutFlags::DEPENDS_ON_CHILDREN_H)
        | axis_mask(LayoutFlags::IN_DEPENDENCE_CHAIN_H)
        | axis_mask(LayoutFlags::HAS_DEPENDENT_CHILD_H)
        | axis_mask(LayoutFlags::CYCLE_H)
        | LayoutFlags::HAS_FLEXIBLE_CHILD;
    let bx = lt.boxes.get_mut(b);
    bx.layout_flags &= !dependency_mask;
    bx.layout_flags |= flags;
}

/// Postorder half of the analysis: propagates ancestral-dependence chains
/// and dependent-child bits to the parent, and detects reciprocal
/// dependency cycles. Returns the frame flags to store on the parent.
fn update_dependency_flags_postorder(lt: &mut LayoutTree, b: BoxId, mut frame: u32) -> u32 {
    let parent = lt.boxes.get(b).parent;
    let flags = lt.boxes.get(b).layout_flags;
    let mut flags_for_parent = LayoutFlags::empty();
    for axis in Axis::BOTH {
        let doa = axis_flag(LayoutFlags::DEPENDS_ON_ANCESTOR_H, axis);
        let iadc = axis_flag(LayoutFlags::IN_DEPENDENCE_CHAIN_H, axis);
        let defines_bound = lt.boxes.get(b).axis_ref(axis).mode_dim.defines_bound();
        if flags.intersects(doa) || (flags.intersects(iadc) && !defines_bound) {
            flags_for_parent |= iadc;
        }

        let doc = axis_flag(LayoutFlags::DEPENDS_ON_CHILDREN_H, axis);
        let dop = axis_flag(LayoutFlags::DEPENDS_ON_PARENT_H, axis);
        let ddesc = IFF_DEPENDENT_DESCENDANT_H << axis.index() as u32;
        let ddesc_grow = IFF_DESCENDANT_IS_GROW_H << axis.index() as u32;

        // A box sized from its children, with a descendant in its chain
        // sized from its parents (and not by climbing growth), closes a
        // cycle; it is broken by sizing this box from its preferred size.
        if frame & (ddesc | ddesc_grow) == ddesc && flags.intersects(doc) {
            lt.boxes.get_mut(b).layout_flags |= axis_flag(LayoutFlags::CYCLE_H, axis);
        }

        if flags.intersects(dop) {
            frame |= ddesc;
            if lt.boxes.get(b).axis_ref(axis).mode_dim == DimensionMode::Grow {
                frame |= ddesc_grow;
            } else {
                frame &= !ddesc_grow;
            }
        } else {
            frame &= !(ddesc | ddesc_grow);
        }

        if flags.intersects(dop) {
            flags_for_parent |= axis_flag(LayoutFlags::HAS_DEPENDENT_CHILD_H, axis);
        }
    }
    if let Some(p) = parent {
        lt.boxes.get_mut(p).layout_flags |= flags_for_parent;
    }
    frame
}

// ----- change/repeat flag plumbing ------------------------------------------

fn down_propagate_change_flags(parent_lflags: LayoutFlags, mut frame_flags: u32) -> u32 {
    frame_flags &= !(parent_changed_flag(Axis::Horizontal) | parent_changed_flag(Axis::Vertical));
    for axis in Axis::BOTH {
        let in_sync = parent_lflags.intersects(axis_flag(LayoutFlags::CHILD_SIZES_IN_SYNC_H, axis));
        if !in_sync {
            frame_flags |= parent_changed_flag(axis);
        }
        if frame_flags & parent_changed_flag(axis) != 0 {
            frame_flags |= ancestor_changed_flag(axis);
        } else if !parent_lflags
            .intersects(axis_flag(LayoutFlags::IN_DEPENDENCE_CHAIN_H, axis))
        {
            frame_flags &= !ancestor_changed_flag(axis);
        }
    }
    frame_flags
}

fn reset_repeat_flags(flags: u32) -> u32 {
    if flags & FF_PARENT_REPEAT != 0 {
        flags | FF_REPEAT | FF_SIZING_FLAGS_VALID
    } else {
        flags & !(FF_REPEAT | FF_SIZING_FLAGS_VALID)
    }
}

fn down_propagate_repeat_flags(mut flags: u32) -> u32 {
    if flags & FF_REPEAT != 0 {
        flags |= FF_PARENT_REPEAT;
    }
    reset_repeat_flags(flags)
}

/// True if sizing should be repeated for this subtree: something below is
/// still invalid and this is the highest box at which the missing inputs
/// could now be computable.
fn should_repeat_sizing(lt: &LayoutTree, b: BoxId) -> bool {
    let valid_mask = axis_mask(LayoutFlags::EXTRINSIC_VALID_H);
    let bf = lt.boxes.get(b).layout_flags;
    let valid_axes = bf & valid_mask;
    if valid_axes == valid_mask && bf.contains(LayoutFlags::TREE_VALID) {
        return false;
    }
    let Some(parent) = lt.boxes.get(b).parent else {
        return true;
    };
    let mut available = LayoutFlags::empty();
    for axis in Axis::BOTH {
        if !bf.intersects(axis_flag(LayoutFlags::DEPENDS_ON_PARENT_H, axis)) {
            available |= slot_flag(SizeSlot::Extrinsic, axis);
        }
    }
    available |= lt.boxes.get(parent).layout_flags & valid_mask;
    (valid_axes | available) == valid_mask
}

// ----- sizing helpers -------------------------------------------------------

fn resolve_fractional_size(lt: &LayoutTree, b: BoxId, axis: Axis, parent_size: f32) -> f32 {
    let fraction = lt.boxes.get_slot(b, SizeSlot::Ideal, axis);
    fraction * parent_size - lt.boxes.get(b).padding_and_margins(axis)
}

fn requires_text_measurement(nodes: &NodeArena, lt: &LayoutTree, b: BoxId) -> bool {
    match lt.boxes.get(b).owner {
        Some(owner) => nodes.get(owner).flags.contains(NodeFlags::REMEASURE_ELEMENTS),
        None => false,
    }
}

enum WidthBound {
    Bounded(f32),
    Unbounded,
    Wait,
}

/// Width available to a box from the first ancestor with a defined width.
/// Safe for text layout because extrinsic widths never depend on text.
fn width_bound(lt: &LayoutTree, b: BoxId) -> WidthBound {
    let mut cur = b;
    while !lt.boxes.get(cur).axis_ref(Axis::Horizontal).mode_dim.defines_bound() {
        match lt.boxes.get(cur).parent {
            Some(p) => cur = p,
            None => return WidthBound::Unbounded,
        }
    }
    if !lt.boxes.size_valid(cur, SizeSlot::Extrinsic, Axis::Horizontal) {
        return WidthBound::Wait;
    }
    WidthBound::Bounded(lt.boxes.get_slot(cur, SizeSlot::Extrinsic, Axis::Horizontal))
}

// ----- positioning ----------------------------------------------------------

/// Writes a box's document position; reinserts it into the grid and marks
/// moved subtrees for repositioning.
pub fn set_box_position(
    lt: &mut LayoutTree,
    nodes: &mut NodeArena,
    b: BoxId,
    a: f32,
    bpos: f32,
    axis_a: Axis,
) -> bool {
    use crate::box_tree::{INVALID_CELL_CODE, sizes_equal};
    let axis_b = axis_a.transverse();
    let bx = lt.boxes.get(b);
    let changed = !bx.layout_flags.contains(LayoutFlags::BOUNDS_DEFINED)
        || !sizes_equal(a, bx.axis_ref(axis_a).pos)
        || !sizes_equal(bpos, bx.axis_ref(axis_b).pos);
    {
        let bx = lt.boxes.get_mut(b);
        bx.axis_mut(axis_a).pos = a;
        bx.axis_mut(axis_b).pos = bpos;
    }
    if changed {
        {
            let bx = lt.boxes.get_mut(b);
            bx.layout_flags |= LayoutFlags::BOUNDS_DEFINED;
            bx.layout_flags &=
                !(LayoutFlags::CHILD_BOUNDS_VALID | LayoutFlags::TREE_BOUNDS_VALID);
        }
        lt.grid_insert(b);
        if lt.is_main_box(b) {
            if let Some(owner) = lt.boxes.get(b).owner {
                nodes.get_mut(owner).flags |= NodeFlags::UPDATE_BOX_LAYERS;
            }
        }
    } else if lt.boxes.get(b).cell_code == INVALID_CELL_CODE {
        // Unmoved but not in the grid (hidden or reparented since):
        // reinsert now that the bounds are known.
        lt.grid_insert(b);
    }
    changed
}

/// Positions the children of a box within its content rectangle: the
/// arrangement picks the starting offset along the major axis, each child's
/// alignment places it on the minor axis.
pub fn position_children(lt: &mut LayoutTree, nodes: &mut NodeArena, b: BoxId) {
    if lt.boxes.get(b).first_child.is_none() {
        return;
    }
    let major = lt.boxes.get(b).axis;
    let minor = major.transverse();
    let mut pos_major = lt.boxes.content_edge_lower(b, major);
    let arrangement = lt.boxes.get(b).arrangement;
    if arrangement != Alignment::Start {
        let mut total = 0.0;
        let children: Vec<BoxId> = lt.boxes.children(b).collect();
        for child in children {
            total += lt.boxes.outer_dim(child, major);
        }
        let slack = lt.boxes.get_slot(b, SizeSlot::Extrinsic, major) - total;
        pos_major += if arrangement == Alignment::Middle { 0.5 * slack } else { slack };
    }

    let dim_minor = lt.boxes.get_slot(b, SizeSlot::Extrinsic, minor);
    let children: Vec<BoxId> = lt.boxes.children(b).collect();
    for child in children {
        let mut pos_minor = lt.boxes.content_edge_lower(b, minor);
        let alignment = lt.boxes.get(child).alignment;
        if alignment != Alignment::Start {
            let slack = dim_minor - lt.boxes.outer_dim(child, minor);
            pos_minor += if alignment == Alignment::Middle { 0.5 * slack } else { slack };
        }
        set_box_position(lt, nodes, child, pos_major, pos_minor, major);
        pos_major += lt.boxes.outer_dim(child, major);
    }
}
