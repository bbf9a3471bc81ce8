//! Multi-level hashed grid over box outer rectangles.
//!
//! Four levels of square cells with pitches 32768, 2048, 256 and 64; a box
//! goes in the smallest level whose pitch covers its longest outer
//! dimension, in the cell containing its centre. Cell codes pack
//! `(level << 30) | ((j & 0x7fff) << 15) | (i & 0x7fff)`, so out-of-range
//! boxes wrap into low-occupancy cells rather than failing.
//!
//! # Invariants
//! - A box is in at most one cell; `insert` rekeys in place when the box's
//!   level or cell changes.
//! - Rectangle queries visit each cell at most once per query, tracked with
//!   a per-query stamp on the cell.

use std::collections::HashMap;

use crate::box_tree::{BoxArena, BoxId, INVALID_CELL_CODE};
use crate::flags::BoxFlags;
use crate::geometry::{Rect, clip_value};

pub const GRID_DEPTH: usize = 4;
/// Level 0 holds the largest boxes.
pub const GRID_LOG_PITCH: [u32; GRID_DEPTH] = [15, 11, 8, 6];
const GRID_COORD_MASK: u32 = 0x7fff;
const GRID_COORD_SHIFT: u32 = 15;
const GRID_LEVEL_SHIFT: u32 = 30;

/// Default vertical step of anchor queries, px.
pub const ANCHOR_STEP: f32 = 16.0;

fn cell_code(x: i32, y: i32, level: usize) -> u32 {
    let shift = GRID_LOG_PITCH[level];
    let ci = ((x >> shift) as u32) & GRID_COORD_MASK;
    let cj = ((y >> shift) as u32) & GRID_COORD_MASK;
    ((level as u32) << GRID_LEVEL_SHIFT) | (cj << GRID_COORD_SHIFT) | ci
}

pub fn level_from_code(code: u32) -> usize {
    (code >> GRID_LEVEL_SHIFT) as usize
}

/// Smallest-pitch level that still covers `diameter`.
fn level_for_diameter(diameter: u32) -> usize {
    let mut level = GRID_DEPTH - 1;
    while level != 0 {
        if diameter <= (1u32 << GRID_LOG_PITCH[level]) {
            break;
        }
        level -= 1;
    }
    level
}

struct GridCell {
    code: u32,
    head: Option<BoxId>,
    num_boxes: u32,
    query_stamp: u32,
}

#[derive(Default)]
pub struct Grid {
    cells: HashMap<u32, GridCell>,
    query_stamp: u32,
}

/// Per-level occupancy counters, for diagnostics and the cell-count bound
/// tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GridLevelStats {
    pub cells: u32,
    pub boxes: u32,
    pub max_occupancy: u32,
}

impl Grid {
    pub fn new() -> Grid {
        Grid { cells: HashMap::new(), query_stamp: 1 }
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn statistics(&self) -> [GridLevelStats; GRID_DEPTH] {
        let mut stats = [GridLevelStats::default(); GRID_DEPTH];
        for cell in self.cells.values() {
            let s = &mut stats[level_from_code(cell.code)];
            s.cells += 1;
            s.boxes += cell.num_boxes;
            s.max_occupancy = s.max_occupancy.max(cell.num_boxes);
        }
        stats
    }

    pub fn remove(&mut self, boxes: &mut BoxArena, id: BoxId) {
        let code = boxes.get(id).cell_code;
        if code == INVALID_CELL_CODE {
            return;
        }
        let (prev, next) = {
            let b = boxes.get(id);
            (b.cell_prev, b.cell_next)
        };
        match prev {
            Some(p) => boxes.get_mut(p).cell_next = next,
            None => {
                let cell = self.cells.get_mut(&code).expect("box cell missing");
                cell.head = next;
            }
        }
        if let Some(n) = next {
            boxes.get_mut(n).cell_prev = prev;
        }
        let b = boxes.get_mut(id);
        b.cell_prev = None;
        b.cell_next = None;
        b.cell_code = INVALID_CELL_CODE;
        let cell = self.cells.get_mut(&code).expect("box cell missing");
        cell.num_boxes -= 1;
        if cell.num_boxes == 0 {
            self.cells.remove(&code);
        }
    }

    /// Inserts or rekeys a box according to its current outer rectangle.
    pub fn insert(&mut self, boxes: &mut BoxArena, id: BoxId) {
        let r = boxes.outer_rectangle(id);
        let diameter = r.width().max(r.height()).max(0.0) as u32;
        let cx = (0.5 * (r.x0 + r.x1)) as i32;
        let cy = (0.5 * (r.y0 + r.y1)) as i32;
        let level = level_for_diameter(diameter);
        let code = cell_code(cx, cy, level);
        if code == boxes.get(id).cell_code {
            return;
        }
        self.remove(boxes, id);
        let cell = self
            .cells
            .entry(code)
            .or_insert(GridCell { code, head: None, num_boxes: 0, query_stamp: 0 });
        let old_head = cell.head;
        cell.head = Some(id);
        cell.num_boxes += 1;
        if let Some(h) = old_head {
            boxes.get_mut(h).cell_prev = Some(id);
        }
        let b = boxes.get_mut(id);
        b.cell_code = code;
        b.cell_prev = None;
        b.cell_next = old_head;
        log::trace!("grid insert {:?} level {} code {:#010x}", id, level, code);
    }

    /// Finds all boxes whose hit rectangles intersect the query rectangle.
    /// With `clip` false the narrow-phase test is skipped and every box in
    /// each visited cell is returned.
    pub fn query_rect(&mut self, boxes: &BoxArena, query: Rect, clip: bool) -> Vec<BoxId> {
        let q = Rect {
            x0: query.x0.min(query.x1),
            x1: query.x0.max(query.x1),
            y0: query.y0.min(query.y1),
            y1: query.y0.max(query.y1),
        };
        let mut result = Vec::new();
        let x0 = q.x0.round() as i32;
        let x1 = q.x1.round() as i32;
        let y0 = q.y0.round() as i32;
        let y1 = q.y1.round() as i32;
        for level in 0..GRID_DEPTH {
            let shift = GRID_LOG_PITCH[level];
            let pitch = 1i32 << shift;
            let half = pitch / 2;
            let first_i = (x0 - half) >> shift;
            let first_j = (y0 - half) >> shift;
            let last_i = (x1 + half) >> shift;
            let last_j = (y1 + half) >> shift;
            for i in first_i..=last_i {
                for j in first_j..=last_j {
                    let code = cell_code(i * pitch, j * pitch, level);
                    let Some(cell) = self.cells.get_mut(&code) else { continue };
                    if cell.query_stamp == self.query_stamp {
                        continue;
                    }
                    cell.query_stamp = self.query_stamp;
                    let mut cur = cell.head;
                    while let Some(b) = cur {
                        let hit = boxes.hit_rectangle(b);
                        if !clip || q.overlaps(&hit) {
                            result.push(b);
                        }
                        cur = boxes.get(b).cell_next;
                    }
                }
            }
        }
        self.query_stamp = self.query_stamp.wrapping_add(1).max(1);
        result
    }

    pub fn query_point(&mut self, boxes: &BoxArena, x: f32, y: f32) -> Vec<BoxId> {
        self.query_rect(boxes, Rect { x0: x, x1: x, y0: y, y1: y }, true)
    }

    /// Finds a selection anchor box near `(qx, qy0)`, stepping vertically
    /// towards `qy1` in slices of `step` until a slice contains an anchor.
    /// The winner among candidates is chosen by `BoxArena::better_anchor`.
    pub fn query_anchor(
        &mut self,
        boxes: &BoxArena,
        doc_root: BoxId,
        qx: f32,
        qx0: f32,
        qx1: f32,
        qy0: f32,
        qy1: f32,
        mut step: f32,
    ) -> Option<BoxId> {
        let doc = boxes.outer_rectangle(doc_root);
        let qy0 = clip_value(qy0, doc.y0, doc.y1);
        let qy1 = clip_value(qy1, doc.y0, doc.y1);
        if qy1 < qy0 {
            step = -step;
        }

        let mut band_y0 = qy0;
        let mut anchor: Option<BoxId> = None;
        loop {
            let band_y1 = band_y0 + step;
            // No-clip query: the full contents of each visited cell come
            // back, so cells need not be revisited by later slices.
            let found = self.query_rect(
                boxes,
                Rect { x0: qx0, x1: qx1, y0: band_y0, y1: band_y1 },
                false,
            );
            // Keep the visited marks for the next slice.
            self.query_stamp = self.query_stamp.wrapping_sub(1).max(1);
            for b in found {
                if !boxes.get(b).flags.contains(BoxFlags::SELECTION_ANCHOR) {
                    continue;
                }
                if anchor.is_none_or(|best| boxes.better_anchor(qx, qy0, b, best)) {
                    anchor = Some(b);
                }
            }
            band_y0 += step;
            if anchor.is_some() || (qy1 - band_y0) * step < 0.0 {
                break;
            }
        }
        self.query_stamp = self.query_stamp.wrapping_add(1).max(1);
        anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_tree::SizeSlot;
    use style::Axis;

    /// Deterministic linear congruential generator; no rand dependency.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self, lo: f32, hi: f32) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = ((self.0 >> 33) as f32) / ((1u64 << 31) as f32);
            lo + unit * (hi - lo)
        }
    }

    fn make_box(arena: &mut BoxArena, grid: &mut Grid, x: f32, y: f32, w: f32, h: f32) -> BoxId {
        let id = arena.create(None);
        arena.set_slot(id, SizeSlot::Extrinsic, Axis::Horizontal, w);
        arena.set_slot(id, SizeSlot::Extrinsic, Axis::Vertical, h);
        {
            let b = arena.get_mut(id);
            b.axis_mut(Axis::Horizontal).pos = x;
            b.axis_mut(Axis::Vertical).pos = y;
        }
        grid.insert(arena, id);
        id
    }

    #[test]
    fn levels_by_diameter() {
        assert_eq!(level_for_diameter(10), 3); // pitch 64
        assert_eq!(level_for_diameter(64), 3);
        assert_eq!(level_for_diameter(65), 2); // pitch 256
        assert_eq!(level_for_diameter(2000), 1); // pitch 2048
        assert_eq!(level_for_diameter(30000), 0); // pitch 32768
        assert_eq!(level_for_diameter(100_000), 0); // oversized: root level
    }

    #[test]
    fn insert_remove_rekey() {
        let mut arena = BoxArena::new();
        let mut grid = Grid::new();
        let id = make_box(&mut arena, &mut grid, 0.0, 0.0, 50.0, 20.0);
        assert_eq!(grid.num_cells(), 1);
        let code = arena.get(id).cell_code;
        assert_eq!(level_from_code(code), 3);

        // Growing past the level pitch rekeys to a coarser level.
        arena.set_slot(id, SizeSlot::Extrinsic, Axis::Horizontal, 500.0);
        grid.insert(&mut arena, id);
        assert_eq!(level_from_code(arena.get(id).cell_code), 2);
        assert_eq!(grid.num_cells(), 1);

        grid.remove(&mut arena, id);
        assert_eq!(grid.num_cells(), 0);
        assert_eq!(arena.get(id).cell_code, INVALID_CELL_CODE);
    }

    /// The grid query must agree exactly with an O(n) linear scan, as a set.
    #[test]
    fn query_matches_linear_scan() {
        let mut arena = BoxArena::new();
        let mut grid = Grid::new();
        let mut rng = Lcg(12345);
        let mut all = Vec::new();
        for _ in 0..100 {
            let d = rng.next_f32(10.0, 2000.0);
            let x = rng.next_f32(0.0, 4000.0);
            let y = rng.next_f32(0.0, 4000.0);
            all.push(make_box(&mut arena, &mut grid, x, y, d, d * 0.75));
        }
        for _ in 0..100 {
            let qx0 = rng.next_f32(0.0, 4000.0);
            let qy0 = rng.next_f32(0.0, 4000.0);
            let q = Rect {
                x0: qx0,
                x1: qx0 + rng.next_f32(0.0, 500.0),
                y0: qy0,
                y1: qy0 + rng.next_f32(0.0, 500.0),
            };
            let mut got = grid.query_rect(&arena, q, true);
            let mut want: Vec<BoxId> =
                all.iter().copied().filter(|&b| q.overlaps(&arena.hit_rectangle(b))).collect();
            got.sort();
            got.dedup();
            want.sort();
            assert_eq!(got, want, "grid query diverged from linear scan for {q:?}");
        }
    }
}
