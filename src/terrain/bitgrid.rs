//! Packed bitmap terrain
//!
//! The world's terrain color (floor vs wall) lives in fixed-size cells of
//! `BITS × BITS` bits, one `u32` row per bit row. Cells that are entirely
//! one color collapse to a tag, and cells matching the grid default are not
//! stored at all, so an endless mostly-empty world stays small.
//!
//! All mutation goes through capsule stamps (`draw_pill`); every stamp
//! accumulates the ids of cells whose bits actually changed, and the caller
//! drains that dirty set when it is ready to rebuild geometry.

use std::collections::{HashMap, HashSet};

use glam::{DVec2, IVec2};
use serde::{Deserialize, Serialize};

/// Bits per cell edge. One cell row is one `u32`.
pub const BITS: usize = 32;

/// Terrain cell coordinate.
pub type CellId = IVec2;

/// An axis-aligned world-space rectangle as (center, half extents).
pub type WorldRect = (DVec2, DVec2);

/// Bit storage of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellData {
    /// Every bit in the cell has this color.
    Uniform(u8),
    /// Row-major bit rows; bit `x` of row `y` is the bit at (x, y),
    /// set = color 1.
    Mixed(Box<[u32; BITS]>),
}

impl CellData {
    fn rows(&self) -> [u32; BITS] {
        match self {
            CellData::Uniform(0) => [0; BITS],
            CellData::Uniform(_) => [!0; BITS],
            CellData::Mixed(rows) => **rows,
        }
    }
}

/// Serialized form: explicit cell list so the encoding is deterministic.
#[derive(Serialize, Deserialize)]
struct BitGridDoc {
    bit_size: f64,
    default_color: u8,
    cells: Vec<CellEntry>,
}

#[derive(Serialize, Deserialize)]
struct CellEntry {
    x: i32,
    y: i32,
    data: CellData,
}

/// A sparse grid of terrain bits.
#[derive(Debug, Clone)]
pub struct BitGrid {
    /// World size of one bit square.
    bit_size: f64,
    /// Color of every bit not explicitly stored.
    default_color: u8,
    cells: HashMap<CellId, CellData>,
    /// Cells changed since the last flush, in change order.
    changed: Vec<CellId>,
    changed_set: HashSet<CellId>,
}

impl BitGrid {
    /// Grid with `bit_size` world units per bit, all bits `default_color`.
    pub fn new(bit_size: f64, default_color: u8) -> Self {
        assert!(bit_size > 0.0);
        Self {
            bit_size,
            default_color,
            cells: HashMap::new(),
            changed: Vec::new(),
            changed_set: HashSet::new(),
        }
    }

    /// World size of one bit square.
    pub fn bit_size(&self) -> f64 {
        self.bit_size
    }

    /// World size of one cell edge.
    pub fn cell_world_size(&self) -> f64 {
        self.bit_size * BITS as f64
    }

    /// Cell containing a world point.
    pub fn cell_id_at(&self, p: DVec2) -> CellId {
        let size = self.cell_world_size();
        IVec2::new((p.x / size).floor() as i32, (p.y / size).floor() as i32)
    }

    /// World position of a cell's minimum corner.
    pub fn cell_origin(&self, cell_id: CellId) -> DVec2 {
        DVec2::new(cell_id.x as f64, cell_id.y as f64) * self.cell_world_size()
    }

    /// Color of the bit containing a world point.
    pub fn color_at(&self, p: DVec2) -> u8 {
        let cell_id = self.cell_id_at(p);
        match self.cells.get(&cell_id) {
            None => self.default_color,
            Some(CellData::Uniform(c)) => *c,
            Some(CellData::Mixed(rows)) => {
                let origin = self.cell_origin(cell_id);
                let bx = ((p.x - origin.x) / self.bit_size) as usize % BITS;
                let by = ((p.y - origin.y) / self.bit_size) as usize % BITS;
                ((rows[by] >> bx) & 1) as u8
            }
        }
    }

    /// Cells whose area overlaps the capsule's bounding box.
    pub fn cell_ids_overlapping_pill(&self, a: DVec2, b: DVec2, radius: f64) -> Vec<CellId> {
        let pad = DVec2::splat(radius);
        let lo = self.cell_id_at(a.min(b) - pad);
        let hi = self.cell_id_at(a.max(b) + pad);
        let mut out = Vec::new();
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                out.push(IVec2::new(x, y));
            }
        }
        out
    }

    /// Stamp a capsule from `a` to `b` of the given radius and color.
    ///
    /// Touches only cells under the capsule's bounding box; cells whose bits
    /// actually change are added to the pending dirty set.
    pub fn draw_pill(&mut self, a: DVec2, b: DVec2, radius: f64, color: u8) {
        let r2 = radius * radius;
        for cell_id in self.cell_ids_overlapping_pill(a, b, radius) {
            let origin = self.cell_origin(cell_id);
            let mut rows = self
                .cells
                .get(&cell_id)
                .map(CellData::rows)
                .unwrap_or(CellData::Uniform(self.default_color).rows());

            let mut changed = false;
            for (by, row) in rows.iter_mut().enumerate() {
                let cy = origin.y + (by as f64 + 0.5) * self.bit_size;
                for bx in 0..BITS {
                    let cx = origin.x + (bx as f64 + 0.5) * self.bit_size;
                    if dist_sq_point_segment(DVec2::new(cx, cy), a, b) > r2 {
                        continue;
                    }
                    let mask = 1u32 << bx;
                    let set = (*row & mask) != 0;
                    if set != (color != 0) {
                        *row ^= mask;
                        changed = true;
                    }
                }
            }
            if changed {
                self.store_rows(cell_id, rows);
                self.mark_changed(cell_id);
            }
        }
    }

    /// Collapse uniform cells back to tags and drop default-colored ones.
    fn store_rows(&mut self, cell_id: CellId, rows: [u32; BITS]) {
        let data = if rows.iter().all(|r| *r == 0) {
            CellData::Uniform(0)
        } else if rows.iter().all(|r| *r == !0) {
            CellData::Uniform(1)
        } else {
            CellData::Mixed(Box::new(rows))
        };
        match data {
            CellData::Uniform(c) if c == self.default_color => {
                self.cells.remove(&cell_id);
            }
            data => {
                self.cells.insert(cell_id, data);
            }
        }
    }

    fn mark_changed(&mut self, cell_id: CellId) {
        if self.changed_set.insert(cell_id) {
            self.changed.push(cell_id);
        }
    }

    /// Drain the pending dirty set, in change order.
    ///
    /// Caller-driven so a burst of edits can be batched before geometry is
    /// rebuilt once.
    pub fn flush_changed_cell_ids(&mut self) -> Vec<CellId> {
        self.changed_set.clear();
        std::mem::take(&mut self.changed)
    }

    /// Raw bit data of a cell, if stored. `None` means all-default.
    pub fn cell_data(&self, cell_id: CellId) -> Option<&CellData> {
        self.cells.get(&cell_id)
    }

    /// Overwrite one cell's storage (`None` = revert to all-default) and
    /// mark it dirty. Used by the undo journal.
    pub fn set_cell_data(&mut self, cell_id: CellId, data: Option<CellData>) {
        match data {
            Some(CellData::Mixed(rows)) => self.store_rows(cell_id, *rows),
            Some(CellData::Uniform(c)) => self.store_rows(cell_id, CellData::Uniform(c).rows()),
            None => {
                self.cells.remove(&cell_id);
            }
        }
        self.mark_changed(cell_id);
    }

    /// Greedy maximal-rectangle decomposition of one cell's bits of `color`.
    ///
    /// Scans row by row: a run of matching bits extends the rectangle opened
    /// by an identical run in the row above, otherwise the old rectangle is
    /// emitted and a new one starts. Merging identical runs is why one
    /// carved cell costs a handful of wall bodies instead of hundreds.
    pub fn rects_of_color_in_cell(&self, color: u8, cell_id: CellId) -> Vec<WorldRect> {
        let rows = match self.cells.get(&cell_id) {
            Some(data) => data.rows(),
            None => CellData::Uniform(self.default_color).rows(),
        };
        // Runs as (x0, x1) half-open bit spans; active ones carry y0.
        let mut active: Vec<(usize, usize, usize)> = Vec::new();
        let mut out = Vec::new();

        for by in 0..=BITS {
            let runs: Vec<(usize, usize)> = if by < BITS {
                row_runs(rows[by], color)
            } else {
                Vec::new() // sentinel row closes everything
            };
            let mut next_active: Vec<(usize, usize, usize)> = Vec::new();
            for &(x0, x1) in &runs {
                match active.iter().find(|&&(ax0, ax1, _)| ax0 == x0 && ax1 == x1) {
                    Some(&(_, _, y0)) => next_active.push((x0, x1, y0)),
                    None => next_active.push((x0, x1, by)),
                }
            }
            for &(x0, x1, y0) in &active {
                let survives = next_active
                    .iter()
                    .any(|&(nx0, nx1, ny0)| nx0 == x0 && nx1 == x1 && ny0 == y0);
                if !survives {
                    out.push(self.bit_span_rect(cell_id, x0, x1, y0, by));
                }
            }
            active = next_active;
        }
        out
    }

    /// World rect covering bit span [x0, x1) × [y0, y1) of a cell.
    fn bit_span_rect(&self, cell_id: CellId, x0: usize, x1: usize, y0: usize, y1: usize) -> WorldRect {
        let origin = self.cell_origin(cell_id);
        let min = origin + DVec2::new(x0 as f64, y0 as f64) * self.bit_size;
        let max = origin + DVec2::new(x1 as f64, y1 as f64) * self.bit_size;
        ((min + max) * 0.5, (max - min) * 0.5)
    }

    // === Persistence ===

    /// Deterministic JSON encoding of the full bit array.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_json_value()).unwrap_or_else(|_| String::from("{}"))
    }

    /// Same encoding as a `serde_json::Value`, for embedding in level files.
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut cells: Vec<CellEntry> = self
            .cells
            .iter()
            .map(|(id, data)| CellEntry {
                x: id.x,
                y: id.y,
                data: data.clone(),
            })
            .collect();
        cells.sort_by_key(|c| (c.y, c.x));
        let doc = BitGridDoc {
            bit_size: self.bit_size,
            default_color: self.default_color,
            cells,
        };
        serde_json::to_value(&doc).unwrap_or(serde_json::Value::Null)
    }

    /// Rebuild a grid from `to_json` output. The dirty set starts empty.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Self::from_json_value(serde_json::from_str(json)?)
    }

    /// Rebuild a grid from an embedded `to_json_value` document.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let doc: BitGridDoc = serde_json::from_value(value)?;
        let mut grid = BitGrid::new(doc.bit_size, doc.default_color);
        for entry in doc.cells {
            grid.cells
                .insert(IVec2::new(entry.x, entry.y), entry.data);
        }
        Ok(grid)
    }

    /// Count of bits of `color` stored in one cell.
    pub fn count_color_in_cell(&self, color: u8, cell_id: CellId) -> u32 {
        let rows = match self.cells.get(&cell_id) {
            Some(data) => data.rows(),
            None => CellData::Uniform(self.default_color).rows(),
        };
        let ones: u32 = rows.iter().map(|r| r.count_ones()).sum();
        if color != 0 {
            ones
        } else {
            (BITS * BITS) as u32 - ones
        }
    }
}

/// Half-open runs of bits matching `color` in one row.
fn row_runs(row: u32, color: u8) -> Vec<(usize, usize)> {
    let target = color != 0;
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for x in 0..=BITS {
        let on = x < BITS && ((row >> x) & 1 != 0) == target;
        match (on, start) {
            (true, None) => start = Some(x),
            (false, Some(s)) => {
                runs.push((s, x));
                start = None;
            }
            _ => {}
        }
    }
    runs
}

/// Squared distance from a point to a segment.
fn dist_sq_point_segment(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < f64::EPSILON {
        return (p - a).length_squared();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    (p - (a + ab * t)).length_squared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> BitGrid {
        BitGrid::new(1.0, 0)
    }

    #[test]
    fn test_point_pill_sets_disk() {
        let mut g = grid();
        let p = DVec2::new(16.0, 16.0);
        g.draw_pill(p, p, 3.0, 1);

        assert_eq!(g.color_at(p), 1);
        assert_eq!(g.color_at(p + DVec2::new(2.0, 0.0)), 1);
        assert_eq!(g.color_at(p + DVec2::new(5.0, 0.0)), 0);
        // Roughly π r² bits inside the stamp.
        let n = g.count_color_in_cell(1, IVec2::new(0, 0));
        assert!(n > 20 && n < 40, "disk bit count {n}");
    }

    #[test]
    fn test_draw_accumulates_changed_cells_once() {
        let mut g = grid();
        let p = DVec2::new(16.0, 16.0);
        g.draw_pill(p, p, 3.0, 1);
        g.draw_pill(p, p, 2.0, 1); // subset, nothing changes
        let changed = g.flush_changed_cell_ids();
        assert_eq!(changed, vec![IVec2::new(0, 0)]);
        // Drained.
        assert!(g.flush_changed_cell_ids().is_empty());
    }

    #[test]
    fn test_pill_spanning_cells_dirties_both() {
        let mut g = grid();
        // Across the x boundary between cell (0,0) and (1,0).
        g.draw_pill(DVec2::new(30.0, 16.0), DVec2::new(34.0, 16.0), 2.0, 1);
        let changed = g.flush_changed_cell_ids();
        assert!(changed.contains(&IVec2::new(0, 0)));
        assert!(changed.contains(&IVec2::new(1, 0)));
    }

    #[test]
    fn test_uniform_collapse_and_default_drop() {
        let mut g = grid();
        let center = DVec2::new(16.0, 16.0);
        // Radius well past the cell corners: cell (0,0) becomes all-walls.
        g.draw_pill(center, center, 40.0, 1);
        assert_eq!(
            g.cell_data(IVec2::new(0, 0)),
            Some(&CellData::Uniform(1))
        );
        // Erase it back to floor: matches the default, storage drops.
        g.draw_pill(center, center, 40.0, 0);
        assert_eq!(g.cell_data(IVec2::new(0, 0)), None);
    }

    #[test]
    fn test_rect_decomposition_covers_stamp() {
        let mut g = grid();
        let p = DVec2::new(16.0, 16.0);
        g.draw_pill(p, p, 4.0, 1);

        let cell = IVec2::new(0, 0);
        let rects = g.rects_of_color_in_cell(1, cell);
        assert!(!rects.is_empty());

        // Total rect area equals the number of set bits: full coverage,
        // no overlap.
        let area: f64 = rects.iter().map(|(_, half)| 4.0 * half.x * half.y).sum();
        assert_eq!(area as u32, g.count_color_in_cell(1, cell));

        // No two rects overlap.
        for (i, (ca, ha)) in rects.iter().enumerate() {
            for (cb, hb) in rects.iter().skip(i + 1) {
                let d = (*cb - *ca).abs();
                let ext = *ha + *hb;
                assert!(d.x >= ext.x - 1e-9 || d.y >= ext.y - 1e-9);
            }
        }
    }

    #[test]
    fn test_full_cell_is_one_rect() {
        let mut g = grid();
        let center = DVec2::new(16.0, 16.0);
        g.draw_pill(center, center, 40.0, 1);
        let rects = g.rects_of_color_in_cell(1, IVec2::new(0, 0));
        assert_eq!(rects.len(), 1);
        let (c, h) = rects[0];
        assert!((c - DVec2::new(16.0, 16.0)).length() < 1e-12);
        assert!((h - DVec2::new(16.0, 16.0)).length() < 1e-12);
    }

    #[test]
    fn test_empty_round_trip() {
        let g = grid();
        let back = BitGrid::from_json(&g.to_json()).unwrap();
        assert_eq!(back.cells, g.cells);
        assert_eq!(back.bit_size, g.bit_size);
    }

    #[test]
    fn test_color_at_after_carve() {
        let mut g = grid();
        g.draw_pill(DVec2::new(0.0, 0.0), DVec2::new(60.0, 40.0), 5.0, 1);
        g.draw_pill(DVec2::new(30.0, 20.0), DVec2::new(30.0, 20.0), 3.0, 0);
        assert_eq!(g.color_at(DVec2::new(30.5, 20.5)), 0);
        assert_eq!(g.color_at(DVec2::new(0.5, 0.5)), 1);
    }

    proptest! {
        #[test]
        fn prop_json_round_trip(
            pills in prop::collection::vec(
                (0.0f64..128.0, 0.0f64..128.0, 0.0f64..128.0, 0.0f64..128.0, 1.0f64..10.0, 0u8..2),
                0..12,
            )
        ) {
            let mut g = BitGrid::new(1.0, 0);
            for (ax, ay, bx, by, r, color) in pills {
                g.draw_pill(DVec2::new(ax, ay), DVec2::new(bx, by), r, color);
            }
            let back = BitGrid::from_json(&g.to_json()).unwrap();
            prop_assert_eq!(back.cells, g.cells);
        }
    }
}
