//! Broad-phase uniform grid
//!
//! Maps grid cells to the bodies whose swept-path bounds overlap them,
//! bucketed by hit group so group-filtered queries never scan irrelevant
//! bodies. Pure cache: rebuilt incrementally as paths change, never a
//! source of truth.

use std::collections::HashMap;

use glam::{DVec2, IVec2};

use super::body::BodyId;

/// One broad-phase cell coordinate.
pub type GridCell = IVec2;

/// Inclusive rectangle of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl CellRect {
    /// Iterate every cell in the rect, row-major.
    ///
    /// Row-major order is part of the determinism contract: candidate
    /// enumeration order feeds event insertion order.
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + use<> {
        let (x0, x1, y1) = (self.x0, self.x1, self.y1);
        (self.y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| IVec2::new(x, y)))
    }
}

/// Uniform grid over (cell, hit group) → ordered body list.
#[derive(Debug)]
pub struct SpatialIndex {
    cell_size: f64,
    group_count: usize,
    cells: HashMap<GridCell, Vec<Vec<BodyId>>>,
}

impl SpatialIndex {
    pub fn new(cell_size: f64, group_count: usize) -> Self {
        assert!(cell_size > 0.0);
        Self {
            cell_size,
            group_count: group_count.max(1),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Cell containing a world point.
    #[inline]
    pub fn cell_at(&self, p: DVec2) -> GridCell {
        IVec2::new(
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
        )
    }

    /// Cells covering a world-space AABB.
    pub fn cell_range(&self, min: DVec2, max: DVec2) -> CellRect {
        let lo = self.cell_at(min);
        let hi = self.cell_at(max);
        CellRect {
            x0: lo.x,
            y0: lo.y,
            x1: hi.x.max(lo.x),
            y1: hi.y.max(lo.y),
        }
    }

    /// Register a body in every cell of `range`.
    pub fn insert(&mut self, id: BodyId, group: u32, range: CellRect) {
        let group = group as usize;
        debug_assert!(group < self.group_count);
        for cell in range.cells() {
            let buckets = self
                .cells
                .entry(cell)
                .or_insert_with(|| vec![Vec::new(); self.group_count]);
            buckets[group].push(id);
        }
    }

    /// Remove a body from every cell of the range it was inserted with.
    pub fn remove(&mut self, id: BodyId, group: u32, range: CellRect) {
        let group = group as usize;
        for cell in range.cells() {
            if let Some(buckets) = self.cells.get_mut(&cell) {
                buckets[group].retain(|b| *b != id);
                if buckets.iter().all(Vec::is_empty) {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Bodies of `group` indexed in `cell`, in insertion order.
    pub fn bodies_in_cell_and_group(&self, cell: GridCell, group: u32) -> &[BodyId] {
        self.cells
            .get(&cell)
            .map(|buckets| buckets[group as usize].as_slice())
            .unwrap_or(&[])
    }

    /// Append every cell id whose square overlaps the circle.
    pub fn add_cell_ids_overlapping_circle(
        &self,
        out: &mut Vec<GridCell>,
        center: DVec2,
        radius: f64,
    ) {
        let range = self.cell_range(
            center - DVec2::splat(radius),
            center + DVec2::splat(radius),
        );
        let r2 = radius * radius;
        for cell in range.cells() {
            // Closest point of the cell square to the circle center.
            let min = DVec2::new(cell.x as f64, cell.y as f64) * self.cell_size;
            let max = min + DVec2::splat(self.cell_size);
            let closest = center.clamp(min, max);
            if (closest - center).length_squared() <= r2 {
                out.push(cell);
            }
        }
    }

    #[cfg(test)]
    fn cell_count(&self) -> usize {
        self.cells.len()
    }
}
