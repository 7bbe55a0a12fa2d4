//! Terrain → physics/render bridge
//!
//! Each loaded terrain cell owns the wall bodies for its current rectangle
//! decomposition plus one opaque render-tile handle. Edits flow in from
//! `BitGrid`'s dirty set; camera proximity drives which cells are loaded at
//! all. Everything a tile owns is derived state — unload and reload always
//! reproduces it from the bits.

use std::collections::HashMap;

use glam::{DVec2, IVec2};
use serde::{Deserialize, Serialize};

use crate::phys::{Body, BodyId, World};

use super::bitgrid::{BitGrid, CellData, CellId, WorldRect};

/// Opaque token for one cell's render batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileHandle(pub u64);

/// Render-side owner of tile batches. The engine only creates and releases
/// handles; what a handle means is the renderer's business.
pub trait TileRenderer {
    fn create_tile(&mut self, cell_id: CellId, rects: &[WorldRect]) -> TileHandle;
    fn release_tile(&mut self, handle: TileHandle);
}

/// Renderer stub for headless runs and tests; hands out sequential handles.
#[derive(Debug, Default)]
pub struct NullRenderer {
    next: u64,
    pub live: usize,
}

impl TileRenderer for NullRenderer {
    fn create_tile(&mut self, _cell_id: CellId, _rects: &[WorldRect]) -> TileHandle {
        self.next += 1;
        self.live += 1;
        TileHandle(self.next)
    }

    fn release_tile(&mut self, _handle: TileHandle) {
        self.live -= 1;
    }
}

/// One recorded terrain delta: a cell's storage before and after an edit.
///
/// Bodies and render tiles are not recorded; they are derived from the bits
/// by replaying the reload path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainChange {
    pub cell_id: CellId,
    pub before: Option<CellData>,
    pub after: Option<CellData>,
}

impl TerrainChange {
    /// The same delta in the undo direction.
    pub fn reversed(&self) -> Self {
        Self {
            cell_id: self.cell_id,
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

#[derive(Debug)]
struct Tile {
    body_ids: Vec<BodyId>,
    handle: Option<TileHandle>,
}

/// Wall color in the bit grid.
const WALL_COLOR: u8 = 1;
/// Loaded cells stay resident until the interest circle recedes past this
/// factor of its radius; hysteresis against load/unload flapping at the rim.
const UNLOAD_MARGIN: f64 = 1.25;

/// Bridges a `BitGrid` to wall bodies in a `World` and tiles in a renderer.
pub struct TileGrid {
    bits: BitGrid,
    wall_hit_group: u32,
    tiles: HashMap<CellId, Tile>,
    recording: Option<Vec<TerrainChange>>,
}

impl TileGrid {
    pub fn new(bits: BitGrid, wall_hit_group: u32) -> Self {
        Self {
            bits,
            wall_hit_group,
            tiles: HashMap::new(),
            recording: None,
        }
    }

    pub fn bit_grid(&self) -> &BitGrid {
        &self.bits
    }

    pub fn is_loaded(&self, cell_id: CellId) -> bool {
        self.tiles.contains_key(&cell_id)
    }

    /// Body ids backing one loaded cell (empty if unloaded).
    pub fn cell_body_ids(&self, cell_id: CellId) -> &[BodyId] {
        self.tiles
            .get(&cell_id)
            .map(|t| t.body_ids.as_slice())
            .unwrap_or(&[])
    }

    // === Editing ===

    /// Carve floor through the terrain along a capsule.
    pub fn carve(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        a: DVec2,
        b: DVec2,
        radius: f64,
    ) {
        self.draw_terrain_pill(world, renderer, a, b, radius, 0);
    }

    /// Fill a capsule of the terrain with wall.
    pub fn fill(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        a: DVec2,
        b: DVec2,
        radius: f64,
    ) {
        self.draw_terrain_pill(world, renderer, a, b, radius, WALL_COLOR);
    }

    /// Stamp a pill, flush the dirty set and rebuild the affected tiles.
    pub fn draw_terrain_pill(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        a: DVec2,
        b: DVec2,
        radius: f64,
        color: u8,
    ) {
        // Snapshot candidate cells up front; only those that actually change
        // make it into the journal.
        let snapshots: Option<HashMap<CellId, Option<CellData>>> =
            self.recording.as_ref().map(|_| {
                self.bits
                    .cell_ids_overlapping_pill(a, b, radius)
                    .into_iter()
                    .map(|id| (id, self.bits.cell_data(id).cloned()))
                    .collect()
            });

        self.bits.draw_pill(a, b, radius, color);
        let changed = self.bits.flush_changed_cell_ids();

        if let (Some(journal), Some(snapshots)) = (self.recording.as_mut(), snapshots) {
            for cell_id in &changed {
                journal.push(TerrainChange {
                    cell_id: *cell_id,
                    before: snapshots.get(cell_id).cloned().flatten(),
                    after: self.bits.cell_data(*cell_id).cloned(),
                });
            }
        }

        for cell_id in changed {
            self.change_terrain(world, renderer, cell_id);
        }
    }

    /// Rebuild the tiles invalidated by an edit to one cell.
    ///
    /// The four cardinal neighbors reload too, even when their bits are
    /// unchanged: rectangle decomposition is cell-local, and an edit at a
    /// boundary can change which of the neighbor's rectangles are valid.
    /// Cells that are not currently loaded stay unloaded; they decompose
    /// from fresh bits whenever they do load.
    pub fn change_terrain(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        cell_id: CellId,
    ) {
        let neighborhood = [
            cell_id,
            cell_id + IVec2::new(1, 0),
            cell_id + IVec2::new(-1, 0),
            cell_id + IVec2::new(0, 1),
            cell_id + IVec2::new(0, -1),
        ];
        for id in neighborhood {
            if self.is_loaded(id) {
                self.unload_cell(world, renderer, id);
                self.load_cell(world, renderer, id);
            }
        }
    }

    // === Cell lifecycle ===

    /// Materialize a cell: one wall body per decomposed rectangle, one
    /// render tile for the lot. No-op if already loaded.
    pub fn load_cell(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        cell_id: CellId,
    ) {
        if self.is_loaded(cell_id) {
            return;
        }
        let rects = self.bits.rects_of_color_in_cell(WALL_COLOR, cell_id);
        let body_ids = rects
            .iter()
            .map(|&(center, half)| {
                world.add_body(Body::new_wall(center, half, self.wall_hit_group))
            })
            .collect();
        let handle = renderer.create_tile(cell_id, &rects);
        self.tiles.insert(
            cell_id,
            Tile {
                body_ids,
                handle: Some(handle),
            },
        );
    }

    /// Tear a cell down: destroy its wall bodies and release its tile.
    pub fn unload_cell(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        cell_id: CellId,
    ) {
        let Some(mut tile) = self.tiles.remove(&cell_id) else {
            return;
        };
        for id in tile.body_ids.drain(..) {
            world.remove_body(id);
        }
        if let Some(handle) = tile.handle.take() {
            renderer.release_tile(handle);
        }
    }

    /// Unload every loaded cell.
    pub fn unload_all(&mut self, world: &mut World, renderer: &mut dyn TileRenderer) {
        let loaded: Vec<CellId> = self.tiles.keys().copied().collect();
        for cell_id in sorted(loaded) {
            self.unload_cell(world, renderer, cell_id);
        }
    }

    /// Load cells overlapping the interest circle (the camera's view plus
    /// margin) and unload loaded cells that have fallen well outside it.
    pub fn set_interest_circle(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        center: DVec2,
        radius: f64,
    ) {
        let size = self.bits.cell_world_size();
        let lo = self.bits.cell_id_at(center - DVec2::splat(radius));
        let hi = self.bits.cell_id_at(center + DVec2::splat(radius));
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let cell_id = IVec2::new(x, y);
                if cell_square_dist(center, cell_id, size) <= radius {
                    self.load_cell(world, renderer, cell_id);
                }
            }
        }

        let keep = radius * UNLOAD_MARGIN;
        let far: Vec<CellId> = self
            .tiles
            .keys()
            .copied()
            .filter(|id| cell_square_dist(center, *id, size) > keep)
            .collect();
        for cell_id in sorted(far) {
            self.unload_cell(world, renderer, cell_id);
        }
    }

    // === Undo journal ===

    /// Start capturing terrain deltas.
    pub fn start_recording_changes(&mut self) {
        self.recording = Some(Vec::new());
    }

    /// Stop capturing and hand back the recorded deltas, oldest first.
    pub fn stop_recording_changes(&mut self) -> Vec<TerrainChange> {
        self.recording.take().unwrap_or_default()
    }

    /// Replay terrain deltas (the `after` sides), rebuilding affected tiles.
    ///
    /// Undo is the same call with each change `reversed()`, newest first.
    pub fn apply_changes(
        &mut self,
        world: &mut World,
        renderer: &mut dyn TileRenderer,
        changes: &[TerrainChange],
    ) {
        for change in changes {
            self.bits.set_cell_data(change.cell_id, change.after.clone());
        }
        for cell_id in self.bits.flush_changed_cell_ids() {
            self.change_terrain(world, renderer, cell_id);
        }
    }
}

/// Distance from a point to a cell's square footprint.
fn cell_square_dist(p: DVec2, cell_id: CellId, cell_size: f64) -> f64 {
    let min = DVec2::new(cell_id.x as f64, cell_id.y as f64) * cell_size;
    let max = min + DVec2::splat(cell_size);
    (p.clamp(min, max) - p).length()
}

/// Cells in deterministic (y, x) order.
fn sorted(mut cells: Vec<CellId>) -> Vec<CellId> {
    cells.sort_unstable_by_key(|c| (c.y, c.x));
    cells
}
