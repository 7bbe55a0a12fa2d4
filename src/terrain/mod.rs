//! Destructible bitmap terrain
//!
//! Terrain is a bitmap, not geometry: every bit is a square of world space
//! colored floor or wall. `BitGrid` owns the bits and the capsule-stamp
//! editing ops; `TileGrid` turns each edited cell's bits into a handful of
//! merged wall bodies plus one render-tile handle, and keeps both in sync
//! with the world as edits land.

pub mod bitgrid;
pub mod tilegrid;

pub use bitgrid::{BitGrid, CellData, CellId, WorldRect, BITS};
pub use tilegrid::{NullRenderer, TerrainChange, TileGrid, TileHandle, TileRenderer};
