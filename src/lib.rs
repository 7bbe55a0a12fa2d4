//! Crumble - deterministic physics and destructible terrain for 2D browser games
//!
//! Core modules:
//! - `phys`: event-driven rigid-body simulation (bodies, continuous collision,
//!   event queue, world orchestration)
//! - `terrain`: destructible bitmap terrain and its bridge to physics bodies
//! - `level`: versioned save/load envelope for terrain + bodies
//! - `platform`: browser/native platform abstraction
//! - `config`: engine tuning knobs

pub mod config;
pub mod level;
pub mod phys;
pub mod platform;
pub mod terrain;

pub use config::WorldConfig;
pub use phys::{Body, BodyId, Shape, Spirit, SpiritId, World, WorldEvent};
pub use terrain::{BitGrid, CellId, TileGrid};

/// Normalize an angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f64) -> f64 {
    use std::f64::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Initialize logging and panic reporting for the browser build.
///
/// Runs automatically when the wasm module is instantiated.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}
