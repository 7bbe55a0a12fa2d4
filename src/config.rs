//! Engine tuning knobs
//!
//! One `WorldConfig` per `World`. Everything here is plain data so configs
//! can ship inside level files or be tweaked from a debug console.

use serde::{Deserialize, Serialize};

/// Tuning for a single simulated world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Side length of one broad-phase grid cell, in world units.
    ///
    /// Should be a small multiple of the typical body diameter; too small
    /// and moving bodies occupy many cells, too large and every query
    /// returns every body.
    pub cell_size: f64,

    /// Elasticity used when either colliding body leaves its own unset.
    pub default_elasticity: f64,
    /// Grip used when either colliding body leaves its own unset.
    pub default_grip: f64,

    /// Ceiling on how far into the future a moving body's path is trusted
    /// and indexed, in sim-time units.
    pub max_path_duration: f64,
    /// Cadence of the path-refresh sweep that rebases long-lived paths.
    /// Must be shorter than `max_path_duration` or evaluators could run off
    /// the end of a trusted window.
    pub path_refresh_period: f64,

    /// Hit group assigned to terrain wall bodies.
    pub wall_hit_group: u32,
    /// Number of distinct hit groups the broad phase buckets by.
    pub hit_group_count: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            cell_size: 32.0,
            default_elasticity: 0.8,
            default_grip: 0.5,
            max_path_duration: 10.0,
            path_refresh_period: 2.5,
            wall_hit_group: 0,
            hit_group_count: 8,
        }
    }
}

impl WorldConfig {
    /// Config with room for `count` hit groups, walls in group 0.
    pub fn with_hit_groups(count: u32) -> Self {
        Self {
            hit_group_count: count.max(1),
            ..Self::default()
        }
    }
}
