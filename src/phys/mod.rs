//! Deterministic rigid-body simulation
//!
//! Everything in this module must stay pure and deterministic:
//! - Closed-form trajectories only, never incremental integration
//! - Events dispatched in (time, insertion) order
//! - Stable iteration order for candidate enumeration
//! - No rendering or platform dependencies beyond the step deadline clock

pub mod body;
pub mod queue;
pub mod resolver;
pub mod scan;
pub mod spatial;
pub mod spirit;
pub mod world;

pub use body::{Body, BodyId, PathId, Shape};
pub use queue::{EventQueue, HitEvent, TimeoutEvent, WorldEvent};
pub use resolver::HitResolver;
pub use scan::{Scan, earliest_hit, swept_circle_circle, swept_circle_rect, swept_rect_rect};
pub use spatial::{GridCell, SpatialIndex};
pub use spirit::{Spirit, SpiritId, TimeoutValue};
pub use world::{Rayscan, StepStats, World};
