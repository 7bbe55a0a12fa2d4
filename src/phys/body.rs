//! Rigid bodies with analytic trajectories
//!
//! A body's position is never integrated frame by frame. Each body carries a
//! closed-form path (`pos0 + vel * (t - path_start_time)`) valid for a
//! bounded time window, and every kinematic redefinition starts a new path
//! generation. Collision events are predicted against a specific generation
//! and become stale the moment it is replaced.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::spirit::SpiritId;

/// Generation counter identifying one analytic path of one body.
pub type PathId = u64;

/// Stable handle to a body slot in the world arena.
///
/// The generation makes handles to freed-and-reused slots miss instead of
/// aliasing the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Collision shape. Rects are axis-aligned and do not rotate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f64 },
    Rect { half: DVec2 },
}

impl Shape {
    /// Half extents of the shape's bounding box.
    #[inline]
    pub fn bounding_half(&self) -> DVec2 {
        match *self {
            Shape::Circle { radius } => DVec2::splat(radius),
            Shape::Rect { half } => half,
        }
    }
}

/// A rigid shape instance with an analytic trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub shape: Shape,

    // Kinematics, valid for t in [path_start_time, path_start_time + path_duration_max].
    // pub(crate) so deserialization can write them directly before invalidate_path();
    // everyone else goes through the setters.
    pub(crate) pos0: DVec2,
    pub(crate) vel: DVec2,
    pub(crate) ang_pos0: f64,
    pub(crate) ang_vel: f64,
    pub(crate) path_start_time: f64,
    pub(crate) path_id: PathId,
    /// How far past `path_start_time` this path may be trusted.
    /// Infinite for immobile bodies.
    pub path_duration_max: f64,

    /// May be infinite (immovable, e.g. terrain walls).
    pub mass: f64,
    /// May be infinite (never spins from impulses).
    pub moment_of_inertia: f64,
    /// Bounciness in [0, 1]. `None` inherits the resolver default.
    pub elasticity: Option<f64>,
    /// Tangential friction coupling in [0, 1]. `None` inherits the resolver default.
    pub grip: Option<f64>,
    /// Tag used for pairwise collision filtering and broad-phase bucketing.
    pub hit_group: u32,
    /// Owning game entity, if any. The engine only forwards events to it.
    pub spirit_id: Option<SpiritId>,
}

impl Body {
    /// A unit-mass body of the given shape and hit group, at rest at the origin.
    pub fn new(shape: Shape, hit_group: u32) -> Self {
        Self {
            shape,
            pos0: DVec2::ZERO,
            vel: DVec2::ZERO,
            ang_pos0: 0.0,
            ang_vel: 0.0,
            path_start_time: 0.0,
            path_id: 1,
            path_duration_max: f64::INFINITY,
            mass: 1.0,
            moment_of_inertia: 1.0,
            elasticity: None,
            grip: None,
            hit_group,
            spirit_id: None,
        }
    }

    /// An immovable axis-aligned wall.
    pub fn new_wall(center: DVec2, half: DVec2, hit_group: u32) -> Self {
        let mut body = Body::new(Shape::Rect { half }, hit_group);
        body.pos0 = center;
        body.mass = f64::INFINITY;
        body.moment_of_inertia = f64::INFINITY;
        body
    }

    // === Path identity ===

    /// Current path generation.
    #[inline]
    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    /// Start a new path generation without changing kinematics.
    ///
    /// The escape hatch for direct field mutation (deserialization): write
    /// the fields, then call this so events predicted against the old path
    /// are dropped.
    pub fn invalidate_path(&mut self) {
        self.path_id += 1;
    }

    /// First instant this path is valid for.
    #[inline]
    pub fn path_start_time(&self) -> f64 {
        self.path_start_time
    }

    /// Last instant this path may be trusted.
    #[inline]
    pub fn path_end_time(&self) -> f64 {
        self.path_start_time + self.path_duration_max
    }

    /// Whether `t` falls inside this path's validity window.
    #[inline]
    pub fn contains_time(&self, t: f64) -> bool {
        t >= self.path_start_time && t <= self.path_end_time()
    }

    // === Pure evaluators ===

    /// Position at time `t`. Contract: `t` inside the validity window.
    #[inline]
    pub fn pos_at_time(&self, t: f64) -> DVec2 {
        debug_assert!(
            self.contains_time(t),
            "path evaluated outside validity window: t={t}, window=[{}, {}]",
            self.path_start_time,
            self.path_end_time()
        );
        self.pos0 + self.vel * (t - self.path_start_time)
    }

    /// Angular position at time `t`, unnormalized. Contract as `pos_at_time`.
    #[inline]
    pub fn ang_pos_at_time(&self, t: f64) -> f64 {
        debug_assert!(
            self.contains_time(t),
            "path evaluated outside validity window: t={t}, window=[{}, {}]",
            self.path_start_time,
            self.path_end_time()
        );
        self.ang_pos0 + self.ang_vel * (t - self.path_start_time)
    }

    /// Linear velocity (constant along one path).
    #[inline]
    pub fn vel(&self) -> DVec2 {
        self.vel
    }

    /// Angular velocity (constant along one path).
    #[inline]
    pub fn ang_vel(&self) -> f64 {
        self.ang_vel
    }

    // === Path-redefining setters ===
    // Each rebases the path at `t` and starts a new generation.

    /// Rebase the path so it starts at `t` with unchanged kinematics.
    ///
    /// Shifts the validity window; that redefinition is a new generation,
    /// so this also invalidates.
    pub fn move_to_time(&mut self, t: f64) {
        self.pos0 = self.pos_at_time(t);
        self.ang_pos0 = self.ang_pos_at_time(t);
        self.path_start_time = t;
        self.invalidate_path();
    }

    /// Teleport to `pos` at time `t`.
    pub fn set_pos_at_time(&mut self, pos: DVec2, t: f64) {
        self.move_to_time(t);
        self.pos0 = pos;
    }

    /// Redefine linear velocity from time `t` onward.
    pub fn set_vel_at_time(&mut self, vel: DVec2, t: f64) {
        self.move_to_time(t);
        self.vel = vel;
    }

    /// Snap angular position at time `t`.
    pub fn set_ang_pos_at_time(&mut self, ang_pos: f64, t: f64) {
        self.move_to_time(t);
        self.ang_pos0 = ang_pos;
    }

    /// Redefine angular velocity from time `t` onward.
    pub fn set_ang_vel_at_time(&mut self, ang_vel: f64, t: f64) {
        self.move_to_time(t);
        self.ang_vel = ang_vel;
    }

    /// Add a linear velocity delta at time `t`.
    pub fn add_vel_at_time(&mut self, dv: DVec2, t: f64) {
        let vel = self.vel + dv;
        self.set_vel_at_time(vel, t);
    }

    /// Add an angular velocity delta at time `t`.
    pub fn add_ang_vel_at_time(&mut self, dw: f64, t: f64) {
        let ang_vel = self.ang_vel + dw;
        self.set_ang_vel_at_time(ang_vel, t);
    }

    /// Apply an impulse at a world position, converting the off-center part
    /// into spin via the moment of inertia.
    ///
    /// Infinite mass swallows the linear part; infinite moment of inertia
    /// swallows the angular part.
    pub fn apply_force_at_world_pos_and_time(&mut self, force: DVec2, world_pos: DVec2, t: f64) {
        if self.mass.is_finite() && self.mass > 0.0 {
            self.add_vel_at_time(force / self.mass, t);
        }
        if self.moment_of_inertia.is_finite() && self.moment_of_inertia > 0.0 {
            let arm = world_pos - self.pos_at_time(t);
            let torque = arm.perp_dot(force);
            self.add_ang_vel_at_time(torque / self.moment_of_inertia, t);
        }
    }

    /// Multiplicative linear damping: `vel *= 1 - coef`.
    pub fn apply_linear_friction_at_time(&mut self, coef: f64, t: f64) {
        let vel = self.vel * (1.0 - coef);
        self.set_vel_at_time(vel, t);
    }

    /// Multiplicative angular damping: `ang_vel *= 1 - coef`.
    pub fn apply_angular_friction_at_time(&mut self, coef: f64, t: f64) {
        let ang_vel = self.ang_vel * (1.0 - coef);
        self.set_ang_vel_at_time(ang_vel, t);
    }

    // === Derived properties ===

    /// Whether collision impulses may spin this body.
    #[inline]
    pub fn is_turnable(&self) -> bool {
        self.moment_of_inertia.is_finite() && self.moment_of_inertia > 0.0
    }

    /// Inverse mass, zero for immovable bodies.
    #[inline]
    pub fn inv_mass(&self) -> f64 {
        if self.mass.is_finite() && self.mass > 0.0 {
            1.0 / self.mass
        } else {
            0.0
        }
    }

    /// Bounding box covering the body over `[path_start_time, until]`.
    ///
    /// `until` is clamped into the validity window, so an infinite window
    /// with zero velocity (a wall) yields the static bounds.
    pub fn swept_bounds(&self, until: f64) -> (DVec2, DVec2) {
        let half = self.shape.bounding_half();
        let end = until.min(self.path_end_time()).max(self.path_start_time);
        let a = self.pos0;
        let b = if self.vel == DVec2::ZERO {
            a
        } else {
            self.pos_at_time(end)
        };
        (a.min(b) - half, a.max(b) + half)
    }
}
