//! Collision response
//!
//! Turns a confirmed contact (time + normal) into velocity and spin changes
//! on the two bodies. The resolver never decides *whether* a hit happened —
//! that is the scan's job — and it never touches anything but the two
//! bodies handed to it.

use glam::DVec2;

use super::body::Body;

/// Impulse-based hit resolution with engine-wide fallback material values.
#[derive(Debug, Clone)]
pub struct HitResolver {
    /// Used when either body's `elasticity` is `None`.
    pub default_elasticity: f64,
    /// Used when either body's `grip` is `None`.
    pub default_grip: f64,
}

/// `x.signum()` that treats (near-)zero as zero.
#[inline]
fn axis_sign(x: f64) -> f64 {
    if x.abs() < 1e-12 { 0.0 } else { x.signum() }
}

impl HitResolver {
    pub fn new(default_elasticity: f64, default_grip: f64) -> Self {
        Self {
            default_elasticity,
            default_grip,
        }
    }

    /// Combine rule: both bodies specify → product; otherwise the default.
    fn combined_elasticity(&self, a: &Body, b: &Body) -> f64 {
        match (a.elasticity, b.elasticity) {
            (Some(x), Some(y)) => (x * y).clamp(0.0, 1.0),
            _ => self.default_elasticity,
        }
    }

    fn combined_grip(&self, a: &Body, b: &Body) -> f64 {
        match (a.grip, b.grip) {
            (Some(x), Some(y)) => (x * y).clamp(0.0, 1.0),
            _ => self.default_grip,
        }
    }

    /// Apply collision impulses to both bodies at `time`.
    ///
    /// `normal` is the unit contact normal pointing from `a` toward `b`.
    /// Degenerate inputs (zero-length normal, two immovable bodies, bodies
    /// already separating) resolve as no-ops, never panics.
    pub fn resolve_hit(&self, time: f64, normal: DVec2, a: &mut Body, b: &mut Body) {
        if normal.length_squared() < 1e-12 {
            log::warn!("skipping hit with degenerate normal at t={time}");
            return;
        }
        let n = normal.normalize();

        let inv_ma = a.inv_mass();
        let inv_mb = b.inv_mass();
        if inv_ma + inv_mb == 0.0 {
            log::debug!("two immovable bodies hit at t={time}, no impulse");
            return;
        }

        let vn = (b.vel() - a.vel()).dot(n);
        if vn >= 0.0 {
            // Already separating; a stale prediction that slipped through.
            return;
        }

        let mut dv_a = DVec2::ZERO;
        let mut dv_b = DVec2::ZERO;
        let mut dw_a = 0.0;
        let mut dw_b = 0.0;

        // Normal impulse with restitution.
        let e = self.combined_elasticity(a, b);
        let j = -(1.0 + e) * vn / (inv_ma + inv_mb);
        dv_a -= n * (j * inv_ma);
        dv_b += n * (j * inv_mb);

        // Tangential (grip) impulse, with spin coupling at the contact point.
        let grip = self.combined_grip(a, b);
        if grip > 0.0 {
            let t_hat = n.perp();
            let contact = self.hit_pos(time, n, a, b);
            let r_a = contact - a.pos_at_time(time);
            let r_b = contact - b.pos_at_time(time);

            let surf_a = a.vel() + r_a.perp() * a.ang_vel();
            let surf_b = b.vel() + r_b.perp() * b.ang_vel();
            let wt = (surf_b - surf_a).dot(t_hat);

            let arm_a = r_a.perp_dot(t_hat);
            let arm_b = r_b.perp_dot(t_hat);
            let mut inv_eff = inv_ma + inv_mb;
            if a.is_turnable() {
                inv_eff += arm_a * arm_a / a.moment_of_inertia;
            }
            if b.is_turnable() {
                inv_eff += arm_b * arm_b / b.moment_of_inertia;
            }
            if inv_eff > 0.0 {
                let jt = -grip * wt / inv_eff;
                let pt = t_hat * jt;
                dv_a -= pt * inv_ma;
                dv_b += pt * inv_mb;
                if a.is_turnable() {
                    dw_a += r_a.perp_dot(-pt) / a.moment_of_inertia;
                }
                if b.is_turnable() {
                    dw_b += r_b.perp_dot(pt) / b.moment_of_inertia;
                }
            }
        }

        if dv_a != DVec2::ZERO {
            a.add_vel_at_time(dv_a, time);
        }
        if dw_a != 0.0 {
            a.add_ang_vel_at_time(dw_a, time);
        }
        if dv_b != DVec2::ZERO {
            b.add_vel_at_time(dv_b, time);
        }
        if dw_b != 0.0 {
            b.add_ang_vel_at_time(dw_b, time);
        }
    }

    /// A representative contact point between the two surfaces at `time`.
    ///
    /// For audio/visual feedback only; mutates nothing and has no physical
    /// effect on the resolution.
    pub fn hit_pos(&self, time: f64, normal: DVec2, a: &Body, b: &Body) -> DVec2 {
        let sa = Self::surface_point(a, normal, time);
        let sb = Self::surface_point(b, -normal, time);
        (sa + sb) * 0.5
    }

    /// Point on the body's boundary in direction `dir`.
    fn surface_point(body: &Body, dir: DVec2, time: f64) -> DVec2 {
        use super::body::Shape;
        let pos = body.pos_at_time(time);
        match body.shape {
            Shape::Circle { radius } => pos + dir * radius,
            Shape::Rect { half } => {
                pos + DVec2::new(half.x * axis_sign(dir.x), half.y * axis_sign(dir.y))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::body::Shape;

    fn ball_at(x: f64, vx: f64) -> Body {
        let mut b = Body::new(Shape::Circle { radius: 1.0 }, 1);
        b.path_duration_max = 100.0;
        b.set_pos_at_time(DVec2::new(x, 0.0), 0.0);
        b.set_vel_at_time(DVec2::new(vx, 0.0), 0.0);
        b.elasticity = Some(1.0);
        b.grip = Some(0.0);
        b
    }

    #[test]
    fn test_elastic_head_on_swaps_velocities() {
        let resolver = HitResolver::new(1.0, 0.0);
        let mut a = ball_at(-1.0, 1.0);
        let mut b = ball_at(1.0, -1.0);

        resolver.resolve_hit(2.0, DVec2::new(1.0, 0.0), &mut a, &mut b);
        assert!((a.vel() - DVec2::new(-1.0, 0.0)).length() < 1e-12);
        assert!((b.vel() - DVec2::new(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_elastic_conserves_normal_kinetic_energy() {
        let resolver = HitResolver::new(1.0, 0.0);
        let mut a = ball_at(-1.0, 3.0);
        a.mass = 2.0;
        let mut b = ball_at(1.0, -0.5);
        b.mass = 5.0;

        let ke = |x: &Body| 0.5 * x.mass * x.vel().length_squared();
        let before = ke(&a) + ke(&b);
        resolver.resolve_hit(1.0, DVec2::new(1.0, 0.0), &mut a, &mut b);
        let after = ke(&a) + ke(&b);
        assert!((before - after).abs() < 1e-9);
        // Momentum too.
        let p = a.mass * a.vel().x + b.mass * b.vel().x;
        assert!((p - (2.0 * 3.0 + 5.0 * -0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_inelastic_kills_relative_normal_velocity() {
        let resolver = HitResolver::new(1.0, 0.0);
        let mut a = ball_at(-1.0, 2.0);
        a.elasticity = Some(0.0);
        let mut b = ball_at(1.0, -2.0);
        b.elasticity = Some(0.0);

        resolver.resolve_hit(1.0, DVec2::new(1.0, 0.0), &mut a, &mut b);
        let vn = (b.vel() - a.vel()).x;
        assert!(vn.abs() < 1e-12);
    }

    #[test]
    fn test_infinite_mass_wall_reflects() {
        let resolver = HitResolver::new(1.0, 0.0);
        let mut ball = ball_at(-1.0, 5.0);
        let mut wall = Body::new_wall(DVec2::new(2.0, 0.0), DVec2::ONE, 0);

        resolver.resolve_hit(0.5, DVec2::new(1.0, 0.0), &mut ball, &mut wall);
        assert!((ball.vel() - DVec2::new(-5.0, 0.0)).length() < 1e-12);
        assert_eq!(wall.vel(), DVec2::ZERO);
    }

    #[test]
    fn test_two_immovables_noop() {
        let resolver = HitResolver::new(1.0, 0.5);
        let mut a = Body::new_wall(DVec2::ZERO, DVec2::ONE, 0);
        let mut b = Body::new_wall(DVec2::new(2.0, 0.0), DVec2::ONE, 0);
        let before = a.path_id();
        resolver.resolve_hit(0.0, DVec2::X, &mut a, &mut b);
        assert_eq!(a.path_id(), before);
    }

    #[test]
    fn test_degenerate_normal_noop() {
        let resolver = HitResolver::new(1.0, 0.5);
        let mut a = ball_at(-1.0, 1.0);
        let mut b = ball_at(1.0, -1.0);
        let (pa, pb) = (a.path_id(), b.path_id());
        resolver.resolve_hit(0.0, DVec2::ZERO, &mut a, &mut b);
        assert_eq!((a.path_id(), b.path_id()), (pa, pb));
        assert!(a.vel().is_finite() && b.vel().is_finite());
    }

    #[test]
    fn test_grip_spins_turnable_body() {
        let resolver = HitResolver::new(1.0, 1.0);
        // Ball sliding along a wall face while approaching it: tangential
        // relative motion converts into spin.
        let mut ball = Body::new(Shape::Circle { radius: 1.0 }, 1);
        ball.path_duration_max = 100.0;
        ball.set_pos_at_time(DVec2::new(0.0, 1.0), 0.0);
        ball.set_vel_at_time(DVec2::new(3.0, -1.0), 0.0);
        ball.grip = Some(1.0);
        ball.moment_of_inertia = 0.5;
        let mut wall = Body::new_wall(DVec2::new(0.0, -1.0), DVec2::new(10.0, 1.0), 0);
        wall.grip = Some(1.0);

        resolver.resolve_hit(0.0, DVec2::new(0.0, -1.0), &mut ball, &mut wall);
        assert!(ball.ang_vel() != 0.0);
        // Tangential slide is damped, not amplified.
        assert!(ball.vel().x.abs() < 3.0);
    }

    #[test]
    fn test_hit_pos_between_surfaces() {
        let resolver = HitResolver::new(1.0, 0.0);
        let a = ball_at(-1.0, 1.0);
        let b = ball_at(1.0, -1.0);
        let p = resolver.hit_pos(0.0, DVec2::X, &a, &b);
        assert!((p - DVec2::ZERO).length() < 1e-12);
    }
}
