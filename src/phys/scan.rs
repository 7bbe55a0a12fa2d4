//! Continuous collision detection
//!
//! Pure closed-form sweeps: given two shapes and their relative motion, find
//! the earliest instant they touch. No stepping, no tolerance tuning — the
//! quadratics are solved analytically, so a fast-moving body can never
//! tunnel through a thin wall between frames.
//!
//! Conventions shared by every function here:
//! - Times are relative to the supplied positions and clamped to `[0, max_t]`
//! - The returned normal is a unit vector pointing from shape A toward shape B
//! - Pairs already overlapping at t=0 report nothing; separation is the
//!   resolver's earlier impulse doing its job, not a new contact

use glam::DVec2;

use super::body::{Body, Shape};

/// An earliest-touch result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scan {
    /// Contact time, relative to the sweep's start.
    pub time: f64,
    /// Unit contact normal, pointing from shape A toward shape B.
    pub normal: DVec2,
}

/// Smallest non-negative root of `a·t² + b·t + c = 0`.
///
/// Picks the entering root of the distance quadratic; `None` when the shapes
/// never close the gap.
fn smallest_root(a: f64, b: f64, c: f64) -> Option<f64> {
    if a.abs() < f64::EPSILON {
        // Linear: b·t + c = 0
        if b.abs() < f64::EPSILON {
            return None;
        }
        let t = -c / b;
        return (t >= 0.0).then_some(t);
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t = (-b - sqrt_disc) / (2.0 * a);
    if t >= 0.0 {
        return Some(t);
    }
    // Entering root is behind us; the other root would be an exit, not a hit.
    None
}

/// Earliest touch of two moving circles.
pub fn swept_circle_circle(
    pos_a: DVec2,
    rad_a: f64,
    vel_a: DVec2,
    pos_b: DVec2,
    rad_b: f64,
    vel_b: DVec2,
    max_t: f64,
) -> Option<Scan> {
    let d = pos_b - pos_a;
    let v = vel_b - vel_a;
    let r = rad_a + rad_b;

    let c = d.dot(d) - r * r;
    if c < 0.0 {
        // Already overlapping.
        return None;
    }

    let t = smallest_root(v.dot(v), 2.0 * d.dot(v), c)?;
    if t > max_t {
        return None;
    }
    let gap = d + v * t;
    // Touching but separating is not a hit.
    if gap.dot(v) >= 0.0 {
        return None;
    }
    Some(Scan {
        time: t,
        normal: gap.normalize(),
    })
}

/// Earliest touch of a moving circle (A) and a moving axis-aligned rect (B).
///
/// Works in the rect's frame: the circle center sweeps toward the rect's
/// Minkowski expansion — the rect grown by the circle radius, with rounded
/// corners. Flat regions are slab tests, corner regions are point-vs-circle
/// quadratics.
pub fn swept_circle_rect(
    pos_c: DVec2,
    rad: f64,
    vel_c: DVec2,
    pos_r: DVec2,
    half: DVec2,
    vel_r: DVec2,
    max_t: f64,
) -> Option<Scan> {
    let p = pos_c - pos_r;
    let v = vel_c - vel_r;

    // Already overlapping: distance from center to the rect under the radius.
    let clamped = p.clamp(-half, half);
    if (p - clamped).length_squared() < rad * rad {
        return None;
    }

    let expanded = half + DVec2::splat(rad);

    // Slab test against the expanded box.
    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;
    let mut enter_axis = 0usize;
    for axis in 0..2 {
        let (p_a, v_a, h_a) = (p[axis], v[axis], expanded[axis]);
        if v_a == 0.0 {
            if p_a.abs() >= h_a {
                return None;
            }
            continue;
        }
        let t1 = (-h_a - p_a) / v_a;
        let t2 = (h_a - p_a) / v_a;
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            enter_axis = axis;
        }
        t_exit = t_exit.min(far);
    }
    if t_enter > t_exit || t_exit < 0.0 || t_enter > max_t {
        return None;
    }

    // Flat-face hit: at box entry the center must be beside the original
    // (unexpanded) face span; otherwise it is in a corner region.
    if t_enter >= 0.0 {
        let hit_p = p + v * t_enter;
        let other = 1 - enter_axis;
        if hit_p[other].abs() <= half[other] {
            let mut n = DVec2::ZERO;
            // From the circle toward the rect.
            n[enter_axis] = -hit_p[enter_axis].signum();
            return Some(Scan {
                time: t_enter,
                normal: n,
            });
        }
    }

    // Corner regions: the circle touches one of the four corner points.
    let mut best: Option<Scan> = None;
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            let corner = DVec2::new(sx * half.x, sy * half.y);
            let d = corner - p;
            let c = d.dot(d) - rad * rad;
            if c < 0.0 {
                continue;
            }
            // Center moves with v; corner is fixed in this frame.
            if let Some(t) = smallest_root(v.dot(v), -2.0 * d.dot(v), c) {
                if t <= max_t && best.is_none_or(|s| t < s.time) {
                    // Vector from the center to the corner at contact time.
                    let gap = d - v * t;
                    if gap.dot(v) <= 0.0 {
                        // Tangent graze or separating.
                        continue;
                    }
                    best = Some(Scan {
                        time: t,
                        normal: gap.normalize(),
                    });
                }
            }
        }
    }
    best
}

/// Earliest touch of two moving axis-aligned rects (relative slab sweep).
pub fn swept_rect_rect(
    pos_a: DVec2,
    half_a: DVec2,
    vel_a: DVec2,
    pos_b: DVec2,
    half_b: DVec2,
    vel_b: DVec2,
    max_t: f64,
) -> Option<Scan> {
    let p = pos_a - pos_b;
    let v = vel_a - vel_b;
    let ext = half_a + half_b;

    if p.x.abs() < ext.x && p.y.abs() < ext.y {
        return None;
    }

    let mut t_enter = f64::NEG_INFINITY;
    let mut t_exit = f64::INFINITY;
    let mut enter_axis = 0usize;
    for axis in 0..2 {
        let (p_a, v_a, h_a) = (p[axis], v[axis], ext[axis]);
        if v_a == 0.0 {
            if p_a.abs() >= h_a {
                return None;
            }
            continue;
        }
        let t1 = (-h_a - p_a) / v_a;
        let t2 = (h_a - p_a) / v_a;
        let (near, far) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
        if near > t_enter {
            t_enter = near;
            enter_axis = axis;
        }
        t_exit = t_exit.min(far);
    }
    if t_enter > t_exit || t_enter < 0.0 || t_enter > max_t {
        return None;
    }

    let hit_p = p + v * t_enter;
    let mut n = DVec2::ZERO;
    // A sits on the `sign(hit_p)` side of B; the contact normal runs the other way.
    n[enter_axis] = -hit_p[enter_axis].signum();
    Some(Scan {
        time: t_enter,
        normal: n,
    })
}

/// Earliest hit between two bodies, in absolute sim time.
///
/// Valid only inside both bodies' common path validity window starting at
/// `from`; `horizon` additionally caps how far ahead prediction runs.
pub fn earliest_hit(a: &Body, b: &Body, from: f64, horizon: f64) -> Option<Scan> {
    let window_end = a.path_end_time().min(b.path_end_time()).min(horizon);
    let max_t = window_end - from;
    if max_t <= 0.0 {
        return None;
    }

    let pa = a.pos_at_time(from);
    let pb = b.pos_at_time(from);
    let (va, vb) = (a.vel(), b.vel());

    let scan = match (a.shape, b.shape) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            swept_circle_circle(pa, ra, va, pb, rb, vb, max_t)
        }
        (Shape::Circle { radius }, Shape::Rect { half }) => {
            swept_circle_rect(pa, radius, va, pb, half, vb, max_t)
        }
        (Shape::Rect { half }, Shape::Circle { radius }) => {
            // Swap and point the normal back from A to B.
            swept_circle_rect(pb, radius, vb, pa, half, va, max_t).map(|s| Scan {
                time: s.time,
                normal: -s.normal,
            })
        }
        (Shape::Rect { half: ha }, Shape::Rect { half: hb }) => {
            swept_rect_rect(pa, ha, va, pb, hb, vb, max_t)
        }
    };

    scan.map(|s| Scan {
        time: from + s.time,
        ..s
    })
}

/// Instantaneous overlap test between two bodies at time `t`.
pub fn bodies_overlap_at(a: &Body, b: &Body, t: f64) -> bool {
    let pa = a.pos_at_time(t);
    let pb = b.pos_at_time(t);
    match (a.shape, b.shape) {
        (Shape::Circle { radius: ra }, Shape::Circle { radius: rb }) => {
            let r = ra + rb;
            (pb - pa).length_squared() < r * r
        }
        (Shape::Circle { radius }, Shape::Rect { half }) => {
            let p = pa - pb;
            let gap = p - p.clamp(-half, half);
            gap.length_squared() < radius * radius
        }
        (Shape::Rect { half }, Shape::Circle { radius }) => {
            let p = pb - pa;
            let gap = p - p.clamp(-half, half);
            gap.length_squared() < radius * radius
        }
        (Shape::Rect { half: ha }, Shape::Rect { half: hb }) => {
            let d = pb - pa;
            let ext = ha + hb;
            d.x.abs() < ext.x && d.y.abs() < ext.y
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_on_circles() {
        // Radius-1 circles at (-3,0) and (3,0) closing at 1 unit/s each:
        // gap of 4 closes at 2 units/s, touch at t=2.
        let scan = swept_circle_circle(
            DVec2::new(-3.0, 0.0),
            1.0,
            DVec2::new(1.0, 0.0),
            DVec2::new(3.0, 0.0),
            1.0,
            DVec2::new(-1.0, 0.0),
            10.0,
        )
        .unwrap();
        assert!((scan.time - 2.0).abs() < 1e-12);
        assert!((scan.normal - DVec2::new(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_circles_miss() {
        // Parallel tracks, 3 apart, combined radius 2: never touch.
        let scan = swept_circle_circle(
            DVec2::new(0.0, 0.0),
            1.0,
            DVec2::new(1.0, 0.0),
            DVec2::new(5.0, 3.0),
            1.0,
            DVec2::new(-1.0, 0.0),
            100.0,
        );
        assert!(scan.is_none());
    }

    #[test]
    fn test_overlapping_circles_suppressed() {
        let scan = swept_circle_circle(
            DVec2::ZERO,
            1.0,
            DVec2::X,
            DVec2::new(0.5, 0.0),
            1.0,
            DVec2::ZERO,
            10.0,
        );
        assert!(scan.is_none());
    }

    #[test]
    fn test_touching_separating_circles_suppressed() {
        // Exactly touching, moving apart: the previous resolution did this.
        let scan = swept_circle_circle(
            DVec2::ZERO,
            1.0,
            DVec2::new(-1.0, 0.0),
            DVec2::new(2.0, 0.0),
            1.0,
            DVec2::new(1.0, 0.0),
            10.0,
        );
        assert!(scan.is_none());
    }

    #[test]
    fn test_hit_beyond_window_suppressed() {
        let scan = swept_circle_circle(
            DVec2::new(-3.0, 0.0),
            1.0,
            DVec2::new(1.0, 0.0),
            DVec2::new(3.0, 0.0),
            1.0,
            DVec2::new(-1.0, 0.0),
            1.5,
        );
        assert!(scan.is_none());
    }

    #[test]
    fn test_circle_rect_face_hit() {
        // Circle flying +x into the left face of a rect.
        let scan = swept_circle_rect(
            DVec2::new(-5.0, 0.0),
            1.0,
            DVec2::new(2.0, 0.0),
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 4.0),
            DVec2::ZERO,
            10.0,
        )
        .unwrap();
        // Gap from x=-4 (circle edge) to x=-1 (face) closes at 2/s.
        assert!((scan.time - 1.5).abs() < 1e-12);
        assert!((scan.normal - DVec2::new(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_circle_rect_corner_hit() {
        // Circle above and right of the rect's top-right corner, flying
        // diagonally at it.
        let scan = swept_circle_rect(
            DVec2::new(4.0, 4.0),
            0.5,
            DVec2::new(-1.0, -1.0),
            DVec2::ZERO,
            DVec2::new(1.0, 1.0),
            DVec2::ZERO,
            10.0,
        )
        .unwrap();
        // Center-to-corner distance 3√2 closes at √2/s, touch at gap 0.5.
        let expected = 3.0 - 0.5 / 2.0_f64.sqrt();
        assert!((scan.time - expected).abs() < 1e-9);
        // Normal points diagonally from circle toward the corner.
        assert!(scan.normal.x < 0.0 && scan.normal.y < 0.0);
    }

    #[test]
    fn test_circle_rect_overlap_suppressed() {
        let scan = swept_circle_rect(
            DVec2::new(1.2, 0.0),
            0.5,
            DVec2::new(-1.0, 0.0),
            DVec2::ZERO,
            DVec2::ONE,
            DVec2::ZERO,
            10.0,
        );
        assert!(scan.is_none());
    }

    #[test]
    fn test_rect_rect_hit() {
        let scan = swept_rect_rect(
            DVec2::new(-5.0, 0.0),
            DVec2::ONE,
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 0.0),
            DVec2::ONE,
            DVec2::ZERO,
            10.0,
        )
        .unwrap();
        // Gap from x=-4 to x=-2 at 1/s.
        assert!((scan.time - 3.0).abs() < 1e-12);
        assert!((scan.normal - DVec2::new(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_earliest_hit_scenario() {
        use crate::phys::body::{Body, Shape};

        let mut a = Body::new(Shape::Circle { radius: 1.0 }, 1);
        a.set_pos_at_time(DVec2::new(-3.0, 0.0), 0.0);
        a.set_vel_at_time(DVec2::new(1.0, 0.0), 0.0);
        a.path_duration_max = 10.0;

        let mut b = Body::new(Shape::Circle { radius: 1.0 }, 1);
        b.set_pos_at_time(DVec2::new(3.0, 0.0), 0.0);
        b.set_vel_at_time(DVec2::new(-1.0, 0.0), 0.0);
        b.path_duration_max = 10.0;

        let scan = earliest_hit(&a, &b, 0.0, f64::INFINITY).unwrap();
        assert!((scan.time - 2.0).abs() < 1e-12);
        assert!(scan.normal.x.abs() > 0.999);
    }

    #[test]
    fn test_earliest_hit_respects_window() {
        use crate::phys::body::{Body, Shape};

        let mut a = Body::new(Shape::Circle { radius: 1.0 }, 1);
        a.set_pos_at_time(DVec2::new(-3.0, 0.0), 0.0);
        a.set_vel_at_time(DVec2::new(1.0, 0.0), 0.0);
        a.path_duration_max = 1.0; // expires before the t=2 contact

        let mut b = Body::new(Shape::Circle { radius: 1.0 }, 1);
        b.set_pos_at_time(DVec2::new(3.0, 0.0), 0.0);
        b.set_vel_at_time(DVec2::new(-1.0, 0.0), 0.0);
        b.path_duration_max = 10.0;

        assert!(earliest_hit(&a, &b, 0.0, f64::INFINITY).is_none());
    }
}
