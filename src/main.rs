//! Crumble headless demo entry point
//!
//! Seeds a world with carved terrain and a handful of bouncing bodies, then
//! steps the simulation for a stretch of sim time, logging event traffic.
//! The browser builds drive the library through a game shell instead of
//! this binary.

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    demo::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is the library's start hook; this satisfies the
    // compiler for the bin target.
}

#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use glam::DVec2;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    use crumble::level::save_level;
    use crumble::phys::{Body, Shape};
    use crumble::platform::StepBudget;
    use crumble::terrain::{BitGrid, NullRenderer, TileGrid};
    use crumble::{World, WorldConfig};

    const WALLS: u32 = 0;
    const BALLS: u32 = 1;

    const SIM_DT: f64 = 1.0 / 60.0;
    const SIM_SECONDS: u64 = 10;
    /// Per-frame wall-clock budget for event processing.
    const FRAME_BUDGET_MS: f64 = 8.0;

    pub fn run() {
        let mut world = World::new(WorldConfig::with_hit_groups(2));
        world.add_hit_pair(WALLS, BALLS);
        world.add_hit_pair(BALLS, BALLS);

        // Solid rock everywhere; carve a cave system out of it.
        let mut rng = Pcg32::seed_from_u64(0xC0FFEE);
        let mut terrain = TileGrid::new(BitGrid::new(1.0, 1), WALLS);
        let mut renderer = NullRenderer::default();

        terrain.carve(
            &mut world,
            &mut renderer,
            DVec2::new(8.0, 48.0),
            DVec2::new(120.0, 48.0),
            10.0,
        );
        for _ in 0..6 {
            let x = rng.random_range(16.0..112.0);
            let drop = rng.random_range(16.0..40.0);
            terrain.carve(
                &mut world,
                &mut renderer,
                DVec2::new(x, 48.0),
                DVec2::new(x, 48.0 + drop),
                rng.random_range(4.0..7.0),
            );
        }
        terrain.set_interest_circle(&mut world, &mut renderer, DVec2::new(64.0, 48.0), 96.0);
        log::info!(
            "terrain ready, {} wall bodies live",
            world.body_ids().len()
        );

        let mut ball_ids = Vec::new();
        for _ in 0..8 {
            let mut ball = Body::new(Shape::Circle { radius: 1.5 }, BALLS);
            ball.elasticity = Some(0.9);
            ball.grip = Some(0.3);
            ball.moment_of_inertia = 1.0;
            let pos = DVec2::new(rng.random_range(16.0..112.0), rng.random_range(44.0..52.0));
            let vel = DVec2::new(rng.random_range(-30.0..30.0), rng.random_range(-30.0..30.0));
            ball.set_pos_at_time(pos, world.now());
            ball.set_vel_at_time(vel, world.now());
            ball_ids.push(world.add_body(ball));
        }

        let mut total_hits = 0usize;
        let mut total_stale = 0usize;
        let frames = SIM_SECONDS * 60;
        for frame in 0..frames {
            let target = world.now() + SIM_DT;
            let stats = world.step(
                target,
                StepBudget::millis_from_now(FRAME_BUDGET_MS),
                &mut |w: &mut World, hit| w.resolve_hit(hit),
            );
            total_hits += stats.hits;
            total_stale += stats.stale_dropped;

            if frame % 60 == 59 {
                let sample = world
                    .body(ball_ids[0])
                    .map(|b| b.pos_at_time(world.now()))
                    .unwrap_or_default();
                log::info!(
                    "t={:>5.2} hits={total_hits} stale={total_stale} ball0=({:.1}, {:.1})",
                    world.now(),
                    sample.x,
                    sample.y,
                );
            }
        }

        let saved = save_level(&world, terrain.bit_grid(), &ball_ids);
        log::info!(
            "done: {total_hits} hits resolved, {total_stale} stale events dropped, save is {} bytes",
            saved.len()
        );
    }
}
