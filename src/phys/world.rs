//! World orchestration
//!
//! The world owns the body arena, the spirit registry, the event queue and
//! the broad-phase index, and drives them from one entry point: `step`.
//! Gameplay mutates bodies through `body_mut` (or the hit/timeout callbacks);
//! the world notices the path generation change, re-indexes the body and
//! re-predicts its collisions. Nothing else in the engine polls anything.

use std::collections::{HashMap, HashSet};

use glam::DVec2;

use crate::config::WorldConfig;
use crate::platform::StepBudget;

use super::body::{Body, BodyId, PathId};
use super::queue::{EventQueue, HitEvent, TimeoutEvent, WorldEvent};
use super::resolver::HitResolver;
use super::scan;
use super::spatial::{CellRect, GridCell, SpatialIndex};
use super::spirit::{Spirit, SpiritId, TimeoutValue};

/// Tolerance for the per-pair "already resolved at this time" guard.
const PAIR_GUARD_EPS: f64 = 1e-9;

/// Where a body currently sits in the broad-phase index.
#[derive(Debug, Clone, Copy)]
struct IndexedRange {
    range: CellRect,
    group: u32,
    path_id: PathId,
}

#[derive(Debug)]
struct BodySlot {
    body: Body,
    indexed: Option<IndexedRange>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<BodySlot>,
}

/// Result of a swept-circle query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rayscan {
    /// Fraction of the displacement travelled before contact, in [0, 1].
    pub time_fraction: f64,
    pub body: BodyId,
    /// Unit normal pointing from the query circle toward the hit body.
    pub normal: DVec2,
}

/// Counters from one `step` call, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    pub hits: usize,
    pub timeouts: usize,
    pub stale_dropped: usize,
}

/// The simulation: clock, bodies, spirits, events, broad phase.
pub struct World {
    config: WorldConfig,
    resolver: HitResolver,
    now: f64,

    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Bodies handed out mutably since the last validation pass.
    touched: Vec<BodyId>,

    spirits: HashMap<SpiritId, Box<dyn Spirit>>,
    next_spirit_id: u64,
    /// Spirit currently detached for an `on_timeout` call, if any.
    dispatching_spirit: Option<SpiritId>,
    dispatching_spirit_removed: bool,

    queue: EventQueue,
    index: SpatialIndex,
    /// Symmetric `group_count × group_count` collision-eligibility matrix.
    hit_pairs: Vec<bool>,
    /// Last resolved hit time per body pair, to suppress re-reports of the
    /// same contact instant.
    recent_hits: HashMap<(BodyId, BodyId), f64>,
    next_refresh: f64,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        let groups = config.hit_group_count as usize;
        let resolver = HitResolver::new(config.default_elasticity, config.default_grip);
        let index = SpatialIndex::new(config.cell_size, groups);
        let next_refresh = config.path_refresh_period;
        Self {
            config,
            resolver,
            now: 0.0,
            slots: Vec::new(),
            free: Vec::new(),
            touched: Vec::new(),
            spirits: HashMap::new(),
            next_spirit_id: 1,
            dispatching_spirit: None,
            dispatching_spirit_removed: false,
            queue: EventQueue::new(),
            index,
            hit_pairs: vec![false; groups * groups],
            recent_hits: HashMap::new(),
            next_refresh,
        }
    }

    /// Current sim time.
    #[inline]
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn resolver(&self) -> &HitResolver {
        &self.resolver
    }

    // === Collision filtering ===

    /// Declare that two hit groups may collide. Symmetric.
    pub fn add_hit_pair(&mut self, a: u32, b: u32) {
        let n = self.config.hit_group_count;
        assert!(a < n && b < n, "hit group out of range");
        let n = n as usize;
        self.hit_pairs[a as usize * n + b as usize] = true;
        self.hit_pairs[b as usize * n + a as usize] = true;
    }

    /// Whether two groups are eligible to collide at all.
    #[inline]
    pub fn may_collide(&self, a: u32, b: u32) -> bool {
        let n = self.config.hit_group_count as usize;
        let (a, b) = (a as usize, b as usize);
        a < n && b < n && self.hit_pairs[a * n + b]
    }

    // === Body arena ===

    /// Register a body. Its path window must contain the current sim time.
    pub fn add_body(&mut self, body: Body) -> BodyId {
        debug_assert!(
            body.contains_time(self.now),
            "added body's path window must contain now"
        );
        debug_assert!(body.hit_group < self.config.hit_group_count);

        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = BodyId {
            index,
            generation: slot.generation,
        };
        slot.entry = Some(BodySlot {
            body,
            indexed: None,
        });
        self.touched.push(id);
        self.validate_bodies();
        id
    }

    /// Remove a body, returning it. Pending events against it go stale.
    pub fn remove_body(&mut self, id: BodyId) -> Option<Body> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        if let Some(ix) = entry.indexed {
            self.index.remove(id, ix.group, ix.range);
        }
        slot.generation += 1;
        self.free.push(id.index);
        Some(entry.body)
    }

    /// Read a body. Freely shareable; mutation goes through `body_mut`.
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref().map(|e| &e.body)
    }

    /// Mutable body access.
    ///
    /// The world assumes the path may change and will re-validate the body
    /// before the next event is chosen.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        match slot.entry.as_mut() {
            Some(e) => {
                self.touched.push(id);
                Some(&mut e.body)
            }
            None => None,
        }
    }

    /// Ids of all live bodies, in slot order.
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entry.is_some())
            .map(|(i, s)| BodyId {
                index: i as u32,
                generation: s.generation,
            })
            .collect()
    }

    fn body_pair_mut(&mut self, a: BodyId, b: BodyId) -> Option<(&mut Body, &mut Body)> {
        if a.index == b.index {
            return None;
        }
        // Liveness checks up front so the split below can't alias dead slots.
        self.body(a)?;
        self.body(b)?;
        let (i, j) = (a.index as usize, b.index as usize);
        let (lo, hi) = (i.min(j), i.max(j));
        let (left, right) = self.slots.split_at_mut(hi);
        let lo_body = &mut left[lo].entry.as_mut()?.body;
        let hi_body = &mut right[0].entry.as_mut()?.body;
        if i < j {
            Some((lo_body, hi_body))
        } else {
            Some((hi_body, lo_body))
        }
    }

    // === Spirits & timeouts ===

    /// Register a spirit, returning its id.
    pub fn add_spirit(&mut self, spirit: Box<dyn Spirit>) -> SpiritId {
        let id = SpiritId(self.next_spirit_id);
        self.next_spirit_id += 1;
        self.spirits.insert(id, spirit);
        id
    }

    /// Remove a spirit and every timeout it still has pending.
    pub fn remove_spirit(&mut self, id: SpiritId) -> Option<Box<dyn Spirit>> {
        self.remove_timeouts_for_spirit(id);
        if self.dispatching_spirit == Some(id) {
            // It is removing itself from inside its own callback; the box is
            // on the call stack, just don't put it back.
            self.dispatching_spirit_removed = true;
            return None;
        }
        self.spirits.remove(&id)
    }

    /// Schedule a timeout callback for `spirit_id` at sim time `time`.
    pub fn add_timeout(&mut self, time: f64, spirit_id: SpiritId, value: TimeoutValue) {
        self.queue.insert(WorldEvent::Timeout(TimeoutEvent {
            time,
            spirit_id,
            value,
        }));
    }

    /// The spirit currently inside its `on_timeout` callback, if any.
    ///
    /// Lets a spirit reschedule itself without carrying its own id around.
    pub fn current_spirit(&self) -> Option<SpiritId> {
        self.dispatching_spirit
    }

    /// Drop all pending timeouts owned by one spirit.
    pub fn remove_timeouts_for_spirit(&mut self, id: SpiritId) {
        self.queue
            .retain(|e| !matches!(e, WorldEvent::Timeout(t) if t.spirit_id == id));
    }

    // === Stepping ===

    /// Advance the simulation to `target_time`, dispatching every due event,
    /// or stop early when the wall-clock budget expires.
    ///
    /// Hit events go to `on_hit` (which normally calls
    /// [`World::resolve_hit`] plus its own game consequences); timeout
    /// events go to the owning spirit. On an expired budget the clock lags
    /// behind wall time and the remaining events keep their order — load
    /// sheds as latency, never as corruption.
    pub fn step<F>(&mut self, target_time: f64, budget: StepBudget, on_hit: &mut F) -> StepStats
    where
        F: FnMut(&mut World, &HitEvent),
    {
        debug_assert!(target_time >= self.now);
        let mut stats = StepStats::default();

        loop {
            self.validate_bodies();

            // The refresh sweep fires like an internal event, on its own
            // cadence, whether or not anything else is scheduled.
            let next_event_time = self.queue.peek_min().map(WorldEvent::time);
            if self.next_refresh <= target_time
                && next_event_time.is_none_or(|t| self.next_refresh <= t)
            {
                self.now = self.now.max(self.next_refresh);
                self.refresh_paths();
                continue;
            }

            let Some(next_time) = next_event_time else {
                self.now = self.now.max(target_time);
                break;
            };
            if next_time > target_time {
                self.now = target_time;
                break;
            }
            if budget.expired() {
                // Out of frame budget: advance only to the edge of what was
                // actually processed.
                self.now = self.now.max(next_time.min(target_time));
                log::debug!(
                    "step budget expired at sim t={:.3} with {} events pending",
                    self.now,
                    self.queue.len()
                );
                break;
            }

            let Some(event) = self.queue.pop_min() else {
                break;
            };
            self.now = self.now.max(event.time());

            match event {
                WorldEvent::Hit(hit) => {
                    if self.hit_is_fresh(&hit) {
                        stats.hits += 1;
                        self.recent_hits.insert(pair_key(hit.body_a, hit.body_b), hit.time);
                        on_hit(self, &hit);
                    } else {
                        // Expected outcome of invalidate-and-reschedule.
                        stats.stale_dropped += 1;
                        log::trace!("dropped stale hit event at t={:.3}", hit.time);
                    }
                }
                WorldEvent::Timeout(timeout) => {
                    stats.timeouts += 1;
                    self.dispatch_timeout(timeout);
                }
            }
        }
        stats
    }

    /// Both referenced paths are still the live ones.
    fn hit_is_fresh(&self, hit: &HitEvent) -> bool {
        let fresh = |id: BodyId, path: PathId| self.body(id).is_some_and(|b| b.path_id() == path);
        fresh(hit.body_a, hit.path_a) && fresh(hit.body_b, hit.path_b)
    }

    fn dispatch_timeout(&mut self, timeout: TimeoutEvent) {
        let Some(mut spirit) = self.spirits.remove(&timeout.spirit_id) else {
            log::trace!("timeout for missing spirit {:?}", timeout.spirit_id);
            return;
        };
        self.dispatching_spirit = Some(timeout.spirit_id);
        self.dispatching_spirit_removed = false;
        spirit.on_timeout(self, timeout.value);
        self.dispatching_spirit = None;
        if !self.dispatching_spirit_removed {
            self.spirits.insert(timeout.spirit_id, spirit);
        }
    }

    /// Apply the standard impulse response for a dispatched hit.
    pub fn resolve_hit(&mut self, hit: &HitEvent) {
        let resolver = self.resolver.clone();
        if let Some((a, b)) = self.body_pair_mut(hit.body_a, hit.body_b) {
            resolver.resolve_hit(hit.time, hit.normal, a, b);
        }
        self.touched.push(hit.body_a);
        self.touched.push(hit.body_b);
    }

    // === Path validation & prediction ===

    /// Re-index and re-predict every body whose path generation moved since
    /// it was last indexed.
    fn validate_bodies(&mut self) {
        if self.touched.is_empty() {
            return;
        }
        let mut ids: Vec<BodyId> = std::mem::take(&mut self.touched);
        ids.sort_unstable();
        ids.dedup();

        let mut seen_pairs: HashSet<(BodyId, BodyId)> = HashSet::new();
        for id in ids {
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation {
                continue;
            }
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            let path_id = entry.body.path_id();
            if entry.indexed.is_some_and(|ix| ix.path_id == path_id) {
                // Read-only borrow via body_mut; nothing actually changed.
                continue;
            }

            let horizon = self.now + self.config.max_path_duration;
            let (min, max) = entry.body.swept_bounds(horizon);
            let group = entry.body.hit_group;
            let range = self.index.cell_range(min, max);
            let old = entry.indexed.replace(IndexedRange {
                range,
                group,
                path_id,
            });
            if let Some(old) = old {
                self.index.remove(id, old.group, old.range);
            }
            self.index.insert(id, group, range);
            self.schedule_hits_for(id, range, group, &mut seen_pairs);
        }
    }

    /// Predict and enqueue the earliest hit against every eligible neighbor.
    fn schedule_hits_for(
        &mut self,
        id: BodyId,
        range: CellRect,
        group: u32,
        seen_pairs: &mut HashSet<(BodyId, BodyId)>,
    ) {
        let horizon = self.now + self.config.max_path_duration;
        let groups = self.config.hit_group_count;
        let mut hits: Vec<HitEvent> = Vec::new();

        {
            let Some(body) = self.body(id) else { return };
            for cell in range.cells() {
                for other_group in 0..groups {
                    if !self.may_collide(group, other_group) {
                        continue;
                    }
                    for &other_id in self.index.bodies_in_cell_and_group(cell, other_group) {
                        if other_id == id {
                            continue;
                        }
                        let key = pair_key(id, other_id);
                        if !seen_pairs.insert(key) {
                            continue;
                        }
                        let Some(other) = self.body(other_id) else {
                            continue;
                        };
                        let Some(s) = scan::earliest_hit(body, other, self.now, horizon) else {
                            continue;
                        };
                        // Same contact instant this pair already resolved.
                        if self
                            .recent_hits
                            .get(&key)
                            .is_some_and(|t| s.time <= t + PAIR_GUARD_EPS)
                        {
                            continue;
                        }
                        hits.push(HitEvent {
                            time: s.time,
                            body_a: id,
                            path_a: body.path_id(),
                            body_b: other_id,
                            path_b: other.path_id(),
                            normal: s.normal,
                        });
                    }
                }
            }
        }

        for hit in hits {
            self.queue.insert(WorldEvent::Hit(hit));
        }
    }

    /// Rebase long-lived moving paths so evaluators never leave a trusted
    /// window. Fired by `step` on a fixed sim-time cadence.
    fn refresh_paths(&mut self) {
        self.next_refresh += self.config.path_refresh_period;

        let horizon = self.now + self.config.path_refresh_period;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            let body = &mut entry.body;
            let moving = body.vel() != DVec2::ZERO || body.ang_vel() != 0.0;
            if !moving {
                continue;
            }
            let overlong = body.path_duration_max > self.config.max_path_duration;
            let expiring = body.path_end_time() < horizon;
            if overlong || expiring {
                body.move_to_time(self.now);
                self.touched.push(BodyId {
                    index: i as u32,
                    generation: slot.generation,
                });
            }
        }

        // The guard table only needs to remember the recent past.
        let cutoff = self.now - self.config.path_refresh_period;
        self.recent_hits.retain(|_, t| *t >= cutoff);
    }

    // === Broad-phase queries ===

    /// Sweep a circle of `radius` from `origin` along `displacement` and
    /// return the first body of an eligible group it touches.
    ///
    /// Bodies are sampled at the current sim time and treated as stationary
    /// for the duration of the sweep; `groups` filters the candidates.
    /// Bodies already overlapping the query at its origin are not reported.
    pub fn rayscan(
        &self,
        origin: DVec2,
        displacement: DVec2,
        radius: f64,
        groups: &[u32],
    ) -> Option<Rayscan> {
        use super::body::Shape;

        let pad = DVec2::splat(radius);
        let end = origin + displacement;
        let range = self.index.cell_range(origin.min(end) - pad, origin.max(end) + pad);

        let mut seen: HashSet<BodyId> = HashSet::new();
        let mut best: Option<Rayscan> = None;
        for cell in range.cells() {
            for &g in groups {
                for &id in self.index.bodies_in_cell_and_group(cell, g) {
                    if !seen.insert(id) {
                        continue;
                    }
                    let Some(body) = self.body(id) else { continue };
                    let pos = body.pos_at_time(self.now);
                    let s = match body.shape {
                        Shape::Circle { radius: rb } => scan::swept_circle_circle(
                            origin,
                            radius,
                            displacement,
                            pos,
                            rb,
                            DVec2::ZERO,
                            1.0,
                        ),
                        Shape::Rect { half } => scan::swept_circle_rect(
                            origin,
                            radius,
                            displacement,
                            pos,
                            half,
                            DVec2::ZERO,
                            1.0,
                        ),
                    };
                    if let Some(s) = s {
                        if best.is_none_or(|b| s.time < b.time_fraction) {
                            best = Some(Rayscan {
                                time_fraction: s.time,
                                body: id,
                                normal: s.normal,
                            });
                        }
                    }
                }
            }
        }
        best
    }

    /// Bodies whose shapes overlap `id`'s shape right now, among groups it
    /// may collide with.
    pub fn body_overlaps(&self, id: BodyId) -> Vec<BodyId> {
        let Some(body) = self.body(id) else {
            return Vec::new();
        };
        let half = body.shape.bounding_half();
        let pos = body.pos_at_time(self.now);
        let range = self.index.cell_range(pos - half, pos + half);

        let mut seen: HashSet<BodyId> = HashSet::new();
        let mut out = Vec::new();
        for cell in range.cells() {
            for g in 0..self.config.hit_group_count {
                if !self.may_collide(body.hit_group, g) {
                    continue;
                }
                for &other_id in self.index.bodies_in_cell_and_group(cell, g) {
                    if other_id == id || !seen.insert(other_id) {
                        continue;
                    }
                    let Some(other) = self.body(other_id) else {
                        continue;
                    };
                    if scan::bodies_overlap_at(body, other, self.now) {
                        out.push(other_id);
                    }
                }
            }
        }
        out
    }

    /// Append every broad-phase cell id whose square overlaps the circle.
    pub fn add_cell_ids_overlapping_circle(
        &self,
        out: &mut Vec<GridCell>,
        center: DVec2,
        radius: f64,
    ) {
        self.index.add_cell_ids_overlapping_circle(out, center, radius);
    }

    /// Append the spirit ids of bodies indexed in one cell and group.
    pub fn add_spirit_ids_in_cell_and_group(
        &self,
        out: &mut Vec<SpiritId>,
        cell: GridCell,
        group: u32,
    ) {
        for &id in self.index.bodies_in_cell_and_group(cell, group) {
            if let Some(spirit_id) = self.body(id).and_then(|b| b.spirit_id) {
                out.push(spirit_id);
            }
        }
    }
}

/// Canonical unordered pair key.
#[inline]
fn pair_key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::body::Shape;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_config() -> WorldConfig {
        WorldConfig {
            cell_size: 4.0,
            hit_group_count: 3,
            ..WorldConfig::default()
        }
    }

    fn ball(x: f64, vx: f64, group: u32) -> Body {
        let mut b = Body::new(Shape::Circle { radius: 1.0 }, group);
        b.elasticity = Some(1.0);
        b.grip = Some(0.0);
        b.set_pos_at_time(DVec2::new(x, 0.0), 0.0);
        b.set_vel_at_time(DVec2::new(vx, 0.0), 0.0);
        b
    }

    fn resolve_handler() -> impl FnMut(&mut World, &HitEvent) {
        |world: &mut World, hit: &HitEvent| world.resolve_hit(hit)
    }

    #[test]
    fn test_head_on_scenario() {
        let mut world = World::new(test_config());
        world.add_hit_pair(1, 1);
        let a = world.add_body(ball(-3.0, 1.0, 1));
        let b = world.add_body(ball(3.0, -1.0, 1));

        let stats = world.step(5.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.hits, 1);
        assert_eq!(world.now(), 5.0);

        // Velocities swapped by the elastic head-on hit at t=2.
        assert!((world.body(a).unwrap().vel() - DVec2::new(-1.0, 0.0)).length() < 1e-9);
        assert!((world.body(b).unwrap().vel() - DVec2::new(1.0, 0.0)).length() < 1e-9);
        // And the bodies flew apart afterwards.
        assert!(world.body(a).unwrap().pos_at_time(5.0).x < -3.0);
    }

    #[test]
    fn test_hit_groups_filter() {
        let mut world = World::new(test_config());
        // Groups 1 and 2 never declared as a pair: the bodies pass through.
        let a = world.add_body(ball(-3.0, 1.0, 1));
        let _b = world.add_body(ball(3.0, -1.0, 2));

        let stats = world.step(5.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.hits, 0);
        assert!((world.body(a).unwrap().vel() - DVec2::new(1.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_stale_hit_dropped_after_path_change() {
        let mut world = World::new(test_config());
        world.add_hit_pair(1, 1);
        let a = world.add_body(ball(-3.0, 1.0, 1));
        let _b = world.add_body(ball(3.0, -1.0, 1));

        // Veer body A away before the predicted t=2 contact.
        world.step(1.0, StepBudget::Unlimited, &mut resolve_handler());
        let now = world.now();
        world
            .body_mut(a)
            .unwrap()
            .set_vel_at_time(DVec2::new(0.0, 5.0), now);

        let stats = world.step(5.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.hits, 0);
        assert!(stats.stale_dropped >= 1);
    }

    #[test]
    fn test_removed_body_makes_hit_stale() {
        let mut world = World::new(test_config());
        world.add_hit_pair(1, 1);
        let a = world.add_body(ball(-3.0, 1.0, 1));
        let _b = world.add_body(ball(3.0, -1.0, 1));

        world.remove_body(a);
        let stats = world.step(5.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.hits, 0);
    }

    struct RecordingSpirit {
        log: Rc<RefCell<Vec<(f64, TimeoutValue)>>>,
        reschedule: bool,
    }

    impl Spirit for RecordingSpirit {
        fn on_timeout(&mut self, world: &mut World, value: TimeoutValue) {
            self.log.borrow_mut().push((world.now(), value));
            if self.reschedule && value < 3 {
                let id = world.current_spirit().unwrap_or(SpiritId(0));
                world.add_timeout(world.now() + 1.0, id, value + 1);
            }
        }
    }

    #[test]
    fn test_timeout_dispatch_and_reschedule() {
        let mut world = World::new(test_config());
        let log = Rc::new(RefCell::new(Vec::new()));
        let spirit_id = world.add_spirit(Box::new(RecordingSpirit {
            log: Rc::clone(&log),
            reschedule: true,
        }));
        world.add_timeout(1.0, spirit_id, 1);

        let stats = world.step(10.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.timeouts, 3);
        assert_eq!(*log.borrow(), vec![(1.0, 1), (2.0, 2), (3.0, 3)]);
    }

    #[test]
    fn test_remove_spirit_drops_timeouts() {
        let mut world = World::new(test_config());
        let log = Rc::new(RefCell::new(Vec::new()));
        let spirit_id = world.add_spirit(Box::new(RecordingSpirit {
            log: Rc::clone(&log),
            reschedule: false,
        }));
        world.add_timeout(1.0, spirit_id, 1);
        world.add_timeout(2.0, spirit_id, 2);
        world.remove_spirit(spirit_id);

        let stats = world.step(10.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.timeouts, 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_expired_budget_lags_clock() {
        let mut world = World::new(test_config());
        let spirit_id = world.add_spirit(Box::new(RecordingSpirit {
            log: Rc::new(RefCell::new(Vec::new())),
            reschedule: false,
        }));
        world.add_timeout(1.0, spirit_id, 1);
        world.add_timeout(2.0, spirit_id, 2);

        let expired = StepBudget::Until(crate::platform::now_ms() - 1000.0);
        let stats = world.step(5.0, expired, &mut resolve_handler());
        assert_eq!(stats.timeouts, 0);
        // Clock advanced only to the first unprocessed event.
        assert_eq!(world.now(), 1.0);

        // Order is preserved when the budget comes back.
        let stats = world.step(5.0, StepBudget::Unlimited, &mut resolve_handler());
        assert_eq!(stats.timeouts, 2);
        assert_eq!(world.now(), 5.0);
    }

    #[test]
    fn test_path_refresh_keeps_windows_alive() {
        let mut world = World::new(test_config());
        // Endless path on a moving body: only the refresh sweep keeps its
        // window containing `now`.
        let mut b = ball(0.0, 1.0, 1);
        b.path_duration_max = f64::INFINITY;
        let id = world.add_body(b);

        world.step(50.0, StepBudget::Unlimited, &mut resolve_handler());
        let body = world.body(id).unwrap();
        assert!(body.contains_time(world.now()));
        assert!((body.pos_at_time(50.0) - DVec2::new(50.0, 0.0)).length() < 1e-9);
        // The sweep actually rebased it; the path no longer starts at 0.
        assert!(body.path_start_time() > 0.0);
    }

    #[test]
    fn test_rayscan_hits_closest() {
        let mut world = World::new(test_config());
        world.add_hit_pair(1, 1);
        let near = world.add_body(ball(5.0, 0.0, 1));
        let _far = world.add_body(ball(9.0, 0.0, 1));

        let scan = world
            .rayscan(DVec2::ZERO, DVec2::new(20.0, 0.0), 0.5, &[1])
            .unwrap();
        assert_eq!(scan.body, near);
        // Query edge at 0.5 meets the near ball edge at x=4.
        assert!((scan.time_fraction - 3.5 / 20.0).abs() < 1e-9);
        assert!((scan.normal - DVec2::new(1.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_rayscan_group_filter() {
        let mut world = World::new(test_config());
        let _wall = world.add_body(Body::new_wall(DVec2::new(5.0, 0.0), DVec2::ONE, 0));
        assert!(world.rayscan(DVec2::ZERO, DVec2::new(20.0, 0.0), 0.5, &[1]).is_none());
        assert!(world.rayscan(DVec2::ZERO, DVec2::new(20.0, 0.0), 0.5, &[0]).is_some());
    }

    #[test]
    fn test_body_overlaps() {
        let mut world = World::new(test_config());
        world.add_hit_pair(1, 1);
        let a = world.add_body(ball(0.0, 0.0, 1));
        let b = world.add_body(ball(1.5, 0.0, 1));
        let _far = world.add_body(ball(10.0, 0.0, 1));

        assert_eq!(world.body_overlaps(a), vec![b]);
    }

    #[test]
    fn test_spirit_ids_in_cell_and_group() {
        let mut world = World::new(test_config());
        let spirit_id = world.add_spirit(Box::new(RecordingSpirit {
            log: Rc::new(RefCell::new(Vec::new())),
            reschedule: false,
        }));
        let mut b = ball(1.0, 0.0, 1);
        b.spirit_id = Some(spirit_id);
        world.add_body(b);

        let mut out = Vec::new();
        let cell = world.index.cell_at(DVec2::new(1.0, 0.0));
        world.add_spirit_ids_in_cell_and_group(&mut out, cell, 1);
        assert_eq!(out, vec![spirit_id]);
    }
}
