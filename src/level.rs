//! Level save/load envelope
//!
//! A level file is a versioned JSON document carrying the terrain bit array
//! plus one tagged record per dynamic body. Wall bodies are never saved —
//! they are derived from the terrain on load. Decoding tolerates partial
//! failure: an unknown record tag or a record with bad numbers is logged
//! and skipped so old and new builds can open each other's levels.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::phys::{Body, BodyId, Shape, World};
use crate::terrain::BitGrid;

/// Format version written into every saved level.
pub const LEVEL_FORMAT_VERSION: u32 = 1;

/// Errors that abort a load outright. Per-record problems never do.
#[derive(Debug)]
pub enum LevelError {
    Json(serde_json::Error),
}

impl std::fmt::Display for LevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelError::Json(e) => write!(f, "malformed level document: {e}"),
        }
    }
}

impl std::error::Error for LevelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LevelError::Json(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for LevelError {
    fn from(e: serde_json::Error) -> Self {
        LevelError::Json(e)
    }
}

#[derive(Serialize, Deserialize)]
struct LevelDoc {
    version: u32,
    terrain: serde_json::Value,
    /// Kept as raw values so one unknown record cannot poison the rest.
    bodies: Vec<serde_json::Value>,
}

/// One dynamic body, tagged by shape kind.
///
/// `mass`/`moment_of_inertia` use `None` for infinity — JSON has no
/// representation for it.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BodyRecord {
    Circle {
        radius: f64,
        #[serde(flatten)]
        common: BodyCommon,
    },
    Rect {
        half: DVec2,
        #[serde(flatten)]
        common: BodyCommon,
    },
}

#[derive(Serialize, Deserialize)]
struct BodyCommon {
    pos: DVec2,
    vel: DVec2,
    ang_pos: f64,
    ang_vel: f64,
    mass: Option<f64>,
    moment_of_inertia: Option<f64>,
    elasticity: Option<f64>,
    grip: Option<f64>,
    hit_group: u32,
    path_duration_max: Option<f64>,
}

/// Everything a successful load produced.
pub struct LoadedLevel {
    pub terrain: BitGrid,
    pub body_ids: Vec<BodyId>,
    /// Records dropped for unknown tags or invalid numbers.
    pub skipped: usize,
}

/// Serialize terrain plus the listed dynamic bodies at the current sim time.
pub fn save_level(world: &World, terrain: &BitGrid, body_ids: &[BodyId]) -> String {
    let now = world.now();
    let mut bodies = Vec::with_capacity(body_ids.len());
    for &id in body_ids {
        let Some(body) = world.body(id) else {
            log::warn!("save skipping dead body {id:?}");
            continue;
        };
        let common = BodyCommon {
            pos: body.pos_at_time(now),
            vel: body.vel(),
            ang_pos: body.ang_pos_at_time(now),
            ang_vel: body.ang_vel(),
            mass: finite_or_none(body.mass),
            moment_of_inertia: finite_or_none(body.moment_of_inertia),
            elasticity: body.elasticity,
            grip: body.grip,
            hit_group: body.hit_group,
            path_duration_max: finite_or_none(body.path_duration_max),
        };
        let record = match body.shape {
            Shape::Circle { radius } => BodyRecord::Circle { radius, common },
            Shape::Rect { half } => BodyRecord::Rect { half, common },
        };
        match serde_json::to_value(&record) {
            Ok(v) => bodies.push(v),
            Err(e) => log::warn!("save skipping unencodable body {id:?}: {e}"),
        }
    }

    let doc = LevelDoc {
        version: LEVEL_FORMAT_VERSION,
        terrain: terrain.to_json_value(),
        bodies,
    };
    serde_json::to_string(&doc).unwrap_or_else(|_| String::from("{}"))
}

/// Decode a level document and add its bodies to the world.
///
/// The caller wires the returned terrain into a `TileGrid` (and loads the
/// cells it cares about). A version mismatch is logged, not fatal; fields
/// the build doesn't know are ignored, records it can't read are skipped.
pub fn load_level(json: &str, world: &mut World) -> Result<LoadedLevel, LevelError> {
    let doc: LevelDoc = serde_json::from_str(json)?;
    if doc.version != LEVEL_FORMAT_VERSION {
        log::warn!(
            "level format version {} (this build writes {}), loading anyway",
            doc.version,
            LEVEL_FORMAT_VERSION
        );
    }

    let terrain = BitGrid::from_json_value(doc.terrain)?;

    let mut body_ids = Vec::new();
    let mut skipped = 0usize;
    for value in doc.bodies {
        let record: BodyRecord = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping unreadable body record: {e}");
                skipped += 1;
                continue;
            }
        };
        match body_from_record(record, world.now()) {
            Some(body) => body_ids.push(world.add_body(body)),
            None => skipped += 1,
        }
    }

    Ok(LoadedLevel {
        terrain,
        body_ids,
        skipped,
    })
}

/// Validate a record and build the body, rebasing its path at `now`.
fn body_from_record(record: BodyRecord, now: f64) -> Option<Body> {
    let (shape, common) = match record {
        BodyRecord::Circle { radius, common } => {
            if !(radius.is_finite() && radius > 0.0) {
                log::warn!("skipping circle body with radius {radius}");
                return None;
            }
            (Shape::Circle { radius }, common)
        }
        BodyRecord::Rect { half, common } => {
            if !(half.is_finite() && half.x > 0.0 && half.y > 0.0) {
                log::warn!("skipping rect body with half extents {half}");
                return None;
            }
            (Shape::Rect { half }, common)
        }
    };
    if !(common.pos.is_finite() && common.vel.is_finite())
        || !common.ang_pos.is_finite()
        || !common.ang_vel.is_finite()
    {
        log::warn!("skipping body with non-finite kinematics");
        return None;
    }

    let mut body = Body::new(shape, common.hit_group);
    // Direct field writes, then invalidate_path: the one sanctioned bypass
    // of the setters, for exactly this deserialization path.
    body.pos0 = common.pos;
    body.vel = common.vel;
    body.ang_pos0 = common.ang_pos;
    body.ang_vel = common.ang_vel;
    body.path_start_time = now;
    body.path_duration_max = common.path_duration_max.unwrap_or(f64::INFINITY);
    body.mass = common.mass.unwrap_or(f64::INFINITY);
    body.moment_of_inertia = common.moment_of_inertia.unwrap_or(f64::INFINITY);
    body.elasticity = common.elasticity;
    body.grip = common.grip;
    body.invalidate_path();
    Some(body)
}

fn finite_or_none(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
