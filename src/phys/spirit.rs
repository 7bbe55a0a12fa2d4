//! The narrow world↔gameplay contract
//!
//! Spirits are the game-side brains attached to bodies. The engine never
//! inspects them; it only forwards timeout events. Everything else a spirit
//! does happens through the public `World` API from its own code.

use serde::{Deserialize, Serialize};

use super::world::World;

/// Stable handle to a registered spirit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpiritId(pub u64);

/// Opaque payload a spirit attaches to its own timeouts.
pub type TimeoutValue = u64;

/// A game entity driven by timeout events.
///
/// Implementations typically hold their `SpiritId` and the `BodyId` of the
/// body they steer; the engine requires neither.
pub trait Spirit {
    /// Called when a timeout this spirit scheduled comes due.
    ///
    /// The spirit is temporarily detached from the registry for the duration
    /// of the call, so it may freely mutate the world — including scheduling
    /// new timeouts or removing itself.
    fn on_timeout(&mut self, world: &mut World, value: TimeoutValue);
}
