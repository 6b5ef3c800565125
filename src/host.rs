//! Host-facing capability boundary
//!
//! The simulation host owns the world/entity/player object model and the
//! tick scheduler. This crate only reads kinematic state and toggles
//! per-observer visibility through the traits below; it never holds host
//! objects across a tick.

use uuid::Uuid;

use crate::util::vec3::Vec3;

/// Identity of a connected observer (player/client)
pub type ObserverId = Uuid;

/// Identity of a dynamic entity
pub type EntityId = Uuid;

/// Point-in-time kinematic state of an observer
#[derive(Debug, Clone)]
pub struct ObserverState {
    pub id: ObserverId,
    pub world: String,
    pub position: Vec3,
    /// View direction; not required to be normalized by the host
    pub view_dir: Vec3,
}

/// Point-in-time kinematic state of a candidate entity
#[derive(Debug, Clone)]
pub struct EntityState {
    pub id: EntityId,
    pub world: String,
    /// Entity type tag, uppercase by convention (e.g. "ZOMBIE")
    pub kind: String,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Read access to world state plus per-observer visibility toggling.
///
/// All methods are called on the simulation thread only. Reads must not
/// block on world generation or other long host operations.
pub trait SimulationHost {
    /// Names of currently loaded worlds
    fn worlds(&self) -> Vec<String>;

    /// Observers currently in the given world, in host iteration order
    fn observers(&self, world: &str) -> Vec<ObserverState>;

    /// Append entities within `radius` of `center` to `out`
    fn entities_near(&self, world: &str, center: Vec3, radius: f64, out: &mut Vec<EntityState>);

    /// Host-configured entity tracking range for a world, if any
    fn tracking_range(&self, world: &str) -> Option<f64>;

    /// World the entity currently lives in, or `None` if it vanished
    fn entity_world(&self, entity: EntityId) -> Option<String>;

    /// Toggle whether `observer` can see `entity`
    fn set_visible(&mut self, observer: ObserverId, entity: EntityId, visible: bool);
}

/// Optional network-introspection capability used by the packet interceptor.
///
/// Resolved once at startup; when the host cannot provide it the interceptor
/// disables itself. Implementations may be called from whatever thread the
/// host's outbound pipeline runs on.
pub trait PacketAccess: Send + Sync {
    /// Deliver a previously deferred spawn message to an observer
    fn resend_spawn(&self, observer: ObserverId, message: crate::packet::SpawnMessage);

    /// True if a scripted/NPC-flagged entity sits near the position
    fn scripted_entity_near(&self, world: &str, position: Vec3, radius: f64) -> bool;

    /// Per-observer particle percentage setting, 0-100
    fn particle_percent(&self, observer: ObserverId) -> u8;
}
