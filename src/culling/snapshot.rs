//! Snapshot builder
//!
//! Runs on the simulation thread and gathers a point-in-time, world-local
//! view of observers and candidate entities. The resulting [`Snapshot`] is
//! handed to the compute worker and never mutated afterwards.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::CullingConfig;
use crate::host::{EntityId, ObserverId, SimulationHost};
use crate::util::vec3::Vec3;

/// World-space chunk edge length used by the chunk-radius filter
const CHUNK_SIZE: f64 = 16.0;

/// Floor of the gather radius regardless of configuration
const MIN_GATHER_RADIUS: f64 = 8.0;

/// Padding added to max-distance / tracking-range when gathering
const GATHER_PADDING: f64 = 4.0;

/// Immutable observer state captured for one computation
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub id: ObserverId,
    pub position: Vec3,
    /// View direction as reported by the host; normalized during compute
    pub view_dir: Vec3,
}

/// Immutable candidate-entity state captured for one computation.
/// De-duplicated by identity across observers within one snapshot.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub world: String,
    pub kind: String,
    pub position: Vec3,
    pub speed: f64,
}

/// One unit of work for the compute engine
#[derive(Debug, Default)]
pub struct Snapshot {
    pub players_by_world: FxHashMap<String, Vec<PlayerSnapshot>>,
    pub entities: Vec<EntitySnapshot>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() || self.players_by_world.is_empty()
    }
}

/// Gather radius: padded max-distance, clamped by the world's tracking
/// range (when known) and floored at [`MIN_GATHER_RADIUS`].
fn gather_radius(max_distance: f64, tracking_range: Option<f64>) -> f64 {
    let ceiling = match tracking_range {
        Some(tr) if tr > 0.0 => (max_distance + GATHER_PADDING).min(tr + GATHER_PADDING),
        _ => max_distance + GATHER_PADDING,
    };
    ceiling.max(MIN_GATHER_RADIUS)
}

#[inline]
fn chunk_coord(v: f64) -> i32 {
    (v / CHUNK_SIZE).floor() as i32
}

/// Builds snapshots on the simulation thread. Read-only against the host;
/// the per-call scratch vector is reused across ticks.
pub struct SnapshotBuilder {
    nearby_scratch: Vec<crate::host::EntityState>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            nearby_scratch: Vec::with_capacity(256),
        }
    }

    /// Capture all distinct candidate entities around any observer, subject
    /// to the world/kind/chunk filters and the hard cap. Returns an empty
    /// snapshot when no world has both observers and candidates.
    pub fn build(&mut self, host: &dyn SimulationHost, config: &CullingConfig) -> Snapshot {
        let cap = config.max_entities_per_tick;
        let mut players_by_world: FxHashMap<String, Vec<PlayerSnapshot>> = FxHashMap::default();
        let mut entities: Vec<EntitySnapshot> = Vec::with_capacity(cap.min(256));
        let mut seen: FxHashSet<EntityId> = FxHashSet::default();

        'worlds: for world in host.worlds() {
            if !config.worlds_include.is_empty() && !config.worlds_include.contains(&world) {
                continue;
            }
            if config.worlds_exclude.contains(&world) {
                continue;
            }
            let observers = host.observers(&world);
            if observers.is_empty() {
                continue;
            }

            let radius = gather_radius(config.max_distance, host.tracking_range(&world));

            // Players go in first so a cap-induced early exit below never
            // leaves this world's entities without their observers
            let snaps: Vec<PlayerSnapshot> = observers
                .iter()
                .map(|o| PlayerSnapshot {
                    id: o.id,
                    position: o.position,
                    view_dir: o.view_dir,
                })
                .collect();
            players_by_world.insert(world.clone(), snaps);

            for observer in &observers {
                self.nearby_scratch.clear();
                host.entities_near(&world, observer.position, radius, &mut self.nearby_scratch);

                for entity in &self.nearby_scratch {
                    if entities.len() >= cap {
                        break 'worlds;
                    }
                    if entity.world != world {
                        continue;
                    }
                    if seen.contains(&entity.id) {
                        continue; // de-dup across observers
                    }
                    if !config.whitelist.is_empty() && !config.whitelist.contains(&entity.kind) {
                        continue;
                    }
                    if config.blacklist.contains(&entity.kind) {
                        continue;
                    }
                    if config.chunk_radius > 0 {
                        let dx = (chunk_coord(observer.position.x)
                            - chunk_coord(entity.position.x))
                        .abs();
                        let dz = (chunk_coord(observer.position.z)
                            - chunk_coord(entity.position.z))
                        .abs();
                        if dx > config.chunk_radius || dz > config.chunk_radius {
                            continue;
                        }
                    }

                    entities.push(EntitySnapshot {
                        id: entity.id,
                        world: world.clone(),
                        kind: entity.kind.clone(),
                        position: entity.position,
                        speed: entity.velocity.length(),
                    });
                    seen.insert(entity.id);
                }
            }
        }

        if entities.is_empty() {
            return Snapshot::default();
        }
        Snapshot {
            players_by_world,
            entities,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
