//! In-memory host used by unit tests

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::host::{EntityId, EntityState, ObserverId, ObserverState, SimulationHost};
use crate::util::vec3::Vec3;

/// Route log output through the test harness, filtered by `RUST_LOG`.
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted world state plus a log of visibility calls
#[derive(Debug, Default)]
pub struct MockHost {
    pub observers: Vec<ObserverState>,
    pub entities: Vec<EntityState>,
    pub tracking_ranges: FxHashMap<String, f64>,
    /// Every `set_visible` call in order: (observer, entity, visible)
    pub visibility_log: Vec<(ObserverId, EntityId, bool)>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, world: &str, position: Vec3, view_dir: Vec3) -> ObserverId {
        let id = Uuid::new_v4();
        self.observers.push(ObserverState {
            id,
            world: world.to_string(),
            position,
            view_dir,
        });
        id
    }

    pub fn add_entity(&mut self, world: &str, kind: &str, position: Vec3, velocity: Vec3) -> EntityId {
        let id = Uuid::new_v4();
        self.entities.push(EntityState {
            id,
            world: world.to_string(),
            kind: kind.to_string(),
            position,
            velocity,
        });
        id
    }

    pub fn remove_entity(&mut self, id: EntityId) {
        self.entities.retain(|e| e.id != id);
    }
}

impl SimulationHost for MockHost {
    fn worlds(&self) -> Vec<String> {
        let mut worlds: Vec<String> = self
            .observers
            .iter()
            .map(|o| o.world.clone())
            .chain(self.entities.iter().map(|e| e.world.clone()))
            .collect();
        worlds.sort();
        worlds.dedup();
        worlds
    }

    fn observers(&self, world: &str) -> Vec<ObserverState> {
        self.observers
            .iter()
            .filter(|o| o.world == world)
            .cloned()
            .collect()
    }

    fn entities_near(&self, world: &str, center: Vec3, radius: f64, out: &mut Vec<EntityState>) {
        for e in &self.entities {
            if e.world == world && e.position.distance_to(center) <= radius {
                out.push(e.clone());
            }
        }
    }

    fn tracking_range(&self, world: &str) -> Option<f64> {
        self.tracking_ranges.get(world).copied()
    }

    fn entity_world(&self, entity: EntityId) -> Option<String> {
        self.entities
            .iter()
            .find(|e| e.id == entity)
            .map(|e| e.world.clone())
    }

    fn set_visible(&mut self, observer: ObserverId, entity: EntityId, visible: bool) {
        self.visibility_log.push((observer, entity, visible));
    }
}
