//! Batch computation over one snapshot
//!
//! Pure function of the snapshot plus the threshold table: derive
//! (distance, speed, cosine) per entity against its nearest observer,
//! classify the batch through the active strategy, and emit one decision
//! per entity. Runs entirely off the simulation thread.

use std::time::{Duration, Instant};

use crate::culling::classify::{BatchRequest, Classifier, ThresholdTable};
use crate::culling::snapshot::{PlayerSnapshot, Snapshot};
use crate::host::{EntityId, ObserverId};

/// Minimum scratch capacity; grown in powers of two and never shrunk
const MIN_SCRATCH: usize = 1024;

/// Verdict for one entity in one computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub entity: EntityId,
    pub cull: bool,
    /// Observer the verdict was computed against
    pub nearest: Option<ObserverId>,
}

/// Output of one computation, consumed once by the apply phase
#[derive(Debug, Default)]
pub struct ComputationResult {
    pub decisions: Vec<Decision>,
    pub elapsed: Duration,
    pub strategy: &'static str,
}

/// Owns the classification strategy and grow-only scratch buffers.
/// One engine per worker thread; nothing here is shared.
pub struct ComputeEngine {
    classifier: Box<dyn Classifier>,
    distances: Vec<f64>,
    speeds: Vec<f64>,
    cos_angles: Vec<f64>,
    kind_codes: Vec<u32>,
    verdicts: Vec<bool>,
    nearest: Vec<Option<ObserverId>>,
}

fn scratch_capacity(n: usize) -> usize {
    n.max(MIN_SCRATCH).next_power_of_two()
}

impl ComputeEngine {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            distances: Vec::new(),
            speeds: Vec::new(),
            cos_angles: Vec::new(),
            kind_codes: Vec::new(),
            verdicts: Vec::new(),
            nearest: Vec::new(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.classifier.name()
    }

    fn reserve(&mut self, n: usize) {
        let cap = scratch_capacity(n);
        if self.distances.capacity() < cap {
            self.distances.reserve_exact(cap - self.distances.len());
            self.speeds.reserve_exact(cap - self.speeds.len());
            self.cos_angles.reserve_exact(cap - self.cos_angles.len());
            self.kind_codes.reserve_exact(cap - self.kind_codes.len());
            self.nearest.reserve_exact(cap - self.nearest.len());
        }
        self.distances.clear();
        self.speeds.clear();
        self.cos_angles.clear();
        self.kind_codes.clear();
        self.nearest.clear();
        self.verdicts.clear();
        self.verdicts.resize(cap.max(n), false);
    }

    /// Nearest observer by squared distance; the first scanned wins ties
    fn nearest_observer<'a>(
        players: &'a [PlayerSnapshot],
        position: crate::util::vec3::Vec3,
    ) -> Option<&'a PlayerSnapshot> {
        let mut best: Option<(&PlayerSnapshot, f64)> = None;
        for p in players {
            let d2 = p.position.distance_sq_to(position);
            match best {
                Some((_, best_d2)) if d2 >= best_d2 => {}
                _ => best = Some((p, d2)),
            }
        }
        best.map(|(p, _)| p)
    }

    /// Classify every entity in the snapshot. A strategy failure discards
    /// the whole batch: the result carries no decisions and the tick's
    /// visibility state is left untouched.
    pub fn compute(&mut self, snapshot: &Snapshot, table: &ThresholdTable) -> ComputationResult {
        let started = Instant::now();
        let n = snapshot.entities.len();
        self.reserve(n);

        for entity in &snapshot.entities {
            let players = snapshot
                .players_by_world
                .get(&entity.world)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match Self::nearest_observer(players, entity.position) {
                Some(p) => {
                    let offset = entity.position - p.position;
                    let (dir, distance) = offset.normalize_with_length();
                    let cos_angle = p.view_dir.normalize().dot(dir);
                    self.distances.push(distance);
                    self.speeds.push(entity.speed);
                    self.cos_angles.push(cos_angle);
                    self.kind_codes.push(table.code_for(&entity.kind));
                    self.nearest.push(Some(p.id));
                }
                None => {
                    // Unobserved entity: no decision is emitted for it.
                    // Neutral inputs keep the arrays parallel to the batch.
                    self.distances.push(0.0);
                    self.speeds.push(f64::MAX);
                    self.cos_angles.push(1.0);
                    self.kind_codes.push(0);
                    self.nearest.push(None);
                }
            }
        }

        let request = BatchRequest {
            distances: &self.distances,
            speeds: &self.speeds,
            cos_angles: &self.cos_angles,
            kind_codes: &self.kind_codes,
            thresholds: table.by_code(),
        };
        if let Err(e) = self.classifier.classify_batch(&request, &mut self.verdicts) {
            tracing::warn!(
                strategy = self.classifier.name(),
                "Classification batch failed, discarding: {e}"
            );
            return ComputationResult {
                decisions: Vec::new(),
                elapsed: started.elapsed(),
                strategy: self.classifier.name(),
            };
        }

        let decisions = snapshot
            .entities
            .iter()
            .enumerate()
            .filter(|(i, _)| self.nearest[*i].is_some())
            .map(|(i, entity)| Decision {
                entity: entity.id,
                cull: self.verdicts[i],
                nearest: self.nearest[i],
            })
            .collect();

        ComputationResult {
            decisions,
            elapsed: started.elapsed(),
            strategy: self.classifier.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CullingConfig;
    use crate::culling::classify::{ClassifyError, SoftwareClassifier};
    use crate::culling::snapshot::EntitySnapshot;
    use crate::util::vec3::Vec3;
    use rustc_hash::FxHashMap;
    use uuid::Uuid;

    fn engine() -> ComputeEngine {
        ComputeEngine::new(Box::new(SoftwareClassifier))
    }

    fn table() -> ThresholdTable {
        ThresholdTable::from_config(&CullingConfig::default())
    }

    fn snapshot_with(
        players: Vec<PlayerSnapshot>,
        entities: Vec<EntitySnapshot>,
    ) -> Snapshot {
        let mut players_by_world = FxHashMap::default();
        players_by_world.insert("overworld".to_string(), players);
        Snapshot {
            players_by_world,
            entities,
        }
    }

    fn player_at(position: Vec3, view_dir: Vec3) -> PlayerSnapshot {
        PlayerSnapshot {
            id: Uuid::new_v4(),
            position,
            view_dir,
        }
    }

    fn entity_at(position: Vec3, speed: f64) -> EntitySnapshot {
        EntitySnapshot {
            id: Uuid::new_v4(),
            world: "overworld".to_string(),
            kind: "ZOMBIE".to_string(),
            position,
            speed,
        }
    }

    #[test]
    fn test_far_slow_behind_is_culled() {
        // Observer at origin looking +x; entity behind at -60x, idle
        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0))],
            vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01)],
        );
        let result = engine().compute(&snapshot, &table());
        assert_eq!(result.decisions.len(), 1);
        assert!(result.decisions[0].cull);
        assert!(result.decisions[0].nearest.is_some());
    }

    #[test]
    fn test_gazed_entity_kept() {
        // Same geometry but the observer faces the entity
        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::new(-1.0, 0.0, 0.0))],
            vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01)],
        );
        let result = engine().compute(&snapshot, &table());
        assert!(!result.decisions[0].cull);
    }

    #[test]
    fn test_near_entity_kept() {
        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0))],
            vec![entity_at(Vec3::new(-10.0, 0.0, 0.0), 0.01)],
        );
        let result = engine().compute(&snapshot, &table());
        assert!(!result.decisions[0].cull);
    }

    #[test]
    fn test_nearest_observer_selected() {
        let near = player_at(Vec3::new(-55.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let near_id = near.id;
        let far = player_at(Vec3::new(100.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        // Near observer is 5 away and looking away from the entity: kept
        let snapshot = snapshot_with(vec![far, near], vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01)]);
        let result = engine().compute(&snapshot, &table());
        assert_eq!(result.decisions[0].nearest, Some(near_id));
        assert!(!result.decisions[0].cull);
    }

    #[test]
    fn test_tie_break_first_scanned() {
        let a = player_at(Vec3::new(10.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let a_id = a.id;
        let b = player_at(Vec3::new(-10.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let snapshot = snapshot_with(vec![a, b], vec![entity_at(Vec3::ZERO, 0.0)]);
        let result = engine().compute(&snapshot, &table());
        assert_eq!(result.decisions[0].nearest, Some(a_id));
    }

    #[test]
    fn test_unobserved_entity_dropped_silently() {
        let mut snapshot = snapshot_with(vec![], vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.0)]);
        snapshot.entities[0].world = "nether".to_string();
        let result = engine().compute(&snapshot, &table());
        assert!(result.decisions.is_empty());
    }

    #[test]
    fn test_mixed_worlds_keep_observed_entities_only() {
        let mut entities = vec![
            entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01),
            entity_at(Vec3::new(-61.0, 0.0, 0.0), 0.01),
        ];
        entities[1].world = "nether".to_string();
        let observed = entities[0].id;
        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0))],
            entities,
        );
        let result = engine().compute(&snapshot, &table());
        assert_eq!(result.decisions.len(), 1);
        assert_eq!(result.decisions[0].entity, observed);
        assert!(result.decisions[0].cull);
    }

    #[test]
    fn test_zero_view_dir_treated_as_unseen() {
        // Degenerate view direction yields cosine 0.0, below the default
        // threshold, so the far idle entity is still culled
        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::ZERO)],
            vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01)],
        );
        let result = engine().compute(&snapshot, &table());
        assert!(result.decisions[0].cull);
    }

    #[test]
    fn test_failed_batch_discarded() {
        struct FailingClassifier;
        impl Classifier for FailingClassifier {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn classify_batch(
                &mut self,
                _request: &BatchRequest<'_>,
                _out: &mut [bool],
            ) -> Result<(), ClassifyError> {
                Err(ClassifyError::Accelerator(-1))
            }
        }

        let snapshot = snapshot_with(
            vec![player_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0))],
            vec![entity_at(Vec3::new(-60.0, 0.0, 0.0), 0.01)],
        );
        let mut engine = ComputeEngine::new(Box::new(FailingClassifier));
        let result = engine.compute(&snapshot, &table());
        assert!(result.decisions.is_empty());
    }

    #[test]
    fn test_scratch_capacity_growth() {
        assert_eq!(scratch_capacity(1), MIN_SCRATCH);
        assert_eq!(scratch_capacity(1024), 1024);
        assert_eq!(scratch_capacity(1025), 2048);
    }

    #[test]
    fn test_engine_reuse() {
        let mut engine = engine();
        let table = table();
        for n in [1usize, 3, 2] {
            let entities = (0..n)
                .map(|i| entity_at(Vec3::new(-60.0 - i as f64, 0.0, 0.0), 0.01))
                .collect();
            let snapshot = snapshot_with(
                vec![player_at(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0))],
                entities,
            );
            let result = engine.compute(&snapshot, &table);
            assert_eq!(result.decisions.len(), n);
            assert!(result.decisions.iter().all(|d| d.cull));
        }
    }
}
