//! Outbound packet interceptor
//!
//! Capability-gated: without a [`PacketAccess`] from the host the
//! interceptor passes everything through. Verdicts may be requested from
//! the host's network threads, so mutable state sits behind one mutex;
//! the per-tick drain runs on the simulation thread.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHasher;

use crate::config::PacketCullingConfig;
use crate::culling::classify::ThresholdTable;
use crate::host::{ObserverId, ObserverState, PacketAccess};
use crate::packet::budget::{BudgetRuling, SpawnBudget};
use crate::packet::cache::DecisionCache;
use crate::packet::{SpawnMessage, Verdict};

/// Radius of the scripted-entity exemption probe
const SCRIPTED_PROBE_RADIUS: f64 = 0.75;

struct InterceptorState {
    cache: DecisionCache,
    budget: SpawnBudget,
    tick: u64,
}

pub struct PacketInterceptor {
    config: PacketCullingConfig,
    table: Arc<ThresholdTable>,
    access: Option<Arc<dyn PacketAccess>>,
    state: Mutex<InterceptorState>,
}

impl PacketInterceptor {
    /// `access` is resolved once at startup; `None` disables interception
    pub fn new(
        config: PacketCullingConfig,
        table: Arc<ThresholdTable>,
        access: Option<Arc<dyn PacketAccess>>,
    ) -> Self {
        if config.enabled && access.is_none() {
            tracing::warn!("Packet culling enabled but the host exposes no packet access; disabled");
        }
        let budget = SpawnBudget::new(config.budget.clone());
        Self {
            config,
            table,
            access,
            state: Mutex::new(InterceptorState {
                cache: DecisionCache::new(),
                budget,
                tick: 0,
            }),
        }
    }

    fn active(&self) -> bool {
        self.config.enabled && self.access.is_some()
    }

    /// Rule on one outbound spawn message for one observer
    pub fn on_spawn(&self, observer: &ObserverState, message: &SpawnMessage) -> Verdict {
        if !self.active() {
            return Verdict::Send;
        }
        if let Some(kind) = &message.kind {
            if self.config.exclude_kinds.iter().any(|k| k == kind) {
                return Verdict::Send;
            }
        }
        // Scripted/NPC entities keep their spawns regardless of geometry
        if let Some(access) = &self.access {
            if access.scripted_entity_near(&observer.world, message.position, SCRIPTED_PROBE_RADIUS)
            {
                return Verdict::Send;
            }
        }

        let offset = message.position - observer.position;
        let (direction, distance) = offset.normalize_with_length();

        let mut state = self.state.lock();
        let suppress = match state.cache.get(observer.id, message.position) {
            Some(cached) => cached,
            None => {
                // Velocity is unknown at this layer, so the quick check
                // treats the entity as stationary
                let cos_angle = observer.view_dir.normalize().dot(direction);
                let suppress = self.table.quick_should_cull(distance, cos_angle);
                state.cache.insert(observer.id, message.position, suppress);
                suppress
            }
        };
        if suppress {
            return Verdict::Suppress;
        }

        let tick = state.tick;
        match state.budget.admit(observer.id, message, distance, tick) {
            BudgetRuling::Allow => Verdict::Send,
            BudgetRuling::Deferred | BudgetRuling::Dropped => Verdict::Defer,
        }
    }

    /// Deterministic particle downsampling by the observer's percentage
    /// setting; the same (observer, tick) pair always rules the same way.
    pub fn on_particle(&self, observer: ObserverId) -> Verdict {
        if !self.active() {
            return Verdict::Send;
        }
        let Some(access) = &self.access else {
            return Verdict::Send;
        };
        let percent = access.particle_percent(observer).min(100);
        match percent {
            0 => Verdict::Suppress,
            100 => Verdict::Send,
            _ => {
                let tick = self.state.lock().tick;
                let mut h = FxHasher::default();
                observer.hash(&mut h);
                tick.hash(&mut h);
                if (h.finish() % 100) < u64::from(percent) {
                    Verdict::Send
                } else {
                    Verdict::Suppress
                }
            }
        }
    }

    /// Simulation-thread tick hook: advance the tick counter, reset
    /// quotas, and deliver due deferred spawns through the host.
    pub fn begin_tick(&self) {
        if !self.active() {
            return;
        }
        let drained = {
            let mut state = self.state.lock();
            state.tick += 1;
            let tick = state.tick;
            state.budget.begin_tick(tick)
        };
        if drained.is_empty() {
            return;
        }
        let Some(access) = &self.access else {
            return;
        };
        for (observer, batch) in drained {
            for message in batch {
                access.resend_spawn(observer, message);
            }
        }
    }

    /// Drop all per-observer state on disconnect
    pub fn observer_disconnected(&self, observer: ObserverId) {
        let mut state = self.state.lock();
        state.budget.forget(observer);
    }

    /// Wholesale cache reset, used on configuration reload
    pub fn invalidate(&self) {
        self.state.lock().cache.clear();
    }
}
