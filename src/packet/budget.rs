//! Per-observer spawn send budget
//!
//! Caps how many spawn messages each observer receives per tick. Overflow
//! is parked in a bounded per-observer queue and drained nearest-first on
//! subsequent ticks; drained sends consume the same quota as fresh ones,
//! so the cap holds across both paths.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::BudgetConfig;
use crate::host::ObserverId;
use crate::packet::SpawnMessage;

/// A spawn message parked for later delivery
#[derive(Debug)]
struct Deferred {
    message: SpawnMessage,
    distance: f64,
    queued_tick: u64,
}

#[derive(Debug, Default)]
struct ObserverSlot {
    sent_this_tick: u32,
    queue: Vec<Deferred>,
}

/// Ruling for one fresh spawn message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetRuling {
    /// Within quota (or inside the always-send radius)
    Allow,
    /// Quota exhausted; the message was queued
    Deferred,
    /// Quota exhausted and the queue rejected the message
    Dropped,
}

pub struct SpawnBudget {
    config: BudgetConfig,
    slots: FxHashMap<ObserverId, ObserverSlot>,
}

impl SpawnBudget {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            slots: FxHashMap::default(),
        }
    }

    /// Rule on a fresh spawn. Quota-exhausted messages are queued here;
    /// when the queue is full the farthest of (queue ∪ new) is dropped.
    pub fn admit(
        &mut self,
        observer: ObserverId,
        message: &SpawnMessage,
        distance: f64,
        tick: u64,
    ) -> BudgetRuling {
        if !self.config.enabled {
            return BudgetRuling::Allow;
        }
        let slot = self.slots.entry(observer).or_default();
        if distance <= self.config.always_send_within {
            // Always delivered, but still counted against the quota
            slot.sent_this_tick = slot.sent_this_tick.saturating_add(1);
            return BudgetRuling::Allow;
        }

        if slot.sent_this_tick < self.config.max_spawns_per_tick {
            slot.sent_this_tick += 1;
            return BudgetRuling::Allow;
        }

        if slot.queue.len() >= self.config.queue_cap {
            // Evict the farthest queued message if the new one is nearer
            let farthest = slot
                .queue
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.distance.total_cmp(&b.distance))
                .map(|(i, d)| (i, d.distance));
            match farthest {
                Some((i, far)) if distance < far => {
                    slot.queue.swap_remove(i);
                }
                _ => return BudgetRuling::Dropped,
            }
        }
        slot.queue.push(Deferred {
            message: message.clone(),
            distance,
            queued_tick: tick,
        });
        BudgetRuling::Deferred
    }

    /// Start a tick: reset quotas, expire stale queue entries, and return
    /// the deferred messages each observer may receive this tick,
    /// nearest-first. The returned sends are already counted against the
    /// new quota.
    pub fn begin_tick(&mut self, tick: u64) -> Vec<(ObserverId, SmallVec<[SpawnMessage; 8]>)> {
        if !self.config.enabled {
            return Vec::new();
        }
        let ttl = self.config.queue_ttl_ticks;
        let max = self.config.max_spawns_per_tick;
        let mut out = Vec::new();

        for (&observer, slot) in self.slots.iter_mut() {
            slot.sent_this_tick = 0;
            slot.queue
                .retain(|d| tick.saturating_sub(d.queued_tick) <= ttl);
            if slot.queue.is_empty() {
                continue;
            }
            slot.queue.sort_unstable_by(|a, b| a.distance.total_cmp(&b.distance));

            let take = (max as usize).min(slot.queue.len());
            let mut batch: SmallVec<[SpawnMessage; 8]> = SmallVec::new();
            for d in slot.queue.drain(..take) {
                batch.push(d.message);
            }
            slot.sent_this_tick = batch.len() as u32;
            out.push((observer, batch));
        }
        self.slots.retain(|_, s| s.sent_this_tick > 0 || !s.queue.is_empty());
        out
    }

    /// Drop all state for a disconnected observer
    pub fn forget(&mut self, observer: ObserverId) {
        self.slots.remove(&observer);
    }

    pub fn queued(&self, observer: ObserverId) -> usize {
        self.slots.get(&observer).map_or(0, |s| s.queue.len())
    }
}
