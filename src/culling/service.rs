//! Culling service orchestration
//!
//! Driven once per simulation tick. Each tick first applies a finished
//! computation (if one is waiting), then dispatches a fresh snapshot when
//! the pass interval is due and the worker slot is idle. All host access
//! stays on the simulation thread.

use std::sync::Arc;
use std::time::Duration;

use crate::config::CullingConfig;
use crate::culling::classify::{Classifier, SoftwareClassifier, ThresholdTable};
use crate::culling::compute::{ComputationResult, ComputeEngine};
use crate::culling::metrics::{CullingMetrics, TickTimer};
use crate::culling::snapshot::SnapshotBuilder;
use crate::culling::worker::{CullWorker, WorkerState};
use crate::host::SimulationHost;

pub struct CullingService {
    config: CullingConfig,
    table: Arc<ThresholdTable>,
    builder: SnapshotBuilder,
    worker: Option<CullWorker>,
    metrics: CullingMetrics,
    timer: TickTimer,
    strategy: &'static str,
    tick: u64,
    /// Whether any result was applied since the last pass tick
    applied_since_pass: bool,
}

impl CullingService {
    pub fn new(config: CullingConfig) -> Self {
        let table = Arc::new(ThresholdTable::from_config(&config));
        let metrics = CullingMetrics::new(Duration::from_secs(config.window_seconds));
        let timer = TickTimer::new(config.monitor.window_ticks, config.monitor.tick_rate);
        Self {
            config,
            table,
            builder: SnapshotBuilder::new(),
            worker: None,
            metrics,
            timer,
            strategy: "none",
            tick: 0,
            applied_since_pass: false,
        }
    }

    /// Spawn the compute worker with the given strategy. The software
    /// strategy is the default; an accelerated one is passed in when the
    /// native library bound at startup.
    pub fn start(&mut self, classifier: Box<dyn Classifier>) {
        let engine = ComputeEngine::new(classifier);
        self.strategy = engine.strategy_name();
        self.worker = Some(CullWorker::spawn(engine));
        tracing::info!(strategy = self.strategy, "Culling service started");
    }

    pub fn start_default(&mut self) {
        self.start(Box::new(SoftwareClassifier));
    }

    /// Release the worker without blocking; an in-flight computation is
    /// abandoned and its result discarded.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            tracing::info!("Culling service stopped");
        }
    }

    /// Swap the configuration wholesale. The threshold table is rebuilt;
    /// window counters keep their history.
    pub fn reload(&mut self, config: CullingConfig) {
        self.table = Arc::new(ThresholdTable::from_config(&config));
        self.timer = TickTimer::new(config.monitor.window_ticks, config.monitor.tick_rate);
        self.config = config;
        tracing::info!("Culling configuration reloaded");
    }

    pub fn config(&self) -> &CullingConfig {
        &self.config
    }

    pub fn strategy(&self) -> &'static str {
        self.strategy
    }

    pub fn metrics_mut(&mut self) -> &mut CullingMetrics {
        &mut self.metrics
    }

    pub fn timer(&self) -> &TickTimer {
        &self.timer
    }

    /// Host-measured duration of the last full simulation tick
    pub fn record_tick_duration(&mut self, duration: Duration) {
        self.timer.record(duration);
    }

    /// Advance one simulation tick: apply a ready result, then dispatch a
    /// new snapshot when the interval is due and the slot is idle.
    pub fn tick(&mut self, host: &mut dyn SimulationHost) {
        self.tick += 1;
        if !self.config.enabled {
            return;
        }
        let Some(worker) = self.worker.as_mut() else {
            return;
        };

        if let Some(result) = worker.poll() {
            self.apply(host, &result);
        }

        if self.tick % u64::from(self.config.interval_ticks) != 0 {
            return;
        }
        // Pass tick with nothing applied (back-pressure or no candidates):
        // the last-tick counters go back to zero instead of going stale
        if self.config.metrics && !self.applied_since_pass {
            self.metrics.record(0, 0);
        }
        self.applied_since_pass = false;
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        if worker.state() != WorkerState::Idle {
            return; // back-pressure: skip this interval entirely
        }
        let snapshot = self.builder.build(host, &self.config);
        if snapshot.is_empty() {
            return;
        }
        worker.submit(snapshot, Arc::clone(&self.table));
    }

    /// Apply one computation's decisions against live host state. Entities
    /// that vanished since the snapshot are skipped; a culled entity stays
    /// visible only to the observer it was measured against.
    fn apply(&mut self, host: &mut dyn SimulationHost, result: &ComputationResult) {
        let mut processed: u64 = 0;
        let mut culled: u64 = 0;

        for decision in result.decisions.iter().take(self.config.max_entities_per_tick) {
            let Some(world) = host.entity_world(decision.entity) else {
                continue;
            };
            let observers = host.observers(&world);
            for observer in &observers {
                let visible = !decision.cull || decision.nearest == Some(observer.id);
                host.set_visible(observer.id, decision.entity, visible);
            }
            processed += 1;
            if decision.cull {
                culled += 1;
            }
        }

        self.applied_since_pass = true;
        if self.config.metrics {
            self.metrics.record(culled, processed);
            if self.config.alarm_enabled
                && self.metrics.check_alarm(
                    self.config.alarm_threshold,
                    Duration::from_secs(self.config.alarm_cooldown_seconds),
                )
            {
                tracing::warn!(
                    culled,
                    processed,
                    threshold = self.config.alarm_threshold,
                    "Cull ratio crossed the alarm threshold"
                );
            }
        }
        tracing::debug!(
            culled,
            processed,
            strategy = result.strategy,
            elapsed_us = result.elapsed.as_micros() as u64,
            "Applied culling pass"
        );
    }
}

impl Drop for CullingService {
    fn drop(&mut self) {
        self.stop();
    }
}
