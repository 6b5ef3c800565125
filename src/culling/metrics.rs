//! Culling counters, trailing window, alarm gate, and tick timing

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One applied culling pass
#[derive(Debug, Clone, Copy)]
struct PassSample {
    at: Instant,
    culled: u64,
    processed: u64,
}

/// Per-pass counters plus a trailing time window with O(1) amortized
/// expiry. The alarm keeps its own timestamp; window samples are never
/// mutated after insertion.
#[derive(Debug)]
pub struct CullingMetrics {
    window: Duration,
    samples: VecDeque<PassSample>,
    window_culled: u64,
    window_processed: u64,
    last_culled: u64,
    last_processed: u64,
    last_alarm_at: Option<Instant>,
}

impl CullingMetrics {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::with_capacity(128),
            window_culled: 0,
            window_processed: 0,
            last_culled: 0,
            last_processed: 0,
            last_alarm_at: None,
        }
    }

    pub fn record(&mut self, culled: u64, processed: u64) {
        self.record_at(Instant::now(), culled, processed);
    }

    fn record_at(&mut self, now: Instant, culled: u64, processed: u64) {
        self.last_culled = culled;
        self.last_processed = processed;
        self.samples.push_back(PassSample {
            at: now,
            culled,
            processed,
        });
        self.window_culled += culled;
        self.window_processed += processed;
        self.expire(now);
    }

    fn expire(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) <= self.window {
                break;
            }
            self.window_culled -= front.culled;
            self.window_processed -= front.processed;
            self.samples.pop_front();
        }
    }

    pub fn last_culled(&self) -> u64 {
        self.last_culled
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Cull ratio of the most recent pass; 0 when nothing was processed
    pub fn tick_ratio(&self) -> f64 {
        ratio(self.last_culled, self.last_processed)
    }

    pub fn window_culled(&mut self) -> u64 {
        self.expire(Instant::now());
        self.window_culled
    }

    pub fn window_processed(&mut self) -> u64 {
        self.expire(Instant::now());
        self.window_processed
    }

    pub fn window_ratio(&mut self) -> f64 {
        self.expire(Instant::now());
        ratio(self.window_culled, self.window_processed)
    }

    /// True when the last pass's ratio crosses `threshold` and the cooldown
    /// since the previous alarm has elapsed. Arms the cooldown on fire.
    pub fn check_alarm(&mut self, threshold: f64, cooldown: Duration) -> bool {
        self.check_alarm_at(Instant::now(), threshold, cooldown)
    }

    fn check_alarm_at(&mut self, now: Instant, threshold: f64, cooldown: Duration) -> bool {
        if self.last_processed == 0 || self.tick_ratio() < threshold {
            return false;
        }
        if let Some(last) = self.last_alarm_at {
            if now.duration_since(last) < cooldown {
                return false;
            }
        }
        self.last_alarm_at = Some(now);
        true
    }
}

fn ratio(culled: u64, processed: u64) -> f64 {
    if processed == 0 {
        0.0
    } else {
        culled as f64 / processed as f64
    }
}

/// Fixed-size ring of recent tick durations, for mspt/TPS averages
#[derive(Debug)]
pub struct TickTimer {
    window_ticks: usize,
    durations: VecDeque<Duration>,
    sum: Duration,
    tick_rate: u32,
}

impl TickTimer {
    pub fn new(window_ticks: usize, tick_rate: u32) -> Self {
        Self {
            window_ticks: window_ticks.max(1),
            durations: VecDeque::with_capacity(window_ticks.max(1)),
            sum: Duration::ZERO,
            tick_rate: tick_rate.max(1),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.durations.len() == self.window_ticks {
            if let Some(old) = self.durations.pop_front() {
                self.sum -= old;
            }
        }
        self.durations.push_back(duration);
        self.sum += duration;
    }

    /// Mean milliseconds per tick over the ring; 0 before any sample
    pub fn mspt_avg(&self) -> f64 {
        if self.durations.is_empty() {
            return 0.0;
        }
        self.sum.as_secs_f64() * 1000.0 / self.durations.len() as f64
    }

    /// Mean ticks per second derived from mspt, capped at the nominal rate
    pub fn tps_avg(&self) -> f64 {
        let mspt = self.mspt_avg();
        let nominal = f64::from(self.tick_rate);
        if mspt <= 0.0 {
            return nominal;
        }
        (1000.0 / mspt).min(nominal)
    }
}
