//! Culling subsystem configuration
//!
//! Keys are kebab-case JSON, all optional with defaults matching the
//! shipped behavior. Kind names (whitelist, blacklist, type-thresholds,
//! exclude-kinds) are normalized to uppercase on load. Configuration is
//! immutable during a run and replaced wholesale on reload.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the culling subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CullingConfig {
    /// Master switch for the tick-driven culling pass
    pub enabled: bool,
    /// Distance beyond which a slow, unseen entity may be culled
    pub max_distance: f64,
    /// Entities at or above this scalar speed are never culled
    pub speed_threshold: f64,
    /// Cull only when cos(view angle) is below this threshold
    pub cos_angle_threshold: f64,
    /// Ticks between culling passes
    pub interval_ticks: u32,
    /// Hard cap on entities collected and applied per pass
    pub max_entities_per_tick: usize,
    /// Tighten the cosine threshold by 0.15 (stricter frustum approximation)
    pub frustum_approx: bool,
    /// Record per-tick and windowed counters
    pub metrics: bool,
    /// Render ratios as percentages in diagnostics text
    pub ratio_percent: bool,
    pub alarm_enabled: bool,
    /// Instantaneous cull ratio that triggers the alarm
    pub alarm_threshold: f64,
    pub alarm_cooldown_seconds: u64,
    /// Trailing window for the culled/processed sums
    pub window_seconds: u64,
    /// If non-empty, only these worlds are scanned
    pub worlds_include: Vec<String>,
    pub worlds_exclude: Vec<String>,
    /// If non-empty, only these entity kinds are candidates
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    /// If > 0, skip entities more than this many chunks from the player
    pub chunk_radius: i32,
    /// Per-kind threshold overrides; missing fields fall back to globals
    pub type_thresholds: HashMap<String, TypeThresholdConfig>,
    pub packet_culling: PacketCullingConfig,
    pub accelerator: AcceleratorConfig,
    pub monitor: MonitorConfig,
    pub report: ReportConfig,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_distance: 48.0,
            speed_threshold: 0.05,
            cos_angle_threshold: 0.25,
            interval_ticks: 20,
            max_entities_per_tick: 512,
            frustum_approx: false,
            metrics: true,
            ratio_percent: true,
            alarm_enabled: false,
            alarm_threshold: 0.50,
            alarm_cooldown_seconds: 30,
            window_seconds: 60,
            worlds_include: Vec::new(),
            worlds_exclude: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            chunk_radius: 0,
            type_thresholds: HashMap::new(),
            packet_culling: PacketCullingConfig::default(),
            accelerator: AcceleratorConfig::default(),
            monitor: MonitorConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Per-kind threshold override; `None` fields inherit the global value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TypeThresholdConfig {
    pub max_distance: Option<f64>,
    pub speed_threshold: Option<f64>,
    pub cos_angle_threshold: Option<f64>,
}

/// Packet-level interceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PacketCullingConfig {
    pub enabled: bool,
    /// Kinds never suppressed at the packet level
    pub exclude_kinds: Vec<String>,
    pub budget: BudgetConfig,
}

impl Default for PacketCullingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exclude_kinds: vec!["PLAYER".to_string(), "ARMOR_STAND".to_string()],
            budget: BudgetConfig::default(),
        }
    }
}

/// Per-observer spawn-send budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BudgetConfig {
    pub enabled: bool,
    pub max_spawns_per_tick: u32,
    /// Spawns within this distance bypass the quota check
    pub always_send_within: f64,
    /// Per-observer cap on deferred messages
    pub queue_cap: usize,
    /// Deferred messages older than this are dropped unsent
    pub queue_ttl_ticks: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_spawns_per_tick: 20,
            always_send_within: 12.0,
            queue_cap: 256,
            queue_ttl_ticks: 100,
        }
    }
}

/// Optional native accelerator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AcceleratorConfig {
    pub enabled: bool,
    /// Explicit library path; when empty a per-OS default under `natives/`
    /// relative to the base directory is used
    pub library_path: Option<String>,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DownloadConfig {
    pub enabled: bool,
    pub url: Option<String>,
    /// Expected SHA-256 of the downloaded library, hex; load refused on mismatch
    pub sha256: Option<String>,
}

/// Tick-duration monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MonitorConfig {
    /// Ring size for the tick-duration average
    pub window_ticks: usize,
    /// Nominal simulation tick rate, used to cap derived TPS
    pub tick_rate: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_ticks: 1200,
            tick_rate: 20,
        }
    }
}

/// Periodic JSON status report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportConfig {
    pub enabled: bool,
    pub period_seconds: u64,
    pub path: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period_seconds: 15,
            path: "reports/status.json".to_string(),
        }
    }
}

impl CullingConfig {
    /// Load config from a JSON file, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config from {}: {e}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.normalize();
        config.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }

    /// Uppercase all kind names and clamp budget values to sane floors
    fn normalize(&mut self) {
        for k in self.whitelist.iter_mut().chain(self.blacklist.iter_mut()) {
            *k = k.to_uppercase();
        }
        for k in self.packet_culling.exclude_kinds.iter_mut() {
            *k = k.to_uppercase();
        }
        self.type_thresholds = self
            .type_thresholds
            .drain()
            .map(|(k, v)| (k.to_uppercase(), v))
            .collect();

        let b = &mut self.packet_culling.budget;
        b.max_spawns_per_tick = b.max_spawns_per_tick.max(1);
        b.always_send_within = b.always_send_within.max(0.0);
        b.queue_cap = b.queue_cap.max(8);
        b.queue_ttl_ticks = b.queue_ttl_ticks.max(20);

        self.monitor.window_ticks = self.monitor.window_ticks.max(20);
        self.report.period_seconds = self.report.period_seconds.max(1);
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ticks == 0 {
            return Err("interval-ticks must be at least 1".to_string());
        }
        if self.max_entities_per_tick == 0 {
            return Err("max-entities-per-tick must be at least 1".to_string());
        }
        if self.max_distance <= 0.0 {
            return Err("max-distance must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.alarm_threshold) {
            return Err("alarm-threshold must be within 0..=1".to_string());
        }
        if self.monitor.tick_rate == 0 {
            return Err("monitor.tick-rate must be at least 1".to_string());
        }
        Ok(())
    }
}
