//! Periodic JSON status report and diagnostics text

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ReportConfig;
use crate::culling::service::CullingService;

/// Counter pair with its ratio, serialized as one JSON object
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RatioEntry {
    pub culled: u64,
    pub processed: u64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CullingSection {
    pub tick: RatioEntry,
    pub window: RatioEntry,
}

/// Point-in-time health snapshot written to disk and rendered as text
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub mspt_avg: f64,
    pub tps_avg: f64,
    pub strategy: &'static str,
    pub culling: CullingSection,
}

impl StatusReport {
    pub fn collect(service: &mut CullingService) -> Self {
        let mspt_avg = service.timer().mspt_avg();
        let tps_avg = service.timer().tps_avg();
        let strategy = service.strategy();
        let metrics = service.metrics_mut();
        Self {
            mspt_avg,
            tps_avg,
            strategy,
            culling: CullingSection {
                tick: RatioEntry {
                    culled: metrics.last_culled(),
                    processed: metrics.last_processed(),
                    ratio: metrics.tick_ratio(),
                },
                window: RatioEntry {
                    culled: metrics.window_culled(),
                    processed: metrics.window_processed(),
                    ratio: metrics.window_ratio(),
                },
            },
        }
    }

    /// Write pretty-printed JSON, creating parent directories. Failures
    /// are logged and swallowed; reporting never takes the server down.
    pub fn write_to(&self, path: &Path) {
        if let Err(e) = self.try_write(path) {
            tracing::warn!(path = %path.display(), "Failed to write status report: {e}");
        }
    }

    fn try_write(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// One-line operator diagnostics
    pub fn diagnostics(&self, ratio_percent: bool) -> String {
        let fmt = |r: f64| {
            if ratio_percent {
                format!("{:.1}%", r * 100.0)
            } else {
                format!("{r:.3}")
            }
        };
        format!(
            "mspt {:.2} tps {:.1} strategy {} | tick {}/{} ({}) | window {}/{} ({})",
            self.mspt_avg,
            self.tps_avg,
            self.strategy,
            self.culling.tick.culled,
            self.culling.tick.processed,
            fmt(self.culling.tick.ratio),
            self.culling.window.culled,
            self.culling.window.processed,
            fmt(self.culling.window.ratio),
        )
    }
}

/// Drives report writes at the configured period
pub struct Reporter {
    config: ReportConfig,
    last_written: Option<Instant>,
}

impl Reporter {
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            last_written: None,
        }
    }

    fn due(&self, now: Instant) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.last_written {
            None => true,
            Some(last) => now.duration_since(last) >= Duration::from_secs(self.config.period_seconds),
        }
    }

    /// Collect and write a report when the period has elapsed
    pub fn maybe_write(&mut self, service: &mut CullingService) {
        let now = Instant::now();
        if !self.due(now) {
            return;
        }
        let report = StatusReport::collect(service);
        report.write_to(Path::new(&self.config.path));
        self.last_written = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CullingConfig;

    fn report() -> StatusReport {
        StatusReport {
            mspt_avg: 42.5,
            tps_avg: 19.8,
            strategy: "software",
            culling: CullingSection {
                tick: RatioEntry {
                    culled: 30,
                    processed: 100,
                    ratio: 0.3,
                },
                window: RatioEntry {
                    culled: 300,
                    processed: 1000,
                    ratio: 0.3,
                },
            },
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["msptAvg"], 42.5);
        assert_eq!(json["tpsAvg"], 19.8);
        assert_eq!(json["culling"]["tick"]["culled"], 30);
        assert_eq!(json["culling"]["window"]["processed"], 1000);
        assert_eq!(json["culling"]["tick"]["ratio"], 0.3);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/status.json");
        report().write_to(&path);
        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["strategy"], "software");
    }

    #[test]
    fn test_diagnostics_percent_rendering() {
        let text = report().diagnostics(true);
        assert!(text.contains("30.0%"));
        let text = report().diagnostics(false);
        assert!(text.contains("0.300"));
    }

    #[test]
    fn test_collect_from_service() {
        let mut service = CullingService::new(CullingConfig::default());
        service.record_tick_duration(Duration::from_millis(50));
        let report = StatusReport::collect(&mut service);
        assert!((report.mspt_avg - 50.0).abs() < 1e-9);
        assert_eq!(report.culling.tick.processed, 0);
    }

    #[test]
    fn test_reporter_respects_period_and_enable() {
        let mut disabled = Reporter::new(ReportConfig::default());
        assert!(!disabled.due(Instant::now()));

        let config = ReportConfig {
            enabled: true,
            period_seconds: 15,
            path: "reports/status.json".to_string(),
        };
        let mut reporter = Reporter::new(config);
        let now = Instant::now();
        assert!(reporter.due(now));
        reporter.last_written = Some(now);
        assert!(!reporter.due(now + Duration::from_secs(5)));
        assert!(reporter.due(now + Duration::from_secs(15)));
    }
}
