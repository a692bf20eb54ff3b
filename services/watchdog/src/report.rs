//! Cycle report and its sinks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

use crate::config::{HealthPolicy, ReportFormat};
use crate::escalation::RecoveryState;
use crate::probe::ProbeResult;
use crate::resources::ResourceSnapshot;

const OK: &str = "✅";
const FAIL: &str = "❌";

/// Container runtime result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCheck {
    pub service: String,
    pub active: bool,
    /// Set when the liveness query itself failed
    pub query_error: Option<String>,
    pub start_attempted: bool,
    pub start_error: Option<String>,
}

/// Per-cycle liveness of the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Results of the teardown/start pair, in issue order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub down_error: Option<String>,
    pub up_error: Option<String>,
}

impl RestartOutcome {
    pub fn issued_cleanly(&self) -> bool {
        self.down_error.is_none() && self.up_error.is_none()
    }
}

/// Deployment result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub state: ServiceState,
    pub policy: HealthPolicy,
    /// Query error or per-container summary
    pub detail: Option<String>,
    /// Present when the restart sequence ran this cycle
    pub restart: Option<RestartOutcome>,
    /// Only tracked when escalation is enabled
    pub recovery: Option<RecoveryState>,
}

impl ServiceCheck {
    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Healthy
    }
}

/// Everything one cycle observed and did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub runtime: RuntimeCheck,
    pub service: ServiceCheck,
    pub resources: Option<ResourceSnapshot>,
    pub resources_error: Option<String>,
    pub reachability: ProbeResult,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn memory_display(&self) -> String {
        self.resources
            .map(|r| r.memory_display())
            .unwrap_or_else(|| self.unavailable())
    }

    pub fn disk_display(&self) -> String {
        self.resources
            .map(|r| r.disk_display())
            .unwrap_or_else(|| self.unavailable())
    }

    fn unavailable(&self) -> String {
        match &self.resources_error {
            Some(e) => format!("unavailable ({})", e),
            None => "unavailable".to_string(),
        }
    }

    /// Operator-facing multi-line summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Watchdog check {} on {} (cycle {}) ===",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.host,
            self.cycle_id
        );

        let rt = &self.runtime;
        if rt.active {
            let _ = writeln!(out, "{} Runtime {}: active", OK, rt.service);
        } else {
            let cause = rt
                .query_error
                .as_deref()
                .map(|e| format!("query failed: {}", e))
                .unwrap_or_else(|| "inactive".to_string());
            let start = match (rt.start_attempted, &rt.start_error) {
                (false, _) => String::new(),
                (true, None) => ", start attempted".to_string(),
                (true, Some(e)) => format!(", start attempted (failed: {})", e),
            };
            let _ = writeln!(out, "{} Runtime {}: {}{}", FAIL, rt.service, cause, start);
        }

        let svc = &self.service;
        let detail = svc
            .detail
            .as_deref()
            .map(|d| format!(" [{}]", d))
            .unwrap_or_default();
        if svc.is_running() {
            let _ = writeln!(out, "{} Service: running{}", OK, detail);
        } else {
            let action = match &svc.restart {
                Some(r) => format!(
                    ", restart attempted (down {}, up {})",
                    step_mark(&r.down_error),
                    step_mark(&r.up_error)
                ),
                None => String::new(),
            };
            let _ = writeln!(out, "{} Service: down{}{}", FAIL, detail, action);
        }
        match svc.recovery {
            Some(RecoveryState::Pending) => {
                let _ = writeln!(out, "   Recovery: pending confirmation");
            }
            Some(RecoveryState::Confirmed) => {
                let _ = writeln!(out, "   Recovery: confirmed");
            }
            Some(RecoveryState::Deferred { retry_in_secs }) => {
                let _ = writeln!(out, "   Recovery: restart deferred, retry in {}s", retry_in_secs);
            }
            None => {}
        }

        let _ = writeln!(out, "📊 Memory: {}", self.memory_display());
        let _ = writeln!(out, "💾 Disk: {}", self.disk_display());

        let probe = &self.reachability;
        if probe.reachable {
            let status = probe.status.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "{} Exchange API: reachable ({}, {}ms)",
                OK, status, probe.elapsed_ms
            );
        } else {
            let _ = writeln!(
                out,
                "{} Exchange API: unreachable ({})",
                FAIL,
                probe.error.as_deref().unwrap_or("no response")
            );
        }
        out
    }
}

fn step_mark(err: &Option<String>) -> String {
    match err {
        None => "issued".to_string(),
        Some(e) => format!("failed: {}", e),
    }
}

/// Operator-facing output channel
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &CycleReport);
}

/// Prints each report to stdout
pub struct StdoutSink {
    format: ReportFormat,
}

impl StdoutSink {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }
}

impl ReportSink for StdoutSink {
    fn emit(&self, report: &CycleReport) {
        match self.format {
            ReportFormat::Text => print!("{}", report.render_text()),
            ReportFormat::Json => match serde_json::to_string(report) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!("Failed to serialize report: {}", e),
            },
        }
    }
}
