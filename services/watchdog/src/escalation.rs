//! Cross-cycle failure ledger
//!
//! Optional. Tracks consecutive `ServiceDown` cycles in a small JSON file so
//! restarts back off exponentially and repeated failures raise an alert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::config::EscalationConfig;
use crate::error::Result;

/// Persisted between cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLedger {
    pub consecutive_failures: u32,
    /// Restarts issued during the current failure streak
    pub restart_attempts: u32,
    pub last_restart_at: Option<DateTime<Utc>>,
    /// A restart was issued and no healthy cycle has confirmed it yet
    pub pending_recovery: bool,
}

/// Two-phase view of a corrective restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecoveryState {
    /// Restart issued this cycle; the next cycle decides
    Pending,
    /// Healthy again after an earlier restart
    Confirmed,
    /// Restart suppressed by backoff
    Deferred { retry_in_secs: u64 },
}

/// What to do about an unhealthy deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart,
    Defer { retry_in: Duration },
}

/// Backoff and alert rules
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    alert_threshold: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EscalationPolicy {
    pub fn new(config: &EscalationConfig) -> Self {
        Self {
            alert_threshold: config.alert_threshold,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
        }
    }

    /// `base * 2^(n-1)`, capped. Zero for `n == 0`.
    pub fn backoff_for(&self, restarts_so_far: u32) -> Duration {
        if restarts_so_far == 0 {
            return Duration::ZERO;
        }
        let exp = (restarts_so_far - 1).min(30);
        let secs = self.backoff_base.as_secs().saturating_mul(1u64 << exp);
        Duration::from_secs(secs).min(self.backoff_max)
    }

    /// Healthy cycle: reset the streak and confirm a pending restart
    pub fn on_healthy(&self, ledger: &mut FailureLedger) -> Option<RecoveryState> {
        let confirmed = ledger.pending_recovery;
        *ledger = FailureLedger::default();
        confirmed.then_some(RecoveryState::Confirmed)
    }

    /// Unhealthy cycle: bump the streak and decide whether to restart now
    pub fn on_unhealthy(&self, ledger: &mut FailureLedger, now: DateTime<Utc>) -> RestartDecision {
        ledger.consecutive_failures = ledger.consecutive_failures.saturating_add(1);

        let Some(last) = ledger.last_restart_at else {
            return RestartDecision::Restart;
        };

        let wait = self.backoff_for(ledger.restart_attempts);
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= wait {
            RestartDecision::Restart
        } else {
            RestartDecision::Defer {
                retry_in: wait - elapsed,
            }
        }
    }

    pub fn record_restart(&self, ledger: &mut FailureLedger, now: DateTime<Utc>) {
        ledger.restart_attempts = ledger.restart_attempts.saturating_add(1);
        ledger.last_restart_at = Some(now);
        ledger.pending_recovery = true;
    }

    pub fn should_alert(&self, ledger: &FailureLedger) -> bool {
        ledger.consecutive_failures >= self.alert_threshold
    }
}

/// JSON file holding the ledger
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file reads as a fresh ledger
    pub async fn load(&self) -> Result<FailureLedger> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FailureLedger::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, ledger: &FailureLedger) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(ledger)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        debug!("Wrote ledger {}", self.path.display());
        Ok(())
    }
}
