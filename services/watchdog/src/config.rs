//! Watchdog Configuration
//!
//! Layered as: built-in defaults, then an optional TOML file, then
//! `WATCHDOG__*` environment variables (`WATCHDOG__PROBE__TIMEOUT_SECS=5`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WatchdogError};

/// Top-level watchdog configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Host service that runs containers (systemd unit name)
    pub runtime_service: String,
    /// Upper bound for status queries (`systemctl is-active`, `compose ps`)
    pub command_timeout_secs: u64,
    /// Upper bound for `compose down` / `compose up -d`
    pub restart_timeout_secs: u64,
    pub deployment: DeploymentConfig,
    pub resources: ResourceConfig,
    pub probe: ProbeConfig,
    pub report: ReportConfig,
    pub escalation: EscalationConfig,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            runtime_service: default_runtime_service(),
            command_timeout_secs: default_command_timeout_secs(),
            restart_timeout_secs: default_restart_timeout_secs(),
            deployment: DeploymentConfig::default(),
            resources: ResourceConfig::default(),
            probe: ProbeConfig::default(),
            report: ReportConfig::default(),
            escalation: EscalationConfig::default(),
        }
    }
}

impl WatchdogConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// An explicit `path` must exist. Without one, the per-user default
    /// location is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match path {
            Some(p) => {
                builder = builder.add_source(config::File::from(p).required(true));
            }
            None => {
                if let Some(p) = default_config_path() {
                    builder = builder.add_source(config::File::from(p).required(false));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("WATCHDOG")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: WatchdogConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.runtime_service.trim().is_empty() {
            return Err(WatchdogError::Config("runtime_service must not be empty".into()));
        }
        if self.deployment.up_marker.is_empty() {
            return Err(WatchdogError::Config("deployment.up_marker must not be empty".into()));
        }
        if self.command_timeout_secs == 0 || self.restart_timeout_secs == 0 {
            return Err(WatchdogError::Config("command timeouts must be positive".into()));
        }
        if self.probe.timeout_secs == 0 {
            return Err(WatchdogError::Config("probe.timeout_secs must be positive".into()));
        }
        reqwest::Url::parse(&self.probe.url)
            .map_err(|e| WatchdogError::Config(format!("probe.url {:?}: {}", self.probe.url, e)))?;

        let esc = &self.escalation;
        if esc.alert_threshold == 0 {
            return Err(WatchdogError::Config("escalation.alert_threshold must be at least 1".into()));
        }
        if esc.backoff_base_secs > esc.backoff_max_secs {
            return Err(WatchdogError::Config(
                "escalation.backoff_base_secs exceeds backoff_max_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }
}

/// `<config_dir>/bot-watchdog/watchdog.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bot-watchdog").join("watchdog.toml"))
}

/// The compose deployment being watched
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Directory holding the compose file; every compose call runs here
    pub dir: PathBuf,
    /// Compose project name (deployment unit). Empty means compose's default.
    pub project: String,
    pub compose_command: ComposeCommand,
    /// Substring of `compose ps` output that marks a running container
    pub up_marker: String,
    pub health_policy: HealthPolicy,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(default_deployment_dir()),
            project: String::new(),
            compose_command: ComposeCommand::default(),
            up_marker: default_up_marker(),
            health_policy: HealthPolicy::default(),
        }
    }
}

impl DeploymentConfig {
    pub fn project_name(&self) -> Option<&str> {
        let p = self.project.trim();
        (!p.is_empty()).then_some(p)
    }
}

/// Which compose binary to drive
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ComposeCommand {
    /// Prefer `docker-compose` when on PATH, else `docker compose`
    #[default]
    Auto,
    DockerCompose,
    Docker,
}

/// How the deployment's liveness is decided
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HealthPolicy {
    /// Healthy if the status text contains the up marker anywhere
    #[default]
    AnyUp,
    /// Healthy only if every container of the unit is running
    AllRunning,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResourceConfig {
    /// Mount point whose usage is reported
    pub disk_mount: PathBuf,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            disk_mount: PathBuf::from("/"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: default_probe_url(),
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
}

/// Cross-cycle failure tracking. Off by default: cycles stay stateless.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EscalationConfig {
    pub enabled: bool,
    pub state_file: PathBuf,
    /// Consecutive failed cycles before an alert is logged
    pub alert_threshold: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_file: PathBuf::from(default_state_file()),
            alert_threshold: default_alert_threshold(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

fn default_runtime_service() -> String { "docker".to_string() }
fn default_command_timeout_secs() -> u64 { 30 }
fn default_restart_timeout_secs() -> u64 { 180 }
fn default_deployment_dir() -> &'static str { "/opt/trading-bot" }
fn default_up_marker() -> String { "Up".to_string() }
fn default_probe_url() -> String { "https://api.binance.com/api/v3/ping".to_string() }
fn default_probe_timeout_secs() -> u64 { 10 }
fn default_state_file() -> &'static str { "/var/lib/bot-watchdog/ledger.json" }
fn default_alert_threshold() -> u32 { 3 }
fn default_backoff_base_secs() -> u64 { 60 }
fn default_backoff_max_secs() -> u64 { 1800 }
