//! Compose deployment control
//!
//! All calls are scoped to the configured deployment directory and, when
//! set, the compose project name. Process cwd is never changed.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::command::{binary_exists, run_command};
use crate::config::{ComposeCommand, DeploymentConfig};
use crate::error::{Result, WatchdogError};

/// Orchestration surface for one deployment unit
#[async_trait::async_trait]
pub trait Orchestrator: Send + Sync {
    /// Human-readable status table of the unit's containers
    async fn status(&self) -> Result<String>;

    /// Typed per-container states
    async fn containers(&self) -> Result<Vec<ContainerState>>;

    /// Stop and remove the unit's containers
    async fn down(&self) -> Result<()>;

    /// Bring the unit back up, detached
    async fn up_detached(&self) -> Result<()>;
}

/// One container as reported by `compose ps --format json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// Presence test over raw status text: any occurrence of the marker counts
pub fn contains_up_marker(status_text: &str, marker: &str) -> bool {
    !marker.is_empty() && status_text.contains(marker)
}

/// Parse `ps --format json`. Newer compose prints one object per line,
/// older releases print a single array.
pub fn parse_ps_json(text: &str) -> Result<Vec<ContainerState>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| WatchdogError::Parse(format!("compose ps json: {}", e)));
    }

    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            serde_json::from_str(l)
                .map_err(|e| WatchdogError::Parse(format!("compose ps json line: {}", e)))
        })
        .collect()
}

/// Drives `docker compose` / `docker-compose` in a deployment directory
pub struct ComposeOrchestrator {
    program: String,
    base_args: Vec<String>,
    work_dir: PathBuf,
    query_timeout: Duration,
    restart_timeout: Duration,
}

impl ComposeOrchestrator {
    pub fn new(
        deployment: &DeploymentConfig,
        query_timeout: Duration,
        restart_timeout: Duration,
    ) -> Self {
        let (program, base_args) = resolve_compose_command(deployment.compose_command);
        Self::with_program(program, base_args, deployment, query_timeout, restart_timeout)
    }

    /// Drive an explicit compose executable, e.g. a wrapper script.
    /// `base_args` go before the project flag and the subcommand.
    pub fn with_program(
        program: impl Into<String>,
        mut base_args: Vec<String>,
        deployment: &DeploymentConfig,
        query_timeout: Duration,
        restart_timeout: Duration,
    ) -> Self {
        let program = program.into();
        if let Some(project) = deployment.project_name() {
            base_args.push("-p".to_string());
            base_args.push(project.to_string());
        }
        debug!("Compose command: {} {:?}", program, base_args);

        Self {
            program,
            base_args,
            work_dir: deployment.dir.clone(),
            query_timeout,
            restart_timeout,
        }
    }

    async fn compose(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let mut full: Vec<&str> = self.base_args.iter().map(String::as_str).collect();
        full.extend_from_slice(args);

        let out = run_command(&self.program, &full, Some(self.work_dir.as_path()), timeout).await?;
        Ok(out.check(&self.program)?.stdout)
    }
}

#[async_trait::async_trait]
impl Orchestrator for ComposeOrchestrator {
    async fn status(&self) -> Result<String> {
        self.compose(&["ps"], self.query_timeout).await
    }

    async fn containers(&self) -> Result<Vec<ContainerState>> {
        let text = self
            .compose(&["ps", "--all", "--format", "json"], self.query_timeout)
            .await?;
        parse_ps_json(&text)
    }

    async fn down(&self) -> Result<()> {
        info!("compose down in {}", self.work_dir.display());
        self.compose(&["down"], self.restart_timeout).await.map(|_| ())
    }

    async fn up_detached(&self) -> Result<()> {
        info!("compose up -d in {}", self.work_dir.display());
        self.compose(&["up", "-d"], self.restart_timeout).await.map(|_| ())
    }
}

/// Pick the compose binary. `Auto` prefers standalone `docker-compose`.
fn resolve_compose_command(cmd: ComposeCommand) -> (String, Vec<String>) {
    let use_standalone = match cmd {
        ComposeCommand::DockerCompose => true,
        ComposeCommand::Docker => false,
        ComposeCommand::Auto => binary_exists("docker-compose"),
    };

    if use_standalone {
        ("docker-compose".to_string(), vec![])
    } else {
        ("docker".to_string(), vec!["compose".to_string()])
    }
}
