//! Container runtime service manager

use std::time::Duration;
use tracing::{debug, warn};

use crate::command::run_command;
use crate::error::Result;

/// Host service manager that owns the container runtime daemon
#[async_trait::async_trait]
pub trait RuntimeManager: Send + Sync {
    /// Whether the service is currently active
    async fn is_active(&self, service: &str) -> Result<bool>;

    /// Ask the service manager to start the service
    async fn start(&self, service: &str) -> Result<()>;
}

/// `systemctl`-backed runtime manager
pub struct SystemctlRuntime {
    timeout: Duration,
}

impl SystemctlRuntime {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl RuntimeManager for SystemctlRuntime {
    async fn is_active(&self, service: &str) -> Result<bool> {
        // `is-active --quiet` reports through the exit code only
        let out = run_command(
            "systemctl",
            &["is-active", "--quiet", service],
            None,
            self.timeout,
        )
        .await?;
        debug!("systemctl is-active {} -> {:?}", service, out.code);
        Ok(out.success())
    }

    async fn start(&self, service: &str) -> Result<()> {
        let out = run_command("systemctl", &["start", service], None, self.timeout).await?;
        if !out.success() {
            warn!("systemctl start {} exited with {:?}", service, out.code);
        }
        out.check("systemctl").map(|_| ())
    }
}
