//! Bot Watchdog Library
//!
//! Health checks and corrective restarts for a containerized trading bot.

pub mod command;
pub mod compose;
pub mod config;
pub mod error;
pub mod escalation;
pub mod probe;
pub mod report;
pub mod resources;
pub mod runner;
pub mod runtime;

// Re-export main types for convenience
pub use compose::{ComposeOrchestrator, ContainerState, Orchestrator};
pub use config::{
    ComposeCommand, DeploymentConfig, EscalationConfig, HealthPolicy, ProbeConfig, ReportFormat,
    WatchdogConfig,
};
pub use error::{Result, WatchdogError};
pub use escalation::{FailureLedger, RecoveryState};
pub use probe::{HttpProbe, ProbeResult, ReachabilityProbe};
pub use report::{CycleReport, ReportSink, RestartOutcome, RuntimeCheck, ServiceCheck, ServiceState};
pub use resources::{ResourceProbe, ResourceSnapshot, SysinfoResources};
pub use runner::{Collaborators, Watchdog};
pub use runtime::{RuntimeManager, SystemctlRuntime};
