//! Watchdog Runner - one check/decide/act pass per cycle

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::compose::{contains_up_marker, ComposeOrchestrator, Orchestrator};
use crate::config::{HealthPolicy, WatchdogConfig};
use crate::error::{Result, WatchdogError};
use crate::escalation::{
    EscalationPolicy, FailureLedger, LedgerStore, RecoveryState, RestartDecision,
};
use crate::probe::{HttpProbe, ReachabilityProbe};
use crate::report::{
    CycleReport, ReportSink, RestartOutcome, RuntimeCheck, ServiceCheck, ServiceState, StdoutSink,
};
use crate::resources::{host_name, ResourceProbe, SysinfoResources};
use crate::runtime::{RuntimeManager, SystemctlRuntime};

/// External systems the watchdog queries and drives
pub struct Collaborators {
    pub runtime: Arc<dyn RuntimeManager>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub resources: Arc<dyn ResourceProbe>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub sink: Arc<dyn ReportSink>,
}

impl Collaborators {
    /// Real host-backed collaborators for `config`
    pub fn from_config(config: &WatchdogConfig) -> Result<Self> {
        Ok(Self {
            runtime: Arc::new(SystemctlRuntime::new(config.command_timeout())),
            orchestrator: Arc::new(ComposeOrchestrator::new(
                &config.deployment,
                config.command_timeout(),
                config.restart_timeout(),
            )),
            resources: Arc::new(SysinfoResources::new(config.resources.disk_mount.clone())),
            probe: Arc::new(HttpProbe::new(&config.probe.url, config.probe.timeout())?),
            sink: Arc::new(StdoutSink::new(config.report.format)),
        })
    }
}

struct Escalation {
    policy: EscalationPolicy,
    store: LedgerStore,
}

/// Runs watchdog cycles. Each cycle re-derives every fact from scratch.
pub struct Watchdog {
    config: WatchdogConfig,
    deps: Collaborators,
    escalation: Option<Escalation>,
    host: String,
    /// Cycles never overlap, even if called from several tasks
    cycle_lock: Mutex<()>,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig, deps: Collaborators) -> Self {
        let escalation = config.escalation.enabled.then(|| Escalation {
            policy: EscalationPolicy::new(&config.escalation),
            store: LedgerStore::new(config.escalation.state_file.clone()),
        });

        Self {
            config,
            deps,
            escalation,
            host: host_name(),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Override the host identifier shown in reports
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Run one complete inspection-and-repair pass.
    ///
    /// Never fails: each check is isolated and the report is always emitted
    /// exactly once.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;

        let started = Instant::now();
        let cycle_id = Uuid::new_v4();
        let timestamp = Utc::now();
        info!(%cycle_id, "Starting watchdog cycle");

        let runtime = self.check_runtime().await;
        let service = self.check_service(timestamp).await;

        let (resources, resources_error) = match self.deps.resources.snapshot().await {
            Ok(snap) => (Some(snap), None),
            Err(e) => {
                warn!("Resource snapshot failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let reachability = self.deps.probe.probe().await;

        let report = CycleReport {
            cycle_id,
            timestamp,
            host: self.host.clone(),
            runtime,
            service,
            resources,
            resources_error,
            reachability,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            cycle_id = %report.cycle_id,
            runtime_active = report.runtime.active,
            service_running = report.service.is_running(),
            restart_issued = report.service.restart.is_some(),
            reachable = report.reachability.reachable,
            duration_ms = report.duration_ms,
            "cycle_complete"
        );

        self.deps.sink.emit(&report);
        report
    }

    /// Run cycles back to back on a fixed interval until `shutdown` resolves.
    /// A cycle in progress always finishes. Returns the number of cycles run.
    pub async fn watch<F>(&self, every: Duration, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested after {} cycles", cycles);
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    cycles += 1;
                }
            }
        }
        cycles
    }

    /// Step 1: runtime liveness, with one best-effort start when inactive
    async fn check_runtime(&self) -> RuntimeCheck {
        let service = self.config.runtime_service.clone();

        let (active, query_error) = match self.deps.runtime.is_active(&service).await {
            Ok(active) => (active, None),
            Err(e) => {
                warn!("Could not query runtime {}: {}", service, e);
                (false, Some(e.to_string()))
            }
        };

        if active {
            info!("✓ Container runtime {} is active", service);
            return RuntimeCheck {
                service,
                active,
                query_error,
                start_attempted: false,
                start_error: None,
            };
        }

        warn!("Container runtime {} is not active, attempting start", service);
        let start_error = match self.deps.runtime.start(&service).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to start {}: {}", service, e);
                Some(e.to_string())
            }
        };

        RuntimeCheck {
            service,
            active: false,
            query_error,
            start_attempted: true,
            start_error,
        }
    }

    /// Step 2: deployment liveness, with the restart sequence when down
    async fn check_service(&self, now: DateTime<Utc>) -> ServiceCheck {
        let policy = self.config.deployment.health_policy;
        let mut check = ServiceCheck {
            state: ServiceState::Unknown,
            policy,
            detail: None,
            restart: None,
            recovery: None,
        };

        let (healthy, detail) = self.evaluate_health().await;
        check.detail = detail;
        check.state = if healthy {
            ServiceState::Healthy
        } else {
            ServiceState::Unhealthy
        };

        let mut ledger = self.load_ledger().await;

        if healthy {
            info!("✓ Deployment is running");
            if let (Some(esc), Some(l)) = (&self.escalation, ledger.as_mut()) {
                check.recovery = esc.policy.on_healthy(l);
            }
        } else {
            warn!("Deployment is down");

            let decision = match (&self.escalation, ledger.as_mut()) {
                (Some(esc), Some(l)) => esc.policy.on_unhealthy(l, now),
                _ => RestartDecision::Restart,
            };

            match decision {
                RestartDecision::Restart => {
                    check.restart = Some(self.restart_sequence().await);
                    if let (Some(esc), Some(l)) = (&self.escalation, ledger.as_mut()) {
                        esc.policy.record_restart(l, now);
                        check.recovery = Some(RecoveryState::Pending);
                    }
                }
                RestartDecision::Defer { retry_in } => {
                    warn!("Restart deferred by backoff, retry in {:?}", retry_in);
                    check.recovery = Some(RecoveryState::Deferred {
                        retry_in_secs: retry_in.as_secs(),
                    });
                }
            }

            if let (Some(esc), Some(l)) = (&self.escalation, ledger.as_ref()) {
                if esc.policy.should_alert(l) {
                    error!(
                        consecutive_failures = l.consecutive_failures,
                        restart_attempts = l.restart_attempts,
                        dir = %self.config.deployment.dir.display(),
                        "ALERT: deployment repeatedly down"
                    );
                }
            }
        }

        if let (Some(esc), Some(l)) = (&self.escalation, ledger.as_ref()) {
            if let Err(e) = esc.store.save(l).await {
                warn!("Failed to persist failure ledger: {}", e);
            }
        }

        check
    }

    async fn evaluate_health(&self) -> (bool, Option<String>) {
        match self.config.deployment.health_policy {
            HealthPolicy::AnyUp => match self.deps.orchestrator.status().await {
                Ok(text) => {
                    debug!("compose ps:\n{}", text);
                    (contains_up_marker(&text, &self.config.deployment.up_marker), None)
                }
                Err(e) => {
                    warn!("Status query failed: {}", e);
                    (false, Some(format!("status query failed: {}", e)))
                }
            },
            HealthPolicy::AllRunning => match self.deps.orchestrator.containers().await {
                Ok(containers) => {
                    let total = containers.len();
                    let running = containers.iter().filter(|c| c.is_running()).count();
                    (
                        total > 0 && running == total,
                        Some(format!("{}/{} running", running, total)),
                    )
                }
                Err(e) => {
                    warn!("Container query failed: {}", e);
                    (false, Some(format!("status query failed: {}", e)))
                }
            },
        }
    }

    /// Teardown then detached start, exactly once each. `up` is issued even
    /// when `down` failed.
    async fn restart_sequence(&self) -> RestartOutcome {
        info!("Restarting deployment in {}", self.config.deployment.dir.display());

        let down_error = match self.deps.orchestrator.down().await {
            Ok(()) => None,
            Err(e) => {
                error!("compose down failed: {}", e);
                Some(e.to_string())
            }
        };

        let up_error = match self.deps.orchestrator.up_detached().await {
            Ok(()) => None,
            Err(e) => {
                error!("compose up failed: {}", e);
                Some(e.to_string())
            }
        };

        RestartOutcome {
            down_error,
            up_error,
        }
    }

    /// `None` when escalation is off or the ledger cannot be read. A corrupt
    /// ledger starts over so the next save replaces it.
    async fn load_ledger(&self) -> Option<FailureLedger> {
        let esc = self.escalation.as_ref()?;
        match esc.store.load().await {
            Ok(ledger) => Some(ledger),
            Err(WatchdogError::Json(e)) => {
                warn!("Failure ledger is corrupt, starting a fresh one: {}", e);
                Some(FailureLedger::default())
            }
            Err(e) => {
                warn!("Failed to read failure ledger, running stateless: {}", e);
                None
            }
        }
    }
}
