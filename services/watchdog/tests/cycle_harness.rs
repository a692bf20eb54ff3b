//! End-to-end watchdog cycle harness
//!
//! Drives full cycles against mocked collaborators:
//! runtime → service (+ restart) → resources → probe → report


use bot_watchdog::{
    Collaborators, FailureLedger, HealthPolicy, HttpProbe, RecoveryState, ServiceState, Watchdog,
    WatchdogConfig,
};
use mock_collaborators::{
    container, sample_snapshot, Call, CallLog, CollectingSink, MockOrchestrator, MockProbe,
    MockResources, MockRuntime,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Test fixture wiring mocks into a `Watchdog`
struct Harness {
    log: CallLog,
    runtime: Arc<MockRuntime>,
    orchestrator: Arc<MockOrchestrator>,
    sink: Arc<CollectingSink>,
    watchdog: Watchdog,
}

struct Scenario {
    config: WatchdogConfig,
    runtime_active: Option<bool>,
    status_text: Option<&'static str>,
    containers: Vec<bot_watchdog::ContainerState>,
    fail_down: bool,
    snapshot_ok: bool,
    reachable: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            config: WatchdogConfig::default(),
            runtime_active: Some(true),
            status_text: Some("dfa_bot_1  Up 2 hours"),
            containers: Vec::new(),
            fail_down: false,
            snapshot_ok: true,
            reachable: true,
        }
    }
}

impl Scenario {
    fn build(self) -> Harness {
        let log = CallLog::default();
        let runtime = Arc::new(MockRuntime {
            log: log.clone(),
            active: Mutex::new(self.runtime_active),
            fail_start: false,
        });
        let orchestrator = Arc::new(MockOrchestrator {
            log: log.clone(),
            status_text: Mutex::new(self.status_text.map(str::to_string)),
            containers: Mutex::new(self.containers),
            fail_down: self.fail_down,
            fail_up: false,
        });
        let sink = Arc::new(CollectingSink::default());

        let deps = Collaborators {
            runtime: runtime.clone(),
            orchestrator: orchestrator.clone(),
            resources: Arc::new(MockResources {
                log: log.clone(),
                snapshot: self.snapshot_ok.then(sample_snapshot),
            }),
            probe: Arc::new(MockProbe {
                log: log.clone(),
                reachable: self.reachable,
            }),
            sink: sink.clone(),
        };

        Harness {
            log,
            runtime,
            orchestrator,
            sink,
            watchdog: Watchdog::new(self.config, deps).with_host("bot-host"),
        }
    }
}

impl Harness {
    fn set_status(&self, text: Option<&str>) {
        *self.orchestrator.status_text.lock().unwrap() = text.map(str::to_string);
    }
}

#[tokio::test]
async fn test_runtime_inactive_and_service_down_scenario() {
    let h = Scenario {
        runtime_active: Some(false),
        status_text: Some("NAME  COMMAND  SERVICE  STATUS\ndfa_bot_1  python  bot  Exited (1) 2 minutes ago"),
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;

    assert_eq!(
        h.log.calls(),
        vec![
            Call::IsActive("docker".to_string()),
            Call::Start("docker".to_string()),
            Call::Status,
            Call::Down,
            Call::Up,
            Call::Snapshot,
            Call::Probe,
        ]
    );

    assert!(!report.runtime.active);
    assert!(report.runtime.start_attempted);
    assert_eq!(report.service.state, ServiceState::Unhealthy);
    let restart = report.service.restart.as_ref().expect("restart issued");
    assert!(restart.issued_cleanly());
    assert_eq!(report.memory_display(), "3.2G/8G");
    assert_eq!(report.disk_display(), "40G/100G");
    assert!(report.reachability.reachable);
    assert_eq!(report.host, "bot-host");

    let text = report.render_text();
    assert!(text.contains("❌ Runtime docker: inactive, start attempted"));
    assert!(text.contains("❌ Service: down, restart attempted (down issued, up issued)"));
    assert!(text.contains("📊 Memory: 3.2G/8G"));
    assert!(text.contains("💾 Disk: 40G/100G"));
    assert!(text.contains("✅ Exchange API: reachable"));
}

#[tokio::test]
async fn test_healthy_status_never_restarts() {
    let h = Scenario::default().build();

    let report = h.watchdog.run_cycle().await;

    assert!(report.runtime.active);
    assert!(!report.runtime.start_attempted);
    assert!(report.service.is_running());
    assert!(report.service.restart.is_none());
    assert_eq!(h.log.count(&Call::Down), 0);
    assert_eq!(h.log.count(&Call::Up), 0);
    assert_eq!(h.log.count(&Call::Start("docker".to_string())), 0);
}

#[tokio::test]
async fn test_every_failure_still_emits_one_full_report() {
    let h = Scenario {
        runtime_active: None,
        status_text: None,
        snapshot_ok: false,
        reachable: false,
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;

    let reports = h.sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0], report);

    // query failure counts as inactive and still gets one start attempt
    assert!(report.runtime.query_error.is_some());
    assert_eq!(h.log.count(&Call::Start("docker".to_string())), 1);
    // unreadable status counts as down
    assert_eq!(report.service.state, ServiceState::Unhealthy);
    assert!(report.service.restart.is_some());
    assert!(report.resources.is_none());
    assert!(report.resources_error.is_some());
    assert!(!report.reachability.reachable);

    let text = report.render_text();
    assert!(text.contains("Memory: unavailable (Invalid output: no filesystem found for /)"));
    assert!(text.contains("Disk: unavailable (Invalid output: no filesystem found for /)"));
    assert!(text.contains("❌ Exchange API: unreachable"));
}

#[tokio::test]
async fn test_start_precedes_service_check() {
    let h = Scenario {
        runtime_active: Some(false),
        ..Default::default()
    }
    .build();

    h.watchdog.run_cycle().await;

    let calls = h.log.calls();
    let start = calls
        .iter()
        .position(|c| *c == Call::Start("docker".to_string()))
        .unwrap();
    let status = calls.iter().position(|c| *c == Call::Status).unwrap();
    assert!(start < status);
    assert_eq!(h.log.count(&Call::Start("docker".to_string())), 1);
}

#[tokio::test]
async fn test_up_issued_even_when_down_fails() {
    let h = Scenario {
        status_text: Some(""),
        fail_down: true,
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;

    let restart = report.service.restart.expect("restart issued");
    assert!(restart.down_error.is_some());
    assert!(restart.up_error.is_none());
    let calls = h.log.calls();
    let down = calls.iter().position(|c| *c == Call::Down).unwrap();
    let up = calls.iter().position(|c| *c == Call::Up).unwrap();
    assert!(down < up);
}

#[tokio::test]
async fn test_consecutive_cycles_are_independent() {
    let h = Scenario {
        status_text: Some("dfa_bot_1  Exited (137)"),
        ..Default::default()
    }
    .build();

    let first = h.watchdog.run_cycle().await;
    let second = h.watchdog.run_cycle().await;

    assert_ne!(first.cycle_id, second.cycle_id);
    // no backoff without escalation: one restart per down cycle
    assert_eq!(h.log.count(&Call::Down), 2);
    assert_eq!(h.log.count(&Call::Up), 2);
    assert!(first.service.recovery.is_none());
    assert!(second.service.recovery.is_none());

    // service comes back: the next cycle sees only fresh facts
    h.set_status(Some("dfa_bot_1  Up 5 seconds"));
    *h.runtime.active.lock().unwrap() = Some(false);
    let third = h.watchdog.run_cycle().await;
    assert!(third.service.is_running());
    assert!(third.service.restart.is_none());
    assert!(third.runtime.start_attempted);
    assert_eq!(h.sink.reports().len(), 3);
}

#[tokio::test]
async fn test_all_running_policy_catches_partial_outage() {
    let mut config = WatchdogConfig::default();
    config.deployment.health_policy = HealthPolicy::AllRunning;

    let h = Scenario {
        config,
        containers: vec![
            container("dfa-bot-1", "running"),
            container("dfa-redis-1", "exited"),
        ],
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;

    assert_eq!(report.service.state, ServiceState::Unhealthy);
    assert_eq!(report.service.detail.as_deref(), Some("1/2 running"));
    assert_eq!(h.log.count(&Call::Containers), 1);
    assert_eq!(h.log.count(&Call::Status), 0);
    assert_eq!(h.log.count(&Call::Down), 1);
}

#[tokio::test]
async fn test_any_up_policy_treats_partial_outage_as_healthy() {
    let h = Scenario {
        status_text: Some("dfa_bot_1  Up 2 hours\ndfa_redis_1  Exited (137)"),
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;

    assert!(report.service.is_running());
    assert_eq!(h.log.count(&Call::Down), 0);
}

#[tokio::test]
async fn test_all_running_policy_empty_unit_is_down() {
    let mut config = WatchdogConfig::default();
    config.deployment.health_policy = HealthPolicy::AllRunning;

    let h = Scenario {
        config,
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;
    assert_eq!(report.service.state, ServiceState::Unhealthy);
    assert_eq!(report.service.detail.as_deref(), Some("0/0 running"));
}

#[tokio::test]
async fn test_escalation_backs_off_and_confirms_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.json");

    let mut config = WatchdogConfig::default();
    config.escalation.enabled = true;
    config.escalation.state_file = ledger_path.clone();
    config.escalation.backoff_base_secs = 3600;
    config.escalation.backoff_max_secs = 7200;
    config.escalation.alert_threshold = 2;

    let h = Scenario {
        config,
        status_text: Some("dfa_bot_1  Exited (1)"),
        ..Default::default()
    }
    .build();

    // first failure restarts immediately and leaves recovery pending
    let first = h.watchdog.run_cycle().await;
    assert!(first.service.restart.is_some());
    assert_eq!(first.service.recovery, Some(RecoveryState::Pending));
    assert!(ledger_path.exists());

    // still down within the backoff window: no second restart
    let second = h.watchdog.run_cycle().await;
    assert!(second.service.restart.is_none());
    assert!(matches!(
        second.service.recovery,
        Some(RecoveryState::Deferred { .. })
    ));
    assert_eq!(h.log.count(&Call::Down), 1);
    assert_eq!(h.log.count(&Call::Up), 1);

    let ledger: bot_watchdog::FailureLedger =
        serde_json::from_slice(&std::fs::read(&ledger_path).unwrap()).unwrap();
    assert_eq!(ledger.consecutive_failures, 2);
    assert_eq!(ledger.restart_attempts, 1);
    assert!(ledger.pending_recovery);

    // healthy again: the earlier restart is confirmed and the streak resets
    h.set_status(Some("dfa_bot_1  Up 10 seconds"));
    let third = h.watchdog.run_cycle().await;
    assert!(third.service.is_running());
    assert_eq!(third.service.recovery, Some(RecoveryState::Confirmed));

    let ledger: bot_watchdog::FailureLedger =
        serde_json::from_slice(&std::fs::read(&ledger_path).unwrap()).unwrap();
    assert_eq!(ledger, bot_watchdog::FailureLedger::default());
}

#[tokio::test]
async fn test_corrupt_ledger_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.json");
    std::fs::write(&ledger_path, "garbage").unwrap();

    let mut config = WatchdogConfig::default();
    config.escalation.enabled = true;
    config.escalation.state_file = ledger_path.clone();

    let h = Scenario {
        config,
        status_text: Some(""),
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;
    assert!(report.service.restart.is_some());
    assert_eq!(report.service.recovery, Some(RecoveryState::Pending));

    let ledger: FailureLedger =
        serde_json::from_str(&std::fs::read_to_string(&ledger_path).unwrap()).unwrap();
    assert_eq!(ledger.consecutive_failures, 1);
    assert_eq!(ledger.restart_attempts, 1);
    assert!(ledger.pending_recovery);
}

#[tokio::test]
async fn test_unreadable_ledger_falls_back_to_stateless() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where the file should be cannot be read as a ledger
    let ledger_path = dir.path().join("ledger.json");
    std::fs::create_dir(&ledger_path).unwrap();

    let mut config = WatchdogConfig::default();
    config.escalation.enabled = true;
    config.escalation.state_file = ledger_path.clone();

    let h = Scenario {
        config,
        status_text: Some(""),
        ..Default::default()
    }
    .build();

    let report = h.watchdog.run_cycle().await;
    assert!(report.service.restart.is_some());
    assert!(report.service.recovery.is_none());
    assert!(ledger_path.is_dir());
}

#[tokio::test]
async fn test_unresponsive_exchange_bounds_cycle_time() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let log = CallLog::default();
    let sink = Arc::new(CollectingSink::default());
    let deps = Collaborators {
        runtime: Arc::new(MockRuntime {
            log: log.clone(),
            active: Mutex::new(Some(true)),
            fail_start: false,
        }),
        orchestrator: Arc::new(MockOrchestrator {
            log: log.clone(),
            status_text: Mutex::new(Some("dfa_bot_1  Up 2 hours".to_string())),
            containers: Mutex::new(Vec::new()),
            fail_down: false,
            fail_up: false,
        }),
        resources: Arc::new(MockResources {
            log: log.clone(),
            snapshot: Some(sample_snapshot()),
        }),
        probe: Arc::new(HttpProbe::new(&server.uri(), Duration::from_secs(1)).unwrap()),
        sink: sink.clone(),
    };
    let watchdog = Watchdog::new(WatchdogConfig::default(), deps);

    let started = Instant::now();
    let report = watchdog.run_cycle().await;
    let elapsed = started.elapsed();

    assert!(!report.reachability.reachable);
    assert!(elapsed >= Duration::from_millis(900), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test]
async fn test_watch_runs_serial_cycles_until_shutdown() {
    let h = Scenario::default().build();

    let shutdown = tokio::time::sleep(Duration::from_millis(250));
    let cycles = h.watchdog.watch(Duration::from_millis(50), shutdown).await;

    assert!(cycles >= 2, "only {} cycles", cycles);
    assert_eq!(h.sink.reports().len() as u64, cycles);
    // each cycle queried the runtime exactly once
    assert_eq!(h.log.count(&Call::IsActive("docker".to_string())) as u64, cycles);
}
