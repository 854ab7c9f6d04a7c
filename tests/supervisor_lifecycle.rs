// tests/supervisor_lifecycle.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use tokio::time::{sleep, Duration, Instant};

use devloop::errors::DevloopError;
use devloop::supervise::{ProcessSupervisor, SupervisorPhase};
use devloop::types::ExitOutcome;
use devloop_test_utils::builders::supervisor_config;
use devloop_test_utils::fake_launcher::{FakeLauncher, Signal};

fn supervisor(
    launcher: &FakeLauncher,
    cooldown: Duration,
    kill_grace: Duration,
) -> ProcessSupervisor<FakeLauncher> {
    ProcessSupervisor::new(launcher.clone(), supervisor_config(cooldown, kill_grace))
}

#[tokio::test(start_paused = true)]
async fn crash_relaunches_after_cooldown() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_secs(1), Duration::from_secs(5));

    let started = Instant::now();
    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    let first = launcher.process(0).unwrap();
    assert!(first.launched_at() - started >= Duration::from_secs(1));

    let crashed = Instant::now();
    first.crash();
    with_timeout(launcher.wait_for_launches(2)).await;

    let second = launcher.process(1).unwrap();
    assert!(second.launched_at() - crashed >= Duration::from_secs(1));
    assert_eq!(launcher.alive(), 1);
    assert_eq!(sup.status().launches, 2);

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn clean_exit_is_also_followed_by_a_relaunch() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_millis(200), Duration::from_secs(5));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    launcher.process(0).unwrap().exit(ExitOutcome::Success);

    with_timeout(launcher.wait_for_launches(2)).await;
    assert_eq!(sup.phase(), SupervisorPhase::Running);

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_relaunches_without_cooldown() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_secs(3), Duration::from_secs(5));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;

    let requested = Instant::now();
    sup.restart();
    with_timeout(launcher.wait_for_launches(2)).await;

    let first = launcher.process(0).unwrap();
    let second = launcher.process(1).unwrap();
    assert_eq!(first.signals(), vec![Signal::Interrupt]);
    assert!(!first.is_running());
    assert!(second.launched_at() - requested < Duration::from_secs(3));
    assert_eq!(launcher.alive(), 1);

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_while_waiting_out_cooldown_launches_immediately() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_secs(3), Duration::from_secs(5));

    let started = Instant::now();
    sup.start();
    sup.restart();
    with_timeout(launcher.wait_for_launches(1)).await;

    assert!(launcher.process(0).unwrap().launched_at() - started < Duration::from_secs(3));

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stubborn_process_is_killed_and_restarts_coalesce() {
    init_tracing();

    let launcher = FakeLauncher::new().stubborn();
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(2));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;

    let requested = Instant::now();
    sup.restart();
    sup.restart();
    sup.restart();
    with_timeout(launcher.wait_for_launches(2)).await;

    let first = launcher.process(0).unwrap();
    assert_eq!(first.signals(), vec![Signal::Interrupt, Signal::Kill]);
    assert!(launcher.process(1).unwrap().launched_at() - requested >= Duration::from_secs(2));

    // Nothing else is pending: no third instance shows up.
    sleep(Duration::from_secs(1)).await;
    assert_eq!(launcher.launch_count(), 2);
    assert_eq!(launcher.alive(), 1);

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn restart_before_start_is_ignored() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(5));

    sup.restart();
    assert_eq!(sup.phase(), SupervisorPhase::NotStarted);

    sup.start();
    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    sleep(Duration::from_millis(500)).await;
    assert_eq!(launcher.launch_count(), 1);

    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_without_start_returns_immediately() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_secs(1), Duration::from_secs(5));

    let before = Instant::now();
    sup.shutdown().await.unwrap();
    assert_eq!(before.elapsed(), Duration::ZERO);
    assert_eq!(sup.phase(), SupervisorPhase::Terminated);

    // Starting afterwards does nothing.
    sup.start();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(launcher.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_active_process() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(5));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;

    with_timeout(sup.shutdown()).await.unwrap();

    let process = launcher.process(0).unwrap();
    assert!(!process.is_running());
    assert_eq!(process.signals(), vec![Signal::Interrupt]);
    assert_eq!(sup.phase(), SupervisorPhase::Terminated);
    with_timeout(sup.terminated()).await.unwrap();

    sleep(Duration::from_secs(2)).await;
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_times_out_when_process_lingers() {
    init_tracing();

    let launcher = FakeLauncher::new().stubborn();
    // Kill escalation comes only after the shutdown bound (2s).
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(30));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;

    let err = with_timeout(sup.shutdown()).await.unwrap_err();
    assert!(matches!(err, DevloopError::ShutdownTimeout(_)));
}

#[tokio::test(start_paused = true)]
async fn launch_failure_halts_the_supervisor() {
    init_tracing();

    let launcher = FakeLauncher::new().fail_from(1);
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(5));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    launcher.process(0).unwrap().crash();

    let err = with_timeout(sup.terminated()).await.unwrap_err();
    match err {
        DevloopError::SupervisorHalted(msg) => assert!(msg.contains("could not start")),
        other => panic!("expected SupervisorHalted, got {other:?}"),
    }
    assert_eq!(sup.phase(), SupervisorPhase::Terminated);
    assert!(sup.status().fatal.is_some());

    // Shutting down a halted supervisor is fine.
    with_timeout(sup.shutdown()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn losing_track_of_the_process_is_fatal() {
    init_tracing();

    let launcher = FakeLauncher::new();
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(5));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    launcher.process(0).unwrap().lose();

    let err = with_timeout(sup.terminated()).await.unwrap_err();
    assert!(matches!(err, DevloopError::SupervisorHalted(_)));
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_a_stubborn_process() {
    init_tracing();

    let launcher = FakeLauncher::new().stubborn();
    let sup = supervisor(&launcher, Duration::from_millis(100), Duration::from_secs(2));

    sup.start();
    with_timeout(launcher.wait_for_launches(1)).await;
    let mut status = sup.subscribe();

    let dropped = Instant::now();
    drop(sup);

    // The run loop must idle until the kill lands; a busy loop here would
    // keep paused time from ever reaching the grace deadline.
    with_timeout(status.wait_for(|s| s.phase == SupervisorPhase::Terminated))
        .await
        .unwrap();

    let process = launcher.process(0).unwrap();
    assert_eq!(process.signals(), vec![Signal::Interrupt, Signal::Kill]);
    assert!(!process.is_running());
    assert!(dropped.elapsed() >= Duration::from_secs(2));
    assert_eq!(launcher.launch_count(), 1);
}
