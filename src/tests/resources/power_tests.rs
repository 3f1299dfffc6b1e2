use crate::{
    CancellationToken, ConvergeConfig, ConvergeError, DesiredState, InstanceId, InstanceKind,
    PowerConverger, PowerState,
    tests::fake_remote::{FakeInstance, FakeRemote},
};
use std::time::Duration;
use tokio::time::Instant;

const SHUTDOWN: Duration = Duration::from_secs(30);

fn container(power: PowerState) -> FakeRemote {
    FakeRemote::new().with_instance(FakeInstance::container("web", power))
}

fn query_count(remote: &FakeRemote) -> usize {
    remote
        .calls()
        .iter()
        .filter(|call| call.method.ends_with(".query"))
        .count()
}

#[tokio::test]
async fn test_converged_state_issues_no_calls() {
    let remote = container(PowerState::Stopped);
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");

    let reached = PowerConverger::new(&remote, &config, InstanceKind::Container, &id)
        .reconcile(
            PowerState::Stopped,
            DesiredState::Stopped,
            Duration::from_secs(60),
            SHUTDOWN,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reached, PowerState::Stopped);
    assert!(remote.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_waits_through_transient_states() {
    let remote = container(PowerState::Stopped).settling_after(3);
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");

    let reached = PowerConverger::new(&remote, &config, InstanceKind::Container, &id)
        .reconcile(
            PowerState::Stopped,
            DesiredState::Running,
            Duration::from_secs(60),
            SHUTDOWN,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reached, PowerState::Running);
    assert_eq!(query_count(&remote), 4);
    let start = &remote.calls()[0];
    assert_eq!(start.method, "virt.instance.start");
    assert!(start.waited);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_transition_times_out_after_the_deadline() {
    let remote = container(PowerState::Stopped).never_settling();
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");
    let timeout = Duration::from_secs(20);

    let started = Instant::now();
    let err = PowerConverger::new(&remote, &config, InstanceKind::Container, &id)
        .reconcile(
            PowerState::Stopped,
            DesiredState::Running,
            timeout,
            SHUTDOWN,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed >= timeout, "timed out early after {elapsed:?}");
    assert!(elapsed <= timeout + config.poll_interval_for(timeout));
    assert!(matches!(
        err,
        ConvergeError::Timeout {
            state: PowerState::Starting,
            ..
        }
    ));
    assert!(err.to_string().contains("STARTING"));
}

#[tokio::test(start_paused = true)]
async fn test_wrong_terminal_state_names_both_states() {
    let remote = container(PowerState::Stopped).landing_in(PowerState::Stopped);
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");

    let err = PowerConverger::new(&remote, &config, InstanceKind::Container, &id)
        .reconcile(
            PowerState::Stopped,
            DesiredState::Running,
            Duration::from_secs(60),
            SHUTDOWN,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("STOPPED"), "{message}");
    assert!(message.contains("RUNNING"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_issues_no_further_calls() {
    let remote = container(PowerState::Stopped).never_settling();
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");
    let converger = PowerConverger::new(&remote, &config, InstanceKind::Container, &id);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let (result, calls_at_cancel) = tokio::join!(
        converger.reconcile(
            PowerState::Stopped,
            DesiredState::Running,
            Duration::from_secs(300),
            SHUTDOWN,
            &cancel,
        ),
        async {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
            remote.calls().len()
        }
    );

    assert!(matches!(result, Err(ConvergeError::Cancelled)));
    assert_eq!(remote.calls().len(), calls_at_cancel);
    // start, then polls at 5s and 10s
    assert_eq!(calls_at_cancel, 3);
}

#[tokio::test(start_paused = true)]
async fn test_short_timeouts_poll_at_the_floor() {
    let remote = container(PowerState::Stopped).never_settling();
    let config = ConvergeConfig::default();
    let id = InstanceId::from("web");

    let err = PowerConverger::new(&remote, &config, InstanceKind::Container, &id)
        .reconcile(
            PowerState::Stopped,
            DesiredState::Running,
            Duration::from_millis(500),
            SHUTDOWN,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConvergeError::Timeout { .. }));
    assert_eq!(query_count(&remote), 5);
}

#[tokio::test(start_paused = true)]
async fn test_stop_sends_graceful_shutdown() {
    let remote = FakeRemote::new().with_instance(FakeInstance::vm(3, "db", PowerState::Running));
    let config = ConvergeConfig::default();
    let id = InstanceId::Numeric(3);

    let reached = PowerConverger::new(&remote, &config, InstanceKind::Vm, &id)
        .reconcile(
            PowerState::Running,
            DesiredState::Stopped,
            Duration::from_secs(60),
            Duration::from_secs(45),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(reached, PowerState::Stopped);
    let stop = &remote.calls()[0];
    assert_eq!(stop.method, "vm.stop");
    assert!(stop.waited);
    assert_eq!(stop.params[1]["timeout"], 45);
    assert_eq!(stop.params[1]["force_after_timeout"], true);
}
