//! Bridge behavior against a manually-fired host.

use std::time::Duration;

use stepbridge_core::{Bridge, CompletionSignal, HostFault, WaitCondition};
use stepbridge_test_utils::ManualHost;

#[tokio::test]
async fn bridges_for_separate_conditions_resolve_independently() {
    let host = ManualHost::new();
    let bridge = Bridge::new(host.clone());

    let mut first = bridge.bridge_condition(WaitCondition::TimeDelay(Duration::from_millis(500)));
    let mut second = bridge.bridge_condition(WaitCondition::EndOfTick);
    assert_ne!(first.registration(), second.registration());

    assert!(host.satisfy(second.registration().unwrap()));
    assert!(futures::poll!(&mut second).is_ready());
    assert!(futures::poll!(&mut first).is_pending());

    assert!(host.satisfy(first.registration().unwrap()));
    first.await.unwrap();
}

#[tokio::test]
async fn none_registers_end_of_tick() {
    let host = ManualHost::new();
    let bridge = Bridge::new(host.clone());

    let bridged = bridge.bridge_condition(None);
    assert_eq!(host.registered(), vec![WaitCondition::EndOfTick]);

    host.satisfy_oldest().unwrap();
    bridged.await.unwrap();
}

#[tokio::test]
async fn host_fault_is_reported_through_the_future() {
    let host = ManualHost::new();
    let bridge = Bridge::new(host.clone());

    let bridged = bridge.bridge_condition(WaitCondition::custom("save-complete"));
    let handle = bridged.registration().unwrap();
    assert!(host.fault(handle, HostFault::Other("disk unplugged".into())));

    let err = bridged.await.unwrap_err();
    assert_eq!(
        err.host_fault(),
        Some(&HostFault::Other("disk unplugged".into()))
    );
}

#[tokio::test]
async fn rejected_registration_is_never_recorded() {
    let host = ManualHost::new();
    host.reject_next(HostFault::Rejected("too many waiters".into()));
    let bridge = Bridge::new(host.clone());

    let bridged = bridge.bridge_condition(WaitCondition::EndOfTick);
    assert!(bridged.registration().is_none());
    assert!(host.registered().is_empty());
    assert!(bridged.await.is_err());

    // The rejection applies to one registration only.
    let next = bridge.bridge_condition(WaitCondition::EndOfTick);
    assert!(next.registration().is_some());
}

#[tokio::test]
async fn dropping_a_pending_bridge_cancels_with_the_host() {
    let host = ManualHost::new();
    let bridge = Bridge::new(host.clone());

    let bridged = bridge.bridge_condition(WaitCondition::custom("never"));
    let handle = bridged.registration().unwrap();
    drop(bridged);

    assert_eq!(host.cancelled(), vec![handle]);
    assert!(!host.satisfy(handle));
}

#[tokio::test]
async fn completed_bridge_does_not_cancel_on_drop() {
    let host = ManualHost::new();
    let bridge = Bridge::new(host.clone());

    let mut bridged = bridge.bridge_condition(WaitCondition::EndOfTick);
    host.satisfy_oldest().unwrap();
    (&mut bridged).await.unwrap();
    drop(bridged);

    assert!(host.cancelled().is_empty());
}

#[test]
fn signal_can_be_settled_from_another_thread() {
    let signal = CompletionSignal::new();
    let completion = signal.completion();

    std::thread::spawn(move || {
        assert!(signal.try_resolve());
        assert!(!signal.try_resolve());
    })
    .join()
    .unwrap();

    let outcome = futures::executor::block_on(completion.wait());
    assert_eq!(outcome, Ok(()));
}
