//! Reference host: an in-process scheduler advanced one tick at a time.
//!
//! Time is virtual. Every call to [`TickScheduler::tick`] moves the clock
//! forward by the configured interval and then fires, in registration order,
//! every pending registration whose condition now holds:
//!
//! - `EndOfTick` fires on the next tick.
//! - `TimeDelay(d)` fires on the first tick where `now >= registered_at + d`.
//!   A zero delay still waits for the next tick.
//! - `Custom(token)` fires on the first tick after [`TickScheduler::signal`]
//!   was called with the token's key. Signals are latched until that tick
//!   consumes them.
//!
//! Callbacks run after the internal lock is released, so they may register
//! new work; anything registered from a callback waits for a later tick.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::condition::WaitCondition;
use crate::error::HostFault;

use super::{DeferredCallback, HostScheduler, RegistrationHandle};

pub use crate::config::TickConfig;

struct Pending {
    condition: WaitCondition,
    registered_at: Duration,
    callback: DeferredCallback,
}

impl Pending {
    fn is_due(&self, now: Duration, signals: &HashSet<String>) -> bool {
        match &self.condition {
            WaitCondition::EndOfTick => true,
            WaitCondition::TimeDelay(delay) => self
                .registered_at
                .checked_add(*delay)
                .is_some_and(|at| now >= at),
            WaitCondition::Custom(token) => signals.contains(token.key()),
        }
    }
}

#[derive(Default)]
struct State {
    now: Duration,
    ticks: u64,
    next_id: u64,
    pending: BTreeMap<RegistrationHandle, Pending>,
    signals: HashSet<String>,
    shut_down: bool,
}

/// Tick-driven [`HostScheduler`].
pub struct TickScheduler {
    config: TickConfig,
    state: Mutex<State>,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval()
    }

    /// Virtual time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.lock().ticks
    }

    /// Number of registrations still waiting.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// Latch a custom signal; registrations waiting on `key` fire at the
    /// next tick.
    pub fn signal(&self, key: &str) {
        let mut state = self.lock();
        if !state.shut_down {
            state.signals.insert(key.to_owned());
        }
    }

    /// Advance the clock one interval and fire every due registration.
    ///
    /// Returns the number of callbacks fired. After [`Self::shutdown`] this
    /// does nothing and returns 0.
    pub fn tick(&self) -> usize {
        let due: Vec<(RegistrationHandle, DeferredCallback)> = {
            let mut state = self.lock();
            if state.shut_down {
                return 0;
            }
            state.ticks += 1;
            state.now += self.config.tick_interval();

            let now = state.now;
            let signals = std::mem::take(&mut state.signals);
            let ready: Vec<RegistrationHandle> = state
                .pending
                .iter()
                .filter(|(_, p)| p.is_due(now, &signals))
                .map(|(handle, _)| *handle)
                .collect();

            ready
                .into_iter()
                .filter_map(|handle| {
                    state
                        .pending
                        .remove(&handle)
                        .map(|p| (handle, p.callback))
                })
                .collect()
        };

        let fired = due.len();
        for (handle, callback) in due {
            tracing::trace!(registration = %handle, "wait condition satisfied");
            callback(Ok(()));
        }
        fired
    }

    /// Tear the execution context down.
    ///
    /// Every pending callback is invoked with
    /// [`HostFault::ContextDestroyed`] and later registrations are rejected.
    pub fn shutdown(&self) {
        let pending = {
            let mut state = self.lock();
            state.shut_down = true;
            state.signals.clear();
            std::mem::take(&mut state.pending)
        };

        if !pending.is_empty() {
            tracing::debug!(
                pending = pending.len(),
                "tick scheduler shutting down with pending registrations"
            );
        }
        for (_, p) in pending {
            (p.callback)(Err(HostFault::ContextDestroyed));
        }
    }

    /// Tick in real time, once per interval, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new(TickConfig::default())
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TickScheduler")
            .field("tick_interval", &self.config.tick_interval())
            .field("now", &state.now)
            .field("ticks", &state.ticks)
            .field("pending", &state.pending.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

impl HostScheduler for TickScheduler {
    fn register_deferred_work(
        &self,
        condition: &WaitCondition,
        on_satisfied: DeferredCallback,
    ) -> Result<RegistrationHandle, HostFault> {
        let mut state = self.lock();
        if state.shut_down {
            return Err(HostFault::ContextDestroyed);
        }

        state.next_id += 1;
        let handle = RegistrationHandle::new(state.next_id);
        let registered_at = state.now;
        state.pending.insert(
            handle,
            Pending {
                condition: condition.clone(),
                registered_at,
                callback: on_satisfied,
            },
        );

        tracing::trace!(
            registration = %handle,
            condition = %condition,
            "registered deferred work"
        );
        Ok(handle)
    }

    fn cancel_deferred_work(&self, handle: RegistrationHandle) {
        // Bind outside the guard so the callback is dropped after unlocking.
        let removed = self.lock().pending.remove(&handle);
        if removed.is_some() {
            tracing::debug!(registration = %handle, "cancelled deferred work");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    type Log = Arc<Mutex<Vec<(&'static str, Result<(), HostFault>)>>>;

    fn scheduler(ms: u64) -> TickScheduler {
        TickScheduler::new(TickConfig::new(Duration::from_millis(ms)))
    }

    fn recorder(log: &Log, label: &'static str) -> DeferredCallback {
        let log = Arc::clone(log);
        Box::new(move |outcome| log.lock().unwrap().push((label, outcome)))
    }

    fn labels(log: &Log) -> Vec<&'static str> {
        log.lock().unwrap().iter().map(|(l, _)| *l).collect()
    }

    #[test]
    fn end_of_tick_fires_on_next_tick_only() {
        let host = scheduler(10);
        let log = Log::default();
        host.register_deferred_work(&WaitCondition::EndOfTick, recorder(&log, "a"))
            .unwrap();

        assert!(labels(&log).is_empty());
        assert_eq!(host.tick(), 1);
        assert_eq!(labels(&log), vec!["a"]);
        assert_eq!(host.tick(), 0);
        assert_eq!(host.pending(), 0);
    }

    #[test]
    fn time_delay_fires_once_enough_virtual_time_passed() {
        let host = scheduler(10);
        let log = Log::default();
        host.register_deferred_work(
            &WaitCondition::TimeDelay(Duration::from_millis(30)),
            recorder(&log, "delay"),
        )
        .unwrap();

        host.tick();
        host.tick();
        assert!(labels(&log).is_empty());
        host.tick();
        assert_eq!(labels(&log), vec!["delay"]);
        assert_eq!(host.now(), Duration::from_millis(30));
        assert_eq!(host.ticks(), 3);
    }

    #[test]
    fn zero_delay_still_waits_one_tick() {
        let host = scheduler(10);
        let log = Log::default();
        host.register_deferred_work(&WaitCondition::TimeDelay(Duration::ZERO), recorder(&log, "z"))
            .unwrap();

        assert!(labels(&log).is_empty());
        host.tick();
        assert_eq!(labels(&log), vec!["z"]);
    }

    #[test]
    fn custom_condition_waits_for_matching_signal() {
        let host = scheduler(10);
        let log = Log::default();
        host.register_deferred_work(&WaitCondition::custom("door"), recorder(&log, "door"))
            .unwrap();
        host.register_deferred_work(&WaitCondition::custom("bell"), recorder(&log, "bell"))
            .unwrap();

        host.tick();
        assert!(labels(&log).is_empty());

        host.signal("bell");
        host.tick();
        assert_eq!(labels(&log), vec!["bell"]);

        // Signals are consumed by the tick that saw them.
        host.tick();
        assert_eq!(labels(&log), vec!["bell"]);
        assert_eq!(host.pending(), 1);
    }

    #[test]
    fn due_registrations_fire_in_registration_order() {
        let host = scheduler(10);
        let log = Log::default();
        for label in ["first", "second", "third"] {
            host.register_deferred_work(&WaitCondition::EndOfTick, recorder(&log, label))
                .unwrap();
        }

        host.tick();
        assert_eq!(labels(&log), vec!["first", "second", "third"]);
    }

    #[test]
    fn cancelled_registration_never_fires() {
        let host = scheduler(10);
        let log = Log::default();
        let handle = host
            .register_deferred_work(&WaitCondition::EndOfTick, recorder(&log, "gone"))
            .unwrap();

        host.cancel_deferred_work(handle);
        assert_eq!(host.pending(), 0);
        host.tick();
        assert!(labels(&log).is_empty());

        // Cancelling twice is a no-op.
        host.cancel_deferred_work(handle);
    }

    #[test]
    fn shutdown_faults_pending_and_rejects_new_work() {
        let host = scheduler(10);
        let log = Log::default();
        host.register_deferred_work(&WaitCondition::seconds(5.0), recorder(&log, "long"))
            .unwrap();

        host.shutdown();
        assert!(host.is_shut_down());
        {
            let entries = log.lock().unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].0, "long");
            assert_eq!(entries[0].1, Err(HostFault::ContextDestroyed));
        }

        let rejected =
            host.register_deferred_work(&WaitCondition::EndOfTick, recorder(&log, "late"));
        assert_eq!(rejected, Err(HostFault::ContextDestroyed));
        assert_eq!(host.tick(), 0);
    }

    #[test]
    fn callbacks_may_register_follow_up_work() {
        let host = Arc::new(scheduler(10));
        let log = Log::default();

        let inner_host = Arc::clone(&host);
        let inner_log = Arc::clone(&log);
        host.register_deferred_work(
            &WaitCondition::EndOfTick,
            Box::new(move |_| {
                inner_log.lock().unwrap().push(("outer", Ok(())));
                inner_host
                    .register_deferred_work(&WaitCondition::EndOfTick, recorder(&inner_log, "inner"))
                    .unwrap();
            }),
        )
        .unwrap();

        host.tick();
        assert_eq!(labels(&log), vec!["outer"]);
        host.tick();
        assert_eq!(labels(&log), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn run_ticks_until_cancelled() {
        let host = Arc::new(scheduler(1));
        let (tx, rx) = tokio::sync::oneshot::channel();
        host.register_deferred_work(
            &WaitCondition::TimeDelay(Duration::from_millis(3)),
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let runner = {
            let host = Arc::clone(&host);
            let cancel = cancel.clone();
            tokio::spawn(async move { host.run(cancel).await })
        };

        let outcome = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("tick loop should fire the registration")
            .unwrap();
        assert_eq!(outcome, Ok(()));

        cancel.cancel();
        runner.await.unwrap();
        assert!(host.ticks() >= 3);
    }

    #[tokio::test]
    async fn run_with_zero_interval_uses_clamped_period() {
        let host = TickScheduler::new(TickConfig::new(Duration::ZERO));
        assert_eq!(host.tick_interval(), Duration::from_millis(1));

        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), host.run(cancel))
            .await
            .expect("run should return once cancelled");
    }
}
