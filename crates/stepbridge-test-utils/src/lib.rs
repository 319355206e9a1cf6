//! Shared test utilities for stepbridge integration tests.
//!
//! - [`ManualHost`]: a [`HostScheduler`] that never fires on its own. Tests
//!   decide when each registration is satisfied, faulted, or forgotten, and
//!   can inspect what was registered and cancelled.
//! - [`ScriptedCoroutine`]: a coroutine built from a fixed list of steps
//!   that counts how many times it was resumed.
//! - [`settle`]: let spawned tasks on the current-thread runtime run until
//!   they block.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stepbridge_core::{
    BoxError, Coroutine, DeferredCallback, HostFault, HostScheduler, RegistrationHandle,
    WaitCondition, Yielded,
};

// ===========================================================================
// ManualHost
// ===========================================================================

#[derive(Default)]
struct HostState {
    next_id: u64,
    pending: BTreeMap<RegistrationHandle, DeferredCallback>,
    registered: Vec<(RegistrationHandle, WaitCondition)>,
    cancelled: Vec<RegistrationHandle>,
    reject_next: Option<HostFault>,
}

/// Host scheduler controlled entirely by the test.
#[derive(Default)]
pub struct ManualHost {
    state: Mutex<HostState>,
}

impl ManualHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every condition ever registered, in registration order.
    pub fn registered(&self) -> Vec<WaitCondition> {
        self.lock()
            .registered
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Handles still waiting, oldest first.
    pub fn pending(&self) -> Vec<RegistrationHandle> {
        self.lock().pending.keys().copied().collect()
    }

    /// Handles the bridge asked to cancel while they were still pending.
    pub fn cancelled(&self) -> Vec<RegistrationHandle> {
        self.lock().cancelled.clone()
    }

    /// The condition a handle was registered with.
    pub fn condition_of(&self, handle: RegistrationHandle) -> Option<WaitCondition> {
        self.lock()
            .registered
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, c)| c.clone())
    }

    /// Refuse the next registration with `fault`.
    pub fn reject_next(&self, fault: HostFault) {
        self.lock().reject_next = Some(fault);
    }

    /// Report `handle` satisfied. Returns `false` if it was not pending.
    pub fn satisfy(&self, handle: RegistrationHandle) -> bool {
        self.complete(handle, Ok(()))
    }

    /// Satisfy the oldest pending registration.
    pub fn satisfy_oldest(&self) -> Option<RegistrationHandle> {
        let handle = self.pending().into_iter().next()?;
        self.satisfy(handle).then_some(handle)
    }

    /// Fail `handle` with `fault`. Returns `false` if it was not pending.
    pub fn fault(&self, handle: RegistrationHandle, fault: HostFault) -> bool {
        self.complete(handle, Err(fault))
    }

    /// Drop the callback for `handle` without invoking it.
    pub fn forget(&self, handle: RegistrationHandle) -> bool {
        let removed = self.lock().pending.remove(&handle);
        removed.is_some()
    }

    fn complete(&self, handle: RegistrationHandle, outcome: Result<(), HostFault>) -> bool {
        let callback = self.lock().pending.remove(&handle);
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostScheduler for ManualHost {
    fn register_deferred_work(
        &self,
        condition: &WaitCondition,
        on_satisfied: DeferredCallback,
    ) -> Result<RegistrationHandle, HostFault> {
        let mut state = self.lock();
        if let Some(fault) = state.reject_next.take() {
            return Err(fault);
        }
        state.next_id += 1;
        let handle = RegistrationHandle::new(state.next_id);
        state.pending.insert(handle, on_satisfied);
        state.registered.push((handle, condition.clone()));
        Ok(handle)
    }

    fn cancel_deferred_work(&self, handle: RegistrationHandle) {
        let removed = {
            let mut state = self.lock();
            let removed = state.pending.remove(&handle);
            if removed.is_some() {
                state.cancelled.push(handle);
            }
            removed
        };
        drop(removed);
    }
}

// ===========================================================================
// ScriptedCoroutine
// ===========================================================================

/// Shared count of `resume` calls made on a [`ScriptedCoroutine`].
#[derive(Debug, Clone, Default)]
pub struct ResumeCounter(Arc<AtomicUsize>);

impl ResumeCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Coroutine that replays a fixed list of steps.
#[derive(Default)]
pub struct ScriptedCoroutine {
    steps: VecDeque<Result<Yielded, BoxError>>,
    resumes: ResumeCounter,
}

impl ScriptedCoroutine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(mut self, condition: WaitCondition) -> Self {
        self.steps.push_back(Ok(Yielded::Wait(condition)));
        self
    }

    /// Yield without a condition.
    pub fn empty(mut self) -> Self {
        self.steps.push_back(Ok(Yielded::Empty));
        self
    }

    /// Yield a value that is not a wait condition.
    pub fn other<T: std::any::Any + Send>(mut self, value: T) -> Self {
        self.steps.push_back(Ok(Yielded::other(value)));
        self
    }

    /// Fault when this step is reached.
    pub fn fail(mut self, message: &str) -> Self {
        self.steps.push_back(Err(message.to_owned().into()));
        self
    }

    /// Handle for observing how often the coroutine was resumed.
    pub fn resumes(&self) -> ResumeCounter {
        self.resumes.clone()
    }
}

impl Coroutine for ScriptedCoroutine {
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        self.resumes.0.fetch_add(1, Ordering::SeqCst);
        self.steps.pop_front().transpose()
    }
}

// ===========================================================================
// Scheduling helpers
// ===========================================================================

/// Yield to the runtime enough times for spawned tasks to reach their next
/// suspension point.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
