//! Host scheduler interface.
//!
//! The host is the only party that knows when a [`WaitCondition`] is
//! satisfied. The bridge hands it a one-shot callback per condition and
//! relies on it to call back, fault, or let the registration be cancelled.
//!
//! ```text
//! Bridge --register_deferred_work(cond, cb)--> HostScheduler
//!        <------------ RegistrationHandle -----
//!   ...
//! HostScheduler (on its own tick) --cb(Ok(()))--> CompletionSignal
//!   or, if the Bridged future is dropped first:
//! Bridge --cancel_deferred_work(handle)--> HostScheduler
//! ```
//!
//! [`tick::TickScheduler`] is an in-process reference implementation driven
//! by explicit ticks.

pub mod tick;

use std::fmt;

use crate::condition::WaitCondition;
use crate::error::HostFault;

pub use tick::{TickConfig, TickScheduler};

/// One-shot callback the host invokes when a registered condition is
/// satisfied (`Ok(())`) or can no longer be waited on (`Err(fault)`).
pub type DeferredCallback = Box<dyn FnOnce(Result<(), HostFault>) + Send + 'static>;

/// Identifier of a pending host registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationHandle(u64);

impl RegistrationHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

/// Adapter interface for the external scheduler that actually waits.
///
/// Implementations must accept concurrent independent registrations and
/// must be callable from any thread. Neither method may block.
pub trait HostScheduler: Send + Sync {
    /// Submit `on_satisfied` to run once `condition` holds.
    ///
    /// Returning `Err` means the host refused the registration and
    /// `on_satisfied` was dropped without being called.
    fn register_deferred_work(
        &self,
        condition: &WaitCondition,
        on_satisfied: DeferredCallback,
    ) -> Result<RegistrationHandle, HostFault>;

    /// Best-effort teardown of a pending registration. Cancelling a handle
    /// that already fired or is unknown is a no-op.
    fn cancel_deferred_work(&self, handle: RegistrationHandle);
}

// Compile-time assertion: HostScheduler must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn HostScheduler) {}
};
