//! Bridge: one wait condition in, one awaitable completion out.
//!
//! [`Bridge::bridge_condition`] registers a one-shot callback with the host
//! immediately and returns a [`Bridged`] future. The callback try-resolves a
//! fresh [`CompletionSignal`] when the host observes the condition; the
//! future resolves from that signal.
//!
//! Dropping a `Bridged` before it resolves cancels the host registration.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, FusedFuture};

use crate::condition::WaitCondition;
use crate::error::{Error, HostFault, Result};
use crate::host::{DeferredCallback, HostScheduler, RegistrationHandle};
use crate::signal::CompletionSignal;

/// Converts wait conditions into futures using a [`HostScheduler`].
#[derive(Clone)]
pub struct Bridge {
    host: Arc<dyn HostScheduler>,
}

impl Bridge {
    pub fn new(host: Arc<dyn HostScheduler>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<dyn HostScheduler> {
        &self.host
    }

    /// Register `condition` with the host and return a future for it.
    ///
    /// `None` is treated as [`WaitCondition::EndOfTick`]. The registration
    /// happens before this call returns. If the host refuses it, the
    /// returned future fails with [`Error::HostSchedulingFailure`] as soon
    /// as it is polled.
    pub fn bridge_condition(&self, condition: impl Into<Option<WaitCondition>>) -> Bridged {
        let condition = WaitCondition::normalize(condition.into());
        let signal = CompletionSignal::new();
        let completion = signal.completion();

        // The callback owns the only writer. If the host drops it unrun the
        // completion reports `HostFault::Abandoned`.
        let on_satisfied: DeferredCallback = Box::new(move |outcome| match outcome {
            Ok(()) => {
                signal.try_resolve();
            }
            Err(fault) => {
                signal.try_fail(fault);
            }
        });

        match self.host.register_deferred_work(&condition, on_satisfied) {
            Ok(handle) => {
                tracing::trace!(
                    registration = %handle,
                    condition = %condition,
                    "bridged wait condition"
                );
                Bridged {
                    state: State::Waiting {
                        completion: completion.wait().boxed(),
                        registration: Registration {
                            host: Arc::clone(&self.host),
                            handle,
                            armed: true,
                        },
                    },
                }
            }
            Err(fault) => {
                tracing::warn!(
                    condition = %condition,
                    error = %fault,
                    "host refused wait condition"
                );
                Bridged {
                    state: State::Refused(fault),
                }
            }
        }
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

/// A live host registration; cancelled on drop unless disarmed.
struct Registration {
    host: Arc<dyn HostScheduler>,
    handle: RegistrationHandle,
    armed: bool,
}

impl Registration {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                registration = %self.handle,
                "bridged future dropped before completion, cancelling host registration"
            );
            self.host.cancel_deferred_work(self.handle);
        }
    }
}

enum State {
    Waiting {
        completion: BoxFuture<'static, Result<(), HostFault>>,
        registration: Registration,
    },
    Refused(HostFault),
    Done,
}

/// Future returned by [`Bridge::bridge_condition`].
///
/// Resolves to `Ok(())` once the host reports the condition satisfied, or
/// to [`Error::HostSchedulingFailure`] if the host faults. Dropping it early
/// cancels the host registration.
#[must_use = "dropping a Bridged future cancels its host registration"]
pub struct Bridged {
    state: State,
}

impl Bridged {
    /// The host registration this future is waiting on, if still pending.
    pub fn registration(&self) -> Option<RegistrationHandle> {
        match &self.state {
            State::Waiting { registration, .. } => Some(registration.handle),
            _ => None,
        }
    }
}

impl Future for Bridged {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match std::mem::replace(&mut this.state, State::Done) {
            State::Waiting {
                mut completion,
                mut registration,
            } => match completion.poll_unpin(cx) {
                Poll::Ready(outcome) => {
                    // The host has consumed the callback either way.
                    registration.disarm();
                    Poll::Ready(outcome.map_err(Error::from))
                }
                Poll::Pending => {
                    this.state = State::Waiting {
                        completion,
                        registration,
                    };
                    Poll::Pending
                }
            },
            State::Refused(fault) => Poll::Ready(Err(fault.into())),
            State::Done => panic!("`Bridged` polled after completion"),
        }
    }
}

impl FusedFuture for Bridged {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl fmt::Debug for Bridged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Waiting { .. } => "waiting",
            State::Refused(_) => "refused",
            State::Done => "done",
        };
        f.debug_struct("Bridged")
            .field("state", &state)
            .field("registration", &self.registration())
            .finish()
    }
}
