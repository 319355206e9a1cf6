//! Set-once completion signal with an awaitable view.
//!
//! A [`CompletionSignal`] is the writer side: the host callback holds it and
//! calls [`CompletionSignal::try_resolve`] (or [`CompletionSignal::try_fail`])
//! exactly when the wait condition is observed. A [`Completion`] is a reader
//! side that any number of tasks may await.
//!
//! The outcome is written at most once. Later writes are silent no-ops that
//! neither overwrite the outcome nor notify readers again. If every writer is
//! dropped before the outcome is set, readers observe
//! [`HostFault::Abandoned`] instead of waiting forever.

use std::future::IntoFuture;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::error::HostFault;

type Outcome = Result<(), HostFault>;

/// Writer side of a single-resolution signal. Cheap to clone; every clone
/// writes to the same slot and resolving is safe from any thread.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<Option<Outcome>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the signal satisfied. Returns `true` if this call set the
    /// outcome, `false` if it was already settled.
    pub fn try_resolve(&self) -> bool {
        self.settle(Ok(()))
    }

    /// Settle the signal with a host fault. Same set-once rules as
    /// [`Self::try_resolve`].
    pub fn try_fail(&self, fault: HostFault) -> bool {
        self.settle(Err(fault))
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// A new reader view of this signal.
    pub fn completion(&self) -> Completion {
        Completion {
            rx: self.tx.subscribe(),
        }
    }

    fn settle(&self, outcome: Outcome) -> bool {
        // Readers are only notified when the closure returns true.
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a [`CompletionSignal`].
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
}

impl Completion {
    /// Whether the signal has already been settled, either way.
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until the signal is settled and return its outcome.
    pub async fn wait(mut self) -> Result<(), HostFault> {
        let waited = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map(|slot| (*slot).clone());

        let settled = match waited {
            Ok(settled) => settled,
            // All writers are gone; an outcome may still have landed first.
            Err(_) => (*self.rx.borrow()).clone(),
        };
        settled.unwrap_or(Err(HostFault::Abandoned))
    }
}

impl IntoFuture for Completion {
    type Output = Result<(), HostFault>;
    type IntoFuture = BoxFuture<'static, Result<(), HostFault>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}
