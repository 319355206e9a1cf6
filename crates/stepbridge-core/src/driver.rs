//! Driver: runs a coroutine to completion, bridging every step.
//!
//! ```text
//! loop:
//!   resume()  -> Err(e)        => fail with CoroutineFault
//!             -> Ok(None)      => done
//!             -> Ok(Some(v))   => normalize v:
//!                  Wait(c)  -> c
//!                  Empty    -> EndOfTick
//!                  Other(_) -> diagnostic hook, then pass through
//!                              (or fail under UnrecognizedYield::Reject)
//!   bridge_condition(c).await  -> Err => fail with HostSchedulingFailure
//! ```
//!
//! The next step is never requested until the current step's condition has
//! been observed by the host, and each step suspends exactly once.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::bridge::Bridge;
use crate::condition::{WaitCondition, Yielded};
use crate::config::{DriverConfig, UnrecognizedYield};
use crate::coroutine::Coroutine;
use crate::error::{Error, Result};
use crate::host::HostScheduler;

/// What the diagnostic hook sees when a coroutine yields a value that is
/// not a wait condition.
pub struct UnrecognizedValue<'a> {
    /// Identifier of the drive, matching the `drive_id` span field.
    pub drive_id: Uuid,
    /// 1-based step index.
    pub step: usize,
    pub value: &'a (dyn Any + Send),
}

type UnrecognizedHook = Arc<dyn Fn(&UnrecognizedValue<'_>) + Send + Sync>;

/// Adapts coroutines into futures on top of a [`HostScheduler`].
///
/// A `Driver` is cheap to clone and may drive any number of coroutines
/// concurrently; each `drive` call owns its coroutine exclusively.
#[derive(Clone)]
pub struct Driver {
    bridge: Bridge,
    config: DriverConfig,
    on_unrecognized: Option<UnrecognizedHook>,
}

impl Driver {
    pub fn new(host: Arc<dyn HostScheduler>) -> Self {
        Self::with_config(host, DriverConfig::default())
    }

    pub fn with_config(host: Arc<dyn HostScheduler>, config: DriverConfig) -> Self {
        Self {
            bridge: Bridge::new(host),
            config,
            on_unrecognized: None,
        }
    }

    /// Install a hook called whenever a coroutine yields a value that is
    /// not a wait condition. It runs before the configured
    /// [`UnrecognizedYield`] policy is applied.
    pub fn on_unrecognized<F>(mut self, hook: F) -> Self
    where
        F: Fn(&UnrecognizedValue<'_>) + Send + Sync + 'static,
    {
        self.on_unrecognized = Some(Arc::new(hook));
        self
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Drive `coroutine` until it is exhausted.
    pub async fn drive<C>(&self, coroutine: C) -> Result<()>
    where
        C: Coroutine + Send,
    {
        self.drive_with_cancel(coroutine, CancellationToken::new())
            .await
    }

    /// Build a fresh coroutine with `factory` and drive it.
    pub async fn drive_fresh<F, C>(&self, factory: F) -> Result<()>
    where
        F: FnOnce() -> C,
        C: Coroutine + Send,
    {
        self.drive(factory()).await
    }

    /// Drive `coroutine` until it is exhausted or `cancel` fires.
    ///
    /// On cancellation the pending host registration, if any, is torn down
    /// and the call fails with [`Error::Cancelled`].
    pub async fn drive_with_cancel<C>(&self, coroutine: C, cancel: CancellationToken) -> Result<()>
    where
        C: Coroutine + Send,
    {
        let drive_id = Uuid::new_v4();
        let span = tracing::debug_span!("drive", drive_id = %drive_id);
        self.run(drive_id, coroutine, cancel).instrument(span).await
    }

    async fn run<C>(&self, drive_id: Uuid, mut coroutine: C, cancel: CancellationToken) -> Result<()>
    where
        C: Coroutine + Send,
    {
        let mut step = 0usize;

        loop {
            if cancel.is_cancelled() {
                tracing::debug!(step, "drive cancelled");
                return Err(Error::Cancelled);
            }

            step += 1;
            let yielded = match coroutine.resume() {
                Ok(Some(yielded)) => yielded,
                Ok(None) => {
                    tracing::debug!(steps = step - 1, "coroutine exhausted");
                    return Ok(());
                }
                Err(source) => {
                    tracing::warn!(step, error = %source, "coroutine faulted");
                    return Err(Error::CoroutineFault { step, source });
                }
            };

            let condition = match yielded {
                Yielded::Wait(condition) => condition,
                Yielded::Empty => WaitCondition::EndOfTick,
                Yielded::Other(value) => {
                    self.report_unrecognized(drive_id, step, value.as_ref());
                    match self.config.unrecognized {
                        UnrecognizedYield::PassThrough => continue,
                        UnrecognizedYield::Reject => {
                            return Err(Error::UnrecognizedYield { step });
                        }
                    }
                }
            };

            tracing::trace!(step, condition = %condition, "waiting on host");
            let bridged = self.bridge.bridge_condition(condition);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Dropping `bridged` here cancels its host registration.
                    tracing::debug!(step, "drive cancelled while waiting on host");
                    return Err(Error::Cancelled);
                }
                outcome = bridged => {
                    if let Err(e) = outcome {
                        tracing::warn!(step, error = %e, "wait condition failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    fn report_unrecognized(&self, drive_id: Uuid, step: usize, value: &(dyn Any + Send)) {
        tracing::warn!(
            step,
            policy = %self.config.unrecognized,
            "coroutine yielded a value that is not a wait condition"
        );
        if let Some(hook) = &self.on_unrecognized {
            hook(&UnrecognizedValue {
                drive_id,
                step,
                value,
            });
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("has_unrecognized_hook", &self.on_unrecognized.is_some())
            .finish()
    }
}
