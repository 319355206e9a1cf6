//! Error taxonomy for driving and bridging.

use crate::coroutine::BoxError;

/// A fault reported by the host scheduler while a wait condition was
/// registered with it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostFault {
    /// The execution context owning the registration was torn down.
    #[error("host execution context destroyed")]
    ContextDestroyed,

    /// The host released the callback without ever invoking it.
    #[error("host dropped the registration without completing it")]
    Abandoned,

    /// The host refused to accept the registration.
    #[error("registration rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by [`crate::Bridge`] and [`crate::Driver`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The coroutine returned an error while advancing.
    #[error("coroutine faulted at step {step}: {source}")]
    CoroutineFault {
        /// 1-based index of the step that failed to advance.
        step: usize,
        #[source]
        source: BoxError,
    },

    /// The host could not honor a wait-condition registration.
    #[error("host scheduling failure: {source}")]
    HostSchedulingFailure {
        #[from]
        source: HostFault,
    },

    /// The drive was cancelled before the coroutine was exhausted.
    #[error("drive cancelled before the coroutine was exhausted")]
    Cancelled,

    /// The coroutine yielded a value that is not a wait condition and the
    /// driver is configured to reject such values.
    #[error("step {step} yielded a value that is not a wait condition")]
    UnrecognizedYield { step: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The host fault behind a [`Error::HostSchedulingFailure`], if any.
    pub fn host_fault(&self) -> Option<&HostFault> {
        match self {
            Error::HostSchedulingFailure { source } => Some(source),
            _ => None,
        }
    }

    pub fn is_coroutine_fault(&self) -> bool {
        matches!(self, Error::CoroutineFault { .. })
    }
}
