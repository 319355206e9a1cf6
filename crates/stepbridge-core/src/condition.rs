//! Wait conditions and the values a coroutine yields at each step.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What must happen before a coroutine's next step may run.
///
/// The set of kinds is closed; anything host-specific goes through
/// [`WaitCondition::Custom`] and is interpreted by the host alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// Resume once at least this much host time has elapsed.
    TimeDelay(Duration),
    /// Resume at the end of the current host tick. This is the smallest
    /// deferral the host offers.
    EndOfTick,
    /// Resume when the host decides the token is satisfied.
    Custom(ConditionToken),
}

impl WaitCondition {
    /// Replace a missing condition with [`WaitCondition::EndOfTick`].
    pub fn normalize(condition: Option<WaitCondition>) -> WaitCondition {
        condition.unwrap_or(WaitCondition::EndOfTick)
    }

    /// Shorthand for a [`WaitCondition::TimeDelay`] in seconds.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is negative, not finite, or too large for a
    /// [`Duration`]. Use [`WaitCondition::try_seconds`] for untrusted input.
    pub fn seconds(secs: f64) -> WaitCondition {
        WaitCondition::TimeDelay(Duration::from_secs_f64(secs))
    }

    /// Like [`WaitCondition::seconds`], but `None` where that would panic.
    pub fn try_seconds(secs: f64) -> Option<WaitCondition> {
        Duration::try_from_secs_f64(secs)
            .ok()
            .map(WaitCondition::TimeDelay)
    }

    /// Shorthand for a [`WaitCondition::Custom`] keyed by `key`.
    pub fn custom(key: impl Into<Arc<str>>) -> WaitCondition {
        WaitCondition::Custom(ConditionToken::new(key))
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            WaitCondition::TimeDelay(_) => "time_delay",
            WaitCondition::EndOfTick => "end_of_tick",
            WaitCondition::Custom(_) => "custom",
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitCondition::TimeDelay(d) => write!(f, "wait {d:?}"),
            WaitCondition::EndOfTick => f.write_str("end of tick"),
            WaitCondition::Custom(token) => write!(f, "custom {}", token.key()),
        }
    }
}

/// Opaque, host-interpreted wait token.
///
/// Carries a key the host uses to match the token against its own events,
/// and an optional payload the host may downcast. Tokens compare by key.
#[derive(Clone)]
pub struct ConditionToken {
    key: Arc<str>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl ConditionToken {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            payload: None,
        }
    }

    /// Attach a payload for the host to inspect.
    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Borrow the payload as `T`, if one was attached with that type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl PartialEq for ConditionToken {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ConditionToken {}

impl fmt::Debug for ConditionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionToken")
            .field("key", &self.key)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// The value a coroutine produces when it pauses.
pub enum Yielded {
    /// Pause until the host observes this condition.
    Wait(WaitCondition),
    /// No explicit condition: yield control to the host for one tick.
    Empty,
    /// A value that is not a wait condition at all.
    Other(Box<dyn Any + Send>),
}

impl Yielded {
    pub fn other<T: Any + Send>(value: T) -> Self {
        Yielded::Other(Box::new(value))
    }
}

impl From<WaitCondition> for Yielded {
    fn from(condition: WaitCondition) -> Self {
        Yielded::Wait(condition)
    }
}

impl From<Option<WaitCondition>> for Yielded {
    fn from(condition: Option<WaitCondition>) -> Self {
        condition.map_or(Yielded::Empty, Yielded::Wait)
    }
}

impl fmt::Debug for Yielded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Yielded::Wait(c) => f.debug_tuple("Wait").field(c).finish(),
            Yielded::Empty => f.write_str("Empty"),
            Yielded::Other(_) => f.write_str("Other(..)"),
        }
    }
}
