//! The `Coroutine` trait -- a step-driven, pausable sequence producer.
//!
//! A coroutine is resumed one step at a time. Each successful step yields a
//! [`Yielded`] value describing what to wait for before the next step;
//! `Ok(None)` means the coroutine has run to completion.
//!
//! Driving takes the coroutine by value, so a handle cannot be driven from
//! two places at once.

use crate::condition::Yielded;

/// Type-erased error returned by a faulting coroutine step.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A sequence of steps that pauses on wait conditions.
pub trait Coroutine {
    /// Advance one step.
    ///
    /// - `Ok(Some(value))`: the step ran and the coroutine paused on `value`.
    /// - `Ok(None)`: the coroutine is exhausted. It must not be resumed again.
    /// - `Err(e)`: the step faulted.
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError>;
}

impl<C: Coroutine + ?Sized> Coroutine for &mut C {
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        (**self).resume()
    }
}

impl<C: Coroutine + ?Sized> Coroutine for Box<C> {
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        (**self).resume()
    }
}

/// Coroutine backed by a closure. See [`from_fn`].
pub struct FromFn<F> {
    step: F,
}

impl<F> Coroutine for FromFn<F>
where
    F: FnMut() -> Result<Option<Yielded>, BoxError>,
{
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        (self.step)()
    }
}

/// Build a coroutine from a closure called once per step.
pub fn from_fn<F>(step: F) -> FromFn<F>
where
    F: FnMut() -> Result<Option<Yielded>, BoxError>,
{
    FromFn { step }
}

/// Coroutine backed by an iterator of step results. See [`from_iter`].
pub struct FromIter<I> {
    steps: I,
}

impl<I> Coroutine for FromIter<I>
where
    I: Iterator<Item = Result<Yielded, BoxError>>,
{
    fn resume(&mut self) -> Result<Option<Yielded>, BoxError> {
        self.steps.next().transpose()
    }
}

/// Build a coroutine from an iterator; the iterator ending means the
/// coroutine is exhausted.
pub fn from_iter<I>(steps: I) -> FromIter<I::IntoIter>
where
    I: IntoIterator<Item = Result<Yielded, BoxError>>,
{
    FromIter {
        steps: steps.into_iter(),
    }
}
