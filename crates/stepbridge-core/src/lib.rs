//! Drive step-based coroutines as ordinary futures.
//!
//! A host (game loop, simulator, UI framework) knows how to wait for things:
//! a time delay, the end of the current tick, some host-defined event. A
//! [`Coroutine`] yields those wait conditions one step at a time. This crate
//! adapts the two so calling code can simply `.await` the whole coroutine.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   |
//!   v
//! Driver::drive(coroutine) ----resume()----> Coroutine
//!   |                        <--Yielded-----
//!   |
//!   |  bridge_condition(WaitCondition)
//!   v
//! Bridge ----register_deferred_work(cond, callback)----> HostScheduler
//!   |                                                       |
//!   |  Bridged (awaits Completion)                         tick...
//!   |                                                       |
//!   +<------- CompletionSignal::try_resolve() <---- callback fires
//! ```
//!
//! Dependency order, leaves first: [`signal`] → [`bridge`] → [`driver`].

pub mod bridge;
pub mod condition;
pub mod config;
pub mod coroutine;
pub mod driver;
pub mod error;
pub mod host;
pub mod signal;

pub use bridge::{Bridge, Bridged};
pub use condition::{ConditionToken, WaitCondition, Yielded};
pub use config::{DriverConfig, UnrecognizedYield};
pub use coroutine::{BoxError, Coroutine};
pub use driver::{Driver, UnrecognizedValue};
pub use error::{Error, HostFault, Result};
pub use host::{DeferredCallback, HostScheduler, RegistrationHandle, TickConfig, TickScheduler};
pub use signal::{Completion, CompletionSignal};
