//! Discrete-event simulation kernel for modeling distributed systems.
//!
//! The kernel is organised around an [`Environment`] that owns a virtual
//! clock and a time-ordered queue of scheduled callbacks, and dispatches them
//! to drive user processes. Processes are cooperative routines written as
//! `async` blocks or [`Process`] implementations; at every suspension point
//! they await an [`Event`] — a one-shot future that completes at a known or
//! unknown future time — and resume when it resolves.
//!
//! On top of events the kernel provides [timeouts](Environment::timeout),
//! blocking [`Queue`]s and [`PriorityQueue`]s, capacity-bounded [`Resource`]s,
//! [`Barrier`]s, and the combinators [`AllOf`] (join) and [`FirstOf`] (race
//! with cancellation of the losers).
//!
//! Everything is single-threaded and deterministic: entries scheduled at the
//! same simulated time dispatch in registration order, the clock only
//! advances between dispatches, and a given construction script with a given
//! seed produces the same trace on every run. There is no real networking,
//! no disk I/O and no wall-clock time; the clock advances by jumping to the
//! next scheduled entry.
//!
//! # Examples
//!
//! A producer and a consumer communicating over a queue:
//!
//! ```
//! use asim::{Environment, Queue, Value};
//!
//! let env = Environment::new();
//! let queue: Queue<u32> = Queue::new(&env);
//!
//! let consumer = env.spawn({
//!     let queue = queue.clone();
//!     async move {
//!         let item = queue.get().await?;
//!         Ok(Value::new(item.get::<u32>().expect("u32 item") * 2))
//!     }
//! });
//!
//! env.spawn({
//!     let env = env.clone();
//!     let queue = queue.clone();
//!     async move {
//!         env.timeout(1.0)?.await?;
//!         queue.put(21);
//!         Ok(Value::none())
//!     }
//! });
//!
//! env.run();
//! assert_eq!(env.now(), 1.0);
//! assert_eq!(
//!     consumer.completion().value().and_then(|v| v.get::<u32>()),
//!     Some(42)
//! );
//! ```

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::default_trait_access,
    clippy::missing_panics_doc
)]

pub use async_trait::async_trait;

mod barrier;
mod combine;
mod environment;
mod error;
mod event;
mod process;
mod queue;
mod resource;
mod value;
mod waiters;

pub use barrier::Barrier;
pub use combine::{AllOf, AllOfFuture, FirstOf, FirstOfFuture};
pub use environment::{Environment, ScheduleHandle, Time};
pub use error::{Error, Fault, Outcome};
pub use event::{Event, EventFuture, EventId};
pub use process::{Process, ProcessHandle, ProcessId};
pub use queue::{PriorityQueue, Queue};
pub use resource::Resource;
pub use value::Value;
