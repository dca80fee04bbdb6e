use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use async_trait::async_trait;
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::Outcome;
use crate::event::{Event, EventFuture};

/// Process ID, unique within one environment.
#[derive(
    From,
    Into,
    Debug,
    PartialEq,
    PartialOrd,
    Eq,
    Ord,
    Serialize,
    Deserialize,
    Copy,
    Clone,
    Hash,
    Display,
)]
pub struct ProcessId(u64);

/// A cooperative routine driven by the simulation.
///
/// The body suspends exclusively by awaiting [`Event`]s (queue operations,
/// timeouts, resource acquisitions, combinators); between suspension points
/// it runs to completion without preemption. Implementing types hold their
/// construction-time state as ordinary fields.
///
/// For one-off routines a plain future passed to [`Environment::spawn`] is
/// equivalent; this trait is the struct-shaped form used for long-lived
/// actors.
#[async_trait(?Send)]
pub trait Process: 'static {
    /// Body of the routine. Returning `Ok` resolves the completion event
    /// with the returned value; returning `Err` fails it, and other routines
    /// awaiting the completion observe the fault.
    async fn run(self: Rc<Self>, env: Environment) -> Outcome;
}

/// Handle to a spawned process.
///
/// The handle is awaitable: awaiting it suspends until the process
/// terminates and yields its outcome.
#[derive(Clone)]
pub struct ProcessHandle {
    id: ProcessId,
    completion: Event,
}

impl ProcessHandle {
    /// The process's ID.
    #[must_use]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// The completion event: succeeds with the routine's return value, or
    /// fails with its fault, when the routine terminates.
    #[must_use]
    pub fn completion(&self) -> Event {
        self.completion.clone()
    }
}

impl IntoFuture for ProcessHandle {
    type Output = Outcome;
    type IntoFuture = EventFuture;

    fn into_future(self) -> EventFuture {
        self.completion.into_future()
    }
}

pub(crate) struct ProcessCore {
    id: ProcessId,
    env: Environment,
    routine: RefCell<Option<Pin<Box<dyn Future<Output = Outcome>>>>>,
    completion: Event,
}

/// The kernel never relies on wakers: a suspended routine is resumed by the
/// callback its pending event future subscribed. Polling still requires a
/// `Context`, so a no-op waker fills the slot.
struct NoopWaker;

impl Wake for NoopWaker {
    fn wake(self: Arc<Self>) {}
}

impl ProcessCore {
    /// Advances the routine until it suspends on an event or terminates.
    pub(crate) fn step(this: &Rc<Self>) {
        let poll = {
            let mut slot = this.routine.borrow_mut();
            let Some(routine) = slot.as_mut() else { return };
            let previous = this.env.set_current(Some(Rc::clone(this)));
            let waker = Waker::from(Arc::new(NoopWaker));
            let poll = routine.as_mut().poll(&mut Context::from_waker(&waker));
            this.env.set_current(previous);
            if poll.is_ready() {
                *slot = None;
            }
            poll
        };
        if let Poll::Ready(outcome) = poll {
            log::debug!("process {} terminated", this.id);
            match outcome {
                Ok(value) => this.completion.succeed(value),
                Err(fault) => this.completion.fail(fault),
            }
            .expect("completion event resolved twice");
        }
    }
}

impl Environment {
    /// Spawns a routine from a future; its first step runs at the current
    /// time, after entries already scheduled.
    ///
    /// This is the function-value form of [`Process`], convenient for
    /// closures:
    ///
    /// ```
    /// # use asim::{Environment, Value};
    /// let env = Environment::new();
    /// let handle = env.spawn({
    ///     let env = env.clone();
    ///     async move {
    ///         env.timeout(1.5)?.await?;
    ///         Ok(Value::new("done"))
    ///     }
    /// });
    /// env.run();
    /// assert_eq!(env.now(), 1.5);
    /// assert!(handle.completion().is_succeeded());
    /// ```
    pub fn spawn<F>(&self, routine: F) -> ProcessHandle
    where
        F: Future<Output = Outcome> + 'static,
    {
        let core = Rc::new(ProcessCore {
            id: self.next_process_id(),
            env: self.clone(),
            routine: RefCell::new(Some(Box::pin(routine))),
            completion: self.event(),
        });
        log::trace!("spawning process {} at {}", core.id, self.now());
        let handle = ProcessHandle {
            id: core.id,
            completion: core.completion.clone(),
        };
        self.enqueue(self.now(), move || ProcessCore::step(&core));
        handle
    }

    /// Spawns a struct-shaped [`Process`].
    pub fn add_process<P: Process>(&self, process: P) -> ProcessHandle {
        let env = self.clone();
        self.spawn(Rc::new(process).run(env))
    }
}
