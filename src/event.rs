use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::environment::Environment;
use crate::error::{Error, Fault, Outcome};
use crate::process::ProcessCore;
use crate::value::Value;

/// Event ID, unique within one environment.
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
pub struct EventId(u64);

type Subscriber = Box<dyn FnOnce(Outcome)>;
type CancelHook = Box<dyn FnOnce()>;

enum EventState {
    Pending {
        subscribers: Vec<Subscriber>,
        cancel_hook: Option<CancelHook>,
    },
    Resolved(Outcome),
    Cancelled,
}

struct EventCore {
    id: EventId,
    env: Environment,
    state: RefCell<EventState>,
}

/// A one-shot future: pending until it succeeds with a [`Value`] or fails
/// with a [`Fault`], then terminal forever.
///
/// Subscribed callbacks run at most once, in subscription order, and are
/// always dispatched through the environment's scheduled-entry queue — never
/// inline — so resolving many events inside a single callback cannot deepen
/// the call stack or perturb the deterministic global order.
///
/// Awaiting an event inside a routine is the suspension point of the kernel:
/// the routine resumes, at the same virtual time, once the event resolves.
///
/// # Examples
///
/// ```
/// # use std::cell::RefCell;
/// # use std::rc::Rc;
/// # use asim::{Environment, Value};
/// let env = Environment::new();
/// let event = env.event();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// event.subscribe({
///     let seen = Rc::clone(&seen);
///     move |outcome| {
///         let value = outcome.expect("succeeded");
///         seen.borrow_mut().push(value.get::<i32>().unwrap());
///     }
/// });
/// event.succeed(Value::new(7)).unwrap();
/// assert!(seen.borrow().is_empty()); // dispatch goes through the queue
/// env.run();
/// assert_eq!(*seen.borrow(), vec![7]);
/// ```
#[derive(Clone)]
pub struct Event {
    core: Rc<EventCore>,
}

impl Event {
    /// Constructs a fresh pending event owned by the caller.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        Self::with_state(
            env,
            EventState::Pending {
                subscribers: Vec::new(),
                cancel_hook: None,
            },
        )
    }

    /// Constructs an event that is already resolved, used by queues and
    /// resources for operations that complete immediately.
    pub(crate) fn resolved(env: &Environment, outcome: Outcome) -> Self {
        Self::with_state(env, EventState::Resolved(outcome))
    }

    fn with_state(env: &Environment, state: EventState) -> Self {
        Self {
            core: Rc::new(EventCore {
                id: env.next_event_id(),
                env: env.clone(),
                state: RefCell::new(state),
            }),
        }
    }

    /// The event's ID.
    #[must_use]
    pub fn id(&self) -> EventId {
        self.core.id
    }

    /// The environment this event belongs to.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.core.env
    }

    /// Resolves the event successfully with `value`.
    ///
    /// Each subscribed callback is scheduled at the current time, in
    /// subscription order. Succeeding a cancelled event is a silent no-op.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyResolved`] if the event has already
    /// succeeded or failed.
    pub fn succeed(&self, value: Value) -> Result<(), Error> {
        self.resolve(Ok(value))
    }

    /// Resolves the event with a failure.
    ///
    /// Propagates like [`succeed`](Event::succeed), except that subscribers
    /// observe the fault; a suspended routine sees its suspension point fail.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyResolved`] if the event has already
    /// succeeded or failed.
    pub fn fail(&self, fault: Fault) -> Result<(), Error> {
        self.resolve(Err(fault))
    }

    /// Registers `callback` to run once the event resolves.
    ///
    /// If the event is already resolved, the callback is scheduled at the
    /// current time rather than invoked inline. Subscribing to a cancelled
    /// event drops the callback.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnOnce(Outcome) + 'static,
    {
        {
            let mut state = self.core.state.borrow_mut();
            match &mut *state {
                EventState::Pending { subscribers, .. } => {
                    subscribers.push(Box::new(callback));
                    return;
                }
                EventState::Cancelled => return,
                EventState::Resolved(_) => {}
            }
        }
        let outcome = self.outcome().expect("resolved state checked above");
        self.core
            .env
            .enqueue(self.core.env.now(), move || callback(outcome));
    }

    /// Cancels a pending event: drops its subscribers, makes any later
    /// resolution a silent no-op, and runs the cancel hook so the event is
    /// scrubbed from whatever waiter list it participates in.
    ///
    /// Cancelling a resolved or already-cancelled event has no effect. Note
    /// that a routine suspended on the event will never resume; cancellation
    /// is meant for events the canceller itself owns, as in a lost race.
    pub fn cancel(&self) {
        if !self.is_pending() {
            return;
        }
        let previous = self.core.state.replace(EventState::Cancelled);
        let EventState::Pending { cancel_hook, .. } = previous else {
            unreachable!("pending state checked above")
        };
        log::trace!("event {} cancelled", self.core.id);
        if let Some(hook) = cancel_hook {
            hook();
        }
    }

    /// Registers the hook run when this event is cancelled. Queues, resources
    /// and timeouts use it to remove the event from their waiter lists or the
    /// schedule; a later registration replaces an earlier one.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        if let EventState::Pending { cancel_hook, .. } = &mut *self.core.state.borrow_mut() {
            *cancel_hook = Some(Box::new(hook));
        }
    }

    /// Returns `true` if the event has not resolved nor been cancelled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(&*self.core.state.borrow(), EventState::Pending { .. })
    }

    /// Returns `true` if the event resolved successfully.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        matches!(&*self.core.state.borrow(), EventState::Resolved(Ok(_)))
    }

    /// Returns `true` if the event resolved with a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(&*self.core.state.borrow(), EventState::Resolved(Err(_)))
    }

    /// Returns `true` if the event has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.core.state.borrow(), EventState::Cancelled)
    }

    /// The value carried by a successfully resolved event.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        match &*self.core.state.borrow() {
            EventState::Resolved(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// The resolution outcome, if the event has resolved.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match &*self.core.state.borrow() {
            EventState::Resolved(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Resolution fired from a scheduled entry: dropped silently if the event
    /// is no longer pending by the time the entry is dispatched.
    pub(crate) fn resolve_scheduled(&self, outcome: Outcome) {
        if self.resolve(outcome).is_err() {
            log::trace!("scheduled resolution of event {} dropped", self.core.id);
        }
    }

    fn resolve(&self, outcome: Outcome) -> Result<(), Error> {
        {
            let state = self.core.state.borrow();
            match &*state {
                EventState::Pending { .. } => {}
                EventState::Resolved(_) => return Err(Error::AlreadyResolved(self.core.id)),
                EventState::Cancelled => return Ok(()),
            }
        }
        let previous = self
            .core
            .state
            .replace(EventState::Resolved(outcome.clone()));
        let EventState::Pending { subscribers, .. } = previous else {
            unreachable!("pending state checked above")
        };
        for subscriber in subscribers {
            let outcome = outcome.clone();
            self.core
                .env
                .enqueue(self.core.env.now(), move || subscriber(outcome));
        }
        Ok(())
    }
}

impl IntoFuture for Event {
    type Output = Outcome;
    type IntoFuture = EventFuture;

    fn into_future(self) -> EventFuture {
        EventFuture {
            event: self,
            subscribed: false,
        }
    }
}

/// Future adapter returned by awaiting an [`Event`].
///
/// The first poll always subscribes and returns `Pending`, even when the
/// event has already resolved, so that resumption goes through the
/// scheduled-entry queue and the global dispatch order stays deterministic.
pub struct EventFuture {
    event: Event,
    subscribed: bool,
}

impl Future for EventFuture {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let this = self.get_mut();
        if this.subscribed {
            if let Some(outcome) = this.event.outcome() {
                return Poll::Ready(outcome);
            }
            return Poll::Pending;
        }
        this.subscribed = true;
        let env = this.event.env().clone();
        if let Some(process) = env.current_process() {
            this.event
                .subscribe(move |_outcome| ProcessCore::step(&process));
        } else {
            let waker = cx.waker().clone();
            this.event.subscribe(move |_outcome| waker.wake());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::environment::Environment;

    fn capture(event: &Event, log: &Rc<RefCell<Vec<i32>>>) {
        let log = Rc::clone(log);
        event.subscribe(move |outcome| {
            log.borrow_mut()
                .push(outcome.expect("succeeded").get::<i32>().unwrap());
        });
    }

    #[test]
    fn test_succeed_dispatches_in_subscription_order() {
        let env = Environment::new();
        let event = env.event();
        let log = Rc::new(RefCell::new(Vec::new()));
        for offset in 0..3 {
            let log = Rc::clone(&log);
            event.subscribe(move |outcome| {
                let base = outcome.expect("succeeded").get::<i32>().unwrap();
                log.borrow_mut().push(base + offset);
            });
        }
        event.succeed(Value::new(10)).unwrap();
        env.run();
        assert_eq!(*log.borrow(), vec![10, 11, 12]);
    }

    #[test]
    fn test_second_resolution_is_an_error() {
        let env = Environment::new();
        let event = env.event();
        event.succeed(Value::none()).unwrap();
        assert_eq!(
            event.succeed(Value::none()),
            Err(Error::AlreadyResolved(event.id()))
        );
        assert_eq!(
            event.fail(Fault::new("late")).map(|()| ()),
            Err(Error::AlreadyResolved(event.id()))
        );
    }

    #[test]
    fn test_subscribe_after_resolution_runs_once_at_now() {
        let env = Environment::new();
        let event = env.event();
        event.succeed(Value::new(3)).unwrap();
        env.run();
        let log = Rc::new(RefCell::new(Vec::new()));
        capture(&event, &log);
        // Not inline: the callback waits for the next dispatch.
        assert!(log.borrow().is_empty());
        env.run();
        assert_eq!(*log.borrow(), vec![3]);
        env.run();
        assert_eq!(*log.borrow(), vec![3]);
    }

    #[test]
    fn test_failure_reaches_subscribers() {
        let env = Environment::new();
        let event = env.event();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = Rc::clone(&log);
            event.subscribe(move |outcome| {
                log.borrow_mut()
                    .push(outcome.unwrap_err().message().to_string());
            });
        }
        event.fail(Fault::new("broken")).unwrap();
        env.run();
        assert_eq!(*log.borrow(), vec![String::from("broken")]);
        assert!(event.is_failed());
        assert!(event.value().is_none());
    }

    #[test]
    fn test_cancelled_event_is_inert() {
        let env = Environment::new();
        let event = env.event();
        let log = Rc::new(RefCell::new(Vec::new()));
        capture(&event, &log);
        let hook_ran = Rc::new(RefCell::new(false));
        {
            let hook_ran = Rc::clone(&hook_ran);
            event.on_cancel(move || *hook_ran.borrow_mut() = true);
        }
        event.cancel();
        assert!(event.is_cancelled());
        assert!(*hook_ran.borrow());
        // Resolution after cancellation is a silent no-op.
        event.succeed(Value::new(1)).unwrap();
        capture(&event, &log);
        env.run();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_cancel_after_resolution_has_no_effect() {
        let env = Environment::new();
        let event = env.event();
        event.succeed(Value::new(5)).unwrap();
        event.cancel();
        assert!(event.is_succeeded());
        assert_eq!(event.value().unwrap().get::<i32>(), Some(5));
    }
}
