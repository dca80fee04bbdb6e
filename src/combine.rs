use std::cell::{Cell, RefCell};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::environment::Environment;
use crate::error::{Error, Fault};
use crate::event::{Event, EventFuture};
use crate::value::Value;

fn collect_children<K, I>(children: I) -> Result<Vec<(String, Event)>, Error>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Event)>,
{
    let children: Vec<(String, Event)> = children
        .into_iter()
        .map(|(key, event)| (key.into(), event))
        .collect();
    if children.is_empty() {
        return Err(Error::EmptyCombinator);
    }
    Ok(children)
}

/// Joins a named collection of events: succeeds with the full
/// `(key, value)` mapping once every child has succeeded, and fails with the
/// first child failure, in child-resolution order. Children that resolve
/// after the failure are left alone; their results are discarded.
///
/// The mapping preserves the declaration order of the children, so iteration
/// over the result is deterministic.
pub struct AllOf {
    event: Event,
}

impl AllOf {
    /// Builds the join over `children`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyCombinator`] if `children` is empty.
    pub fn new<K, I>(env: &Environment, children: I) -> Result<Self, Error>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Event)>,
    {
        let children = collect_children(children)?;
        let parent = env.event();
        let keys: Rc<Vec<String>> = Rc::new(children.iter().map(|(key, _)| key.clone()).collect());
        let results: Rc<RefCell<Vec<Option<Value>>>> =
            Rc::new(RefCell::new(vec![None; children.len()]));
        let remaining = Rc::new(Cell::new(children.len()));
        for (index, (_key, child)) in children.iter().enumerate() {
            let parent = parent.clone();
            let keys = Rc::clone(&keys);
            let results = Rc::clone(&results);
            let remaining = Rc::clone(&remaining);
            child.subscribe(move |outcome| {
                if !parent.is_pending() {
                    return;
                }
                match outcome {
                    Err(fault) => {
                        parent.fail(fault).expect("parent checked pending");
                    }
                    Ok(value) => {
                        results.borrow_mut()[index] = Some(value);
                        remaining.set(remaining.get() - 1);
                        if remaining.get() == 0 {
                            let mapping: Vec<(String, Value)> = keys
                                .iter()
                                .cloned()
                                .zip(
                                    results
                                        .borrow_mut()
                                        .iter_mut()
                                        .map(|slot| slot.take().expect("all children resolved")),
                                )
                                .collect();
                            parent
                                .succeed(Value::new(mapping))
                                .expect("parent checked pending");
                        }
                    }
                }
            });
        }
        parent.on_cancel(move || {
            for (_key, child) in &children {
                child.cancel();
            }
        });
        Ok(Self { event: parent })
    }

    /// The combined event, for nesting inside another combinator.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consumes the combinator, returning the combined event.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }
}

impl IntoFuture for AllOf {
    type Output = Result<Vec<(String, Value)>, Fault>;
    type IntoFuture = AllOfFuture;

    fn into_future(self) -> AllOfFuture {
        AllOfFuture {
            inner: self.event.into_future(),
        }
    }
}

/// Future adapter returned by awaiting an [`AllOf`].
pub struct AllOfFuture {
    inner: EventFuture,
}

impl Future for AllOfFuture {
    type Output = Result<Vec<(String, Value)>, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().inner).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value
                .get::<Vec<(String, Value)>>()
                .expect("join resolves with its mapping"))),
            Poll::Ready(Err(fault)) => Poll::Ready(Err(fault)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Races a named collection of events: resolves with the `(key, value)` pair
/// of the first child to resolve, then cancels every loser.
///
/// Cancellation is the kernel's only interruption mechanism: a losing
/// timeout's scheduled entry becomes a no-op, a losing queue getter or
/// resource waiter is scrubbed from its waiter list, and a losing combinator
/// recursively cancels its own children. A loser that had already resolved
/// is left as-is; its result is discarded. A child failure propagates only
/// when that child is the first to resolve.
pub struct FirstOf {
    event: Event,
}

impl FirstOf {
    /// Builds the race over `children`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyCombinator`] if `children` is empty.
    pub fn new<K, I>(env: &Environment, children: I) -> Result<Self, Error>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Event)>,
    {
        let children = Rc::new(collect_children(children)?);
        let parent = env.event();
        for index in 0..children.len() {
            let parent = parent.clone();
            let siblings = Rc::clone(&children);
            let key = children[index].0.clone();
            children[index].1.subscribe(move |outcome| {
                if !parent.is_pending() {
                    return;
                }
                match outcome {
                    Ok(value) => parent.succeed(Value::new((key, value))),
                    Err(fault) => parent.fail(fault),
                }
                .expect("parent checked pending");
                for (loser_index, (_key, loser)) in siblings.iter().enumerate() {
                    if loser_index != index {
                        loser.cancel();
                    }
                }
            });
        }
        parent.on_cancel(move || {
            for (_key, child) in children.iter() {
                child.cancel();
            }
        });
        Ok(Self { event: parent })
    }

    /// The combined event, for nesting inside another combinator.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consumes the combinator, returning the combined event.
    #[must_use]
    pub fn into_event(self) -> Event {
        self.event
    }
}

impl IntoFuture for FirstOf {
    type Output = Result<(String, Value), Fault>;
    type IntoFuture = FirstOfFuture;

    fn into_future(self) -> FirstOfFuture {
        FirstOfFuture {
            inner: self.event.into_future(),
        }
    }
}

/// Future adapter returned by awaiting a [`FirstOf`].
pub struct FirstOfFuture {
    inner: EventFuture,
}

impl Future for FirstOfFuture {
    type Output = Result<(String, Value), Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().inner).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value
                .get::<(String, Value)>()
                .expect("race resolves with its winning pair"))),
            Poll::Ready(Err(fault)) => Poll::Ready(Err(fault)),
            Poll::Pending => Poll::Pending,
        }
    }
}
