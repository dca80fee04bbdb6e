use std::cell::Cell;
use std::rc::Rc;

use crate::environment::Environment;
use crate::error::Error;
use crate::event::Event;
use crate::value::Value;
use crate::waiters::WaiterList;

/// Counting semaphore with FIFO waiters.
///
/// `acquire` succeeds immediately while capacity is available and otherwise
/// joins the waiter list; `release` hands the freed slot to the oldest
/// waiter. Whenever `in_use` is below capacity the waiter list is empty.
///
/// # Examples
///
/// ```
/// # use asim::{Environment, Resource};
/// let env = Environment::new();
/// let resource = Resource::new(&env, 1);
/// let held = resource.acquire();
/// assert!(held.is_succeeded());
/// let waiting = resource.acquire();
/// assert!(waiting.is_pending());
/// resource.release().unwrap();
/// assert!(waiting.is_succeeded());
/// assert_eq!(resource.in_use(), 1);
/// ```
#[derive(Clone)]
pub struct Resource {
    env: Environment,
    state: Rc<ResourceState>,
    waiters: WaiterList,
}

struct ResourceState {
    capacity: usize,
    in_use: Cell<usize>,
}

impl Resource {
    /// Constructs a resource with the given capacity.
    #[must_use]
    pub fn new(env: &Environment, capacity: usize) -> Self {
        Self {
            env: env.clone(),
            state: Rc::new(ResourceState {
                capacity,
                in_use: Cell::new(0),
            }),
            waiters: WaiterList::new(),
        }
    }

    /// Claims one unit of capacity.
    ///
    /// Returns an already-succeeded event if capacity is available, or a
    /// pending event that resolves once a holder releases.
    pub fn acquire(&self) -> Event {
        let state = &self.state;
        if state.in_use.get() < state.capacity {
            state.in_use.set(state.in_use.get() + 1);
            Event::resolved(&self.env, Ok(Value::none()))
        } else {
            self.waiters.enlist(&self.env)
        }
    }

    /// Returns one unit of capacity, handing it to the oldest waiter if any.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnbalancedRelease`] if nothing is currently
    /// acquired.
    pub fn release(&self) -> Result<(), Error> {
        let state = &self.state;
        if state.in_use.get() == 0 {
            return Err(Error::UnbalancedRelease);
        }
        state.in_use.set(state.in_use.get() - 1);
        if let Some(waiter) = self.waiters.pop() {
            state.in_use.set(state.in_use.get() + 1);
            waiter
                .succeed(Value::none())
                .expect("pending waiter resolved twice");
        }
        Ok(())
    }

    /// Units of capacity currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.state.in_use.get()
    }

    /// Total capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Number of pending acquisitions.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}
