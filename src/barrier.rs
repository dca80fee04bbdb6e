use crate::environment::Environment;
use crate::event::Event;
use crate::value::Value;
use crate::waiters::WaiterList;

/// A rendezvous point: waiters accumulate until an explicit `release`
/// resolves all of them at once, in insertion order. The barrier is empty
/// again afterwards and can be reused.
///
/// There is no automatic release by count; the trigger belongs to the user.
#[derive(Clone)]
pub struct Barrier {
    env: Environment,
    waiters: WaiterList,
}

impl Barrier {
    /// Constructs a barrier with no waiters.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        Self {
            env: env.clone(),
            waiters: WaiterList::new(),
        }
    }

    /// Joins the barrier; the returned event resolves at the next `release`.
    pub fn wait(&self) -> Event {
        self.waiters.enlist(&self.env)
    }

    /// Releases every accumulated waiter, in insertion order.
    pub fn release(&self) {
        for waiter in self.waiters.drain() {
            waiter
                .succeed(Value::none())
                .expect("pending waiter resolved twice");
        }
    }

    /// Number of accumulated waiters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}
