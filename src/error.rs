use std::fmt;

use crate::event::EventId;
use crate::value::Value;

/// Kernel misuse errors, raised synchronously at the offending call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A callback or event resolution was scheduled with a negative or
    /// non-finite delay.
    #[error("invalid schedule delay: {0}")]
    InvalidSchedule(f64),

    /// `succeed` or `fail` was called on an event that has already resolved.
    #[error("event {0} is already resolved")]
    AlreadyResolved(EventId),

    /// A resource was released without a matching successful acquisition.
    #[error("release without a matching acquire")]
    UnbalancedRelease,

    /// A combinator was constructed over an empty collection of events.
    #[error("combinator requires at least one child event")]
    EmptyCombinator,
}

/// A failure carried by a failed [`Event`](crate::Event).
///
/// Faults are how a routine's failure reaches other routines: the failing
/// process resolves its completion event with a `Fault`, and everyone awaiting
/// that event observes the failure at their suspension point. A fault carries
/// a message and, optionally, an erased payload for the receiver to inspect.
#[derive(Debug, Clone)]
pub struct Fault {
    message: String,
    payload: Value,
}

impl Fault {
    /// Constructs a fault with the given message and no payload.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: Value::none(),
        }
    }

    /// Constructs a fault carrying a payload for the receiving side.
    pub fn with_payload(message: impl Into<String>, payload: Value) -> Self {
        Self {
            message: message.into(),
            payload,
        }
    }

    /// The fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The payload attached to this fault, if any.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

impl From<Error> for Fault {
    fn from(error: Error) -> Self {
        Fault::new(error.to_string())
    }
}

/// Resolution outcome of an event: the carried value on success, the fault on
/// failure. Awaiting an event inside a routine yields an `Outcome`, so `?`
/// propagates failures and terminates the process through its completion
/// event.
pub type Outcome = Result<Value, Fault>;
