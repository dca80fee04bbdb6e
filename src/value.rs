use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A type-erased event payload.
///
/// Events carry values of arbitrary types; the kernel stores them behind
/// `Rc<dyn Any>` and the receiving side downcasts to the concrete type it
/// expects. A `Value` is cheap to clone, so the same payload can be delivered
/// to many subscribers.
///
/// # Examples
///
/// ```
/// # use asim::Value;
/// let value = Value::new(42_u32);
/// assert_eq!(value.get::<u32>(), Some(42));
/// assert_eq!(value.get::<String>(), None);
/// assert!(Value::none().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Value(Option<Rc<dyn Any>>);

impl Value {
    /// Wraps `value` in an erased payload.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    /// An empty payload, used by events that signal without carrying data.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Returns `true` if this payload carries no data.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Downcasts the payload to a shared reference of type `T`.
    /// Returns `None` if the payload is empty or of a different type.
    #[must_use]
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0
            .as_ref()
            .and_then(|value| Rc::clone(value).downcast::<T>().ok())
    }

    /// Clones the payload out as a value of type `T`.
    /// Returns `None` if the payload is empty or of a different type.
    #[must_use]
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast::<T>().map(|value| (*value).clone())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            f.write_str("Value(..)")
        } else {
            f.write_str("Value(none)")
        }
    }
}
