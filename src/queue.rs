use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;

use crate::environment::Environment;
use crate::event::Event;
use crate::value::Value;
use crate::waiters::WaiterList;

/// Unbounded FIFO channel with blocking getters.
///
/// `put` always completes immediately; `get` returns an already-succeeded
/// event when an item is available and a pending one otherwise. At most one
/// of the item list and the getter list is nonempty at any time. Both sides
/// are strictly FIFO: the oldest getter is served first, and a getter that
/// loses a [`FirstOf`](crate::FirstOf) race is removed from the waiter list
/// so a later `put` cannot deliver to it.
pub struct Queue<T: 'static> {
    env: Environment,
    items: Rc<RefCell<VecDeque<T>>>,
    getters: WaiterList,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            items: Rc::clone(&self.items),
            getters: self.getters.clone(),
        }
    }
}

impl<T: 'static> Queue<T> {
    /// Constructs an empty queue.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        Self {
            env: env.clone(),
            items: Rc::new(RefCell::new(VecDeque::new())),
            getters: WaiterList::new(),
        }
    }

    /// Appends `item`, or hands it to the oldest waiting getter.
    ///
    /// The returned event is already succeeded (the queue is unbounded); a
    /// waiting getter is resolved at the current time, preserving FIFO order
    /// among waiters.
    pub fn put(&self, item: T) -> Event {
        match self.getters.pop() {
            Some(getter) => getter
                .succeed(Value::new(item))
                .expect("pending getter resolved twice"),
            None => self.items.borrow_mut().push_back(item),
        }
        Event::resolved(&self.env, Ok(Value::none()))
    }

    /// Takes the oldest item.
    ///
    /// Returns an already-succeeded event carrying the item if one is
    /// available; otherwise a pending event appended to the waiter list.
    pub fn get(&self) -> Event {
        let item = self.items.borrow_mut().pop_front();
        match item {
            Some(item) => Event::resolved(&self.env, Ok(Value::new(item))),
            None => self.getters.enlist(&self.env),
        }
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Returns `true` if no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Number of pending getters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.getters.len()
    }
}

type Comparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

struct Heap<T> {
    entries: BinaryHeap<HeapEntry<T>>,
    next_serial: u64,
    comparator: Comparator<T>,
}

struct HeapEntry<T> {
    item: T,
    serial: u64,
    comparator: Comparator<T>,
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest item; insertion serial
        // breaks ties, serving equal items in insertion order.
        match (self.comparator)(&other.item, &self.item) {
            Ordering::Equal => other.serial.cmp(&self.serial),
            ordering => ordering,
        }
    }
}

/// Channel ordered by an item-level comparison: `get` returns the smallest
/// stored item. Getters queue in FIFO like in [`Queue`]; equal items are
/// served in insertion order.
pub struct PriorityQueue<T: 'static> {
    env: Environment,
    heap: Rc<RefCell<Heap<T>>>,
    getters: WaiterList,
}

impl<T> Clone for PriorityQueue<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            heap: Rc::clone(&self.heap),
            getters: self.getters.clone(),
        }
    }
}

impl<T: Ord + 'static> PriorityQueue<T> {
    /// Constructs an empty queue ordered by `T`'s own ordering.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        Self::with_comparator(env, T::cmp)
    }
}

impl<T: 'static> PriorityQueue<T> {
    /// Constructs an empty queue ordered by `comparator`, which must be a
    /// total order on the item type.
    pub fn with_comparator<F>(env: &Environment, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + 'static,
    {
        Self {
            env: env.clone(),
            heap: Rc::new(RefCell::new(Heap {
                entries: BinaryHeap::new(),
                next_serial: 0,
                comparator: Rc::new(comparator),
            })),
            getters: WaiterList::new(),
        }
    }

    /// Stores `item`, or hands it to the oldest waiting getter.
    ///
    /// Getters wait only while the heap is empty, so a directly delivered
    /// item is trivially the current minimum.
    pub fn put(&self, item: T) -> Event {
        match self.getters.pop() {
            Some(getter) => {
                debug_assert!(self.heap.borrow().entries.is_empty());
                getter
                    .succeed(Value::new(item))
                    .expect("pending getter resolved twice");
            }
            None => {
                let mut heap = self.heap.borrow_mut();
                let serial = heap.next_serial;
                heap.next_serial += 1;
                let comparator = Rc::clone(&heap.comparator);
                heap.entries.push(HeapEntry {
                    item,
                    serial,
                    comparator,
                });
            }
        }
        Event::resolved(&self.env, Ok(Value::none()))
    }

    /// Takes the smallest stored item, or joins the FIFO waiter list.
    pub fn get(&self) -> Event {
        let entry = self.heap.borrow_mut().entries.pop();
        match entry {
            Some(entry) => Event::resolved(&self.env, Ok(Value::new(entry.item))),
            None => self.getters.enlist(&self.env),
        }
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.borrow().entries.len()
    }

    /// Returns `true` if no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.borrow().entries.is_empty()
    }

    /// Number of pending getters.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.getters.len()
    }
}
