use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use ordered_float::OrderedFloat;
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::error::Error;
use crate::event::{Event, EventId};
use crate::process::{ProcessCore, ProcessId};
use crate::value::Value;

/// Virtual time, in simulated seconds. Nonnegative and monotonic within one
/// environment; it only advances between callback dispatches, never while one
/// is running.
pub type Time = f64;

/// Entry in the scheduled-callback heap: a callback to run at `time`,
/// tie-broken by the strictly increasing insertion `serial` so that entries
/// scheduled at the same simulated time dispatch in registration order.
struct ScheduledEntry {
    time: OrderedFloat<Time>,
    serial: u64,
    cancelled: Rc<Cell<bool>>,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.serial == other.serial
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest (time, serial)
        // pair pops first.
        match other.time.cmp(&self.time) {
            Ordering::Equal => other.serial.cmp(&self.serial),
            ordering => ordering,
        }
    }
}

/// Handle to a scheduled entry, used to cancel it before it fires.
///
/// Cancelling marks the callback as a no-op; the entry stays in the heap and
/// is dropped when it would have been dispatched, without advancing the clock.
#[derive(Clone)]
pub struct ScheduleHandle {
    cancelled: Rc<Cell<bool>>,
}

impl ScheduleHandle {
    /// Marks the scheduled callback as a no-op.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    /// Returns `true` if the entry has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

struct EnvironmentCore {
    clock: Cell<Time>,
    entries: RefCell<BinaryHeap<ScheduledEntry>>,
    next_serial: Cell<u64>,
    next_event_id: Cell<u64>,
    next_process_id: Cell<u64>,
    rng: RefCell<ChaChaRng>,
    current: RefCell<Option<Rc<ProcessCore>>>,
}

/// The simulation environment: virtual clock, scheduled-callback heap, and
/// the driver loop.
///
/// An `Environment` is a cheap handle; clones drive the same simulation.
/// Independent environments never interfere, so parallel test runners can
/// each own one.
///
/// # Examples
///
/// ```
/// # use asim::Environment;
/// let env = Environment::new();
/// let fired = env.timeout(2.5).unwrap();
/// env.run();
/// assert!(fired.is_succeeded());
/// assert_eq!(env.now(), 2.5);
/// ```
#[derive(Clone)]
pub struct Environment {
    core: Rc<EnvironmentCore>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Constructs an environment with the default RNG seed of 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Constructs an environment whose random number generator is seeded with
    /// `seed`. Two environments with the same seed and the same construction
    /// script produce identical event traces.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            core: Rc::new(EnvironmentCore {
                clock: Cell::new(0.0),
                entries: RefCell::new(BinaryHeap::new()),
                next_serial: Cell::new(0),
                next_event_id: Cell::new(0),
                next_process_id: Cell::new(0),
                rng: RefCell::new(ChaChaRng::seed_from_u64(seed)),
                current: RefCell::new(None),
            }),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.core.clock.get()
    }

    /// Returns a fresh pending event owned by the caller.
    #[must_use]
    pub fn event(&self) -> Event {
        Event::new(self)
    }

    /// Schedules `callback` to run at `now + delay`.
    ///
    /// Entries scheduled at the same time run in registration order. The
    /// returned handle cancels the entry before it fires.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSchedule`] if `delay` is negative or not
    /// finite.
    pub fn schedule<F>(&self, delay: Time, callback: F) -> Result<ScheduleHandle, Error>
    where
        F: FnOnce() + 'static,
    {
        check_delay(delay)?;
        Ok(self.enqueue(self.now() + delay, callback))
    }

    /// Schedules `event` to be resolved with `value` at `now + delay`.
    ///
    /// If the event is cancelled or otherwise resolved before the entry
    /// fires, the scheduled resolution is dropped silently; this is what
    /// keeps a timeout that lost a race free of side effects.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSchedule`] if `delay` is negative or not
    /// finite.
    pub fn schedule_event(
        &self,
        delay: Time,
        event: &Event,
        value: Value,
    ) -> Result<ScheduleHandle, Error> {
        check_delay(delay)?;
        let event = event.clone();
        Ok(self.enqueue(self.now() + delay, move || {
            event.resolve_scheduled(Ok(value));
        }))
    }

    /// Returns an event that succeeds with an empty payload at `now + delay`.
    ///
    /// A delay of zero is a legal "yield to the current time bucket": the
    /// event resolves after all entries already scheduled at `now`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSchedule`] if `delay` is negative or not
    /// finite.
    pub fn timeout(&self, delay: Time) -> Result<Event, Error> {
        self.timeout_with(delay, Value::none())
    }

    /// Returns an event that succeeds with `value` at `now + delay`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidSchedule`] if `delay` is negative or not
    /// finite.
    pub fn timeout_with(&self, delay: Time, value: Value) -> Result<Event, Error> {
        let event = self.event();
        let handle = self.schedule_event(delay, &event, value)?;
        event.on_cancel(move || handle.cancel());
        Ok(event)
    }

    /// Dispatches the next live scheduled entry, advancing the clock to its
    /// time. Cancelled entries encountered along the way are dropped without
    /// advancing the clock. Returns `false` if the heap is drained.
    pub fn step(&self) -> bool {
        loop {
            let entry = self.core.entries.borrow_mut().pop();
            let Some(entry) = entry else { return false };
            if entry.cancelled.get() {
                continue;
            }
            self.core.clock.set(entry.time.into_inner());
            log::trace!("dispatching entry #{} at {}", entry.serial, self.now());
            (entry.callback)();
            return true;
        }
    }

    /// Runs the loop until no scheduled entries remain. Returns the final
    /// clock value.
    pub fn run(&self) -> Time {
        while self.step() {}
        self.now()
    }

    /// Runs the loop until the next entry would fire later than `until`, then
    /// advances the clock to `until`. Returns the final clock value.
    pub fn run_until(&self, until: Time) -> Time {
        while let Some(time) = self.peek_live() {
            if time > until {
                break;
            }
            self.step();
        }
        if self.now() < until {
            self.core.clock.set(until);
        }
        self.now()
    }

    /// Runs the loop until `event` leaves the pending state (or the heap is
    /// drained). Returns the final clock value.
    pub fn run_until_event(&self, event: &Event) -> Time {
        while event.is_pending() {
            if !self.step() {
                break;
            }
        }
        self.now()
    }

    /// Draws a random value from the environment's seeded generator.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.core.rng.borrow_mut().gen_range(range)
    }

    /// Draws a random boolean that is `true` with probability `p`.
    pub fn gen_bool(&self, p: f64) -> bool {
        self.core.rng.borrow_mut().gen_bool(p)
    }

    /// Time of the earliest live entry, dropping cancelled entries from the
    /// front of the heap.
    fn peek_live(&self) -> Option<Time> {
        let mut entries = self.core.entries.borrow_mut();
        loop {
            match entries.peek() {
                None => return None,
                Some(entry) if entry.cancelled.get() => {}
                Some(entry) => return Some(entry.time.into_inner()),
            }
            entries.pop();
        }
    }

    pub(crate) fn enqueue<F>(&self, time: Time, callback: F) -> ScheduleHandle
    where
        F: FnOnce() + 'static,
    {
        let serial = self.core.next_serial.get();
        self.core.next_serial.set(serial + 1);
        let cancelled = Rc::new(Cell::new(false));
        self.core.entries.borrow_mut().push(ScheduledEntry {
            time: OrderedFloat(time),
            serial,
            cancelled: Rc::clone(&cancelled),
            callback: Box::new(callback),
        });
        ScheduleHandle { cancelled }
    }

    pub(crate) fn next_event_id(&self) -> EventId {
        let id = self.core.next_event_id.get();
        self.core.next_event_id.set(id + 1);
        EventId::from(id)
    }

    pub(crate) fn next_process_id(&self) -> ProcessId {
        let id = self.core.next_process_id.get();
        self.core.next_process_id.set(id + 1);
        ProcessId::from(id)
    }

    pub(crate) fn set_current(&self, process: Option<Rc<ProcessCore>>) -> Option<Rc<ProcessCore>> {
        self.core.current.replace(process)
    }

    pub(crate) fn current_process(&self) -> Option<Rc<ProcessCore>> {
        self.core.current.borrow().clone()
    }
}

fn check_delay(delay: Time) -> Result<(), Error> {
    if delay.is_finite() && delay >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidSchedule(delay))
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn record(
        env: &Environment,
        log: &Rc<RefCell<Vec<&'static str>>>,
        delay: Time,
        tag: &'static str,
    ) {
        let log = Rc::clone(log);
        env.schedule(delay, move || log.borrow_mut().push(tag))
            .unwrap();
    }

    #[test]
    fn test_time_order() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&env, &log, 5.0, "late");
        record(&env, &log, 1.0, "early");
        record(&env, &log, 3.0, "mid");
        assert_eq!(env.run(), 5.0);
        assert_eq!(*log.borrow(), vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_serial_order_at_same_time() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&env, &log, 0.0, "a");
        record(&env, &log, 0.0, "b");
        record(&env, &log, 0.0, "c");
        assert!(env.step());
        assert_eq!(*log.borrow(), vec!["a"]);
        assert!(env.step());
        assert!(env.step());
        assert!(!env.step());
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(env.now(), 0.0);
    }

    #[test]
    fn test_negative_delay() {
        let env = Environment::new();
        assert_eq!(
            env.schedule(-1.0, || {}).map(|_| ()),
            Err(Error::InvalidSchedule(-1.0))
        );
        assert!(matches!(
            env.timeout(f64::NAN).map(|_| ()).unwrap_err(),
            Error::InvalidSchedule(delay) if delay.is_nan()
        ));
    }

    #[test]
    fn test_cancelled_entry_is_noop() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let handle = env
            .schedule(1.0, {
                let log = Rc::clone(&log);
                move || log.borrow_mut().push("cancelled")
            })
            .unwrap();
        record(&env, &log, 2.0, "kept");
        handle.cancel();
        assert!(handle.is_cancelled());
        env.run();
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_cancelled_entry_does_not_advance_clock() {
        let env = Environment::new();
        let handle = env.schedule(4.0, || {}).unwrap();
        handle.cancel();
        env.run();
        assert_eq!(env.now(), 0.0);
    }

    #[test]
    fn test_run_until_advances_clock() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&env, &log, 2.0, "in range");
        record(&env, &log, 8.0, "out of range");
        assert_eq!(env.run_until(5.0), 5.0);
        assert_eq!(*log.borrow(), vec!["in range"]);
        // The out-of-range entry is still pending.
        assert_eq!(env.run(), 8.0);
        assert_eq!(*log.borrow(), vec!["in range", "out of range"]);
    }

    #[test]
    fn test_run_until_event() {
        let env = Environment::new();
        let stop = env.timeout(3.0).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&env, &log, 1.0, "before");
        record(&env, &log, 7.0, "after");
        env.run_until_event(&stop);
        assert_eq!(env.now(), 3.0);
        assert_eq!(*log.borrow(), vec!["before"]);
    }

    #[test]
    fn test_zero_delay_runs_after_existing_entries() {
        let env = Environment::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        record(&env, &log, 0.0, "first");
        {
            let inner_env = env.clone();
            let inner_log = Rc::clone(&log);
            env.schedule(0.0, move || {
                record(&inner_env, &inner_log, 0.0, "nested");
            })
            .unwrap();
        }
        record(&env, &log, 0.0, "third");
        env.run();
        assert_eq!(*log.borrow(), vec!["first", "third", "nested"]);
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let env_a = Environment::with_seed(17);
        let env_b = Environment::with_seed(17);
        let draws_a: Vec<u32> = (0..8).map(|_| env_a.gen_range(0..1000)).collect();
        let draws_b: Vec<u32> = (0..8).map(|_| env_b.gen_range(0..1000)).collect();
        assert_eq!(draws_a, draws_b);
    }
}
