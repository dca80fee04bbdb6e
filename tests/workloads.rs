//! Tutorial-shaped workloads: a topic broker with racing subscribers, a
//! contended lock pool, and barrier-synchronized phases. These drive the
//! kernel the way its client chapters do.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asim::{Barrier, Environment, FirstOf, Queue, Resource, Value};

#[derive(Debug, Clone, PartialEq)]
struct Message {
    content: &'static str,
    published_at: f64,
}

#[test]
fn subscriber_races_topic_queues() {
    let env = Environment::new();
    let news: Queue<Message> = Queue::new(&env);
    let sports: Queue<Message> = Queue::new(&env);
    let received = Rc::new(RefCell::new(Vec::new()));

    // Publisher alternates between topics, one message per second.
    env.spawn({
        let env = env.clone();
        let news = news.clone();
        let sports = sports.clone();
        async move {
            let schedule = [
                ("news", "election"),
                ("sports", "final score"),
                ("news", "weather"),
                ("sports", "transfer"),
            ];
            for (topic, content) in schedule {
                env.timeout(1.0)?.await?;
                let message = Message {
                    content,
                    published_at: env.now(),
                };
                if topic == "news" {
                    news.put(message);
                } else {
                    sports.put(message);
                }
            }
            Ok(Value::none())
        }
    });

    // Subscriber waits on whichever topic delivers first, like the broker
    // chapters do with a race over per-topic get operations.
    let subscriber = env.spawn({
        let env = env.clone();
        let news = news.clone();
        let sports = sports.clone();
        let received = Rc::clone(&received);
        async move {
            for _ in 0..4 {
                let race = FirstOf::new(
                    &env,
                    vec![("news", news.get()), ("sports", sports.get())],
                )?;
                let (topic, value) = race.await?;
                let message = value.get::<Message>().expect("message payload");
                let latency = env.now() - message.published_at;
                received.borrow_mut().push((env.now(), topic, message.content, latency));
            }
            Ok(Value::none())
        }
    });

    env.run();
    assert!(subscriber.completion().is_succeeded());
    assert_eq!(
        *received.borrow(),
        vec![
            (1.0, String::from("news"), "election", 0.0),
            (2.0, String::from("sports"), "final score", 0.0),
            (3.0, String::from("news"), "weather", 0.0),
            (4.0, String::from("sports"), "transfer", 0.0),
        ]
    );
    // Every losing getter was cancelled and scrubbed from its waiter list.
    assert_eq!(news.waiter_count(), 0);
    assert_eq!(sports.waiter_count(), 0);
}

#[test]
fn lock_pool_guarantees_mutual_exclusion() {
    let env = Environment::new();
    let lock = Resource::new(&env, 1);
    let holders = Rc::new(Cell::new(0_u32));
    let completed = Rc::new(Cell::new(0_u32));

    for client in 0..3_u32 {
        let env_handle = env.clone();
        let lock = lock.clone();
        let holders = Rc::clone(&holders);
        let completed = Rc::clone(&completed);
        env.spawn(async move {
            // Stagger the clients so they contend mid-hold.
            env_handle.timeout(f64::from(client) * 0.5)?.await?;
            lock.acquire().await?;
            holders.set(holders.get() + 1);
            assert_eq!(holders.get(), 1, "lock held by more than one client");
            env_handle.timeout(2.0)?.await?;
            holders.set(holders.get() - 1);
            lock.release()?;
            completed.set(completed.get() + 1);
            Ok(Value::none())
        });
    }

    env.run();
    assert_eq!(completed.get(), 3);
    assert_eq!(lock.in_use(), 0);
    assert_eq!(lock.waiter_count(), 0);
    // Three serialized two-second holds, first acquired at t=0.
    assert_eq!(env.now(), 6.0);
}

#[test]
fn barrier_synchronizes_uneven_workers() {
    let env = Environment::new();
    let barrier = Barrier::new(&env);
    let arrivals: Queue<u32> = Queue::new(&env);
    let resumed = Rc::new(RefCell::new(Vec::new()));

    for (worker, work) in [(0_u32, 1.0), (1, 4.0), (2, 2.5)] {
        let env_handle = env.clone();
        let barrier = barrier.clone();
        let arrivals = arrivals.clone();
        let resumed = Rc::clone(&resumed);
        env.spawn(async move {
            env_handle.timeout(work)?.await?;
            let gate = barrier.wait();
            arrivals.put(worker);
            gate.await?;
            resumed.borrow_mut().push((worker, env_handle.now()));
            Ok(Value::none())
        });
    }

    // The coordinator owns the trigger: it releases the barrier once every
    // worker has checked in.
    env.spawn({
        let arrivals = arrivals.clone();
        let barrier = barrier.clone();
        async move {
            for _ in 0..3 {
                arrivals.get().await?;
            }
            barrier.release();
            Ok(Value::none())
        }
    });

    env.run();
    // Everyone resumes at the slowest worker's finish time, in arrival order.
    assert_eq!(*resumed.borrow(), vec![(0, 4.0), (2, 4.0), (1, 4.0)]);
    assert_eq!(barrier.waiter_count(), 0);
}
