use crate::{
    AdmissionGate, BoundedPool, Error, Fault, Interrupt, PoolConfig, RejectReason, Task,
    ThreadPool, WorkerPool,
};
use core::{num::NonZeroUsize, time::Duration};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;

const WAIT: Duration = Duration::from_secs(5);

fn budget(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn blocker(started: &Sender<()>, release: &Receiver<()>) -> Task {
    let started = started.clone();
    let release = release.clone();
    Task::new(move || {
        started.send(()).unwrap();
        let _ = release.recv();
    })
}

fn single_thread(capacity: usize) -> ThreadPool {
    ThreadPool::builder()
        .core_threads(1)
        .max_threads(1)
        .queue_capacity(capacity)
        .build()
        .unwrap()
}

#[test]
fn never_more_than_budget_in_flight() {
    let pool = ThreadPool::new(PoolConfig {
        queue_capacity: Some(8),
        ..PoolConfig::fixed(4)
    })
    .unwrap();
    let bounded = BoundedPool::new(pool, budget(2));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        bounded
            .execute(Task::new(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                running.fetch_sub(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert!(bounded.gate().outstanding() <= 2);
    }

    bounded.shutdown();
    assert!(bounded.await_termination(WAIT));
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(bounded.gate().outstanding(), 0);
}

#[test]
fn rejected_submission_returns_its_permit() {
    let bounded = BoundedPool::new(single_thread(1), budget(4));
    let (started_tx, started_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();

    bounded.execute(blocker(&started_tx, &release_rx)).unwrap();
    started_rx.recv_timeout(WAIT).unwrap();
    bounded.execute(Task::new(|| {})).unwrap();
    assert_eq!(bounded.gate().outstanding(), 2);

    let err = bounded.execute(Task::new(|| {})).unwrap_err();
    assert_eq!(err, Error::Rejected(RejectReason::QueueFull));
    assert_eq!(bounded.gate().outstanding(), 2);

    drop(release_tx);
    bounded.shutdown();
    assert!(bounded.await_termination(WAIT));
    assert_eq!(bounded.gate().outstanding(), 0);
}

#[test]
fn shut_down_pool_rejects_without_waiting() {
    let bounded = BoundedPool::new(single_thread(1), budget(1));
    let _held = bounded.gate().acquire();

    bounded.shutdown();
    assert_eq!(
        bounded.execute(Task::new(|| {})).unwrap_err(),
        Error::Rejected(RejectReason::Shutdown)
    );
}

#[test]
fn panicking_task_returns_its_permit() {
    let pool = ThreadPool::builder()
        .fault_handler(|_: &str, _: &Fault| {})
        .build()
        .unwrap();
    let bounded = BoundedPool::new(pool, budget(1));

    bounded.execute(Task::new(|| panic!("lost"))).unwrap();
    // Would block forever if the panic leaked the only permit.
    let value = bounded.submit(|| 9).unwrap().join().unwrap();
    assert_eq!(value, 9);

    bounded.shutdown();
    assert!(bounded.await_termination(WAIT));
    assert_eq!(bounded.gate().outstanding(), 0);
}

#[test]
fn drained_tasks_hold_permits_until_dropped() {
    let bounded = BoundedPool::new(single_thread(4), budget(4));
    let (started_tx, started_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();

    bounded.execute(blocker(&started_tx, &release_rx)).unwrap();
    started_rx.recv_timeout(WAIT).unwrap();
    bounded.execute(Task::new(|| {})).unwrap();

    let drained = bounded.shutdown_now();
    assert_eq!(drained.len(), 1);

    drop(release_tx);
    assert!(bounded.await_termination(WAIT));
    assert_eq!(bounded.gate().outstanding(), 1);

    drop(drained);
    assert_eq!(bounded.gate().outstanding(), 0);
}

#[test]
fn execute_timeout_gives_up_when_budget_is_spent() {
    let bounded = BoundedPool::new(single_thread(4), budget(1));
    let held = bounded.gate().acquire();

    let err = bounded
        .execute_timeout(Task::new(|| {}), Duration::from_millis(20))
        .unwrap_err();
    assert_eq!(err, Error::Rejected(RejectReason::QueueFull));

    held.release();
    bounded
        .execute_timeout(Task::new(|| {}), Duration::from_millis(20))
        .unwrap();
}

#[test]
fn interrupt_wakes_waiter_and_is_reasserted() {
    let gate = AdmissionGate::new(budget(1));
    let interrupt = Interrupt::new();
    let held = gate.acquire();

    let waiter = {
        let gate = gate.clone();
        let interrupt = interrupt.clone();
        thread::spawn(move || {
            let _permit = gate.acquire_interruptible(&interrupt);
            interrupt.is_raised()
        })
    };

    thread::sleep(Duration::from_millis(20));
    interrupt.raise();
    thread::sleep(Duration::from_millis(20));
    // The wait survives the interrupt.
    assert!(!waiter.is_finished());

    drop(held);
    assert!(waiter.join().unwrap());
    assert_eq!(gate.outstanding(), 0);
}

#[test]
fn uninterrupted_wait_leaves_flag_clear() {
    let gate = AdmissionGate::new(budget(1));
    let interrupt = Interrupt::new();
    let permit = gate.acquire_interruptible(&interrupt);
    assert!(!interrupt.is_raised());
    drop(permit);
    assert_eq!(gate.available(), 1);
}

#[test]
fn acquire_timeout_waits_for_release() {
    let gate = AdmissionGate::new(budget(1));
    let held = gate.acquire();
    assert!(gate.acquire_timeout(Duration::from_millis(10)).is_none());

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        drop(held);
    });
    assert!(gate.acquire_timeout(WAIT).is_some());
    releaser.join().unwrap();
}

#[test]
fn permits_balance_under_contention() {
    let gate = AdmissionGate::new(budget(3));
    let holders = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..500 {
                    let permit = gate.acquire();
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    assert!(now <= 3);
                    holders.fetch_sub(1, Ordering::SeqCst);
                    drop(permit);
                }
            });
        }
    });

    assert_eq!(gate.available(), 3);
    assert_eq!(gate.outstanding(), 0);
}

#[test]
fn zero_budget_is_invalid() {
    assert!(matches!(
        AdmissionGate::with_budget(0),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(BoundedPool::build(ThreadPool::builder(), 0).is_err());
}
