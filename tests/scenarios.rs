//! End-to-end scheduling scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use seqtree::prelude::*;

fn manual() -> (Driver, MockClock) {
    let clock = MockClock::new();
    (Driver::with_clock(clock.clone(), DriverConfig::default()), clock)
}

/// Root spawns A with a single 100ms step; after the interval and one more
/// dispatch both A and the root are done.
#[test]
fn test_single_timed_child_on_system_clock() {
    let driver = Driver::with_clock(SystemClock::new(), DriverConfig::default());
    let rx = driver.spawn("A", |seq| async move {
        seq.wait_for(Duration::from_millis(100)).await;
        Ok::<_, Error>(())
    });

    let wake = driver.dispatch().unwrap();
    assert!(!driver.is_done());
    let a = driver.root().find_direct_child("A").unwrap().unwrap();

    driver.clock().sleep_until(wake);
    driver.dispatch().unwrap();
    assert!(a.is_done());
    assert!(driver.is_done());
    assert!(rx.read().is_ok());
}

/// B1 and B2 each loop five times with 200ms steps; the parent resumes only
/// once both are done.
#[test]
fn test_parent_joins_both_children() {
    let clock = MockClock::auto_advancing();
    let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
    let finished = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&finished);
    let probe = clock.clone();
    let parent = driver.spawn("parent", move |seq| async move {
        for name in ["B1", "B2"] {
            let log = Arc::clone(&log);
            let probe = probe.clone();
            let _ = seq.create_child(name, move |seq| async move {
                for _ in 0..5 {
                    seq.wait_for(Duration::from_millis(200)).await;
                }
                log.lock().push((name, probe.now()));
                Ok::<_, Error>(())
            });
        }
        seq.wait_for_child().await;
        Ok::<_, Error>(probe.now())
    });

    driver.run_until_done().unwrap();
    assert_eq!(parent.read().unwrap(), Duration::from_millis(1000));
    let finished = finished.lock();
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|(_, at)| *at == Duration::from_millis(1000)));
}

/// The parent resumes on the first dispatch after the last child is reaped,
/// not one tick later.
#[test]
fn test_parent_resumes_without_extra_delay() {
    let (driver, clock) = manual();
    let rx = driver.spawn("parent", |seq| async move {
        let _ = seq.create_child("child", |seq| async move {
            seq.wait_for(Duration::from_millis(50)).await;
            Ok::<_, Error>(())
        });
        seq.wait_for_child().await;
        Ok::<_, Error>("joined")
    });

    driver.dispatch().unwrap();
    clock.advance(Duration::from_millis(50));
    driver.dispatch().unwrap();
    assert!(driver.is_done());
    assert_eq!(rx.read().unwrap(), "joined");
}

/// Children created from several other threads while the owner keeps
/// dispatching are all observed and serviced.
#[test]
fn test_cross_thread_injection_stress() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 250;

    let (driver, _) = manual();
    let _keeper = driver.spawn("keeper", |seq| async move {
        seq.wait_for(Duration::from_secs(3600)).await;
        Ok::<_, Error>(())
    });
    driver.dispatch().unwrap();
    let keeper = driver.root().find_direct_child("keeper").unwrap().unwrap();

    let serviced = Arc::new(AtomicUsize::new(0));
    let injectors_done = Arc::new(AtomicUsize::new(0));
    let injectors: Vec<_> = (0..THREADS)
        .map(|t| {
            // Half the threads inject under the root, half under a deeper node.
            let target = if t % 2 == 0 { driver.root().clone() } else { keeper.clone() };
            let serviced = Arc::clone(&serviced);
            let done = Arc::clone(&injectors_done);
            thread::spawn(move || {
                let receivers: Vec<_> = (0..PER_THREAD)
                    .map(|i| {
                        let serviced = Arc::clone(&serviced);
                        target.create_child(format!("t{t}-{i}"), move |_seq| async move {
                            serviced.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, Error>(t * PER_THREAD + i)
                        })
                    })
                    .collect();
                done.fetch_add(1, Ordering::SeqCst);
                receivers
            })
        })
        .collect();

    while injectors_done.load(Ordering::SeqCst) < THREADS
        || serviced.load(Ordering::SeqCst) < THREADS * PER_THREAD
    {
        driver.dispatch().unwrap();
    }

    let mut values: Vec<_> = injectors
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .map(|rx| rx.read().unwrap())
        .collect();
    values.sort_unstable();
    assert_eq!(values, (0..THREADS * PER_THREAD).collect::<Vec<_>>());

    // Only the keeper is left.
    assert_eq!(driver.root().child_count(), 1);
    assert_eq!(keeper.child_count(), 0);
}

/// Children injected into a node that is finishing at the same moment are
/// either serviced or cancelled, never left pending.
#[test]
fn test_injection_into_finishing_node_resolves() {
    for round in 0..200u32 {
        let (driver, _) = manual();
        let _ = driver.spawn("short", |seq| async move {
            seq.wait_for(Duration::ZERO).await;
            Ok::<_, Error>(())
        });
        let short = driver.root().find_direct_child("short").unwrap().unwrap();

        let injector = thread::spawn(move || {
            short.create_child("late", move |seq| async move {
                seq.wait_for(Duration::ZERO).await;
                Ok::<_, Error>(round)
            })
        });
        while !injector.is_finished() || !driver.is_done() {
            driver.dispatch().unwrap();
        }

        let late = injector.join().unwrap();
        match late.read_timeout(Duration::from_secs(5)) {
            Ok(value) => assert_eq!(value, round),
            Err(err) => assert!(matches!(err, Error::Cancelled(ref name) if name == "late")),
        }
    }
}

/// The cached wake time never runs later than a full scan of the tree.
#[test]
fn test_wake_cache_soundness_over_a_run() {
    let clock = MockClock::new();
    let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
    for (i, step) in [70u64, 130, 45, 300].into_iter().enumerate() {
        let _ = driver.spawn(format!("worker{i}"), move |seq| async move {
            for depth in 0..3u64 {
                let _ = seq.create_child(format!("leaf{depth}"), move |seq| async move {
                    seq.wait_for(Duration::from_millis(step * (depth + 1))).await;
                    Ok::<_, Error>(())
                });
                seq.wait_for(Duration::from_millis(step / 2)).await;
            }
            seq.wait_for_child().await;
            Ok::<_, Error>(())
        });
    }

    let mut ticks = 0;
    while !driver.is_done() {
        let wake = driver.dispatch().unwrap();
        assert!(driver.root().next_wake() <= driver.root().scan_wake());
        assert!(!wake.is_never() || driver.is_done());
        clock.advance_to(wake.as_duration());
        ticks += 1;
        assert!(ticks < 1000);
    }
    assert_eq!(driver.root().recompute_wake(), Deadline::NEVER);
}

/// One tree hosts sequences with different result types.
#[test]
fn test_heterogeneous_results() {
    let driver = Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default());
    let number = driver.spawn("number", |_seq| async { Ok::<_, Error>(7u64) });
    let text = driver.spawn("text", |seq| async move {
        seq.wait_for(Duration::from_millis(10)).await;
        Ok::<_, Error>(String::from("seven"))
    });
    let list = driver.spawn("list", |_seq| async { Ok::<_, Error>(vec![1, 2, 3]) });
    let unit = driver.spawn("unit", |_seq| async { Ok::<_, Error>(()) });

    driver.run_until_done().unwrap();
    assert_eq!(number.read().unwrap(), 7);
    assert_eq!(text.read().unwrap(), "seven");
    assert_eq!(list.read().unwrap(), [1, 2, 3]);
    assert!(unit.read().is_ok());
}

/// Task bodies may use anyhow errors.
#[test]
fn test_anyhow_error_in_body() {
    let driver = Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default());
    let rx = driver.spawn("anyhow", |_seq| async {
        let value: u32 = "not a number".parse()?;
        anyhow::Ok(value)
    });
    let err = driver.run_until_done().unwrap_err();
    assert!(matches!(err, Error::Failed { ref name, .. } if name == "anyhow"));
    assert!(matches!(rx.read(), Err(Error::Failed { .. })));
}

/// A failure deep in the tree tears down only the failing subtree.
#[test]
fn test_nested_failure_recovery() {
    let clock = MockClock::auto_advancing();
    let driver = Driver::with_clock(clock, DriverConfig::default());
    let outer = driver.spawn("outer", |seq| async move {
        let inner = seq.create_child("inner", |seq| async move {
            seq.wait_for(Duration::from_millis(20)).await;
            Err::<(), _>("inner broke")
        });
        seq.wait_for_child().await;
        // The failure reached us through the channel; carry on.
        Ok::<_, Error>(inner.await.is_err())
    });

    assert!(driver.run_until_done().is_err());
    // The outer body was not affected and finishes on the next run.
    driver.run_until_done().unwrap();
    assert!(outer.read().unwrap());
}

/// A blocking reader on another thread sees the result once the owner
/// thread dispatches it.
#[test]
fn test_blocking_read_from_other_thread() {
    let driver = Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default());
    let rx = driver.spawn("answer", |seq| async move {
        seq.wait_for(Duration::from_secs(1)).await;
        Ok::<_, Error>(42)
    });
    let reader = thread::spawn(move || rx.read_timeout(Duration::from_secs(10)));
    driver.run_until_done().unwrap();
    assert_eq!(reader.join().unwrap().unwrap(), 42);
}

/// Reading a result twice reports the second read.
#[test]
fn test_double_read() {
    let driver = Driver::with_clock(MockClock::auto_advancing(), DriverConfig::default());
    let rx = driver.spawn("once", |_seq| async { Ok::<_, Error>(1) });
    driver.run_until_done().unwrap();
    assert_eq!(rx.read().unwrap(), 1);
    assert!(matches!(rx.read(), Err(Error::AlreadyRead)));
}

/// Two independent trees on one thread do not interfere.
#[test]
fn test_independent_trees_on_one_thread() {
    let (first, first_clock) = manual();
    let (second, _) = manual();
    let a = first.spawn("a", |seq| async move {
        seq.wait_for(Duration::from_millis(10)).await;
        Ok::<_, Error>("first")
    });
    let b = second.spawn("b", |_seq| async { Ok::<_, Error>("second") });

    first.dispatch().unwrap();
    second.dispatch().unwrap();
    assert!(!first.is_done());
    assert!(second.is_done());

    first_clock.advance(Duration::from_millis(10));
    first.dispatch().unwrap();
    assert_eq!(a.read().unwrap(), "first");
    assert_eq!(b.read().unwrap(), "second");
}

/// Wait with timeout completes with false between timeout and
/// timeout + interval.
#[test]
fn test_predicate_timeout_window() {
    let clock = MockClock::auto_advancing();
    let driver = Driver::with_clock(clock.clone(), DriverConfig::default());
    let probe = clock.clone();
    let rx = driver.spawn("waiter", move |seq| async move {
        let held = seq
            .wait_timeout(|| false, Duration::from_millis(30), Duration::from_millis(200))
            .await;
        Ok::<_, Error>((held, probe.now()))
    });
    driver.run_until_done().unwrap();
    let (held, at) = rx.read().unwrap();
    assert!(!held);
    assert!(at > Duration::from_millis(200));
    assert!(at <= Duration::from_millis(230));
}
