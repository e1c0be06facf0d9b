//! Worker threads feeding jobs into a tree that a single owner thread
//! dispatches.
//!
//! ```sh
//! RUST_LOG=seqtree=debug cargo run --example injection
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use seqtree::prelude::*;
use tracing_subscriber::EnvFilter;

const PRODUCERS: usize = 3;
const JOBS: u64 = 4;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let driver = Driver::with_config(DriverConfig::new().max_sleep(Duration::from_millis(50)));

    // The inbox keeps the tree alive until every producer is finished.
    let producers_done = Arc::new(AtomicBool::new(false));
    let closed = Arc::clone(&producers_done);
    let _ = driver.spawn("inbox", move |seq| async move {
        seq.wait(move || closed.load(Ordering::SeqCst), Duration::from_millis(20))
            .await;
        seq.wait_for_child().await;
        Ok::<_, Error>(())
    });
    driver.dispatch()?;
    let inbox = driver
        .root()
        .find_direct_child("inbox")?
        .ok_or(Error::UnknownHandler("inbox".into()))?;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let inbox = inbox.clone();
            thread::spawn(move || {
                (0..JOBS)
                    .map(|j| {
                        thread::sleep(Duration::from_millis(30));
                        inbox.create_child(format!("job-{p}-{j}"), move |seq| async move {
                            seq.wait_for(Duration::from_millis(10 * (j + 1))).await;
                            let worker = thread::current().id();
                            Ok::<_, Error>(format!("job {j} of producer {p} on {worker:?}"))
                        })
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let watcher = {
        let done = Arc::clone(&producers_done);
        thread::spawn(move || {
            let receivers: Vec<_> = producers
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect();
            done.store(true, Ordering::SeqCst);
            receivers
        })
    };

    let ticks = driver.run_until_done()?;
    let receivers = watcher.join().unwrap_or_default();
    for rx in receivers {
        println!("{}", rx.read()?);
    }
    println!("owner thread {:?} finished after {ticks} dispatches", thread::current().id());
    Ok(())
}
