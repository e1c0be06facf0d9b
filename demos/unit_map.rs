//! Starting sequences by name through a tree of units.
//!
//! `c1/task1` starts `c1/task2`, which starts `c2/task_a`, which starts
//! `c2/task_b`; `c1/task2` then waits for a counter driven by another
//! thread.
//!
//! ```sh
//! cargo run --example unit_map
//! ```

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

use seqtree::prelude::*;
use tracing_subscriber::EnvFilter;

type App = SequenceMap<String, String>;

static APP: OnceLock<App> = OnceLock::new();

fn app() -> Result<&'static App> {
    APP.get().ok_or_else(|| Error::UnknownUnit("top".into()))
}

async fn task1(_seq: Sequence, _param: String) -> Result<String> {
    let t0 = Instant::now();
    println!("c1::task1: begin");

    let child = app()?.create_child_sequence("c1", "task2", "greeting from c1::task1".into())?;
    app()?.wait_for_child()?.await;
    println!("c1::task1: child done: {}", child.await?);

    Ok(format!("c1::task1: end {:?}", t0.elapsed()))
}

async fn task2(seq: Sequence, param: String) -> Result<String> {
    let t0 = Instant::now();
    println!("c1::task2: begin, param: {param}");

    let child = app()?.create_child_sequence("c2", "task_a", "greeting from c1::task2".into())?;
    seq.wait_for_child().await;
    println!("c1::task2: child done: {}", child.await?);

    println!("c1::task2: waiting for the other thread to count down");
    let remaining = Arc::new(AtomicI32::new(10));
    let counter = Arc::clone(&remaining);
    let count_down = thread::spawn(move || {
        while counter.load(Ordering::SeqCst) > 0 {
            println!("in other thread: count down {}", counter.fetch_sub(1, Ordering::SeqCst));
            thread::sleep(Duration::from_millis(100));
        }
    });
    let watched = Arc::clone(&remaining);
    seq.wait(move || watched.load(Ordering::SeqCst) <= 0, Duration::from_millis(1))
        .await;
    let _ = count_down.join();

    let summary = format!("c1::task2: end {:?}", t0.elapsed());
    println!("{summary}");
    Ok(summary)
}

async fn task_a(seq: Sequence, param: String) -> Result<String> {
    let t0 = Instant::now();
    println!("c2::task_a: begin, param: {param}");

    let child = app()?.create_child_sequence("c2", "task_b", "greeting from c2::task_a".into())?;
    seq.wait_for_child().await;
    println!("c2::task_a: child done: {}", child.await?);

    Ok(format!("c2::task_a: end {:?}", t0.elapsed()))
}

async fn task_b(seq: Sequence, param: String) -> Result<String> {
    let t0 = Instant::now();
    println!("c2::task_b: begin, param: {param}");
    seq.wait_for(Duration::from_millis(100)).await;
    Ok(format!("c2::task_b: end {:?}", t0.elapsed()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("start");
    let driver = Driver::new();

    let mut map = App::new("top", driver.root());
    map.add_unit("c1").bind("task1", task1).bind("task2", task2);
    map.add_unit("c2").bind("task_a", task_a).bind("task_b", task_b);
    let top = APP.get_or_init(|| map);

    let result = top.create_root_sequence("c1", "task1", String::new())?;
    driver.run_until_done()?;

    println!("{}", result.read()?);
    println!("done");
    Ok(())
}
