//! A three-level tree: each parent forks children and joins them with
//! `wait_for_child` before moving on.
//!
//! ```sh
//! cargo run --example tree
//! ```

use std::time::Instant;

use seqtree::prelude::*;
use tracing_subscriber::EnvFilter;

async fn top(seq: Sequence) -> Result<()> {
    let t0 = Instant::now();
    println!("{}: begin, creating child1", seq.name());
    let _ = seq.create_child("child1", child1);

    seq.wait_for_child().await;
    println!("{}: child1 done after {:?}", seq.name(), t0.elapsed());

    seq.wait_for(Duration::from_millis(100)).await;
    println!("{}: end", seq.name());
    Ok(())
}

async fn child1(seq: Sequence) -> Result<()> {
    let t0 = Instant::now();
    println!("{}: begin, creating child1_1 and child1_2", seq.name());
    let _ = seq.create_child("child1_1", worker);
    let _ = seq.create_child("child1_2", worker);

    seq.wait_for_child().await;
    println!("{}: both workers done after {:?}", seq.name(), t0.elapsed());
    Ok(())
}

async fn worker(seq: Sequence) -> Result<()> {
    let t0 = Instant::now();
    println!("{}: begin", seq.name());
    for _ in 0..5 {
        println!("{}: working, then waiting 200ms ({:?})", seq.name(), t0.elapsed());
        seq.wait_for(Duration::from_millis(200)).await;
    }
    println!("{}: end", seq.name());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let driver = Driver::new();
    let done = driver.spawn("top", top);
    driver.run_until_done()?;
    done.read()?;
    println!("tree finished");
    Ok(())
}
