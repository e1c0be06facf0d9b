//! A single sequence stepping through every suspension primitive on the
//! real clock.
//!
//! ```sh
//! RUST_LOG=seqtree=trace cargo run --example basic
//! ```

use std::time::{Duration, Instant};

use seqtree::prelude::*;
use tracing_subscriber::EnvFilter;

async fn steps(seq: Sequence) -> anyhow::Result<String> {
    let t0 = Instant::now();
    println!("step1");

    println!("waiting up to 1s for a condition that needs 3s: must time out");
    let started = Instant::now();
    let held = seq
        .wait_timeout(
            move || started.elapsed() > Duration::from_secs(3),
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
        .await;
    println!("waiting result: {}", if held { "OK" } else { "Timeout" });

    println!("waiting up to 2s for a condition that needs 1s: must succeed");
    let started = Instant::now();
    let held = seq
        .wait_timeout(
            move || started.elapsed() > Duration::from_secs(1),
            Duration::from_millis(100),
            Duration::from_secs(2),
        )
        .await;
    println!("waiting result: {}", if held { "OK" } else { "Timeout" });

    seq.wait_for(Duration::from_millis(40)).await;
    println!("step2: {:>8?}", t0.elapsed());

    seq.wait_until(Deadline::after(seq.now(), Duration::from_millis(1))).await;
    println!("step3: {:>8?}", t0.elapsed());

    Ok(format!("{} ended, took {:?}", seq.name(), t0.elapsed()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let driver = Driver::new();
    let result = driver.spawn("steps", steps);
    let ticks = driver.run_until_done()?;

    println!("{}", result.read()?);
    println!("{ticks} dispatches");
    Ok(())
}
