//! Sequences with different result types under one driver.
//!
//! ```sh
//! cargo run --example mixed_results
//! ```

use std::time::Instant;

use seqtree::prelude::*;
use tracing_subscriber::EnvFilter;

async fn returning_string(seq: Sequence) -> Result<String> {
    let t0 = Instant::now();
    Ok(format!("{} ended, took {:?}", seq.name(), t0.elapsed()))
}

async fn returning_int(seq: Sequence) -> Result<i32> {
    let t0 = Instant::now();
    let held = seq
        .wait_timeout(
            move || {
                println!("returning_int: {:?}", t0.elapsed());
                t0.elapsed() > Duration::from_secs(1)
            },
            Duration::from_millis(100),
            Duration::from_secs(2),
        )
        .await;
    Ok(if held { 3_141_592 } else { -1 })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let driver = Driver::new();
    println!("creating two sequences returning a string and an int");
    let text = driver.spawn("returning_string", returning_string);
    let number = driver.spawn("returning_int", returning_int);

    driver.run_until_done()?;
    println!("returning_string: {}", text.read()?);
    println!("returning_int: {}", number.read()?);
    Ok(())
}
