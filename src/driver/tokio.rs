//! Driver loop on a Tokio runtime.
//!
//! The tree is still dispatched from a single thread, so the future returned
//! by [`Driver::run_until_done_async`] must stay on the thread that created
//! the driver: run it on a `current_thread` runtime or inside a `LocalSet`.

use super::Driver;
use crate::error::Result;

impl Driver {
    /// Async form of [`run_until_done`](Driver::run_until_done): idles with
    /// `tokio::time::sleep` instead of blocking the thread.
    ///
    /// The sleep length is computed from the driver's clock, so pair this
    /// with a real clock.
    ///
    /// # Errors
    ///
    /// Same as [`run_until_done`](Driver::run_until_done).
    pub async fn run_until_done_async(&self) -> Result<usize> {
        let mut ticks = 0;
        loop {
            let wake = self.dispatch()?;
            ticks += 1;
            if self.is_done() {
                return Ok(ticks);
            }
            self.check_ticks(ticks)?;
            let remaining = self.sleep_target(wake).remaining(self.clock.now());
            ::tokio::time::sleep(remaining).await;
        }
    }
}
