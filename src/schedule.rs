//! Timer service driving the slideshow and update ticks.
//!
//! Every scheduled task lives on its own tokio task. A periodic task waits a
//! full `period` after each invocation *finishes* before running again, so a
//! slow update never overlaps with itself. `kill` cancels everything and
//! refuses new work.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;

#[derive(Debug, Default)]
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run_after<F, Fut>(&self, delay: Duration, task: F) -> Result<AbortHandle, Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = sleep(delay) => {
                    if let Err(panic) = AssertUnwindSafe(task()).catch_unwind().await {
                        warn!(panic = panic_message(&*panic), "one-shot task panicked");
                    }
                }
            }
        })
    }

    /// Run `task` every `period`, measured from the end of the previous run.
    ///
    /// A panicking invocation is contained; the chain keeps going.
    pub fn run_periodically<F, Fut>(&self, period: Duration, task: F) -> Result<AbortHandle, Error>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = sleep(period) => {}
                }
                if let Err(panic) = AssertUnwindSafe(task()).catch_unwind().await {
                    warn!(panic = panic_message(&*panic), "periodic task panicked");
                }
                if cancel.is_cancelled() {
                    break;
                }
            }
            debug!(period_ms = period.as_millis() as u64, "periodic chain finished");
        })
    }

    /// Cancel all outstanding work. Idempotent.
    pub fn kill(&self) {
        self.cancel.cancel();
        let mut tasks = self.lock_tasks();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of timers that have not finished yet.
    pub fn live_tasks(&self) -> usize {
        let mut tasks = self.lock_tasks();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    fn spawn<Fut>(&self, fut: Fut) -> Result<AbortHandle, Error>
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Checked under the lock so a concurrent kill either sees this task or
        // this call sees the kill.
        let mut tasks = self.lock_tasks();
        if self.cancel.is_cancelled() {
            return Err(Error::SchedulerKilled);
        }
        tasks.retain(|task| !task.is_finished());
        let handle = tokio::spawn(fut);
        let abort = handle.abort_handle();
        tasks.push(handle);
        Ok(abort)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.kill();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
