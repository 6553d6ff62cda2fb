//! Bounded worker pools
//!
//! Every concurrent stage of a run (article fetch/rewrite, redirect lookup,
//! media download, optimization) runs on its own [`WorkPool`]: tasks are
//! spawned freely, a semaphore bounds how many execute at once, and a
//! pending counter lets producers apply back-pressure and lets the
//! orchestrator drain a pool before crossing a phase boundary.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A bounded pool of spawned tasks
#[derive(Clone)]
pub struct WorkPool {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    pending: Arc<AtomicUsize>,
}

impl WorkPool {
    /// Creates a pool running at most `width` tasks concurrently
    pub fn new(name: &'static str, width: usize) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(width.max(1))),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueues a task
    ///
    /// The task is spawned immediately but waits for a pool slot before its
    /// body runs. Enqueuing never blocks the caller.
    pub fn push<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let semaphore = Arc::clone(&self.semaphore);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            // Slot acquisition only fails once the semaphore is closed,
            // which never happens while the pool is alive.
            let permit = semaphore.acquire_owned().await;
            if permit.is_ok() {
                task.await;
            }
            pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Number of tasks enqueued but not yet finished
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether no task is queued or running
    pub fn is_idle(&self) -> bool {
        self.len() == 0
    }

    /// Waits until the pool has fully quiesced
    ///
    /// Polls idleness once a second, then pushes a sentinel task through the
    /// pool and waits for it, so work enqueued while the last real task was
    /// finishing is covered too.
    pub async fn drain(&self) {
        loop {
            while !self.is_idle() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let sentinel = Arc::new(tokio::sync::Notify::new());
            let done = Arc::clone(&sentinel);
            self.push(async move {
                done.notify_one();
            });
            sentinel.notified().await;

            if self.is_idle() {
                tracing::debug!("{} queue drained", self.name);
                return;
            }
        }
    }
}
