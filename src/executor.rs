//! Keyed single-flight task executor
//!
//! At most one task runs per destination at any instant. Submission never
//! blocks on task execution; cancellation and shutdown block until the target
//! tasks have observably returned.
//!
//! The tracking map is the primary consumer of the [`FairLock`]: lookups take
//! shared mode, insert/delete take exclusive mode, with the check-then-act
//! double-check under the exclusive guard to avoid duplicate spawns when the
//! same key is submitted concurrently.
//!
//! # Example
//!
//! ```no_run
//! use feedrelay::executor::TaskExecutor;
//! use feedrelay::types::FeedId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = TaskExecutor::new();
//!
//! executor
//!     .submit(FeedId(1), |cancel| async move {
//!         cancel.cancelled().await;
//!         Ok(())
//!     })
//!     .await?;
//!
//! executor.cancel(FeedId(1)).await?;
//! executor.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::fair_lock::FairLock;
use crate::types::FeedId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Tracking entry for one executing task
///
/// Exists only while the task is executing; the spawned wrapper removes its
/// own entry on completion. The generation id guards a cancel-then-submit
/// replacement against removal by the stale task.
#[derive(Clone)]
struct RunningTask {
    /// Generation id, unique across the executor's lifetime
    id: u64,
    /// Per-task cancellation handle, derived from the executor's root token
    cancel: CancellationToken,
    /// Completion signal; flips to true (or closes) when the task has returned
    done: watch::Receiver<bool>,
}

/// Keyed single-flight scheduler with cooperative cancellation
pub struct TaskExecutor {
    root: CancellationToken,
    tasks: Arc<FairLock<HashMap<FeedId, RunningTask>>>,
    next_id: AtomicU64,
}

impl TaskExecutor {
    /// Create a new executor with a fresh root cancellation token
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            tasks: Arc::new(FairLock::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Submit a task under `key`
    ///
    /// Spawns `task` with a cancellation handle derived from the executor's
    /// root token and returns `true`. No-op returning `false` when a task is
    /// already running under `key` or the executor has been closed. Never
    /// blocks on task execution.
    ///
    /// The executor only logs task completion; task errors are not surfaced to
    /// the submitter and are never retried.
    pub async fn submit<F, Fut>(&self, key: FeedId, task: F) -> Result<bool>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.root.is_cancelled() {
            debug!(feed_id = %key, "executor closed, ignoring submission");
            return Ok(false);
        }

        // Fast read-only pre-check
        {
            let guard = self.tasks.read().await?;
            if guard.contains_key(&key) {
                return Ok(false);
            }
        }

        // Exclusive re-check-and-insert
        let mut guard = self.tasks.write().await?;
        if guard.contains_key(&key) {
            return Ok(false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let (done_tx, done_rx) = watch::channel(false);
        let tasks = Arc::clone(&self.tasks);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            match task(task_cancel).await {
                Ok(()) => debug!(feed_id = %key, "task completed"),
                Err(e) if e.is_cancellation() => debug!(feed_id = %key, "task cancelled"),
                Err(e) => error!(feed_id = %key, error = %e, "task failed"),
            }

            // Remove our own entry unless a newer task replaced it
            if let Ok(mut guard) = tasks.write().await {
                if guard.get(&key).is_some_and(|t| t.id == id) {
                    guard.remove(&key);
                }
            }
            let _ = done_tx.send(true);
        });

        guard.insert(
            key,
            RunningTask {
                id,
                cancel,
                done: done_rx,
            },
        );
        debug!(feed_id = %key, task_id = id, "task submitted");
        Ok(true)
    }

    /// Cancel the task running under `key`, if any
    ///
    /// Signals cancellation and blocks until the task's completion has been
    /// observed, then removes its tracking entry. No-op when nothing runs
    /// under `key`; after this returns there is no dangling activity.
    pub async fn cancel(&self, key: FeedId) -> Result<()> {
        let entry = {
            let guard = self.tasks.read().await?;
            guard.get(&key).cloned()
        };
        let Some(entry) = entry else {
            return Ok(());
        };

        entry.cancel.cancel();
        wait_done(entry.done.clone()).await;

        let mut guard = self.tasks.write().await?;
        if guard.get(&key).is_some_and(|t| t.id == entry.id) {
            guard.remove(&key);
        }
        debug!(feed_id = %key, task_id = entry.id, "task cancelled and removed");
        Ok(())
    }

    /// Cancel every task and block until all have returned
    ///
    /// Safe to call more than once; subsequent calls return once the last
    /// tracked task has drained.
    pub async fn close(&self) -> Result<()> {
        self.root.cancel();

        loop {
            let pending: Vec<watch::Receiver<bool>> = {
                let guard = self.tasks.read().await?;
                guard.values().map(|t| t.done.clone()).collect()
            };
            if pending.is_empty() {
                break;
            }
            for done in pending {
                wait_done(done).await;
            }
        }
        debug!("executor closed, all tasks drained");
        Ok(())
    }

    /// Number of currently tracked tasks
    pub async fn running(&self) -> Result<usize> {
        Ok(self.tasks.read().await?.len())
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until a task's completion signal fires or its sender is dropped
async fn wait_done(mut done: watch::Receiver<bool>) {
    while !*done.borrow() {
        if done.changed().await.is_err() {
            break;
        }
    }
}
