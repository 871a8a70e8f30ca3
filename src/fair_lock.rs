//! Fair read/write lock with FIFO admission across mixed request kinds
//!
//! A conventional reader/writer lock batches all pending readers ahead of a
//! writer, which can starve writers behind a continuous stream of reads. This
//! lock instead runs a single arbiter task draining one FIFO request queue:
//!
//! - A dequeued read is granted immediately and recorded as outstanding.
//! - A dequeued write first waits for every read that was outstanding at
//!   dequeue time to release, is then granted, and the arbiter refuses to
//!   dequeue anything further until the writer releases.
//!
//! Net effect: admission order equals arrival order for both kinds. Writers
//! never starve behind reads that arrive after them, and never preempt reads
//! that were already granted.
//!
//! Guards release on drop, so a forgotten release is unrepresentable.
//!
//! # Example
//!
//! ```no_run
//! use feedrelay::fair_lock::FairLock;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lock = FairLock::new(HashMap::<String, u32>::new());
//!
//! {
//!     let mut guard = lock.write().await?;
//!     guard.insert("answer".into(), 42);
//! }
//!
//! let guard = lock.read().await?;
//! assert_eq!(guard.get("answer"), Some(&42));
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Admission request processed by the arbiter in arrival order
enum Request {
    /// Shared access
    Read {
        granted: oneshot::Sender<()>,
        released: oneshot::Receiver<()>,
    },
    /// Exclusive access
    Write {
        granted: oneshot::Sender<()>,
        released: oneshot::Receiver<()>,
    },
}

/// Message-passing read/write lock owning its protected value
///
/// Cheap to share behind an [`std::sync::Arc`]; the arbiter task lives as long
/// as the lock and exits once the lock is closed or dropped.
pub struct FairLock<T> {
    requests: mpsc::UnboundedSender<Request>,
    shutdown: CancellationToken,
    value: UnsafeCell<T>,
}

// SAFETY: the arbiter grants either one writer with no concurrent readers, or
// any number of readers with no writer. Access to `value` only happens through
// guards handed out under that protocol, which is exactly the aliasing
// discipline of a reader/writer lock. T: Send because a write guard may move
// to another thread; T: Sync because read guards expose &T concurrently.
unsafe impl<T: Send> Send for FairLock<T> {}
unsafe impl<T: Send + Sync> Sync for FairLock<T> {}

impl<T> FairLock<T> {
    /// Create a new lock around `value` and spawn its arbiter task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(value: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(arbiter(rx, shutdown.clone()));
        Self {
            requests: tx,
            shutdown,
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire shared access
    ///
    /// Queued in arrival order behind every earlier read and write request.
    /// Returns [`Error::LockClosed`] when the lock is closed while the caller
    /// is still queued.
    pub async fn read(&self) -> Result<ReadGuard<'_, T>> {
        let (granted_tx, granted_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.requests
            .send(Request::Read {
                granted: granted_tx,
                released: release_rx,
            })
            .map_err(|_| Error::LockClosed)?;
        granted_rx.await.map_err(|_| Error::LockClosed)?;
        Ok(ReadGuard {
            lock: self,
            _release: release_tx,
        })
    }

    /// Acquire exclusive access
    ///
    /// Queued in arrival order; once dequeued it waits only for the reads that
    /// were already outstanding, never for reads that arrive later.
    pub async fn write(&self) -> Result<WriteGuard<'_, T>> {
        let (granted_tx, granted_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.requests
            .send(Request::Write {
                granted: granted_tx,
                released: release_rx,
            })
            .map_err(|_| Error::LockClosed)?;
        granted_rx.await.map_err(|_| Error::LockClosed)?;
        Ok(WriteGuard {
            lock: self,
            _release: release_tx,
        })
    }

    /// Close the request queue
    ///
    /// The arbiter drains in-flight releases and exits; every caller still
    /// queued unblocks with [`Error::LockClosed`]. Outstanding guards remain
    /// valid until dropped.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

/// Arbiter loop: strict FIFO dequeue, blocking while a writer is active
async fn arbiter(mut requests: mpsc::UnboundedReceiver<Request>, shutdown: CancellationToken) {
    let mut outstanding_reads: Vec<oneshot::Receiver<()>> = Vec::new();

    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        match request {
            Request::Read { granted, released } => {
                // Grant immediately; a failed send means the caller gave up
                if granted.send(()).is_ok() {
                    outstanding_reads.push(released);
                }
            }
            Request::Write { granted, released } => {
                // Wait for the reads outstanding right now, not future ones.
                // A receiver resolving (value or sender drop) is the release.
                for read in outstanding_reads.drain(..) {
                    let _ = read.await;
                }
                if granted.send(()).is_ok() {
                    // Refuse to dequeue anything until the writer releases
                    let _ = released.await;
                }
            }
        }
    }
    // Dropping `requests` here wakes every queued caller with LockClosed.
}

/// Shared-access guard; releases on drop
pub struct ReadGuard<'a, T> {
    lock: &'a FairLock<T>,
    _release: oneshot::Sender<()>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the arbiter admits no writer while this read is outstanding
        unsafe { &*self.lock.value.get() }
    }
}

/// Exclusive-access guard; releases on drop
pub struct WriteGuard<'a, T> {
    lock: &'a FairLock<T>,
    _release: oneshot::Sender<()>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the arbiter admits nothing else while this write is outstanding
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in Deref — exclusive admission
        unsafe { &mut *self.lock.value.get() }
    }
}
