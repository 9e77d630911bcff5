//! The shared work queue of pending piece jobs that every peer worker pulls
//! from. `tokio::sync::mpsc` is single-consumer, so a plain
//! `Arc<Mutex<VecDeque>>` guarded by a [`Notify`] stands in for a
//! multi-consumer channel instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::{PieceIndex, Sha1Hash};

/// A single piece waiting to be downloaded by whichever worker picks it up
/// next.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PieceJob {
    pub index: PieceIndex,
    pub expected_hash: Sha1Hash,
    pub len: u32,
}

struct Inner {
    jobs: std::sync::Mutex<VecDeque<PieceJob>>,
    notify: Notify,
    closed: AtomicBool,
}

/// A cloneable handle onto the shared job queue.
#[derive(Clone)]
pub(crate) struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Builds a queue pre-loaded with every piece job for the torrent.
    pub(crate) fn new(jobs: impl IntoIterator<Item = PieceJob>) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: std::sync::Mutex::new(jobs.into_iter().collect()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Pops the next job, waiting if the queue is momentarily empty.
    /// Returns `None` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Option<PieceJob> {
        loop {
            if let Some(job) = self.inner.jobs.lock().unwrap().pop_front() {
                return Some(job);
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }

            // `close()` uses `notify_waiters`, which only wakes futures
            // that are already registered, so the registration has to
            // happen before we re-check the condition below -- otherwise
            // a `close()` landing between the check above and `.await`
            // would never wake us.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(job) = self.inner.jobs.lock().unwrap().pop_front() {
                return Some(job);
            }
            if self.inner.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Returns a job to the front of the queue, e.g. after a peer session
    /// failed partway through downloading it.
    pub(crate) fn push(&self, job: PieceJob) {
        self.inner.jobs.lock().unwrap().push_front(job);
        self.inner.notify.notify_one();
    }

    /// Marks the queue closed and wakes every waiting worker so they can
    /// observe it and exit.
    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
