// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded concurrency queue: FIFO admission of heavy work, with at most
// `max_concurrent` tasks running at once across every job sharing the queue.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use stapel_core::error::{Result, StapelError};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Concurrency limit used when none is configured.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueueState {
    active: usize,
    backlog: VecDeque<Task>,
}

struct Inner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
}

/// FIFO queue admitting at most `max_concurrent` tasks at a time.
///
/// Cloning is cheap and clones share the same limit. Tasks run on the
/// ambient tokio runtime. The state lock is only held for bookkeeping and
/// never across an await.
#[derive(Clone)]
pub struct BoundedQueue {
    inner: Arc<Inner>,
}

impl Default for BoundedQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("max_concurrent", &self.max_concurrent())
            .field("active", &self.active())
            .field("pending", &self.pending())
            .finish()
    }
}

impl BoundedQueue {
    /// A limit of 0 is raised to 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState {
                    active: 0,
                    backlog: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Tasks admitted and not yet settled.
    pub fn active(&self) -> usize {
        self.lock().active
    }

    /// Tasks waiting in the backlog.
    pub fn pending(&self) -> usize {
        self.lock().backlog.len()
    }

    /// Append `future` to the backlog and admit as many tasks as the limit
    /// allows.
    ///
    /// The ticket resolves with the task's output. If the task never
    /// delivers one (it panicked, or the runtime shut down) the ticket
    /// resolves to [`StapelError::TaskAborted`]. Dropping the ticket does
    /// not cancel the task.
    pub fn enqueue<F, T>(&self, future: F) -> QueueTicket<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let task: Task = Box::pin(async move {
            let output = future.await;
            let _ = sender.send(output);
        });

        let pending = {
            let mut state = self.lock();
            state.backlog.push_back(task);
            state.backlog.len()
        };
        debug!(pending, "Task enqueued");

        self.pump();
        QueueTicket { receiver }
    }

    /// Run `work` on a blocking thread once the queue admits it.
    ///
    /// `work` receives a progress callback taking 0–100; reported values are
    /// readable from the returned task while it runs.
    pub fn submit_blocking<F, T>(&self, work: F) -> BlockingTask<T>
    where
        F: FnOnce(&dyn Fn(u8)) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (admitted_tx, admitted_rx) = oneshot::channel();
        let ticket = self.enqueue(async move {
            let _ = admitted_tx.send(());
            let joined = tokio::task::spawn_blocking(move || {
                let report = |percent: u8| {
                    let _ = progress_tx.send(percent.min(100));
                };
                work(&report)
            })
            .await;
            match joined {
                Ok(result) => result,
                Err(err) => {
                    error!(%err, "Blocking task did not complete");
                    Err(StapelError::TaskAborted)
                }
            }
        });
        BlockingTask {
            admitted: Some(admitted_rx),
            progress: progress_rx,
            ticket,
        }
    }

    /// Start backlog heads while capacity remains.
    fn pump(&self) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime, backlog left waiting");
            return;
        };
        loop {
            let task = {
                let mut state = self.lock();
                if state.active >= self.inner.max_concurrent {
                    return;
                }
                let Some(task) = state.backlog.pop_front() else {
                    return;
                };
                state.active += 1;
                task
            };
            let slot = SlotGuard {
                queue: self.clone(),
            };
            handle.spawn(async move {
                let _slot = slot;
                task.await;
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases an admitted slot when the task finishes, panics, or is dropped.
struct SlotGuard {
    queue: BoundedQueue,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        {
            let mut state = self.queue.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.queue.pump();
    }
}

/// Resolves with the output of an enqueued task.
#[must_use = "a ticket does nothing unless awaited"]
pub struct QueueTicket<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for QueueTicket<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| StapelError::TaskAborted))
    }
}

/// Blocking work admitted through the queue, with its progress feed.
pub struct BlockingTask<T> {
    admitted: Option<oneshot::Receiver<()>>,
    progress: mpsc::UnboundedReceiver<u8>,
    ticket: QueueTicket<Result<T>>,
}

impl<T> BlockingTask<T> {
    /// Wait until the queue gives this task a slot.
    ///
    /// Returns at once on later calls, or if the task was dropped unrun.
    /// Cancel safe.
    pub async fn admitted(&mut self) {
        if let Some(admitted) = &mut self.admitted {
            let _ = admitted.await;
            self.admitted = None;
        }
    }

    /// Next progress value, or `None` once the work has finished.
    pub async fn next_progress(&mut self) -> Option<u8> {
        self.progress.recv().await
    }

    pub async fn finish(self) -> Result<T> {
        self.ticket.await?
    }
}
