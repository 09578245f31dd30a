use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    sync::mpsc,
};

use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{Guard, IntoGuard, LivenessGuard, WeakHandle};

// === TaskQueue === //

/// A single-threaded queue of deferred callbacks, each guarded by the liveness of some object.
///
/// Callbacks run in posting order when the owning loop calls [`TaskQueue::run_pending`]. A callback
/// whose guard fails at that point is dropped without being called. Callbacks may post further
/// tasks and may destroy objects other queued tasks refer to.
pub struct TaskQueue {
    local: RefCell<VecDeque<PendingTask>>,
    coalesced: RefCell<FxHashSet<LivenessGuard>>,
    remote_sender: mpsc::Sender<RemoteTask>,
    remote_receiver: mpsc::Receiver<RemoteTask>,
    running: Cell<bool>,
}

struct PendingTask {
    guard: Box<dyn Guard>,
    task: Box<dyn FnOnce()>,
    coalesce_key: Option<LivenessGuard>,
}

struct RemoteTask {
    guard: Box<dyn Guard + Send>,
    task: Box<dyn FnOnce() + Send>,
}

/// The outcome of a [`TaskQueue::run_pending`] call.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq)]
pub struct RunStats {
    /// Tasks whose guard passed and which were called.
    pub executed: usize,

    /// Tasks whose guard failed and which were dropped.
    pub skipped: usize,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (remote_sender, remote_receiver) = mpsc::channel();

        Self {
            local: RefCell::default(),
            coalesced: RefCell::default(),
            remote_sender,
            remote_receiver,
            running: Cell::new(false),
        }
    }

    /// Queues `f` to run on the next [`run_pending`](TaskQueue::run_pending) if `source`'s target
    /// is still alive by then.
    pub fn post<S>(&self, source: S, f: impl FnOnce() + 'static)
    where
        S: IntoGuard,
        S::Guard: 'static,
    {
        self.local.borrow_mut().push_back(PendingTask {
            guard: Box::new(source.into_guard()),
            task: Box::new(f),
            coalesce_key: None,
        });
    }

    /// Queues `f` unless a task coalesced on the same object is already pending.
    ///
    /// Returns whether `f` was queued. Null handles never queue anything.
    pub fn post_coalesced<T: ?Sized>(
        &self,
        handle: &WeakHandle<T>,
        f: impl FnOnce() + 'static,
    ) -> bool {
        let key = handle.identity();

        if key.is_null() || !self.coalesced.borrow_mut().insert(key.clone()) {
            return false;
        }

        self.local.borrow_mut().push_back(PendingTask {
            guard: Box::new(key.clone()),
            task: Box::new(f),
            coalesce_key: Some(key),
        });

        true
    }

    /// Creates a producer other threads can use to post into this queue.
    pub fn poster(&self) -> Poster {
        Poster {
            sender: self.remote_sender.clone(),
        }
    }

    /// The number of tasks posted locally which have not yet run. Remote tasks are only counted
    /// once `run_pending` has received them.
    pub fn len(&self) -> usize {
        self.local.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every task queued before this call, skipping those whose guard fails.
    ///
    /// Tasks posted by the tasks being run wait for the next call. Calling this from inside a task
    /// does nothing and returns empty stats.
    pub fn run_pending(&self) -> RunStats {
        if self.running.replace(true) {
            tracing::trace!("ignoring reentrant run of task queue");
            return RunStats::default();
        }

        let _running = scopeguard::guard(&self.running, |running| running.set(false));

        self.receive_remote();

        let mut stats = RunStats::default();
        let batch = self.len();

        for _ in 0..batch {
            let Some(pending) = self.local.borrow_mut().pop_front() else {
                break;
            };

            if let Some(key) = &pending.coalesce_key {
                self.coalesced.borrow_mut().remove(key);
            }

            if pending.guard.check() {
                (pending.task)();
                stats.executed += 1;
            } else {
                tracing::trace!("skipping task whose target was destroyed");
                stats.skipped += 1;
            }
        }

        tracing::trace!(
            executed = stats.executed,
            skipped = stats.skipped,
            "drained task queue"
        );

        stats
    }

    fn receive_remote(&self) {
        let mut local = self.local.borrow_mut();

        while let Ok(remote) = self.remote_receiver.try_recv() {
            local.push_back(PendingTask {
                guard: remote.guard,
                task: remote.task,
                coalesce_key: None,
            });
        }
    }
}

// === Poster === //

/// A thread-safe producer of tasks for a [`TaskQueue`].
///
/// Guards are checked on the queue's thread, right before the task would run.
#[derive(Clone)]
pub struct Poster {
    sender: mpsc::Sender<RemoteTask>,
}

impl fmt::Debug for Poster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poster").finish_non_exhaustive()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
#[error("the task queue has been dropped")]
pub struct Disconnected;

impl Poster {
    pub fn post<S>(&self, source: S, f: impl FnOnce() + Send + 'static) -> Result<(), Disconnected>
    where
        S: IntoGuard,
        S::Guard: Send + 'static,
    {
        self.sender
            .send(RemoteTask {
                guard: Box::new(source.into_guard()),
                task: Box::new(f),
            })
            .map_err(|_| Disconnected)
    }
}
