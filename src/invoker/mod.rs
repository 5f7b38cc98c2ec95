//! Cross-thread invocation onto the host thread
//!
//! The host runtime is single-threaded and cooperative; native code running
//! on any other thread must not touch host state directly. It marshals
//! through a `CallInvoker` instead: `invoke_blocking` runs the task on the
//! host thread and parks the caller until it finishes, `invoke_non_blocking`
//! enqueues and returns. Tasks execute on the host thread in FIFO order.
//!
//! The invoker only owns the queue. Whoever owns the host thread's run loop
//! must service it (see `HostRuntime::block_on` / `drain`); if nobody does,
//! blocking callers wait forever. That liveness obligation sits with the
//! loop owner, not here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use tokio::sync::Notify;

type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Counters distinguishing inline execution from queue crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerStats {
    /// Tasks run inline because the caller was already on the host thread.
    pub direct: usize,
    /// Tasks that crossed threads through the queue.
    pub enqueued: usize,
}

/// Marshals work from arbitrary native threads onto the host thread.
pub struct CallInvoker {
    host_thread: ThreadId,
    queue: Mutex<VecDeque<HostTask>>,
    notify: Notify,
    direct: AtomicUsize,
    enqueued: AtomicUsize,
}

impl CallInvoker {
    /// Create an invoker owned by the current thread. The constructing
    /// thread *is* the host thread from here on.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            host_thread: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            direct: AtomicUsize::new(0),
            enqueued: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn is_host_thread(&self) -> bool {
        thread::current().id() == self.host_thread
    }

    /// Run `task` on the host thread and wait for it to complete.
    ///
    /// On the host thread itself the task runs immediately, with no
    /// enqueue. From any other thread the task is enqueued and the caller
    /// blocks on a condvar until the host thread has run it.
    ///
    /// Blocks indefinitely if the host run loop is never serviced.
    pub fn invoke_blocking<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_host_thread() {
            self.direct.fetch_add(1, Ordering::SeqCst);
            task();
            return;
        }

        let done = Arc::new((Mutex::new(false), Condvar::new()));
        let completion = Arc::clone(&done);
        self.push(Box::new(move || {
            task();
            let (flag, cvar) = &*completion;
            *lock(flag) = true;
            cvar.notify_one();
        }));

        let (flag, cvar) = &*done;
        let mut finished = lock(flag);
        while !*finished {
            finished = cvar
                .wait(finished)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Enqueue `task` for later execution on the host thread, without
    /// waiting. Used where the caller does not need the result
    /// synchronously, such as continuation signaling.
    pub fn invoke_non_blocking<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(Box::new(task));
    }

    /// Run every pending task. Must be called on the host thread.
    ///
    /// Tasks are popped one at a time so the queue lock is never held while
    /// a task runs.
    pub fn drain(&self) -> usize {
        debug_assert!(self.is_host_thread(), "drain called off the host thread");
        let mut count = 0;
        loop {
            let task = lock(&self.queue).pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    /// Sleep until at least one task has been enqueued. For async run
    /// loops; pairs with [`drain`](Self::drain).
    pub async fn wait_for_tasks(&self) {
        self.notify.notified().await;
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn stats(&self) -> InvokerStats {
        InvokerStats {
            direct: self.direct.load(Ordering::SeqCst),
            enqueued: self.enqueued.load(Ordering::SeqCst),
        }
    }

    fn push(&self, task: HostTask) {
        lock(&self.queue).push_back(task);
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Queue and flag mutation cannot be left half-done by a panicking task;
    // recover the guard rather than propagate the poison.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
