//! §4.1 Execution context: "run this closure here", abstracted over direct,
//! reentrant, and asynchronous schedulers.

use std::sync::Arc;

/// Abstracts "run this closure here". Implementations are external
/// collaborators from the engine's point of view (§1 scope); this module
/// only specifies the contract plus the one concrete "just call it" context
/// every node needs to exist ([`Direct`]).
pub trait ExecutionContext: Send + Sync + 'static {
    /// Schedules `task` to run, possibly asynchronously. Never blocks the
    /// caller past the point of handing off the closure.
    fn invoke(&self, task: Box<dyn FnOnce() + Send>);

    /// Runs `task` and blocks the caller until it returns.
    fn invoke_sync(&self, task: Box<dyn FnOnce() + Send>);

    /// "Execute on the caller immediately, with no locking of its own."
    /// Enables the `specialized_sync_pop` fast path (§4.3 step 5).
    fn is_direct(&self) -> bool {
        false
    }

    /// Whether this context may call back into code that is already running
    /// on it (i.e. nested `invoke`/`invoke_sync` from within a task it is
    /// currently running) without deadlocking.
    fn is_reentrant(&self) -> bool {
        false
    }

    /// Whether `invoke` on the calling thread, right now, would run `task`
    /// before returning (a stronger, call-site-specific claim than
    /// `is_immediate_always`).
    fn is_immediate_in_current(&self) -> bool {
        self.is_direct()
    }

    /// Whether `invoke` *always* runs its task before returning, regardless
    /// of caller.
    fn is_immediate_always(&self) -> bool {
        self.is_direct()
    }

    /// An equivalent context guaranteed to be asynchronous (never
    /// immediate), used to downgrade a direct context when a handler needs
    /// to escape the caller's stack (e.g. to avoid reentrant delivery on a
    /// context that is immediate but not direct).
    fn relative_async(self: Arc<Self>) -> Arc<dyn ExecutionContext>;
}

/// "Execute on the caller immediately, with no locking of its own."
///
/// This is the fast-path context: [`crate::node::SignalNode::send`] takes a
/// dedicated `specialized_sync_pop` route whenever the attached handler's
/// context `is_direct()` and the delivered item is a `Value` (§4.3 step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl ExecutionContext for Direct {
    fn invoke(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }

    fn invoke_sync(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn is_reentrant(&self) -> bool {
        true
    }

    fn relative_async(self: Arc<Self>) -> Arc<dyn ExecutionContext> {
        Arc::new(ThreadPoolContext::shared())
    }
}

/// A small worker-pool context: genuinely asynchronous (never immediate),
/// not reentrant. Exists so integration tests can exercise the
/// "immediate-but-not-direct contexts get auto-wrapped in `invoke_sync`"
/// rule from §4.1 against a real non-direct scheduler, and so embedders have
/// something usable out of the box.
///
/// Backed by a fixed-size pool of worker threads pulling from a shared
/// work queue, the same shape as the teacher's reliance on a plain
/// `std::thread`/mutex pair rather than a full async runtime.
#[cfg(feature = "default-context")]
pub struct ThreadPoolContext {
    inner: Arc<ThreadPoolInner>,
}

#[cfg(feature = "default-context")]
struct ThreadPoolInner {
    queue: parking_lot::Mutex<std::collections::VecDeque<Box<dyn FnOnce() + Send>>>,
    condvar: parking_lot::Condvar,
}

#[cfg(feature = "default-context")]
impl ThreadPoolContext {
    /// Spawns `worker_count` long-lived worker threads (minimum 1).
    pub fn new(worker_count: usize) -> Self {
        let inner = Arc::new(ThreadPoolInner {
            queue: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            condvar: parking_lot::Condvar::new(),
        });
        for _ in 0..worker_count.max(1) {
            let inner = Arc::clone(&inner);
            std::thread::spawn(move || loop {
                let mut queue = inner.queue.lock();
                while queue.is_empty() {
                    inner.condvar.wait(&mut queue);
                }
                let task = queue.pop_front().expect("just checked non-empty");
                drop(queue);
                task();
            });
        }
        Self { inner }
    }

    /// A two-worker pool, large enough to demonstrate cross-thread ordering
    /// without being a meaningful resource commitment.
    pub fn shared() -> Self {
        Self::new(2)
    }
}

#[cfg(feature = "default-context")]
impl ExecutionContext for ThreadPoolContext {
    fn invoke(&self, task: Box<dyn FnOnce() + Send>) {
        self.inner.queue.lock().push_back(task);
        self.inner.condvar.notify_one();
    }

    fn invoke_sync(&self, task: Box<dyn FnOnce() + Send>) {
        let done = Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new()));
        let done_clone = Arc::clone(&done);
        self.invoke(Box::new(move || {
            task();
            let (lock, cvar) = &*done_clone;
            *lock.lock() = true;
            cvar.notify_one();
        }));
        let (lock, cvar) = &*done;
        let mut guard = lock.lock();
        while !*guard {
            cvar.wait(&mut guard);
        }
    }

    fn relative_async(self: Arc<Self>) -> Arc<dyn ExecutionContext> {
        self
    }
}

/// Wraps `ctx` so that its task always runs through `invoke_sync`, the
/// transformation §4.1 requires for every handler whose context is
/// "immediate but not direct": this preserves non-reentrant semantics even
/// when the underlying context would otherwise allow interleaving.
pub(crate) struct ForceSyncContext<C: ?Sized + ExecutionContext> {
    pub(crate) inner: Arc<C>,
}

impl<C: ?Sized + ExecutionContext> ForceSyncContext<C> {
    pub(crate) fn invoke(&self, task: Box<dyn FnOnce() + Send>) {
        self.inner.invoke_sync(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn direct_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        Direct.invoke(Box::new(move || ran2.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[cfg(feature = "default-context")]
    #[test]
    fn thread_pool_invoke_sync_blocks_until_done() {
        let pool = ThreadPoolContext::shared();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        pool.invoke_sync(Box::new(move || ran2.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
