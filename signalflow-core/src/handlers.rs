//! Concrete [`NodeHandler`] implementations for the single-successor
//! shapes of §6: terminal output, `transform`, and `reduce`.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::{
    context::{ExecutionContext, ForceSyncContext},
    deferred::DeferredWork,
    end::End,
    ids::PredecessorId,
    item::{Item, Next},
    node::{NodeHandler, PredecessorHandle, SignalNode},
};

/// Runs `task` through `ctx`, auto-wrapping it in [`ForceSyncContext`] first
/// when `ctx` is immediate-but-not-direct (§4.1): such a context would
/// otherwise let a handler's own callback re-enter delivery on the calling
/// thread without the node mutex having ever protected it, because nothing
/// about "immediate" here implies "no locking of its own" the way `Direct`
/// guarantees. Forcing it through `invoke_sync` keeps the call synchronous
/// while still going through the context's own (possibly locking) dispatch.
fn dispatch(ctx: &Arc<dyn ExecutionContext>, task: Box<dyn FnOnce() + Send>) {
    if ctx.is_immediate_in_current() && !ctx.is_direct() {
        (ForceSyncContext { inner: Arc::clone(ctx) }).invoke(task);
    } else {
        ctx.invoke(task);
    }
}

/// §6 `subscribe`: a terminal consumer. Runs a user closure per value and a
/// user closure on end, both through `ctx`.
pub struct OutputHandler<T> {
    ctx: Arc<dyn ExecutionContext>,
    on_value: Arc<dyn Fn(T) + Send + Sync>,
    on_end: Mutex<Option<Box<dyn FnOnce(End) + Send>>>,
}

impl<T: Send + 'static> OutputHandler<T> {
    pub fn new(
        ctx: Arc<dyn ExecutionContext>,
        on_value: impl Fn(T) + Send + Sync + 'static,
        on_end: impl FnOnce(End) + Send + 'static,
    ) -> Self {
        Self {
            ctx,
            on_value: Arc::new(on_value),
            on_end: Mutex::new(Some(Box::new(on_end))),
        }
    }
}

impl<T: Send + 'static> NodeHandler<T> for OutputHandler<T> {
    fn deliver(&self, item: Item<T>, _activated: bool, _dw: &mut DeferredWork) {
        match item {
            Item::Value(v) => {
                // `invoke` per §4.1: runs inline for a `Direct` context,
                // otherwise handed off — either way, off the node mutex.
                let on_value = Arc::clone(&self.on_value);
                dispatch(&self.ctx, Box::new(move || on_value(v)));
            }
            Item::End(end) => {
                if let Some(on_end) = self.on_end.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    dispatch(&self.ctx, Box::new(move || on_end(end)));
                }
            }
        }
    }
}

/// §3 "ready for activation": the context-relative transform handler of
/// `transform`/`combine`/`custom_activation`. Forwards its output into a
/// successor `SignalNode`, preserving the successor's own validation
/// contract by quoting this handler's owning node's id and activation
/// count at call time.
pub struct ProcessorHandler<T, U> {
    ctx: Arc<dyn ExecutionContext>,
    transform: Arc<dyn Fn(T) -> Next<U> + Send + Sync>,
    successor: Arc<SignalNode<U>>,
    self_id: PredecessorId,
    self_node: std::sync::Weak<SignalNode<T>>,
}

impl<T: Send + 'static, U: Send + 'static> ProcessorHandler<T, U> {
    pub fn new(
        ctx: Arc<dyn ExecutionContext>,
        transform: impl Fn(T) -> Next<U> + Send + Sync + 'static,
        successor: Arc<SignalNode<U>>,
        self_id: PredecessorId,
        self_node: std::sync::Weak<SignalNode<T>>,
    ) -> Self {
        Self {
            ctx,
            transform: Arc::new(transform),
            successor,
            self_id,
            self_node,
        }
    }
}

impl<T: Send + 'static, U: Send + 'static> NodeHandler<T> for ProcessorHandler<T, U> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        let Some(origin_node) = self.self_node.upgrade() else {
            return;
        };
        let claimed = origin_node.activation_count();
        let successor = Arc::clone(&self.successor);
        let self_id = self.self_id.clone();
        match item {
            Item::Value(v) => {
                // The transform is user code; it runs through `ctx` like any
                // other callback (§4.1), not inline on whichever thread
                // happened to deliver `v`.
                let transform = Arc::clone(&self.transform);
                dispatch(&self.ctx, Box::new(move || {
                    for out in transform(v).into_vec() {
                        if successor
                            .send(Item::Value(out), Some((self_id.clone(), claimed)), activated)
                            .is_err()
                        {
                            trace!("processor output dropped: successor gone");
                        }
                    }
                }));
            }
            Item::End(end) => {
                dispatch(&self.ctx, Box::new(move || {
                    let _ = successor.send(Item::End(end), Some((self_id, claimed)), activated);
                }));
            }
        }
    }
}

/// §6 `reduce`: a fold with the running accumulator cached for late
/// subscribers (§7 item 6 "cache" family).
pub struct ReducerHandler<T, U: Clone> {
    ctx: Arc<dyn ExecutionContext>,
    fold: Arc<dyn Fn(U, T) -> U + Send + Sync>,
    state: Arc<Mutex<U>>,
    successor: Arc<SignalNode<U>>,
    self_id: PredecessorId,
    self_node: std::sync::Weak<SignalNode<T>>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> ReducerHandler<T, U> {
    pub fn new(
        ctx: Arc<dyn ExecutionContext>,
        initial: U,
        fold: impl Fn(U, T) -> U + Send + Sync + 'static,
        successor: Arc<SignalNode<U>>,
        self_id: PredecessorId,
        self_node: std::sync::Weak<SignalNode<T>>,
    ) -> Self {
        Self {
            ctx,
            fold: Arc::new(fold),
            state: Arc::new(Mutex::new(initial)),
            successor,
            self_id,
            self_node,
        }
    }

    pub fn current(&self) -> U {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl<T: Send + 'static, U: Clone + Send + 'static> NodeHandler<T> for ReducerHandler<T, U> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        let Some(origin_node) = self.self_node.upgrade() else {
            return;
        };
        let claimed = origin_node.activation_count();
        let successor = Arc::clone(&self.successor);
        let self_id = self.self_id.clone();
        match item {
            Item::Value(v) => {
                let fold = Arc::clone(&self.fold);
                let state = Arc::clone(&self.state);
                dispatch(&self.ctx, Box::new(move || {
                    let next = {
                        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                        let updated = fold(state.clone(), v);
                        *state = updated.clone();
                        updated
                    };
                    let _ = successor.send(Item::Value(next), Some((self_id, claimed)), activated);
                }));
            }
            Item::End(end) => {
                dispatch(&self.ctx, Box::new(move || {
                    let _ = successor.send(Item::End(end), Some((self_id, claimed)), activated);
                }));
            }
        }
    }
}

/// §6 `reduce` (initializer variant): like [`ReducerHandler`], but the first
/// state comes from applying `init` to the first value instead of an eager
/// `initial`; every value after that still goes through `fold`.
pub struct LazyReducerHandler<T, U: Clone> {
    ctx: Arc<dyn ExecutionContext>,
    init: Mutex<Option<Box<dyn FnOnce(&T) -> U + Send>>>,
    fold: Arc<dyn Fn(U, T) -> U + Send + Sync>,
    state: Arc<Mutex<Option<U>>>,
    successor: Arc<SignalNode<U>>,
    self_id: PredecessorId,
    self_node: std::sync::Weak<SignalNode<T>>,
}

impl<T: Send + 'static, U: Clone + Send + 'static> LazyReducerHandler<T, U> {
    pub fn new(
        ctx: Arc<dyn ExecutionContext>,
        init: impl FnOnce(&T) -> U + Send + 'static,
        fold: impl Fn(U, T) -> U + Send + Sync + 'static,
        successor: Arc<SignalNode<U>>,
        self_id: PredecessorId,
        self_node: std::sync::Weak<SignalNode<T>>,
    ) -> Self {
        Self {
            ctx,
            init: Mutex::new(Some(Box::new(init))),
            fold: Arc::new(fold),
            state: Arc::new(Mutex::new(None)),
            successor,
            self_id,
            self_node,
        }
    }

    pub fn current(&self) -> Option<U> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl<T: Send + 'static, U: Clone + Send + 'static> NodeHandler<T> for LazyReducerHandler<T, U> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        let Some(origin_node) = self.self_node.upgrade() else {
            return;
        };
        let claimed = origin_node.activation_count();
        let successor = Arc::clone(&self.successor);
        let self_id = self.self_id.clone();
        match item {
            Item::Value(v) => {
                let fold = Arc::clone(&self.fold);
                let state = Arc::clone(&self.state);
                let init = self.init.lock().unwrap_or_else(|e| e.into_inner()).take();
                dispatch(&self.ctx, Box::new(move || {
                    let next = {
                        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                        let updated = match (state.take(), init) {
                            (Some(prev), _) => fold(prev, v),
                            (None, Some(init)) => init(&v),
                            (None, None) => unreachable!("state cleared without an initializer to replace it"),
                        };
                        *state = Some(updated.clone());
                        updated
                    };
                    let _ = successor.send(Item::Value(next), Some((self_id, claimed)), activated);
                }));
            }
            Item::End(end) => {
                dispatch(&self.ctx, Box::new(move || {
                    let _ = successor.send(Item::End(end), Some((self_id, claimed)), activated);
                }));
            }
        }
    }
}

impl<T> PredecessorHandle for SignalNode<T>
where
    T: Send + 'static,
{
    fn id(&self) -> PredecessorId {
        SignalNode::id(self)
    }

    fn transitive_ids(&self) -> Vec<PredecessorId> {
        SignalNode::transitive_ids(self)
    }

    fn notify_removed(&self, _dw: &mut DeferredWork) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Immediate (in the §4.1 sense) but not `Direct` — the shape the
    /// auto-wrap rule exists for: a caller relying on `is_immediate_in_current`
    /// must not see `invoke` run the task itself, since that would bypass
    /// whatever locking this context does around `invoke_sync`.
    struct ImmediateButLocking {
        invoke_called: AtomicBool,
        invoke_sync_called: AtomicBool,
    }

    impl ExecutionContext for ImmediateButLocking {
        fn invoke(&self, task: Box<dyn FnOnce() + Send>) {
            self.invoke_called.store(true, Ordering::SeqCst);
            task();
        }

        fn invoke_sync(&self, task: Box<dyn FnOnce() + Send>) {
            self.invoke_sync_called.store(true, Ordering::SeqCst);
            task();
        }

        fn is_immediate_in_current(&self) -> bool {
            true
        }

        fn relative_async(self: Arc<Self>) -> Arc<dyn ExecutionContext> {
            self
        }
    }

    #[test]
    fn immediate_but_not_direct_context_is_routed_through_invoke_sync() {
        let concrete = Arc::new(ImmediateButLocking {
            invoke_called: AtomicBool::new(false),
            invoke_sync_called: AtomicBool::new(false),
        });
        let ctx: Arc<dyn ExecutionContext> = Arc::clone(&concrete) as Arc<dyn ExecutionContext>;
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        dispatch(&ctx, Box::new(move || ran2.store(true, Ordering::SeqCst)));

        assert!(ran.load(Ordering::SeqCst));
        assert!(concrete.invoke_sync_called.load(Ordering::SeqCst));
        assert!(!concrete.invoke_called.load(Ordering::SeqCst), "must not bypass invoke_sync's locking");
    }
}
