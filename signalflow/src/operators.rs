//! §6/§7: the ergonomic operator surface — `subscribe`, `transform`,
//! `combine`, `reduce`, `multicast`, `cache_until_active`, `continuous` and
//! friends — built on top of `signalflow-core`'s node primitives.

use std::sync::{Arc, Mutex};

use signalflow_core::{
    CacheUntilActive, CachePolicy, Direct, End, ExecutionContext, LazyReducerHandler, MultiProcessor,
    Next, NodeHandler, OutputHandler, ProcessorHandler, ReducerHandler, SignalNode,
};

/// Type-erased handle keeping some weakly-attached handler's allocation
/// alive for as long as whatever owns the chain does (§3 invariant 6: node
/// handler slots only hold a `Weak`, so something upstream of the node graph
/// itself has to hold the strong `Arc`).
pub(crate) type KeepAlive = Arc<dyn std::any::Any + Send + Sync>;

/// `Arc<dyn NodeHandler<T>>` can't unsize-coerce directly to `Arc<dyn Any +
/// Send + Sync>` (it isn't a supertrait relationship); wrapping it in one
/// more `Arc` makes the wrapper's own concrete, `'static` pointee eligible
/// for the blanket `Any` impl instead.
fn erase<H: ?Sized + Send + Sync + 'static>(handler: Arc<H>) -> KeepAlive {
    Arc::new(handler)
}

/// One point in the dataflow graph. Consuming it (`subscribe`, `transform`,
/// `reduce`, `combine`, `multicast`, ...) attaches this signal's *sole*
/// handler (§3 invariant 6) — call `multicast()` first if more than one
/// consumer needs to observe the same signal.
pub struct Signal<T: Clone + Send + 'static> {
    node: Arc<SignalNode<T>>,
    keep_alive: Vec<KeepAlive>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub(crate) fn from_node(node: Arc<SignalNode<T>>) -> Self {
        Self {
            node,
            keep_alive: Vec::new(),
        }
    }

    pub(crate) fn from_node_with(node: Arc<SignalNode<T>>, keep_alive: Vec<KeepAlive>) -> Self {
        Self { node, keep_alive }
    }

    pub(crate) fn node(&self) -> &Arc<SignalNode<T>> {
        &self.node
    }

    /// Splits a signal into its node and the chain of handler allocations
    /// keeping its upstream pipeline alive, for combinators that need to
    /// merge several signals' keep-alive chains into one successor.
    pub(crate) fn into_parts(self) -> (Arc<SignalNode<T>>, Vec<KeepAlive>) {
        (self.node, self.keep_alive)
    }

    /// §6 `subscribe`: attaches a terminal consumer. The returned
    /// [`Subscription`] keeps the handler alive; dropping it lets the
    /// handler's `Weak` lapse, after which further sends are silently
    /// undelivered (the upstream doesn't observe a `SendError` from this —
    /// only a future send to a now-handlerless node would).
    pub fn subscribe(
        self,
        ctx: Arc<dyn ExecutionContext>,
        on_value: impl Fn(T) + Send + Sync + 'static,
        on_end: impl FnOnce(End) + Send + 'static,
    ) -> Subscription<T> {
        let handler: Arc<dyn NodeHandler<T>> = Arc::new(OutputHandler::new(ctx, on_value, on_end));
        // A freshly-created signal's node has no handler yet, so this can
        // only fail if it was already consumed once.
        self.node
            .attach_handler(Arc::downgrade(&handler))
            .expect("signal already has a consumer; call multicast() first");
        let mut keep_alive = self.keep_alive;
        keep_alive.push(erase(handler));
        Subscription {
            node: self.node,
            _keep_alive: keep_alive,
        }
    }

    /// Like `subscribe`, but `on_value` returns `false` to unsubscribe
    /// itself (§6 "subscribe_while"). Implemented by disabling the
    /// underlying node the next time a value arrives after `false`.
    pub fn subscribe_while(
        self,
        ctx: Arc<dyn ExecutionContext>,
        mut should_continue: impl FnMut(T) -> bool + Send + 'static,
        on_end: impl FnOnce(End) + Send + 'static,
    ) -> Subscription<T> {
        let node_for_guard = Arc::clone(&self.node);
        let on_value = move |v: T| {
            if !should_continue(v) {
                let mut dw = signalflow_core::DeferredWork::new();
                node_for_guard.disable(&mut dw);
                dw.run();
            }
        };
        self.subscribe(ctx, on_value, on_end)
    }

    /// §6 `transform`: maps each value through `f`, which may drop a value
    /// or fan it out to several (`Next`), and forwards ends unchanged.
    pub fn transform<U: Clone + Send + 'static>(
        self,
        ctx: Arc<dyn ExecutionContext>,
        f: impl Fn(T) -> Next<U> + Send + Sync + 'static,
    ) -> Signal<U> {
        let successor = SignalNode::new_output("transform");
        let handler = attach_processor(ctx, &self.node, Arc::clone(&successor), f);
        let mut keep_alive = self.keep_alive;
        keep_alive.push(handler);
        Signal::from_node_with(successor, keep_alive)
    }

    /// `transform` with an explicit mutable fold-state captured by the
    /// closure itself (§6 "transform_with_state"). The state lives inside
    /// the closure; callers needing to inspect it externally should use
    /// `reduce` instead.
    pub fn transform_with_state<S: Send + 'static, U: Clone + Send + 'static>(
        self,
        ctx: Arc<dyn ExecutionContext>,
        state: S,
        f: impl Fn(&mut S, T) -> Next<U> + Send + Sync + 'static,
    ) -> Signal<U> {
        let state = Mutex::new(state);
        self.transform(ctx, move |v| {
            let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut s, v)
        })
    }

    /// §6 `reduce`: folds every value through `f`, caching the running
    /// accumulator so the accumulator can be read even before the next
    /// value arrives (via the returned handler's `current`, exposed to late
    /// multicast subscribers through replay).
    pub fn reduce<U: Clone + Send + 'static>(
        self,
        initial: U,
        ctx: Arc<dyn ExecutionContext>,
        f: impl Fn(U, T) -> U + Send + Sync + 'static,
    ) -> Signal<U> {
        let successor = SignalNode::new_output("reduce");
        let self_id = self.node.id();
        let handler = Arc::new(ReducerHandler::new(
            ctx,
            initial,
            f,
            Arc::clone(&successor),
            self_id,
            Arc::downgrade(&self.node),
        ));
        let handler: Arc<dyn NodeHandler<T>> = handler;
        self.node
            .attach_handler(Arc::downgrade(&handler))
            .expect("signal already has a consumer; call multicast() first");
        let mut dw = signalflow_core::DeferredWork::new();
        successor
            .add_predecessor(Arc::clone(&self.node) as Arc<dyn signalflow_core::PredecessorHandle>, &mut dw)
            .expect("fresh successor cannot already have this predecessor");
        dw.run();
        let mut keep_alive = self.keep_alive;
        keep_alive.push(erase(handler));
        Signal::from_node_with(successor, keep_alive)
    }

    /// `reduce` (initializer variant): the first state is produced by
    /// `init` from the first value instead of an eagerly supplied one.
    pub fn reduce_with_initializer<U: Clone + Send + 'static>(
        self,
        ctx: Arc<dyn ExecutionContext>,
        init: impl FnOnce(&T) -> U + Send + 'static,
        f: impl Fn(U, T) -> U + Send + Sync + 'static,
    ) -> Signal<U> {
        let successor = SignalNode::new_output("reduce");
        let self_id = self.node.id();
        let handler = Arc::new(LazyReducerHandler::new(
            ctx,
            init,
            f,
            Arc::clone(&successor),
            self_id,
            Arc::downgrade(&self.node),
        ));
        let handler: Arc<dyn NodeHandler<T>> = handler;
        self.node
            .attach_handler(Arc::downgrade(&handler))
            .expect("signal already has a consumer; call multicast() first");
        let mut dw = signalflow_core::DeferredWork::new();
        successor
            .add_predecessor(Arc::clone(&self.node) as Arc<dyn signalflow_core::PredecessorHandle>, &mut dw)
            .expect("fresh successor cannot already have this predecessor");
        dw.run();
        let mut keep_alive = self.keep_alive;
        keep_alive.push(erase(handler));
        Signal::from_node_with(successor, keep_alive)
    }

    /// §7 "multicast": fans this signal out to any number of independent
    /// subscribers, each seeing its own node and activation burst.
    pub fn multicast(self, ctx: Arc<dyn ExecutionContext>, policy: CachePolicy) -> MultiSignal<T> {
        self.multicast_with(ctx, policy, None)
    }

    fn multicast_with(self, ctx: Arc<dyn ExecutionContext>, policy: CachePolicy, seed: Option<T>) -> MultiSignal<T> {
        let hub = MultiProcessor::new(ctx, policy);
        if let Some(initial) = seed {
            hub.seed_latest(initial);
        }
        let hub_handler: Arc<dyn NodeHandler<T>> = Arc::clone(&hub) as Arc<dyn NodeHandler<T>>;
        self.node
            .attach_handler(Arc::downgrade(&hub_handler))
            .expect("signal already has a consumer; call multicast() first");
        let mut keep_alive = self.keep_alive;
        keep_alive.push(erase(hub_handler));
        MultiSignal { hub, keep_alive }
    }

    /// §7 "continuous": multicast with `Latest` replay, seeded with
    /// `initial` so the first subscriber sees it before any value has flowed
    /// (§8 "`continuous(initial)`").
    pub fn continuous(self, ctx: Arc<dyn ExecutionContext>, initial: T) -> MultiSignal<T> {
        self.multicast_with(ctx, CachePolicy::Latest, Some(initial))
    }

    /// §7 "continuous_while_active": like `continuous`, but the cached
    /// value is dropped once no subscriber remains, when
    /// `discard_on_deactivate` is set.
    pub fn continuous_while_active(
        self,
        ctx: Arc<dyn ExecutionContext>,
        initial: T,
        discard_on_deactivate: bool,
    ) -> MultiSignal<T> {
        let policy = if discard_on_deactivate {
            CachePolicy::LatestWhileActive
        } else {
            CachePolicy::Latest
        };
        self.multicast_with(ctx, policy, Some(initial))
    }

    /// §7 "playback": multicast with `All` replay — every new subscriber
    /// sees the full history to date as its activation burst.
    pub fn playback(self, ctx: Arc<dyn ExecutionContext>) -> MultiSignal<T> {
        self.multicast(ctx, CachePolicy::All)
    }

    /// §7 "cache_until_active": buffers every value while no subscriber is
    /// attached, then replays the buffer to the first subscriber and
    /// forwards live from then on. `precached` leads the replayed burst
    /// before anything observed while inactive (§6 "cache_until_active(precached)").
    /// Unlike `playback`, this serves exactly one subscriber (it's a
    /// single-handler-slot relay, not a hub).
    pub fn cache_until_active(self, precached: Vec<T>) -> CacheUntilActiveSignal<T> {
        let cache = CacheUntilActive::new(precached);
        let cache_handler: Arc<dyn NodeHandler<T>> = Arc::clone(&cache) as Arc<dyn NodeHandler<T>>;
        self.node
            .attach_handler(Arc::downgrade(&cache_handler))
            .expect("signal already has a consumer; call multicast() first");
        let mut keep_alive = self.keep_alive;
        keep_alive.push(erase(cache_handler));
        CacheUntilActiveSignal { cache, keep_alive }
    }
}

fn attach_processor<T: Send + 'static, U: Clone + Send + 'static>(
    ctx: Arc<dyn ExecutionContext>,
    source: &Arc<SignalNode<T>>,
    successor: Arc<SignalNode<U>>,
    f: impl Fn(T) -> Next<U> + Send + Sync + 'static,
) -> KeepAlive {
    let self_id = source.id();
    let handler: Arc<dyn NodeHandler<T>> = Arc::new(ProcessorHandler::new(
        ctx,
        f,
        Arc::clone(&successor),
        self_id,
        Arc::downgrade(source),
    ));
    source
        .attach_handler(Arc::downgrade(&handler))
        .expect("signal already has a consumer; call multicast() first");
    let mut dw = signalflow_core::DeferredWork::new();
    successor
        .add_predecessor(Arc::clone(source) as Arc<dyn signalflow_core::PredecessorHandle>, &mut dw)
        .expect("fresh successor cannot already have this predecessor");
    dw.run();
    erase(handler)
}

/// Keeps a subscription's handler chain alive. Dropping this ends the
/// subscription; each handler's `Weak` lapses and its node stops delivering
/// to it on its next dispatch.
pub struct Subscription<T: Send + 'static> {
    node: Arc<SignalNode<T>>,
    _keep_alive: Vec<KeepAlive>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn unsubscribe(self) {
        let mut dw = signalflow_core::DeferredWork::new();
        self.node.disable(&mut dw);
        dw.run();
    }
}

/// A multicast hub: call `subscribe` any number of times, each returning an
/// independent [`Signal`] seeded per the hub's [`CachePolicy`].
pub struct MultiSignal<T: Clone + Send + 'static> {
    hub: Arc<MultiProcessor<T>>,
    keep_alive: Vec<KeepAlive>,
}

impl<T: Clone + Send + 'static> MultiSignal<T> {
    pub fn subscribe(&self) -> Signal<T> {
        Signal::from_node_with(self.hub.subscribe(), self.keep_alive.clone())
    }
}

/// The single-subscriber counterpart of [`MultiSignal`] for
/// `cache_until_active`.
pub struct CacheUntilActiveSignal<T: Clone + Send + 'static> {
    cache: Arc<CacheUntilActive<T>>,
    keep_alive: Vec<KeepAlive>,
}

impl<T: Clone + Send + 'static> CacheUntilActiveSignal<T> {
    pub fn attach(self) -> Signal<T> {
        let node = SignalNode::new_head("cache-until-active-subscriber");
        self.cache.attach(Arc::clone(&node));
        Signal::from_node_with(node, self.keep_alive)
    }
}

/// Attaches a terminal consumer with [`Direct`] execution — the common case
/// in tests and simple single-threaded embedders.
pub fn subscribe_direct<T: Clone + Send + 'static>(
    signal: Signal<T>,
    on_value: impl Fn(T) + Send + Sync + 'static,
    on_end: impl FnOnce(End) + Send + 'static,
) -> Subscription<T> {
    signal.subscribe(Arc::new(Direct), on_value, on_end)
}
