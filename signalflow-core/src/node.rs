//! §3 Data Model / §4.3-§4.4: the per-node queue, delivery state machine,
//! and the `send` algorithm that is this crate's reason for existing.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tracing::{debug, error, trace};

use crate::{
    deferred::DeferredWork,
    error::SendError,
    ids::{ActivationCount, PredecessorId},
    item::Item,
};

/// §3 `delivery`. Transitions are the sole driver of activation-count
/// changes (§3 invariant 5, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Disabled,
    /// `n` activation items have been accepted into the activation prefix
    /// of the queue so far (§3 invariant 4).
    Synchronous(usize),
    Normal,
}

impl Delivery {
    pub fn is_disabled(self) -> bool {
        matches!(self, Delivery::Disabled)
    }
}

/// What a node calls when it has an item ready to hand off (§4.5).
///
/// This is the single slot a node holds weakly (§3 invariant 6): "a node has
/// at most one handler". Fan-out to several subscribers is *not* done by
/// attaching several handlers to one node — it's done by
/// [`crate::multi_processor::MultiProcessor`] spawning a fresh
/// single-handler node per listener.
pub trait NodeHandler<T>: Send + Sync {
    /// Delivers one item. Called with no node mutex held (§3 invariant 1).
    ///
    /// `activated` is the stamp the *origin* node attaches to this item:
    /// `false` while the origin is still in its `Synchronous` burst (this is
    /// an activation value), `true` once the origin has reached `Normal`.
    fn deliver(&self, item: Item<T>, activated: bool, dw: &mut DeferredWork);
}

/// Error from [`SignalNode::attach_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    /// The node already has a live handler (§3 invariant 6).
    #[error("node already has a handler attached")]
    Duplicate,
    /// Attaching would create a predecessor cycle (§4.6, §5).
    #[error("attaching would create a predecessor cycle")]
    Loop,
}

/// Type-erased identity + transitive-predecessor walk used for loop
/// detection across differently-typed nodes (§3 invariant 7, §5).
///
/// We don't physically fuse node mutexes for "vertical sharing" (see
/// `DESIGN.md`); this trait instead compares *node* identities, which is
/// sufficient to reject cycles.
pub trait PredecessorHandle: Send + Sync {
    fn id(&self) -> PredecessorId;
    fn transitive_ids(&self) -> Vec<PredecessorId>;
    fn notify_removed(&self, dw: &mut DeferredWork);
}

struct PrecedingEntry {
    predecessor: Arc<dyn PredecessorHandle>,
    order: u64,
}

struct QueuedItem<T> {
    item: Item<T>,
    origin: Option<(PredecessorId, ActivationCount)>,
    /// True iff this item belongs to the node's activation burst (§3
    /// invariant 4) and should be relayed onward with `activated = false`.
    is_activation: bool,
}

struct Inner<T> {
    delivery: Delivery,
    activation_count: ActivationCount,
    preceding: Vec<PrecedingEntry>,
    preceding_count: u64,
    handler: Option<Weak<dyn NodeHandler<T>>>,
    queue: VecDeque<QueuedItem<T>>,
    hold_count: u8,
    item_processing: bool,
}

/// The per-node queue, delivery state, activation count, predecessor set
/// and handler slot of §3.
pub struct SignalNode<T> {
    id: PredecessorId,
    name: &'static str,
    inner: Mutex<Inner<T>>,
}

impl<T> std::fmt::Debug for SignalNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("SignalNode")
            .field("name", &self.name)
            .field("delivery", &inner.delivery)
            .field("activation_count", &inner.activation_count)
            .field("preceding", &inner.preceding.len())
            .field("queue_len", &inner.queue.len())
            .finish()
    }
}

impl<T: Send + 'static> SignalNode<T> {
    /// Creates a graph head: ready with `activation_count = 1`, no
    /// predecessors, never `Disabled` (§3 "Lifecycle").
    pub fn new_head(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id: PredecessorId::new(),
            name,
            inner: Mutex::new(Inner {
                delivery: Delivery::Normal,
                activation_count: 1,
                preceding: Vec::new(),
                preceding_count: 0,
                handler: None,
                queue: VecDeque::new(),
                hold_count: 0,
                item_processing: false,
            }),
        })
    }

    /// Creates a processor output: initially inactive (`Disabled`) until a
    /// predecessor is attached (§3 "Lifecycle").
    pub fn new_output(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id: PredecessorId::new(),
            name,
            inner: Mutex::new(Inner {
                delivery: Delivery::Disabled,
                activation_count: 0,
                preceding: Vec::new(),
                preceding_count: 0,
                handler: None,
                queue: VecDeque::new(),
                hold_count: 0,
                item_processing: false,
            }),
        })
    }

    pub fn id(&self) -> PredecessorId {
        self.id.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn activation_count(&self) -> ActivationCount {
        self.lock().activation_count
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().delivery.is_disabled()
    }

    /// Walks this node's own predecessor set transitively (§4.6 loop
    /// detection, §5 "Loop detection"): every ancestor id reachable from
    /// here, not just direct predecessors. Safe against cycles because this
    /// is exactly the check that prevents one from ever being formed.
    pub(crate) fn transitive_ids(&self) -> Vec<PredecessorId> {
        let inner = self.lock();
        let mut ids = Vec::with_capacity(inner.preceding.len());
        for entry in &inner.preceding {
            ids.push(entry.predecessor.id());
            ids.extend(entry.predecessor.transitive_ids());
        }
        ids
    }

    // ---- §4.5 handler attach/detach ----------------------------------

    /// Attaches `handler` as this node's sole consumer (§4.5, §4.6 step 2).
    pub fn attach_handler(&self, handler: Weak<dyn NodeHandler<T>>) -> Result<(), AttachError> {
        let mut inner = self.lock();
        if let Some(existing) = &inner.handler {
            if existing.strong_count() > 0 {
                return Err(AttachError::Duplicate);
            }
        }
        inner.handler = Some(handler);
        Ok(())
    }

    pub fn detach_handler(&self) {
        self.lock().handler = None;
    }

    // ---- §4.6 adding / removing predecessors -------------------------

    /// Adds `predecessor` to this node's `preceding` set (§4.6).
    ///
    /// If this is the node's first predecessor and it was `Disabled`,
    /// transitions `Disabled -> Synchronous(0)` and bumps the activation
    /// count, then schedules (via `dw`) the `Synchronous -> Normal`
    /// follow-up once `on_activated` has had a chance to seed any cached
    /// burst. Loop detection walks `predecessor`'s transitive ids against
    /// this node's own id plus its existing predecessors' ids.
    pub fn add_predecessor(
        self: &Arc<Self>,
        predecessor: Arc<dyn PredecessorHandle>,
        dw: &mut DeferredWork,
    ) -> Result<bool, AttachError> {
        let mut inner = self.lock();

        if predecessor.id() == self.id || predecessor.transitive_ids().contains(&self.id) {
            error!(node = self.name, "rejected predecessor: would create a cycle");
            drop(inner);
            // §7 item 4 / §5 "Loop detection": a cycle is a programmer fault,
            // not a recoverable condition — the caller gets `Loop` back to
            // unwind cleanly, but the graph has already been asked to do
            // something it can never honor. The panic runs from `dw`, after
            // every node mutex involved here has been released.
            let name = self.name;
            dw.push(move || panic!("cycle detected while attaching a predecessor to `{name}`"));
            return Err(AttachError::Loop);
        }

        let order = inner.preceding_count;
        inner.preceding_count += 1;
        inner.preceding.push(PrecedingEntry {
            predecessor,
            order,
        });

        let is_first = inner.preceding.len() == 1;
        let became_active = is_first && inner.delivery.is_disabled();
        if became_active {
            inner.activation_count += 1;
            inner.delivery = Delivery::Synchronous(0);
            let claimed = inner.activation_count;
            debug!(
                node = self.name,
                activation_count = claimed,
                "Disabled -> Synchronous(0)"
            );
            let this = Arc::clone(self);
            dw.push_with(move |dw| this.try_complete_activation(claimed, dw));
        }
        Ok(became_active)
    }

    /// §4.6 step 3 follow-up: if still at the claimed activation count,
    /// completes `Synchronous(n) -> Normal`. A no-op if the node moved on
    /// (reconnected again) before this ran.
    pub fn try_complete_activation(self: &Arc<Self>, claimed: ActivationCount, dw: &mut DeferredWork) {
        let mut inner = self.lock();
        if inner.activation_count != claimed {
            return;
        }
        if let Delivery::Synchronous(_) = inner.delivery {
            inner.delivery = Delivery::Normal;
            debug!(node = self.name, "Synchronous -> Normal");
            drop(inner);
            self.resume_if_possible(dw);
        }
    }

    /// §4.7 `remove_without_interruption`: yanks exactly this predecessor,
    /// notifies it, does not bump the activation count.
    pub fn remove_predecessor(&self, id: &PredecessorId, dw: &mut DeferredWork) {
        let mut inner = self.lock();
        if let Some(pos) = inner.preceding.iter().position(|e| &e.predecessor.id() == id) {
            let entry = inner.preceding.remove(pos);
            drop(inner);
            entry.predecessor.notify_removed(dw);
        }
    }

    /// §4.7 `remove_all`: removes every predecessor, bumps the activation
    /// count, and discards the queue (extended-lifetime release via `dw`).
    pub fn remove_all_predecessors(&self, dw: &mut DeferredWork) {
        let mut inner = self.lock();
        let removed: Vec<_> = inner.preceding.drain(..).collect();
        inner.activation_count += 1;
        let discarded: Vec<_> = inner.queue.drain(..).collect();
        if !removed.is_empty() {
            debug!(node = self.name, "remove_all: activation count bumped");
        }
        drop(inner);
        for entry in removed {
            entry.predecessor.notify_removed(dw);
        }
        dw.push(move || drop(discarded));
    }

    /// Forces `Disabled`, invalidating the queue and resetting `hold_count`
    /// (§4.4). Used by `deinit`/`detach` (§4.5) and `Capture`'s re-entry
    /// into capturing mode.
    pub fn disable(&self, dw: &mut DeferredWork) {
        let mut inner = self.lock();
        if inner.delivery.is_disabled() {
            return;
        }
        inner.delivery = Delivery::Disabled;
        inner.activation_count += 1;
        inner.hold_count = 0;
        let discarded: Vec<_> = inner.queue.drain(..).collect();
        drop(inner);
        dw.push(move || drop(discarded));
    }

    // ---- §4.4 hold/unblock --------------------------------------------

    /// A handler retains a continuation across asynchronous work (§4.4,
    /// §5 "Suspension points").
    pub fn block(&self) {
        let mut inner = self.lock();
        debug_assert!(inner.hold_count < 2);
        inner.hold_count += 1;
    }

    /// Releases a `block`; resumes draining if nothing else blocks.
    pub fn unblock(self: &Arc<Self>, dw: &mut DeferredWork) {
        {
            let mut inner = self.lock();
            if inner.hold_count > 0 {
                inner.hold_count -= 1;
            }
        }
        self.resume_if_possible(dw);
    }

    fn resume_if_possible(self: &Arc<Self>, dw: &mut DeferredWork) {
        let should_drain = {
            let inner = self.lock();
            inner.hold_count == 0 && !inner.item_processing && !inner.queue.is_empty()
        };
        if should_drain {
            self.drain(dw);
        }
    }

    // ---- §4.3 send ------------------------------------------------------

    /// §4.3: validates the sender, enqueues or dispatches synchronously.
    ///
    /// `origin`: `Some((predecessor_id, claimed_activation_count))` for
    /// every send except from a graph head's own [`crate::input::SignalInput`]
    /// (which has no predecessor to validate against).
    /// `sender_activated`: whether the sender has itself moved past its own
    /// `Synchronous` phase (i.e. this item is not one of the sender's
    /// activation values).
    pub fn send(
        self: &Arc<Self>,
        item: Item<T>,
        origin: Option<(PredecessorId, ActivationCount)>,
        sender_activated: bool,
    ) -> Result<(), SendError> {
        let mut dw = DeferredWork::new();
        let result = self.send_with(&mut dw, item, origin, sender_activated);
        dw.run();
        result
    }

    pub(crate) fn send_with(
        self: &Arc<Self>,
        dw: &mut DeferredWork,
        item: Item<T>,
        origin: Option<(PredecessorId, ActivationCount)>,
        sender_activated: bool,
    ) -> Result<(), SendError> {
        let mut inner = self.lock();

        if let Some((ref pred_id, claimed)) = origin {
            let matches = inner
                .preceding
                .iter()
                .any(|e| &e.predecessor.id() == pred_id)
                && inner.activation_count == claimed;
            if !matches {
                trace!(node = self.name, "send rejected: stale (predecessor, activation_count)");
                return Err(SendError::Disconnected);
            }
        }

        match inner.delivery {
            Delivery::Disabled => {
                trace!(node = self.name, "send rejected: disabled");
                Err(SendError::Inactive)
            }
            Delivery::Synchronous(n) => {
                if sender_activated {
                    inner.queue.push_back(QueuedItem {
                        item,
                        origin,
                        is_activation: false,
                    });
                    Ok(())
                } else if n == 0 && inner.hold_count == 0 && !inner.item_processing {
                    inner.delivery = Delivery::Synchronous(1);
                    drop(inner);
                    self.dispatch_now(dw, item, false);
                    Ok(())
                } else {
                    inner.queue.insert(
                        n,
                        QueuedItem {
                            item,
                            origin,
                            is_activation: true,
                        },
                    );
                    inner.delivery = Delivery::Synchronous(n + 1);
                    Ok(())
                }
            }
            Delivery::Normal => {
                if inner.hold_count == 0 && !inner.item_processing && inner.queue.is_empty() {
                    drop(inner);
                    self.dispatch_now(dw, item, true);
                    Ok(())
                } else {
                    inner.queue.push_back(QueuedItem {
                        item,
                        origin,
                        is_activation: false,
                    });
                    Ok(())
                }
            }
        }
    }

    /// Dispatch path (§4.3 steps 4-6): no handler means `Inactive`;
    /// otherwise marks `item_processing`, releases the lock, and calls the
    /// handler — never while holding the mutex (§3 invariant 1).
    fn dispatch_now(self: &Arc<Self>, dw: &mut DeferredWork, item: Item<T>, activated: bool) {
        let handler = {
            let mut inner = self.lock();
            let handler = inner.handler.as_ref().and_then(Weak::upgrade);
            if handler.is_none() {
                // No live handler: treat as inactive, and since we already
                // claimed a dispatch slot, fall back to draining normally
                // (the item is simply dropped, matching §7 item 1: ends and
                // values are never silently duplicated, only dropped when
                // truly undeliverable).
                return;
            }
            inner.item_processing = true;
            handler
        };
        let Some(handler) = handler else { return };
        let this = Arc::clone(self);
        dw.push_with(move |dw| {
            handler.deliver(item, activated, dw);
            this.after_dispatch(dw);
        });
    }

    /// After a handler call returns, clears `item_processing` and resumes
    /// draining (§4.3 step 5 `specialized_sync_pop`, generalized to every
    /// context rather than only `Direct`).
    fn after_dispatch(self: &Arc<Self>, dw: &mut DeferredWork) {
        {
            let mut inner = self.lock();
            inner.item_processing = false;
        }
        self.resume_if_possible(dw);
    }

    /// Drains the queue under brief lock acquisitions until empty or
    /// blocked (§4.3 step 5).
    fn drain(self: &Arc<Self>, dw: &mut DeferredWork) {
        loop {
            let (queued, handler) = {
                let mut inner = self.lock();
                if inner.hold_count > 0 || inner.item_processing {
                    return;
                }
                let Some(queued) = inner.queue.pop_front() else {
                    return;
                };
                if let Delivery::Synchronous(n) = inner.delivery {
                    inner.delivery = Delivery::Synchronous(n.saturating_sub(1));
                }
                let Some(handler) = inner.handler.as_ref().and_then(Weak::upgrade) else {
                    // No live handler: drop this item and keep draining —
                    // matches `dispatch_now`'s treatment of the same case.
                    continue;
                };
                inner.item_processing = true;
                (queued, handler)
            };
            let activated = !queued.is_activation;
            let this = Arc::clone(self);
            dw.push_with(move |dw| {
                handler.deliver(queued.item, activated, dw);
                this.after_dispatch(dw);
            });
            // One item scheduled is enough for this call: the mutex must
            // not be held across the handler call, and `after_dispatch`
            // (deferred above) resumes draining once it returns.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct Collector<T>(Arc<StdMutex<Vec<(bool, Item<T>)>>>);
    impl<T: Send + 'static + Clone> NodeHandler<T> for Collector<T> {
        fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
            self.0.lock().unwrap().push((activated, item));
        }
    }

    #[test]
    fn boundary_scenario_1_fifo_to_terminal() {
        let node = SignalNode::<i32>::new_head("head");
        let out = Arc::new(StdMutex::new(Vec::new()));
        let handler: Arc<dyn NodeHandler<i32>> = Arc::new(Collector(Arc::clone(&out)));
        node.attach_handler(Arc::downgrade(&handler)).unwrap();

        node.send(Item::Value(1), None, true).unwrap();
        node.send(Item::Value(2), None, true).unwrap();
        node.send(Item::End(crate::end::End::Complete), None, true)
            .unwrap();

        let out = out.lock().unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0].1, Item::Value(1)));
        assert!(matches!(out[1].1, Item::Value(2)));
        assert!(matches!(out[2].1, Item::End(crate::end::End::Complete)));
    }

    #[test]
    fn disabled_node_rejects_sends() {
        let node = SignalNode::<i32>::new_output("out");
        assert_eq!(node.send(Item::Value(1), None, true), Err(SendError::Inactive));
    }

    #[test]
    fn stale_activation_count_is_disconnected() {
        let successor = SignalNode::<i32>::new_output("succ");
        let mut dw = DeferredWork::new();
        struct Dummy(PredecessorId);
        impl PredecessorHandle for Dummy {
            fn id(&self) -> PredecessorId {
                self.0.clone()
            }
            fn transitive_ids(&self) -> Vec<PredecessorId> {
                Vec::new()
            }
            fn notify_removed(&self, _dw: &mut DeferredWork) {}
        }
        let pred_id = PredecessorId::new();
        successor
            .add_predecessor(Arc::new(Dummy(pred_id.clone())), &mut dw)
            .unwrap();
        dw.run();
        let stale_count = successor.activation_count() - 1;
        assert_eq!(
            successor.send(Item::Value(1), Some((pred_id, stale_count)), false),
            Err(SendError::Disconnected)
        );
    }

    #[test]
    fn transitive_cycle_through_an_intermediate_node_is_rejected() {
        let a = SignalNode::<i32>::new_head("a");
        let b = SignalNode::<i32>::new_output("b");
        let c = SignalNode::<i32>::new_output("c");
        let mut dw = DeferredWork::new();

        b.add_predecessor(Arc::clone(&a) as Arc<dyn PredecessorHandle>, &mut dw)
            .unwrap();
        c.add_predecessor(Arc::clone(&b) as Arc<dyn PredecessorHandle>, &mut dw)
            .unwrap();
        dw.run();

        let mut dw = DeferredWork::new();
        let result = a.add_predecessor(Arc::clone(&c) as Arc<dyn PredecessorHandle>, &mut dw);
        assert_eq!(result, Err(AttachError::Loop));

        // §7 item 4 / §5 "Loop detection": the recoverable error above is
        // paired with a non-recoverable fault, raised once the deferred work
        // runs outside any node mutex.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dw.run()));
        assert!(outcome.is_err(), "cycle detection must also schedule a panic");
    }

    #[test]
    fn concurrent_senders_preserve_at_most_once_delivery() {
        let node = SignalNode::<i32>::new_head("head");
        let out = Arc::new(StdMutex::new(Vec::new()));
        let handler: Arc<dyn NodeHandler<i32>> = Arc::new(Collector(Arc::clone(&out)));
        node.attach_handler(Arc::downgrade(&handler)).unwrap();

        let mut threads = Vec::new();
        for i in 0..8 {
            let node = Arc::clone(&node);
            threads.push(std::thread::spawn(move || {
                node.send(Item::Value(i), None, true).unwrap();
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        let out = out.lock().unwrap();
        assert_eq!(out.len(), 8, "every send delivered exactly once");
    }
}
