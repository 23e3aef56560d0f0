//! §6/§7 `multicast`, `cache_until_active`, `playback`, `continuous`: the
//! handler kinds that serve more than one successor by spawning a fresh
//! single-handler `SignalNode` per subscriber, rather than stretching the
//! single-handler-slot contract (§3 invariant 6).

use std::sync::{Arc, Mutex};

use crate::{
    context::ExecutionContext,
    deferred::DeferredWork,
    end::End,
    ids::PredecessorId,
    item::Item,
    node::{NodeHandler, SignalNode},
};

/// How a [`MultiProcessor`] replays history to a subscriber that joins after
/// values have already flowed (§7 item 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// New subscribers see nothing before they joined.
    None,
    /// New subscribers immediately receive the single latest value, if any.
    Latest,
    /// New subscribers receive every value seen so far, in order.
    All,
    /// Like `Latest`, but only while at least one subscriber is attached;
    /// the cache is dropped once the subscriber count reaches zero.
    LatestWhileActive,
    /// Caches nothing until the first subscriber arrives, then behaves like
    /// `All` from that point on (§7 "cache_until_active").
    FromFirstSubscriber,
}

struct Subscriber<T> {
    node: Arc<SignalNode<T>>,
    id: PredecessorId,
}

struct State<T: Clone> {
    subscribers: Vec<Subscriber<T>>,
    latest: Option<T>,
    all: Vec<T>,
    ended: Option<End>,
    caching_started: bool,
}

/// A single-predecessor, multi-successor hub. Upstream sees one handler
/// slot occupied; each `subscribe` call spawns its own downstream node that
/// receives a replayed burst (tagged as activation values) followed by live
/// forwarding.
pub struct MultiProcessor<T: Clone + Send + 'static> {
    ctx: Arc<dyn ExecutionContext>,
    policy: CachePolicy,
    state: Mutex<State<T>>,
}

impl<T: Clone + Send + 'static> MultiProcessor<T> {
    pub fn new(ctx: Arc<dyn ExecutionContext>, policy: CachePolicy) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            policy,
            state: Mutex::new(State {
                subscribers: Vec::new(),
                latest: None,
                all: Vec::new(),
                ended: None,
                caching_started: false,
            }),
        })
    }

    /// Seeds `Latest`/`LatestWhileActive`'s replay cache before any value has
    /// flowed through the hub, so the first subscriber sees `initial` instead
    /// of nothing (§8 "`continuous(initial)`"). A no-op for other policies.
    pub fn seed_latest(&self, initial: T) {
        if matches!(self.policy, CachePolicy::Latest | CachePolicy::LatestWhileActive) {
            self.state.lock().unwrap_or_else(|e| e.into_inner()).latest = Some(initial);
        }
    }

    /// Spawns a fresh node for a new subscriber, seeds it with whatever
    /// cached burst the policy dictates (as activation values), and
    /// registers it to receive live forwards.
    pub fn subscribe(self: &Arc<Self>) -> Arc<SignalNode<T>> {
        let node = SignalNode::new_head(std::any::type_name::<T>());
        let id = node.id();
        let mut dw = DeferredWork::new();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(self.policy, CachePolicy::FromFirstSubscriber) && !state.caching_started {
                state.caching_started = true;
            }
            match self.policy {
                CachePolicy::None => {}
                CachePolicy::Latest | CachePolicy::LatestWhileActive => {
                    if let Some(v) = &state.latest {
                        let _ = node.send(Item::Value(v.clone()), None, false);
                    }
                }
                CachePolicy::All | CachePolicy::FromFirstSubscriber => {
                    for v in &state.all {
                        let _ = node.send(Item::Value(v.clone()), None, false);
                    }
                }
            }
            if let Some(end) = &state.ended {
                let _ = node.send(Item::End(end.clone()), None, false);
            } else {
                state.subscribers.push(Subscriber {
                    node: Arc::clone(&node),
                    id: id.clone(),
                });
            }
        }
        dw.run();
        node
    }

    fn broadcast(&self, item: Item<T>, activated: bool) {
        let subscribers: Vec<_> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &item {
                Item::Value(v) => {
                    if matches!(
                        self.policy,
                        CachePolicy::Latest | CachePolicy::LatestWhileActive
                    ) {
                        state.latest = Some(v.clone());
                    }
                    if matches!(self.policy, CachePolicy::All)
                        || (matches!(self.policy, CachePolicy::FromFirstSubscriber) && state.caching_started)
                    {
                        state.all.push(v.clone());
                    }
                }
                Item::End(e) => {
                    state.ended = Some(e.clone());
                }
            }
            if matches!(self.policy, CachePolicy::LatestWhileActive) && state.subscribers.is_empty() {
                state.latest = None;
            }
            state.subscribers.iter().map(|s| Arc::clone(&s.node)).collect()
        };
        for node in subscribers {
            let _ = node.send(item.clone(), None, activated);
        }
    }

    pub fn ctx(&self) -> &Arc<dyn ExecutionContext> {
        &self.ctx
    }

    pub fn remove_subscriber(&self, id: &PredecessorId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers.retain(|s| &s.id != id);
        if matches!(self.policy, CachePolicy::LatestWhileActive) && state.subscribers.is_empty() {
            state.latest = None;
        }
    }
}

impl<T: Clone + Send + 'static> NodeHandler<T> for MultiProcessor<T> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        self.broadcast(item, activated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Direct;

    #[test]
    fn latest_policy_replays_last_value_to_new_subscriber() {
        let origin = SignalNode::<i32>::new_head("origin");
        let hub = MultiProcessor::new(Arc::new(Direct), CachePolicy::Latest);
        let hub_handler: Arc<dyn NodeHandler<i32>> = Arc::clone(&hub) as Arc<dyn NodeHandler<i32>>;
        origin.attach_handler(Arc::downgrade(&hub_handler)).unwrap();

        origin.send(Item::Value(42), None, true).unwrap();

        let sub_node = hub.subscribe();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let handler: Arc<dyn NodeHandler<i32>> = Arc::new(crate::handlers::OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        sub_node.attach_handler(Arc::downgrade(&handler)).unwrap();

        assert_eq!(*received.lock().unwrap(), vec![42]);
    }
}
