//! §7 `cache_until_active`: buffers every value while inactive (no
//! subscriber attached yet), then replays the buffer as an activation burst
//! to the first subscriber and forwards live after that.

use std::sync::{Arc, Mutex};

use crate::{deferred::DeferredWork, end::End, item::Item, node::{NodeHandler, SignalNode}};

struct State<T> {
    buffered: Vec<T>,
    ended: Option<End>,
    subscriber: Option<Arc<SignalNode<T>>>,
}

/// The single-handler-slot counterpart of [`crate::multi_processor::MultiProcessor`]'s
/// `FromFirstSubscriber` policy, kept as its own type because it serves
/// exactly one successor and needs no broadcast bookkeeping.
pub struct CacheUntilActive<T: Send + 'static> {
    state: Mutex<State<T>>,
}

impl<T: Clone + Send + 'static> CacheUntilActive<T> {
    /// `pre` seeds the buffer so the first subscriber's activation burst is
    /// `pre ++ received_before_attach` (§6 "`cache_until_active(precached)`",
    /// §8 testable property).
    pub fn new(pre: Vec<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                buffered: pre,
                ended: None,
                subscriber: None,
            }),
        })
    }

    /// Attaches the (sole) downstream node, replaying the buffer to it as
    /// activation values before switching to live forwarding.
    pub fn attach(self: &Arc<Self>, node: Arc<SignalNode<T>>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for v in state.buffered.drain(..) {
            let _ = node.send(Item::Value(v), None, false);
        }
        if let Some(end) = state.ended.clone() {
            let _ = node.send(Item::End(end), None, false);
        } else {
            state.subscriber = Some(node);
        }
    }
}

impl<T: Clone + Send + 'static> NodeHandler<T> for CacheUntilActive<T> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.subscriber {
            Some(node) => {
                let node = Arc::clone(node);
                drop(state);
                let _ = node.send(item, None, activated);
            }
            None => match item {
                Item::Value(v) => state.buffered.push(v),
                Item::End(e) => state.ended = Some(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Direct;
    use crate::handlers::OutputHandler;

    #[test]
    fn buffers_until_attach_then_replays() {
        let origin = SignalNode::<i32>::new_head("origin");
        let cache = CacheUntilActive::new(Vec::new());
        let cache_handler: Arc<dyn NodeHandler<i32>> = Arc::clone(&cache) as Arc<dyn NodeHandler<i32>>;
        origin.attach_handler(Arc::downgrade(&cache_handler)).unwrap();

        origin.send(Item::Value(1), None, true).unwrap();
        origin.send(Item::Value(2), None, true).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let sub_node = SignalNode::new_head("sub");
        let out: Arc<dyn NodeHandler<i32>> = Arc::new(OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        sub_node.attach_handler(Arc::downgrade(&out)).unwrap();
        cache.attach(sub_node);

        assert_eq!(*received.lock().unwrap(), vec![1, 2]);

        origin.send(Item::Value(3), None, true).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn precached_values_lead_the_buffered_burst() {
        let origin = SignalNode::<i32>::new_head("origin");
        let cache = CacheUntilActive::new(vec![9]);
        let cache_handler: Arc<dyn NodeHandler<i32>> = Arc::clone(&cache) as Arc<dyn NodeHandler<i32>>;
        origin.attach_handler(Arc::downgrade(&cache_handler)).unwrap();

        origin.send(Item::Value(1), None, true).unwrap();
        origin.send(Item::Value(2), None, true).unwrap();
        origin.send(Item::Value(3), None, true).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let sub_node = SignalNode::new_head("sub");
        let out: Arc<dyn NodeHandler<i32>> = Arc::new(OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        sub_node.attach_handler(Arc::downgrade(&out)).unwrap();
        cache.attach(sub_node);

        assert_eq!(*received.lock().unwrap(), vec![9, 1, 2, 3]);
    }
}
