//! §6/§7 `create_multi_input`/`create_merged_input`: persistent, rebindable
//! fan-in. Any number of sources can be added or removed over the fan-in's
//! lifetime; each source gets its own `ForwardToFanIn` handler so sources
//! can come and go independently without disturbing the others.

use std::sync::{Arc, Mutex};

use crate::{
    deferred::DeferredWork,
    end::End,
    error::BindError,
    ids::PredecessorId,
    input::SignalInput,
    item::Item,
    node::{AttachError, NodeHandler, PredecessorHandle, SignalNode},
};

/// Governs what happens to the fan-in's own output when one of its sources
/// ends (§7 item 7 "merged input end propagation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndPropagation {
    /// A source ending never ends the fan-in; it's simply dropped from the
    /// active set.
    None,
    /// Only a non-`Complete` end (`Cancelled`/`Other`) on any source ends
    /// the fan-in, with that same end.
    Errors,
    /// Any source ending at all ends the fan-in, with that end.
    All,
}

struct ForwardToFanIn<T> {
    fan_in: Arc<MultiInput<T>>,
    self_id: PredecessorId,
    self_node: std::sync::Weak<SignalNode<T>>,
}

impl<T: Send + 'static> NodeHandler<T> for ForwardToFanIn<T> {
    fn deliver(&self, item: Item<T>, activated: bool, dw: &mut DeferredWork) {
        let Some(origin) = self.self_node.upgrade() else {
            return;
        };
        let claimed = origin.activation_count();
        match item {
            Item::Value(v) => {
                let _ = self
                    .fan_in
                    .successor
                    .send(Item::Value(v), Some((self.self_id.clone(), claimed)), activated);
            }
            Item::End(end) => {
                self.fan_in.source_ended(&self.self_id, end, dw);
            }
        }
    }
}

struct Source<T> {
    node: Arc<SignalNode<T>>,
    // Keeps the `ForwardToFanIn` handler's allocation alive (§3 invariant
    // 6: the source node's handler slot only holds it weakly).
    _handler: Arc<dyn NodeHandler<T>>,
}

struct State<T> {
    sources: Vec<(PredecessorId, Source<T>)>,
    closed: bool,
}

/// A persistent fan-in node: many sources forward into one stable
/// `successor`. Sources can be added and removed independently at any time
/// (§7 item 7), unlike [`crate::junction::Junction`], which replaces its one
/// source wholesale.
pub struct MultiInput<T: Send + 'static> {
    successor: Arc<SignalNode<T>>,
    policy: EndPropagation,
    state: Mutex<State<T>>,
    /// Emitted onto `successor` when the last tracked source ends and no new
    /// one has been added by then (§4.8 "on_last_input_closed").
    on_last_input_closed: Option<End>,
    /// Emitted onto `successor` if this fan-in is dropped while still
    /// attached — i.e. before `on_last_input_closed` (or `EndPropagation`)
    /// has already closed it (§4.8 "on_deinit").
    on_deinit: Option<End>,
}

impl<T: Send + 'static> MultiInput<T> {
    pub fn new(successor: Arc<SignalNode<T>>, policy: EndPropagation) -> Arc<Self> {
        Self::with_ends(successor, policy, None, None)
    }

    /// §6 "create_merged_input": like [`new`](Self::new), plus the two `End`
    /// values a merged input carries (§4.8).
    pub fn with_ends(
        successor: Arc<SignalNode<T>>,
        policy: EndPropagation,
        on_last_input_closed: Option<End>,
        on_deinit: Option<End>,
    ) -> Arc<Self> {
        Arc::new(Self {
            successor,
            policy,
            state: Mutex::new(State {
                sources: Vec::new(),
                closed: false,
            }),
            on_last_input_closed,
            on_deinit,
        })
    }

    /// Adds `source` to the active set. Returns the source's id, used later
    /// to remove it. Rejected with [`BindError::Cancelled`] if `source` has
    /// already sent its terminal (§6/§7 "Cancelled").
    pub fn add_source(self: &Arc<Self>, source: &SignalInput<T>) -> Result<PredecessorId, BindError<T>> {
        if source.is_ended() {
            return Err(BindError::Cancelled);
        }
        let source_node = Arc::clone(source.node());
        let self_id = source_node.id();
        let handler: Arc<dyn NodeHandler<T>> = Arc::new(ForwardToFanIn {
            fan_in: Arc::clone(self),
            self_id: self_id.clone(),
            self_node: Arc::downgrade(&source_node),
        });
        source_node
            .attach_handler(Arc::downgrade(&handler))
            .map_err(|e| match e {
                AttachError::Duplicate => BindError::Duplicate(source.clone()),
                AttachError::Loop => BindError::Loop,
            })?;

        let predecessor: Arc<dyn PredecessorHandle> = Arc::clone(&source_node);
        let mut dw = DeferredWork::new();
        let result = self.successor.add_predecessor(predecessor, &mut dw);
        dw.run();
        result.map_err(|e| match e {
            AttachError::Duplicate => BindError::Duplicate(source.clone()),
            AttachError::Loop => BindError::Loop,
        })?;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = false;
        state.sources.push((
            self_id.clone(),
            Source {
                node: source_node,
                _handler: handler,
            },
        ));
        Ok(self_id)
    }

    /// Removes a source without affecting the fan-in's own end state
    /// (§7 item 7: equivalent to the source completing with `None` policy).
    pub fn remove_source(&self, id: &PredecessorId, dw: &mut DeferredWork) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = state.sources.iter().position(|(sid, _)| sid == id) {
            let (_, source) = state.sources.remove(pos);
            self.successor.remove_predecessor(id, dw);
            drop(state);
            drop(source);
        }
    }

    fn source_ended(&self, id: &PredecessorId, end: End, _dw: &mut DeferredWork) {
        let (propagated_end, last_closed_end) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(pos) = state.sources.iter().position(|(sid, _)| sid == id) {
                state.sources.remove(pos);
            }
            let propagate = match self.policy {
                EndPropagation::None => false,
                EndPropagation::Errors => !end.is_complete(),
                EndPropagation::All => true,
            };
            let last = state.sources.is_empty() && !state.closed;
            let propagated = propagate.then_some(end);
            let last_closed = if last {
                self.on_last_input_closed.clone()
            } else {
                None
            };
            if propagated.is_some() || last_closed.is_some() {
                state.closed = true;
            }
            (propagated, last_closed)
        };
        if let Some(end) = propagated_end {
            let _ = self.successor.send(Item::End(end), None, false);
        } else if let Some(end) = last_closed_end {
            let _ = self.successor.send(Item::End(end), None, false);
        }
    }
}

impl<T: Send + 'static> Drop for MultiInput<T> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return;
        }
        let Some(end) = self.on_deinit.clone() else {
            return;
        };
        state.closed = true;
        drop(state);
        let _ = self.successor.send(Item::End(end), None, false);
    }
}

/// Convenience alias: `create_merged_input` (§6) is a `MultiInput` whose
/// values all share one type and whose default policy merges completions
/// transparently — distinguished from `MultiInput` only at the façade layer,
/// which is where the two builders diverge in API shape.
pub type MergedInput<T> = MultiInput<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Direct;
    use crate::handlers::OutputHandler;

    fn attach_collector(node: &Arc<SignalNode<i32>>) -> Arc<Mutex<Vec<i32>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let out: Arc<dyn NodeHandler<i32>> = Arc::new(OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        node.attach_handler(Arc::downgrade(&out)).unwrap();
        std::mem::forget(out);
        received
    }

    #[test]
    fn merges_values_from_several_sources() {
        let successor = SignalNode::<i32>::new_head("successor");
        let received = attach_collector(&successor);
        let fan_in = MultiInput::new(successor, EndPropagation::None);

        let a = SignalInput::new(SignalNode::new_head("a"));
        let b = SignalInput::new(SignalNode::new_head("b"));
        fan_in.add_source(&a).unwrap();
        fan_in.add_source(&b).unwrap();

        a.send(1).unwrap();
        b.send(2).unwrap();

        let mut got = received.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2]);
    }

    #[test]
    fn errors_policy_propagates_only_non_complete_end() {
        let successor = SignalNode::<i32>::new_head("successor");
        let ended = Arc::new(Mutex::new(None));
        let ended2 = Arc::clone(&ended);
        let out: Arc<dyn NodeHandler<i32>> =
            Arc::new(OutputHandler::new(Arc::new(Direct), |_| {}, move |e| *ended2.lock().unwrap() = Some(e)));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();
        std::mem::forget(out);

        let fan_in = MultiInput::new(successor, EndPropagation::Errors);
        let a = SignalInput::new(SignalNode::new_head("a"));
        let b = SignalInput::new(SignalNode::new_head("b"));
        fan_in.add_source(&a).unwrap();
        fan_in.add_source(&b).unwrap();

        a.complete().unwrap();
        assert!(ended.lock().unwrap().is_none(), "Complete alone must not propagate");

        b.end(End::Cancelled).unwrap();
        assert_eq!(*ended.lock().unwrap(), Some(End::Cancelled));
    }

    #[test]
    fn on_last_input_closed_fires_once_the_active_set_is_empty() {
        let successor = SignalNode::<i32>::new_head("successor");
        let ended = Arc::new(Mutex::new(None));
        let ended2 = Arc::clone(&ended);
        let out: Arc<dyn NodeHandler<i32>> =
            Arc::new(OutputHandler::new(Arc::new(Direct), |_| {}, move |e| *ended2.lock().unwrap() = Some(e)));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();
        std::mem::forget(out);

        let fan_in = MultiInput::with_ends(successor, EndPropagation::None, Some(End::Complete), None);
        let a = SignalInput::new(SignalNode::new_head("a"));
        let b = SignalInput::new(SignalNode::new_head("b"));
        fan_in.add_source(&a).unwrap();
        fan_in.add_source(&b).unwrap();

        a.complete().unwrap();
        assert!(ended.lock().unwrap().is_none(), "one source closing must not fire it");

        b.complete().unwrap();
        assert_eq!(*ended.lock().unwrap(), Some(End::Complete));
    }

    #[test]
    fn on_deinit_fires_when_dropped_while_still_attached() {
        let successor = SignalNode::<i32>::new_head("successor");
        let ended = Arc::new(Mutex::new(None));
        let ended2 = Arc::clone(&ended);
        let out: Arc<dyn NodeHandler<i32>> =
            Arc::new(OutputHandler::new(Arc::new(Direct), |_| {}, move |e| *ended2.lock().unwrap() = Some(e)));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();
        std::mem::forget(out);

        let fan_in = MultiInput::with_ends(successor, EndPropagation::None, None, Some(End::Cancelled));
        let a = SignalInput::new(SignalNode::new_head("a"));
        fan_in.add_source(&a).unwrap();

        drop(fan_in);
        assert_eq!(*ended.lock().unwrap(), Some(End::Cancelled));
    }

    #[test]
    fn on_deinit_is_suppressed_once_already_closed() {
        let successor = SignalNode::<i32>::new_head("successor");
        let ended = Arc::new(Mutex::new(None));
        let ended2 = Arc::clone(&ended);
        let out: Arc<dyn NodeHandler<i32>> =
            Arc::new(OutputHandler::new(Arc::new(Direct), |_| {}, move |e| *ended2.lock().unwrap() = Some(e)));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();
        std::mem::forget(out);

        let fan_in = MultiInput::with_ends(successor, EndPropagation::All, None, Some(End::Cancelled));
        let a = SignalInput::new(SignalNode::new_head("a"));
        fan_in.add_source(&a).unwrap();

        a.complete().unwrap();
        assert_eq!(*ended.lock().unwrap(), Some(End::Complete));

        drop(fan_in);
        assert_eq!(*ended.lock().unwrap(), Some(End::Complete), "on_deinit must not overwrite an already-sent end");
    }
}
