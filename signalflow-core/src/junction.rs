//! §6/§7 `junction`/`capture`: dynamically rebindable single-input relays.
//!
//! A `Junction` forwards whatever it's currently bound to. A `Capture`
//! additionally remembers the latest value/end out of band so a caller can
//! inspect it (`peek`/`get`) without subscribing.

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

/// Installed by `bind`'s public `on_end` parameter: fires instead of the
/// terminal being forwarded (§4.5), receiving the junction itself (so it can
/// rebind), the end that would otherwise have closed the successor, and a
/// freshly created input already wired as the junction's new predecessor for
/// the callback to drive.
pub type OnEnd<T> = Box<dyn FnOnce(&Arc<Junction<T>>, End, SignalInput<T>) + Send>;

/// Installed as the *source* node's handler: every value/end the source
/// emits is relayed into the junction's stable `successor` node, quoting
/// the source's own id and activation count so the successor's own
/// staleness check (§4.3) still applies.
struct ForwardToSuccessor<T: Clone + Send + 'static> {
    successor: Arc<SignalNode<T>>,
    self_id: PredecessorId,
    self_node: std::sync::Weak<SignalNode<T>>,
    junction: std::sync::Weak<Junction<T>>,
    /// Run on every value that passes through, out of band — used by
    /// `Capture` to cache the latest one for `peek` (§7 item 5).
    on_value: Option<Box<dyn Fn(&T) + Send + Sync>>,
    /// Run once, out of band, whenever an `End` passes through, in addition
    /// to forwarding — used by `Capture` to cache it (§7 item 5).
    on_end_tap: Mutex<Option<Box<dyn FnOnce(&End) + Send>>>,
    /// The public `bind(.., on_end)` redirect (§4.5): when set, an `End`
    /// triggers this instead of being forwarded to `successor`.
    on_end_redirect: Mutex<Option<OnEnd<T>>>,
}

impl<T: Clone + Send + 'static> NodeHandler<T> for ForwardToSuccessor<T> {
    fn deliver(&self, item: Item<T>, activated: bool, _dw: &mut DeferredWork) {
        match &item {
            Item::Value(v) => {
                if let Some(cb) = &self.on_value {
                    cb(v);
                }
            }
            Item::End(end) => {
                if let Some(cb) = self
                    .on_end_tap
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
                {
                    cb(end);
                }
                if let Some(redirect) = self
                    .on_end_redirect
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
                {
                    if let Some(junction) = self.junction.upgrade() {
                        let fresh_node = SignalNode::new_head("junction-reconnect");
                        let fresh_input = SignalInput::new(Arc::clone(&fresh_node));
                        // Silently rebinds to the fresh input before the
                        // callback gets it, so the successor never sees a
                        // gap — the whole point of redirecting instead of
                        // forwarding the terminal.
                        let _ = junction.bind_with_taps(&fresh_input, None, None, None);
                        redirect(&junction, end.clone(), fresh_input);
                    }
                    return;
                }
            }
        }
        let Some(origin) = self.self_node.upgrade() else {
            return;
        };
        let claimed = origin.activation_count();
        let _ = self
            .successor
            .send(item, Some((self.self_id.clone(), claimed)), activated);
    }
}

struct Bound<T: Send + 'static> {
    input: SignalInput<T>,
    // Keeps the forwarding handler's allocation alive for as long as the
    // source node holds a `Weak` to it (§3 invariant 6: a node's handler
    // slot is weak, so someone has to own the strong side).
    _handler: Arc<dyn NodeHandler<T>>,
}

/// A relay whose upstream connection can be replaced at any time (§7 item
/// 4). `successor` is the one stable node subscribers attach to; rebinding
/// only ever changes which source forwards into it.
pub struct Junction<T: Clone + Send + 'static> {
    current: Mutex<Option<Bound<T>>>,
    successor: Arc<SignalNode<T>>,
}

impl<T: Clone + Send + 'static> Junction<T> {
    pub fn new(successor: Arc<SignalNode<T>>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
            successor,
        })
    }

    /// Detaches the current source, if any, and drives the successor back
    /// to `Disabled` until the next `bind` (§7 item 4 "disconnect").
    pub fn disconnect(&self, dw: &mut DeferredWork) {
        let bound = self.current.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(bound) = bound {
            self.successor.remove_predecessor(&bound.input.node().id(), dw);
        }
    }

    /// Binds `source` as this junction's new upstream. If `on_end` is
    /// provided, it fires instead of forwarding the branch's terminal when
    /// the branch ends (§4.5); otherwise the terminal is forwarded as
    /// normal. Replaces any previously bound source.
    pub fn bind(self: &Arc<Self>, source: &SignalInput<T>, on_end: Option<OnEnd<T>>) -> Result<(), BindError<T>> {
        self.bind_with_taps(source, None, None, on_end)
    }

    /// Rebinds to the target most recently passed to `bind`, without naming
    /// a new one (§6 "rebind"). A no-op returning `Ok(())` if nothing has
    /// ever been bound.
    pub fn rebind(self: &Arc<Self>, on_end: Option<OnEnd<T>>) -> Result<(), BindError<T>> {
        let previous = {
            let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            current.as_ref().map(|b| b.input.clone())
        };
        match previous {
            Some(input) => self.bind(&input, on_end),
            None => Ok(()),
        }
    }

    /// Same as [`bind`](Self::bind), plus an `on_value`/`on_end_tap` pair run
    /// on every forwarded value/end regardless of the redirect outcome. Used
    /// by [`Capture`] to keep `peek`/`get_end` current without requiring its
    /// own subscriber.
    pub(crate) fn bind_with_taps(
        self: &Arc<Self>,
        source: &SignalInput<T>,
        on_value: Option<Box<dyn Fn(&T) + Send + Sync>>,
        on_end_tap: Option<Box<dyn FnOnce(&End) + Send>>,
        on_end_redirect: Option<OnEnd<T>>,
    ) -> Result<(), BindError<T>> {
        if source.is_ended() {
            return Err(BindError::Cancelled);
        }
        let source_node = Arc::clone(source.node());
        let self_id = source_node.id();
        let handler: Arc<dyn NodeHandler<T>> = Arc::new(ForwardToSuccessor {
            successor: Arc::clone(&self.successor),
            self_id: self_id.clone(),
            self_node: Arc::downgrade(&source_node),
            junction: Arc::downgrade(self),
            on_value,
            on_end_tap: Mutex::new(on_end_tap),
            on_end_redirect: Mutex::new(on_end_redirect),
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

        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let previous = current.replace(Bound {
            input: source.clone(),
            _handler: handler,
        });
        drop(current);
        if let Some(previous) = previous {
            let mut dw = DeferredWork::new();
            self.successor.remove_predecessor(&previous.input.node().id(), &mut dw);
            dw.run();
        }
        Ok(())
    }
}

/// A [`Junction`] plus out-of-band inspection of the latest value/end (§7
/// item 5 "out-of-band capture").
pub struct Capture<T: Clone + Send + 'static> {
    junction: Arc<Junction<T>>,
    latest: Mutex<(Option<T>, Option<End>)>,
    last_input: Mutex<Option<SignalInput<T>>>,
}

impl<T: Clone + Send + 'static> Capture<T> {
    pub fn new(successor: Arc<SignalNode<T>>) -> Arc<Self> {
        Arc::new(Self {
            junction: Junction::new(successor),
            latest: Mutex::new((None, None)),
            last_input: Mutex::new(None),
        })
    }

    pub fn bind(self: &Arc<Self>, source: &SignalInput<T>) -> Result<(), BindError<T>> {
        let this_value = Arc::clone(self);
        let this_end = Arc::clone(self);
        let result = self.junction.bind_with_taps(
            source,
            Some(Box::new(move |value: &T| {
                this_value.latest.lock().unwrap_or_else(|e| e.into_inner()).0 = Some(value.clone());
            })),
            Some(Box::new(move |end| {
                this_end.latest.lock().unwrap_or_else(|e| e.into_inner()).1 = Some(end.clone());
            })),
            None,
        );
        if result.is_ok() {
            *self.last_input.lock().unwrap_or_else(|e| e.into_inner()) = Some(source.clone());
        }
        result
    }

    /// Rebinds to the target most recently passed to `bind` (§6 "rebind"). A
    /// no-op returning `Ok(())` if nothing has ever been bound.
    pub fn rebind(self: &Arc<Self>) -> Result<(), BindError<T>> {
        let input = self.last_input.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match input {
            Some(input) => self.bind(&input),
            None => Ok(()),
        }
    }

    /// Resumes delivery on the most recently bound target (§6 "resume"). If
    /// `resend` is set, the latest captured value is delivered once as a
    /// prefix to the resumed stream before live forwarding continues (§8
    /// testable property).
    pub fn resume(self: &Arc<Self>, resend: bool) -> Result<(), BindError<T>> {
        let input = self.last_input.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(input) = input else {
            return Ok(());
        };
        self.bind(&input)?;
        if resend {
            let cached = self.latest.lock().unwrap_or_else(|e| e.into_inner()).0.clone();
            if let Some(v) = cached {
                let _ = self.junction.successor.send(Item::Value(v), None, false);
            }
        }
        Ok(())
    }

    pub fn disconnect(&self, dw: &mut DeferredWork) {
        self.junction.disconnect(dw);
    }

    pub fn peek(&self) -> Option<T> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).0.clone()
    }

    pub fn get_end(&self) -> Option<End> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).1.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Direct;
    use crate::handlers::OutputHandler;

    #[test]
    fn junction_forwards_after_bind_and_can_be_rebound() {
        let successor = SignalNode::<i32>::new_head("successor");
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let out: Arc<dyn NodeHandler<i32>> = Arc::new(OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();

        let junction = Junction::new(Arc::clone(&successor));
        let src_a = SignalInput::new(SignalNode::new_head("a"));
        junction.bind(&src_a, None).unwrap();
        src_a.send(1).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1]);

        let src_b = SignalInput::new(SignalNode::new_head("b"));
        junction.bind(&src_b, None).unwrap();
        src_b.send(2).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn on_end_redirect_fires_instead_of_forwarding_the_terminal() {
        let successor = SignalNode::<i32>::new_head("successor");
        let ended = Arc::new(Mutex::new(false));
        let ended2 = Arc::clone(&ended);
        let out: Arc<dyn NodeHandler<i32>> =
            Arc::new(OutputHandler::new(Arc::new(Direct), |_| {}, move |_| *ended2.lock().unwrap() = true));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();

        let junction = Junction::new(successor);
        let fired = Arc::new(Mutex::new(0));
        let fired2 = Arc::clone(&fired);
        let src = SignalInput::new(SignalNode::new_head("a"));
        junction
            .bind(
                &src,
                Some(Box::new(move |_junction, _end, _new_input| {
                    *fired2.lock().unwrap() += 1;
                })),
            )
            .unwrap();
        src.complete().unwrap();
        assert_eq!(*fired.lock().unwrap(), 1);
        assert!(!*ended.lock().unwrap(), "redirect must swallow the terminal");
    }

    #[test]
    fn rebind_reattaches_without_naming_a_new_source() {
        let successor = SignalNode::<i32>::new_head("successor");
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);
        let out: Arc<dyn NodeHandler<i32>> = Arc::new(OutputHandler::new(
            Arc::new(Direct),
            move |v| received2.lock().unwrap().push(v),
            |_| {},
        ));
        successor.attach_handler(Arc::downgrade(&out)).unwrap();

        let junction = Junction::new(successor);
        let src = SignalInput::new(SignalNode::new_head("a"));
        junction.bind(&src, None).unwrap();
        junction.disconnect(&mut DeferredWork::new());
        junction.rebind(None).unwrap();
        src.send(1).unwrap();
        assert_eq!(*received.lock().unwrap(), vec![1]);
    }
}
