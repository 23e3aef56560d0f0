//! §6/§7 `junction`/`capture`/`create_multi_input`/`create_merged_input`:
//! the façade over `signalflow-core`'s dynamically rebindable node kinds.

use std::sync::Arc;

use signalflow_core::{
    BindError, Capture as CoreCapture, DeferredWork, End, EndPropagation, Junction as CoreJunction,
    MultiInput as CoreMultiInput, OnEnd, PredecessorId, SignalInput, SignalNode,
};

use crate::operators::Signal;

/// §7 "junction": a relay whose source can be rebound at any time.
pub struct Junction<T: Clone + Send + 'static> {
    inner: Arc<CoreJunction<T>>,
    successor: Arc<SignalNode<T>>,
}

impl<T: Clone + Send + 'static> Junction<T> {
    pub fn new() -> Self {
        let successor = SignalNode::new_output("junction");
        Self {
            inner: CoreJunction::new(Arc::clone(&successor)),
            successor,
        }
    }

    /// The signal downstream consumers attach to. Stable across rebinds.
    pub fn signal(&self) -> Signal<T> {
        Signal::from_node(Arc::clone(&self.successor))
    }

    /// Rebinds to `source`, replacing any previously bound source. If
    /// `on_end` is given, it fires instead of forwarding the bound branch's
    /// terminal (§4.5), receiving the junction, the end, and a fresh input
    /// already wired in as the new source for the callback to drive.
    pub fn bind(&self, source: &SignalInput<T>, on_end: Option<OnEnd<T>>) -> Result<(), BindError<T>> {
        self.inner.bind(source, on_end)
    }

    /// Rebinds to the target most recently passed to `bind`, without naming
    /// a new one (§6 "rebind"). A no-op if nothing has ever been bound.
    pub fn rebind(&self, on_end: Option<OnEnd<T>>) -> Result<(), BindError<T>> {
        self.inner.rebind(on_end)
    }

    pub fn disconnect(&self) {
        let mut dw = DeferredWork::new();
        self.inner.disconnect(&mut dw);
        dw.run();
    }
}

impl<T: Clone + Send + 'static> Default for Junction<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// §7 "capture": a [`Junction`] plus out-of-band inspection of the latest
/// value/end via `peek`/`get_end`, without needing a subscription.
pub struct Capture<T: Clone + Send + 'static> {
    inner: Arc<CoreCapture<T>>,
    successor: Arc<SignalNode<T>>,
}

impl<T: Clone + Send + 'static> Capture<T> {
    pub fn new() -> Self {
        let successor = SignalNode::new_output("capture");
        Self {
            inner: CoreCapture::new(Arc::clone(&successor)),
            successor,
        }
    }

    pub fn signal(&self) -> Signal<T> {
        Signal::from_node(Arc::clone(&self.successor))
    }

    pub fn bind(&self, source: &SignalInput<T>) -> Result<(), BindError<T>> {
        self.inner.bind(source)
    }

    /// Rebinds to the target most recently passed to `bind` (§6 "rebind"). A
    /// no-op if nothing has ever been bound.
    pub fn rebind(&self) -> Result<(), BindError<T>> {
        self.inner.rebind()
    }

    /// Resumes delivery on the most recently bound target (§6 "resume"). If
    /// `resend` is set, the latest captured value is redelivered once as a
    /// prefix before live forwarding continues.
    pub fn resume(&self, resend: bool) -> Result<(), BindError<T>> {
        self.inner.resume(resend)
    }

    pub fn disconnect(&self) {
        let mut dw = DeferredWork::new();
        self.inner.disconnect(&mut dw);
        dw.run();
    }

    pub fn peek(&self) -> Option<T> {
        self.inner.peek()
    }

    pub fn get_end(&self) -> Option<End> {
        self.inner.get_end()
    }
}

impl<T: Clone + Send + 'static> Default for Capture<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// §7 "create_multi_input": persistent fan-in where sources can be added
/// and removed independently over the fan-in's lifetime.
pub struct MultiInputSignal<T: Send + 'static> {
    inner: Arc<CoreMultiInput<T>>,
    successor: Arc<SignalNode<T>>,
}

impl<T: Clone + Send + 'static> MultiInputSignal<T> {
    pub fn new(policy: EndPropagation) -> Self {
        Self::with_ends(policy, None, None)
    }

    /// §6 "create_merged_input": like [`new`](Self::new), plus the two ends a
    /// merged input carries (§4.8) — `on_last_input_closed` fires when the
    /// active source count drops to zero, `on_deinit` fires if this fan-in is
    /// dropped while still attached.
    pub fn with_ends(policy: EndPropagation, on_last_input_closed: Option<End>, on_deinit: Option<End>) -> Self {
        let successor = SignalNode::new_output("multi-input");
        Self {
            inner: CoreMultiInput::with_ends(Arc::clone(&successor), policy, on_last_input_closed, on_deinit),
            successor,
        }
    }

    pub fn signal(&self) -> Signal<T> {
        Signal::from_node(Arc::clone(&self.successor))
    }

    pub fn add_source(&self, source: &SignalInput<T>) -> Result<PredecessorId, BindError<T>> {
        self.inner.add_source(source)
    }

    pub fn remove_source(&self, id: &PredecessorId) {
        let mut dw = DeferredWork::new();
        self.inner.remove_source(id, &mut dw);
        dw.run();
    }
}

/// §6 "create_merged_input": a [`MultiInputSignal`] whose sources share one
/// type and whose sends merge transparently; distinguished from
/// `create_multi_input` only by the caller's intent, not by mechanism.
/// `on_last_input_closed` fires when the active source count drops to zero;
/// `on_deinit` fires if the merged input is dropped while still attached.
pub fn create_merged_input<T: Clone + Send + 'static>(
    on_last_input_closed: Option<End>,
    on_deinit: End,
) -> MultiInputSignal<T> {
    MultiInputSignal::with_ends(EndPropagation::None, on_last_input_closed, Some(on_deinit))
}
