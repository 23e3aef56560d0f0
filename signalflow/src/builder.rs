//! §6 `create`/`generate`/`preclosed`: ways to originate a [`Signal`].

use std::sync::Arc;

use signalflow_core::{End, ExecutionContext, Item, SignalInput, SignalNode};

use crate::operators::Signal;

/// Creates a fresh head and its producer handle. The signal is active
/// immediately (graph heads are never `Disabled`, §3 "Lifecycle").
pub fn create<T: Clone + Send + 'static>() -> (SignalInput<T>, Signal<T>) {
    let node = SignalNode::new_head("create");
    let signal = Signal::from_node(Arc::clone(&node));
    (SignalInput::new(node), signal)
}

/// Creates a signal and immediately runs `activate` with its producer
/// handle, through `ctx` (§6 "generate"). Typical use: seed one or more
/// activation values synchronously before returning.
///
/// `activate` runs exactly once, when the signal is created — not once per
/// `Disabled` → active transition. A graph head never leaves its initial
/// active state in this engine (§3 "Lifecycle": heads have
/// `activation_count = 1` from construction and are never `Disabled`), so
/// there is no later transition for a revocable per-activation notifier to
/// key off; see `new_input_signal` in DESIGN.md for the full reasoning.
pub fn generate<T: Clone + Send + 'static>(
    ctx: Arc<dyn ExecutionContext>,
    activate: impl FnOnce(SignalInput<T>) + Send + 'static,
) -> Signal<T> {
    let (input, signal) = create();
    ctx.invoke(Box::new(move || activate(input)));
    signal
}

/// Creates a signal whose entire branch is already fixed: `values` are sent
/// as the activation burst, followed immediately by `end` (§6 "preclosed").
pub fn preclosed<T: Clone + Send + 'static>(values: Vec<T>, end: End) -> Signal<T> {
    let node = SignalNode::new_head("preclosed");
    for v in values {
        let _ = node.send(Item::Value(v), None, false);
    }
    let _ = node.send(Item::End(end), None, false);
    Signal::from_node(node)
}

/// Like [`generate`], but additionally seeds `initial` as the first
/// activation value before handing the producer handle to `activate` for
/// any further updates (§6 "custom_activation").
pub fn custom_activation<T: Clone + Send + 'static>(
    initial: T,
    ctx: Arc<dyn ExecutionContext>,
    activate: impl FnOnce(SignalInput<T>) + Send + 'static,
) -> Signal<T> {
    let (input, signal) = create();
    let _ = input.send(initial);
    ctx.invoke(Box::new(move || activate(input)));
    signal
}
