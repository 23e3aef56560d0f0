//! §6 `create`: the producer-side handle for a graph head node.

use std::sync::Arc;

use crate::{end::End, error::SendError, item::Item, node::SignalNode};

/// A handle a caller uses to push values into a graph head (§3 "Lifecycle":
/// heads have `activation_count = 1`, no predecessors, and are never
/// `Disabled`).
///
/// Sending after the head has ended returns [`SendError::Inactive`]
/// (mirroring a disabled successor) rather than panicking — a head that
/// already emitted an `End` never accepts another item (§3 invariant 3: one
/// terminal event per branch).
pub struct SignalInput<T> {
    node: Arc<SignalNode<T>>,
    activated: Arc<std::sync::atomic::AtomicBool>,
    ended: Arc<std::sync::atomic::AtomicBool>,
}

impl<T> Clone for SignalInput<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            activated: Arc::clone(&self.activated),
            ended: Arc::clone(&self.ended),
        }
    }
}

impl<T: Send + 'static> SignalInput<T> {
    pub(crate) fn new(node: Arc<SignalNode<T>>) -> Self {
        Self {
            node,
            activated: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            ended: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub(crate) fn node(&self) -> &Arc<SignalNode<T>> {
        &self.node
    }

    /// Whether this branch has already sent its terminal (§6/§7 "Cancelled":
    /// binding to an input that has already ended is rejected up front
    /// rather than left to fail on the first stale send).
    pub(crate) fn is_ended(&self) -> bool {
        self.ended.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Sends a value. The first call delivers it as this head's activation
    /// value; every call after is a normal send (§3 invariant 4).
    pub fn send(&self, value: T) -> Result<(), SendError> {
        let activated = self
            .activated
            .swap(true, std::sync::atomic::Ordering::AcqRel);
        self.node.send(Item::Value(value), None, activated)
    }

    /// Ends the branch. Idempotent only in the sense that a second call
    /// after the node has already recorded an end returns `Inactive`; this
    /// type does not track whether it already sent one, so double-ending
    /// relies on the node's own delivery-state check.
    pub fn end(&self, end: End) -> Result<(), SendError> {
        let activated = self
            .activated
            .swap(true, std::sync::atomic::Ordering::AcqRel);
        self.ended.store(true, std::sync::atomic::Ordering::Release);
        self.node.send(Item::End(end), None, activated)
    }

    pub fn complete(&self) -> Result<(), SendError> {
        self.end(End::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_send_is_activation_subsequent_are_not() {
        let node = SignalNode::<i32>::new_head("head");
        let input = SignalInput::new(Arc::clone(&node));
        input.send(1).unwrap();
        input.send(2).unwrap();
        input.complete().unwrap();
    }
}
