//! Errors surfaced at the engine's interfaces (§6, §7).

use crate::input::SignalInput;

/// Returned synchronously to the sender without side effects (§7 item 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The `(predecessor, activation_count)` pair presented by the sender no
    /// longer matches the node's current pair: the node was reconnected (or
    /// disabled and reactivated) since this sender last observed it.
    #[error("node is disconnected from this predecessor (stale activation)")]
    Disconnected,
    /// The node has no active delivery path (it is `Disabled`, or has no
    /// attached handler).
    #[error("node has no active delivery path")]
    Inactive,
}

/// Raised by explicit connection APIs (§7 item 3): `bind`, `rebind`.
///
/// `Debug` is implemented by hand below so that `BindError<T>` doesn't force
/// a `T: Debug` bound on every caller just to propagate `?`; only the
/// `Duplicate` payload is opaque in its `Debug` output.
#[derive(Clone, thiserror::Error)]
pub enum BindError<T> {
    /// The target input was already dropped.
    #[error("target signal was cancelled")]
    Cancelled,
    /// Binding would create a predecessor cycle (§4.6, §5 "Loop detection").
    #[error("binding would create a predecessor cycle")]
    Loop,
    /// The target already has a successor; single-output handlers reject a
    /// second one. The rejected input is handed back so the caller can
    /// reattach it elsewhere.
    #[error("target already has a successor")]
    Duplicate(SignalInput<T>),
}

impl<T> std::fmt::Debug for BindError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::Cancelled => f.write_str("Cancelled"),
            BindError::Loop => f.write_str("Loop"),
            BindError::Duplicate(_) => f.write_str("Duplicate(..)"),
        }
    }
}
