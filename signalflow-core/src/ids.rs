//! Node and predecessor identities used to validate senders (§4.3, §8).

use std::sync::Arc;

/// Monotonically increasing per-node generation stamp (§3 "activation
/// count"). Bumped on any connection-affecting change or transition into or
/// out of `Disabled`; used to reject deliveries stamped with a stale
/// generation after a reconnection.
pub type ActivationCount = u64;

/// The identity a node presents to its successors when it registers as a
/// predecessor. Two `PredecessorId`s are equal iff they're the same node —
/// compared by pointer identity of a private marker, never by value, so
/// identity survives type erasure across differently-typed nodes.
#[derive(Clone)]
pub struct PredecessorId(Arc<()>);

impl PredecessorId {
    pub fn new() -> Self {
        Self(Arc::new(()))
    }
}

impl Default for PredecessorId {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PredecessorId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for PredecessorId {}

impl std::fmt::Debug for PredecessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PredecessorId({:p})", Arc::as_ptr(&self.0))
    }
}

impl std::hash::Hash for PredecessorId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const ()).hash(state);
    }
}
