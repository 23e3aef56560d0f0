//! Terminal markers carried in-band on a stream.

use std::{fmt, sync::Arc};

/// The terminal marker of a branch. Exactly one is ever observed per branch.
///
/// `Complete` and `Cancelled` compare equal to themselves by kind only;
/// `Other` compares equal to any other `Other`, regardless of payload, since
/// the payload is an opaque user error that two branches have no shared way
/// to compare structurally.
#[derive(Clone)]
pub enum End {
    /// The producer finished normally.
    Complete,
    /// The producer (or a downstream consumer) cancelled the branch.
    Cancelled,
    /// The producer failed with an opaque error.
    Other(EndError),
}

impl End {
    /// Wraps an arbitrary error as an [`End::Other`].
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        End::Other(EndError::new(error))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, End::Complete)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, End::Cancelled)
    }
}

impl fmt::Debug for End {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            End::Complete => f.write_str("End::Complete"),
            End::Cancelled => f.write_str("End::Cancelled"),
            End::Other(e) => f.debug_tuple("End::Other").field(e).finish(),
        }
    }
}

impl PartialEq for End {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (End::Complete, End::Complete) => true,
            (End::Cancelled, End::Cancelled) => true,
            (End::Other(_), End::Other(_)) => true,
            _ => false,
        }
    }
}
impl Eq for End {}

/// An opaque, cloneable user error carried by [`End::Other`].
///
/// Cloneable via reference counting: a [`MultiProcessor`](crate::multi_processor::MultiProcessor)
/// may need to replay a cached terminal `End` to several subscribers.
#[derive(Clone)]
pub struct EndError(Arc<dyn std::error::Error + Send + Sync>);

impl EndError {
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(error))
    }
}

impl fmt::Debug for EndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for EndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::ops::Deref for EndError {
    type Target = dyn std::error::Error + Send + Sync;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Boom;
    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }
    impl std::error::Error for Boom {}

    #[test]
    fn complete_and_cancelled_compare_by_kind() {
        assert_eq!(End::Complete, End::Complete);
        assert_eq!(End::Cancelled, End::Cancelled);
        assert_ne!(End::Complete, End::Cancelled);
    }

    #[test]
    fn other_compares_equal_regardless_of_payload() {
        assert_eq!(End::other(Boom), End::other(Boom));
        assert_ne!(End::other(Boom), End::Complete);
    }
}
