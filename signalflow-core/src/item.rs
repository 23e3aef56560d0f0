//! The `Result` sum type of §3: either a value, or a terminal [`End`].

use crate::end::End;

/// One element of the monotonic sequence flowing through a node: a value, or
/// the (single, final) terminal marker of its branch.
///
/// Named `Item` rather than `Result` to stay out of the way of
/// [`std::result::Result`], which this engine also uses pervasively for
/// `send` outcomes (see [`crate::error::SendError`]).
#[derive(Debug, Clone)]
pub enum Item<T> {
    Value(T),
    End(End),
}

/// The three-armed return of a transform closure (§9): avoids a heap
/// allocation for the dominant single-value case while still letting a
/// transform drop a value or fan it out to several.
#[derive(Debug, Clone)]
pub enum Next<T> {
    None,
    Single(T),
    Many(Vec<T>),
}

impl<T> Next<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Next::None => Vec::new(),
            Next::Single(t) => vec![t],
            Next::Many(v) => v,
        }
    }
}

impl<T> Item<T> {
    pub fn is_end(&self) -> bool {
        matches!(self, Item::End(_))
    }

    pub fn as_end(&self) -> Option<&End> {
        match self {
            Item::End(e) => Some(e),
            Item::Value(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Item<U> {
        match self {
            Item::Value(v) => Item::Value(f(v)),
            Item::End(e) => Item::End(e),
        }
    }
}
