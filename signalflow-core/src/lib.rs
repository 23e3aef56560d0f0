#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Low-level signal-node scheduler: in-order, at-most-once, non-reentrant
//! delivery across a reshapeable node graph.
//!
//! This crate implements the engine only — the node/delivery-state machine,
//! the deferred-work discipline, and the handler kinds a dataflow needs. The
//! `signalflow` crate is the ergonomic builder surface on top of it.

pub mod cache_until_active;
pub mod context;
pub mod deferred;
pub mod end;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod input;
pub mod item;
pub mod junction;
pub mod multi_input;
pub mod multi_processor;
pub mod node;

pub use cache_until_active::CacheUntilActive;
pub use context::{Direct, ExecutionContext};
pub use deferred::DeferredWork;
pub use end::{End, EndError};
pub use error::{BindError, SendError};
pub use handlers::{LazyReducerHandler, OutputHandler, ProcessorHandler, ReducerHandler};
pub use ids::{ActivationCount, PredecessorId};
pub use input::SignalInput;
pub use item::{Item, Next};
pub use junction::{Capture, Junction, OnEnd};
pub use multi_input::{EndPropagation, MergedInput, MultiInput};
pub use multi_processor::{CachePolicy, MultiProcessor};
pub use node::{AttachError, Delivery, NodeHandler, PredecessorHandle, SignalNode};

#[cfg(feature = "default-context")]
pub use context::ThreadPoolContext;
