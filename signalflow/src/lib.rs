#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Convenient, full-featured reactive streams for Rust, built on
//! `signalflow-core`: `create`/`transform`/`combine`/`reduce` plus the
//! dynamic relays (`junction`, `capture`, multi-input fan-in) and the
//! multicast/caching family (`multicast`, `continuous`, `playback`,
//! `cache_until_active`).

mod builder;
mod combine;
mod dynamic;
mod operators;

pub use builder::{create, custom_activation, generate, preclosed};
pub use combine::{
    combine2, combine2_with_state, combine3, combine3_with_state, combine4, combine4_with_state, combine5,
    combine5_with_state,
};
pub use dynamic::{create_merged_input, Capture, Junction, MultiInputSignal};
pub use operators::{subscribe_direct, CacheUntilActiveSignal, MultiSignal, Signal, Subscription};

pub use signalflow_core::{
    BindError, CachePolicy, Direct, End, EndError, EndPropagation, ExecutionContext, Next, OnEnd,
    PredecessorId, SendError, SignalInput,
};
#[cfg(feature = "default-context")]
pub use signalflow_core::ThreadPoolContext;
