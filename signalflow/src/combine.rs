//! §6 `combine`: recomputes a combined value from the latest of several
//! differently-typed sources whenever any of them updates.
//!
//! Implemented directly rather than atop [`signalflow_core::MultiInput`]:
//! `MultiInput` merges same-typed values without remembering *which* source
//! produced the latest one, while `combine` needs the latest of every
//! source kept separately so it can recompute from all of them together.
//! Each arity gets its own small relay type rather than one generic
//! N-source version, matching how `reduce`/`transform` each get their own
//! handler in `signalflow-core::handlers` instead of a single "generic
//! vtable" handler.

use std::sync::{Arc, Mutex};

use signalflow_core::{DeferredWork, ExecutionContext, Item, NodeHandler, PredecessorHandle, SignalNode};

use crate::operators::{erase, KeepAlive, Signal};

struct State2<A, B> {
    a: Option<A>,
    b: Option<B>,
    ended: u8,
}

fn activate_successor<U: Send + 'static>(successor: &Arc<SignalNode<U>>, source: &Arc<dyn PredecessorHandle>) {
    let mut dw = DeferredWork::new();
    // A second/third source attaching after the first is a no-op as far as
    // the successor's own Disabled->Normal transition goes (§4.6): only the
    // first predecessor flips it.
    let _ = successor.add_predecessor(Arc::clone(source), &mut dw);
    dw.run();
}

struct Relay2A<A, B, U> {
    state: Arc<Mutex<State2<A, B>>>,
    successor: Arc<SignalNode<U>>,
    combine: Arc<dyn Fn(&A, &B) -> U + Send + Sync>,
}

impl<A: Clone + Send + 'static, B: Clone + Send + 'static, U: Clone + Send + 'static> NodeHandler<A>
    for Relay2A<A, B, U>
{
    fn deliver(&self, item: Item<A>, activated: bool, _dw: &mut DeferredWork) {
        match item {
            Item::Value(v) => {
                let out = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.a = Some(v);
                    state
                        .b
                        .clone()
                        .map(|b| (self.combine)(state.a.as_ref().expect("just set"), &b))
                };
                if let Some(out) = out {
                    let _ = self.successor.send(Item::Value(out), None, activated);
                }
            }
            Item::End(end) => {
                let should_end = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.ended |= 0b01;
                    state.ended == 0b11
                };
                if should_end {
                    let _ = self.successor.send(Item::End(end), None, activated);
                }
            }
        }
    }
}

struct Relay2B<A, B, U> {
    state: Arc<Mutex<State2<A, B>>>,
    successor: Arc<SignalNode<U>>,
    combine: Arc<dyn Fn(&A, &B) -> U + Send + Sync>,
}

impl<A: Clone + Send + 'static, B: Clone + Send + 'static, U: Clone + Send + 'static> NodeHandler<B>
    for Relay2B<A, B, U>
{
    fn deliver(&self, item: Item<B>, activated: bool, _dw: &mut DeferredWork) {
        match item {
            Item::Value(v) => {
                let out = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.b = Some(v);
                    state
                        .a
                        .clone()
                        .map(|a| (self.combine)(&a, state.b.as_ref().expect("just set")))
                };
                if let Some(out) = out {
                    let _ = self.successor.send(Item::Value(out), None, activated);
                }
            }
            Item::End(end) => {
                let should_end = {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    state.ended |= 0b10;
                    state.ended == 0b11
                };
                if should_end {
                    let _ = self.successor.send(Item::End(end), None, activated);
                }
            }
        }
    }
}

/// §6 `combine`: two sources. Recomputes and forwards `f(a, b)` once both
/// sources have produced at least one value, and again on every subsequent
/// update from either.
pub fn combine2<A, B, U>(
    a: Signal<A>,
    b: Signal<B>,
    _ctx: Arc<dyn ExecutionContext>,
    f: impl Fn(&A, &B) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let successor = SignalNode::new_output("combine2");
    let state = Arc::new(Mutex::new(State2 { a: None, b: None, ended: 0 }));
    let combine: Arc<dyn Fn(&A, &B) -> U + Send + Sync> = Arc::new(f);

    let (a_node, a_keep_alive) = a.into_parts();
    let (b_node, b_keep_alive) = b.into_parts();

    let handler_a: Arc<dyn NodeHandler<A>> = Arc::new(Relay2A {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    a_node
        .attach_handler(Arc::downgrade(&handler_a))
        .expect("combine source already has a consumer");
    let pred_a: Arc<dyn PredecessorHandle> = Arc::clone(&a_node);
    activate_successor(&successor, &pred_a);

    let handler_b: Arc<dyn NodeHandler<B>> = Arc::new(Relay2B {
        state,
        successor: Arc::clone(&successor),
        combine,
    });
    b_node
        .attach_handler(Arc::downgrade(&handler_b))
        .expect("combine source already has a consumer");
    let pred_b: Arc<dyn PredecessorHandle> = Arc::clone(&b_node);
    activate_successor(&successor, &pred_b);

    let mut keep_alive: Vec<KeepAlive> = a_keep_alive;
    keep_alive.extend(b_keep_alive);
    keep_alive.push(erase(handler_a));
    keep_alive.push(erase(handler_b));
    Signal::from_node_with(successor, keep_alive)
}

struct State3<A, B, C> {
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
    ended: u8,
}

macro_rules! relay3 {
    ($name:ident, $field:ident, $slot:tt, $bit:expr) => {
        struct $name<A, B, C, U> {
            state: Arc<Mutex<State3<A, B, C>>>,
            successor: Arc<SignalNode<U>>,
            combine: Arc<dyn Fn(&A, &B, &C) -> U + Send + Sync>,
        }

        impl<A, B, C, U> NodeHandler<$slot> for $name<A, B, C, U>
        where
            A: Clone + Send + 'static,
            B: Clone + Send + 'static,
            C: Clone + Send + 'static,
            U: Clone + Send + 'static,
        {
            fn deliver(&self, item: Item<$slot>, activated: bool, _dw: &mut DeferredWork) {
                match item {
                    Item::Value(v) => {
                        let out = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.$field = Some(v);
                            match (&state.a, &state.b, &state.c) {
                                (Some(a), Some(b), Some(c)) => Some((self.combine)(a, b, c)),
                                _ => None,
                            }
                        };
                        if let Some(out) = out {
                            let _ = self.successor.send(Item::Value(out), None, activated);
                        }
                    }
                    Item::End(end) => {
                        let should_end = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.ended |= $bit;
                            state.ended == 0b111
                        };
                        if should_end {
                            let _ = self.successor.send(Item::End(end), None, activated);
                        }
                    }
                }
            }
        }
    };
}

relay3!(Relay3A, a, A, 0b001);
relay3!(Relay3B, b, B, 0b010);
relay3!(Relay3C, c, C, 0b100);

/// §6 `combine`: three sources, same semantics as [`combine2`].
pub fn combine3<A, B, C, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    _ctx: Arc<dyn ExecutionContext>,
    f: impl Fn(&A, &B, &C) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let successor = SignalNode::new_output("combine3");
    let state = Arc::new(Mutex::new(State3 { a: None, b: None, c: None, ended: 0 }));
    let combine: Arc<dyn Fn(&A, &B, &C) -> U + Send + Sync> = Arc::new(f);

    let (a_node, a_keep_alive) = a.into_parts();
    let (b_node, b_keep_alive) = b.into_parts();
    let (c_node, c_keep_alive) = c.into_parts();

    let handler_a: Arc<dyn NodeHandler<A>> = Arc::new(Relay3A {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    a_node.attach_handler(Arc::downgrade(&handler_a)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&a_node) as Arc<dyn PredecessorHandle>));

    let handler_b: Arc<dyn NodeHandler<B>> = Arc::new(Relay3B {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    b_node.attach_handler(Arc::downgrade(&handler_b)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&b_node) as Arc<dyn PredecessorHandle>));

    let handler_c: Arc<dyn NodeHandler<C>> = Arc::new(Relay3C {
        state,
        successor: Arc::clone(&successor),
        combine,
    });
    c_node.attach_handler(Arc::downgrade(&handler_c)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&c_node) as Arc<dyn PredecessorHandle>));

    let mut keep_alive: Vec<KeepAlive> = a_keep_alive;
    keep_alive.extend(b_keep_alive);
    keep_alive.extend(c_keep_alive);
    keep_alive.push(erase(handler_a));
    keep_alive.push(erase(handler_b));
    keep_alive.push(erase(handler_c));
    Signal::from_node_with(successor, keep_alive)
}

struct State4<A, B, C, D> {
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
    d: Option<D>,
    ended: u8,
}

macro_rules! relay4 {
    ($name:ident, $field:ident, $slot:tt, $bit:expr) => {
        struct $name<A, B, C, D, U> {
            state: Arc<Mutex<State4<A, B, C, D>>>,
            successor: Arc<SignalNode<U>>,
            combine: Arc<dyn Fn(&A, &B, &C, &D) -> U + Send + Sync>,
        }

        impl<A, B, C, D, U> NodeHandler<$slot> for $name<A, B, C, D, U>
        where
            A: Clone + Send + 'static,
            B: Clone + Send + 'static,
            C: Clone + Send + 'static,
            D: Clone + Send + 'static,
            U: Clone + Send + 'static,
        {
            fn deliver(&self, item: Item<$slot>, activated: bool, _dw: &mut DeferredWork) {
                match item {
                    Item::Value(v) => {
                        let out = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.$field = Some(v);
                            match (&state.a, &state.b, &state.c, &state.d) {
                                (Some(a), Some(b), Some(c), Some(d)) => Some((self.combine)(a, b, c, d)),
                                _ => None,
                            }
                        };
                        if let Some(out) = out {
                            let _ = self.successor.send(Item::Value(out), None, activated);
                        }
                    }
                    Item::End(end) => {
                        let should_end = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.ended |= $bit;
                            state.ended == 0b1111
                        };
                        if should_end {
                            let _ = self.successor.send(Item::End(end), None, activated);
                        }
                    }
                }
            }
        }
    };
}

relay4!(Relay4A, a, A, 0b0001);
relay4!(Relay4B, b, B, 0b0010);
relay4!(Relay4C, c, C, 0b0100);
relay4!(Relay4D, d, D, 0b1000);

/// §6 `combine`: four sources, same semantics as [`combine2`].
pub fn combine4<A, B, C, D, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    d: Signal<D>,
    _ctx: Arc<dyn ExecutionContext>,
    f: impl Fn(&A, &B, &C, &D) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    D: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let successor = SignalNode::new_output("combine4");
    let state = Arc::new(Mutex::new(State4 { a: None, b: None, c: None, d: None, ended: 0 }));
    let combine: Arc<dyn Fn(&A, &B, &C, &D) -> U + Send + Sync> = Arc::new(f);

    let (a_node, a_keep_alive) = a.into_parts();
    let (b_node, b_keep_alive) = b.into_parts();
    let (c_node, c_keep_alive) = c.into_parts();
    let (d_node, d_keep_alive) = d.into_parts();

    let handler_a: Arc<dyn NodeHandler<A>> = Arc::new(Relay4A {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    a_node.attach_handler(Arc::downgrade(&handler_a)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&a_node) as Arc<dyn PredecessorHandle>));

    let handler_b: Arc<dyn NodeHandler<B>> = Arc::new(Relay4B {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    b_node.attach_handler(Arc::downgrade(&handler_b)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&b_node) as Arc<dyn PredecessorHandle>));

    let handler_c: Arc<dyn NodeHandler<C>> = Arc::new(Relay4C {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    c_node.attach_handler(Arc::downgrade(&handler_c)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&c_node) as Arc<dyn PredecessorHandle>));

    let handler_d: Arc<dyn NodeHandler<D>> = Arc::new(Relay4D {
        state,
        successor: Arc::clone(&successor),
        combine,
    });
    d_node.attach_handler(Arc::downgrade(&handler_d)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&d_node) as Arc<dyn PredecessorHandle>));

    let mut keep_alive: Vec<KeepAlive> = a_keep_alive;
    keep_alive.extend(b_keep_alive);
    keep_alive.extend(c_keep_alive);
    keep_alive.extend(d_keep_alive);
    keep_alive.push(erase(handler_a));
    keep_alive.push(erase(handler_b));
    keep_alive.push(erase(handler_c));
    keep_alive.push(erase(handler_d));
    Signal::from_node_with(successor, keep_alive)
}

struct State5<A, B, C, D, E> {
    a: Option<A>,
    b: Option<B>,
    c: Option<C>,
    d: Option<D>,
    e: Option<E>,
    ended: u8,
}

macro_rules! relay5 {
    ($name:ident, $field:ident, $slot:tt, $bit:expr) => {
        struct $name<A, B, C, D, E, U> {
            state: Arc<Mutex<State5<A, B, C, D, E>>>,
            successor: Arc<SignalNode<U>>,
            combine: Arc<dyn Fn(&A, &B, &C, &D, &E) -> U + Send + Sync>,
        }

        impl<A, B, C, D, E, U> NodeHandler<$slot> for $name<A, B, C, D, E, U>
        where
            A: Clone + Send + 'static,
            B: Clone + Send + 'static,
            C: Clone + Send + 'static,
            D: Clone + Send + 'static,
            E: Clone + Send + 'static,
            U: Clone + Send + 'static,
        {
            fn deliver(&self, item: Item<$slot>, activated: bool, _dw: &mut DeferredWork) {
                match item {
                    Item::Value(v) => {
                        let out = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.$field = Some(v);
                            match (&state.a, &state.b, &state.c, &state.d, &state.e) {
                                (Some(a), Some(b), Some(c), Some(d), Some(e)) => Some((self.combine)(a, b, c, d, e)),
                                _ => None,
                            }
                        };
                        if let Some(out) = out {
                            let _ = self.successor.send(Item::Value(out), None, activated);
                        }
                    }
                    Item::End(end) => {
                        let should_end = {
                            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                            state.ended |= $bit;
                            state.ended == 0b11111
                        };
                        if should_end {
                            let _ = self.successor.send(Item::End(end), None, activated);
                        }
                    }
                }
            }
        }
    };
}

relay5!(Relay5A, a, A, 0b00001);
relay5!(Relay5B, b, B, 0b00010);
relay5!(Relay5C, c, C, 0b00100);
relay5!(Relay5D, d, D, 0b01000);
relay5!(Relay5E, e, E, 0b10000);

/// §6 `combine`: five sources, same semantics as [`combine2`].
pub fn combine5<A, B, C, D, E, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    d: Signal<D>,
    e: Signal<E>,
    _ctx: Arc<dyn ExecutionContext>,
    f: impl Fn(&A, &B, &C, &D, &E) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    D: Clone + Send + 'static,
    E: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let successor = SignalNode::new_output("combine5");
    let state = Arc::new(Mutex::new(State5 { a: None, b: None, c: None, d: None, e: None, ended: 0 }));
    let combine: Arc<dyn Fn(&A, &B, &C, &D, &E) -> U + Send + Sync> = Arc::new(f);

    let (a_node, a_keep_alive) = a.into_parts();
    let (b_node, b_keep_alive) = b.into_parts();
    let (c_node, c_keep_alive) = c.into_parts();
    let (d_node, d_keep_alive) = d.into_parts();
    let (e_node, e_keep_alive) = e.into_parts();

    let handler_a: Arc<dyn NodeHandler<A>> = Arc::new(Relay5A {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    a_node.attach_handler(Arc::downgrade(&handler_a)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&a_node) as Arc<dyn PredecessorHandle>));

    let handler_b: Arc<dyn NodeHandler<B>> = Arc::new(Relay5B {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    b_node.attach_handler(Arc::downgrade(&handler_b)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&b_node) as Arc<dyn PredecessorHandle>));

    let handler_c: Arc<dyn NodeHandler<C>> = Arc::new(Relay5C {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    c_node.attach_handler(Arc::downgrade(&handler_c)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&c_node) as Arc<dyn PredecessorHandle>));

    let handler_d: Arc<dyn NodeHandler<D>> = Arc::new(Relay5D {
        state: Arc::clone(&state),
        successor: Arc::clone(&successor),
        combine: Arc::clone(&combine),
    });
    d_node.attach_handler(Arc::downgrade(&handler_d)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&d_node) as Arc<dyn PredecessorHandle>));

    let handler_e: Arc<dyn NodeHandler<E>> = Arc::new(Relay5E {
        state,
        successor: Arc::clone(&successor),
        combine,
    });
    e_node.attach_handler(Arc::downgrade(&handler_e)).expect("combine source already has a consumer");
    activate_successor(&successor, &(Arc::clone(&e_node) as Arc<dyn PredecessorHandle>));

    let mut keep_alive: Vec<KeepAlive> = a_keep_alive;
    keep_alive.extend(b_keep_alive);
    keep_alive.extend(c_keep_alive);
    keep_alive.extend(d_keep_alive);
    keep_alive.extend(e_keep_alive);
    keep_alive.push(erase(handler_a));
    keep_alive.push(erase(handler_b));
    keep_alive.push(erase(handler_c));
    keep_alive.push(erase(handler_d));
    keep_alive.push(erase(handler_e));
    Signal::from_node_with(successor, keep_alive)
}

/// `combine` with an explicit mutable fold-state threaded alongside the
/// per-source latest values (§6 "combine … with state"), for recomputations
/// that need more than the sources' own latest values (e.g. a running
/// average). The state lives behind a mutex the combine closure locks once
/// per recomputation, mirroring [`Signal::transform_with_state`].
pub fn combine2_with_state<A, B, S, U>(
    a: Signal<A>,
    b: Signal<B>,
    ctx: Arc<dyn ExecutionContext>,
    state: S,
    f: impl Fn(&mut S, &A, &B) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    S: Send + 'static,
    U: Clone + Send + 'static,
{
    let state = Mutex::new(state);
    combine2(a, b, ctx, move |a, b| {
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut s, a, b)
    })
}

pub fn combine3_with_state<A, B, C, S, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    ctx: Arc<dyn ExecutionContext>,
    state: S,
    f: impl Fn(&mut S, &A, &B, &C) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    S: Send + 'static,
    U: Clone + Send + 'static,
{
    let state = Mutex::new(state);
    combine3(a, b, c, ctx, move |a, b, c| {
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut s, a, b, c)
    })
}

pub fn combine4_with_state<A, B, C, D, S, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    d: Signal<D>,
    ctx: Arc<dyn ExecutionContext>,
    state: S,
    f: impl Fn(&mut S, &A, &B, &C, &D) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    D: Clone + Send + 'static,
    S: Send + 'static,
    U: Clone + Send + 'static,
{
    let state = Mutex::new(state);
    combine4(a, b, c, d, ctx, move |a, b, c, d| {
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut s, a, b, c, d)
    })
}

pub fn combine5_with_state<A, B, C, D, E, S, U>(
    a: Signal<A>,
    b: Signal<B>,
    c: Signal<C>,
    d: Signal<D>,
    e: Signal<E>,
    ctx: Arc<dyn ExecutionContext>,
    state: S,
    f: impl Fn(&mut S, &A, &B, &C, &D, &E) -> U + Send + Sync + 'static,
) -> Signal<U>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
    D: Clone + Send + 'static,
    E: Clone + Send + 'static,
    S: Send + 'static,
    U: Clone + Send + 'static,
{
    let state = Mutex::new(state);
    combine5(a, b, c, d, e, ctx, move |a, b, c, d, e| {
        let mut s = state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut s, a, b, c, d, e)
    })
}
