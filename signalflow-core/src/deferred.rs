//! §4.2 Deferred-work list: the mechanism by which the engine upholds
//! "no user code, no strong-reference drop, no cross-node send while a node
//! mutex is held" (§5).

/// An append-only list of nullary closures accumulated while a node mutex
/// is held.
///
/// Any function taking `&mut DeferredWork` promises that its visible side
/// effects — calling a handler, dropping a strong reference, sending into
/// another node — are appended here rather than executed immediately.
/// Callers of such a function must [`run`](DeferredWork::run) the list
/// exactly once, after every lock the function could have touched has been
/// released. Running is FIFO.
#[must_use = "deferred work does nothing until `run` is called after releasing every lock"]
#[derive(Default)]
pub struct DeferredWork {
    tasks: Vec<Box<dyn FnOnce(&mut DeferredWork)>>,
}

impl DeferredWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a closure that does not itself need to enqueue further work.
    pub fn push(&mut self, task: impl FnOnce() + 'static) {
        self.tasks.push(Box::new(move |_| task()));
    }

    /// Appends a closure that may itself append more deferred work (e.g. a
    /// dropped handler whose `Drop` impl sends a `Cancelled` onward).
    pub fn push_with(&mut self, task: impl FnOnce(&mut DeferredWork) + 'static) {
        self.tasks.push(Box::new(task));
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every accumulated closure, FIFO, including ones appended by
    /// earlier closures in the same run. Must be called with no node mutex
    /// held.
    pub fn run(mut self) {
        let mut i = 0;
        while i < self.tasks.len() {
            // Work around borrow-checker limitations on self-extending Vecs:
            // take ownership of each closure before calling it, since the
            // call may push more onto `self.tasks`.
            let task = std::mem::replace(&mut self.tasks[i], Box::new(|_| {}));
            i += 1;
            task(&mut self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_fifo_including_work_pushed_during_run() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut dw = DeferredWork::new();
        {
            let order = Arc::clone(&order);
            dw.push_with(move |dw| {
                order.lock().unwrap().push(1);
                let order = Arc::clone(&order);
                dw.push(move || order.lock().unwrap().push(3));
            });
        }
        {
            let order = Arc::clone(&order);
            dw.push(move || order.lock().unwrap().push(2));
        }
        dw.run();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }
}
