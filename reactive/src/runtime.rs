use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use smallvec::SmallVec;

use crate::id::CellId;

thread_local! {
    pub(crate) static RUNTIME: Runtime = Runtime::new();
}

/// A notification queued while a batch is open.
pub(crate) type PendingNotify = (CellId, Rc<dyn Fn()>);

/// The internal runtime which stores the batching state in a thread local.
pub(crate) struct Runtime {
    pub(crate) batch_depth: Cell<usize>,
    pub(crate) pending: RefCell<SmallVec<[PendingNotify; 10]>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            batch_depth: Cell::new(0),
            pending: RefCell::new(SmallVec::new()),
        }
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    /// Queue a notification, once per cell. Listeners read the value at flush
    /// time, so the first queued entry for a cell is as good as any later one.
    pub(crate) fn add_pending(&self, id: CellId, notify: Rc<dyn Fn()>) {
        let queued = self.pending.borrow().iter().any(|(pending, _)| *pending == id);
        if !queued {
            self.pending.borrow_mut().push((id, notify));
        }
    }

    pub(crate) fn run_pending(&self) {
        loop {
            let pending = self.pending.take();
            if pending.is_empty() {
                break;
            }
            for (_, notify) in pending {
                notify();
            }
        }
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let flush = RUNTIME.with(|runtime| {
            let depth = runtime.batch_depth.get() - 1;
            runtime.batch_depth.set(depth);
            depth == 0
        });
        if flush && !std::thread::panicking() {
            RUNTIME.with(|runtime| runtime.run_pending());
        }
    }
}

/// Run `f` with notifications deferred.
///
/// Every cell changed inside the batch notifies its listeners exactly once,
/// after the outermost batch returns, so listeners never observe a state in
/// which only some of the batched writes have landed.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|runtime| runtime.batch_depth.set(runtime.batch_depth.get() + 1));
    let _guard = BatchGuard;
    f()
}

/// Returns true while inside [`batch`].
pub fn is_batching() -> bool {
    RUNTIME.with(|runtime| runtime.is_batching())
}
