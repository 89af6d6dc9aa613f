use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Hash)]
/// A stable identifier for an observable cell.
pub struct CellId(u64);

impl CellId {
    pub(crate) fn next() -> CellId {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        CellId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Identifies one listener registered on a cell.
pub(crate) struct SubscriberId(u64);

impl SubscriberId {
    pub(crate) fn next() -> SubscriberId {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        SubscriberId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
