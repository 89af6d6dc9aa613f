use std::{
    cell::{Ref, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    id::{CellId, SubscriberId},
    runtime::RUNTIME,
};

type Listener<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    id: CellId,
    value: RefCell<T>,
    listeners: RefCell<Vec<(SubscriberId, Listener<T>)>>,
}

/// A writable observable cell.
///
/// `Observable` is a cheap `Clone` handle; all clones share the same value
/// and listeners. Listeners registered with [`Observable::subscribe`] run once
/// immediately and then after every write, or once at the end of the
/// enclosing [`batch`](crate::batch).
pub struct Observable<T: 'static> {
    inner: Rc<Inner<T>>,
}

impl<T: 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Observable");
        s.field("id", &self.inner.id);
        s.field("value", &*self.inner.value.borrow());
        s.finish()
    }
}

impl<T: Default + Clone + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: 'static> Observable<T> {
    pub fn id(&self) -> CellId {
        self.inner.id
    }

    /// Borrows the current value.
    ///
    /// Holding the borrow across a write to the same cell panics, as with any
    /// `RefCell`.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    /// Applies a closure to the current value.
    pub fn with<O>(&self, f: impl FnOnce(&T) -> O) -> O {
        f(&self.inner.value.borrow())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl<T: Clone + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: CellId::next(),
                value: RefCell::new(value),
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Clones and returns the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Replaces the value and notifies listeners.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    /// Updates the value in place and notifies listeners.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.try_update(f);
    }

    /// Updates the value in place, notifies listeners and returns the result
    /// of `f`.
    pub fn try_update<O>(&self, f: impl FnOnce(&mut T) -> O) -> O {
        let result = f(&mut self.inner.value.borrow_mut());
        self.notify();
        result
    }

    /// Updates the value without notifying anyone.
    ///
    /// Use this for writes that are followed by a [`Observable::notify`] in the
    /// same batch.
    pub fn update_silent<O>(&self, f: impl FnOnce(&mut T) -> O) -> O {
        f(&mut self.inner.value.borrow_mut())
    }

    /// Registers `listener`, runs it with the current value and returns the
    /// handle that removes it again.
    pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription {
        let id = SubscriberId::next();
        let listener: Listener<T> = Rc::new(listener);
        self.inner
            .listeners
            .borrow_mut()
            .push((id, listener.clone()));
        let value = self.get();
        listener(&value);

        let inner: Rc<dyn Unsubscribe> = self.inner.clone();
        Subscription {
            id,
            cell: Rc::downgrade(&inner),
        }
    }

    /// Notifies every listener with the current value, deferring to the end
    /// of the current batch when one is open.
    pub fn notify(&self) {
        let batching = RUNTIME.with(|runtime| runtime.is_batching());
        if batching {
            let inner = self.inner.clone();
            RUNTIME.with(|runtime| {
                runtime.add_pending(self.inner.id, Rc::new(move || notify_now(&inner)))
            });
            return;
        }
        notify_now(&self.inner);
    }
}

fn notify_now<T: Clone + 'static>(inner: &Rc<Inner<T>>) {
    // Listeners may write back into this cell, so neither the value nor the
    // listener list stays borrowed while they run.
    let listeners: Vec<Listener<T>> = inner
        .listeners
        .borrow()
        .iter()
        .map(|(_, listener)| listener.clone())
        .collect();
    if listeners.is_empty() {
        return;
    }
    let value = inner.value.borrow().clone();
    for listener in listeners {
        listener(&value);
    }
}

trait Unsubscribe {
    fn remove(&self, id: SubscriberId);
}

impl<T> Unsubscribe for Inner<T> {
    fn remove(&self, id: SubscriberId) {
        self.listeners.borrow_mut().retain(|(other, _)| *other != id);
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "a listener can only be removed through its Subscription"]
pub struct Subscription {
    id: SubscriberId,
    cell: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(cell) = self.cell.upgrade() {
            cell.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
