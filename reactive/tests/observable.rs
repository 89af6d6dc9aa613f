use std::{cell::RefCell, rc::Rc};

use floem_form_reactive::{Observable, batch};

#[test]
fn subscribe_runs_immediately_and_on_every_write() {
    let cell = Observable::new(1);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _sub = cell.subscribe({
        let seen = seen.clone();
        move |v| seen.borrow_mut().push(*v)
    });
    assert_eq!(*seen.borrow(), vec![1]);

    cell.set(2);
    cell.update(|v| *v += 10);
    assert_eq!(*seen.borrow(), vec![1, 2, 12]);
    assert_eq!(cell.get(), 12);
}

#[test]
fn unsubscribe_stops_notifications() {
    let cell = Observable::new("a".to_string());
    let count = Rc::new(RefCell::new(0));

    let sub = cell.subscribe({
        let count = count.clone();
        move |_| *count.borrow_mut() += 1
    });
    assert_eq!(cell.subscriber_count(), 1);
    sub.unsubscribe();
    assert_eq!(cell.subscriber_count(), 0);

    cell.set("b".into());
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn clones_share_state() {
    let cell = Observable::new(vec![1]);
    let other = cell.clone();
    other.update(|v| v.push(2));
    assert_eq!(cell.get(), vec![1, 2]);
    assert_eq!(cell.id(), other.id());
}

#[test]
fn listener_may_write_to_another_cell() {
    let source = Observable::new(1);
    let doubled = Observable::new(0);

    let _sub = source.subscribe({
        let doubled = doubled.clone();
        move |v| doubled.set(v * 2)
    });
    assert_eq!(doubled.get(), 2);

    source.set(5);
    assert_eq!(doubled.get(), 10);
}

#[test]
fn update_silent_defers_to_explicit_notify() {
    let cell = Observable::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _sub = cell.subscribe({
        let seen = seen.clone();
        move |v| seen.borrow_mut().push(*v)
    });

    cell.update_silent(|v| *v = 3);
    assert_eq!(*seen.borrow(), vec![0]);
    cell.notify();
    assert_eq!(*seen.borrow(), vec![0, 3]);
}

#[test]
fn batch_notifies_once_per_cell() {
    let left = Observable::new(0);
    let right = Observable::new(0);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let _l = left.subscribe({
        let seen = seen.clone();
        let right = right.clone();
        move |v| seen.borrow_mut().push(("left", *v, right.get()))
    });
    seen.borrow_mut().clear();

    batch(|| {
        left.set(1);
        right.set(1);
        left.set(2);
        right.set(2);
    });

    // One notification, and it already sees both cells fully written.
    assert_eq!(*seen.borrow(), vec![("left", 2, 2)]);
}

#[test]
fn nested_batches_flush_at_the_outermost() {
    let cell = Observable::new(0);
    let count = Rc::new(RefCell::new(0));
    let _sub = cell.subscribe({
        let count = count.clone();
        move |_| *count.borrow_mut() += 1
    });

    batch(|| {
        cell.set(1);
        batch(|| {
            cell.set(2);
            assert!(floem_form_reactive::is_batching());
        });
        assert_eq!(*count.borrow(), 1, "inner batch must not flush");
    });
    assert_eq!(*count.borrow(), 2);
    assert!(!floem_form_reactive::is_batching());
}
