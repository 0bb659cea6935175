//! Time sequence feeds.
//!
//! An immutable schedule consumes a boxed iterator strictly forward. A
//! mutable schedule pops a shared FIFO queue; append and pop are
//! linearizable under one lock.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Source of the next time to fire on.
pub(crate) enum TimeFeed<T> {
    Lazy(Box<dyn Iterator<Item = T> + Send>),
    Queue(std::sync::Arc<TimeQueue<T>>),
}

impl<T: Clone> TimeFeed<T> {
    /// Destructively take the next time, if any.
    pub(crate) fn next(&mut self) -> Option<T> {
        match self {
            TimeFeed::Lazy(iter) => iter.next(),
            TimeFeed::Queue(queue) => queue.pop(),
        }
    }
}

/// Shared FIFO backing a mutable schedule.
pub(crate) struct TimeQueue<T> {
    inner: Mutex<QueueInner<T>>,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    /// Most recently popped element, so relative appends have a base after
    /// the queue drains.
    last_popped: Option<T>,
}

impl<T: Clone> TimeQueue<T> {
    pub(crate) fn new(initial: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: initial.into_iter().collect(),
                last_popped: None,
            }),
        }
    }

    pub(crate) fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().expect("time queue lock poisoned");
        let item = inner.items.pop_front();
        if let Some(item) = &item {
            inner.last_popped = Some(item.clone());
        }
        item
    }

    pub(crate) fn append(&self, times: impl IntoIterator<Item = T>) {
        let mut inner = self.inner.lock().expect("time queue lock poisoned");
        inner.items.extend(times);
    }

    /// Append `offset_fn(last)`, where `last` is the queue's back element
    /// or, if the queue is empty, the last popped element. Returns false
    /// when no base exists.
    pub(crate) fn append_relative_to_last(&self, offset_fn: impl FnOnce(&T) -> T) -> bool {
        let mut inner = self.inner.lock().expect("time queue lock poisoned");
        let base = inner
            .items
            .back()
            .cloned()
            .or_else(|| inner.last_popped.clone());
        match base {
            Some(base) => {
                let next = offset_fn(&base);
                inner.items.push_back(next);
                true
            }
            None => false,
        }
    }
}
