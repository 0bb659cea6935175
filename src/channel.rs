//! Channel adapter: chimes into a bounded queue.
//!
//! [`chime_ch`] wraps [`chime_at`](crate::chime_at) so each chime is
//! pushed into a bounded queue and consumed with
//! [`ChimeReceiver::recv`]. The caller picks what happens when the queue
//! is full: block the schedule (backpressure), drop the newest chime, or
//! slide the oldest one out. Closing the receiver closes the schedule and
//! the write end; the schedule's terminal edge closes the read end.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::clock::Clock;
use crate::error::ChimeError;
use crate::schedule::{ChimeBuilder, ScheduleHandle};
use crate::times::ChimeTime;

/// What to do with a chime when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Block the schedule until the consumer catches up.
    #[default]
    Block,
    /// Discard the incoming chime.
    DropNewest,
    /// Discard the oldest buffered chime to make room.
    Sliding,
}

/// Options for [`chime_ch`].
pub struct ChannelOptions {
    /// Queue capacity; clamped to at least 1.
    pub buffer: usize,
    pub policy: OverflowPolicy,
    pub drop_overruns: bool,
    pub clock: Option<Arc<dyn Clock>>,
    /// Decides per-error whether the schedule continues; returning false
    /// also closes the read end.
    pub error_handler: Option<Box<dyn FnMut(&ChimeError) -> bool + Send>>,
    /// Runs on the schedule's terminal edge, before the read end closes.
    pub on_finished: Option<Box<dyn FnOnce() + Send>>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            buffer: 32,
            policy: OverflowPolicy::Block,
            drop_overruns: false,
            clock: None,
            error_handler: None,
            on_finished: None,
        }
    }
}

/// Schedule chimes into a bounded queue.
///
/// Must be called from within a Tokio runtime.
pub fn chime_ch<T, I>(times: I, options: ChannelOptions) -> ChimeReceiver<T>
where
    T: ChimeTime + Clone,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
{
    let queue = Arc::new(BoundedQueue::new(options.buffer.max(1)));
    let policy = options.policy;

    let mut builder = ChimeBuilder::new().drop_overruns(options.drop_overruns);
    if let Some(clock) = options.clock {
        builder = builder.clock(clock);
    }
    if let Some(handler) = options.error_handler {
        builder = builder.error_handler(handler);
    }

    // Either terminal edge closes the read end.
    let finished_queue = queue.clone();
    let user_on_finished = options.on_finished;
    let aborted_queue = queue.clone();
    builder = builder
        .on_finished(move || {
            if let Some(on_finished) = user_on_finished {
                on_finished();
            }
            finished_queue.close();
        })
        .on_aborted(move || aborted_queue.close());

    let push_queue = queue.clone();
    let handle = builder.start(times, move |t| {
        let queue = push_queue.clone();
        async move {
            queue.push(t, policy).await;
            Ok(())
        }
    });

    ChimeReceiver { queue, handle }
}

/// Read end of a chime channel.
///
/// Dropping the receiver closes the schedule and the queue.
pub struct ChimeReceiver<T> {
    queue: Arc<BoundedQueue<T>>,
    handle: ScheduleHandle<T>,
}

impl<T> ChimeReceiver<T> {
    /// Receive the next chime; `None` once the schedule terminated and the
    /// queue drained.
    pub async fn recv(&self) -> Option<T> {
        self.queue.recv().await
    }

    /// Close the schedule and the queue.
    pub fn close(&self) {
        self.handle.close();
        self.queue.close();
    }

    /// The underlying schedule handle.
    pub fn handle(&self) -> &ScheduleHandle<T> {
        &self.handle
    }
}

impl<T> Drop for ChimeReceiver<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Bounded FIFO shared by one producing schedule and one consumer.
///
/// `tokio::mpsc` cannot pop from the send side, which the sliding policy
/// needs, so this composes a mutex-guarded deque with a notify pair.
struct BoundedQueue<T> {
    inner: Mutex<QueueState<T>>,
    readable: Notify,
    writable: Notify,
    capacity: usize,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
            capacity,
        }
    }

    fn push_now(&self, item: T, policy: OverflowPolicy) -> PushOutcome<T> {
        let mut state = self.inner.lock().expect("chime queue lock poisoned");
        if state.closed {
            return PushOutcome::Closed;
        }
        if state.items.len() < self.capacity {
            state.items.push_back(item);
            return PushOutcome::Pushed;
        }
        match policy {
            OverflowPolicy::Block => PushOutcome::Full(item),
            OverflowPolicy::DropNewest => {
                debug!("chime queue full, dropping newest");
                PushOutcome::Dropped
            }
            OverflowPolicy::Sliding => {
                state.items.pop_front();
                state.items.push_back(item);
                debug!("chime queue full, slid oldest out");
                PushOutcome::Pushed
            }
        }
    }

    async fn push(&self, item: T, policy: OverflowPolicy) {
        let mut item = item;
        loop {
            match self.push_now(item, policy) {
                PushOutcome::Pushed => {
                    self.readable.notify_one();
                    return;
                }
                PushOutcome::Dropped | PushOutcome::Closed => return,
                PushOutcome::Full(returned) => {
                    item = returned;
                    self.writable.notified().await;
                }
            }
        }
    }

    async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut state = self.inner.lock().expect("chime queue lock poisoned");
                if let Some(item) = state.items.pop_front() {
                    self.writable.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            self.readable.notified().await;
        }
    }

    fn close(&self) {
        {
            let mut state = self.inner.lock().expect("chime queue lock poisoned");
            state.closed = true;
        }
        // notify_one leaves a stored permit, so a consumer registering
        // after this still wakes.
        self.readable.notify_one();
        self.writable.notify_one();
    }
}

enum PushOutcome<T> {
    Pushed,
    Dropped,
    Closed,
    Full(T),
}
