//! The dual-identity schedule handle.
//!
//! A [`ScheduleHandle`] represents both the whole schedule (close, await,
//! pending) and the currently pending firing (cancel, remaining delay).
//! Callers discriminate by operation name; there is no separate per-task
//! object.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::{ChimeError, Result};

use super::feed::TimeQueue;

/// A single pending or running firing.
pub(crate) struct Fire {
    pub(crate) at: DateTime<Utc>,
    pub(crate) token: CancellationToken,
    pub(crate) started: AtomicBool,
    pub(crate) cancelled: AtomicBool,
}

impl Fire {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            token: CancellationToken::new(),
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// State shared between the handle and the driver task.
pub(crate) struct Shared {
    /// One-shot completion latch; sends true exactly once.
    pub(crate) done: watch::Sender<bool>,
    /// User close request; observed by the driver at its next decision point.
    pub(crate) close: CancellationToken,
    /// The currently pending or running fire, if any.
    pub(crate) current: Mutex<Option<Arc<Fire>>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Shared {
    pub(crate) fn current_fire(&self) -> Option<Arc<Fire>> {
        self.current.lock().expect("current fire lock poisoned").clone()
    }

    pub(crate) fn set_current(&self, fire: Option<Arc<Fire>>) {
        *self.current.lock().expect("current fire lock poisoned") = fire;
    }
}

/// Handle for one running schedule.
///
/// Cloneable; all clones observe the same schedule.
pub struct ScheduleHandle<T> {
    pub(crate) shared: Arc<Shared>,
    /// Present only in mutable mode.
    pub(crate) queue: Option<Arc<TimeQueue<T>>>,
}

impl<T> Clone for ScheduleHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<T> ScheduleHandle<T> {
    /// Request shutdown.
    ///
    /// The driver cancels the pending fire if it has not started, signals
    /// the latch, and runs `on_aborted` (or `on_finished` if no abort
    /// handler was given). A callback already running is left to finish.
    pub fn close(&self) {
        self.shared.close.cancel();
    }

    /// Graceful shutdown: close, then cancel the current fire only if it
    /// has not yet started. Never interrupts a running callback.
    pub fn shutdown(&self) {
        self.shared.close.cancel();
        self.cancel_current_if_waiting();
    }

    /// Hard shutdown: close and interrupt the running callback at its next
    /// await point.
    pub fn shutdown_now(&self) {
        self.shared.close.cancel();
        if let Some(fire) = self.shared.current_fire() {
            fire.cancelled.store(true, Ordering::SeqCst);
            fire.token.cancel();
        }
    }

    /// Block until the schedule reaches its terminal edge.
    pub async fn wait(&self) {
        let mut rx = self.shared.done.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`. Returns
    /// true if the schedule completed, false on timeout.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Whether the latch is still unsignalled.
    pub fn is_pending(&self) -> bool {
        !*self.shared.done.borrow()
    }

    /// Whether the schedule reached a terminal edge.
    pub fn is_finished(&self) -> bool {
        !self.is_pending()
    }

    /// Cancel the currently pending fire.
    ///
    /// Returns true if the cancel took effect or the fire was already
    /// cancelled. With `interrupt` false a fire whose callback already
    /// started is left alone (returns false); with `interrupt` true the
    /// running callback is interrupted at its next await point and the
    /// interruption surfaces to the error handler.
    ///
    /// If the schedule is still live after a successful cancel, the driver
    /// reschedules starting at the next time in the tail.
    pub fn cancel_current(&self, interrupt: bool) -> bool {
        let Some(fire) = self.shared.current_fire() else {
            return false;
        };
        if fire.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        if fire.started.load(Ordering::SeqCst) && !interrupt {
            return false;
        }
        fire.cancelled.store(true, Ordering::SeqCst);
        fire.token.cancel();
        true
    }

    /// Cancel the pending fire only if its callback has not started.
    /// Does not close the schedule.
    pub fn cancel_current_if_waiting(&self) -> bool {
        self.cancel_current(false)
    }

    /// Milliseconds until the current pending fire: `Some(-1)` if it was
    /// cancelled, `None` if there is none.
    pub fn until_current(&self) -> Option<i64> {
        let fire = self.shared.current_fire()?;
        if fire.cancelled.load(Ordering::SeqCst) {
            return Some(-1);
        }
        Some((fire.at - self.shared.clock.now()).num_milliseconds())
    }

    /// The current pending fire's time in the schedule clock's zone, or
    /// `None` if there is no pending fire or it was cancelled.
    pub fn current_at(&self) -> Option<DateTime<Tz>> {
        let fire = self.shared.current_fire()?;
        if fire.cancelled.load(Ordering::SeqCst) {
            return None;
        }
        Some(fire.at.with_timezone(&self.shared.clock.zone()))
    }
}

impl<T: Clone> ScheduleHandle<T> {
    /// Append times to the tail of a mutable schedule, in order.
    pub fn append(&self, times: impl IntoIterator<Item = T>) -> Result<()> {
        let queue = self.queue.as_ref().ok_or(ChimeError::NotMutable)?;
        queue.append(times);
        Ok(())
    }

    /// Append `offset_fn(last)` to a mutable schedule, where `last` is the
    /// final element of the pending queue (or the last dispatched time once
    /// the queue has drained).
    pub fn append_relative_to_last(&self, offset_fn: impl FnOnce(&T) -> T) -> Result<()> {
        let queue = self.queue.as_ref().ok_or(ChimeError::NotMutable)?;
        queue.append_relative_to_last(offset_fn);
        Ok(())
    }
}
