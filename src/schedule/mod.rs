//! Single-stream scheduler.
//!
//! [`chime_at`] takes a lazy sequence of times and a callback, spawns a
//! driver task that fires the callback at each time, and returns a
//! [`ScheduleHandle`]. Must be called from within a Tokio runtime.
//!
//! # Overruns
//!
//! By default an overdue head fires immediately ("push-forward"): overdue
//! chimes drain FIFO. With [`ChimeBuilder::drop_overruns`] the scheduler
//! skips past-due heads and never fires late ("catch-up").
//!
//! # Termination
//!
//! Exactly one terminal edge occurs per schedule: exhaustion or
//! error-handler stop runs `on_finished`; a user close runs `on_aborted`
//! (falling back to `on_finished` if no abort handler was given). The
//! latch signals exactly once either way.

mod driver;
mod feed;
mod handle;

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::error::ChimeError;
use crate::times::ChimeTime;

use driver::{Callback, DriverOptions, ErrorHandler, TerminalHandler, drive};
use feed::{TimeFeed, TimeQueue};
use handle::Shared;

pub use handle::ScheduleHandle;

/// Schedule a callback over a lazy sequence of times, with default options.
///
/// Equivalent to `ChimeBuilder::new().start(times, callback)`.
pub fn chime_at<T, I, F, Fut>(times: I, callback: F) -> ScheduleHandle<T>
where
    T: ChimeTime + Clone,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    ChimeBuilder::new().start(times, callback)
}

/// Options for a schedule.
///
/// The default error handler logs the failure and continues the schedule.
pub struct ChimeBuilder {
    error_handler: Option<ErrorHandler>,
    on_finished: Option<TerminalHandler>,
    on_aborted: Option<TerminalHandler>,
    clock: Option<Arc<dyn Clock>>,
    drop_overruns: bool,
    mutable: bool,
}

impl ChimeBuilder {
    pub fn new() -> Self {
        Self {
            error_handler: None,
            on_finished: None,
            on_aborted: None,
            clock: None,
            drop_overruns: false,
            mutable: false,
        }
    }

    /// Decide per-error whether the schedule continues (true) or stops
    /// cleanly (false). Receives interruptions as
    /// [`ChimeError::Interrupted`].
    pub fn error_handler(mut self, f: impl FnMut(&ChimeError) -> bool + Send + 'static) -> Self {
        self.error_handler = Some(Box::new(f));
        self
    }

    /// Run when the sequence is exhausted or the error handler stops the
    /// schedule. Runs at most once.
    pub fn on_finished(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_finished = Some(Box::new(f));
        self
    }

    /// Run only when the user explicitly closes the handle. Runs at most
    /// once.
    pub fn on_aborted(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_aborted = Some(Box::new(f));
        self
    }

    /// Substitute the wall clock (testing hook).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Skip past-due heads instead of firing them immediately.
    pub fn drop_overruns(mut self, drop_overruns: bool) -> Self {
        self.drop_overruns = drop_overruns;
        self
    }

    /// Back the schedule with a shared FIFO queue that permits appends.
    ///
    /// The initial `times` are collected into the queue eagerly, so a
    /// mutable schedule starts from a finite sequence.
    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// Start the schedule. Must be called from within a Tokio runtime.
    pub fn start<T, I, F, Fut>(self, times: I, mut callback: F) -> ScheduleHandle<T>
    where
        T: ChimeTime + Clone,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);

        let (queue, feed) = if self.mutable {
            let queue = Arc::new(TimeQueue::new(times));
            (Some(queue.clone()), TimeFeed::Queue(queue))
        } else {
            (
                None,
                TimeFeed::Lazy(Box::new(times.into_iter()) as Box<dyn Iterator<Item = T> + Send>),
            )
        };

        let (done, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            done,
            close: CancellationToken::new(),
            current: std::sync::Mutex::new(None),
            clock: clock.clone(),
        });

        let opts = DriverOptions {
            error_handler: self
                .error_handler
                .unwrap_or_else(driver::default_error_handler),
            on_finished: self.on_finished,
            on_aborted: self.on_aborted,
            clock,
            drop_overruns: self.drop_overruns,
        };

        let callback: Callback<T> = Box::new(move |t| callback(t).boxed());
        tokio::spawn(drive(feed, callback, opts, shared.clone()));

        ScheduleHandle { shared, queue }
    }
}

impl Default for ChimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
