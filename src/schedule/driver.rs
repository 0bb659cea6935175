//! The per-schedule dispatch loop.
//!
//! One driver task per schedule: fetch the next time, sleep until it,
//! race cancellation, run the callback inline. Callbacks are therefore
//! serialized within a schedule while schedules run concurrently with
//! each other. The driver is the sole runner of terminal handlers, which
//! makes the exactly-once terminal edge structural.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, trace, warn};

use crate::clock::Clock;
use crate::error::ChimeError;
use crate::times::ChimeTime;

use super::feed::TimeFeed;
use super::handle::{Fire, Shared};

pub(crate) type Callback<T> = Box<dyn FnMut(T) -> BoxFuture<'static, anyhow::Result<()>> + Send>;
pub(crate) type ErrorHandler = Box<dyn FnMut(&ChimeError) -> bool + Send>;
pub(crate) type TerminalHandler = Box<dyn FnOnce() + Send>;

pub(crate) struct DriverOptions {
    pub(crate) error_handler: ErrorHandler,
    pub(crate) on_finished: Option<TerminalHandler>,
    pub(crate) on_aborted: Option<TerminalHandler>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) drop_overruns: bool,
}

enum Terminal {
    /// Sequence exhausted or the error handler stopped the schedule.
    Finished,
    /// The user closed the handle.
    Aborted,
}

pub(crate) async fn drive<T: ChimeTime + Clone>(
    mut feed: TimeFeed<T>,
    mut callback: Callback<T>,
    mut opts: DriverOptions,
    shared: Arc<Shared>,
) {
    loop {
        if shared.close.is_cancelled() {
            finish(&shared, &mut opts, Terminal::Aborted);
            return;
        }

        let Some(t) = feed.next() else {
            finish(&shared, &mut opts, Terminal::Finished);
            return;
        };

        let at = t.instant();
        let delay = at - opts.clock.now();

        // Catch-up: skip heads already in the past. Push-forward (the
        // default) falls through and fires with zero delay.
        if delay <= chrono::Duration::zero() && opts.drop_overruns {
            trace!(at = %at, "dropping overrun chime");
            continue;
        }

        let fire = Arc::new(Fire::new(at));
        shared.set_current(Some(fire.clone()));
        let sleep_for = delay.to_std().unwrap_or(std::time::Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = fire.token.cancelled() => {
                // Cancelled before start: reschedule from the tail.
                debug!(at = %at, "pending chime cancelled, rescheduling from tail");
                shared.set_current(None);
                continue;
            }
            _ = shared.close.cancelled() => {
                fire.cancelled.store(true, Ordering::SeqCst);
                shared.set_current(None);
                finish(&shared, &mut opts, Terminal::Aborted);
                return;
            }
        }

        // A cancel or close may land between the timer firing and the
        // callback starting.
        if fire.cancelled.load(Ordering::SeqCst) {
            shared.set_current(None);
            continue;
        }
        if shared.close.is_cancelled() {
            shared.set_current(None);
            finish(&shared, &mut opts, Terminal::Aborted);
            return;
        }

        fire.started.store(true, Ordering::SeqCst);
        let invocation = AssertUnwindSafe(callback(t)).catch_unwind();
        let result = tokio::select! {
            outcome = invocation => match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ChimeError::Callback(err)),
                Err(panic) => Err(ChimeError::Callback(anyhow::anyhow!(
                    "callback panicked: {}",
                    panic_message(&panic)
                ))),
            },
            _ = fire.token.cancelled() => Err(ChimeError::Interrupted),
        };
        shared.set_current(None);

        if let Err(err) = result {
            let verdict =
                std::panic::catch_unwind(AssertUnwindSafe(|| (opts.error_handler)(&err)));
            match verdict {
                Ok(true) => {}
                Ok(false) => {
                    debug!("error handler stopped the schedule");
                    finish(&shared, &mut opts, Terminal::Finished);
                    return;
                }
                Err(_) => {
                    error!("error handler panicked, stopping schedule");
                    finish(&shared, &mut opts, Terminal::Finished);
                    return;
                }
            }
        }

        if shared.close.is_cancelled() {
            finish(&shared, &mut opts, Terminal::Aborted);
            return;
        }
    }
}

/// Signal the latch and run the terminal handler for this edge.
///
/// Called exactly once per schedule: every exit path of the driver loop
/// runs through here and returns immediately after.
fn finish(shared: &Shared, opts: &mut DriverOptions, terminal: Terminal) {
    shared.set_current(None);
    // send_replace signals the latch even when no awaiter subscribed yet.
    shared.done.send_replace(true);

    match terminal {
        Terminal::Finished => {
            debug!("schedule finished");
            if let Some(on_finished) = opts.on_finished.take() {
                on_finished();
            }
        }
        Terminal::Aborted => {
            debug!("schedule aborted");
            if let Some(on_aborted) = opts.on_aborted.take() {
                on_aborted();
            } else if let Some(on_finished) = opts.on_finished.take() {
                on_finished();
            }
        }
    }
}

pub(crate) fn default_error_handler() -> ErrorHandler {
    Box::new(|err| {
        warn!(error = %err, "chime callback failed, continuing schedule");
        true
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
