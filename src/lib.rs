//! Carillon - time-driven job scheduling over lazy sequences of instants.
//!
//! A schedule is a `(times, callback)` pair: a lazy, possibly infinite,
//! monotone sequence of future times and a callback invoked at each one.
//! [`chime_at`] drives a single schedule on its own task, serializing
//! callbacks within the schedule while schedules run concurrently with
//! each other. The returned [`ScheduleHandle`] represents both the whole
//! schedule (close, await, pending) and its currently pending firing
//! (cancel, remaining delay).
//!
//! # Usage
//!
//! ```ignore
//! use carillon::{chime_at, times};
//! use chrono::{Duration, Utc};
//!
//! let schedule = chime_at(
//!     times::periodic(Utc::now() + Duration::seconds(1), Duration::seconds(30)),
//!     |t| async move {
//!         println!("chime at {t}");
//!         Ok(())
//!     },
//! );
//!
//! schedule.wait().await;
//! ```
//!
//! Cron expressions compile to the same kind of lazy sequence:
//!
//! ```ignore
//! let every_morning = carillon::cron::parse("30 9 * * MON-FRI")?;
//! let schedule = chime_at(every_morning.upcoming(&clock), callback);
//! ```
//!
//! Many named jobs compose under a [`Coordinator`], and [`chime_ch`]
//! bridges a schedule into a bounded queue.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod clock;
pub mod error;
pub mod times;

// ============================================================================
// Domain
// ============================================================================

pub mod channel;
pub mod coordinator;
pub mod cron;
pub mod schedule;

pub use channel::{ChannelOptions, ChimeReceiver, OverflowPolicy, chime_ch};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, CoordinatorBuilder, Job};
pub use error::{ChimeError, CronError, Result};
pub use schedule::{ChimeBuilder, ScheduleHandle, chime_at};
pub use times::ChimeTime;
