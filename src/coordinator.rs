//! Multi-job coordinator.
//!
//! Composes many single-stream schedules under one id-keyed map. All map
//! mutations flow through a single mutator task fed by a command channel,
//! applied in submission order; queries read a coherent snapshot. Jobs
//! remove themselves from the map when they finish or abort.
//!
//! # Usage
//!
//! ```ignore
//! let coordinator: Coordinator<DateTime<Utc>> = Coordinator::builder().start();
//!
//! coordinator.schedule([Job::new(
//!     "heartbeat",
//!     || times::periodic(Utc::now(), Duration::seconds(30)),
//!     |t| async move { beat(t).await },
//! )]);
//!
//! let ids = coordinator.scheduled_ids().await;
//! coordinator.unschedule(["heartbeat"]);
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ChimeError;
use crate::schedule::{ChimeBuilder, ScheduleHandle};
use crate::times::ChimeTime;

/// Command to the coordinator's mutator task.
enum Command<T> {
    Insert(String, JobEntry<T>),
    Remove { ids: Option<Vec<String>>, hard: bool },
    /// Removal submitted by a job's own terminal handler. Carries the job's
    /// sequence number so a stale removal cannot evict a replacement job
    /// scheduled under the same id.
    SelfRemove(String, u64),
    Shutdown,
}

struct JobEntry<T> {
    seq: u64,
    handle: ScheduleHandle<T>,
}

/// A named job: an id, a times thunk evaluated exactly once at schedule
/// time, and a callback.
pub struct Job<T> {
    id: String,
    times: Box<dyn FnOnce() -> Box<dyn Iterator<Item = T> + Send> + Send>,
    callback: Box<dyn FnMut(T) -> BoxFuture<'static, anyhow::Result<()>> + Send>,
}

impl<T: ChimeTime + Clone> Job<T> {
    pub fn new<G, I, F, Fut>(id: impl Into<String>, times_fn: G, mut callback: F) -> Self
    where
        G: FnOnce() -> I + Send + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            times: Box::new(move || Box::new(times_fn().into_iter())),
            callback: Box::new(move |t| callback(t).boxed()),
        }
    }
}

type IdErrorHandler = Arc<dyn Fn(&str, &ChimeError) -> bool + Send + Sync>;
type IdHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for a [`Coordinator`].
pub struct CoordinatorBuilder {
    error_handler: Option<IdErrorHandler>,
    on_finished: Option<IdHandler>,
    on_aborted: Option<IdHandler>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            error_handler: None,
            on_finished: None,
            on_aborted: None,
            clock: None,
        }
    }

    /// Id-aware error handler applied to every job.
    pub fn error_handler(
        mut self,
        f: impl Fn(&str, &ChimeError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(f));
        self
    }

    /// Id-aware hook run after a job finishes and removes itself.
    pub fn on_finished(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_finished = Some(Arc::new(f));
        self
    }

    /// Id-aware hook run after a job is aborted and removes itself.
    pub fn on_aborted(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_aborted = Some(Arc::new(f));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Spawn the mutator task and return the coordinator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<T: ChimeTime + Clone>(self) -> Coordinator<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let jobs = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(run(rx, jobs.clone()));

        Coordinator {
            tx,
            jobs,
            next_seq: Arc::new(AtomicU64::new(0)),
            error_handler: self.error_handler.unwrap_or_else(|| {
                Arc::new(|id: &str, err: &ChimeError| {
                    warn!(job_id = %id, error = %err, "job callback failed, continuing");
                    true
                })
            }),
            on_finished: self.on_finished,
            on_aborted: self.on_aborted,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>),
        }
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The multi-job front-end: a serialized `id -> handle` map.
///
/// Cloneable; all clones share the same job map.
pub struct Coordinator<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    jobs: Arc<RwLock<HashMap<String, JobEntry<T>>>>,
    next_seq: Arc<AtomicU64>,
    error_handler: IdErrorHandler,
    on_finished: Option<IdHandler>,
    on_aborted: Option<IdHandler>,
    clock: Arc<dyn Clock>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            jobs: self.jobs.clone(),
            next_seq: self.next_seq.clone(),
            error_handler: self.error_handler.clone(),
            on_finished: self.on_finished.clone(),
            on_aborted: self.on_aborted.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<T: ChimeTime + Clone> Coordinator<T> {
    /// Create a coordinator with default options.
    pub fn new() -> Self {
        CoordinatorBuilder::new().start()
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    /// Register named jobs.
    ///
    /// Each job's times thunk is evaluated now, exactly once; its terminal
    /// handlers are wrapped so the job removes itself from the map before
    /// the coordinator's id-aware hooks run. Scheduling an id that is
    /// already present replaces it (the old job is shut down gracefully).
    pub fn schedule(&self, jobs: impl IntoIterator<Item = Job<T>>) {
        for job in jobs {
            let id = job.id.clone();
            let entry = self.start_job(job);
            let _ = self.tx.send(Command::Insert(id, entry));
        }
    }

    fn start_job(&self, job: Job<T>) -> JobEntry<T> {
        let times = (job.times)();
        let mut callback = job.callback;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let error_handler = self.error_handler.clone();
        let error_id = job.id.clone();

        let finished_tx = self.tx.clone();
        let finished_id = job.id.clone();
        let user_on_finished = self.on_finished.clone();

        let aborted_tx = self.tx.clone();
        let aborted_id = job.id;
        let user_on_aborted = self.on_aborted.clone();
        let fallback_on_finished = self.on_finished.clone();

        let handle = ChimeBuilder::new()
            .clock(self.clock.clone())
            .error_handler(move |err| error_handler(&error_id, err))
            .on_finished(move || {
                let _ = finished_tx.send(Command::SelfRemove(finished_id.clone(), seq));
                if let Some(on_finished) = user_on_finished {
                    on_finished(&finished_id);
                }
            })
            .on_aborted(move || {
                let _ = aborted_tx.send(Command::SelfRemove(aborted_id.clone(), seq));
                if let Some(on_aborted) = user_on_aborted {
                    on_aborted(&aborted_id);
                } else if let Some(on_finished) = fallback_on_finished {
                    on_finished(&aborted_id);
                }
            })
            .start(times, move |t| callback(t));

        JobEntry { seq, handle }
    }

    /// Gracefully shut down and remove the named jobs.
    pub fn unschedule<S: Into<String>>(&self, ids: impl IntoIterator<Item = S>) {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let _ = self.tx.send(Command::Remove {
            ids: Some(ids),
            hard: false,
        });
    }

    /// Gracefully shut down and remove every job.
    pub fn unschedule_all(&self) {
        let _ = self.tx.send(Command::Remove {
            ids: None,
            hard: false,
        });
    }

    /// Hard-shutdown and remove the named jobs, interrupting running
    /// callbacks.
    pub fn unschedule_now<S: Into<String>>(&self, ids: impl IntoIterator<Item = S>) {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let _ = self.tx.send(Command::Remove {
            ids: Some(ids),
            hard: true,
        });
    }

    /// Defer a graceful unschedule by `delay`, via a one-shot chime.
    pub fn unschedule_after<S: Into<String>>(
        &self,
        ids: impl IntoIterator<Item = S>,
        delay: std::time::Duration,
    ) {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        let tx = self.tx.clone();
        let at = self.clock.now() + chrono::Duration::from_std(delay).unwrap_or_default();

        // The deferred mutation is itself a schedule; its handle is
        // dropped and the driver runs detached.
        let _ = ChimeBuilder::new()
            .clock(self.clock.clone())
            .start(std::iter::once(at), move |_| {
                let tx = tx.clone();
                let ids = ids.clone();
                async move {
                    let _ = tx.send(Command::Remove {
                        ids: Some(ids),
                        hard: false,
                    });
                    Ok(())
                }
            });
    }

    /// Ids of the currently scheduled jobs, sorted.
    pub async fn scheduled_ids(&self) -> Vec<String> {
        let jobs = self.jobs.read().await;
        let mut ids: Vec<String> = jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The next firing of a job, or `None` if the job is unknown or its
    /// pending fire is past or cancelled.
    pub async fn upcoming_chime_at(&self, id: &str) -> Option<DateTime<Tz>> {
        let jobs = self.jobs.read().await;
        let at = jobs.get(id)?.handle.current_at()?;
        if at.with_timezone(&Utc) < self.clock.now() {
            return None;
        }
        Some(at)
    }

    /// The next firing of every job with an upcoming one.
    pub async fn upcoming_chimes(&self) -> HashMap<String, DateTime<Tz>> {
        let now = self.clock.now();
        let jobs = self.jobs.read().await;
        jobs.iter()
            .filter_map(|(id, entry)| {
                let at = entry.handle.current_at()?;
                if at.with_timezone(&Utc) < now {
                    return None;
                }
                Some((id.clone(), at))
            })
            .collect()
    }

    /// Duration from now to the earliest upcoming chime across all jobs.
    pub async fn until_next_chime(&self) -> Option<chrono::Duration> {
        let now = self.clock.now();
        let upcoming = self.upcoming_chimes().await;
        upcoming
            .values()
            .map(|at| at.with_timezone(&Utc) - now)
            .min()
    }

    /// Tear down every job and stop the mutator task.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

impl<T: ChimeTime + Clone> Default for Coordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The mutator task: applies commands in submission order.
async fn run<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    jobs: Arc<RwLock<HashMap<String, JobEntry<T>>>>,
) {
    debug!("coordinator started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Insert(id, entry) => {
                let mut jobs = jobs.write().await;
                if let Some(old) = jobs.insert(id.clone(), entry) {
                    warn!(job_id = %id, "replacing existing job");
                    old.handle.shutdown();
                }
                debug!(job_id = %id, "job scheduled");
            }
            Command::SelfRemove(id, seq) => {
                let mut jobs = jobs.write().await;
                if jobs.get(&id).is_some_and(|entry| entry.seq == seq) {
                    jobs.remove(&id);
                    debug!(job_id = %id, "job finished and removed");
                }
            }
            Command::Remove { ids, hard } => {
                let mut jobs = jobs.write().await;
                let targets: Vec<String> = match ids {
                    Some(ids) => ids,
                    None => jobs.keys().cloned().collect(),
                };
                for id in targets {
                    if let Some(entry) = jobs.remove(&id) {
                        if hard {
                            entry.handle.shutdown_now();
                        } else {
                            entry.handle.shutdown();
                        }
                        debug!(job_id = %id, hard, "job unscheduled");
                    }
                }
            }
            Command::Shutdown => break,
        }
    }

    // Channel closed or explicit shutdown: tear down remaining jobs.
    let mut jobs = jobs.write().await;
    for (id, entry) in jobs.drain() {
        entry.handle.shutdown();
        debug!(job_id = %id, "job shut down with coordinator");
    }
    debug!("coordinator stopped");
}
