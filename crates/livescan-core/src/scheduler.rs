/// Refresh scheduler — one background worker executing refresh jobs.
///
/// Two ways to submit work to the same FIFO queue:
///
/// - **Durable** ([`RefreshScheduler::submit`]): always queued, never
///   dropped, run in submission order.
/// - **Droppable** ([`RefreshScheduler::submit_latest`]): written into a
///   single pending slot. If the slot was already occupied the older job is
///   replaced and nothing new is queued; otherwise a drain task is queued.
///   When the worker reaches a drain task it takes whatever job is in the
///   slot at that moment, runs it, then sleeps for the minimum refresh
///   interval. A burst of droppable submissions therefore costs at most one
///   extra execution, and that execution is the latest request.
///
/// There is no priority between the two: a durable job waits behind any
/// drain task queued before it, including that task's sleep.
///
/// A job that panics is caught and logged; the worker carries on. A job
/// that never returns stalls the worker, and with it every later job.
///
/// The worker exits once every clone of the scheduler has been dropped and
/// the queue is drained. Jobs already queued still run.
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// A unit of refresh work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Task {
    Durable(Job),
    /// Run whatever job is in the pending slot, then back off.
    DrainLatest,
}

/// Counters shared between submitters and the worker.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    executed: AtomicU64,
    superseded: AtomicU64,
    panicked: AtomicU64,
}

impl SchedulerStats {
    /// Jobs run to completion or panic.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Droppable jobs replaced before they ran.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

/// Handle to the refresh worker. Cheap to clone.
#[derive(Clone)]
pub struct RefreshScheduler {
    tx: Sender<Task>,
    pending: Arc<Mutex<Option<Job>>>,
    stats: Arc<SchedulerStats>,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("queued", &self.tx.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl RefreshScheduler {
    /// Spawn the worker thread.
    ///
    /// `min_interval` is the pause after every droppable job.
    pub fn start(min_interval: Duration) -> std::io::Result<Self> {
        let (tx, rx) = unbounded::<Task>();
        let pending: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(None));
        let stats = Arc::new(SchedulerStats::default());

        let worker_pending = pending.clone();
        let worker_stats = stats.clone();
        thread::Builder::new()
            .name("livescan-refresh".into())
            .spawn(move || run_worker(rx, worker_pending, worker_stats, min_interval))?;

        Ok(Self { tx, pending, stats })
    }

    /// Queue a job that must run exactly once.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Task::Durable(Box::new(job))).is_err() {
            warn!("Refresh worker has stopped; durable job discarded");
        }
    }

    /// Request a job that may be superseded by a later request.
    pub fn submit_latest<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let previous = self.pending.lock().replace(Box::new(job));
        if previous.is_some() {
            self.stats.superseded.fetch_add(1, Ordering::Relaxed);
            debug!("Superseded pending refresh");
            return;
        }
        if self.tx.send(Task::DrainLatest).is_err() {
            self.pending.lock().take();
            warn!("Refresh worker has stopped; refresh discarded");
        }
    }

    /// Block until every job queued before this call has run, or until
    /// `timeout` expires. Returns `true` if the queue drained in time.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        self.submit(move || {
            let _ = done_tx.send(());
        });
        done_rx.recv_timeout(timeout).is_ok()
    }

    /// Whether a droppable job is waiting in the slot.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

fn run_worker(
    rx: Receiver<Task>,
    pending: Arc<Mutex<Option<Job>>>,
    stats: Arc<SchedulerStats>,
    min_interval: Duration,
) {
    debug!("Refresh worker started");
    for task in rx.iter() {
        match task {
            Task::Durable(job) => run_job(job, &stats),
            Task::DrainLatest => {
                // Take the slot in its own statement so the lock is released
                // before the job runs and new submissions can fill it again.
                let latest = pending.lock().take();
                if let Some(job) = latest {
                    run_job(job, &stats);
                    thread::sleep(min_interval);
                }
            }
        }
    }
    debug!("Refresh worker stopped");
}

fn run_job(job: Job, stats: &SchedulerStats) {
    let result = catch_unwind(AssertUnwindSafe(job));
    stats.executed.fetch_add(1, Ordering::Relaxed);
    if result.is_err() {
        stats.panicked.fetch_add(1, Ordering::Relaxed);
        error!("Refresh job panicked; worker continues");
    }
}
