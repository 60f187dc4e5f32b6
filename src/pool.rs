//! Bounded worker pool with a single serializing collector.
//!
//! `size` worker tasks pull jobs from a bounded intake channel and run
//! [`Job::work`] concurrently. Finished jobs go to one collector task which
//! runs [`Job::save`] against a report it owns, so saves never overlap and
//! need no locking. A pending counter tracks jobs from [`Pool::add`] until
//! their save completes; [`Pool::wait`] resolves when it drops to zero.
//!
//! Uses `async-channel` for the intake because its `Receiver` is `Clone`,
//! letting every worker pull from the same queue without a `Mutex`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};

/// A unit of work with a parallel phase and a serialized phase.
pub trait Job: Send + 'static {
    /// State owned by the collector and handed to every [`save`](Job::save).
    type Report: Send + 'static;

    /// Runs on any worker, concurrently with other jobs. Results belong on `self`.
    fn work(&mut self) -> impl Future<Output = ()> + Send;

    /// Runs exactly once per job on the collector, never overlapping another save.
    fn save(self, report: &mut Self::Report);
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool size must be at least 1")]
    InvalidSize,

    #[error("pool has not been started")]
    NotStarted,

    #[error("pool was already started")]
    AlreadyStarted,

    #[error("pool intake is closed")]
    Closed,

    #[error("collector stopped before all jobs were saved")]
    CollectorGone,

    #[error("pool task panicked: {0}")]
    Panicked(String),
}

/// Wait-group style counter of submitted but unsaved jobs.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    collector_gone: AtomicBool,
    idle: Notify,
}

impl Pending {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn complete(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn collector_stopped(&self) {
        self.collector_gone.store(true, Ordering::SeqCst);
        self.idle.notify_waiters();
    }

    async fn wait_idle(&self) -> Result<(), PoolError> {
        loop {
            // Registered before the checks so a wakeup between them is not lost.
            let notified = self.idle.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            if self.collector_gone.load(Ordering::SeqCst) {
                return Err(PoolError::CollectorGone);
            }
            notified.await;
        }
    }
}

/// Settles the pending count for a job that never reaches the collector.
/// Stays armed until the job has been handed on.
struct Unsaved<'a> {
    pending: &'a Pending,
    armed: bool,
}

impl<'a> Unsaved<'a> {
    fn new(pending: &'a Pending) -> Self {
        Self {
            pending,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Unsaved<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pending.complete();
        }
    }
}

/// Marks the collector as gone when its task ends, including by panic.
struct CollectorGuard(Arc<Pending>);

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        self.0.collector_stopped();
    }
}

struct Running<J: Job> {
    intake: async_channel::Sender<J>,
    workers: JoinSet<()>,
    collector: JoinHandle<J::Report>,
}

/// A fixed-size pool of workers plus one collector.
///
/// Lifecycle: [`new`](Pool::new) → [`start`](Pool::start) → any number of
/// [`add`](Pool::add) / [`wait`](Pool::wait) rounds → [`stop`](Pool::stop).
pub struct Pool<J: Job> {
    size: usize,
    pending: Arc<Pending>,
    report: Option<J::Report>,
    running: Option<Running<J>>,
}

impl<J: Job> Pool<J>
where
    J::Report: Default,
{
    /// Creates an unstarted pool with `size` workers and a default report.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        Self::with_report(size, J::Report::default())
    }
}

impl<J: Job> Pool<J> {
    /// Creates an unstarted pool whose collector will own `report`.
    pub fn with_report(size: usize, report: J::Report) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        Ok(Self {
            size,
            pending: Arc::new(Pending::default()),
            report: Some(report),
            running: None,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs added but not yet saved.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Spawns the workers and the collector. Must run inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), PoolError> {
        let report = self.report.take().ok_or(PoolError::AlreadyStarted)?;

        let (intake_tx, intake_rx) = async_channel::bounded::<J>(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel::<J>();

        let collector = tokio::spawn(collect(done_rx, report, Arc::clone(&self.pending)));

        let mut workers = JoinSet::new();
        for id in 0..self.size {
            workers.spawn(work_loop(
                id,
                intake_rx.clone(),
                done_tx.clone(),
                Arc::clone(&self.pending),
            ));
        }

        tracing::debug!(workers = self.size, "pool started");
        self.running = Some(Running {
            intake: intake_tx,
            workers,
            collector,
        });
        Ok(())
    }

    /// Submits a job, waiting until the intake has room for it.
    ///
    /// Cancel-safe: dropping the future before the job is queued leaves the
    /// pending count untouched.
    pub async fn add(&self, job: J) -> Result<(), PoolError> {
        let running = self.running.as_ref().ok_or(PoolError::NotStarted)?;

        self.pending.begin();
        let unsaved = Unsaved::new(&self.pending);
        running
            .intake
            .send(job)
            .await
            .map_err(|_| PoolError::Closed)?;
        unsaved.disarm();
        Ok(())
    }

    /// Resolves once every added job has been saved.
    pub async fn wait(&self) -> Result<(), PoolError> {
        self.pending.wait_idle().await
    }

    /// Closes the intake, lets the workers drain what is queued, and returns
    /// the report once the collector has saved every finished job.
    pub async fn stop(mut self) -> Result<J::Report, PoolError> {
        let Running {
            intake,
            mut workers,
            collector,
        } = self.running.take().ok_or(PoolError::NotStarted)?;

        intake.close();
        drop(intake);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "worker ended abnormally");
            }
        }

        let report = collector
            .await
            .map_err(|e| PoolError::Panicked(e.to_string()))?;
        tracing::debug!("pool stopped");
        Ok(report)
    }
}

async fn work_loop<J: Job>(
    id: usize,
    intake: async_channel::Receiver<J>,
    done: mpsc::UnboundedSender<J>,
    pending: Arc<Pending>,
) {
    tracing::trace!(worker_id = id, "worker started");
    while let Ok(job) = intake.recv().await {
        let unsaved = Unsaved::new(&pending);
        // Each `work` runs in its own task; a panic drops only that job.
        let job = match tokio::spawn(run_work(job)).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(worker_id = id, error = %e, "job failed during work, it will not be saved");
                continue;
            }
        };
        if done.send(job).is_err() {
            // Collector is gone; `unsaved` settles the count on drop.
            break;
        }
        unsaved.disarm();
    }
    tracing::trace!(worker_id = id, "worker exiting");
}

async fn run_work<J: Job>(mut job: J) -> J {
    job.work().await;
    job
}

async fn collect<J: Job>(
    mut done: mpsc::UnboundedReceiver<J>,
    mut report: J::Report,
    pending: Arc<Pending>,
) -> J::Report {
    let _guard = CollectorGuard(Arc::clone(&pending));
    while let Some(job) = done.recv().await {
        job.save(&mut report);
        pending.complete();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Tracks how many `work` calls run at once and how often `save` runs.
    #[derive(Default)]
    struct Probe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        saving: AtomicBool,
        events: Mutex<Vec<String>>,
    }

    struct ProbeJob {
        id: usize,
        delay: Duration,
        probe: Arc<Probe>,
    }

    #[derive(Default)]
    struct Tally {
        saved: Vec<usize>,
    }

    impl Job for ProbeJob {
        type Report = Tally;

        async fn work(&mut self) {
            let now = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_active.fetch_max(now, Ordering::SeqCst);
            self.probe
                .events
                .lock()
                .unwrap()
                .push(format!("work-start {}", self.id));
            tokio::time::sleep(self.delay).await;
            self.probe
                .events
                .lock()
                .unwrap()
                .push(format!("work-end {}", self.id));
            self.probe.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn save(self, report: &mut Tally) {
            let reentered = self.probe.saving.swap(true, Ordering::SeqCst);
            assert!(!reentered, "save calls overlapped");
            std::thread::sleep(Duration::from_millis(1));
            report.saved.push(self.id);
            self.probe.saving.store(false, Ordering::SeqCst);
        }
    }

    fn jobs(count: usize, delay: Duration, probe: &Arc<Probe>) -> Vec<ProbeJob> {
        (0..count)
            .map(|id| ProbeJob {
                id,
                delay,
                probe: Arc::clone(probe),
            })
            .collect()
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(matches!(
            Pool::<ProbeJob>::new(0),
            Err(PoolError::InvalidSize)
        ));
    }

    #[tokio::test]
    async fn add_before_start_fails_fast() {
        let probe = Arc::new(Probe::default());
        let pool = Pool::<ProbeJob>::new(2).unwrap();
        let job = jobs(1, Duration::ZERO, &probe).remove(0);
        assert!(matches!(pool.add(job).await, Err(PoolError::NotStarted)));
        assert_eq!(pool.pending(), 0);
        // Nothing was submitted, so waiting returns immediately.
        pool.wait().await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut pool = Pool::<ProbeJob>::new(1).unwrap();
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(PoolError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let pool = Pool::<ProbeJob>::new(1).unwrap();
        assert!(matches!(pool.stop().await, Err(PoolError::NotStarted)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_job_saved_once_and_concurrency_bounded() {
        for size in [1, 2, 8] {
            let probe = Arc::new(Probe::default());
            let mut pool = Pool::<ProbeJob>::new(size).unwrap();
            pool.start().unwrap();

            for job in jobs(24, Duration::from_millis(5), &probe) {
                pool.add(job).await.unwrap();
            }
            pool.wait().await.unwrap();
            assert_eq!(pool.pending(), 0);

            let mut report = pool.stop().await.unwrap();
            assert_eq!(report.saved.len(), 24, "size {size}");
            report.saved.sort_unstable();
            assert_eq!(report.saved, (0..24).collect::<Vec<_>>());
            assert!(probe.max_active.load(Ordering::SeqCst) <= size);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn work_runs_in_parallel_up_to_size() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::new(4).unwrap();
        pool.start().unwrap();

        for job in jobs(16, Duration::from_millis(30), &probe) {
            pool.add(job).await.unwrap();
        }
        pool.wait().await.unwrap();

        let max = probe.max_active.load(Ordering::SeqCst);
        assert!(max > 1, "expected overlap, got {max}");
        assert!(max <= 4);
    }

    #[tokio::test]
    async fn single_worker_is_a_sequential_pipeline() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::new(1).unwrap();
        pool.start().unwrap();

        for job in jobs(5, Duration::from_millis(2), &probe) {
            pool.add(job).await.unwrap();
        }
        pool.wait().await.unwrap();

        let events = probe.events.lock().unwrap().clone();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("work-start {i}"), format!("work-end {i}")])
            .collect();
        assert_eq!(events, expected);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);

        let report = pool.stop().await.unwrap();
        assert_eq!(report.saved, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn pool_is_reusable_across_wait_rounds() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::new(2).unwrap();
        pool.start().unwrap();

        for job in jobs(3, Duration::ZERO, &probe) {
            pool.add(job).await.unwrap();
        }
        pool.wait().await.unwrap();
        for job in jobs(2, Duration::ZERO, &probe) {
            pool.add(job).await.unwrap();
        }
        pool.wait().await.unwrap();

        let report = pool.stop().await.unwrap();
        assert_eq!(report.saved.len(), 5);
    }

    #[tokio::test]
    async fn stop_drains_jobs_not_yet_waited_for() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::new(2).unwrap();
        pool.start().unwrap();

        for job in jobs(6, Duration::from_millis(1), &probe) {
            pool.add(job).await.unwrap();
        }
        let report = pool.stop().await.unwrap();
        assert_eq!(report.saved.len(), 6);
    }

    #[tokio::test]
    async fn with_report_hands_state_to_collector() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::with_report(1, Tally { saved: vec![99] }).unwrap();
        pool.start().unwrap();
        for job in jobs(1, Duration::ZERO, &probe) {
            pool.add(job).await.unwrap();
        }
        let report = pool.stop().await.unwrap();
        assert_eq!(report.saved, vec![99, 0]);
    }

    struct Panicky {
        in_work: bool,
    }

    impl Job for Panicky {
        type Report = usize;

        async fn work(&mut self) {
            if self.in_work {
                panic!("work exploded");
            }
        }

        fn save(self, saved: &mut usize) {
            if !self.in_work {
                panic!("save exploded");
            }
            *saved += 1;
        }
    }

    struct Flaky {
        explode: bool,
    }

    impl Job for Flaky {
        type Report = usize;

        async fn work(&mut self) {
            if self.explode {
                panic!("work exploded");
            }
        }

        fn save(self, saved: &mut usize) {
            *saved += 1;
        }
    }

    #[tokio::test]
    async fn panicking_work_does_not_hang_wait() {
        let mut pool = Pool::<Panicky>::new(2).unwrap();
        pool.start().unwrap();
        pool.add(Panicky { in_work: true }).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("wait hung")
            .unwrap();
    }

    #[tokio::test]
    async fn worker_survives_a_panicking_job() {
        let mut pool = Pool::<Flaky>::new(1).unwrap();
        pool.start().unwrap();

        pool.add(Flaky { explode: true }).await.unwrap();
        pool.wait().await.unwrap();

        pool.add(Flaky { explode: false }).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("wait hung")
            .unwrap();
        assert_eq!(pool.stop().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn job_queued_behind_a_panicking_one_is_saved() {
        let mut pool = Pool::<Flaky>::new(1).unwrap();
        pool.start().unwrap();

        pool.add(Flaky { explode: true }).await.unwrap();
        pool.add(Flaky { explode: false }).await.unwrap();
        pool.add(Flaky { explode: false }).await.unwrap();
        pool.wait().await.unwrap();

        assert_eq!(pool.stop().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cancelled_add_does_not_block_wait() {
        let probe = Arc::new(Probe::default());
        let mut pool = Pool::<ProbeJob>::new(1).unwrap();
        pool.start().unwrap();

        let mut batch = jobs(3, Duration::from_millis(50), &probe);
        let third = batch.pop().unwrap();
        for job in batch {
            pool.add(job).await.unwrap();
        }

        // One job running, one buffered: the third cannot be queued in time.
        let cancelled = tokio::time::timeout(Duration::from_millis(10), pool.add(third)).await;
        assert!(cancelled.is_err());

        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("wait hung")
            .unwrap();
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.stop().await.unwrap().saved.len(), 2);
    }

    #[tokio::test]
    async fn dead_collector_is_reported_by_wait() {
        let mut pool = Pool::<Panicky>::new(1).unwrap();
        pool.start().unwrap();
        pool.add(Panicky { in_work: false }).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("wait hung");
        assert!(matches!(result, Err(PoolError::CollectorGone)));
    }
}
