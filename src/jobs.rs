//! Domain jobs submitted to the [`Pool`](crate::pool::Pool).
//!
//! Remote calls happen in `work` and their result is kept on the job; all
//! reporting happens in `save`, which the pool serializes, so the
//! [`BatchReport`] is updated without locks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::nimbusec::{ApiError, Domain, NimbusecApi};
use crate::pool::Job;
use crate::ui::BatchProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upsert,
    Delete,
    FetchResults,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Upsert => write!(f, "upsert"),
            Action::Delete => write!(f, "delete"),
            Action::FetchResults => write!(f, "fetch results for"),
        }
    }
}

/// A job whose remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub action: Action,
    pub domain: String,
    pub error: String,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.domain, self.error)
    }
}

/// Outcome of a batch, owned by the pool's collector.
pub struct BatchReport {
    pub upserted: usize,
    pub deleted: usize,
    pub failures: Vec<JobFailure>,
    fail_fast: bool,
    abort: Arc<AtomicBool>,
    progress: BatchProgress,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new(BatchProgress::hidden(), false)
    }
}

impl BatchReport {
    /// With `fail_fast`, the first failure raises the [`abort_flag`](Self::abort_flag).
    pub fn new(progress: BatchProgress, fail_fast: bool) -> Self {
        Self {
            upserted: 0,
            deleted: 0,
            failures: Vec::new(),
            fail_fast,
            abort: Arc::new(AtomicBool::new(false)),
            progress,
        }
    }

    /// Shared flag drivers poll before each submission.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn progress(&self) -> &BatchProgress {
        &self.progress
    }

    pub fn succeeded(&self) -> usize {
        self.upserted + self.deleted
    }

    pub fn finish(&self) {
        self.progress.finish(self.succeeded(), self.failures.len());
    }

    fn record_success(&mut self, action: Action, domain: &str) {
        match action {
            Action::Upsert => self.upserted += 1,
            Action::Delete => self.deleted += 1,
            Action::FetchResults => {}
        }
        self.progress.success(&action.to_string(), domain);
    }

    fn record_failure(&mut self, action: Action, domain: &str, error: &ApiError) {
        tracing::warn!(%action, domain, %error, "remote call failed");
        self.progress
            .failure(&action.to_string(), domain, &error.to_string());
        self.failures.push(JobFailure {
            action,
            domain: domain.to_string(),
            error: error.to_string(),
        });
        if self.fail_fast {
            self.abort.store(true, Ordering::SeqCst);
        }
    }

    fn record<T>(&mut self, action: Action, domain: &str, outcome: Option<Result<T, ApiError>>) {
        match outcome {
            Some(Ok(_)) => self.record_success(action, domain),
            Some(Err(e)) => self.record_failure(action, domain, &e),
            None => tracing::error!(%action, domain, "job saved before its work ran"),
        }
    }
}

/// Creates the domain, then updates it (`update`) or leaves the remote copy
/// alone. The throttle sleep runs inside the worker slot, so it paces the
/// whole pool rather than one job.
pub struct UpsertJob<A> {
    api: Arc<A>,
    domain: Domain,
    update: bool,
    throttle: Duration,
    outcome: Option<Result<Domain, ApiError>>,
}

impl<A: NimbusecApi> UpsertJob<A> {
    pub fn new(api: Arc<A>, domain: Domain, update: bool, throttle: Duration) -> Self {
        Self {
            api,
            domain,
            update,
            throttle,
            outcome: None,
        }
    }
}

impl<A: NimbusecApi> Job for UpsertJob<A> {
    type Report = BatchReport;

    async fn work(&mut self) {
        tracing::debug!(domain = %self.domain.name, update = self.update, "upserting domain");
        let result = if self.update {
            self.api.create_or_update_domain(&self.domain).await
        } else {
            self.api.create_or_get_domain(&self.domain).await
        };
        self.outcome = Some(result);

        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }
    }

    fn save(self, report: &mut BatchReport) {
        report.record(Action::Upsert, &self.domain.name, self.outcome);
    }
}

/// Deletes a domain together with all of its data.
pub struct DeleteJob<A> {
    api: Arc<A>,
    domain: Domain,
    outcome: Option<Result<(), ApiError>>,
}

impl<A: NimbusecApi> DeleteJob<A> {
    pub fn new(api: Arc<A>, domain: Domain) -> Self {
        Self {
            api,
            domain,
            outcome: None,
        }
    }
}

impl<A: NimbusecApi> Job for DeleteJob<A> {
    type Report = BatchReport;

    async fn work(&mut self) {
        tracing::debug!(domain = %self.domain.name, "deleting domain");
        self.outcome = Some(self.api.delete_domain(&self.domain, true).await);
    }

    fn save(self, report: &mut BatchReport) {
        report.record(Action::Delete, &self.domain.name, self.outcome);
    }
}

/// Either kind of domain job, so one pool can run both phases of a sync.
pub enum DomainJob<A> {
    Upsert(UpsertJob<A>),
    Delete(DeleteJob<A>),
}

impl<A: NimbusecApi> Job for DomainJob<A> {
    type Report = BatchReport;

    async fn work(&mut self) {
        match self {
            DomainJob::Upsert(job) => job.work().await,
            DomainJob::Delete(job) => job.work().await,
        }
    }

    fn save(self, report: &mut BatchReport) {
        match self {
            DomainJob::Upsert(job) => job.save(report),
            DomainJob::Delete(job) => job.save(report),
        }
    }
}

impl<A> From<UpsertJob<A>> for DomainJob<A> {
    fn from(job: UpsertJob<A>) -> Self {
        DomainJob::Upsert(job)
    }
}

impl<A> From<DeleteJob<A>> for DomainJob<A> {
    fn from(job: DeleteJob<A>) -> Self {
        DomainJob::Delete(job)
    }
}
