use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::AppError;
use crate::import::DomainRow;
use crate::jobs::{Action, BatchReport, DeleteJob, DomainJob, UpsertJob};
use crate::nimbusec::{EMPTY_FILTER, NimbusecApi};
use crate::pool::Pool;

use super::{BatchOutcome, Planned};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Update existing domains instead of leaving them untouched.
    pub update: bool,
    /// Delete remote domains missing from the input.
    pub delete: bool,
    pub dry_run: bool,
    pub workers: usize,
    pub throttle: Duration,
}

/// Upserts every row, then optionally deletes remote domains not in `rows`.
///
/// The delete phase only starts after every upsert has been saved, and is
/// skipped entirely once the report's abort flag is raised.
pub async fn run<A: NimbusecApi>(
    api: Arc<A>,
    rows: &[DomainRow],
    options: &SyncOptions,
    report: BatchReport,
) -> Result<BatchOutcome, AppError> {
    let abort = report.abort_flag();
    let listed: HashSet<&str> = rows.iter().map(|row| row.name.as_str()).collect();
    let mut planned = Vec::new();

    let mut pool = Pool::<DomainJob<A>>::with_report(options.workers, report)?;
    pool.start()?;
    tracing::info!(rows = rows.len(), workers = pool.size(), "syncing domains");

    for row in rows {
        if abort.load(Ordering::SeqCst) {
            tracing::warn!("aborting after failure, remaining rows skipped");
            break;
        }
        if options.dry_run {
            planned.push(Planned {
                action: Action::Upsert,
                domain: row.name.clone(),
            });
            continue;
        }
        let job = UpsertJob::new(
            Arc::clone(&api),
            row.to_domain(),
            options.update,
            options.throttle,
        );
        pool.add(job.into()).await?;
    }
    pool.wait().await?;

    if options.delete && !abort.load(Ordering::SeqCst) {
        let remote = api.find_domains(EMPTY_FILTER).await?;
        let stale = remote
            .into_iter()
            .filter(|domain| !listed.contains(domain.name.as_str()));

        for domain in stale {
            if abort.load(Ordering::SeqCst) {
                tracing::warn!("aborting after failure, remaining deletions skipped");
                break;
            }
            if options.dry_run {
                planned.push(Planned {
                    action: Action::Delete,
                    domain: domain.name,
                });
                continue;
            }
            pool.add(DeleteJob::new(Arc::clone(&api), domain).into())
                .await?;
        }
        pool.wait().await?;
    }

    let report = pool.stop().await?;
    Ok(BatchOutcome { report, planned })
}
