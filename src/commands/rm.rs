use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::error::AppError;
use crate::jobs::{Action, BatchReport, DeleteJob};
use crate::nimbusec::{Domain, EMPTY_FILTER, NimbusecApi};
use crate::pool::Pool;

use super::{BatchOutcome, Planned};

/// Deletes every remote domain whose name appears in `names`.
/// Names that are not registered remotely are skipped.
pub async fn run<A: NimbusecApi>(
    api: Arc<A>,
    names: &[String],
    workers: usize,
    dry_run: bool,
    report: BatchReport,
) -> Result<BatchOutcome, AppError> {
    let abort = report.abort_flag();
    let mut remote: HashMap<String, Domain> = api
        .find_domains(EMPTY_FILTER)
        .await?
        .into_iter()
        .map(|domain| (domain.name.clone(), domain))
        .collect();

    let mut pool = Pool::<DeleteJob<A>>::with_report(workers, report)?;
    pool.start()?;

    let mut planned = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        if abort.load(Ordering::SeqCst) {
            tracing::warn!("aborting after failure, remaining deletions skipped");
            break;
        }
        let Some(domain) = remote.remove(name) else {
            tracing::info!(domain = %name, "not registered, skipping");
            continue;
        };
        if dry_run {
            planned.push(Planned {
                action: Action::Delete,
                domain: domain.name,
            });
            continue;
        }
        pool.add(DeleteJob::new(Arc::clone(&api), domain)).await?;
    }
    pool.wait().await?;

    let report = pool.stop().await?;
    Ok(BatchOutcome { report, planned })
}
