//! Drivers for each subcommand: read input, submit jobs, report.

pub mod agent_config;
pub mod get;
pub mod infected;
pub mod rm;
pub mod sync;

use crate::error::AppError;
use crate::jobs::{Action, BatchReport};

/// A change `--dry-run` would have made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned {
    pub action: Action,
    pub domain: String,
}

/// Report of a batch plus the changes skipped by `--dry-run`.
pub struct BatchOutcome {
    pub report: BatchReport,
    pub planned: Vec<Planned>,
}

impl BatchOutcome {
    /// Prints the plan and summary; fails if any job failed.
    pub fn conclude(&self) -> Result<(), AppError> {
        let progress = self.report.progress();
        for change in &self.planned {
            progress.planned(&change.action.to_string(), &change.domain);
        }
        self.report.finish();

        let failed = self.report.failures.len();
        if failed > 0 {
            for failure in &self.report.failures {
                tracing::error!(%failure, "operation failed");
            }
            return Err(AppError::BatchFailed {
                failed,
                total: failed + self.report.succeeded(),
            });
        }
        Ok(())
    }
}
