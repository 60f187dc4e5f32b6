use thiserror::Error;

use crate::nimbusec::ApiError;
use crate::pool::PoolError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid input on line {line}: {reason}")]
    Input { line: u64, reason: String },

    #[error("{failed} of {total} operations failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("nimbusec API error: {0}")]
    Api(#[from] ApiError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
