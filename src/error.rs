use thiserror::Error;

/// Errors surfaced by the brief engine.
///
/// Only failures of critical sub-queries (organisation lookup, reference
/// data, the primary financial aggregation) reach the caller; non-critical
/// sections degrade locally and log instead.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;
