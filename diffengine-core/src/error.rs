//! Error types for job execution and persistence.
//!
//! The teacher crate propagates `tokio_rusqlite::Error` directly and has no
//! dedicated error enum; this crate's jobs need to distinguish retryable
//! failures from permanent ones (see `JobError`), so a small `thiserror`
//! hierarchy is introduced for that one purpose, matching the pattern the
//! wider example pack uses for domain errors.

use thiserror::Error;

/// The three error kinds a job can fail with.
///
/// - `Transient`: a retry later may succeed (lock contention, a
///   not-yet-visible commit). The job is re-queued, not memoized as failed.
/// - `Fatal`: the input itself is broken (missing blob, corrupt tree). The
///   job's key is memoized in `changeseterrors` so it is never retried.
/// - `Logic`: a bug in this program. Always propagated, never swallowed.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal input error: {0}")]
    Fatal(String),

    #[error("internal logic error: {0}")]
    Logic(String),

    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),

    #[error("repository error: {0}")]
    Repository(String),
}

impl JobError {
    /// Whether this failure should be memoized in `changeseterrors` so the
    /// job is never retried for this changeset.
    pub fn is_permanent(&self) -> bool {
        matches!(self, JobError::Fatal(_))
    }
}

pub type JobResult<T> = Result<T, JobError>;
