use thiserror::Error;

/// Storage-layer failures, classified so callers can tell a missing row
/// from a broken constraint from a connection-level problem.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("transient storage failure: {0}")]
    Transient(sqlx::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
            {
                StorageError::Constraint(db_err.message().to_string())
            }
            other => StorageError::Transient(other),
        }
    }
}

/// Engine-layer errors surfaced to the transport.
///
/// A duplicate vote is deliberately absent here: it is a success outcome
/// (`VoteOutcome::AlreadyVoted`), not a failure.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("vote submission is missing an option id")]
    MissingOption,

    #[error("option id {0:?} is not a valid identifier")]
    MalformedOption(String),

    #[error("option {0} does not exist")]
    OptionNotFound(i64),

    #[error("poll {0} does not exist")]
    PollNotFound(i64),

    #[error("option {0} was removed before the vote committed")]
    OptionGone(i64),

    #[error("vote ledger integrity violated: {0}")]
    Integrity(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for VoteError {
    fn from(err: sqlx::Error) -> Self {
        VoteError::Storage(StorageError::from(err))
    }
}

impl VoteError {
    /// True for rejections caused by the submission itself rather than by
    /// the service; the transport maps these to 4xx-class statuses and must
    /// not retry them.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            VoteError::MissingOption
                | VoteError::MalformedOption(_)
                | VoteError::OptionNotFound(_)
                | VoteError::PollNotFound(_)
        )
    }

    /// True when re-running the whole validate-dedup-record sequence may
    /// succeed. The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VoteError::OptionGone(_) | VoteError::Storage(StorageError::Transient(_))
        )
    }
}
