use thiserror::Error;

/// Errors raised by a backend or by caller-supplied callbacks.
///
/// Resolvers and row readers return this type; the executor wraps it in a
/// [`BatchError`] that records which command failed and how.
#[derive(Debug, Error)]
pub enum SqlBatchDbError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Row decode error: {0}")]
    DecodeError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

/// Which stage of the batch produced a [`BatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchErrorKind {
    Begin,
    Resolve,
    Execution,
    RowCountMismatch,
    Decode,
    Iteration,
    Release,
    Commit,
}

/// Batch-level failure. Every variant aborts the batch and rolls the transaction
/// back, except [`BatchError::Commit`], where the backend owns the outcome.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] SqlBatchDbError),

    #[error("command {index}: argument resolver failed: {source}")]
    Resolve {
        index: usize,
        #[source]
        source: SqlBatchDbError,
    },

    #[error("command {index}: execution failed for query `{query}`: {source}")]
    Execution {
        index: usize,
        query: String,
        #[source]
        source: SqlBatchDbError,
    },

    #[error("Expected to affect {expected} rows, but {actual} rows affected for query: `{query}`")]
    RowCountMismatch {
        index: usize,
        expected: u64,
        actual: u64,
        query: String,
    },

    #[error("command {index}: row reader failed: {source}")]
    Decode {
        index: usize,
        #[source]
        source: SqlBatchDbError,
    },

    #[error("command {index}: row iteration failed: {source}")]
    Iteration {
        index: usize,
        #[source]
        source: SqlBatchDbError,
    },

    #[error("command {index}: failed to release row cursor: {source}")]
    Release {
        index: usize,
        #[source]
        source: SqlBatchDbError,
    },

    /// Durability of the batch's statements is backend-dependent after this error.
    #[error("commit failed; batch effects are not guaranteed durable: {0}")]
    Commit(#[source] SqlBatchDbError),
}

impl BatchError {
    #[must_use]
    pub fn kind(&self) -> BatchErrorKind {
        match self {
            BatchError::Begin(_) => BatchErrorKind::Begin,
            BatchError::Resolve { .. } => BatchErrorKind::Resolve,
            BatchError::Execution { .. } => BatchErrorKind::Execution,
            BatchError::RowCountMismatch { .. } => BatchErrorKind::RowCountMismatch,
            BatchError::Decode { .. } => BatchErrorKind::Decode,
            BatchError::Iteration { .. } => BatchErrorKind::Iteration,
            BatchError::Release { .. } => BatchErrorKind::Release,
            BatchError::Commit(_) => BatchErrorKind::Commit,
        }
    }

    /// Index of the command that failed, when the failure belongs to one command.
    #[must_use]
    pub fn command_index(&self) -> Option<usize> {
        match self {
            BatchError::Resolve { index, .. }
            | BatchError::Execution { index, .. }
            | BatchError::RowCountMismatch { index, .. }
            | BatchError::Decode { index, .. }
            | BatchError::Iteration { index, .. }
            | BatchError::Release { index, .. } => Some(*index),
            BatchError::Begin(_) | BatchError::Commit(_) => None,
        }
    }
}
