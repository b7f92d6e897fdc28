//! All-or-nothing execution of a command list inside one transaction.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{BatchTransaction, RowCursor, TransactionProvider};
use crate::command::{Command, CommandKind, ReadOneFn, RowFold};
use crate::error::{BatchError, SqlBatchDbError};
use crate::results::{BatchResults, BatchValue, CustomDbRow, RowDecoder};

/// A failed batch: the error plus whatever results were produced before it.
///
/// The transaction never committed (or its commit failed), so the partial
/// results are only useful for diagnostics.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct BatchFailure {
    #[source]
    error: BatchError,
    results: BatchResults,
}

impl BatchFailure {
    #[must_use]
    pub fn new(error: BatchError, results: BatchResults) -> Self {
        Self { error, results }
    }

    #[must_use]
    pub fn error(&self) -> &BatchError {
        &self.error
    }

    #[must_use]
    pub fn partial_results(&self) -> &BatchResults {
        &self.results
    }

    #[must_use]
    pub fn into_parts(self) -> (BatchError, BatchResults) {
        (self.error, self.results)
    }
}

impl From<BatchFailure> for BatchError {
    fn from(failure: BatchFailure) -> Self {
        failure.error
    }
}

/// Begin a transaction on `provider` and run `commands` in it.
///
/// Commits once after every command succeeded; any failure rolls back.
///
/// # Errors
/// Returns a [`BatchFailure`] describing the first failing step.
pub async fn execute_batch<P>(
    provider: &mut P,
    commands: Vec<Command>,
) -> Result<BatchResults, BatchFailure>
where
    P: TransactionProvider,
{
    let tx = match provider.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            return Err(BatchFailure::new(
                BatchError::Begin(err),
                BatchResults::with_len(commands.len()),
            ));
        }
    };
    execute_batch_in_tx(tx, commands).await
}

/// Run `commands` in an already-open transaction, which is finalized before return.
///
/// # Errors
/// Returns a [`BatchFailure`] describing the first failing step.
pub async fn execute_batch_in_tx<T>(
    tx: T,
    commands: Vec<Command>,
) -> Result<BatchResults, BatchFailure>
where
    T: BatchTransaction,
{
    let mut guard = TxGuard::new(tx);
    let mut results = BatchResults::with_len(commands.len());
    let total = commands.len();

    for (index, command) in commands.into_iter().enumerate() {
        let outcome = run_command(guard.tx_mut(), index, command, &mut results).await;
        if let Err(error) = outcome {
            warn!(index, total, kind = ?error.kind(), "batch command failed; rolling back");
            guard.rollback().await;
            return Err(BatchFailure::new(error, results));
        }
    }

    match guard.commit().await {
        Ok(()) => {
            debug!(commands = total, "batch committed");
            Ok(results)
        }
        Err(err) => {
            warn!(error = %err, "batch commit failed");
            Err(BatchFailure::new(BatchError::Commit(err), results))
        }
    }
}

/// Owns a provider and runs batches against it.
pub struct BatchHandler<P> {
    provider: P,
}

impl<P: TransactionProvider> BatchHandler<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Run `commands` in one transaction; see [`execute_batch`].
    ///
    /// # Errors
    /// Returns a [`BatchFailure`] describing the first failing step.
    pub async fn batch(&mut self, commands: Vec<Command>) -> Result<BatchResults, BatchFailure> {
        execute_batch(&mut self.provider, commands).await
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_inner(self) -> P {
        self.provider
    }
}

impl<P> fmt::Debug for BatchHandler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandler").finish_non_exhaustive()
    }
}

async fn run_command<T>(
    tx: &mut T,
    index: usize,
    command: Command,
    results: &mut BatchResults,
) -> Result<(), BatchError>
where
    T: BatchTransaction,
{
    let kind = command.kind();
    let Command {
        query,
        args,
        args_resolver,
        read_one,
        read_all,
        ..
    } = command;

    let args = match args_resolver {
        Some(resolve) => resolve(&*results).map_err(|source| BatchError::Resolve { index, source })?,
        None => args,
    };
    debug!(index, ?kind, args = args.len(), "executing batch command");

    match kind {
        CommandKind::WriteCheck { expected } => {
            let actual = match tx.execute(&query, &args).await {
                Ok(actual) => actual,
                Err(source) => {
                    return Err(BatchError::Execution {
                        index,
                        query,
                        source,
                    });
                }
            };
            if actual != expected {
                return Err(BatchError::RowCountMismatch {
                    index,
                    expected,
                    actual,
                    query,
                });
            }
        }
        CommandKind::Read => {
            let reader = match (read_one, read_all) {
                (Some(one), _) => Reader::One(one),
                (None, Some(fold)) => Reader::All(fold),
                (None, None) => Reader::Drain,
            };
            let opened = match reader {
                Reader::One(_) => tx.query_first(&query, &args).await,
                Reader::All(_) | Reader::Drain => tx.query(&query, &args).await,
            };
            let mut cursor = match opened {
                Ok(cursor) => cursor,
                Err(source) => {
                    return Err(BatchError::Execution {
                        index,
                        query,
                        source,
                    });
                }
            };
            let read = read_rows(&mut cursor, reader).await;
            let terminal = cursor.terminal_error();
            let released = cursor.release().await;

            let value = read.map_err(|source| BatchError::Decode { index, source })?;
            if let Some(source) = terminal {
                return Err(BatchError::Iteration { index, source });
            }
            released.map_err(|source| BatchError::Release { index, source })?;
            if let Some(value) = value {
                results.set(index, value);
            }
        }
    }
    Ok(())
}

enum Reader {
    One(ReadOneFn),
    All(Box<dyn RowFold>),
    Drain,
}

/// Walk the cursor for one read command. Errors here come from the reader callbacks.
async fn read_rows<C>(cursor: &mut C, reader: Reader) -> Result<Option<BatchValue>, SqlBatchDbError>
where
    C: RowCursor,
{
    match reader {
        Reader::One(read) => {
            if !cursor.advance().await {
                return Ok(None);
            }
            let row = current_row(cursor)?;
            read(&RowDecoder::new(row)).map(Some)
        }
        Reader::All(mut fold) => {
            while cursor.advance().await {
                let row = current_row(cursor)?;
                fold.step(&RowDecoder::new(row))?;
            }
            Ok(fold.finish())
        }
        Reader::Drain => {
            while cursor.advance().await {}
            Ok(None)
        }
    }
}

fn current_row<C: RowCursor>(cursor: &C) -> Result<&CustomDbRow, SqlBatchDbError> {
    cursor.row().ok_or_else(|| {
        SqlBatchDbError::ExecutionError("cursor advanced without a current row".into())
    })
}

// The transaction is only taken by `disarm`, which consumes the guard.
const GUARD_INVARIANT: &str = "transaction is held until the guard is disarmed";

/// Guarantees the transaction is finalized exactly once.
///
/// `commit` and `rollback` consume the guard. If it is dropped while still holding
/// the transaction (a reader panicked or the future was cancelled), the
/// transaction is dropped and the backend's rollback-on-drop takes over.
struct TxGuard<T: BatchTransaction> {
    tx: Option<T>,
}

impl<T: BatchTransaction> TxGuard<T> {
    fn new(tx: T) -> Self {
        Self { tx: Some(tx) }
    }

    fn tx_mut(&mut self) -> &mut T {
        self.tx.as_mut().expect(GUARD_INVARIANT)
    }

    fn disarm(mut self) -> T {
        self.tx.take().expect(GUARD_INVARIANT)
    }

    async fn commit(self) -> Result<(), SqlBatchDbError> {
        self.disarm().commit().await
    }

    /// Roll back after a failed command. A rollback error is logged, never returned,
    /// so the command's error reaches the caller.
    async fn rollback(self) {
        if let Err(err) = self.disarm().rollback().await {
            warn!(error = %err, "batch rollback failed");
        }
    }
}

impl<T: BatchTransaction> Drop for TxGuard<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("batch transaction dropped before commit or rollback; backend rolls back on drop");
            drop(tx);
        }
    }
}
