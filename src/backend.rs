//! Capabilities the batch executor needs from a database backend.
//!
//! A backend supplies a [`TransactionProvider`] that opens transactions, a
//! [`BatchTransaction`] that runs statements, and a [`RowCursor`] for the rows
//! of one query. The executor never inspects query text or arguments.

use async_trait::async_trait;

use crate::error::SqlBatchDbError;
use crate::results::CustomDbRow;
use crate::types::RowValues;

/// Opens transactions for [`crate::execute_batch`].
pub trait TransactionProvider: Send {
    type Tx<'a>: BatchTransaction + 'a
    where
        Self: 'a;

    /// Begin a new transaction borrowing this provider until it is finalized.
    #[allow(clippy::manual_async_fn)]
    fn begin(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Self::Tx<'_>, SqlBatchDbError>> + Send;
}

/// An open transaction.
///
/// Implementations must roll back when dropped without `commit` or `rollback`;
/// the executor relies on this when a reader panics or the batch future is
/// cancelled.
#[async_trait]
pub trait BatchTransaction: Send {
    type Cursor: RowCursor;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&mut self, query: &str, args: &[RowValues]) -> Result<u64, SqlBatchDbError>;

    /// Run a statement that yields rows.
    async fn query(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<Self::Cursor, SqlBatchDbError>;

    /// Run a statement when only its first row will be read.
    ///
    /// Backends that buffer rows can stop after one; the default is [`BatchTransaction::query`].
    async fn query_first(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<Self::Cursor, SqlBatchDbError> {
        self.query(query, args).await
    }

    async fn commit(self) -> Result<(), SqlBatchDbError>;

    /// Must leave the backend with no open transaction even when it returns an error.
    async fn rollback(self) -> Result<(), SqlBatchDbError>;
}

/// Rows of a single query, valid for one command's read phase.
#[async_trait]
pub trait RowCursor: Send {
    /// Move to the next row. `false` on exhaustion or on a fault, which is then
    /// reported by [`RowCursor::terminal_error`].
    async fn advance(&mut self) -> bool;

    /// The row the last successful `advance` moved to.
    fn row(&self) -> Option<&CustomDbRow>;

    /// Why iteration stopped early, if it did.
    fn terminal_error(&mut self) -> Option<SqlBatchDbError>;

    /// Release the cursor, discarding any rows not yet visited.
    async fn release(self) -> Result<(), SqlBatchDbError>;
}
