use async_trait::async_trait;
use rusqlite::Connection;
use tracing::warn;

use crate::backend::BatchTransaction;
use crate::error::SqlBatchDbError;
use crate::types::RowValues;

use super::config::SqliteTxBehavior;
use super::params::Params;
use super::query::SqliteCursor;

/// Transaction handle that borrows the `SQLite` connection until completion.
#[derive(Debug)]
pub struct SqliteTx<'c> {
    conn: Option<&'c mut Connection>,
}

/// Begin a transaction on `conn`.
///
/// # Errors
/// Returns `SqlBatchDbError` if the transaction cannot be started, including when
/// one is already open on the connection.
pub fn begin_transaction(
    conn: &mut Connection,
    behavior: SqliteTxBehavior,
) -> Result<SqliteTx<'_>, SqlBatchDbError> {
    if !conn.is_autocommit() {
        return Err(SqlBatchDbError::ExecutionError(
            "SQLite transaction already in progress on this connection".into(),
        ));
    }
    conn.execute_batch(behavior.begin_sql())?;
    Ok(SqliteTx { conn: Some(conn) })
}

impl SqliteTx<'_> {
    fn conn_mut(&mut self) -> Result<&mut Connection, SqlBatchDbError> {
        self.conn.as_deref_mut().ok_or_else(|| {
            SqlBatchDbError::ExecutionError("SQLite transaction already completed".into())
        })
    }

    fn take_conn(&mut self) -> Result<&mut Connection, SqlBatchDbError> {
        self.conn.take().ok_or_else(|| {
            SqlBatchDbError::ExecutionError("SQLite transaction already completed".into())
        })
    }
}

#[async_trait]
impl BatchTransaction for SqliteTx<'_> {
    type Cursor = SqliteCursor;

    async fn execute(&mut self, query: &str, args: &[RowValues]) -> Result<u64, SqlBatchDbError> {
        let converted = Params::convert(args);
        let conn = self.conn_mut()?;
        {
            // Stepped rather than `Statement::execute`, which rejects statements
            // that return rows (`RETURNING`).
            let mut stmt = conn.prepare(query)?;
            let mut rows = stmt.query(rusqlite::params_from_iter(converted.as_values().iter()))?;
            while rows.next()?.is_some() {}
        }
        u64::try_from(conn.changes()).map_err(|e| {
            SqlBatchDbError::ExecutionError(format!("sqlite affected rows conversion error: {e}"))
        })
    }

    async fn query(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<SqliteCursor, SqlBatchDbError> {
        let converted = Params::convert(args);
        let conn = self.conn_mut()?;
        let mut stmt = conn.prepare(query)?;
        SqliteCursor::open(&mut stmt, converted.as_values(), None)
    }

    async fn query_first(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<SqliteCursor, SqlBatchDbError> {
        let converted = Params::convert(args);
        let conn = self.conn_mut()?;
        let mut stmt = conn.prepare(query)?;
        SqliteCursor::open(&mut stmt, converted.as_values(), Some(1))
    }

    async fn commit(mut self) -> Result<(), SqlBatchDbError> {
        let conn = self.take_conn()?;
        if let Err(err) = conn.execute_batch("COMMIT") {
            // A refused COMMIT (deferred constraint, busy) leaves the transaction open.
            if !conn.is_autocommit()
                && let Err(rollback_err) = conn.execute_batch("ROLLBACK")
            {
                warn!(error = %rollback_err, "sqlite rollback after failed commit failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), SqlBatchDbError> {
        let conn = self.take_conn()?;
        if conn.is_autocommit() {
            // SQLite already rolled back (e.g. after SQLITE_FULL or an interrupt).
            return Ok(());
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && !conn.is_autocommit()
            && let Err(err) = conn.execute_batch("ROLLBACK")
        {
            warn!(error = %err, "sqlite rollback on drop failed");
        }
    }
}
