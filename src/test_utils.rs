//! Scripted in-memory backend for exercising the executor without a database.
//!
//! Each query string maps to a canned [`Response`]. Every call is recorded in a
//! shared [`Journal`], so tests can assert what ran and how the transaction ended.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::backend::{BatchTransaction, RowCursor, TransactionProvider};
use crate::error::SqlBatchDbError;
use crate::results::CustomDbRow;
use crate::results::row::RowShape;
use crate::types::RowValues;

/// Canned outcome for one query string.
#[derive(Debug, Clone)]
pub enum Response {
    /// The statement affects this many rows.
    Affected(u64),
    /// The statement yields rows; `fault` ends iteration with an error after the
    /// last row and `release_fault` makes releasing the cursor fail.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<RowValues>>,
        fault: Option<String>,
        release_fault: Option<String>,
    },
    /// The backend rejects the statement.
    Fail(String),
}

impl Response {
    #[must_use]
    pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        Response::Rows {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
            fault: None,
            release_fault: None,
        }
    }

    #[must_use]
    pub fn with_fault(mut self, message: &str) -> Self {
        if let Response::Rows { fault, .. } = &mut self {
            *fault = Some(message.to_string());
        }
        self
    }

    #[must_use]
    pub fn with_release_fault(mut self, message: &str) -> Self {
        if let Response::Rows { release_fault, .. } = &mut self {
            *release_fault = Some(message.to_string());
        }
        self
    }
}

/// One statement the backend received.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub query: String,
    pub args: Vec<RowValues>,
}

/// Everything the scripted backend observed.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Transactions dropped without commit or rollback.
    pub dropped_open: usize,
    pub calls: Vec<Call>,
    /// Rows handed out by cursors.
    pub rows_visited: usize,
    pub cursors_opened: usize,
    pub cursors_released: usize,
    /// Queries opened through `query_first`.
    pub single_row_queries: usize,
    /// Statements issued while a cursor of the same transaction was still open.
    pub overlapping_cursor_calls: usize,
}

type SharedJournal = Arc<Mutex<Journal>>;

fn with_journal<R>(journal: &SharedJournal, f: impl FnOnce(&mut Journal) -> R) -> R {
    let mut guard = journal.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// A provider whose transactions answer from a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    responses: Arc<HashMap<String, Response>>,
    begin_fault: Option<String>,
    commit_fault: Option<String>,
    rollback_fault: Option<String>,
    journal: SharedJournal,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `response`. Unscripted queries fail.
    #[must_use]
    pub fn on(mut self, query: &str, response: Response) -> Self {
        Arc::make_mut(&mut self.responses).insert(query.to_string(), response);
        self
    }

    #[must_use]
    pub fn fail_begin(mut self, message: &str) -> Self {
        self.begin_fault = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn fail_commit(mut self, message: &str) -> Self {
        self.commit_fault = Some(message.to_string());
        self
    }

    #[must_use]
    pub fn fail_rollback(mut self, message: &str) -> Self {
        self.rollback_fault = Some(message.to_string());
        self
    }

    /// Snapshot of what has happened so far.
    #[must_use]
    pub fn journal(&self) -> Journal {
        with_journal(&self.journal, |j| j.clone())
    }

    fn transaction(&self) -> ScriptedTx {
        ScriptedTx {
            responses: Arc::clone(&self.responses),
            commit_fault: self.commit_fault.clone(),
            rollback_fault: self.rollback_fault.clone(),
            journal: Arc::clone(&self.journal),
            finished: false,
        }
    }
}

impl TransactionProvider for ScriptedBackend {
    type Tx<'a> = ScriptedTx;

    async fn begin(&mut self) -> Result<ScriptedTx, SqlBatchDbError> {
        if let Some(message) = &self.begin_fault {
            return Err(SqlBatchDbError::ConnectionError(message.clone()));
        }
        with_journal(&self.journal, |j| j.begins += 1);
        Ok(self.transaction())
    }
}

/// Transaction handed out by [`ScriptedBackend`].
#[derive(Debug)]
pub struct ScriptedTx {
    responses: Arc<HashMap<String, Response>>,
    commit_fault: Option<String>,
    rollback_fault: Option<String>,
    journal: SharedJournal,
    finished: bool,
}

impl ScriptedTx {
    fn record(&self, query: &str, args: &[RowValues]) -> Result<Response, SqlBatchDbError> {
        with_journal(&self.journal, |j| {
            if j.cursors_opened > j.cursors_released {
                j.overlapping_cursor_calls += 1;
            }
            j.calls.push(Call {
                query: query.to_string(),
                args: args.to_vec(),
            });
        });
        self.responses.get(query).cloned().ok_or_else(|| {
            SqlBatchDbError::ExecutionError(format!("no scripted response for `{query}`"))
        })
    }
}

#[async_trait]
impl BatchTransaction for ScriptedTx {
    type Cursor = ScriptedCursor;

    async fn execute(&mut self, query: &str, args: &[RowValues]) -> Result<u64, SqlBatchDbError> {
        match self.record(query, args)? {
            Response::Affected(n) => Ok(n),
            Response::Rows { rows, .. } => Ok(rows.len() as u64),
            Response::Fail(message) => Err(SqlBatchDbError::ExecutionError(message)),
        }
    }

    async fn query(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<ScriptedCursor, SqlBatchDbError> {
        let (columns, rows, fault, release_fault) = match self.record(query, args)? {
            Response::Rows {
                columns,
                rows,
                fault,
                release_fault,
            } => (columns, rows, fault, release_fault),
            Response::Affected(_) => (Vec::new(), Vec::new(), None, None),
            Response::Fail(message) => return Err(SqlBatchDbError::ExecutionError(message)),
        };
        with_journal(&self.journal, |j| j.cursors_opened += 1);
        let shape = RowShape::new(columns);
        Ok(ScriptedCursor {
            rows: rows
                .into_iter()
                .map(|values| shape.row(values))
                .collect::<Vec<_>>()
                .into_iter(),
            current: None,
            fault: fault.map(SqlBatchDbError::Other),
            release_fault,
            journal: Arc::clone(&self.journal),
        })
    }

    async fn query_first(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<ScriptedCursor, SqlBatchDbError> {
        with_journal(&self.journal, |j| j.single_row_queries += 1);
        self.query(query, args).await
    }

    async fn commit(mut self) -> Result<(), SqlBatchDbError> {
        self.finished = true;
        if let Some(message) = self.commit_fault.take() {
            with_journal(&self.journal, |j| j.rollbacks += 1);
            return Err(SqlBatchDbError::ExecutionError(message));
        }
        with_journal(&self.journal, |j| j.commits += 1);
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), SqlBatchDbError> {
        self.finished = true;
        with_journal(&self.journal, |j| j.rollbacks += 1);
        match self.rollback_fault.take() {
            Some(message) => Err(SqlBatchDbError::ExecutionError(message)),
            None => Ok(()),
        }
    }
}

impl Drop for ScriptedTx {
    fn drop(&mut self) {
        if !self.finished {
            with_journal(&self.journal, |j| {
                j.dropped_open += 1;
                j.rollbacks += 1;
            });
        }
    }
}

/// Cursor over scripted rows.
#[derive(Debug)]
pub struct ScriptedCursor {
    rows: std::vec::IntoIter<CustomDbRow>,
    current: Option<CustomDbRow>,
    fault: Option<SqlBatchDbError>,
    release_fault: Option<String>,
    journal: SharedJournal,
}

#[async_trait]
impl RowCursor for ScriptedCursor {
    async fn advance(&mut self) -> bool {
        self.current = self.rows.next();
        if self.current.is_some() {
            with_journal(&self.journal, |j| j.rows_visited += 1);
        }
        self.current.is_some()
    }

    fn row(&self) -> Option<&CustomDbRow> {
        self.current.as_ref()
    }

    fn terminal_error(&mut self) -> Option<SqlBatchDbError> {
        if self.current.is_none() {
            self.fault.take()
        } else {
            None
        }
    }

    async fn release(mut self) -> Result<(), SqlBatchDbError> {
        with_journal(&self.journal, |j| j.cursors_released += 1);
        match self.release_fault.take() {
            Some(message) => Err(SqlBatchDbError::Other(message)),
            None => Ok(()),
        }
    }
}
