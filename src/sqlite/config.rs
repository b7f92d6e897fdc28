use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::TransactionProvider;
use crate::error::SqlBatchDbError;

use super::transaction::{SqliteTx, begin_transaction};

/// How `BEGIN` acquires locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqliteTxBehavior {
    /// Locks are taken on first read/write.
    #[default]
    Deferred,
    /// The write lock is taken at `BEGIN`.
    Immediate,
    /// No other connection may read or write until the batch finishes.
    Exclusive,
}

impl SqliteTxBehavior {
    pub(crate) fn begin_sql(self) -> &'static str {
        match self {
            SqliteTxBehavior::Deferred => "BEGIN DEFERRED",
            SqliteTxBehavior::Immediate => "BEGIN IMMEDIATE",
            SqliteTxBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// Options for opening a `SQLite` connection that runs batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    pub db_path: String,
    pub behavior: SqliteTxBehavior,
    pub foreign_keys: bool,
    /// Milliseconds to wait on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Switch file databases to WAL journaling.
    pub wal: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            behavior: SqliteTxBehavior::Deferred,
            foreign_keys: true,
            busy_timeout_ms: 5_000,
            wal: true,
        }
    }
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: SqliteTxBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn is_memory(&self) -> bool {
        self.db_path == ":memory:" || self.db_path.is_empty()
    }

    /// Open the connection and apply the configured pragmas.
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::ConnectionError` if the database cannot be opened,
    /// or `SqlBatchDbError::SqliteError` if a pragma fails.
    pub fn open(&self) -> Result<SqliteProvider, SqlBatchDbError> {
        let opened = if self.is_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open_with_flags(
                &self.db_path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        };
        let conn = opened.map_err(|e| {
            SqlBatchDbError::ConnectionError(format!(
                "Failed to open SQLite database `{}`: {e}",
                self.db_path
            ))
        })?;

        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        if self.wal && !self.is_memory() {
            // journal_mode returns the resulting mode as a row.
            let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            debug!(db_path = %self.db_path, journal_mode = %mode, "sqlite journal mode set");
        }

        Ok(SqliteProvider {
            conn,
            behavior: self.behavior,
        })
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn behavior(mut self, behavior: SqliteTxBehavior) -> Self {
        self.opts.behavior = behavior;
        self
    }

    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.opts.foreign_keys = enabled;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn wal(mut self, enabled: bool) -> Self {
        self.opts.wal = enabled;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Open a [`SqliteProvider`] with these options.
    ///
    /// # Errors
    /// See [`SqliteOptions::open`].
    pub fn build(self) -> Result<SqliteProvider, SqlBatchDbError> {
        self.opts.open()
    }
}

/// A `SQLite` connection that hands out batch transactions.
#[derive(Debug)]
pub struct SqliteProvider {
    conn: Connection,
    behavior: SqliteTxBehavior,
}

impl SqliteProvider {
    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path.into())
    }

    /// Wrap an already-open connection, beginning transactions as `DEFERRED`.
    #[must_use]
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            behavior: SqliteTxBehavior::Deferred,
        }
    }

    #[must_use]
    pub fn behavior(&self) -> SqliteTxBehavior {
        self.behavior
    }

    /// Borrow the connection, e.g. for schema setup outside any batch.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

impl From<Connection> for SqliteProvider {
    fn from(conn: Connection) -> Self {
        Self::from_connection(conn)
    }
}

impl TransactionProvider for SqliteProvider {
    type Tx<'a> = SqliteTx<'a>;

    async fn begin(&mut self) -> Result<SqliteTx<'_>, SqlBatchDbError> {
        begin_transaction(&mut self.conn, self.behavior)
    }
}
