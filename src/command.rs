use std::fmt;

use crate::error::SqlBatchDbError;
use crate::results::{BatchResults, BatchValue, RowDecoder};
use crate::types::RowValues;

pub(crate) type ArgsResolver =
    Box<dyn FnOnce(&BatchResults) -> Result<Vec<RowValues>, SqlBatchDbError> + Send>;
pub(crate) type ReadOneFn =
    Box<dyn FnOnce(&RowDecoder<'_>) -> Result<BatchValue, SqlBatchDbError> + Send>;

/// Fold state of a `read_all` command, with the accumulator type erased.
pub(crate) trait RowFold: Send {
    fn step(&mut self, row: &RowDecoder<'_>) -> Result<(), SqlBatchDbError>;
    fn finish(self: Box<Self>) -> Option<BatchValue>;
}

struct Fold<A, F> {
    acc: Option<A>,
    step: F,
}

impl<A, F> RowFold for Fold<A, F>
where
    A: Send + Sync + 'static,
    F: FnMut(A, &RowDecoder<'_>) -> Result<A, SqlBatchDbError> + Send,
{
    fn step(&mut self, row: &RowDecoder<'_>) -> Result<(), SqlBatchDbError> {
        let acc = self.acc.take().ok_or_else(|| {
            SqlBatchDbError::Other("accumulator lost after a failed row".into())
        })?;
        self.acc = Some((self.step)(acc, row)?);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Option<BatchValue> {
        self.acc.map(|acc| Box::new(acc) as BatchValue)
    }
}

/// How a command is checked, decided by its `affect` value at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Exactly `expected` rows must be affected.
    WriteCheck { expected: u64 },
    /// Rows are read (or drained) and the affected count is never inspected.
    Read,
}

impl CommandKind {
    /// `0` reads, a positive value expects that many rows, a negative value expects none.
    #[must_use]
    pub fn from_affect(affect: i64) -> Self {
        match affect {
            0 => CommandKind::Read,
            n => CommandKind::WriteCheck {
                expected: u64::try_from(n).unwrap_or(0),
            },
        }
    }
}

/// One statement of a batch.
///
/// ```rust
/// use sql_batch::prelude::*;
///
/// let insert = Command::new("INSERT INTO users (name) VALUES (?1)")
///     .arg("alice")
///     .affect(1);
/// let count = Command::new("SELECT COUNT(*) FROM users")
///     .read_one(|row| row.get::<i64>(0));
/// let names = Command::new("SELECT name FROM users ORDER BY name")
///     .read_all(Vec::new(), |mut names: Vec<String>, row| {
///         names.push(row.get(0)?);
///         Ok(names)
///     });
/// assert_eq!(insert.kind(), CommandKind::WriteCheck { expected: 1 });
/// assert_eq!(count.kind(), CommandKind::Read);
/// # let _ = names;
/// ```
pub struct Command {
    pub(crate) query: String,
    pub(crate) args: Vec<RowValues>,
    pub(crate) args_resolver: Option<ArgsResolver>,
    pub(crate) affect: i64,
    pub(crate) read_one: Option<ReadOneFn>,
    pub(crate) read_all: Option<Box<dyn RowFold>>,
}

impl Command {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            args: Vec::new(),
            args_resolver: None,
            affect: 0,
            read_one: None,
            read_all: None,
        }
    }

    /// Replace the fixed argument list.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = RowValues>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Append one fixed argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<RowValues>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Compute arguments just before execution from the results of earlier commands.
    ///
    /// Slots of this and later commands are unset when the resolver runs.
    /// Supersedes any fixed arguments.
    #[must_use]
    pub fn args_resolver<F>(mut self, resolver: F) -> Self
    where
        F: FnOnce(&BatchResults) -> Result<Vec<RowValues>, SqlBatchDbError> + Send + 'static,
    {
        self.args_resolver = Some(Box::new(resolver));
        self
    }

    /// Expected affected-row count; see [`CommandKind::from_affect`].
    #[must_use]
    pub fn affect(mut self, affect: i64) -> Self {
        self.affect = affect;
        self
    }

    /// Decode at most the first row. The slot stays unset when no row comes back.
    ///
    /// The query is opened with [`crate::BatchTransaction::query_first`], so the
    /// `SQLite` backend steps the statement once instead of buffering every row.
    /// Other backends may still produce the whole result set; put a `LIMIT` in
    /// the query when it can be large.
    ///
    /// Takes precedence over [`Command::read_all`].
    #[must_use]
    pub fn read_one<T, F>(mut self, reader: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce(&RowDecoder<'_>) -> Result<T, SqlBatchDbError> + Send + 'static,
    {
        self.read_one = Some(Box::new(move |row: &RowDecoder<'_>| {
            reader(row).map(|value| Box::new(value) as BatchValue)
        }));
        self
    }

    /// Fold every row into an accumulator seeded with `init`.
    ///
    /// The final accumulator is stored even when no rows match.
    #[must_use]
    pub fn read_all<A, F>(mut self, init: A, step: F) -> Self
    where
        A: Send + Sync + 'static,
        F: FnMut(A, &RowDecoder<'_>) -> Result<A, SqlBatchDbError> + Send + 'static,
    {
        self.read_all = Some(Box::new(Fold {
            acc: Some(init),
            step,
        }));
        self
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        CommandKind::from_affect(self.affect)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("query", &self.query)
            .field("args", &self.args)
            .field("args_resolver", &self.args_resolver.is_some())
            .field("affect", &self.affect)
            .field("read_one", &self.read_one.is_some())
            .field("read_all", &self.read_all.is_some())
            .finish()
    }
}
