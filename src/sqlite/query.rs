use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{Statement, params_from_iter};

use crate::backend::RowCursor;
use crate::error::SqlBatchDbError;
use crate::results::CustomDbRow;
use crate::results::row::RowShape;
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `SqlBatchDbError::SqliteError` if the column cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, SqlBatchDbError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Rows of one `SQLite` query.
///
/// rusqlite rows borrow their statement, so the rows are read eagerly when the
/// cursor is opened. A fault on the first step fails the open, since the statement
/// itself was rejected. A later fault keeps the rows read so far and becomes the
/// cursor's terminal error.
#[derive(Debug)]
pub struct SqliteCursor {
    rows: std::vec::IntoIter<CustomDbRow>,
    current: Option<CustomDbRow>,
    error: Option<SqlBatchDbError>,
}

impl SqliteCursor {
    /// Bind `params` and step `stmt`, buffering up to `max_rows` rows (all when `None`).
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::SqliteError` if binding the parameters or the
    /// first step fails.
    pub fn open(
        stmt: &mut Statement<'_>,
        params: &[Value],
        max_rows: Option<usize>,
    ) -> Result<Self, SqlBatchDbError> {
        let shape = RowShape::new(
            stmt.column_names()
                .iter()
                .map(std::string::ToString::to_string)
                .collect(),
        );
        let mut rows_iter = stmt.query(params_from_iter(params.iter()))?;
        let mut rows = Vec::new();
        let mut error = None;

        while max_rows.is_none_or(|max| rows.len() < max) {
            let first_step = rows.is_empty();
            match rows_iter.next() {
                Ok(Some(row)) => {
                    let values = (0..shape.width())
                        .map(|i| sqlite_extract_value(row, i))
                        .collect::<Result<Vec<_>, _>>();
                    match values {
                        Ok(values) => rows.push(shape.row(values)),
                        Err(err) => {
                            error = Some(err);
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(err) if first_step => return Err(err.into()),
                Err(err) => {
                    error = Some(err.into());
                    break;
                }
            }
        }

        Ok(Self {
            rows: rows.into_iter(),
            current: None,
            error,
        })
    }

    /// Cursor over rows that were already read.
    #[must_use]
    pub fn from_rows(rows: Vec<CustomDbRow>) -> Self {
        Self {
            rows: rows.into_iter(),
            current: None,
            error: None,
        }
    }
}

#[async_trait]
impl RowCursor for SqliteCursor {
    async fn advance(&mut self) -> bool {
        self.current = self.rows.next();
        self.current.is_some()
    }

    fn row(&self) -> Option<&CustomDbRow> {
        self.current.as_ref()
    }

    fn terminal_error(&mut self) -> Option<SqlBatchDbError> {
        // Only reported once every buffered row has been visited.
        if self.current.is_none() && self.rows.len() == 0 {
            self.error.take()
        } else {
            None
        }
    }

    async fn release(self) -> Result<(), SqlBatchDbError> {
        Ok(())
    }
}
