use std::pin::Pin;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures_util::TryStreamExt;
use serde_json::Value;
use tokio_postgres::RowStream;

use crate::backend::RowCursor;
use crate::error::SqlBatchDbError;
use crate::results::CustomDbRow;
use crate::results::row::RowShape;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SqlBatchDbError` if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, SqlBatchDbError> {
    let type_info = row.columns()[idx].type_();

    let value = match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        _ => {
            // text, varchar, char, name and anything else with a text form
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
    };
    Ok(value)
}

/// Rows of one Postgres query, pulled from the server as the cursor advances.
pub struct PostgresCursor {
    stream: Pin<Box<RowStream>>,
    shape: Option<RowShape>,
    current: Option<CustomDbRow>,
    error: Option<SqlBatchDbError>,
}

impl PostgresCursor {
    pub(crate) fn new(stream: RowStream) -> Self {
        Self {
            stream: Box::pin(stream),
            shape: None,
            current: None,
            error: None,
        }
    }

    fn convert(&mut self, row: &tokio_postgres::Row) -> Result<CustomDbRow, SqlBatchDbError> {
        let shape = self.shape.get_or_insert_with(|| {
            RowShape::new(row.columns().iter().map(|c| c.name().to_string()).collect())
        });
        let values = (0..shape.width())
            .map(|idx| postgres_extract_value(row, idx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shape.row(values))
    }
}

impl std::fmt::Debug for PostgresCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCursor")
            .field("current", &self.current)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn advance(&mut self) -> bool {
        self.current = None;
        if self.error.is_some() {
            return false;
        }
        let next = self.stream.try_next().await;
        match next {
            Ok(Some(row)) => match self.convert(&row) {
                Ok(converted) => {
                    self.current = Some(converted);
                    true
                }
                Err(err) => {
                    self.error = Some(err);
                    false
                }
            },
            Ok(None) => false,
            Err(err) => {
                self.error = Some(err.into());
                false
            }
        }
    }

    fn row(&self) -> Option<&CustomDbRow> {
        self.current.as_ref()
    }

    fn terminal_error(&mut self) -> Option<SqlBatchDbError> {
        self.error.take()
    }

    async fn release(self) -> Result<(), SqlBatchDbError> {
        // Dropping the stream lets the connection discard unread rows.
        drop(self.stream);
        Ok(())
    }
}
