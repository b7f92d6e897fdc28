use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use super::row::CustomDbRow;
use crate::error::SqlBatchDbError;
use crate::types::RowValues;

/// Conversion from one column value into a Rust type.
pub trait FromRowValue: Sized {
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` when the value has the wrong shape.
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError>;
}

/// Conversion from the leading columns of a row into a tuple of targets.
pub trait FromRow: Sized {
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` if a column is missing or mismatched.
    fn from_row(decoder: &RowDecoder<'_>) -> Result<Self, SqlBatchDbError>;
}

/// Read access to the cursor's current row, handed to `read_one`/`read_all`.
///
/// ```rust
/// use std::sync::Arc;
/// use sql_batch::prelude::*;
///
/// let row = CustomDbRow::new(
///     Arc::new(vec!["id".into(), "name".into()]),
///     vec![RowValues::Int(3), RowValues::Text("carol".into())],
/// );
/// let decoder = RowDecoder::new(&row);
/// let (id, name): (i64, String) = decoder.decode()?;
/// assert_eq!((id, name.as_str()), (3, "carol"));
/// # Ok::<(), SqlBatchDbError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RowDecoder<'r> {
    row: &'r CustomDbRow,
}

impl<'r> RowDecoder<'r> {
    #[must_use]
    pub fn new(row: &'r CustomDbRow) -> Self {
        Self { row }
    }

    #[must_use]
    pub fn row(&self) -> &'r CustomDbRow {
        self.row
    }

    #[must_use]
    pub fn column_names(&self) -> &'r [String] {
        self.row.column_names.as_slice()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.row.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// Raw value at `index`.
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` if the index is out of range.
    pub fn value(&self, index: usize) -> Result<&'r RowValues, SqlBatchDbError> {
        self.row.get_by_index(index).ok_or_else(|| {
            SqlBatchDbError::DecodeError(format!(
                "column index {index} out of range for row with {} columns",
                self.row.len()
            ))
        })
    }

    /// Decode the value at `index`.
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` if the index is out of range or the
    /// value cannot be converted.
    pub fn get<T: FromRowValue>(&self, index: usize) -> Result<T, SqlBatchDbError> {
        T::from_row_value(self.value(index)?).map_err(|err| match err {
            SqlBatchDbError::DecodeError(msg) => {
                SqlBatchDbError::DecodeError(format!("column {index}: {msg}"))
            }
            other => other,
        })
    }

    /// Decode the value of the column called `column`.
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` if no such column exists or the value
    /// cannot be converted.
    pub fn get_named<T: FromRowValue>(&self, column: &str) -> Result<T, SqlBatchDbError> {
        let index = self.row.get_column_index(column).ok_or_else(|| {
            SqlBatchDbError::DecodeError(format!("no column named `{column}` in row"))
        })?;
        self.get(index)
    }

    /// Fill a tuple of targets from the leading columns of the row.
    ///
    /// # Errors
    /// Returns `SqlBatchDbError::DecodeError` if any target cannot be filled.
    pub fn decode<T: FromRow>(&self) -> Result<T, SqlBatchDbError> {
        T::from_row(self)
    }
}

fn mismatch(expected: &str, value: &RowValues) -> SqlBatchDbError {
    SqlBatchDbError::DecodeError(format!(
        "expected {expected}, found {}",
        value.type_name()
    ))
}

impl FromRowValue for RowValues {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        Ok(value.clone())
    }
}

impl FromRowValue for i64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value.as_int().copied().ok_or_else(|| mismatch("integer", value))
    }
}

impl FromRowValue for i32 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        let wide = i64::from_row_value(value)?;
        i32::try_from(wide).map_err(|_| {
            SqlBatchDbError::DecodeError(format!("integer {wide} does not fit in i32"))
        })
    }
}

impl FromRowValue for u64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        let wide = i64::from_row_value(value)?;
        u64::try_from(wide).map_err(|_| {
            SqlBatchDbError::DecodeError(format!("integer {wide} does not fit in u64"))
        })
    }
}

impl FromRowValue for f64 {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value.as_float().ok_or_else(|| mismatch("float", value))
    }
}

impl FromRowValue for bool {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromRowValue for String {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value
            .as_text()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("text", value))
    }
}

impl FromRowValue for Vec<u8> {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value
            .as_blob()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("blob", value))
    }
}

impl FromRowValue for NaiveDateTime {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        value.as_timestamp().ok_or_else(|| mismatch("timestamp", value))
    }
}

impl FromRowValue for JsonValue {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        match value {
            RowValues::JSON(json) => Ok(json.clone()),
            // SQLite stores JSON as text.
            RowValues::Text(text) => serde_json::from_str(text).map_err(|e| {
                SqlBatchDbError::DecodeError(format!("invalid JSON text: {e}"))
            }),
            other => Err(mismatch("json", other)),
        }
    }
}

impl<T: FromRowValue> FromRowValue for Option<T> {
    fn from_row_value(value: &RowValues) -> Result<Self, SqlBatchDbError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_row_value(value).map(Some)
        }
    }
}

macro_rules! impl_from_row_tuple {
    ($($idx:tt => $t:ident),+) => {
        impl<$($t: FromRowValue),+> FromRow for ($($t,)+) {
            fn from_row(decoder: &RowDecoder<'_>) -> Result<Self, SqlBatchDbError> {
                Ok(($(decoder.get::<$t>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(0 => A);
impl_from_row_tuple!(0 => A, 1 => B);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
