//! Convenient imports for common functionality.
//!
//! This module re-exports the types needed to build and run a batch.

pub use crate::backend::{BatchTransaction, RowCursor, TransactionProvider};
pub use crate::command::{Command, CommandKind};
pub use crate::error::{BatchError, BatchErrorKind, SqlBatchDbError};
pub use crate::executor::{BatchFailure, BatchHandler, execute_batch, execute_batch_in_tx};
pub use crate::results::{
    BatchResults, BatchValue, CustomDbRow, FromRow, FromRowValue, RowDecoder,
};
pub use crate::types::RowValues;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteOptionsBuilder, SqliteProvider, SqliteTxBehavior};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresTx;
