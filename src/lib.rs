//! Transactional batches of SQL commands.
//!
//! A batch is an ordered list of [`Command`]s run inside one transaction. Each
//! command is either a *write-check* (its affected-row count must match an
//! expectation) or a *read* (its rows are decoded by a caller-supplied reader).
//! Later commands may compute their arguments from the results of earlier ones.
//! The batch commits once after every command succeeded; any failure rolls the
//! whole transaction back.
//!
//! ```rust,no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use sql_batch::prelude::*;
//!
//! let mut provider = SqliteProvider::builder("app.db").build()?;
//! let results = execute_batch(
//!     &mut provider,
//!     vec![
//!         Command::new("INSERT INTO accounts (owner) VALUES (?1)")
//!             .arg("alice")
//!             .affect(1),
//!         Command::new("SELECT id FROM accounts WHERE owner = ?1")
//!             .arg("alice")
//!             .read_one(|row| row.get::<i64>(0)),
//!         Command::new("INSERT INTO ledger (account_id, amount) VALUES (?1, ?2)")
//!             .args_resolver(|results| {
//!                 let id = results.get::<i64>(1).copied().ok_or_else(|| {
//!                     SqlBatchDbError::Other("account id missing".into())
//!                 })?;
//!                 Ok(vec![RowValues::Int(id), RowValues::Int(100)])
//!             })
//!             .affect(1),
//!     ],
//! )
//! .await?;
//! assert_eq!(results.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod command;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod results;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backend::{BatchTransaction, RowCursor, TransactionProvider};
pub use command::{Command, CommandKind};
pub use error::{BatchError, BatchErrorKind, SqlBatchDbError};
pub use executor::{BatchFailure, BatchHandler, execute_batch, execute_batch_in_tx};
pub use results::{BatchResults, BatchValue, CustomDbRow, FromRow, FromRowValue, RowDecoder};
pub use types::RowValues;
