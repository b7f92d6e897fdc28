//! `SQLite` backend built on rusqlite.
//!
//! Transactions own a mutable borrow of the connection and issue
//! `BEGIN`/`COMMIT`/`ROLLBACK` directly, so they can be sent across tasks.

pub mod config;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::{SqliteOptions, SqliteOptionsBuilder, SqliteProvider, SqliteTxBehavior};
pub use params::Params;
pub use query::{SqliteCursor, sqlite_extract_value};
pub use transaction::{SqliteTx, begin_transaction};
