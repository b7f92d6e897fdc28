//! `PostgreSQL` backend built on tokio-postgres.
//!
//! Read commands stream their rows from the server; nothing is buffered beyond
//! the row currently being decoded.

pub mod params;
pub mod query;
pub mod transaction;

pub use params::Params;
pub use query::{PostgresCursor, postgres_extract_value};
pub use transaction::PostgresTx;
