//! Row access for readers and the per-command result slots of a batch.

mod decode;
pub(crate) mod row;
mod slots;

pub use decode::{FromRow, FromRowValue, RowDecoder};
pub use row::CustomDbRow;
pub use slots::{BatchResults, BatchValue};
