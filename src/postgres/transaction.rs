use async_trait::async_trait;
use tokio_postgres::{Client, Transaction};

use crate::backend::{BatchTransaction, TransactionProvider};
use crate::error::SqlBatchDbError;
use crate::types::RowValues;

use super::params::Params;
use super::query::PostgresCursor;

/// A tokio-postgres transaction running a batch.
///
/// Dropping it unfinalized rolls back, courtesy of tokio-postgres.
pub struct PostgresTx<'a> {
    tx: Transaction<'a>,
}

impl<'a> PostgresTx<'a> {
    #[must_use]
    pub fn new(tx: Transaction<'a>) -> Self {
        Self { tx }
    }
}

impl std::fmt::Debug for PostgresTx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTx").finish_non_exhaustive()
    }
}

#[async_trait]
impl BatchTransaction for PostgresTx<'_> {
    type Cursor = PostgresCursor;

    async fn execute(&mut self, query: &str, args: &[RowValues]) -> Result<u64, SqlBatchDbError> {
        let converted = Params::convert(args);
        Ok(self.tx.execute(query, converted.as_refs()).await?)
    }

    async fn query(
        &mut self,
        query: &str,
        args: &[RowValues],
    ) -> Result<PostgresCursor, SqlBatchDbError> {
        let stream = self.tx.query_raw(query, args.iter()).await?;
        Ok(PostgresCursor::new(stream))
    }

    async fn commit(self) -> Result<(), SqlBatchDbError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), SqlBatchDbError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl TransactionProvider for Client {
    type Tx<'a> = PostgresTx<'a>;

    async fn begin(&mut self) -> Result<PostgresTx<'_>, SqlBatchDbError> {
        let tx = self.transaction().await?;
        Ok(PostgresTx::new(tx))
    }
}
