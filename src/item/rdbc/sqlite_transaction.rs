use std::cell::RefCell;

use log::debug;
use sqlx::{query::Query, sqlite::SqliteArguments, Pool, Sqlite, Transaction};

use crate::{core::transaction::TransactionManager, error::BatchError};

use super::block_on;

/// Chunk transactions on a SQLite pool.
///
/// `begin` takes a connection from the pool and starts a transaction on it;
/// writers sharing this manager run their statements on that connection
/// through [`SqliteTransactionManager::execute`] until the step commits or
/// rolls the chunk back. Outside a chunk, statements go to the pool.
pub struct SqliteTransactionManager {
    pool: Pool<Sqlite>,
    transaction: RefCell<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteTransactionManager {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            transaction: RefCell::new(None),
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn is_active(&self) -> bool {
        self.transaction.borrow().is_some()
    }

    /// Executes `query` in the active transaction, or directly on the pool
    /// when none is active, and returns the number of affected rows.
    pub fn execute<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Result<u64, BatchError> {
        let mut transaction = self.transaction.borrow_mut();
        let result = match transaction.as_mut() {
            Some(transaction) => block_on(query.execute(&mut **transaction))?,
            None => block_on(query.execute(&self.pool))?,
        };

        result
            .map(|done| done.rows_affected())
            .map_err(|e| BatchError::ItemWriter(format!("SQLite write failed: {}", e)))
    }
}

impl TransactionManager for SqliteTransactionManager {
    fn begin(&self) -> Result<(), BatchError> {
        if self.is_active() {
            return Err(BatchError::Transaction(
                "a transaction is already active".to_string(),
            ));
        }

        let transaction = block_on(self.pool.begin())?.map_err(|e| {
            BatchError::ResourceUnavailable(format!("cannot begin SQLite transaction: {}", e))
        })?;
        self.transaction.replace(Some(transaction));
        debug!("Begin SQLite transaction");
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        let transaction = self.transaction.borrow_mut().take().ok_or_else(|| {
            BatchError::Transaction("no active transaction to commit".to_string())
        })?;

        block_on(transaction.commit())?
            .map_err(|e| BatchError::Transaction(format!("SQLite commit failed: {}", e)))?;
        debug!("Commit SQLite transaction");
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        let Some(transaction) = self.transaction.borrow_mut().take() else {
            return Ok(());
        };

        block_on(transaction.rollback())?
            .map_err(|e| BatchError::Transaction(format!("SQLite rollback failed: {}", e)))?;
        debug!("Rollback SQLite transaction");
        Ok(())
    }
}
