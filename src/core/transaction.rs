use std::cell::Cell;

use log::debug;

use crate::error::BatchError;

/// Chunk transaction boundary.
///
/// The chunk-oriented step calls `begin` before the first read of a chunk and
/// either `commit` after the writer succeeded or `rollback` on any read,
/// process or write failure. At most one transaction is active at a time.
pub trait TransactionManager {
    fn begin(&self) -> Result<(), BatchError>;

    fn commit(&self) -> Result<(), BatchError>;

    fn rollback(&self) -> Result<(), BatchError>;
}

/// Transaction manager for writers that have nothing to roll back.
///
/// It still enforces the begin/commit pairing so that misuse shows up in
/// tests.
#[derive(Default)]
pub struct ResourcelessTransactionManager {
    active: Cell<bool>,
}

impl ResourcelessTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl TransactionManager for ResourcelessTransactionManager {
    fn begin(&self) -> Result<(), BatchError> {
        if self.active.replace(true) {
            return Err(BatchError::Transaction(
                "a transaction is already active".to_string(),
            ));
        }
        debug!("Begin resourceless transaction");
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        if !self.active.replace(false) {
            return Err(BatchError::Transaction(
                "no active transaction to commit".to_string(),
            ));
        }
        debug!("Commit resourceless transaction");
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        self.active.set(false);
        debug!("Rollback resourceless transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nested_begin() {
        let manager = ResourcelessTransactionManager::new();
        manager.begin().unwrap();

        assert!(matches!(manager.begin(), Err(BatchError::Transaction(_))));
    }

    #[test]
    fn rejects_commit_without_begin() {
        let manager = ResourcelessTransactionManager::new();

        assert!(manager.commit().is_err());
    }

    #[test]
    fn rollback_releases_transaction() {
        let manager = ResourcelessTransactionManager::new();
        manager.begin().unwrap();
        manager.rollback().unwrap();

        assert!(!manager.is_active());
        assert!(manager.begin().is_ok());
    }
}
