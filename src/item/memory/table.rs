use std::cell::{Cell, RefCell};

use log::debug;

use crate::{
    core::{
        item::{ItemWriter, ItemWriterResult},
        transaction::TransactionManager,
    },
    error::BatchError,
};

/// Append-only output table with transactional visibility.
///
/// Rows inserted while a transaction is active stay pending until `commit`
/// and are dropped by `rollback`. Outside a transaction inserts are visible
/// immediately.
pub struct MemoryTable<T> {
    committed: RefCell<Vec<T>>,
    pending: RefCell<Option<Vec<T>>>,
    commits: Cell<usize>,
    rollbacks: Cell<usize>,
}

impl<T> Default for MemoryTable<T> {
    fn default() -> Self {
        Self {
            committed: RefCell::new(Vec::new()),
            pending: RefCell::new(None),
            commits: Cell::new(0),
            rollbacks: Cell::new(0),
        }
    }
}

impl<T: Clone> MemoryTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, items: &[T]) {
        match self.pending.borrow_mut().as_mut() {
            Some(pending) => pending.extend_from_slice(items),
            None => self.committed.borrow_mut().extend_from_slice(items),
        }
    }

    /// Committed rows, in insertion order.
    pub fn rows(&self) -> Vec<T> {
        self.committed.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.committed.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.borrow().is_empty()
    }

    pub fn commits(&self) -> usize {
        self.commits.get()
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.get()
    }

    pub fn in_transaction(&self) -> bool {
        self.pending.borrow().is_some()
    }
}

impl<T> TransactionManager for MemoryTable<T> {
    fn begin(&self) -> Result<(), BatchError> {
        let mut pending = self.pending.borrow_mut();
        if pending.is_some() {
            return Err(BatchError::Transaction(
                "a transaction is already active".to_string(),
            ));
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        let pending = self.pending.borrow_mut().take().ok_or_else(|| {
            BatchError::Transaction("no active transaction to commit".to_string())
        })?;
        debug!("Commit of {} rows", pending.len());
        self.committed.borrow_mut().extend(pending);
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        let pending = self.pending.borrow_mut().take().ok_or_else(|| {
            BatchError::Transaction("no active transaction to roll back".to_string())
        })?;
        debug!("Rollback of {} rows", pending.len());
        self.rollbacks.set(self.rollbacks.get() + 1);
        Ok(())
    }
}

/// Writes every item of a chunk to a [`MemoryTable`].
pub struct MemoryItemWriter<'a, T> {
    table: &'a MemoryTable<T>,
}

impl<'a, T> MemoryItemWriter<'a, T> {
    pub fn new(table: &'a MemoryTable<T>) -> Self {
        Self { table }
    }
}

impl<T: Clone> ItemWriter<T> for MemoryItemWriter<'_, T> {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        self.table.insert(items);
        Ok(())
    }
}
