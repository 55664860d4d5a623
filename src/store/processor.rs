use std::cell::Cell;

use log::{debug, info};

use crate::{
    core::item::{ItemProcessor, ItemProcessorResult},
    error::BatchError,
    item::memory::Managed,
};

use super::domain::{Store, StoreHistory};

/// Decides whether the processor fails on its `item_number`-th item
/// (1-based, counted per processor instance).
pub trait FaultInjector {
    fn check(&self, item_number: usize) -> Result<(), BatchError>;
}

pub struct NeverFail;

impl FaultInjector for NeverFail {
    fn check(&self, _item_number: usize) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Lets `limit` items through, then rejects every following one.
pub struct FailAfter(pub usize);

impl FaultInjector for FailAfter {
    fn check(&self, item_number: usize) -> Result<(), BatchError> {
        if item_number > self.0 {
            return Err(BatchError::ItemProcessor(format!(
                "item {} rejected, only {} allowed",
                item_number, self.0
            )));
        }
        Ok(())
    }
}

/// Turns each store into its [`StoreHistory`].
///
/// The item counter handed to the fault injector belongs to this instance: a
/// new processor starts counting from zero again.
pub struct StoreHistoryProcessor<'a> {
    faults: &'a dyn FaultInjector,
    processed: Cell<usize>,
}

impl<'a> StoreHistoryProcessor<'a> {
    pub fn new(faults: &'a dyn FaultInjector) -> Self {
        Self {
            faults,
            processed: Cell::new(0),
        }
    }

    /// Items seen so far, including a rejected one.
    pub fn processed(&self) -> usize {
        self.processed.get()
    }

    fn history(&self, store: &Store) -> ItemProcessorResult<StoreHistory> {
        let count = self.processed.get() + 1;
        self.processed.set(count);
        debug!("count={}", count);
        self.faults.check(count)?;

        let history = StoreHistory::from(store);
        info!("storeHistory={:?}", history);
        Ok(Some(history))
    }
}

impl ItemProcessor<Managed<Store>, StoreHistory> for StoreHistoryProcessor<'_> {
    fn process(&self, item: &Managed<Store>) -> ItemProcessorResult<StoreHistory> {
        self.history(&item.borrow())
    }
}

impl ItemProcessor<Store, StoreHistory> for StoreHistoryProcessor<'_> {
    fn process(&self, item: &Store) -> ItemProcessorResult<StoreHistory> {
        self.history(item)
    }
}
