use std::{cell::Cell, fmt::Debug};

use log::info;

use crate::{core::item::ItemWriter, BatchError};

/// Writer that only logs what it is given, one line per item.
#[derive(Default)]
pub struct LoggerWriter {
    label: Option<String>,
    written: Cell<usize>,
}

impl LoggerWriter {
    pub fn new(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            written: Cell::new(0),
        }
    }

    /// Items logged so far.
    pub fn written(&self) -> usize {
        self.written.get()
    }
}

impl<T> ItemWriter<T> for LoggerWriter
where
    T: Debug,
{
    fn write(&self, items: &[T]) -> Result<(), BatchError> {
        let label = self.label.as_deref().unwrap_or("record");
        items.iter().for_each(|item| info!("{}={:?}", label, item));
        self.written.set(self.written.get() + items.len());
        Ok(())
    }
}
