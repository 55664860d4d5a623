use crate::error::BatchError;

/// Result of a single read: `Ok(Some(item))`, `Ok(None)` once the source is
/// exhausted, or the error that interrupted the scan.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

/// Result of processing one item. `Ok(None)` filters the item out of the chunk.
pub type ItemProcessorResult<O> = Result<Option<O>, BatchError>;

pub type ItemWriterResult = Result<(), BatchError>;

/// Retrieves input for a step, one item at a time.
///
/// Readers are driven by the chunk-oriented step, which owns the whole
/// lifecycle: `open`, an optional `jump_to_item` on restart, `read` until
/// exhaustion with an `update` after each committed chunk, then `close`.
///
/// Readers use interior mutability so that a step can hold them by shared
/// reference; they are not meant to be shared between threads.
pub trait ItemReader<I> {
    /// Reads the next item. Always returns at most one item per call.
    fn read(&self) -> ItemReaderResult<I>;

    /// Acquires the underlying resources (session, cursor, unit of work).
    fn open(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Moves the reader forward so that the next `read` returns the item at
    /// `item_index`. The default implementation replays `item_index` reads.
    fn jump_to_item(&self, item_index: usize) -> Result<(), BatchError> {
        for _ in 0..item_index {
            if self.read()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    /// Called after each committed chunk.
    fn update(&self) -> Result<(), BatchError> {
        Ok(())
    }

    /// Releases every resource acquired by `open`.
    fn close(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Business logic applied to each read item.
pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Output of a step, one chunk of items at a time.
///
/// `write` runs inside the chunk transaction: anything it persisted must be
/// discarded when the step rolls the chunk back.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor handing every item through unchanged.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<I: Clone> ItemProcessor<I, I> for PassThroughProcessor {
    fn process(&self, item: &I) -> ItemProcessorResult<I> {
        Ok(Some(item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct CountingReader {
        next: Cell<usize>,
        size: usize,
    }

    impl ItemReader<usize> for CountingReader {
        fn read(&self) -> ItemReaderResult<usize> {
            let next = self.next.get();
            if next >= self.size {
                return Ok(None);
            }
            self.next.set(next + 1);
            Ok(Some(next))
        }
    }

    #[test]
    fn default_jump_replays_reads() {
        let reader = CountingReader {
            next: Cell::new(0),
            size: 10,
        };

        reader.jump_to_item(4).unwrap();

        assert_eq!(reader.read().unwrap(), Some(4));
    }

    #[test]
    fn default_jump_stops_at_end_of_source() {
        let reader = CountingReader {
            next: Cell::new(0),
            size: 3,
        };

        reader.jump_to_item(7).unwrap();

        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn pass_through_processor_keeps_item() {
        let processor = PassThroughProcessor;
        assert_eq!(
            processor.process(&"store".to_string()).unwrap(),
            Some("store".to_string())
        );
    }
}
