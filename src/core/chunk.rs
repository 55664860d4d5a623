#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk holds `chunk_size` raw items and more may follow.
    Full,
    /// The reader was exhausted while filling this chunk.
    Finished,
}

/// An ordered batch of transformed items, committed as one transaction.
///
/// `consumed` counts the raw items read to build the chunk. It differs from
/// `items.len()` when the processor filters items out, and it is the value the
/// checkpoint advances by.
#[derive(Debug)]
pub struct Chunk<O> {
    items: Vec<O>,
    consumed: usize,
    chunk_size: usize,
    status: ChunkStatus,
}

impl<O> Chunk<O> {
    pub fn new(chunk_size: usize) -> Chunk<O> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            consumed: 0,
            chunk_size,
            status: ChunkStatus::Full,
        }
    }

    /// Records one raw item and, unless it was filtered, its transformed value.
    pub fn add_item(&mut self, item: Option<O>) {
        self.consumed += 1;
        if let Some(item) = item {
            self.items.push(item);
        }
    }

    /// Marks the source as exhausted.
    pub fn finish(&mut self) {
        self.status = ChunkStatus::Finished;
    }

    pub fn is_full(&self) -> bool {
        self.consumed >= self.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.consumed == 0
    }

    pub fn get_items(&self) -> &[O] {
        &self.items
    }

    pub fn get_consumed(&self) -> usize {
        self.consumed
    }

    /// Number of raw items dropped by the processor.
    pub fn get_filtered(&self) -> usize {
        self.consumed - self.items.len()
    }

    pub fn get_status(&self) -> ChunkStatus {
        self.status
    }
}
