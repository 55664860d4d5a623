//! Access to an external, ordered row source.
//!
//! A source hands out sessions. A session is one unit of work against the
//! source: it tracks the entities it returned (its identity map) until they are
//! cleared or detached, and it is released with a typed `close`. Cursor
//! sessions stream rows through a forward-only [`RowCursor`]; page sessions
//! fetch offset-addressed [`Page`]s.

use crate::error::BatchError;

/// Rows buffered per round trip when a cursor is opened with a fetch size of 0.
pub const DEFAULT_FETCH_SIZE: usize = 10;

/// Page `index` of a source cut in pages of `size` rows, i.e. the logical rows
/// `[index * size, index * size + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    pub fn offset(&self) -> usize {
        self.index * self.size
    }
}

/// Rows of one page, fully materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    request: PageRequest,
    items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, items: Vec<T>) -> Self {
        Self { request, items }
    }

    pub fn request(&self) -> PageRequest {
        self.request
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A short page is the last one.
    pub fn is_last(&self) -> bool {
        self.items.len() < self.request.size
    }
}

/// How child collections of an aggregate are fetched with their parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Children come with the parent rows, in the same round trip.
    Eager,
    /// Only parent rows are fetched; each collection must be loaded on its own.
    Lazy,
}

/// One unit of work against the row source.
pub trait Session {
    /// Drops every tracked entity (the first-level cache).
    fn clear(&self) -> Result<(), BatchError>;

    /// Releases the session. Any use afterwards is an error.
    fn close(&self) -> Result<(), BatchError>;
}

/// Forward-only iteration handle. Advancing is monotonic: there is no rewind.
pub trait RowCursor<T> {
    /// Moves to the next row and returns it, `Ok(None)` once exhausted.
    fn advance(&mut self) -> Result<Option<T>, BatchError>;

    /// Number of rows advanced over so far.
    fn position(&self) -> usize;

    fn close(&mut self) -> Result<(), BatchError>;
}

pub trait CursorSession<T>: Session {
    /// Opens a forward-only cursor. `fetch_size` is the number of rows the
    /// source buffers per round trip, `0` meaning its own default.
    fn scroll(&self, fetch_size: usize) -> Result<Box<dyn RowCursor<T>>, BatchError>;
}

pub trait PageSession<T>: Session {
    fn fetch_page(&self, request: PageRequest, plan: FetchPlan) -> Result<Page<T>, BatchError>;

    /// Stops tracking `item`: a later fetch of the same row builds a new
    /// instance.
    fn detach(&self, item: &T) -> Result<(), BatchError>;

    /// Names of the child collections that a lazy fetch leaves unloaded.
    fn collections(&self) -> &'static [&'static str] {
        &[]
    }

    /// Loads one child collection of `item`, in a round trip of its own.
    fn load_collection(&self, _item: &mut T, _collection: &str) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Source of forward-only cursors, e.g. one query over a relational engine.
pub trait CursorSource<T> {
    fn open_cursor_session(&self) -> Result<Box<dyn CursorSession<T>>, BatchError>;
}

/// Source of offset/limit pages, e.g. one query over a relational engine.
pub trait PageSource<T> {
    fn open_page_session(&self) -> Result<Box<dyn PageSession<T>>, BatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_page_index() {
        assert_eq!(PageRequest::new(0, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 10).offset(), 30);
    }

    #[test]
    fn short_page_is_last() {
        let full = Page::new(PageRequest::new(0, 2), vec![1, 2]);
        let short = Page::new(PageRequest::new(1, 2), vec![3]);

        assert!(!full.is_last());
        assert!(short.is_last());
        assert_eq!(short.len(), 1);
    }
}
