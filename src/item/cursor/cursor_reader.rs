use std::cell::{Cell, RefCell};

use log::{debug, info};

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
    item::source::{CursorSession, CursorSource, RowCursor},
};

/// Lower bound of the number of rows advanced between two session clears,
/// whether read or skipped on restart.
pub const MIN_FLUSH_INTERVAL: usize = 100;

/// Streams rows through a single forward-only cursor held open for the whole
/// step.
///
/// The session tracking the returned entities is cleared after every committed
/// chunk (`update`) and every `flush_interval` rows, read or skipped on
/// restart, so memory stays bounded whatever the size of the source.
///
/// # Examples
///
/// ```
/// use store_batch_rs::core::item::ItemReader;
/// use store_batch_rs::item::cursor::CursorItemReaderBuilder;
/// use store_batch_rs::item::memory::{MemoryDatabase, Managed};
/// use store_batch_rs::store::Store;
///
/// let database = MemoryDatabase::new();
/// database.insert(Store::new("store1", "서울 강남구"));
/// database.insert(Store::new("store2", "서울 마포구"));
///
/// let query = database.query();
/// let reader = CursorItemReaderBuilder::<Managed<Store>>::new()
///     .source(&query)
///     .fetch_size(100)
///     .build()
///     .unwrap();
///
/// reader.open().unwrap();
/// assert_eq!(reader.read().unwrap().unwrap().borrow().name, "store1");
/// assert_eq!(reader.read().unwrap().unwrap().borrow().name, "store2");
/// assert!(reader.read().unwrap().is_none());
/// reader.close().unwrap();
/// ```
pub struct CursorItemReader<'a, T> {
    name: String,
    source: &'a dyn CursorSource<T>,
    fetch_size: usize,
    session: RefCell<Option<Box<dyn CursorSession<T>>>>,
    cursor: RefCell<Option<Box<dyn RowCursor<T>>>>,
    read_count: Cell<usize>,
}

impl<T> CursorItemReader<'_, T> {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Rows advanced between two periodic session clears.
    pub fn flush_interval(&self) -> usize {
        self.fetch_size.max(MIN_FLUSH_INTERVAL)
    }

    pub fn is_open(&self) -> bool {
        self.cursor.borrow().is_some()
    }

    /// Rows advanced over since `open`, whether returned by `read` or skipped
    /// by `jump_to_item`.
    pub fn position(&self) -> usize {
        self.cursor
            .borrow()
            .as_ref()
            .map_or(0, |cursor| cursor.position())
    }

    /// Items returned by `read` since `open`.
    pub fn read_count(&self) -> usize {
        self.read_count.get()
    }

    fn clear_session(&self) -> Result<(), BatchError> {
        match self.session.borrow().as_ref() {
            Some(session) => session.clear(),
            None => Ok(()),
        }
    }

    fn not_open(&self) -> BatchError {
        BatchError::ItemReader(format!("reader {} is not open", self.name))
    }
}

impl<T> ItemReader<T> for CursorItemReader<'_, T> {
    fn open(&self) -> Result<(), BatchError> {
        if self.is_open() {
            return Err(BatchError::AlreadyOpen(format!(
                "cursor of reader {} is already open",
                self.name
            )));
        }

        let session = self.source.open_cursor_session()?;
        let cursor = match session.scroll(self.fetch_size) {
            Ok(cursor) => cursor,
            Err(error) => {
                session.close()?;
                return Err(error);
            }
        };

        debug!(
            "Cursor of reader {} opened with fetch size {}",
            self.name, self.fetch_size
        );
        *self.session.borrow_mut() = Some(session);
        *self.cursor.borrow_mut() = Some(cursor);
        self.read_count.set(0);
        Ok(())
    }

    fn read(&self) -> ItemReaderResult<T> {
        let mut cursor = self.cursor.borrow_mut();
        let cursor = cursor.as_mut().ok_or_else(|| self.not_open())?;

        let item = cursor.advance()?;
        if item.is_some() {
            self.read_count.set(self.read_count.get() + 1);
            if self.read_count.get() % self.flush_interval() == 0 {
                debug!(
                    "Reader {} clearing its session after {} reads",
                    self.name,
                    self.read_count.get()
                );
                self.clear_session()?;
            }
        }
        Ok(item)
    }

    fn jump_to_item(&self, item_index: usize) -> Result<(), BatchError> {
        let flush_interval = self.flush_interval();
        let mut cursor = self.cursor.borrow_mut();
        let cursor = cursor.as_mut().ok_or_else(|| self.not_open())?;

        // The cursor cannot rewind: only the rows between the current
        // position and the target are advanced over.
        let start = cursor.position();
        info!(
            "Reader {} skipping {} rows to reach item {} (clearing every {})",
            self.name,
            item_index.saturating_sub(start),
            item_index,
            flush_interval
        );

        for i in start..item_index {
            if cursor.advance()?.is_none() {
                debug!("Source exhausted after {} skipped rows", i);
                break;
            }
            if i % flush_interval == 0 {
                self.clear_session()?;
            }
        }
        self.clear_session()
    }

    fn update(&self) -> Result<(), BatchError> {
        self.clear_session()
    }

    fn close(&self) -> Result<(), BatchError> {
        let cursor_result = match self.cursor.borrow_mut().take() {
            Some(mut cursor) => cursor.close(),
            None => Ok(()),
        };
        let session_result = match self.session.borrow_mut().take() {
            Some(session) => session.close(),
            None => Ok(()),
        };
        debug!("Cursor of reader {} closed", self.name);
        cursor_result.and(session_result)
    }
}

/// Builder of [`CursorItemReader`].
pub struct CursorItemReaderBuilder<'a, T> {
    name: Option<String>,
    source: Option<&'a dyn CursorSource<T>>,
    fetch_size: i32,
}

impl<T> Default for CursorItemReaderBuilder<'_, T> {
    fn default() -> Self {
        Self {
            name: None,
            source: None,
            fetch_size: 0,
        }
    }
}

impl<'a, T> CursorItemReaderBuilder<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn source(mut self, source: &'a dyn CursorSource<T>) -> Self {
        self.source = Some(source);
        self
    }

    /// Rows buffered per round trip. `0` keeps the default of the source.
    pub fn fetch_size(mut self, fetch_size: i32) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn build(self) -> Result<CursorItemReader<'a, T>, BatchError> {
        let fetch_size = usize::try_from(self.fetch_size).map_err(|_| {
            BatchError::InvalidConfig(format!(
                "fetch size must not be negative, got {}",
                self.fetch_size
            ))
        })?;
        let source = self.source.ok_or_else(|| {
            BatchError::InvalidConfig("source is required for building a cursor reader".to_string())
        })?;

        Ok(CursorItemReader {
            name: self.name.unwrap_or_else(|| "cursorItemReader".to_string()),
            source,
            fetch_size,
            session: RefCell::new(None),
            cursor: RefCell::new(None),
            read_count: Cell::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::memory::{Aggregate, Managed, MemoryDatabase};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
    }

    impl Aggregate for Row {
        fn id(&self) -> i64 {
            self.id
        }

        fn assign_id(&mut self, id: i64) {
            self.id = id;
        }
    }

    fn database(rows: usize) -> MemoryDatabase<Row> {
        let database = MemoryDatabase::new();
        for _ in 0..rows {
            database.insert(Row { id: 0 });
        }
        database
    }

    fn ids(reader: &CursorItemReader<Managed<Row>>) -> Vec<i64> {
        let mut ids = Vec::new();
        while let Some(row) = reader.read().unwrap() {
            ids.push(row.borrow().id);
        }
        ids
    }

    #[test]
    fn negative_fetch_size_is_rejected() {
        let database = database(1);
        let query = database.query();

        let result = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(-1)
            .build();

        assert!(matches!(result, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn flush_interval_has_a_floor() {
        let database = database(1);
        let query = database.query();

        let small = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(10)
            .build()
            .unwrap();
        let large = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(500)
            .build()
            .unwrap();

        assert_eq!(small.flush_interval(), 100);
        assert_eq!(large.flush_interval(), 500);
    }

    #[test]
    fn second_open_fails() {
        let database = database(1);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new().source(&query).build().unwrap();

        reader.open().unwrap();

        assert!(matches!(reader.open(), Err(BatchError::AlreadyOpen(_))));
        assert_eq!(database.open_sessions(), 1);
    }

    #[test]
    fn read_before_open_fails() {
        let database = database(1);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new().source(&query).build().unwrap();

        assert!(matches!(reader.read(), Err(BatchError::ItemReader(_))));
    }

    #[test]
    fn reads_every_row_once_in_order() {
        let database = database(7);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(3)
            .build()
            .unwrap();

        reader.open().unwrap();

        assert_eq!(ids(&reader), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(reader.read_count(), 7);
        assert_eq!(database.round_trips(), 3);
    }

    #[test]
    fn update_clears_tracked_entities() {
        let database = database(4);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(2)
            .build()
            .unwrap();

        reader.open().unwrap();
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(database.tracked_entities(), 2);

        reader.update().unwrap();

        assert_eq!(database.tracked_entities(), 0);
    }

    #[test]
    fn jump_matches_reading_from_the_start() {
        let database = database(250);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(20)
            .build()
            .unwrap();

        reader.open().unwrap();
        reader.jump_to_item(230).unwrap();

        assert_eq!(reader.position(), 230);
        assert_eq!(reader.read_count(), 0);
        assert_eq!(database.tracked_entities(), 0);
        assert_eq!(ids(&reader), (231..=250).collect::<Vec<i64>>());
    }

    #[test]
    fn jump_twice_to_the_same_item_skips_once() {
        let database = database(10);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(4)
            .build()
            .unwrap();

        reader.open().unwrap();
        reader.jump_to_item(3).unwrap();
        reader.jump_to_item(3).unwrap();

        assert_eq!(reader.position(), 3);
        assert_eq!(reader.read().unwrap().unwrap().borrow().id, 4);
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn long_scan_clears_session_every_flush_interval() {
        let database = database(250);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .fetch_size(20)
            .build()
            .unwrap();

        reader.open().unwrap();
        for _ in 0..99 {
            reader.read().unwrap();
        }
        assert_eq!(database.tracked_entities(), 99);

        reader.read().unwrap();
        assert_eq!(database.tracked_entities(), 0);

        for _ in 0..50 {
            reader.read().unwrap();
        }
        assert_eq!(database.tracked_entities(), 50);
        assert_eq!(reader.read_count(), 150);
    }

    #[test]
    fn jump_past_end_leaves_reader_exhausted() {
        let database = database(3);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new().source(&query).build().unwrap();

        reader.open().unwrap();
        reader.jump_to_item(10).unwrap();

        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn close_releases_session_and_allows_reopen() {
        let database = database(2);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new().source(&query).build().unwrap();

        reader.open().unwrap();
        reader.read().unwrap();
        reader.close().unwrap();

        assert_eq!(database.open_sessions(), 0);
        assert!(!reader.is_open());

        reader.open().unwrap();
        assert_eq!(ids(&reader), vec![1, 2]);
    }

    #[test]
    fn unavailable_source_is_reported() {
        let database = database(2);
        database.set_available(false);
        let query = database.query();
        let reader = CursorItemReaderBuilder::<Managed<Row>>::new()
            .source(&query)
            .build()
            .unwrap();

        assert!(matches!(
            reader.open(),
            Err(BatchError::ResourceUnavailable(_))
        ));
        assert!(!reader.is_open());
    }
}
