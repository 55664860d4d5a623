use std::cell::{Cell, RefCell};

use log::{debug, info};

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
    item::source::{FetchPlan, PageRequest, PageSession, PageSource},
};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// How a paging reader manages the session between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// Entities stay tracked by the session until the next page: the session
    /// is cleared right before each fetch, so every page is read fresh.
    /// Changes made to the items handed out are never written back.
    Transacted,
    /// Every entity is detached as soon as its page is fetched. The items
    /// handed out are plain values that the session never sees again.
    Detached,
}

/// How child collections reach the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildLoading {
    /// Children come with the page query.
    JoinFetch,
    /// Children are loaded parent by parent after the page query.
    PerParent,
}

/// Reads offset-addressed pages of `page_size` rows, one page in memory at a
/// time.
///
/// Page `p` covers the logical rows `[p * page_size, (p + 1) * page_size)` of
/// the source order. Fetching page `p + 1` replaces page `p`; nothing
/// accumulates across pages.
///
/// # Examples
///
/// ```
/// use store_batch_rs::core::item::ItemReader;
/// use store_batch_rs::item::memory::{Managed, MemoryDatabase};
/// use store_batch_rs::item::paging::{PagingItemReaderBuilder, PagingMode};
/// use store_batch_rs::store::Store;
///
/// let database = MemoryDatabase::new();
/// for i in 0..5 {
///     database.insert(Store::new(&format!("store{i}"), "서울 강남구"));
/// }
///
/// let query = database.query();
/// let reader = PagingItemReaderBuilder::<Managed<Store>>::new()
///     .source(&query)
///     .page_size(2)
///     .mode(PagingMode::Detached)
///     .build()
///     .unwrap();
///
/// reader.open().unwrap();
/// let mut names = Vec::new();
/// while let Some(store) = reader.read().unwrap() {
///     names.push(store.borrow().name.clone());
/// }
/// reader.close().unwrap();
///
/// assert_eq!(names, vec!["store0", "store1", "store2", "store3", "store4"]);
/// ```
pub struct PagingItemReader<'a, T> {
    name: String,
    source: &'a dyn PageSource<T>,
    page_size: usize,
    mode: PagingMode,
    child_loading: ChildLoading,
    session: RefCell<Option<Box<dyn PageSession<T>>>>,
    /// Current page, `None` until the first fetch and after a jump
    results: RefCell<Option<Vec<T>>>,
    /// Index of the next page to fetch
    page: Cell<usize>,
    /// Index within the current page of the next item to return
    current: Cell<usize>,
    collection_loads: Cell<usize>,
}

impl<T> PagingItemReader<'_, T> {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.session.borrow().is_some()
    }

    /// Index of the next page to fetch.
    pub fn next_page(&self) -> usize {
        self.page.get()
    }

    /// Number of items of the current page, 0 before the first fetch.
    pub fn buffered(&self) -> usize {
        self.results.borrow().as_ref().map_or(0, Vec::len)
    }

    /// Child collections loaded one parent at a time so far.
    pub fn collection_loads(&self) -> usize {
        self.collection_loads.get()
    }

    fn not_open(&self) -> BatchError {
        BatchError::ItemReader(format!("reader {} is not open", self.name))
    }

    fn read_page(&self) -> Result<(), BatchError> {
        let session = self.session.borrow();
        let session = session.as_ref().ok_or_else(|| self.not_open())?;

        if self.mode == PagingMode::Transacted {
            session.clear()?;
        }

        let plan = match self.child_loading {
            ChildLoading::JoinFetch => FetchPlan::Eager,
            ChildLoading::PerParent => FetchPlan::Lazy,
        };
        let request = PageRequest::new(self.page.get(), self.page_size);
        let mut items = session.fetch_page(request, plan)?.into_items();

        if self.child_loading == ChildLoading::PerParent {
            for item in items.iter_mut() {
                for collection in session.collections() {
                    session.load_collection(item, collection)?;
                    self.collection_loads.set(self.collection_loads.get() + 1);
                }
            }
        }

        if self.mode == PagingMode::Detached {
            for item in &items {
                session.detach(item)?;
            }
        }

        debug!(
            "Reader {} fetched page {} ({} items, offset {})",
            self.name,
            request.index,
            items.len(),
            request.offset()
        );
        *self.results.borrow_mut() = Some(items);
        Ok(())
    }
}

impl<T: Clone> PagingItemReader<'_, T> {
    /// Copy of the current page.
    pub fn page_contents(&self) -> Vec<T> {
        self.results.borrow().clone().unwrap_or_default()
    }
}

impl<T: Clone> ItemReader<T> for PagingItemReader<'_, T> {
    fn open(&self) -> Result<(), BatchError> {
        if self.is_open() {
            return Err(BatchError::AlreadyOpen(format!(
                "session of reader {} is already open",
                self.name
            )));
        }

        let session = self.source.open_page_session()?;
        *self.session.borrow_mut() = Some(session);
        *self.results.borrow_mut() = None;
        self.page.set(0);
        self.current.set(0);
        debug!(
            "Reader {} opened, page size {}, {:?}",
            self.name, self.page_size, self.mode
        );
        Ok(())
    }

    fn read(&self) -> ItemReaderResult<T> {
        if !self.is_open() {
            return Err(self.not_open());
        }

        let needs_page =
            self.results.borrow().is_none() || self.current.get() >= self.page_size;
        if needs_page {
            self.read_page()?;
            self.page.set(self.page.get() + 1);
            if self.current.get() >= self.page_size {
                self.current.set(0);
            }
        }

        let next = self.current.get();
        self.current.set(next + 1);

        Ok(self
            .results
            .borrow()
            .as_ref()
            .and_then(|results| results.get(next))
            .cloned())
    }

    /// Positions the reader directly on the page holding `item_index`; no
    /// row before it is fetched.
    fn jump_to_item(&self, item_index: usize) -> Result<(), BatchError> {
        self.page.set(item_index / self.page_size);
        self.current.set(item_index % self.page_size);
        *self.results.borrow_mut() = None;
        info!(
            "Reader {} jumped to item {} (page {}, index {})",
            self.name,
            item_index,
            self.page.get(),
            self.current.get()
        );
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        *self.results.borrow_mut() = None;
        self.page.set(0);
        self.current.set(0);
        let result = match self.session.borrow_mut().take() {
            Some(session) => session.close(),
            None => Ok(()),
        };
        debug!("Reader {} closed", self.name);
        result
    }
}

/// Builder of [`PagingItemReader`]. Defaults to transacted pages of
/// [`DEFAULT_PAGE_SIZE`] rows.
pub struct PagingItemReaderBuilder<'a, T> {
    name: Option<String>,
    source: Option<&'a dyn PageSource<T>>,
    page_size: usize,
    mode: PagingMode,
    child_loading: ChildLoading,
}

impl<T> Default for PagingItemReaderBuilder<'_, T> {
    fn default() -> Self {
        Self {
            name: None,
            source: None,
            page_size: DEFAULT_PAGE_SIZE,
            mode: PagingMode::Transacted,
            child_loading: ChildLoading::JoinFetch,
        }
    }
}

impl<'a, T> PagingItemReaderBuilder<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn source(mut self, source: &'a dyn PageSource<T>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn mode(mut self, mode: PagingMode) -> Self {
        self.mode = mode;
        self
    }

    /// `true` for [`PagingMode::Transacted`], `false` for [`PagingMode::Detached`].
    pub fn transacted(self, transacted: bool) -> Self {
        self.mode(if transacted {
            PagingMode::Transacted
        } else {
            PagingMode::Detached
        })
    }

    pub(crate) fn child_loading(mut self, child_loading: ChildLoading) -> Self {
        self.child_loading = child_loading;
        self
    }

    pub fn build(self) -> Result<PagingItemReader<'a, T>, BatchError> {
        if self.page_size == 0 {
            return Err(BatchError::InvalidConfig(
                "page size must be positive".to_string(),
            ));
        }
        let source = self.source.ok_or_else(|| {
            BatchError::InvalidConfig("source is required for building a paging reader".to_string())
        })?;

        Ok(PagingItemReader {
            name: self
                .name
                .unwrap_or_else(|| "pagingItemReader".to_string()),
            source,
            page_size: self.page_size,
            mode: self.mode,
            child_loading: self.child_loading,
            session: RefCell::new(None),
            results: RefCell::new(None),
            page: Cell::new(0),
            current: Cell::new(0),
            collection_loads: Cell::new(0),
        })
    }
}
