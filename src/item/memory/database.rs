use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, VecDeque},
    rc::{Rc, Weak},
};

use log::debug;

use crate::{
    error::BatchError,
    item::source::{
        CursorSession, CursorSource, FetchPlan, Page, PageRequest, PageSession, PageSource,
        RowCursor, Session, DEFAULT_FETCH_SIZE,
    },
};

use super::entity::{Aggregate, Managed};

struct Tables<T> {
    rows: RefCell<Vec<T>>,
    next_id: Cell<i64>,
    round_trips: Cell<usize>,
    available: Cell<bool>,
    fail_from_row: Cell<Option<usize>>,
    sessions: RefCell<Vec<Weak<SessionState<T>>>>,
}

/// In-process relational engine holding one table of aggregates, ordered by
/// their generated id.
///
/// Every fetch of a window, page or child collection counts as one round
/// trip, which makes the access pattern of a reader observable.
pub struct MemoryDatabase<T> {
    tables: Rc<Tables<T>>,
}

impl<T: Aggregate> Default for MemoryDatabase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Aggregate> MemoryDatabase<T> {
    pub fn new() -> Self {
        Self {
            tables: Rc::new(Tables {
                rows: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
                round_trips: Cell::new(0),
                available: Cell::new(true),
                fail_from_row: Cell::new(None),
                sessions: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Stores `row` under a newly generated id and returns that id.
    pub fn insert(&self, mut row: T) -> i64 {
        let id = self.tables.next_id.get();
        self.tables.next_id.set(id + 1);
        row.assign_id(id);
        self.tables.rows.borrow_mut().push(row);
        id
    }

    pub fn find(&self, id: i64) -> Option<T> {
        self.tables
            .rows
            .borrow()
            .iter()
            .find(|row| row.id() == id)
            .cloned()
    }

    pub fn rows(&self) -> Vec<T> {
        self.tables.rows.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tables.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.rows.borrow().is_empty()
    }

    pub fn round_trips(&self) -> usize {
        self.tables.round_trips.get()
    }

    pub fn reset_round_trips(&self) {
        self.tables.round_trips.set(0);
    }

    /// Sessions opened and not closed yet.
    pub fn open_sessions(&self) -> usize {
        self.live_sessions().len()
    }

    /// Entities currently held in the identity maps of all open sessions.
    pub fn tracked_entities(&self) -> usize {
        self.live_sessions()
            .iter()
            .map(|session| session.identity_map.borrow().len())
            .sum()
    }

    /// When unavailable, opening a session fails with
    /// [`BatchError::ResourceUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.tables.available.set(available);
    }

    /// Makes any read of the logical row `row_index` or beyond fail, as a
    /// cursor invalidated mid-scan would.
    pub fn fail_reads_from(&self, row_index: usize) {
        self.tables.fail_from_row.set(Some(row_index));
    }

    pub fn clear_read_failure(&self) {
        self.tables.fail_from_row.set(None);
    }

    /// Query over every row.
    pub fn query(&self) -> MemoryQuery<T> {
        self.query_where(|_| true)
    }

    /// Query over the rows matching `predicate`, in id order.
    pub fn query_where<F>(&self, predicate: F) -> MemoryQuery<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        MemoryQuery {
            tables: Rc::clone(&self.tables),
            predicate: Rc::new(predicate),
        }
    }

    fn live_sessions(&self) -> Vec<Rc<SessionState<T>>> {
        let mut sessions = self.tables.sessions.borrow_mut();
        sessions.retain(|session| session.upgrade().is_some_and(|state| state.open.get()));
        sessions.iter().filter_map(Weak::upgrade).collect()
    }
}

/// Ordered query over a [`MemoryDatabase`], usable both as a cursor source and
/// as a page source.
pub struct MemoryQuery<T> {
    tables: Rc<Tables<T>>,
    predicate: Rc<dyn Fn(&T) -> bool>,
}

impl<T> Clone for MemoryQuery<T> {
    fn clone(&self) -> Self {
        Self {
            tables: Rc::clone(&self.tables),
            predicate: Rc::clone(&self.predicate),
        }
    }
}

impl<T: Aggregate> MemoryQuery<T> {
    /// Number of matching rows.
    pub fn count(&self) -> usize {
        self.tables
            .rows
            .borrow()
            .iter()
            .filter(|row| (self.predicate)(row))
            .count()
    }

    fn open_session(&self) -> Result<Rc<SessionState<T>>, BatchError> {
        if !self.tables.available.get() {
            return Err(BatchError::ResourceUnavailable(
                "database is not available".to_string(),
            ));
        }
        let state = Rc::new(SessionState {
            query: self.clone(),
            identity_map: RefCell::new(BTreeMap::new()),
            open: Cell::new(true),
        });
        self.tables
            .sessions
            .borrow_mut()
            .push(Rc::downgrade(&state));
        debug!("Session opened");
        Ok(state)
    }

    /// One round trip returning at most `limit` matching rows from `offset`.
    fn window(&self, offset: usize, limit: usize) -> Vec<T> {
        self.tables
            .round_trips
            .set(self.tables.round_trips.get() + 1);
        self.tables
            .rows
            .borrow()
            .iter()
            .filter(|row| (self.predicate)(row))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    fn check_readable(&self, row_index: usize) -> Result<(), BatchError> {
        match self.tables.fail_from_row.get() {
            Some(limit) if row_index >= limit => Err(BatchError::ItemReader(format!(
                "cursor invalidated at row {row_index}"
            ))),
            _ => Ok(()),
        }
    }
}

impl<T: Aggregate> CursorSource<Managed<T>> for MemoryQuery<T> {
    fn open_cursor_session(&self) -> Result<Box<dyn CursorSession<Managed<T>>>, BatchError> {
        Ok(Box::new(MemorySession {
            state: self.open_session()?,
        }))
    }
}

impl<T: Aggregate> PageSource<Managed<T>> for MemoryQuery<T> {
    fn open_page_session(&self) -> Result<Box<dyn PageSession<Managed<T>>>, BatchError> {
        Ok(Box::new(MemorySession {
            state: self.open_session()?,
        }))
    }
}

struct SessionState<T> {
    query: MemoryQuery<T>,
    identity_map: RefCell<BTreeMap<i64, Managed<T>>>,
    open: Cell<bool>,
}

impl<T: Aggregate> SessionState<T> {
    fn ensure_open(&self) -> Result<(), BatchError> {
        if self.open.get() {
            Ok(())
        } else {
            Err(BatchError::ItemReader("session is closed".to_string()))
        }
    }

    /// Returns the tracked instance of `row` if any, otherwise starts tracking it.
    fn attach(&self, row: T) -> Managed<T> {
        self.identity_map
            .borrow_mut()
            .entry(row.id())
            .or_insert_with(|| Managed::new(row))
            .clone()
    }
}

/// Session over a [`MemoryQuery`].
struct MemorySession<T> {
    state: Rc<SessionState<T>>,
}

impl<T: Aggregate> Session for MemorySession<T> {
    fn clear(&self) -> Result<(), BatchError> {
        self.state.ensure_open()?;
        let mut identity_map = self.state.identity_map.borrow_mut();
        debug!("Clearing {} tracked entities", identity_map.len());
        identity_map.clear();
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        if self.state.open.replace(false) {
            self.state.identity_map.borrow_mut().clear();
            debug!("Session closed");
        }
        Ok(())
    }
}

impl<T: Aggregate> CursorSession<Managed<T>> for MemorySession<T> {
    fn scroll(&self, fetch_size: usize) -> Result<Box<dyn RowCursor<Managed<T>>>, BatchError> {
        self.state.ensure_open()?;
        let fetch_size = if fetch_size == 0 {
            DEFAULT_FETCH_SIZE
        } else {
            fetch_size
        };
        Ok(Box::new(MemoryCursor {
            session: Rc::clone(&self.state),
            fetch_size,
            buffer: VecDeque::with_capacity(fetch_size),
            fetched: 0,
            position: 0,
            exhausted: false,
            closed: false,
        }))
    }
}

impl<T: Aggregate> PageSession<Managed<T>> for MemorySession<T> {
    fn fetch_page(
        &self,
        request: PageRequest,
        plan: FetchPlan,
    ) -> Result<Page<Managed<T>>, BatchError> {
        self.state.ensure_open()?;
        let rows = self.state.query.window(request.offset(), request.size);
        if !rows.is_empty() {
            self.state
                .query
                .check_readable(request.offset() + rows.len() - 1)?;
        }

        let items = rows
            .into_iter()
            .map(|row| match plan {
                FetchPlan::Eager => row,
                FetchPlan::Lazy => row.without_collections(),
            })
            .map(|row| self.state.attach(row))
            .collect();

        Ok(Page::new(request, items))
    }

    fn detach(&self, item: &Managed<T>) -> Result<(), BatchError> {
        self.state.ensure_open()?;
        let id = item.borrow().id();
        self.state.identity_map.borrow_mut().remove(&id);
        Ok(())
    }

    fn collections(&self) -> &'static [&'static str] {
        T::collections()
    }

    fn load_collection(&self, item: &mut Managed<T>, collection: &str) -> Result<(), BatchError> {
        self.state.ensure_open()?;
        let tables = &self.state.query.tables;
        tables.round_trips.set(tables.round_trips.get() + 1);

        let id = item.borrow().id();
        let source = tables
            .rows
            .borrow()
            .iter()
            .find(|row| row.id() == id)
            .cloned()
            .ok_or_else(|| BatchError::ItemReader(format!("row {id} no longer exists")))?;

        item.borrow_mut().load_collection(collection, &source);
        Ok(())
    }
}

/// Forward-only cursor buffering `fetch_size` rows per round trip.
struct MemoryCursor<T> {
    session: Rc<SessionState<T>>,
    fetch_size: usize,
    buffer: VecDeque<T>,
    fetched: usize,
    position: usize,
    exhausted: bool,
    closed: bool,
}

impl<T: Aggregate> RowCursor<Managed<T>> for MemoryCursor<T> {
    fn advance(&mut self) -> Result<Option<Managed<T>>, BatchError> {
        if self.closed {
            return Err(BatchError::ItemReader("cursor is closed".to_string()));
        }
        self.session.ensure_open()?;

        if self.buffer.is_empty() && !self.exhausted {
            let window = self.session.query.window(self.fetched, self.fetch_size);
            self.fetched += window.len();
            self.exhausted = window.len() < self.fetch_size;
            self.buffer.extend(window);
        }

        let Some(row) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.session.query.check_readable(self.position)?;
        self.position += 1;

        Ok(Some(self.session.attach(row)))
    }

    fn position(&self) -> usize {
        self.position
    }

    fn close(&mut self) -> Result<(), BatchError> {
        self.closed = true;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Order {
        id: i64,
        customer: String,
        lines: Vec<String>,
    }

    impl Order {
        fn new(customer: &str, lines: &[&str]) -> Self {
            Self {
                id: 0,
                customer: customer.to_string(),
                lines: lines.iter().map(|line| line.to_string()).collect(),
            }
        }
    }

    impl Aggregate for Order {
        fn id(&self) -> i64 {
            self.id
        }

        fn assign_id(&mut self, id: i64) {
            self.id = id;
        }

        fn collections() -> &'static [&'static str] {
            &["lines"]
        }

        fn without_collections(&self) -> Self {
            Self {
                lines: Vec::new(),
                ..self.clone()
            }
        }

        fn load_collection(&mut self, name: &str, source: &Self) {
            if name == "lines" {
                self.lines = source.lines.clone();
            }
        }
    }

    fn database(orders: usize) -> MemoryDatabase<Order> {
        let database = MemoryDatabase::new();
        for i in 0..orders {
            database.insert(Order::new(&format!("customer{i}"), &["a", "b"]));
        }
        database
    }

    #[test]
    fn insert_generates_ids_in_order() {
        let database = database(3);
        let ids: Vec<i64> = database.rows().iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn cursor_buffers_one_window_per_round_trip() {
        let database = database(5);
        let session = database.query().open_cursor_session().unwrap();
        let mut cursor = session.scroll(2).unwrap();

        let mut ids = Vec::new();
        while let Some(order) = cursor.advance().unwrap() {
            ids.push(order.borrow().id);
        }

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(cursor.position(), 5);
        assert_eq!(database.round_trips(), 3);
    }

    #[test]
    fn session_returns_tracked_instance_until_cleared() {
        let database = database(2);
        let query = database.query();
        let session = query.open_page_session().unwrap();

        let first = session
            .fetch_page(PageRequest::new(0, 1), FetchPlan::Eager)
            .unwrap();
        let again = session
            .fetch_page(PageRequest::new(0, 1), FetchPlan::Eager)
            .unwrap();
        assert!(first.items()[0].ptr_eq(&again.items()[0]));
        assert_eq!(database.tracked_entities(), 1);

        session.clear().unwrap();
        let fresh = session
            .fetch_page(PageRequest::new(0, 1), FetchPlan::Eager)
            .unwrap();
        assert!(!first.items()[0].ptr_eq(&fresh.items()[0]));
    }

    #[test]
    fn detached_entity_is_not_returned_again() {
        let database = database(2);
        let session = database.query().open_page_session().unwrap();
        let page = session
            .fetch_page(PageRequest::new(0, 2), FetchPlan::Eager)
            .unwrap();

        session.detach(&page.items()[1]).unwrap();
        page.items()[1].borrow_mut().customer = "ignored".to_string();
        assert_eq!(database.tracked_entities(), 1);

        let again = session
            .fetch_page(PageRequest::new(0, 2), FetchPlan::Eager)
            .unwrap();
        assert!(again.items()[0].ptr_eq(&page.items()[0]));
        assert!(!again.items()[1].ptr_eq(&page.items()[1]));
        assert_eq!(again.items()[1].borrow().customer, "customer1");
        assert_eq!(database.find(2).unwrap().customer, "customer1");
    }

    #[test]
    fn lazy_fetch_loads_collections_in_extra_round_trips() {
        let database = database(2);
        let session = database.query().open_page_session().unwrap();

        let page = session
            .fetch_page(PageRequest::new(0, 2), FetchPlan::Lazy)
            .unwrap();
        assert!(page.items()[0].borrow().lines.is_empty());

        let mut order = page.items()[0].clone();
        session.load_collection(&mut order, "lines").unwrap();

        assert_eq!(order.borrow().lines, vec!["a", "b"]);
        assert_eq!(database.round_trips(), 2);
    }

    #[test]
    fn unavailable_database_refuses_sessions() {
        let database = database(1);
        database.set_available(false);

        let result = database.query().open_cursor_session();

        assert!(matches!(result, Err(BatchError::ResourceUnavailable(_))));
    }

    #[test]
    fn closed_session_is_released() {
        let database = database(1);
        let session = database.query().open_page_session().unwrap();
        assert_eq!(database.open_sessions(), 1);

        session.close().unwrap();

        assert_eq!(database.open_sessions(), 0);
        assert!(session.clear().is_err());
    }

    #[test]
    fn read_failure_is_reported_at_row() {
        let database = database(3);
        database.fail_reads_from(1);
        let session = database.query().open_cursor_session().unwrap();
        let mut cursor = session.scroll(10).unwrap();

        assert!(cursor.advance().unwrap().is_some());
        assert_eq!(
            cursor.advance().err(),
            Some(BatchError::ItemReader("cursor invalidated at row 1".to_string()))
        );
    }
}
