use std::{cell::RefCell, collections::VecDeque, marker::PhantomData, rc::Rc};

use log::debug;
use sqlx::{pool::PoolConnection, sqlite::SqliteRow, FromRow, Pool, QueryBuilder, Sqlite};

use crate::{
    error::BatchError,
    item::source::{
        CursorSession, CursorSource, FetchPlan, Page, PageRequest, PageSession, PageSource,
        RowCursor, Session, DEFAULT_FETCH_SIZE,
    },
};

use super::block_on;

/// An ordered `SELECT` over a SQLite pool.
///
/// The query must be deterministic in its order (`ORDER BY` a unique key) and
/// must not carry its own `LIMIT`: pages and cursor windows append
/// `LIMIT ? OFFSET ?` to it. Each session holds one pooled connection from
/// open to close.
///
/// Rows are mapped with [`FromRow`] into plain values, so there is nothing
/// for a session to track: `clear` and `detach` have no effect.
///
/// # Examples
///
/// ```no_run
/// use store_batch_rs::item::rdbc::SqliteRowSource;
/// use sqlx::SqlitePool;
///
/// #[derive(sqlx::FromRow, Clone)]
/// struct StoreRow {
///     id: i64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://stores.db").await?;
/// let source = SqliteRowSource::<StoreRow>::new(
///     pool,
///     "SELECT id, name FROM store WHERE address LIKE '서울%' ORDER BY id",
/// );
/// # Ok(())
/// # }
/// ```
pub struct SqliteRowSource<T> {
    pool: Pool<Sqlite>,
    query: String,
    _phantom: PhantomData<T>,
}

impl<T> SqliteRowSource<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    pub fn new(pool: Pool<Sqlite>, query: &str) -> Self {
        Self {
            pool,
            query: query.to_string(),
            _phantom: PhantomData,
        }
    }

    fn open_session(&self) -> Result<SqliteSession<T>, BatchError> {
        let connection = block_on(self.pool.acquire())?.map_err(|e| {
            BatchError::ResourceUnavailable(format!("cannot acquire SQLite connection: {}", e))
        })?;
        debug!("SQLite session opened for: {}", self.query);

        Ok(SqliteSession {
            state: Rc::new(SessionState {
                query: self.query.clone(),
                connection: RefCell::new(Some(connection)),
                _phantom: PhantomData,
            }),
        })
    }
}

impl<T> CursorSource<T> for SqliteRowSource<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn open_cursor_session(&self) -> Result<Box<dyn CursorSession<T>>, BatchError> {
        Ok(Box::new(self.open_session()?))
    }
}

impl<T> PageSource<T> for SqliteRowSource<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn open_page_session(&self) -> Result<Box<dyn PageSession<T>>, BatchError> {
        Ok(Box::new(self.open_session()?))
    }
}

struct SessionState<T> {
    query: String,
    connection: RefCell<Option<PoolConnection<Sqlite>>>,
    _phantom: PhantomData<T>,
}

impl<T> SessionState<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn ensure_open(&self) -> Result<(), BatchError> {
        if self.connection.borrow().is_some() {
            Ok(())
        } else {
            Err(BatchError::ItemReader("session is closed".to_string()))
        }
    }

    /// One round trip returning at most `limit` rows from `offset`.
    fn window(&self, offset: usize, limit: usize) -> Result<Vec<T>, BatchError> {
        let mut connection = self.connection.borrow_mut();
        let connection = connection
            .as_mut()
            .ok_or_else(|| BatchError::ItemReader("session is closed".to_string()))?;

        let mut query_builder = QueryBuilder::<Sqlite>::new(self.query.as_str());
        query_builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = block_on(
            query_builder
                .build_query_as::<T>()
                .fetch_all(&mut **connection),
        )?
        .map_err(|e| BatchError::ItemReader(format!("SQLite read failed: {}", e)))?;

        debug!(
            "Fetched {} rows at offset {} (limit {})",
            rows.len(),
            offset,
            limit
        );
        Ok(rows)
    }
}

struct SqliteSession<T> {
    state: Rc<SessionState<T>>,
}

impl<T> Session for SqliteSession<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn clear(&self) -> Result<(), BatchError> {
        self.state.ensure_open()
    }

    fn close(&self) -> Result<(), BatchError> {
        if self.state.connection.borrow_mut().take().is_some() {
            debug!("SQLite session closed");
        }
        Ok(())
    }
}

impl<T> CursorSession<T> for SqliteSession<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn scroll(&self, fetch_size: usize) -> Result<Box<dyn RowCursor<T>>, BatchError> {
        self.state.ensure_open()?;
        let fetch_size = if fetch_size == 0 {
            DEFAULT_FETCH_SIZE
        } else {
            fetch_size
        };

        Ok(Box::new(SqliteCursor {
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

impl<T> PageSession<T> for SqliteSession<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn fetch_page(&self, request: PageRequest, _plan: FetchPlan) -> Result<Page<T>, BatchError> {
        let rows = self.state.window(request.offset(), request.size)?;
        Ok(Page::new(request, rows))
    }

    fn detach(&self, _item: &T) -> Result<(), BatchError> {
        self.state.ensure_open()
    }
}

/// Forward-only cursor reading `fetch_size` rows per round trip on the
/// session connection.
struct SqliteCursor<T> {
    session: Rc<SessionState<T>>,
    fetch_size: usize,
    buffer: VecDeque<T>,
    fetched: usize,
    position: usize,
    exhausted: bool,
    closed: bool,
}

impl<T> RowCursor<T> for SqliteCursor<T>
where
    for<'r> T: FromRow<'r, SqliteRow> + Send + Unpin + 'static,
{
    fn advance(&mut self) -> Result<Option<T>, BatchError> {
        if self.closed {
            return Err(BatchError::ItemReader("cursor is closed".to_string()));
        }

        if self.buffer.is_empty() && !self.exhausted {
            let window = self.session.window(self.fetched, self.fetch_size)?;
            self.fetched += window.len();
            self.exhausted = window.len() < self.fetch_size;
            self.buffer.extend(window);
        }

        let item = self.buffer.pop_front();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
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
