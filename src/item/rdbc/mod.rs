use std::future::Future;

use sqlx::{query_builder::Separated, Database};

use crate::error::BatchError;

/// SQLite query as a cursor source and a page source.
pub mod sqlite_source;

/// Chunk transactions on a SQLite pool.
pub mod sqlite_transaction;

/// Batched inserts into a SQLite table.
pub mod sqlite_writer;

/// Binds the fields of an item as the values of one inserted row.
///
/// # Examples
///
/// ```
/// use store_batch_rs::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
///
/// struct History {
///     store_name: String,
///     product_names: String,
/// }
///
/// struct HistoryBinder;
///
/// impl DatabaseItemBinder<History, Sqlite> for HistoryBinder {
///     fn bind(&self, item: &History, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.store_name.clone());
///         query_builder.push_bind(item.product_names.clone());
///     }
/// }
/// ```
pub trait DatabaseItemBinder<O, DB: Database> {
    /// Pushes one bind per column, in column order.
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

/// Runs `future` to completion from synchronous reader or writer code.
///
/// Needs a multi-threaded tokio runtime on the current thread.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| BatchError::ResourceUnavailable(format!("no tokio runtime: {}", e)))?;
    Ok(tokio::task::block_in_place(|| handle.block_on(future)))
}

pub use sqlite_source::SqliteRowSource;
pub use sqlite_transaction::SqliteTransactionManager;
pub use sqlite_writer::SqliteItemWriter;
