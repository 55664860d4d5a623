use log::{debug, error};
use sqlx::{QueryBuilder, Sqlite};

use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::item::rdbc::{DatabaseItemBinder, SqliteTransactionManager};
use crate::BatchError;

// Default SQLITE_MAX_VARIABLE_NUMBER since SQLite 3.32
const BIND_LIMIT: usize = 32766;

/// Inserts items into a SQLite table with multi-row `INSERT` statements.
///
/// Statements run through a [`SqliteTransactionManager`]: when the same
/// manager is the transaction manager of the step, every row of a chunk is
/// written in the chunk transaction and disappears if the chunk rolls back.
/// A chunk larger than the bind limit of SQLite is split into several
/// statements.
///
/// # Examples
///
/// ```no_run
/// use store_batch_rs::item::rdbc::{DatabaseItemBinder, SqliteItemWriter, SqliteTransactionManager};
/// use sqlx::{query_builder::Separated, Sqlite, SqlitePool};
///
/// #[derive(Clone)]
/// struct History {
///     store_name: String,
///     product_names: String,
/// }
///
/// struct HistoryBinder;
/// impl DatabaseItemBinder<History, Sqlite> for HistoryBinder {
///     fn bind(&self, item: &History, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.store_name.clone());
///         query_builder.push_bind(item.product_names.clone());
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://stores.db").await?;
/// let transactions = SqliteTransactionManager::new(pool);
/// let binder = HistoryBinder;
///
/// let writer = SqliteItemWriter::<History>::new()
///     .transaction_manager(&transactions)
///     .table("store_history")
///     .add_column("store_name")
///     .add_column("product_names")
///     .item_binder(&binder);
/// # Ok(())
/// # }
/// ```
pub struct SqliteItemWriter<'a, O> {
    transaction_manager: Option<&'a SqliteTransactionManager>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Sqlite>>,
}

impl<O> Default for SqliteItemWriter<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O> SqliteItemWriter<'a, O> {
    /// Creates an unconfigured writer; every builder method below is required.
    pub fn new() -> Self {
        Self {
            transaction_manager: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    pub fn transaction_manager(mut self, transaction_manager: &'a SqliteTransactionManager) -> Self {
        self.transaction_manager = Some(transaction_manager);
        self
    }

    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column; binders push one value per column, in this order.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        let transaction_manager = self.transaction_manager.ok_or_else(|| {
            BatchError::ItemWriter("SQLite writer has no transaction manager".to_string())
        })?;
        let table = self
            .table
            .ok_or_else(|| BatchError::ItemWriter("SQLite writer has no table".to_string()))?;
        let item_binder = self
            .item_binder
            .ok_or_else(|| BatchError::ItemWriter("SQLite writer has no item binder".to_string()))?;
        if self.columns.is_empty() {
            return Err(BatchError::ItemWriter(format!(
                "SQLite writer for {} has no column",
                table
            )));
        }

        let rows_per_statement = (BIND_LIMIT / self.columns.len()).max(1);
        for batch in items.chunks(rows_per_statement) {
            let mut query_builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
            query_builder.push(table);
            query_builder.push(" (");
            query_builder.push(self.columns.join(","));
            query_builder.push(") ");
            query_builder.push_values(batch, |b, item| {
                item_binder.bind(item, b);
            });

            if let Err(e) = transaction_manager.execute(query_builder.build()) {
                error!("Failed to write items to SQLite table {}: {}", table, e);
                return Err(e);
            }
            debug!("Wrote {} items to SQLite table {}", batch.len(), table);
        }

        Ok(())
    }
}
