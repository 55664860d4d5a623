#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Store Batch for Rust

 A chunk-oriented batch engine in the Spring Batch tradition, with the
 database readers it is usually paired with: a forward-only cursor reader and
 offset/limit paging readers, each with well defined session, restart and
 memory behaviour.

 ## Core Concepts

- **Job:** the whole batch process, a sequence of `Step`s run with a set of
  `JobParameters`.
- **Step:** either a `Tasklet` run once, or a chunk-oriented step reading,
  processing and writing items one chunk per transaction.
- **ItemReader:** retrieves input one item at a time. Readers are opened,
  fast-forwarded on restart, updated after each commit and closed.
- **ItemProcessor:** turns a read item into the item to write, or filters it.
- **ItemWriter:** writes a whole chunk inside the chunk transaction.
- **TransactionManager:** begins, commits and rolls back the chunk
  transaction.
- **CheckpointStore:** persists the number of items already committed, keyed
  by job name, job parameters and step name, so that a failed execution
  resumes where it stopped.

 ## Readers

| **Reader**           | **Session**                                         | **Round trips**                   |
|----------------------|-----------------------------------------------------|-----------------------------------|
| `CursorItemReader`   | one session from open to close, cleared per chunk   | one per fetch window              |
| `PagingItemReader`   | transacted: one session, cleared before each page   | one per page                      |
|                      | detached: one session, rows evicted once fetched    | one per page                      |
| `N1PagingItemReader` | one session, cleared before each page by default    | one per page, plus one per parent and collection |

 ## Features

| **Feature**   | **Description**                                                  |
|---------------|------------------------------------------------------------------|
| rdbc-sqlite   | SQLite row source, transaction manager and `ItemWriter`          |
| fake          | Random product and employee names in generated stores            |
| logger        | A logger `ItemWriter`, useful for debugging purposes             |
| full          | Enables all available features                                   |

 ## Getting Started

```rust
use store_batch_rs::{
    core::{
        checkpoint::InMemoryCheckpointStore,
        config::BatchProperties,
        job::{BatchStatus, JobParameters},
    },
    item::memory::{MemoryDatabase, MemoryTable},
    store::{FailAfter, ReaderKind, Store, StoreBackupJob, ADDRESS_PARAMETER},
};

fn main() -> Result<(), store_batch_rs::BatchError> {
    let database = MemoryDatabase::new();
    for name in ["a", "b", "c"] {
        database.insert(Store::new(name, "서울 강남구"));
    }
    let history = MemoryTable::new();
    let checkpoints = InMemoryCheckpointStore::new();
    let parameters = JobParameters::new().add_string(ADDRESS_PARAMETER, "서울");

    let job = StoreBackupJob::store_backup(&database, &history, &checkpoints)
        .properties(BatchProperties {
            chunk_size: 2,
            ..BatchProperties::default()
        })
        .reader_kind(ReaderKind::PagingTransacted);

    // The third store is rejected: the first chunk stays committed.
    let execution = job.run(&parameters, &FailAfter(2))?;
    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(history.len(), 2);

    Ok(())
}
```
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Row sources and the item readers and writers built on them
pub mod item;

/// The store backup jobs
pub mod store;
