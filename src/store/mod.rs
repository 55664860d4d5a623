//! Store backup sample: stores with their products and employees are copied
//! into a history table by a chunk-oriented job.

/// Stores, products, employees and store histories.
pub mod domain;

/// Store to history conversion with injectable failures.
pub mod processor;

/// Test data generation.
pub mod seed;

/// The `storeBackupBatch` and `n1PagingJob` jobs.
pub mod jobs;

pub use domain::{Employee, Product, Store, StoreHistory};
pub use jobs::{ReaderKind, StoreBackupJob, ADDRESS_PARAMETER, N1_PAGING_JOB, STORE_BACKUP_JOB};
pub use processor::{FailAfter, FaultInjector, NeverFail, StoreHistoryProcessor};
pub use seed::{seed_stores, SeedStoresTasklet, StoreSeed};
